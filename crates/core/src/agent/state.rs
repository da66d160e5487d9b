use std::fmt::{self, Display};

use serde::Serialize;

use crate::graph;

/// A state of the decision loop.
///
/// A run starts in [`LoopState::Model`] and moves along
/// [`LoopState::successors`] until it reaches [`LoopState::Done`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoopState {
    /// Ask the model for the next assistant message.
    Model,
    /// Run the tool calls requested by the last assistant message.
    Tool,
    /// The last assistant message is the final answer.
    Done,
}

impl LoopState {
    /// The state a run starts in when no tool call is pending.
    pub const INITIAL: LoopState = LoopState::Model;

    /// Returns the states that may follow this one.
    #[inline]
    pub fn successors(self) -> &'static [LoopState] {
        match self {
            LoopState::Model => &[LoopState::Tool, LoopState::Done],
            LoopState::Tool => &[LoopState::Model],
            LoopState::Done => &[],
        }
    }

    /// Returns `true` if the run ends in this state.
    #[inline]
    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    #[inline]
    pub(crate) fn node_id(self) -> &'static str {
        match self {
            LoopState::Model => "agent",
            LoopState::Tool => "tools",
            LoopState::Done => graph::END,
        }
    }
}

impl Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Model => write!(f, "MODEL"),
            LoopState::Tool => write!(f, "TOOL"),
            LoopState::Done => write!(f, "DONE"),
        }
    }
}
