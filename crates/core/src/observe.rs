//! Observability hooks.
//!
//! An [`Observer`] receives a [`LoopEvent`] for every run start, state
//! transition and run end. Observers are side channels: a failing observer
//! is logged and ignored, and an agent without an observer behaves exactly
//! the same.

use serde::Serialize;
use thiserror::Error;

use crate::agent::LoopState;

/// The error returned by an [`Observer`].
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("observability sink failed: {0}")]
pub struct ObserveError(pub String);

/// An event emitted by the decision loop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoopEvent {
    /// The session id of the run, if any.
    pub session: Option<String>,
    /// What happened.
    #[serde(flatten)]
    pub kind: LoopEventKind,
}

/// The kind of a [`LoopEvent`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEventKind {
    /// A run has started, this opens the trace of the run.
    RunStarted {
        /// Number of messages the run started with.
        messages: usize,
    },
    /// The loop moved from one state to another.
    Transition {
        /// One-based step counter within the run.
        step: usize,
        /// The state that was executed.
        from: LoopState,
        /// The state to execute next.
        to: LoopState,
    },
    /// A run has ended, this closes the trace of the run.
    RunFinished {
        /// Number of transitions made.
        steps: usize,
        /// The error message if the run failed.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// A sink for loop events.
///
/// `observe` is called inline by the loop, so implementations should hand
/// slow work (e.g. network calls) off to a background task.
pub trait Observer: Send + Sync {
    /// Records an event.
    fn observe(&self, event: &LoopEvent) -> Result<(), ObserveError>;
}

impl<F> Observer for F
where
    F: Fn(&LoopEvent) -> Result<(), ObserveError> + Send + Sync,
{
    #[inline]
    fn observe(&self, event: &LoopEvent) -> Result<(), ObserveError> {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_serialize_event() {
        let event = LoopEvent {
            session: Some("weather_query_sf".to_owned()),
            kind: LoopEventKind::Transition {
                step: 1,
                from: LoopState::Model,
                to: LoopState::Tool,
            },
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "session": "weather_query_sf",
                "type": "transition",
                "step": 1,
                "from": "MODEL",
                "to": "TOOL"
            })
        );

        let event = LoopEvent {
            session: None,
            kind: LoopEventKind::RunFinished {
                steps: 3,
                error: None,
            },
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "session": null, "type": "run_finished", "steps": 3 })
        );
    }
}
