use std::time::Duration;

use search_agent_model::{ErrorKind as ModelErrorKind, ModelProviderError};
use thiserror::Error;

use crate::conversation::ConversationError;

/// Errors that terminate a run of the decision loop.
///
/// Tool failures are not listed here: they are recorded in the
/// conversation so the model can react to them. The only exception is a
/// tool reporting rejected credentials, which surfaces as
/// [`AgentError::Configuration`].
#[derive(Error, Debug)]
pub enum AgentError {
    /// The conversation has no user message to answer.
    #[error("conversation has no user message")]
    EmptyConversation,

    /// The conversation breaks the tool call ordering rules.
    #[error("invalid conversation: {0}")]
    InvalidConversation(#[from] ConversationError),

    /// The model backend failed to produce a reply.
    #[error("model invocation failed: {0}")]
    Model(Box<dyn ModelProviderError>),

    /// A tool can't run with the current configuration.
    #[error("tool `{tool}` is misconfigured: {reason}")]
    Configuration {
        /// Name of the tool.
        tool: String,
        /// What the tool reported.
        reason: String,
    },

    /// The loop made more transitions than allowed.
    #[error("step limit of {0} exceeded")]
    StepLimitExceeded(usize),

    /// The run didn't finish in time.
    #[error("run timed out after {0:?}")]
    Timeout(Duration),
}

impl AgentError {
    /// Returns the model error kind if the model invocation failed.
    ///
    /// Callers can use this to decide a retry policy.
    #[inline]
    pub fn model_error_kind(&self) -> Option<ModelErrorKind> {
        match self {
            AgentError::Model(err) => Some(err.kind()),
            _ => None,
        }
    }
}
