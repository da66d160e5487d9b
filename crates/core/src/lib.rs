//! Core logic including the decision loop, tool execution, conversation
//! state and observability hooks.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
pub mod conversation;
mod error;
pub mod graph;
mod model_client;
pub mod observe;
pub mod tool;

pub use agent::{Agent, AgentBuilder, LoopState, RunOptions};
pub use conversation::Conversation;
pub use error::AgentError;
