//! A web-search agent that answers questions by alternating between a
//! hosted model and a Tavily search tool, with Helicone as the
//! observability side channel.
//!
//! The crate includes a CLI for using in the terminal, and a `graph` tool
//! that exports the shape of the decision loop. You can also use it as a
//! library to bring the agent into your own host apps.

#![deny(missing_docs)]

#[allow(unused_imports)]
#[macro_use]
extern crate tracing;

pub mod config;
pub mod diagram;
pub mod observe;
mod session;
pub mod tools;

pub use config::{Config, ConfigError};
pub use session::{Session, SessionBuilder};

/// Re-exports of [`search_agent_core`] crate.
pub mod core {
    pub use search_agent_core::*;
}
