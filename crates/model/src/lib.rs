//! An abstraction layer for hosted chat models.
//!
//! This crate establishes a unified protocol for the decision loop to talk
//! to any supported model backend, so the loop can switch between backends
//! without modifying the core codebase.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to. The message types
//! double as the JSON wire format of a conversation.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
