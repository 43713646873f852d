//! A2A Core Library
//!
//! Shared functionality for the A2A remote-call components:
//! - Task request/response and event model shared by every transport
//! - Client settings resolved once from the environment
//! - Tracing initialisation for binaries
//! - Common error types

pub mod config;
pub mod error;
pub mod task;
pub mod tracing_init;

pub use config::ClientSettings;
pub use error::{Error, Result};
pub use task::{Event, Priority, TaskRequest, TaskResponse};
