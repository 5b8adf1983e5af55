//! Core abstractions for executing statements on remote Livy sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `ExecutionResult` - The success / error / incomplete result taxonomy
//! - `OutputStore` - Broadcast + history sink for statement output
//! - `RequestContext` - Principal and request id of one interpret call
//! - `LivyConfig` - Connection, polling and result-size settings
//! - Transport, directory and interpreter traits

pub mod config;
pub mod context;
pub mod output_msg;
pub mod output_store;
pub mod result;
pub mod traits;

pub use config::{ConfigError, ContinuationRule, LivyConfig};
pub use context::RequestContext;
pub use output_msg::OutputMsg;
pub use output_store::OutputStore;
pub use result::{Code, ExecutionResult};
pub use traits::{
    DirectoryError, HttpMethod, Interpreter, Principal, Reply, SessionDirectory, SessionId,
    StatementId, Transport, TransportError,
};
