//! HTTP transport and typed wire protocol for the Livy REST API.
//!
//! Provides:
//! - Wire protocol (session and statement payloads)
//! - `LivyApi` - typed calls over any `Transport`
//! - `HttpTransport` - reqwest-backed transport
//! - `ScriptedTransport` - in-memory transport for tests (feature: mock)

pub mod api;
pub mod http;
pub mod protocol;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use api::{ApiError, LivyApi};
pub use http::HttpTransport;
pub use protocol::{
    RemoteSession, RemoteStatement, SESSION_NOT_FOUND, SessionKind, SessionState,
    StatementOutput, StatementState,
};
