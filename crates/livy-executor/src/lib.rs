//! Statement execution on Livy sessions.
//!
//! Provides:
//! - Code escaping and result classification
//! - `StatementRunner` - submit one statement and poll it to completion
//! - `StatementAssembler` - split multi-line input into submittable units
//! - Table reshaping for SQL output
//! - `CancelRegistry` - in-flight statements per request, for cancellation

pub mod assembler;
pub mod cancel;
pub mod classify;
pub mod escape;
pub mod runner;
pub mod table;

pub use assembler::{INCOMPLETE_MESSAGE, StatementAssembler};
pub use cancel::{CancelRegistry, RequestHandle};
pub use classify::classify;
pub use escape::escape_code;
pub use runner::{ExecError, PollPolicy, StatementRunner};
pub use table::{TableFormatError, reshape_table};
