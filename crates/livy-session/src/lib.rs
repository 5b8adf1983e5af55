//! Session orchestration and interpreters for Livy.
//!
//! Provides:
//! - `SessionManager` - One remote session per principal, created lazily
//! - Directory implementations (memory)
//! - `Scheduler` - FIFO or bounded-parallel execution
//! - `LivyInterpreter` / `SqlInterpreter` - The caller-facing interpreters

pub mod directory;
pub mod interpreter;
pub mod manager;
pub mod scheduler;
pub mod sql;

pub use directory::MemoryDirectory;
pub use interpreter::{InterpretError, LivyInterpreter};
pub use manager::{SessionError, SessionManager};
pub use scheduler::Scheduler;
pub use sql::{SparkDialect, SqlInterpreter};
