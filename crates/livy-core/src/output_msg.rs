//! Typed messages pushed into an `OutputStore`.

use serde::{Deserialize, Serialize};

/// One unit of interpreter output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutputMsg {
    /// Output of a successful statement.
    Stdout(String),
    /// Message of the statement that failed the run.
    Stderr(String),
    /// Everything pushed before this point is discarded.
    Cleared,
    /// The run is over; no more output follows.
    Finished,
}

impl OutputMsg {
    /// Rough heap size, used to bound the history.
    #[must_use]
    pub fn approx_bytes(&self) -> usize {
        const OVERHEAD: usize = 8;
        match self {
            Self::Stdout(s) | Self::Stderr(s) => s.len() + OVERHEAD,
            Self::Cleared | Self::Finished => OVERHEAD,
        }
    }
}
