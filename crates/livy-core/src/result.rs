//! Result taxonomy returned to interpret callers.

use serde::{Deserialize, Serialize};

/// Outcome class of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Code {
    /// The statement ran; continue with the next one.
    Success,
    /// The statement failed; terminal for the whole input.
    Error,
    /// The input is not a complete statement yet; resubmit with more input.
    Incomplete,
}

/// Code plus message, the unit handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub code: Code,
    pub message: String,
}

impl ExecutionResult {
    #[must_use]
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(Code::Success, message)
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Code::Error, message)
    }

    #[must_use]
    pub fn incomplete(message: impl Into<String>) -> Self {
        Self::new(Code::Incomplete, message)
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Code::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_serializes_upper_case() {
        let json = serde_json::to_string(&ExecutionResult::incomplete("x")).unwrap();
        assert_eq!(json, r#"{"code":"INCOMPLETE","message":"x"}"#);
    }

    #[test]
    fn test_constructors() {
        assert!(ExecutionResult::success("").is_success());
        assert_eq!(ExecutionResult::error("boom").code, Code::Error);
    }
}
