//! Wire protocol of the Livy sessions and statements endpoints.

use std::{fmt, str::FromStr};

use livy_core::{SessionId, StatementId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw body Livy answers with when a statement targets an unknown session.
pub const SESSION_NOT_FOUND: &str = "Session not found";

/// Execution runtime flavor of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Spark,
    PySpark,
    PySpark3,
    SparkR,
}

impl SessionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spark => "spark",
            Self::PySpark => "pyspark",
            Self::PySpark3 => "pyspark3",
            Self::SparkR => "sparkr",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spark" => Ok(Self::Spark),
            "pyspark" => Ok(Self::PySpark),
            "pyspark3" => Ok(Self::PySpark3),
            "sparkr" => Ok(Self::SparkR),
            other => Err(format!("unknown session kind: {other}")),
        }
    }
}

/// Body of `POST /sessions`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionRequest<'a> {
    pub kind: SessionKind,
    #[serde(rename = "proxyUser")]
    pub proxy_user: &'a str,
}

/// Lifecycle state of a remote session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    Starting,
    Idle,
    Busy,
    ShuttingDown,
    Error,
    Dead,
    Killed,
    Success,
    Recovering,
    #[serde(other)]
    Unknown,
}

impl SessionState {
    /// Whether the session accepts statements.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Whether the session can never become ready again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::ShuttingDown | Self::Error | Self::Dead | Self::Killed | Self::Success
        )
    }
}

/// Session as returned by `POST /sessions` and `GET /sessions/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteSession {
    pub id: SessionId,
    pub state: SessionState,
}

/// Lifecycle state of a remote statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementState {
    Waiting,
    Running,
    Available,
    Error,
    Cancelling,
    Cancelled,
    #[serde(other)]
    Unknown,
}

/// Output of a statement that reached `available`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StatementOutput {
    Ok {
        #[serde(default)]
        data: Option<Map<String, Value>>,
    },
    Error {
        #[serde(default)]
        ename: Option<String>,
        #[serde(default)]
        evalue: Option<String>,
        #[serde(default)]
        traceback: Option<Vec<String>>,
    },
    #[serde(other)]
    Unknown,
}

impl StatementOutput {
    /// The `text/plain` entry of an ok output.
    #[must_use]
    pub fn text_plain(&self) -> Option<&str> {
        match self {
            Self::Ok { data: Some(data) } => data.get("text/plain").and_then(Value::as_str),
            _ => None,
        }
    }
}

/// Statement as returned by the statements endpoints.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteStatement {
    pub id: StatementId,
    pub state: StatementState,
    #[serde(default)]
    pub output: Option<StatementOutput>,
}

/// Body of `POST /sessions/{id}/statements` around already escaped code.
#[must_use]
pub fn statement_body(escaped_code: &str) -> String {
    format!(r#"{{"code": "{escaped_code}"}}"#)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_session_body() {
        let body = serde_json::to_string(&CreateSessionRequest {
            kind: SessionKind::PySpark,
            proxy_user: "alice",
        })
        .unwrap();
        assert_eq!(body, r#"{"kind":"pyspark","proxyUser":"alice"}"#);
    }

    #[test]
    fn test_session_state_parsing() {
        let s: RemoteSession =
            serde_json::from_str(r#"{"id": 3, "state": "not_started", "appId": null, "log": []}"#)
                .unwrap();
        assert_eq!(s.id, 3);
        assert_eq!(s.state, SessionState::NotStarted);

        let s: RemoteSession = serde_json::from_str(r#"{"id": 3, "state": "sleepy"}"#).unwrap();
        assert_eq!(s.state, SessionState::Unknown);
        assert!(SessionState::Dead.is_terminal());
        assert!(!SessionState::Starting.is_terminal());
    }

    #[test]
    fn test_pending_statement_has_no_output() {
        let st: RemoteStatement =
            serde_json::from_str(r#"{"id": 0, "state": "waiting", "output": null}"#).unwrap();
        assert_eq!(st.state, StatementState::Waiting);
        assert!(st.output.is_none());
    }

    #[test]
    fn test_ok_output() {
        let st: RemoteStatement = serde_json::from_str(
            r#"{"id": 1, "state": "available",
                "output": {"status": "ok", "execution_count": 1, "data": {"text/plain": "res0: Int = 2"}}}"#,
        )
        .unwrap();
        let output = st.output.unwrap();
        assert_eq!(output.text_plain(), Some("res0: Int = 2"));
    }

    #[test]
    fn test_error_output() {
        let st: RemoteStatement = serde_json::from_str(
            r#"{"id": 2, "state": "available",
                "output": {"status": "error", "ename": "NameError", "evalue": "name 'x' is not defined",
                           "traceback": ["line 1", "line 2"]}}"#,
        )
        .unwrap();
        assert_eq!(
            st.output,
            Some(StatementOutput::Error {
                ename: Some("NameError".into()),
                evalue: Some("name 'x' is not defined".into()),
                traceback: Some(vec!["line 1".into(), "line 2".into()]),
            })
        );
    }

    #[test]
    fn test_unknown_output_status() {
        let out: StatementOutput = serde_json::from_str(r#"{"status": "aborted"}"#).unwrap();
        assert_eq!(out, StatementOutput::Unknown);
    }

    #[test]
    fn test_statement_body() {
        assert_eq!(statement_body(r"1 + 1\nx"), r#"{"code": "1 + 1\nx"}"#);
    }
}
