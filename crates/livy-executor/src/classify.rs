//! Classification of statement payloads into execution results.

use livy_core::ExecutionResult;
use livy_transport::{RemoteStatement, StatementOutput, StatementState};

/// Marker telling renderers the message is raw markup.
pub const HTML_MARKER: &str = "%html ";

const HTML_PREFIXES: [&str; 4] = ["<link", "<script", "<style", "<div"];

/// Turn a polled statement into a result, or `None` if it is not done yet.
///
/// Error values of `incomplete statement` or mentioning `EOF` mean the
/// code needs more input and come back as incomplete, not as an error.
#[must_use]
pub fn classify(statement: &RemoteStatement) -> Option<ExecutionResult> {
    match statement.state {
        StatementState::Available => {}
        StatementState::Error => {
            return Some(match &statement.output {
                Some(output @ StatementOutput::Error { .. }) => classify_output(output)?,
                _ => ExecutionResult::error(format!("Statement {} failed", statement.id)),
            });
        }
        _ => return None,
    }

    match &statement.output {
        Some(output) => classify_output(output),
        None => Some(ExecutionResult::error(format!(
            "Statement {} is available but has no output",
            statement.id
        ))),
    }
}

fn classify_output(output: &StatementOutput) -> Option<ExecutionResult> {
    match output {
        StatementOutput::Error {
            evalue, traceback, ..
        } => {
            let evalue = evalue.as_deref().unwrap_or_default();
            if is_incomplete(evalue) {
                return Some(ExecutionResult::incomplete(""));
            }
            Some(ExecutionResult::error(error_message(
                evalue,
                traceback.as_deref().unwrap_or_default(),
            )))
        }
        StatementOutput::Ok { .. } => {
            let text = output.text_plain().map(str::trim).unwrap_or_default();
            Some(ExecutionResult::success(mark_html(text)))
        }
        StatementOutput::Unknown => None,
    }
}

fn is_incomplete(evalue: &str) -> bool {
    evalue == "incomplete statement" || evalue.contains("EOF")
}

fn error_message(evalue: &str, traceback: &[String]) -> String {
    if traceback.is_empty() {
        return evalue.to_string();
    }
    let rendered =
        serde_json::to_string_pretty(traceback).unwrap_or_else(|_| traceback.join("\n"));
    format!("{evalue}\ntraceback:\n{rendered}")
}

fn mark_html(text: &str) -> String {
    if HTML_PREFIXES.iter().any(|p| text.starts_with(p)) {
        format!("{HTML_MARKER}{text}")
    } else {
        text.to_string()
    }
}
