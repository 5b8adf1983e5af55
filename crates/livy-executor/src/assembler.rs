//! Splitting multi-line input into submittable statements.

use livy_core::{Code, ContinuationRule, ExecutionResult, OutputStore, SessionId};

use crate::{ExecError, RequestHandle, StatementRunner};

/// Message returned when the input ends in the middle of a statement.
pub const INCOMPLETE_MESSAGE: &str = "Incomplete expression";

/// Regroups physical lines into logical statements and runs them in order.
///
/// Each line is submitted on its own unless the continuation rule says
/// the next line chains onto it, or the server reported the text so far
/// as incomplete. Lines the server calls incomplete are carried over and
/// prefixed onto the next submission.
#[derive(Clone)]
pub struct StatementAssembler {
    runner: StatementRunner,
    rule: ContinuationRule,
}

impl StatementAssembler {
    #[must_use]
    pub const fn new(runner: StatementRunner, rule: ContinuationRule) -> Self {
        Self { runner, rule }
    }

    #[must_use]
    pub const fn runner(&self) -> &StatementRunner {
        &self.runner
    }

    /// Run `input` on `session`, streaming each statement's output into `out`.
    ///
    /// Stops at the first error: the output streamed so far is cleared,
    /// the failing statement's message is pushed as stderr and an error
    /// result with an empty message is returned. Successful runs return an
    /// empty success; their output lives in `out` only.
    ///
    /// # Errors
    /// Returns error if a statement cannot be submitted or awaited. The
    /// output streamed so far is cleared first.
    pub async fn run(
        &self,
        input: &str,
        session: SessionId,
        handle: &RequestHandle,
        out: &OutputStore,
    ) -> Result<ExecutionResult, ExecError> {
        out.clear();

        let lines = split_lines(input);
        let mut incomplete = String::new();
        let mut last = Code::Success;

        for (i, line) in lines.iter().enumerate() {
            // End of input never continues.
            if lines.get(i + 1).is_some_and(|next| self.rule.continues(next)) {
                incomplete.push_str(line);
                incomplete.push('\n');
                continue;
            }

            let unit = format!("{incomplete}{line}");
            let result = self
                .runner
                .submit_and_wait(&unit, session, handle)
                .await
                .inspect_err(|_| out.clear())?;
            last = result.code;

            match result.code {
                Code::Error => {
                    tracing::debug!(session, "statement failed, stopping run");
                    out.clear();
                    out.push_stderr(result.message);
                    return Ok(ExecutionResult::error(""));
                }
                Code::Incomplete => {
                    incomplete.push_str(line);
                    incomplete.push('\n');
                }
                Code::Success => {
                    out.push_stdout(format!("{}\n", result.message));
                    incomplete.clear();
                }
            }
        }

        Ok(if last == Code::Incomplete {
            ExecutionResult::incomplete(INCOMPLETE_MESSAGE)
        } else {
            ExecutionResult::success("")
        })
    }
}

/// Split on `\n`, dropping trailing empty lines.
fn split_lines(input: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = input.split('\n').collect();
    while lines.len() > 1 && lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}
