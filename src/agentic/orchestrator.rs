//! Agent orchestrator
//!
//! Bounded-retry state machine coordinating the generator and the executor.
//! Control flow is an explicit GENERATE / EXECUTE / DONE loop rather than a
//! graph traversal: every transition is visible, and an independent step
//! budget caps total transitions even if the attempt accounting were ever
//! wrong.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::generator::{SqlGenerator, SqlProposal};
use crate::database::executor::{QueryExecutor, RowSet, StructuredError};

/// Generation attempts before the loop gives up.
pub const MAX_ATTEMPTS: u32 = 3;

/// Hard cap on state transitions, independent of the attempts counter.
const MAX_STEPS: u32 = 15;

/// Mutable record threaded through one orchestration run.
///
/// Created fresh per run and discarded at the end. `attempts` increments
/// exactly once per generation step; `error` is cleared whenever a
/// generate+execute cycle succeeds. The run is terminal when `error` is
/// absent or the attempt budget is spent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentState {
    pub question: String,
    pub schema_text: String,
    pub sql_query: String,
    pub result: Option<RowSet>,
    pub error: Option<String>,
    pub explanation: Option<String>,
    pub attempts: u32,
}

impl AgentState {
    fn new(question: &str, schema_text: &str) -> Self {
        Self {
            question: question.to_string(),
            schema_text: schema_text.to_string(),
            sql_query: String::new(),
            result: None,
            error: None,
            explanation: None,
            attempts: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Generate,
    Execute,
    Done,
}

/// Drives one question to a terminal state.
pub struct AgentOrchestrator<'a> {
    generator: &'a SqlGenerator,
    executor: &'a dyn QueryExecutor,
    max_attempts: u32,
}

impl<'a> AgentOrchestrator<'a> {
    pub fn new(generator: &'a SqlGenerator, executor: &'a dyn QueryExecutor) -> Self {
        Self {
            generator,
            executor,
            max_attempts: MAX_ATTEMPTS,
        }
    }

    /// Override the attempt budget (tests mostly).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Run the GENERATE/EXECUTE loop to a terminal state.
    pub async fn run(&self, question: &str, schema_text: &str) -> AgentState {
        let mut state = AgentState::new(question, schema_text);
        let mut step = Step::Generate;
        let mut proposal: Option<SqlProposal> = None;
        let mut steps_taken: u32 = 0;

        loop {
            steps_taken += 1;
            if steps_taken > MAX_STEPS {
                warn!(steps_taken, "step budget exhausted, terminating run");
                state.error = Some("orchestration step budget exhausted".to_string());
                break;
            }

            match step {
                Step::Generate => {
                    state.attempts += 1;
                    debug!(attempt = state.attempts, "generating SQL");
                    let generated = self
                        .generator
                        .generate(&state.question, &state.schema_text, state.error.as_deref())
                        .await;
                    if let SqlProposal::Proposal { sql, explanation } = &generated {
                        state.sql_query = sql.clone();
                        state.explanation = Some(explanation.clone());
                    }
                    proposal = Some(generated);
                    step = Step::Execute;
                }
                Step::Execute => {
                    // A failed generation consumes an attempt like any other
                    // failure, without contacting the store.
                    let outcome = match &proposal {
                        Some(SqlProposal::Proposal { .. }) => {
                            self.executor.execute_query(&state.sql_query).await
                        }
                        Some(SqlProposal::ParseFailure { reason }) => Err(StructuredError::new(
                            format!("SQL generation failed: {reason}"),
                        )),
                        None => Err(StructuredError::new(
                            "SQL generation failed: no proposal produced",
                        )),
                    };
                    match outcome {
                        Ok(rows) => {
                            state.result = Some(rows);
                            state.error = None;
                        }
                        Err(e) => {
                            state.error = Some(e.message);
                            state.result = None;
                        }
                    }

                    step = if state.error.is_none() {
                        Step::Done
                    } else if state.attempts >= self.max_attempts {
                        // Retries exhausted; the last error is preserved.
                        info!(
                            attempts = state.attempts,
                            error = state.error.as_deref().unwrap_or_default(),
                            "retries exhausted"
                        );
                        Step::Done
                    } else {
                        debug!(
                            attempt = state.attempts,
                            error = state.error.as_deref().unwrap_or_default(),
                            "execution failed, retrying with error context"
                        );
                        Step::Generate
                    };
                }
                Step::Done => break,
            }
        }

        state
    }
}
