//! Agent service facade
//!
//! Stateless public entry point: one call builds a fresh agent state, runs
//! the orchestrator to a terminal state, and maps it to the public result
//! shape. The executor is injected per call, so the storage backend can be
//! swapped (or stubbed in tests) without touching orchestration.

use std::sync::Arc;

use serde::Serialize;

use super::generator::SqlGenerator;
use super::llm_client::LlmClient;
use super::orchestrator::{AgentOrchestrator, AgentState};
use crate::database::executor::{QueryExecutor, RowSet};

/// Public result of one agent run.
///
/// Failures never raise across this boundary: generation errors, guard
/// rejections, execution errors and retry exhaustion all arrive as the
/// `error` text. Callers forward the result to the audit collaborator
/// themselves (see [`crate::audit`]).
#[derive(Debug, Clone, Serialize)]
pub struct AgentRunResult {
    pub sql: Option<String>,
    pub data: Option<RowSet>,
    pub error: Option<String>,
    pub explanation: Option<String>,
}

impl AgentRunResult {
    fn from_state(state: AgentState) -> Self {
        let AgentState {
            sql_query,
            result,
            error,
            explanation,
            ..
        } = state;
        Self {
            sql: (!sql_query.is_empty()).then_some(sql_query),
            data: result,
            error,
            explanation,
        }
    }

    /// Rows returned, zero when the run failed.
    pub fn row_count(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }
}

/// Stateless facade composing generator, orchestrator and executor per call.
pub struct AgentService {
    generator: SqlGenerator,
}

impl AgentService {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            generator: SqlGenerator::new(client),
        }
    }

    /// Answer one question against the given executor.
    pub async fn run(
        &self,
        question: &str,
        schema_text: &str,
        executor: &dyn QueryExecutor,
    ) -> AgentRunResult {
        let orchestrator = AgentOrchestrator::new(&self.generator, executor);
        let state = orchestrator.run(question, schema_text).await;
        AgentRunResult::from_state(state)
    }
}
