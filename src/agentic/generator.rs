//! SQL generator
//!
//! One deterministic model call turning (question, schema text, prior error)
//! into a candidate SQL statement plus explanation. Model output is
//! untrusted: transport failures and unparseable responses both surface as
//! the [`SqlProposal::ParseFailure`] variant rather than an error or a
//! sentinel string, so the orchestrator's failure path is type-visible.

use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use super::llm_client::LlmClient;
use super::prompts::{build_system_prompt, build_user_content};

/// Outcome of one generation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlProposal {
    /// A candidate statement, already dialect-repaired.
    Proposal { sql: String, explanation: String },
    /// The model was unreachable or its output could not be parsed.
    ParseFailure { reason: String },
}

/// Wraps a single model call with defensive parsing and dialect repair.
pub struct SqlGenerator {
    client: Arc<dyn LlmClient>,
}

impl SqlGenerator {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Produce a proposal for the question, optionally correcting for the
    /// prior attempt's execution error.
    pub async fn generate(
        &self,
        question: &str,
        schema_text: &str,
        prior_error: Option<&str>,
    ) -> SqlProposal {
        let system_prompt = build_system_prompt(schema_text);
        let user_content = build_user_content(question, prior_error);

        let raw = match self.client.chat_json(&system_prompt, &user_content).await {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    provider = self.client.provider_name(),
                    model = self.client.model_name(),
                    error = %e,
                    "model call failed"
                );
                return SqlProposal::ParseFailure {
                    reason: format!("model call failed: {e}"),
                };
            }
        };

        let proposal = parse_proposal(&raw);
        if let SqlProposal::Proposal { sql, .. } = &proposal {
            debug!(sql = %sql, "generated candidate SQL");
        }
        proposal
    }
}

/// Parse raw model text into a proposal.
pub(crate) fn parse_proposal(raw: &str) -> SqlProposal {
    #[derive(Deserialize)]
    struct RawProposal {
        sql: Option<String>,
        explanation: Option<String>,
    }

    let json_text = extract_json(raw);
    let parsed: RawProposal = match serde_json::from_str(&json_text) {
        Ok(parsed) => parsed,
        Err(e) => {
            return SqlProposal::ParseFailure {
                reason: format!("model output was not valid JSON: {e}"),
            }
        }
    };

    let sql = repair_dialect(parsed.sql.as_deref().unwrap_or_default());
    if sql.is_empty() {
        return SqlProposal::ParseFailure {
            reason: "model output contained no sql statement".to_string(),
        };
    }

    SqlProposal::Proposal {
        sql,
        explanation: parsed.explanation.unwrap_or_default(),
    }
}

/// Pull the JSON object out of model text that may wrap it in code fences.
fn extract_json(text: &str) -> String {
    let text = text.trim();
    let json = if text.contains("```json") {
        text.split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(text)
    } else if text.contains("```") {
        text.split("```")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(text)
    } else {
        text
    };
    json.trim().to_string()
}

/// Best-effort textual repair toward the store's accepted dialect.
///
/// Strips fences, identifier quotes and statement terminators, rewrites
/// `LIMIT n` to the store's `FETCH FIRST n ROWS ONLY` form, and drops a
/// leading `TOP n` projection modifier. Heuristics over the raw text, not a
/// reparse; deviations these don't cover are caught at execution and fed
/// back through the retry loop.
pub fn repair_dialect(raw: &str) -> String {
    let defenced = raw.replace("```sql", "").replace("```", "");
    let mut sql = defenced.replace(';', "").replace('"', "").trim().to_string();

    let limit = Regex::new(r"(?i)\bLIMIT\s+(\d+)").unwrap();
    sql = limit
        .replace_all(&sql, "FETCH FIRST ${1} ROWS ONLY")
        .into_owned();

    if sql.to_uppercase().contains("TOP ") {
        let top = Regex::new(r"(?i)SELECT\s+TOP\s+\d+\s+").unwrap();
        sql = top.replace_all(&sql, "SELECT ").into_owned();
    }

    sql.trim().to_string()
}
