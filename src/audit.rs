//! Audit sink boundary
//!
//! Write-only record of every agent interaction, forwarded by the caller
//! after the run completes. The sink must never block or fail the primary
//! response: [`dispatch`] swallows sink errors behind a warning.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::agentic::service::AgentRunResult;

/// One interaction, as handed to the audit collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub question: String,
    pub generated_sql: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub row_count: usize,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    /// Build the record for a finished run.
    pub fn from_run(question: &str, result: &AgentRunResult) -> Self {
        Self {
            question: question.to_string(),
            generated_sql: result.sql.clone(),
            success: result.error.is_none(),
            error_message: result.error.clone(),
            row_count: result.row_count(),
            timestamp: Utc::now(),
        }
    }
}

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> Result<()>;
}

/// Sink that emits records as structured log events.
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        info!(
            question = %record.question,
            sql = record.generated_sql.as_deref().unwrap_or_default(),
            success = record.success,
            error = record.error_message.as_deref().unwrap_or_default(),
            row_count = record.row_count,
            "agent interaction"
        );
        Ok(())
    }
}

/// Forward a record to the sink, discarding sink failures.
pub async fn dispatch(sink: &dyn AuditSink, record: AuditRecord) {
    if let Err(e) = sink.record(&record).await {
        warn!(error = %e, "audit sink failed; primary result unaffected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn record(&self, _record: &AuditRecord) -> Result<()> {
            Err(anyhow!("sink unavailable"))
        }
    }

    fn sample_result() -> AgentRunResult {
        AgentRunResult {
            sql: Some("SELECT 1".to_string()),
            data: Some(vec![]),
            error: None,
            explanation: Some("trivial".to_string()),
        }
    }

    #[test]
    fn record_reflects_run_outcome() {
        let record = AuditRecord::from_run("how many?", &sample_result());
        assert!(record.success);
        assert_eq!(record.generated_sql.as_deref(), Some("SELECT 1"));
        assert_eq!(record.row_count, 0);
    }

    #[tokio::test]
    async fn dispatch_swallows_sink_failures() {
        let record = AuditRecord::from_run("how many?", &sample_result());
        // Must not panic or propagate.
        dispatch(&FailingSink, record).await;
    }
}
