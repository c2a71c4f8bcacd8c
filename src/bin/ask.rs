//! One-shot question runner
//!
//! Wires the full production stack (pool, guarded executor, schema provider,
//! Ollama client, agent service) and answers a single question from the
//! command line, forwarding the outcome to the audit sink.
//!
//! ```bash
//! ask "How many active employees are there?"
//! ```

use std::sync::Arc;

use anyhow::{anyhow, Result};
use askdb::agentic::llm_client::LlmClient;
use askdb::agentic::ollama::OllamaClient;
use askdb::agentic::service::AgentService;
use askdb::audit::{dispatch, AuditRecord, LogAuditSink};
use askdb::config::{SchemaSource, Settings};
use askdb::database::executor::{GuardedExecutor, PgStatementRunner, QueryExecutor};
use askdb::database::pool::{PgConnectionFactory, PoolManager};
use askdb::database::schema::{
    CuratedSchemaProvider, IntrospectedSchemaProvider, SchemaProvider,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if question.trim().is_empty() {
        return Err(anyhow!("usage: ask <question>"));
    }

    let settings = Settings::from_env();

    // Pool initialization is the one fault allowed to fail the process.
    let pool = Arc::new(
        PoolManager::initialize(
            settings.pool.clone(),
            PgConnectionFactory::new(settings.database_url.clone()),
        )
        .await?,
    );
    let executor: Arc<dyn QueryExecutor> =
        Arc::new(GuardedExecutor::new(PgStatementRunner::new(Arc::clone(&pool))));

    let schema_provider: Box<dyn SchemaProvider> = match settings.schema_source.clone() {
        SchemaSource::Introspected { allow_list } => Box::new(IntrospectedSchemaProvider::new(
            Arc::clone(&executor),
            allow_list,
        )),
        SchemaSource::Curated { text } => Box::new(CuratedSchemaProvider::new(text)),
    };
    let schema_text = schema_provider.schema_text().await;

    let client: Arc<dyn LlmClient> = Arc::new(OllamaClient::new(
        settings.ollama_base_url.clone(),
        settings.llm_model.clone(),
    ));
    info!(model = client.model_name(), "asking agent");

    let service = AgentService::new(client);
    let result = service.run(&question, &schema_text, &executor).await;

    println!("{}", serde_json::to_string_pretty(&result)?);

    // Audit failures never alter the primary result.
    dispatch(&LogAuditSink, AuditRecord::from_run(&question, &result)).await;

    pool.close().await;
    Ok(())
}
