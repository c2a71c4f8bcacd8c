//! Schema map dump
//!
//! Prints the introspected schema description exactly as the generator
//! prompt would see it. Honors `SCHEMA_TABLES` as an allow-list.

use std::sync::Arc;

use anyhow::Result;
use askdb::config::{SchemaSource, Settings};
use askdb::database::executor::{GuardedExecutor, PgStatementRunner, QueryExecutor};
use askdb::database::pool::{PgConnectionFactory, PoolManager};
use askdb::database::schema::{IntrospectedSchemaProvider, SchemaProvider};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let settings = Settings::from_env();
    let pool = Arc::new(
        PoolManager::initialize(
            settings.pool.clone(),
            PgConnectionFactory::new(settings.database_url.clone()),
        )
        .await?,
    );
    let executor: Arc<dyn QueryExecutor> =
        Arc::new(GuardedExecutor::new(PgStatementRunner::new(Arc::clone(&pool))));

    let allow_list = match settings.schema_source {
        SchemaSource::Introspected { allow_list } => allow_list,
        SchemaSource::Curated { .. } => None,
    };
    let provider = IntrospectedSchemaProvider::new(executor, allow_list);

    println!("{}", provider.schema_text().await);

    pool.close().await;
    Ok(())
}
