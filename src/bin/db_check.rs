//! Store connectivity probe
//!
//! Initializes the pool and runs a trivial query through the full guarded
//! executor stack. Exits non-zero when the store is unreachable.

use std::sync::Arc;

use anyhow::Result;
use askdb::config::{mask_database_url, Settings};
use askdb::database::executor::{GuardedExecutor, PgStatementRunner, QueryExecutor};
use askdb::database::pool::{PgConnectionFactory, PoolManager};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let settings = Settings::from_env();
    info!(
        url = %mask_database_url(&settings.database_url),
        "checking store connectivity"
    );

    let pool = Arc::new(
        PoolManager::initialize(
            settings.pool.clone(),
            PgConnectionFactory::new(settings.database_url.clone()),
        )
        .await?,
    );
    let executor = GuardedExecutor::new(PgStatementRunner::new(Arc::clone(&pool)));

    match executor.execute_query("SELECT 1 AS ok").await {
        Ok(rows) => {
            info!(stats = %pool.stats(), "store reachable");
            println!("OK: {}", serde_json::to_string(&rows)?);
        }
        Err(e) => {
            error!(error = %e, "store check failed");
            pool.close().await;
            std::process::exit(1);
        }
    }

    pool.close().await;
    Ok(())
}
