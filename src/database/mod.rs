//! Store access layer
//!
//! Connection pooling, the guarded query executor, and schema description
//! providers. The executor seam ([`executor::QueryExecutor`]) is the only
//! path through which generated SQL reaches the store.

pub mod executor;
pub mod pool;
pub mod schema;

pub use executor::{
    GuardedExecutor, PgStatementRunner, QueryExecutor, QueryOutcome, RowMap, RowSet,
    StatementRunner, StructuredError,
};
pub use pool::{ConnectionFactory, PgConnectionFactory, PoolConfig, PoolError, PoolManager};
pub use schema::{
    CuratedSchemaProvider, IntrospectedSchemaProvider, SchemaProvider, DEFAULT_CURATED_SCHEMA,
};
