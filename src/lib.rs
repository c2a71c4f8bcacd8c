//! askdb: natural-language analytics over a relational store
//!
//! Turns a user question into a validated, executed read-only SQL query.
//! A language model proposes SQL grounded in a schema description, a lexical
//! guard keeps every statement read-only, and a bounded retry loop feeds
//! execution errors back to the model for self-correction.
//!
//! The main entry point is [`AgentService::run`]; everything behind it is
//! composed from swappable trait seams ([`agentic::llm_client::LlmClient`],
//! [`database::executor::QueryExecutor`], [`database::schema::SchemaProvider`])
//! so the backend can be stubbed in tests.

pub mod agentic;
pub mod audit;
pub mod config;
pub mod database;

pub use agentic::service::{AgentRunResult, AgentService};
pub use database::executor::{GuardedExecutor, QueryExecutor, RowSet, StructuredError};
pub use database::pool::{PoolConfig, PoolManager};
