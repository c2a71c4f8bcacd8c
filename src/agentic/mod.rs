//! Agentic SQL generation
//!
//! The model-facing half of the system: prompt construction, the LLM client
//! seam, defensive proposal parsing with dialect repair, the bounded-retry
//! orchestrator, and the public service facade.

pub mod generator;
pub mod llm_client;
pub mod ollama;
pub mod orchestrator;
pub mod prompts;
pub mod service;

pub use generator::{SqlGenerator, SqlProposal};
pub use llm_client::LlmClient;
pub use ollama::OllamaClient;
pub use orchestrator::{AgentOrchestrator, AgentState, MAX_ATTEMPTS};
pub use service::{AgentRunResult, AgentService};
