//! prereq-providers: LLM and embedding provider integrations.
//!
//! Implements `LlmProvider` for Gemini, OpenAI-compatible APIs and Ollama,
//! and `Embedder` for the remote embedding endpoints, plus config loading.

pub mod config;
pub mod gemini;
mod http;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use config::{
    create_embedder, create_provider, load_config, load_config_from, resolve_provider,
    EmbeddingConfig, GenerationSettings, PrereqConfig, ProviderConfig,
};
pub use prereq_core::error::ProviderError;
