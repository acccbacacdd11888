//! Configuration loading and provider / embedder factories.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use prereq_core::generator::GeneratorConfig;
use prereq_core::similarity::{HashingEmbedder, DEFAULT_HASHING_DIMENSIONS};
use prereq_core::traits::{Embedder, LlmProvider};

use crate::gemini::GeminiProvider;
use crate::mock::MockProvider;
use crate::ollama::{OllamaEmbedder, OllamaProvider, DEFAULT_BASE_URL as OLLAMA_URL};
use crate::openai::{OpenAiEmbedder, OpenAiProvider};

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "prereq.toml";

/// Configuration for a single LLM provider.
///
/// Debug output masks API keys.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    Gemini {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
    /// Canned replies, no network.
    Mock {
        #[serde(default = "default_mock_response")]
        response: String,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::Gemini { base_url, .. } => f
                .debug_struct("Gemini")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::OpenAI {
                base_url, org_id, ..
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Mock { response } => f
                .debug_struct("Mock")
                .field("response", response)
                .finish(),
        }
    }
}

/// Which model produces the embeddings used for similarity scoring.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EmbeddingConfig {
    /// Local feature hashing; needs no network.
    Hashing {
        #[serde(default = "default_dimensions")]
        dimensions: usize,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
        model: String,
    },
    OpenAI {
        api_key: String,
        model: String,
        #[serde(default)]
        base_url: Option<String>,
    },
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig::Hashing {
            dimensions: DEFAULT_HASHING_DIMENSIONS,
        }
    }
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingConfig::Hashing { dimensions } => f
                .debug_struct("Hashing")
                .field("dimensions", dimensions)
                .finish(),
            EmbeddingConfig::Ollama { base_url, model } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .field("model", model)
                .finish(),
            EmbeddingConfig::OpenAI {
                model, base_url, ..
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("model", model)
                .field("base_url", base_url)
                .finish(),
        }
    }
}

/// Settings for the offline prerequisite generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Number of questions taken from the input file.
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Pause between consecutive API calls.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            delay_ms: default_delay_ms(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
        }
    }
}

/// Top-level prereq configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrereqConfig {
    /// Question dataset shown to annotators.
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
    /// Directory holding `annotations_<name>.csv` ledgers.
    #[serde(default = "default_ledger_dir")]
    pub ledger_dir: PathBuf,
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default = "default_provider")]
    pub default_provider: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Max retries on transient provider errors.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub generation: GenerationSettings,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

fn default_ollama_url() -> String {
    OLLAMA_URL.to_string()
}
fn default_mock_response() -> String {
    "None".to_string()
}
fn default_dimensions() -> usize {
    DEFAULT_HASHING_DIMENSIONS
}
fn default_limit() -> usize {
    200
}
fn default_delay_ms() -> u64 {
    5000
}
fn default_max_tokens() -> u32 {
    256
}
fn default_data_file() -> PathBuf {
    PathBuf::from("gsm8k_wrong_answers_with_missing_prerequisites.csv")
}
fn default_ledger_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_provider() -> String {
    "gemini".to_string()
}
fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_retries() -> u32 {
    2
}
fn default_retry_delay() -> u64 {
    1000
}

impl Default for PrereqConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            ledger_dir: default_ledger_dir(),
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
            generation: GenerationSettings::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl PrereqConfig {
    /// Generator settings for `model`, taken from this config.
    pub fn generator_config(&self, model: &str) -> GeneratorConfig {
        GeneratorConfig {
            model: model.to_string(),
            temperature: self.generation.temperature,
            max_tokens: self.generation.max_tokens,
            delay: Duration::from_millis(self.generation.delay_ms),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

/// Expand `${VAR_NAME}` references from the environment.
///
/// Unset variables expand to an empty string; an unterminated `${` is kept
/// as written.
fn resolve_env_vars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + 2 + len];
        out.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + 2 + len + 1..];
    }
    out.push_str(rest);
    out
}

fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::Gemini { api_key, base_url } => ProviderConfig::Gemini {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_deref().map(resolve_env_vars),
        },
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_deref().map(resolve_env_vars),
            org_id: org_id.as_deref().map(resolve_env_vars),
        },
        ProviderConfig::Ollama { base_url } => ProviderConfig::Ollama {
            base_url: resolve_env_vars(base_url),
        },
        ProviderConfig::Mock { response } => ProviderConfig::Mock {
            response: response.clone(),
        },
    }
}

fn resolve_embedding_config(config: &EmbeddingConfig) -> EmbeddingConfig {
    match config {
        EmbeddingConfig::Hashing { dimensions } => EmbeddingConfig::Hashing {
            dimensions: *dimensions,
        },
        EmbeddingConfig::Ollama { base_url, model } => EmbeddingConfig::Ollama {
            base_url: resolve_env_vars(base_url),
            model: resolve_env_vars(model),
        },
        EmbeddingConfig::OpenAI {
            api_key,
            model,
            base_url,
        } => EmbeddingConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            model: resolve_env_vars(model),
            base_url: base_url.as_deref().map(resolve_env_vars),
        },
    }
}

/// Apply `GEMINI_API_KEY` / `OPENAI_API_KEY` on top of the file contents.
fn apply_env_overrides(config: &mut PrereqConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(key) = lookup("GEMINI_API_KEY") {
        match config.providers.get_mut("gemini") {
            Some(ProviderConfig::Gemini { api_key, .. }) => *api_key = key,
            _ => {
                config.providers.insert(
                    "gemini".into(),
                    ProviderConfig::Gemini {
                        api_key: key,
                        base_url: None,
                    },
                );
            }
        }
    }

    if let Some(key) = lookup("OPENAI_API_KEY") {
        match config.providers.get_mut("openai") {
            Some(ProviderConfig::OpenAI { api_key, .. }) => *api_key = key,
            _ => {
                config.providers.insert(
                    "openai".into(),
                    ProviderConfig::OpenAI {
                        api_key: key,
                        base_url: None,
                        org_id: None,
                    },
                );
            }
        }
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `prereq.toml` in the current directory
/// 2. `~/.config/prereq/config.toml`
///
/// Environment variable overrides: `GEMINI_API_KEY`, `OPENAI_API_KEY`.
pub fn load_config() -> Result<PrereqConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<PrereqConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from(LOCAL_CONFIG_FILE);
            if local.exists() {
                Some(local)
            } else {
                global_config_path().filter(|p| p.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<PrereqConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => PrereqConfig::default(),
    };

    apply_env_overrides(&mut config, |name| {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    });

    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();
    config.embedding = resolve_embedding_config(&config.embedding);

    Ok(config)
}

fn global_config_path() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(|h| {
        PathBuf::from(h)
            .join(".config")
            .join("prereq")
            .join("config.toml")
    })
}

/// Create a provider instance from its configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    let provider: Arc<dyn LlmProvider> = match config {
        ProviderConfig::Gemini { api_key, base_url } => {
            anyhow::ensure!(
                !api_key.is_empty(),
                "gemini API key is empty; set GEMINI_API_KEY"
            );
            Arc::new(GeminiProvider::new(api_key, base_url.clone())?)
        }
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => Arc::new(OpenAiProvider::new(
            api_key,
            base_url.clone(),
            org_id.clone(),
        )?),
        ProviderConfig::Ollama { base_url } => Arc::new(OllamaProvider::new(base_url)?),
        ProviderConfig::Mock { response } => Arc::new(MockProvider::with_fixed_response(response)),
    };
    Ok(provider)
}

/// Look up a provider by name and build it.
///
/// `mock` works without any configuration.
pub fn resolve_provider(config: &PrereqConfig, name: &str) -> Result<Arc<dyn LlmProvider>> {
    match config.providers.get(name) {
        Some(provider) => create_provider(provider),
        None if name == "mock" => create_provider(&ProviderConfig::Mock {
            response: default_mock_response(),
        }),
        None => {
            let mut known: Vec<&str> = config.providers.keys().map(String::as_str).collect();
            known.sort_unstable();
            anyhow::bail!(
                "provider '{name}' is not configured (configured: [{}]); \
                 add it to {LOCAL_CONFIG_FILE} or set its API key variable",
                known.join(", ")
            )
        }
    }
}

/// Create the embedder used for similarity scoring.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config {
        EmbeddingConfig::Hashing { dimensions } => Arc::new(HashingEmbedder::new(*dimensions)),
        EmbeddingConfig::Ollama { base_url, model } => {
            Arc::new(OllamaEmbedder::new(base_url, model)?)
        }
        EmbeddingConfig::OpenAI {
            api_key,
            model,
            base_url,
        } => Arc::new(OpenAiEmbedder::new(api_key, model, base_url.clone())?),
    };
    Ok(embedder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_PREREQ_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_PREREQ_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_PREREQ_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("${_PREREQ_UNSET_VAR}x"), "x");
        assert_eq!(resolve_env_vars("open ${brace"), "open ${brace");
        std::env::remove_var("_PREREQ_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = PrereqConfig::default();
        assert_eq!(config.default_provider, "gemini");
        assert_eq!(config.generation.limit, 200);
        assert_eq!(config.generation.delay_ms, 5000);
        assert!(matches!(
            config.embedding,
            EmbeddingConfig::Hashing { dimensions: 384 }
        ));
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
data_file = "data/questions.csv"
ledger_dir = "ledgers"
default_provider = "ollama"
default_model = "gemma2:9b"

[providers.gemini]
type = "gemini"
api_key = "g-test"

[providers.ollama]
type = "ollama"

[generation]
limit = 10
delay_ms = 0

[embedding]
type = "ollama"
model = "nomic-embed-text"
"#;
        let config: PrereqConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.ledger_dir, PathBuf::from("ledgers"));
        assert_eq!(config.generation.limit, 10);
        assert_eq!(config.generation.max_tokens, 256);
        match &config.providers["ollama"] {
            ProviderConfig::Ollama { base_url } => assert_eq!(base_url, OLLAMA_URL),
            other => panic!("unexpected provider: {other:?}"),
        }
        assert!(matches!(config.embedding, EmbeddingConfig::Ollama { .. }));
    }

    #[test]
    fn debug_masks_keys() {
        let provider = ProviderConfig::Gemini {
            api_key: "secret-key".into(),
            base_url: None,
        };
        let embedding = EmbeddingConfig::OpenAI {
            api_key: "secret-key".into(),
            model: "text-embedding-3-small".into(),
            base_url: None,
        };
        assert!(!format!("{provider:?}").contains("secret-key"));
        assert!(!format!("{embedding:?}").contains("secret-key"));
    }

    #[test]
    fn env_overrides_insert_and_replace() {
        let mut config: PrereqConfig = toml::from_str(
            r#"
[providers.openai]
type = "openai"
api_key = "from-file"
base_url = "http://localhost:8080"
"#,
        )
        .unwrap();

        apply_env_overrides(&mut config, |name| match name {
            "GEMINI_API_KEY" => Some("g-env".into()),
            "OPENAI_API_KEY" => Some("o-env".into()),
            _ => None,
        });

        match &config.providers["gemini"] {
            ProviderConfig::Gemini { api_key, .. } => assert_eq!(api_key, "g-env"),
            other => panic!("unexpected provider: {other:?}"),
        }
        match &config.providers["openai"] {
            ProviderConfig::OpenAI {
                api_key, base_url, ..
            } => {
                assert_eq!(api_key, "o-env");
                assert_eq!(base_url.as_deref(), Some("http://localhost:8080"));
            }
            other => panic!("unexpected provider: {other:?}"),
        }
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = load_config_from(Some(Path::new("/nonexistent/prereq.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "default_model = \"gemini-1.5-pro\"\nmax_retries = 5\n").unwrap();

        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.default_model, "gemini-1.5-pro");
        assert_eq!(config.max_retries, 5);

        let gen = config.generator_config("m");
        assert_eq!(gen.model, "m");
        assert_eq!(gen.max_retries, 5);
        assert_eq!(gen.delay, Duration::from_secs(5));
    }

    #[test]
    fn mock_provider_needs_no_config() {
        let config = PrereqConfig::default();
        let provider = resolve_provider(&config, "mock").unwrap();
        assert_eq!(provider.name(), "mock");
    }

    #[test]
    fn unknown_provider_lists_configured_ones() {
        let mut config = PrereqConfig::default();
        config
            .providers
            .insert("ollama".into(), ProviderConfig::Ollama { base_url: String::new() });
        let err = match resolve_provider(&config, "anthropic") {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("[ollama]"));
    }

    #[test]
    fn empty_gemini_key_is_rejected() {
        let result = create_provider(&ProviderConfig::Gemini {
            api_key: String::new(),
            base_url: None,
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn hashing_embedder_from_config() {
        let embedder = create_embedder(&EmbeddingConfig::Hashing { dimensions: 32 }).unwrap();
        assert_eq!(embedder.name(), "hashing");
        assert_eq!(embedder.embed("Addition").await.unwrap().len(), 32);
    }
}
