//! The `prereq init` command.

use std::path::Path;

use anyhow::Result;

use prereq_providers::config::LOCAL_CONFIG_FILE;

pub fn execute() -> Result<()> {
    if Path::new(LOCAL_CONFIG_FILE).exists() {
        println!("{LOCAL_CONFIG_FILE} already exists, skipping.");
    } else {
        std::fs::write(LOCAL_CONFIG_FILE, SAMPLE_CONFIG)?;
        println!("Created {LOCAL_CONFIG_FILE}");
    }

    println!("\nNext steps:");
    println!("  1. Point data_file at your question CSV and export GEMINI_API_KEY");
    println!("  2. Run: prereq annotate");
    println!("  3. Run: prereq merge --output merged.csv");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# prereq configuration

data_file = "gsm8k_wrong_answers_with_missing_prerequisites.csv"
ledger_dir = "."
default_provider = "gemini"
default_model = "gemini-2.0-flash"
max_retries = 2
retry_delay_ms = 1000

[providers.gemini]
type = "gemini"
api_key = "${GEMINI_API_KEY}"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"

[generation]
limit = 200
delay_ms = 5000
temperature = 0.0
max_tokens = 256

# Similarity model. "hashing" runs locally; "ollama" and "openai" call an
# embeddings endpoint, e.g.
#   type = "ollama"
#   model = "nomic-embed-text"
[embedding]
type = "hashing"
dimensions = 384
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use prereq_providers::{EmbeddingConfig, PrereqConfig, ProviderConfig};

    #[test]
    fn sample_config_parses() {
        let config: PrereqConfig = toml::from_str(SAMPLE_CONFIG).unwrap();
        assert_eq!(config.providers.len(), 3);
        assert_eq!(config.default_provider, "gemini");
        assert!(matches!(
            config.providers.get("gemini"),
            Some(ProviderConfig::Gemini { .. })
        ));
        assert!(matches!(
            config.embedding,
            EmbeddingConfig::Hashing { dimensions: 384 }
        ));
    }
}
