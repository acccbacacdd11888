//! The `prereq list-models` command.

use std::path::PathBuf;

use anyhow::Result;

use prereq_core::traits::ModelInfo;
use prereq_providers::config::load_config_from;
use prereq_providers::ollama::OllamaProvider;
use prereq_providers::{create_provider, ProviderConfig};

pub async fn execute(provider_filter: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;

    let mut names: Vec<&String> = config.providers.keys().collect();
    names.sort();

    let mut found_any = false;
    for name in names {
        if provider_filter.as_ref().is_some_and(|f| f != name) {
            continue;
        }

        let models = match list_models(&config.providers[name]).await {
            Ok(models) => models,
            Err(e) => {
                eprintln!("Provider {name}: {e:#}");
                continue;
            }
        };

        if !models.is_empty() {
            found_any = true;
            println!("Provider: {name}");
            for model in &models {
                if model.max_context > 0 {
                    println!(
                        "  {} - {} ({}K context)",
                        model.id,
                        model.name,
                        model.max_context / 1000
                    );
                } else {
                    println!("  {}", model.id);
                }
            }
            println!();
        }
    }

    if !found_any {
        println!("No providers configured. Run `prereq init` to create a config file.");
    }

    Ok(())
}

async fn list_models(config: &ProviderConfig) -> Result<Vec<ModelInfo>> {
    match config {
        ProviderConfig::Ollama { base_url } => {
            OllamaProvider::new(base_url)?.list_models_async().await
        }
        other => Ok(create_provider(other)?.available_models()),
    }
}
