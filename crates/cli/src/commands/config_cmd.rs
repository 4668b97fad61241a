//! `feedloom config`: configuration management commands.

use feedloom_config::{AppConfig, EmbeddingBackend, ModelKind, StoreBackend};

pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if !config_dir.exists() {
        tokio::fs::create_dir_all(&config_dir).await?;
        println!("✅ Created config directory: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete it and re-run `feedloom config init`.");
        return Ok(());
    }

    tokio::fs::write(&config_path, AppConfig::default_toml()).await?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!();
    println!("📝 Next steps:");
    println!("   1. Set DEEPSEEK_KEY (or another model's key) in your environment");
    println!("   2. Run: feedloom ingest --source <feed url> entries.json");
    println!("   3. Run: feedloom recommend");
    Ok(())
}

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed successfully");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Model:      {}", config.default_model_type);
    println!("   Models:     {}", config.models.keys().cloned().collect::<Vec<_>>().join(", "));
    println!("   Store:      {:?}", config.store.backend);
    println!("   Embedding:  {:?}", config.embedding.backend);
    println!("   Gateway:    {}:{}", config.gateway.host, config.gateway.port);
    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

/// Problems that don't stop the config from loading.
fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Some(default) = config.models.get(&config.default_model_type) {
        let local = default.api_url.contains("localhost") || default.api_url.contains("127.0.0.1");
        if default.api_key.is_none() && !local {
            warnings.push(format!("No API key for default model type '{}'", config.default_model_type));
        }
    }

    for (name, model) in &config.models {
        if model.kind == ModelKind::Polling && model.bot_id.is_none() {
            warnings.push(format!("models.{name} has no bot_id (set COZE_BOT_ID)"));
        }
    }

    if config.embedding.backend == EmbeddingBackend::Provider && !config.models.contains_key(&config.embedding.model_type) {
        warnings.push(format!(
            "embedding.model_type '{}' has no [models.{}] entry",
            config.embedding.model_type, config.embedding.model_type
        ));
    }

    if config.store.backend == StoreBackend::Memory {
        warnings.push("Feed store is in memory; items are lost on exit".into());
    }

    if config.gateway.host == "0.0.0.0" {
        warnings.push("Gateway bound to 0.0.0.0 is reachable from other hosts".into());
    }

    warnings
}
