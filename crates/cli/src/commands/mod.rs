pub mod chat;
pub mod config_cmd;
pub mod digest;
pub mod feeds;
pub mod serve;

use feedloom_config::AppConfig;
use feedloom_gateway::AppState;

/// Config from `~/.feedloom/config.toml` plus environment overrides.
pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load().map_err(|e| format!("Failed to load config: {e}").into())
}

/// Store, models and services for a one-shot command.
pub async fn load_state() -> Result<AppState, Box<dyn std::error::Error>> {
    let config = load_config()?;
    Ok(AppState::build(config).await?)
}
