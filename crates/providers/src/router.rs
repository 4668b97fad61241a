//! Provider router: maps a model type name to a backend and model id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use feedloom_config::{AppConfig, ModelConfig, ModelKind};
use feedloom_core::error::ProviderError;
use feedloom_core::provider::Provider;
use tracing::debug;

use crate::openai_compat::OpenAiCompatProvider;
use crate::polling::PollingProvider;

/// A backend together with the model id to request from it.
#[derive(Clone)]
pub struct ResolvedModel {
    pub provider: Arc<dyn Provider>,
    pub model: String,
}

impl std::fmt::Debug for ResolvedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedModel")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish()
    }
}

pub struct ProviderRouter {
    models: HashMap<String, ResolvedModel>,
    default_model_type: String,
}

impl ProviderRouter {
    pub fn new(default_model_type: impl Into<String>) -> Self {
        Self {
            models: HashMap::new(),
            default_model_type: default_model_type.into(),
        }
    }

    pub fn register(&mut self, model_type: impl Into<String>, provider: Arc<dyn Provider>, model: impl Into<String>) {
        self.models.insert(
            model_type.into(),
            ResolvedModel {
                provider,
                model: model.into(),
            },
        );
    }

    pub fn default_model_type(&self) -> &str {
        &self.default_model_type
    }

    /// Resolve a model type; `None` or a blank name means the default.
    pub fn resolve(&self, model_type: Option<&str>) -> Result<ResolvedModel, ProviderError> {
        let name = model_type
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.default_model_type);
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::ModelNotFound(name.to_string()))
    }

    /// Registered model type names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn build_provider(name: &str, model: &ModelConfig) -> Arc<dyn Provider> {
    match model.kind {
        ModelKind::Openai => Arc::new(OpenAiCompatProvider::new(
            name,
            &model.api_url,
            model.api_key.clone().unwrap_or_default(),
        )),
        ModelKind::Polling => Arc::new(
            PollingProvider::new(
                name,
                &model.api_url,
                model.api_key.clone().unwrap_or_default(),
                model.bot_id.clone().unwrap_or_default(),
                model.user_id.clone().unwrap_or_default(),
            )
            .with_polling(
                Duration::from_secs(model.poll_interval_secs),
                Duration::from_secs(model.timeout_secs),
            ),
        ),
    }
}

/// Build one backend per `[models.*]` entry.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_model_type);
    for (name, model) in &config.models {
        debug!(model_type = %name, kind = ?model.kind, model = %model.model, "Registering model backend");
        router.register(name.clone(), build_provider(name, model), model.model.clone());
    }
    router
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_every_configured_model() {
        let router = build_from_config(&AppConfig::default());
        assert_eq!(router.list(), vec!["coze", "deepseek", "ollama", "openai"]);
        let resolved = router.resolve(Some("ollama")).unwrap();
        assert_eq!(resolved.model, "qwen3:8b");
        assert_eq!(resolved.provider.name(), "ollama");
    }

    #[test]
    fn missing_or_blank_type_uses_default() {
        let router = build_from_config(&AppConfig::default());
        assert_eq!(router.resolve(None).unwrap().model, "deepseek-chat");
        assert_eq!(router.resolve(Some("  ")).unwrap().model, "deepseek-chat");
    }

    #[test]
    fn unknown_type_is_model_not_found() {
        let router = build_from_config(&AppConfig::default());
        let err = router.resolve(Some("gemini")).unwrap_err();
        assert!(matches!(err, ProviderError::ModelNotFound(ref name) if name == "gemini"));
        assert_eq!(err.to_string(), "Unknown model type: gemini");
    }

    #[test]
    fn polling_models_get_polling_backend() {
        let router = build_from_config(&AppConfig::default());
        assert_eq!(router.resolve(Some("coze")).unwrap().provider.name(), "coze");
    }
}
