//! Adapter router: builds adapters from config and looks them up by name.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chatrelay_config::{AppConfig, ProviderConfig};
use chatrelay_core::Adapter;

use crate::anthropic::AnthropicAdapter;
use crate::config::AdapterConfig;
use crate::openai::OpenAiAdapter;

/// Routes requests to the configured adapters.
pub struct AdapterRouter {
    adapters: HashMap<String, Arc<dyn Adapter>>,
    default_adapter: String,
}

impl AdapterRouter {
    /// Create a new router with a default adapter name.
    pub fn new(default_adapter: impl Into<String>) -> Self {
        Self {
            adapters: HashMap::new(),
            default_adapter: default_adapter.into(),
        }
    }

    /// Register an adapter.
    pub fn register(&mut self, name: impl Into<String>, adapter: Arc<dyn Adapter>) {
        self.adapters.insert(name.into(), adapter);
    }

    /// Get the default adapter.
    pub fn default(&self) -> Option<Arc<dyn Adapter>> {
        self.adapters.get(&self.default_adapter).cloned()
    }

    /// Get a specific adapter by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters.get(name).cloned()
    }

    /// List all registered adapter names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn adapter_config(api_key: Option<String>, provider: Option<&ProviderConfig>) -> AdapterConfig {
    let mut cfg = AdapterConfig::new(api_key.unwrap_or_default());
    if let Some(p) = provider {
        if let Some(url) = &p.base_url {
            cfg = cfg.with_base_url(url);
        }
        if let Some(secs) = p.timeout_secs {
            cfg = cfg.with_timeout(Duration::from_secs(secs));
        }
        for (name, value) in &p.headers {
            cfg = cfg.with_header(name, value);
        }
    }
    cfg
}

fn build_adapter(name: &str, cfg: AdapterConfig) -> Arc<dyn Adapter> {
    match name {
        "anthropic" => Arc::new(AnthropicAdapter::new(cfg)),
        "openai" => Arc::new(OpenAiAdapter::new(cfg)),
        // Everything else is assumed to speak the OpenAI wire format.
        other => Arc::new(OpenAiAdapter::named(other, cfg)),
    }
}

/// Build adapters from configuration.
pub fn build_from_config(config: &AppConfig) -> AdapterRouter {
    let mut router = AdapterRouter::new(&config.default_provider);

    for (name, provider_config) in &config.providers {
        let cfg = adapter_config(config.api_key_for(name), Some(provider_config));
        router.register(name.clone(), build_adapter(name, cfg));
    }

    // Ensure the default adapter exists (even if not explicitly configured)
    if router.get(&config.default_provider).is_none() {
        let cfg = adapter_config(config.api_key_for(&config.default_provider), None);
        router.register(
            config.default_provider.clone(),
            build_adapter(&config.default_provider, cfg),
        );
    }

    router
}
