//! Subcommand implementations.

pub mod chat;
pub mod config_cmd;
pub mod embed;
pub mod models;
pub mod serve;
pub mod summarize;

use std::sync::Arc;

use chatrelay_config::AppConfig;
use chatrelay_core::Adapter;

/// Load the configuration with a readable error.
pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// The adapter named `provider`, or the configured default.
pub fn resolve_adapter(
    config: &AppConfig,
    provider: Option<&str>,
) -> Result<Arc<dyn Adapter>, Box<dyn std::error::Error>> {
    let router = chatrelay_adapters::build_from_config(config);
    let name = provider.unwrap_or(config.default_provider.as_str());
    router.get(name).ok_or_else(|| {
        format!(
            "Adapter '{name}' is not configured. Available: {}",
            router.list().join(", ")
        )
        .into()
    })
}
