//! `chatrelay config`: Configuration management commands.

use chatrelay_config::AppConfig;

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{config:#?}");
    Ok(())
}

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   warning: {w}");
                }
            }

            println!();
            println!("   Provider:  {}", config.default_provider);
            println!("   Model:     {}", config.default_model);
            println!(
                "   Gateway:   {}:{}",
                config.gateway.host, config.gateway.port
            );
            println!("   Max loop:  {} rounds", config.agent.max_iterations);
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let dir = AppConfig::config_dir();
    let path = dir.join("config.toml");
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    tokio::fs::create_dir_all(&dir).await?;
    tokio::fs::write(&path, AppConfig::default_toml()).await?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Non-fatal problems worth pointing out.
fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if config.api_key_for(&config.default_provider).is_none() {
        warnings.push(format!(
            "No API key for '{}' (set ANTHROPIC_API_KEY, OPENAI_API_KEY or CHATRELAY_API_KEY)",
            config.default_provider
        ));
    }
    if config.agent.max_iterations == 0 {
        warnings.push("agent.max_iterations = 0 stops after the first tool round".to_string());
    }
    if config.gateway.host == "0.0.0.0" {
        warnings.push("Gateway bound to 0.0.0.0 is reachable from the network".to_string());
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_iterations_warns() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-test".into());
        config.agent.max_iterations = 0;
        let w = warnings(&config);
        assert_eq!(w.len(), 1);
        assert!(w[0].contains("max_iterations"));
    }
}
