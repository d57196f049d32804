//! `chatrelay models`: List configured adapters and their models.

use super::load_config;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let router = chatrelay_adapters::build_from_config(&config);

    for name in router.list() {
        let Some(adapter) = router.get(name) else {
            continue;
        };
        let marker = if name == config.default_provider { " (default)" } else { "" };
        println!("{name}{marker}");
        for model in adapter.models() {
            println!("  chat       {model}");
        }
        for model in adapter.embedding_models() {
            println!("  embedding  {model}");
        }
    }

    Ok(())
}
