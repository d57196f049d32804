//! `chatrelay embed`: Create embeddings for some text.

use chatrelay_core::EmbeddingOptions;

use super::{load_config, resolve_adapter};

pub async fn run(
    input: Vec<String>,
    provider: String,
    model: String,
    dimensions: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let adapter = resolve_adapter(&config, Some(provider.as_str()))?;

    let result = adapter
        .create_embeddings(&EmbeddingOptions {
            model,
            input: input.clone(),
            dimensions,
        })
        .await?;

    for (text, embedding) in input.iter().zip(&result.embeddings) {
        let preview: Vec<String> = embedding.iter().take(4).map(|v| format!("{v:.4}")).collect();
        println!("{text}: [{}, …] ({} dims)", preview.join(", "), embedding.len());
    }
    eprintln!("  [{} · {} tokens]", result.model, result.usage.total_tokens);

    Ok(())
}
