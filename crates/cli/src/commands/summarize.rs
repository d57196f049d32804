//! `chatrelay summarize`: Summarize a file or stdin.

use std::path::PathBuf;

use chatrelay_core::{SummarizationOptions, SummaryStyle};
use tokio::io::AsyncReadExt;

use super::{load_config, resolve_adapter};

pub struct Args {
    pub file: Option<PathBuf>,
    pub style: String,
    pub max_length: Option<u32>,
    pub focus: Vec<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
}

/// Parse a style name as accepted on the command line.
pub fn parse_style(style: &str) -> Result<SummaryStyle, String> {
    match style {
        "bullet-points" | "bullets" => Ok(SummaryStyle::BulletPoints),
        "paragraph" => Ok(SummaryStyle::Paragraph),
        "concise" => Ok(SummaryStyle::Concise),
        other => Err(format!(
            "Unknown style '{other}'. Use 'bullet-points', 'paragraph', or 'concise'."
        )),
    }
}

pub async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let adapter = resolve_adapter(&config, args.provider.as_deref())?;
    let style = parse_style(&args.style)?;

    let text = match &args.file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };
    if text.trim().is_empty() {
        return Err("Nothing to summarize".into());
    }

    let mut options = SummarizationOptions::new(
        args.model.unwrap_or_else(|| config.default_model.clone()),
        text,
    );
    options.style = style;
    options.max_length = args.max_length;
    options.focus = args.focus;

    let result = adapter.summarize(&options).await?;
    println!("{}", result.summary);
    eprintln!(
        "  [{} · {} prompt + {} completion tokens]",
        result.model, result.usage.prompt_tokens, result.usage.completion_tokens
    );

    Ok(())
}
