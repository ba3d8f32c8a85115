//! Fingerprint command implementation
//!
//! Prints the cache key of a generation request and its normalized form.

use anyhow::{Context, Result};
use colored::Colorize;
use melodist_core::GenerationRequest;
use std::process::ExitCode;

use crate::input::json_text;

/// Run the fingerprint command
///
/// # Arguments
/// * `request` - Request JSON, inline or a file path
/// * `json_output` - Print `{fingerprint, normalized}` as JSON
pub fn run(request: &str, json_output: bool) -> Result<ExitCode> {
    let text = json_text(request)?;
    let request = GenerationRequest::from_json(&text).context("Failed to parse request")?;
    let normalized = request.normalize();
    let fingerprint = melodist_core::fingerprint(&normalized)?;

    if json_output {
        let output = serde_json::json!({
            "fingerprint": fingerprint.as_str(),
            "normalized": normalized.to_canonical_value(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{} {}", "Fingerprint:".cyan().bold(), fingerprint);
    println!("  {}: {}", "Prompt".dimmed(), normalized.prompt);
    if let Some(key) = &normalized.key {
        println!("  {}: {}", "Key".dimmed(), key);
    }
    match normalized.tempo {
        Some(bpm) => println!("  {}: {} bpm", "Tempo".dimmed(), bpm),
        None => println!("  {}: {}", "Tempo".dimmed(), "unset".dimmed()),
    }
    println!("  {}: {}", "Measures".dimmed(), normalized.measures);
    println!(
        "  {}: {}",
        "Layers".dimmed(),
        normalized
            .layers
            .iter()
            .map(|l| l.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  {}: 1/{}", "Grid".dimmed(), normalized.grid_resolution);
    if !normalized.example_melody.is_empty() {
        println!(
            "  {}: {} notes",
            "Example melody".dimmed(),
            normalized.example_melody.len()
        );
    }

    Ok(ExitCode::SUCCESS)
}
