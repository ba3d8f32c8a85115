//! Chords command implementation

use anyhow::Result;
use colored::Colorize;
use melodist_core::{analyze_prompt, Key};
use melodist_orchestrator::{ChordProgressionSelector, ChordQuery};
use std::process::ExitCode;

use crate::input::json_array;

/// Run the chords command
///
/// # Arguments
/// * `prompt` - Prompt text; mood, instrument and key are read from it
/// * `key` - Explicit key, overriding the one detected in the prompt
/// * `suggestions` - JSON array of candidate progressions
/// * `sections` - Number of sections (1-3)
/// * `json_output` - Print the progressions as JSON
pub fn run(
    prompt: &str,
    key: Option<&str>,
    suggestions: Option<&str>,
    sections: usize,
    json_output: bool,
) -> Result<ExitCode> {
    let analysis = analyze_prompt(prompt);
    let key = match key {
        Some(name) => {
            Key::parse(name).ok_or_else(|| anyhow::anyhow!("unrecognized key: {}", name))?
        }
        None => analysis.key.unwrap_or_default(),
    };

    let suggestions: Vec<String> = match suggestions {
        Some(arg) => json_array(arg)?
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        None => Vec::new(),
    };

    let mut query = ChordQuery::new(prompt, &key, analysis.mood).instrument(analysis.instrument);
    if !suggestions.is_empty() {
        query = query.suggestions(&suggestions);
    }
    let selector = ChordProgressionSelector::new(sections);
    let progressions = selector.select(&query, &mut rand::thread_rng());

    if json_output {
        let output = serde_json::json!({
            "key": key.to_string(),
            "mood": analysis.mood,
            "progressions": progressions,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{} {} ({})",
        "Chords for".cyan().bold(),
        key,
        analysis.mood.as_str()
    );
    for (label, progression) in melodist_orchestrator::chords::SECTION_LABELS
        .iter()
        .zip(&progressions)
    {
        println!("  {} {}", format!("[{}]", label).dimmed(), progression);
    }

    Ok(ExitCode::SUCCESS)
}
