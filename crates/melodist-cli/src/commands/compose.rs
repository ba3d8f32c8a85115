//! Compose command implementation
//!
//! Runs the full composer pipeline offline, with a replay file standing in
//! for the external generator.

use anyhow::{Context, Result};
use colored::Colorize;
use melodist_core::{Composition, GenerationRequest, Layer};
use melodist_orchestrator::{ComposeError, Composer, ReplayGenerator};
use std::path::Path;
use std::process::ExitCode;

use crate::input::{default_feedback_log, json_text, load_config};

/// Exit code when the composer is out of capacity and the caller should
/// retry later.
pub const EXIT_RETRY_LATER: u8 = 2;

/// Run the compose command
///
/// # Arguments
/// * `request` - Request JSON, inline or a file path
/// * `replay` - Path to canned generator output (one output or a sequence)
/// * `config` - Optional composer config file
/// * `reject` - Record the result as negative feedback with this reason
/// * `json_output` - Print the composition as JSON
///
/// # Returns
/// Exit code: 0 on success, 1 on generation failure, 2 when out of capacity
pub fn run(
    request: &str,
    replay: &str,
    config: Option<&str>,
    reject: Option<&str>,
    json_output: bool,
) -> Result<ExitCode> {
    let text = json_text(request)?;
    let request = GenerationRequest::from_json(&text).context("Failed to parse request")?;

    let mut config = load_config(config)?;
    if config.feedback.log_path.is_none() {
        config.feedback.log_path = default_feedback_log();
    }
    let generator = ReplayGenerator::from_path(Path::new(replay))
        .with_context(|| format!("Failed to load replay file: {}", replay))?;
    let composer = Composer::new(config, generator)?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;
    let result = rt.block_on(composer.compose(&request));

    let composition = match result {
        Ok(composition) => composition,
        Err(e) => return Ok(report_failure(&e, json_output)),
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&composition)?);
    } else {
        print_human(&composition, composer.usage().total_estimated_tokens_used);
    }

    if let Some(reason) = reject {
        let persisted = composer.reject(&request, &composition, reason)?;
        if !json_output {
            let status = if persisted {
                "recorded".green()
            } else {
                "kept in memory only".yellow()
            };
            println!("  {}: {}", "Rejected".dimmed(), status);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn report_failure(error: &ComposeError, json_output: bool) -> ExitCode {
    if json_output {
        let output = serde_json::json!({
            "error": error.to_string(),
            "retryLater": error.is_retry_later(),
        });
        println!("{}", output);
    } else {
        println!("{} {}", "FAILED".red().bold(), error);
        if error.is_retry_later() {
            println!("  {}", "the composer is at capacity; retry later".dimmed());
        }
    }
    if error.is_retry_later() {
        ExitCode::from(EXIT_RETRY_LATER)
    } else {
        ExitCode::from(1)
    }
}

fn print_human(composition: &Composition, tokens: u64) {
    println!(
        "{} {} bpm, {} beats",
        "Composition:".cyan().bold(),
        composition.tempo,
        composition.max_end()
    );
    for layer in Layer::ALL {
        let notes = composition.layer(layer);
        if notes.is_empty() {
            continue;
        }
        println!("  {} ({} notes)", layer.as_str().bold(), notes.len());
        for note in notes {
            println!(
                "    {:<4} {:>7.3} +{:<6.3} vel {:>3}",
                note.pitch, note.start, note.duration, note.velocity
            );
        }
    }
    println!("  {}: {}", "Estimated tokens".dimmed(), tokens);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn config(dir: &Path) -> String {
        let log = dir.join("feedback.json");
        write(
            dir,
            "config.json",
            &serde_json::json!({
                "admission": {"min_interval_ms": 0},
                "feedback": {"log_path": log}
            })
            .to_string(),
        )
    }

    #[test]
    fn test_compose_from_replay() {
        let dir = tempfile::tempdir().unwrap();
        let replay = write(
            dir.path(),
            "replay.json",
            r#"[{"note": "A3", "start": 0, "duration": 1}]"#,
        );
        let config = config(dir.path());
        let code = run(
            r#"{"prompt": "dark trap melody, 140 bpm", "measures": 8}"#,
            &replay,
            Some(&config),
            Some("too plain"),
            false,
        )
        .unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
        assert!(dir.path().join("feedback.json").is_file());
    }

    #[test]
    fn test_malformed_replay_fails() {
        let dir = tempfile::tempdir().unwrap();
        let replay = write(dir.path(), "replay.json", r#""just text""#);
        let config = config(dir.path());
        let code = run(r#"{"prompt": "lofi"}"#, &replay, Some(&config), None, true).unwrap();
        assert_eq!(code, ExitCode::from(1));
    }

    #[test]
    fn test_usage_budget_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let replay = write(dir.path(), "replay.json", "[]");
        let config = write(
            dir.path(),
            "budget.json",
            r#"{"admission": {"daily_token_budget": 1, "min_interval_ms": 0}}"#,
        );
        let code = run(r#"{"prompt": "lofi"}"#, &replay, Some(&config), None, true).unwrap();
        assert_eq!(code, ExitCode::from(EXIT_RETRY_LATER));
    }
}
