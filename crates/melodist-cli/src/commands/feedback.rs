//! Feedback log commands

use anyhow::Result;
use colored::Colorize;
use melodist_orchestrator::feedback::load_log;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::input::default_feedback_log;

/// List rejected compositions, oldest first
pub fn list(log: Option<&str>, json_output: bool) -> Result<ExitCode> {
    let path = match log {
        Some(p) => PathBuf::from(p),
        None => default_feedback_log()
            .ok_or_else(|| anyhow::anyhow!("no data directory; pass --log"))?,
    };
    let entries = load_log(&path);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{} {}", "Feedback log:".cyan().bold(), path.display());
    if entries.is_empty() {
        println!("  {}", "No rejected compositions".dimmed());
        return Ok(ExitCode::SUCCESS);
    }
    for entry in &entries {
        let notes = entry.notes.notes().count();
        println!(
            "  {} {} ({} notes) {}",
            entry.signature[..12].yellow(),
            entry.prompt,
            notes,
            entry.timestamp.dimmed()
        );
        if !entry.reason.is_empty() {
            println!("    {}: {}", "reason".dimmed(), entry.reason);
        }
    }
    println!(
        "  {} {}",
        entries.len(),
        if entries.len() == 1 { "entry" } else { "entries" }
    );

    Ok(ExitCode::SUCCESS)
}
