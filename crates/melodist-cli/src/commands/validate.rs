//! Validate command implementation
//!
//! Runs raw generator notes through the correction pipeline and prints the
//! surviving notes with a per-stage report.

use anyhow::Result;
use colored::Colorize;
use melodist_core::{beat_budget, Key, MelodyValidator, ValidationOptions, ValidationReport};
use std::process::ExitCode;

use crate::input::json_array;

/// Validator settings taken from the command line.
#[derive(Debug, Clone)]
pub struct ValidateArgs<'a> {
    pub notes: &'a str,
    pub key: &'a str,
    pub measures: u32,
    pub strict: bool,
    pub grid: u32,
    /// Treat the notes as a chord layer (no interval clamp).
    pub polyphonic: bool,
    pub min_notes: Option<usize>,
}

/// Run the validate command
///
/// # Returns
/// Exit code: 0 if any note survived, 1 otherwise
pub fn run(args: &ValidateArgs<'_>, json_output: bool) -> Result<ExitCode> {
    let raw = json_array(args.notes)?;
    let key = Key::parse(args.key)
        .ok_or_else(|| anyhow::anyhow!("unrecognized key: {} (try \"A minor\" or \"F#\")", args.key))?;
    let options = options_for(args);

    let validated = MelodyValidator::new(key, options).validate(&raw);
    let survived = !validated.notes.is_empty();

    if json_output {
        let output = serde_json::json!({
            "key": key.to_string(),
            "notes": validated.notes,
            "report": validated.report,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_human(&key, args, &validated.notes, &validated.report);
    }

    Ok(if survived {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn options_for(args: &ValidateArgs<'_>) -> ValidationOptions {
    let budget = beat_budget(args.measures.max(1));
    let grid = args.grid.clamp(1, 64);
    let mut options = if args.strict {
        ValidationOptions::strict(budget, 4.0 / f64::from(grid))
    } else {
        ValidationOptions::new(budget)
    };
    options = options.monophonic(!args.polyphonic);
    if let Some(min) = args.min_notes {
        options = options.min_notes(min);
    }
    options
}

fn print_human(
    key: &Key,
    args: &ValidateArgs<'_>,
    notes: &[melodist_core::Note],
    report: &ValidationReport,
) {
    println!(
        "{} {} notes in {}, {} measures ({})",
        "Validating:".cyan().bold(),
        report.input_notes,
        key,
        args.measures,
        if args.strict { "strict" } else { "preserve" }
    );

    let stages = [
        ("malformed", report.malformed),
        ("out of range", report.out_of_range),
        ("off grid", report.off_grid_dropped),
        ("pitches snapped", report.pitches_snapped),
        ("intervals clamped", report.intervals_clamped),
        ("duplicates", report.duplicates),
        ("backfilled", report.backfilled),
        ("dropped at finalize", report.final_dropped),
    ];
    for (label, count) in stages.iter().filter(|(_, count)| *count > 0) {
        println!("  {} {}: {}", "!".yellow(), label, count);
    }

    for note in notes {
        println!(
            "  {:<4} {:>7.3} +{:<6.3} vel {:>3}{}",
            note.pitch,
            note.start,
            note.duration,
            note.velocity,
            if note.slide { " slide" } else { "" }
        );
    }

    if notes.is_empty() {
        println!("{} no notes survived validation", "FAILED".red().bold());
    } else {
        println!(
            "{} {} notes",
            "SUCCESS".green().bold(),
            report.output_notes
        );
    }
}
