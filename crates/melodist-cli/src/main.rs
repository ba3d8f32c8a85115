//! Melodist CLI - Command-line interface for the composer pipeline
//!
//! This binary exposes request fingerprinting, note validation, chord and
//! example selection, offline composition and the feedback log.

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use melodist_cli::commands;

/// Melodist - Prompt-driven composition tooling
#[derive(Parser)]
#[command(name = "melodist")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the cache fingerprint of a generation request
    Fingerprint {
        /// Request JSON (inline or file path)
        #[arg(short, long)]
        request: String,

        /// Output machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Run raw notes through the validator
    Validate {
        /// Note array JSON (inline or file path)
        #[arg(short, long)]
        notes: String,

        /// Key, e.g. "A minor" or "F#"
        #[arg(short, long, default_value = "C major")]
        key: String,

        /// Number of 4/4 measures
        #[arg(short, long, default_value = "4")]
        measures: u32,

        /// Quantize to the grid and apply scale and interval correction
        #[arg(long)]
        strict: bool,

        /// Grid denominator (16 = sixteenth notes)
        #[arg(long, default_value = "16")]
        grid: u32,

        /// Treat the notes as a chord layer
        #[arg(long)]
        chords: bool,

        /// Backfill short strict results up to this many notes
        #[arg(long)]
        min_notes: Option<usize>,

        /// Output machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Pick chord progressions for a prompt
    Chords {
        /// Prompt text
        #[arg(short, long)]
        prompt: String,

        /// Key, overriding the one detected in the prompt
        #[arg(short, long)]
        key: Option<String>,

        /// Candidate progressions as a JSON array of strings
        #[arg(long)]
        suggestions: Option<String>,

        /// Number of sections (1-3)
        #[arg(long, default_value = "3")]
        sections: usize,

        /// Output machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Rank training examples against a prompt
    Examples {
        /// Corpus JSON (inline or file path)
        #[arg(short, long)]
        corpus: String,

        /// Prompt text
        #[arg(short, long)]
        prompt: String,

        /// Key, overriding the one detected in the prompt
        #[arg(short, long)]
        key: Option<String>,

        /// Number of examples to return
        #[arg(long, default_value = "3")]
        max: usize,

        /// Output machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Compose offline from canned generator output
    Compose {
        /// Request JSON (inline or file path)
        #[arg(short, long)]
        request: String,

        /// Generator replay file
        #[arg(long)]
        replay: String,

        /// Composer config file
        #[arg(short, long)]
        config: Option<String>,

        /// Reject the result with this reason
        #[arg(long, value_name = "REASON")]
        reject: Option<String>,

        /// Output machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect the negative feedback log
    Feedback {
        #[command(subcommand)]
        command: FeedbackCommands,
    },
}

#[derive(Subcommand)]
enum FeedbackCommands {
    /// List rejected compositions
    List {
        /// Feedback log path (default: platform data directory)
        #[arg(long)]
        log: Option<String>,

        /// Output machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Fingerprint { request, json } => commands::fingerprint::run(&request, json),
        Commands::Validate {
            notes,
            key,
            measures,
            strict,
            grid,
            chords,
            min_notes,
            json,
        } => commands::validate::run(
            &commands::validate::ValidateArgs {
                notes: &notes,
                key: &key,
                measures,
                strict,
                grid,
                polyphonic: chords,
                min_notes,
            },
            json,
        ),
        Commands::Chords {
            prompt,
            key,
            suggestions,
            sections,
            json,
        } => commands::chords::run(
            &prompt,
            key.as_deref(),
            suggestions.as_deref(),
            sections,
            json,
        ),
        Commands::Examples {
            corpus,
            prompt,
            key,
            max,
            json,
        } => commands::examples::run(&corpus, &prompt, key.as_deref(), max, json),
        Commands::Compose {
            request,
            replay,
            config,
            reject,
            json,
        } => commands::compose::run(
            &request,
            &replay,
            config.as_deref(),
            reject.as_deref(),
            json,
        ),
        Commands::Feedback { command } => match command {
            FeedbackCommands::List { log, json } => commands::feedback::list(log.as_deref(), json),
        },
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", colored::Colorize::red("error"), e);
            ExitCode::from(1)
        }
    }
}
