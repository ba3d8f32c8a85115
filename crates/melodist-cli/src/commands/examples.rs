//! Examples command implementation
//!
//! Ranks a training corpus against a prompt the way the composer does when
//! few-shot guidance is enabled.

use anyhow::{Context, Result};
use colored::Colorize;
use melodist_core::{analyze_prompt, Key};
use melodist_orchestrator::fewshot::{parse_corpus, score_example};
use melodist_orchestrator::{FewShotSelector, SelectionContext};
use std::process::ExitCode;

use crate::input::json_text;

/// Run the examples command
///
/// # Arguments
/// * `corpus` - Corpus JSON (array of training examples), inline or a path
/// * `prompt` - Prompt to rank against
/// * `key` - Explicit key, overriding the one detected in the prompt
/// * `max` - Number of examples to return
/// * `json_output` - Print the selected examples as JSON
pub fn run(
    corpus: &str,
    prompt: &str,
    key: Option<&str>,
    max: usize,
    json_output: bool,
) -> Result<ExitCode> {
    let text = json_text(corpus)?;
    let examples = parse_corpus(&text).context("Failed to parse corpus")?;

    let analysis = analyze_prompt(prompt);
    let mut context = SelectionContext::from_analysis(prompt, &analysis);
    if let Some(name) = key {
        let key = Key::parse(name).ok_or_else(|| anyhow::anyhow!("unrecognized key: {}", name))?;
        context = context.with_key(key);
    }

    let selected = FewShotSelector::new(max).select(&examples, &context);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&selected)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{} {} of {} examples",
        "Selected".cyan().bold(),
        selected.len(),
        examples.len()
    );
    for example in &selected {
        let score = score_example(example, &context);
        println!(
            "  {:>5.2}  {} {}",
            score,
            example.input.prompt,
            example
                .metadata
                .instrument
                .as_deref()
                .map(|i| format!("({})", i))
                .unwrap_or_default()
                .dimmed()
        );
    }

    Ok(ExitCode::SUCCESS)
}
