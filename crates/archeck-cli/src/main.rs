//! archeck - check natural-language answers against a formal business policy.
//!
//! Exit codes: 0 when the final answer is valid, 1 when it is invalid,
//! 2 when the validator was inconclusive.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use archeck_core::{Feedback, InteractionId, Verdict};
use archeck_runtime::{
    LlmUsage, ProviderRegistry, RefinementOutcome, RefinementPolicy, RuntimeConfig,
    ValidatorConfig,
};

#[derive(Parser)]
#[command(name = "archeck")]
#[command(about = "Check answers against a formal business policy", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging and print answerer usage (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a recorded findings payload without calling any service
    Classify {
        /// JSON file holding a validator response
        payload: PathBuf,

        /// Answer text the payload refers to
        #[arg(long, default_value = "")]
        answer: String,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Ask (or record) a question, validate the answer and optionally rewrite it
    Ask {
        /// Runtime configuration (YAML)
        #[arg(short, long)]
        config: PathBuf,

        #[arg(short, long)]
        question: String,

        /// Use this answer instead of asking the answering service
        #[arg(short, long)]
        answer: Option<String>,

        /// Rewrite invalid answers until they pass or the round budget runs out
        #[arg(long)]
        rewrite: bool,

        /// Override refinement.max_rounds from the config
        #[arg(long)]
        max_rounds: Option<u32>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Check a configuration file
    Config {
        path: PathBuf,

        /// Print the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "archeck={lvl},archeck_core={lvl},archeck_runtime={lvl}",
            lvl = default_level
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Classify {
            payload,
            answer,
            format,
        } => classify(&payload, &answer, format),
        Commands::Ask {
            config,
            question,
            answer,
            rewrite,
            max_rounds,
            format,
        } => {
            ask(
                &config,
                &question,
                answer.as_deref(),
                rewrite,
                max_rounds,
                format,
                cli.verbose,
            )
            .await
        }
        Commands::Config { path, show } => check_config(&path, show).await,
    }
}

fn classify(path: &Path, answer: &str, format: OutputFormat) -> Result<ExitCode> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let payload: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;

    let feedback = Feedback::parse(InteractionId::new(), answer, payload)
        .context("Validator payload rejected")?;

    match format {
        OutputFormat::Text => print_feedback(&feedback),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&feedback)?),
    }

    Ok(exit_code(feedback.verdict()))
}

#[derive(Serialize)]
struct AskReport<'a> {
    question: &'a str,
    answer: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    rewritten_answer: Option<&'a str>,
    feedback: &'a Feedback,
}

async fn ask(
    config_path: &Path,
    question: &str,
    answer: Option<&str>,
    rewrite: bool,
    max_rounds: Option<u32>,
    format: OutputFormat,
    verbose: bool,
) -> Result<ExitCode> {
    let config = RuntimeConfig::from_yaml_file(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let mut session = config.build_session(&ProviderRegistry::with_defaults())?;

    let interaction = match answer {
        Some(answer) => session.add_qa(question, answer)?,
        None => session.ask_question(question).await?,
    };

    if rewrite {
        let policy = max_rounds
            .map(RefinementPolicy::new)
            .unwrap_or(config.refinement);
        let outcome = session.refine(&interaction, policy).await?;

        match format {
            OutputFormat::Text => print_outcome(question, interaction.answer(), &outcome),
            OutputFormat::Json => {
                let report = AskReport {
                    question,
                    answer: interaction.answer(),
                    rewritten_answer: outcome.final_answer().filter(|_| outcome.rewrites() > 0),
                    feedback: &outcome.final_feedback,
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
        if verbose {
            print_usage(session.answerer_usage());
        }
        return Ok(exit_code(outcome.final_feedback.verdict()));
    }

    let feedback = session.validate_interaction(&interaction).await?;
    match format {
        OutputFormat::Text => {
            println!("Q: {}", question);
            println!("A: {}", interaction.answer());
            println!();
            print_feedback(&feedback);
        }
        OutputFormat::Json => {
            let report = AskReport {
                question,
                answer: interaction.answer(),
                rewritten_answer: None,
                feedback: &feedback,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    if verbose {
        print_usage(session.answerer_usage());
    }

    Ok(exit_code(feedback.verdict()))
}

async fn check_config(path: &Path, show: bool) -> Result<ExitCode> {
    let config = RuntimeConfig::from_yaml_file(path)
        .with_context(|| format!("Invalid configuration {}", path.display()))?;
    let registry = ProviderRegistry::with_defaults();

    println!("Configuration OK: {}", path.display());
    println!(
        "  policy:     {} (version {})",
        config.policy.policy_id, config.policy.policy_version
    );
    if let Some(guardrail) = &config.policy.guardrail_id {
        println!(
            "  guardrail:  {} ({})",
            guardrail,
            config.policy.guardrail_version.as_deref().unwrap_or("unversioned")
        );
    }
    let provider = &config.answerer.provider;
    let status = match registry.description(provider) {
        None => "provider not available in this build".to_string(),
        Some(description) => {
            match registry
                .health_check(provider, &config.answerer.provider_config)
                .await
            {
                Ok(true) => format!("{}, ready", description),
                Ok(false) => format!("{}, not ready", description),
                Err(e) => format!("{}, {}", description, e),
            }
        }
    };
    println!(
        "  answerer:   {} / {} ({})",
        provider, config.answerer.model, status
    );
    match &config.validator {
        ValidatorConfig::Http { endpoint, .. } => println!("  validator:  http {}", endpoint),
        ValidatorConfig::Replay { path } => println!("  validator:  replay {}", path.display()),
    }
    println!("  max rounds: {}", config.refinement.max_rounds);

    if show {
        println!();
        print!("{}", serde_yaml::to_string(&config)?);
    }

    Ok(ExitCode::SUCCESS)
}

/// Written to stderr; stdout carries the report.
fn print_usage(usage: Option<LlmUsage>) {
    if let Some(usage) = usage {
        eprintln!(
            "Usage: {} LLM calls, {} tokens ({} prompt, {} completion), ~${:.4}",
            usage.llm_calls,
            usage.total_tokens,
            usage.prompt_tokens,
            usage.completion_tokens,
            usage.estimated_cost
        );
    }
}

fn print_feedback(feedback: &Feedback) {
    println!("Verdict: {}", feedback.verdict());

    if !feedback.findings().is_empty() {
        println!("Findings:");
        for finding in feedback.findings() {
            let rule = if finding.rule_identifier.is_empty() {
                "-"
            } else {
                finding.rule_identifier.as_str()
            };
            println!(
                "  {:<24} {} {}",
                finding.kind.to_string(),
                rule,
                finding.explanation
            );
        }
    }

    let suggestions = feedback.suggestions();
    if !suggestions.is_empty() {
        println!("Suggestions:");
        for suggestion in suggestions {
            println!("  - {}", suggestion);
        }
    }
}

fn print_outcome(question: &str, answer: &str, outcome: &RefinementOutcome) {
    println!("Q: {}", question);
    println!("A: {}", answer);

    for (round, step) in outcome.rounds.iter().enumerate() {
        println!();
        println!(
            "Round {}: {} {:?}",
            round + 1,
            step.feedback.verdict(),
            step.feedback.invalid_rules()
        );
        if let Some(rewritten) = step.interaction.rewritten_answer() {
            println!("Rewritten: {}", rewritten);
        }
    }

    println!();
    println!("Status: {:?}", outcome.status);
    print_feedback(&outcome.final_feedback);
}

fn exit_code(verdict: Verdict) -> ExitCode {
    match verdict {
        Verdict::Valid => ExitCode::SUCCESS,
        Verdict::Invalid => ExitCode::from(1),
        Verdict::Inconclusive => ExitCode::from(2),
    }
}
