//! Command implementations.

use crate::output::{self, OutputFormat, TableBuilder};
use crate::session::{ChatInput, ChatSession};
use anyhow::{Context, Result, bail};
use console::style;
use std::io::{self, Write};
use std::path::Path;
use tablesage_core::{AssistantConfig, Query};
use tablesage_engine::{AnswerReport, Assistant, INTRODUCTION, RoutingTable};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::debug;

const REDACTED: &str = "********";

fn build_assistant(config: &AssistantConfig) -> Result<Assistant> {
    Assistant::from_config(config).context("Failed to initialize the assistant")
}

/// Answer one question.
pub async fn ask(config: &AssistantConfig, question: &str, format: OutputFormat) -> Result<()> {
    let assistant = build_assistant(config)?;

    match format {
        OutputFormat::Json => {
            let report = assistant.respond(&Query::new(question)).await;
            output::print_json(&report)?;
        }
        OutputFormat::Human => {
            let spinner = output::spinner("Thinking...");
            let report = assistant.respond(&Query::new(question)).await;
            spinner.finish_and_clear();
            print_report(&report);
        }
    }
    Ok(())
}

fn print_report(report: &AnswerReport) {
    println!("{}\n", report.text);
    output::kv("intent", report.intent);
    if !report.sources.is_empty() {
        let sources: Vec<&str> = report.sources.iter().map(|s| s.as_str()).collect();
        output::kv("sources", sources.join(", "));
    }
}

/// Interactive loop over stdin.
pub async fn chat(config: &AssistantConfig) -> Result<()> {
    let assistant = build_assistant(config)?;

    output::info(INTRODUCTION);
    println!(
        "{}",
        style("Type a question, /history to review this session, /quit to leave.").dim()
    );

    let session = chat_loop(&assistant, BufReader::new(tokio::io::stdin())).await?;

    debug!(turns = session.turns().len(), "Chat ended");
    output::success("Goodbye!");
    Ok(())
}

/// Read questions from `input` until `/quit` or end of input.
async fn chat_loop<R>(assistant: &Assistant, input: R) -> Result<ChatSession>
where
    R: AsyncBufRead + Unpin,
{
    let mut session = ChatSession::new();
    let mut lines = input.lines();
    loop {
        print!("{} ", style("you ›").green().bold());
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match ChatInput::parse(&line) {
            ChatInput::Empty => continue,
            ChatInput::Quit => break,
            ChatInput::History => print_history(&session),
            ChatInput::Ask(question) => {
                let spinner = output::spinner("Thinking...");
                let report = assistant.respond(&Query::new(question.as_str())).await;
                spinner.finish_and_clear();

                println!("{} {}\n", style("assistant ›").cyan().bold(), report.text);
                session.record(question, report.intent, report.text);
            }
        }
    }

    Ok(session)
}

fn print_history(session: &ChatSession) {
    if session.is_empty() {
        output::warning("No questions asked yet");
        return;
    }
    output::header("Session history");
    for (index, turn) in session.turns().iter().enumerate() {
        println!(
            "\n{} {} {}",
            style(format!("#{}", index + 1)).bold(),
            style(turn.asked_at.format("%H:%M:%S")).dim(),
            style(format!("[{}]", turn.intent)).yellow()
        );
        output::kv("you", &turn.question);
        output::kv("assistant", &turn.answer);
    }
    println!();
}

/// Print the effective routing table.
pub fn routes(config: &AssistantConfig, format: OutputFormat) -> Result<()> {
    let table = RoutingTable::with_overrides(&config.routing)
        .context("Invalid routing overrides")?;

    if format == OutputFormat::Json {
        let plans: Vec<_> = table.plans().collect();
        return output::print_json(&plans);
    }

    let mut builder = TableBuilder::new().header(["Intent", "Step", "Backend", "On hit", "On empty"]);
    for plan in table.plans() {
        if plan.is_introduce_only() {
            builder = builder.row([
                plan.intent().to_string(),
                "-".to_string(),
                "introduce only".to_string(),
                "-".to_string(),
                "-".to_string(),
            ]);
            continue;
        }
        for (index, step) in plan.steps().iter().enumerate() {
            builder = builder.row([
                plan.intent().to_string(),
                (index + 1).to_string(),
                step.backend.to_string(),
                step.on_hit.to_string(),
                step.on_empty.to_string(),
            ]);
        }
    }
    builder.print();
    Ok(())
}

/// Copy of `config` with secrets masked.
pub fn redacted(config: &AssistantConfig) -> AssistantConfig {
    let mut config = config.clone();
    if config.llm.api_key.is_some() {
        config.llm.api_key = Some(REDACTED.to_string());
    }
    if let Some(vector) = config.vector.as_mut() {
        if vector.qdrant_api_key.is_some() {
            vector.qdrant_api_key = Some(REDACTED.to_string());
        }
        if vector.embedding.api_key.is_some() {
            vector.embedding.api_key = Some(REDACTED.to_string());
        }
    }
    if let Some(graph) = config.graph.as_mut() {
        if graph.password.is_some() {
            graph.password = Some(REDACTED.to_string());
        }
    }
    config
}

pub fn config_show(config: &AssistantConfig, format: OutputFormat) -> Result<()> {
    let config = redacted(config);
    match format {
        OutputFormat::Json => output::print_json(&config),
        OutputFormat::Human => {
            let toml = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{toml}");
            Ok(())
        }
    }
}

/// Write the default configuration to `path`.
pub fn config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    AssistantConfig::default()
        .save_to_path(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    output::success(format!("Configuration written to {}", path.display()));
    Ok(())
}
