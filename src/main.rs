// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Minimal headless driver for the session store / provider adapter / agent
//! runtime stack: enough to run one classic or task turn from the command
//! line against a persisted session, without the TUI/GUI/CI product shell.

mod cli;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use sven_config::AgentDefinition;
use sven_core::{
    build_classic_prompt, run_task_turn, Agent, PendingConfirmation, ResumeAction, TaskTurnOutcome,
};
use sven_model::{CompletionRequest, Message, ModelProvider, ResponseEvent};
use sven_store::{FileStore, Session, SessionItem, SessionStore};
use sven_tools::{
    EditFileTool, FindFileTool, GrepTool, ListDirTool, ReadFileTool, ShellTool, ToolRegistry, WriteTool,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Arc::new(sven_config::load(cli.config.as_deref())?);

    match cli.command {
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&*config)?);
            Ok(())
        }
        Commands::Sessions { limit } => print_sessions(limit),
        Commands::Chat { session, message } => run_chat(&config, &session, &message).await,
        Commands::Task { session, message, approve_tools } => {
            run_task(&config, &session, message, approve_tools).await
        }
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

fn store() -> Result<FileStore> {
    FileStore::open(FileStore::default_path()).context("opening session store")
}

fn print_sessions(limit: usize) -> Result<()> {
    let sessions = store()?.list()?;
    for s in sessions.into_iter().take(limit) {
        println!("{}\t{}\t{} items", s.id, s.title, s.items.len());
    }
    Ok(())
}

/// Build the single agent this demo binary drives: the definition named by
/// `config.agent.default_mode`'s sibling instruction text, wired to a
/// provider resolved from `config.model` and a fixed read/write/shell tool
/// set. A real deployment would resolve this from a team config
/// ([`sven_config::Team`]) instead of hard-coding one agent.
fn build_agent(config: &sven_config::Config) -> Result<(Agent, ToolRegistry)> {
    let model_cfg = config.model.clone();
    let provider: Arc<dyn ModelProvider> = Arc::from(sven_model::from_config(&model_cfg)?);

    let def = AgentDefinition {
        name: "sven".into(),
        description: "A headless coding assistant.".into(),
        instruction: config
            .agent
            .system_prompt
            .clone()
            .unwrap_or_else(|| "You are a careful, concise coding assistant.".into()),
        models: vec![model_cfg.provider.clone()],
        tool_sets: vec![],
        sub_agents: vec![],
        parents: vec![],
        add_date: true,
        add_environment_info: true,
        skills_enabled: false,
        add_prompt_files: vec![],
        max_tool_rounds: Some(config.agent.max_tool_rounds),
        task_summary_count: 3,
    };
    let agent = Agent::new(def, vec![provider], vec![], Default::default());

    let mut registry = ToolRegistry::new();
    registry.register(ReadFileTool);
    registry.register(WriteTool);
    registry.register(EditFileTool);
    registry.register(ListDirTool);
    registry.register(FindFileTool);
    registry.register(GrepTool);
    registry.register(ShellTool::default());

    Ok((agent, registry))
}

fn load_or_create_session(store: &FileStore, id: &str) -> Result<Session> {
    match store.get(id) {
        Ok(session) => Ok(session),
        Err(_) => {
            let session = Session::new(id, std::env::current_dir()?.display().to_string(), chrono::Utc::now());
            store.add(session.clone())?;
            Ok(session)
        }
    }
}

async fn run_chat(config: &sven_config::Config, session_id: &str, message: &str) -> Result<()> {
    let (agent, _tools) = build_agent(config)?;
    let store = store()?;
    let mut session = load_or_create_session(&store, session_id)?;

    session.push(SessionItem::message(Message::user(message)));

    let prompt = build_classic_prompt(&agent, &session, chrono::Utc::now());
    let request = CompletionRequest { messages: prompt, tools: vec![], stream: true, system_dynamic_suffix: None };

    let mut stream = agent.primary_provider().complete(request).await?;
    let mut reply = String::new();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    use futures::StreamExt;
    while let Some(event) = stream.next().await {
        match event? {
            ResponseEvent::TextDelta(chunk) => {
                write!(out, "{chunk}")?;
                out.flush()?;
                reply.push_str(&chunk);
            }
            ResponseEvent::Done | ResponseEvent::MaxTokens => break,
            ResponseEvent::Error(msg) => anyhow::bail!("model error: {msg}"),
            _ => {}
        }
    }
    writeln!(out)?;

    session.push(SessionItem::message(Message::assistant(reply)));
    store.update(session)?;
    Ok(())
}

async fn run_task(
    config: &sven_config::Config,
    session_id: &str,
    message: Option<String>,
    approve_tools: bool,
) -> Result<()> {
    let (agent, registry) = build_agent(config)?;
    let store = store()?;
    let mut session = load_or_create_session(&store, session_id)?;
    session.tools_approved = approve_tools;

    let sessions_root = FileStore::default_path().parent().unwrap().to_path_buf();
    let cancel = CancellationToken::new();

    let mut next_message = message;
    let mut pending: Option<PendingConfirmation> = None;
    let mut resume: Option<ResumeAction> = None;

    loop {
        let outcome = run_task_turn(
            &agent,
            &mut session,
            &registry,
            &sessions_root,
            next_message.take(),
            resume.take(),
            pending.take(),
            &cancel,
            &mut |ev| print_event(&ev),
        )
        .await?;

        match outcome {
            TaskTurnOutcome::AwaitingConfirmation(p) => {
                print!("Approve tool call '{}' with args {}? [y/N] ", p.call.name, p.call.args);
                io::stdout().flush()?;
                let mut line = String::new();
                io::stdin().read_line(&mut line)?;
                if line.trim().eq_ignore_ascii_case("y") {
                    resume = Some(ResumeAction::Approve);
                } else {
                    resume = Some(ResumeAction::Reject { reason: None });
                }
                pending = Some(p);
                continue;
            }
            TaskTurnOutcome::Waiting | TaskTurnOutcome::Completed | TaskTurnOutcome::Cancelled => {
                break;
            }
            TaskTurnOutcome::MaxIterationsReached => break,
        }
    }

    store.update(session)?;
    Ok(())
}

fn print_event(ev: &sven_core::AgentEvent) {
    use sven_core::AgentEvent::*;
    match ev {
        TextDelta(t) => {
            print!("{t}");
            let _ = io::stdout().flush();
        }
        ToolCall(call) => eprintln!("\n[tool] {} {}", call.name, call.args),
        ToolCallResponse { call_id, result } => eprintln!("[tool result {call_id}] {result}"),
        TaskStarted { goal, .. } => eprintln!("[task started] {goal}"),
        TaskStateUpdated { state, .. } => eprintln!("[task state] {state}"),
        TaskWaiting { question, .. } => eprintln!("\n[waiting on you] {question}"),
        TaskCompleted { summary, .. } => eprintln!("\n[task completed] {summary}"),
        Error(msg) => eprintln!("\n[error] {msg}"),
        MaxIterationsReached => eprintln!("\n[stopped] maximum iterations reached"),
        _ => {}
    }
}
