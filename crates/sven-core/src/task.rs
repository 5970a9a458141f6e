// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Task Runtime (§4.6-§4.9): the iterative control loop that drives a single
//! task to completion (or to a waiting/confirmation/iteration-cap pause).
//!
//! Unlike the Classic Runtime, a task's prompt is rebuilt from the task's own
//! state each iteration (§4.7) rather than replayed from the full session
//! history — [`build_task_prompt`] and a per-call scratch buffer stand in
//! for that history.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use sven_model::{CompletionRequest, Message, MessageContent, ResponseEvent, Role, ToolSchema};
use sven_store::{artifact, Session, SessionItem, Task, TaskStatus};
use sven_tools::{ToolCall, ToolRegistry};

use crate::agent_runtime::Agent;
use crate::events::AgentEvent;
use crate::tool_dispatch::{
    classify, is_task_control_tool, task_control_tool_schemas, Disposition, TASK_COMPLETE,
    TASK_UPDATE_STATE, TASK_WAITING_ON_USER,
};

/// §4.6 step 10: the hard cap on iterations within a single task run.
pub const MAX_TASK_ITERATIONS: usize = 100;

const CONTINUE_PROMPT: &str =
    "Continue working on the task. If there is nothing further to do, call task_complete.";

/// A tool call suspended awaiting user confirmation. Held by the caller
/// between `run_task_turn` invocations — never persisted to the session,
/// since a process restart should re-ask rather than silently resolve a
/// stale confirmation.
#[derive(Debug, Clone)]
pub struct PendingConfirmation {
    pub call: ToolCall,
}

/// The user's decision on a suspended [`PendingConfirmation`] (§6 resume
/// contract: `{approve:true}` / `{approve:false,reason?}`).
#[derive(Debug, Clone)]
pub enum ResumeAction {
    Approve,
    Reject { reason: Option<String> },
}

/// Why [`run_task_turn`] returned.
#[derive(Debug, Clone)]
pub enum TaskTurnOutcome {
    /// A tool call needs user approval; resume with a [`ResumeAction`] and
    /// the same [`PendingConfirmation`] once a decision is available.
    AwaitingConfirmation(PendingConfirmation),
    /// The task called `task_waiting_on_user`; resume by calling again with
    /// the user's answer as `user_message`.
    Waiting,
    /// The task called `task_complete`.
    Completed,
    /// The cancellation token fired mid-turn.
    Cancelled,
    /// The 100-iteration cap (§4.6 step 10) was reached.
    MaxIterationsReached,
}

enum TaskControlResult {
    StateUpdated(String),
    Waiting(String),
    Completed { final_response: String, summary: String },
}

/// Drive one task turn to its next pause point.
///
/// `user_message` starts a new task (when none is active), resumes a
/// waiting task (when one is), or is `None` when resuming a pending tool
/// confirmation.
#[allow(clippy::too_many_arguments)]
pub async fn run_task_turn(
    agent: &Agent,
    session: &mut Session,
    registry: &ToolRegistry,
    sessions_root: &Path,
    user_message: Option<String>,
    resume: Option<ResumeAction>,
    pending: Option<PendingConfirmation>,
    cancel: &CancellationToken,
    emit: &mut dyn FnMut(AgentEvent),
) -> Result<TaskTurnOutcome> {
    let now = Utc::now();
    let mut scratch: Vec<Message> = Vec::new();

    // §4.8: resolve a suspended confirmation before anything else.
    if let Some(p) = pending {
        match resume {
            Some(ResumeAction::Approve) => {
                let out = registry.execute(&p.call).await;
                emit(AgentEvent::ToolCallResponse { call_id: p.call.id.clone(), result: out.content.clone() });
                scratch.push(Message::tool_result(p.call.id.clone(), out.content));
            }
            Some(ResumeAction::Reject { reason }) => {
                let msg = reason.unwrap_or_else(|| "User rejected tool call".to_string());
                emit(AgentEvent::ToolCallResponse { call_id: p.call.id.clone(), result: msg.clone() });
                scratch.push(Message::tool_result(p.call.id.clone(), msg));
            }
            None => return Ok(TaskTurnOutcome::AwaitingConfirmation(p)),
        }
    }

    let prep = prepare_task(agent, session, user_message, now).await?;
    if prep.started {
        let goal = session.active_task().map(|t| t.goal.clone()).unwrap_or_default();
        emit(AgentEvent::TaskStarted { task_id: prep.task_id.clone(), goal, agent: agent.name().to_string() });
    }

    for _ in 0..MAX_TASK_ITERATIONS {
        if cancel.is_cancelled() {
            return Ok(TaskTurnOutcome::Cancelled);
        }

        let prompt = build_task_prompt(agent, session, &scratch, prep.resumed, now)?;
        emit(AgentEvent::StreamStarted { session_id: session.id.clone(), agent: agent.name().to_string() });

        let request = CompletionRequest {
            messages: prompt,
            tools: task_tool_schemas(agent),
            stream: true,
            system_dynamic_suffix: None,
        };

        let mut stream = agent.primary_provider().complete(request).await?;

        let mut text = String::new();
        let mut calls_by_index: BTreeMap<u32, (String, String, String)> = BTreeMap::new();

        while let Some(event) = stream.next().await {
            match event {
                Ok(ResponseEvent::TextDelta(chunk)) => {
                    emit(AgentEvent::TextDelta(chunk.clone()));
                    text.push_str(&chunk);
                }
                Ok(ResponseEvent::ThinkingDelta(chunk)) => {
                    emit(AgentEvent::ThinkingDelta(chunk));
                }
                Ok(ResponseEvent::ToolCall { index, id, name, arguments }) => {
                    calls_by_index.insert(index, (id.clone(), name.clone(), arguments.clone()));
                    if !is_task_control_tool(&name) {
                        let args: Value = serde_json::from_str(&arguments).unwrap_or(Value::Null);
                        emit(AgentEvent::PartialToolCall(ToolCall { id, name, args }));
                    }
                }
                Ok(ResponseEvent::Usage { input_tokens, output_tokens, cache_read_tokens, cache_write_tokens }) => {
                    if let Some(task) = session.active_task_mut() {
                        task.input_tokens += input_tokens as u64;
                        task.output_tokens += output_tokens as u64;
                        task.cached_input_tokens += cache_read_tokens as u64;
                        task.cache_write_tokens += cache_write_tokens as u64;
                    }
                    let context_limit = agent.primary_provider().catalog_context_window().unwrap_or(0) as u64;
                    emit(AgentEvent::TokenUsage {
                        session_id: session.id.clone(),
                        agent: agent.name().to_string(),
                        input: input_tokens as u64,
                        output: output_tokens as u64,
                        total: (input_tokens + output_tokens) as u64,
                        context_limit,
                        cost: 0.0,
                    });
                }
                Ok(ResponseEvent::MaxTokens) | Ok(ResponseEvent::Done) => break,
                Ok(ResponseEvent::Error(msg)) => {
                    emit(AgentEvent::Error(msg));
                    break;
                }
                Err(err) => {
                    emit(AgentEvent::Error(err.to_string()));
                    break;
                }
            }
        }
        emit(AgentEvent::StreamStopped);

        let calls: Vec<ToolCall> = calls_by_index
            .into_values()
            .map(|(id, name, arguments)| ToolCall {
                id,
                name,
                args: serde_json::from_str(&arguments).unwrap_or(Value::Null),
            })
            .collect();

        let pure_task_control = !calls.is_empty() && calls.iter().all(|c| is_task_control_tool(&c.name));

        if pure_task_control {
            if !text.is_empty() {
                scratch.push(Message::assistant(text.clone()));
            }
        } else {
            if !text.is_empty() {
                session.push(SessionItem::message(Message::assistant(text.clone())));
            }
            for call in calls.iter().filter(|c| !is_task_control_tool(&c.name)) {
                session.push(SessionItem::message(Message {
                    role: Role::Assistant,
                    content: MessageContent::ToolCall {
                        tool_call_id: call.id.clone(),
                        function: sven_model::FunctionCall {
                            name: call.name.clone(),
                            arguments: call.args.to_string(),
                        },
                    },
                }));
            }
        }

        if calls.is_empty() {
            scratch.push(Message::user(CONTINUE_PROMPT));
            continue;
        }

        let mut control_result: Option<TaskControlResult> = None;
        for call in &calls {
            if is_task_control_tool(&call.name) {
                let result = apply_task_control(session, call, now)?;
                match &result {
                    TaskControlResult::StateUpdated(state) => {
                        emit(AgentEvent::TaskStateUpdated {
                            task_id: prep.task_id.clone(),
                            state: state.clone(),
                            agent: agent.name().to_string(),
                        });
                    }
                    TaskControlResult::Waiting(_) | TaskControlResult::Completed { .. } => {}
                }
                control_result = Some(result);
            } else {
                match registry.get(&call.name) {
                    None => {
                        let msg = format!("unknown tool: {}", call.name);
                        emit(AgentEvent::ToolCallResponse { call_id: call.id.clone(), result: msg.clone() });
                        scratch.push(Message::tool_result(call.id.clone(), msg));
                    }
                    Some(tool) => match classify(tool.as_ref(), session.tools_approved) {
                        Disposition::Denied => {
                            let msg = format!("tool '{}' is denied by policy", call.name);
                            emit(AgentEvent::ToolCallResponse { call_id: call.id.clone(), result: msg.clone() });
                            scratch.push(Message::tool_result(call.id.clone(), msg));
                        }
                        Disposition::NeedsConfirmation => {
                            emit(AgentEvent::ToolCallConfirmation(call.clone()));
                            return Ok(TaskTurnOutcome::AwaitingConfirmation(PendingConfirmation { call: call.clone() }));
                        }
                        Disposition::Run => {
                            emit(AgentEvent::ToolCall(call.clone()));
                            let out = registry.execute(call).await;
                            emit(AgentEvent::ToolCallResponse { call_id: call.id.clone(), result: out.content.clone() });
                            scratch.push(Message::tool_result(call.id.clone(), out.content));
                        }
                    },
                }
            }
        }

        match control_result {
            Some(TaskControlResult::Waiting(question)) => {
                emit(AgentEvent::AgentChoice { agent: agent.name().to_string(), text: question.clone() });
                emit(AgentEvent::TaskWaiting { task_id: prep.task_id.clone(), question, agent: agent.name().to_string() });
                return Ok(TaskTurnOutcome::Waiting);
            }
            Some(TaskControlResult::Completed { final_response, summary }) => {
                let choice_text = if text.is_empty() { final_response.clone() } else { text.clone() };
                emit(AgentEvent::AgentChoice { agent: agent.name().to_string(), text: choice_text });
                session.push(SessionItem::message(Message::assistant(final_response)));
                if let Some(task) = session.tasks.iter().find(|t| t.id == prep.task_id).cloned() {
                    artifact::write(sessions_root, &session.id, &task)?;
                }
                session.active_task_id = None;
                emit(AgentEvent::TaskCompleted { task_id: prep.task_id.clone(), summary, agent: agent.name().to_string() });
                return Ok(TaskTurnOutcome::Completed);
            }
            _ => {}
        }
    }

    emit(AgentEvent::MaxIterationsReached);
    emit(AgentEvent::Error("task exceeded the maximum number of iterations".into()));
    Ok(TaskTurnOutcome::MaxIterationsReached)
}

struct TaskPreparation {
    task_id: String,
    started: bool,
    resumed: bool,
}

/// §4.6 step 2: create a new task, resume a waiting one, or continue the
/// active one (e.g. a repeat call after a tool confirmation resolved).
async fn prepare_task(
    agent: &Agent,
    session: &mut Session,
    user_message: Option<String>,
    now: DateTime<Utc>,
) -> Result<TaskPreparation> {
    if let Some(active) = session.active_task() {
        if active.status == TaskStatus::Waiting {
            let id = active.id.clone();
            if let Some(msg) = &user_message {
                session.push(SessionItem::message(Message::user(msg.clone())));
            }
            session.active_task_mut().expect("active task id is set").resume();
            return Ok(TaskPreparation { task_id: id, started: false, resumed: true });
        }
        let id = active.id.clone();
        return Ok(TaskPreparation { task_id: id, started: false, resumed: false });
    }

    let message = user_message.ok_or_else(|| anyhow!("starting a new task requires a user message"))?;
    session.push(SessionItem::message(Message::user(message.clone())));
    let goal = summarize_goal(agent, &message).await.unwrap_or_else(|| message.clone());
    let id = uuid::Uuid::new_v4().to_string();
    session.tasks.push(Task::new(id.clone(), goal, message, now));
    session.active_task_id = Some(id.clone());
    Ok(TaskPreparation { task_id: id, started: true, resumed: false })
}

/// §4.6 step 2: a single no-tool completion that compresses the user's
/// request into a short goal phrase. Falls back to the raw message (handled
/// by the caller) on any provider error or empty response.
async fn summarize_goal(agent: &Agent, message: &str) -> Option<String> {
    let request = CompletionRequest {
        messages: vec![
            Message::system(
                "Summarize the user's request as a short action phrase, under 10 words. \
                 Respond with only the phrase, no punctuation at the end.",
            ),
            Message::user(message),
        ],
        tools: vec![],
        stream: true,
        system_dynamic_suffix: None,
    };

    let mut stream = agent.primary_provider().complete(request).await.ok()?;
    let mut text = String::new();
    while let Some(event) = stream.next().await {
        match event {
            Ok(ResponseEvent::TextDelta(chunk)) => text.push_str(&chunk),
            Ok(ResponseEvent::Done) | Ok(ResponseEvent::MaxTokens) => break,
            Ok(ResponseEvent::Error(_)) | Err(_) => return None,
            _ => {}
        }
    }
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// §4.7: the task prompt never replays the full session history. It is
/// handoff + instruction + tool-set instructions + recent task summaries +
/// a "Current Task" block + a single user message + the scratch buffer
/// accumulated so far this turn.
fn build_task_prompt(
    agent: &Agent,
    session: &Session,
    scratch: &[Message],
    resumed: bool,
    now: DateTime<Utc>,
) -> Result<Vec<Message>> {
    let task = session.active_task().ok_or_else(|| anyhow!("no active task to build a prompt for"))?;

    let mut out = Vec::new();
    if let Some(handoff) = agent.handoff_message() {
        out.push(handoff);
    }
    out.push(agent.instruction_message(now));
    for instructions in agent.tool_set_instructions() {
        out.push(Message::system(instructions));
    }

    for summary in session.recent_task_summaries() {
        out.push(Message::system(format!("Earlier task summary: {summary}")));
    }

    let mut current_task = format!("## Current Task\n\nGoal: {}\nStatus: {:?}", task.goal, task.status);
    if let Some(state) = &task.state {
        current_task.push_str(&format!("\nProgress so far: {state}"));
    }
    out.push(Message::system(current_task));

    let user_text = if resumed {
        most_recent_user_message(session).unwrap_or_else(|| task.original_message.clone())
    } else {
        task.original_message.clone()
    };
    out.push(Message::user(user_text));

    out.extend(scratch.iter().cloned());
    Ok(out)
}

/// Walk the session backwards for the most recent user-role message
/// (§4.7 step 6, used when resuming a waiting task).
fn most_recent_user_message(session: &Session) -> Option<String> {
    session.items.iter().rev().find_map(|item| {
        item.flatten_messages()
            .into_iter()
            .rev()
            .find(|m| m.role == Role::User)
            .and_then(|m| m.as_text().map(str::to_string))
    })
}

fn task_tool_schemas(agent: &Agent) -> Vec<ToolSchema> {
    let mut schemas: Vec<ToolSchema> = agent
        .all_tools()
        .iter()
        .map(|t| ToolSchema {
            name: t.name().to_string(),
            description: t.description().to_string(),
            parameters: t.parameters_schema(),
        })
        .collect();
    schemas.extend(task_control_tool_schemas());
    schemas
}

/// §4.8: apply a task-control tool call directly to the active task; these
/// never reach [`ToolRegistry`].
fn apply_task_control(session: &mut Session, call: &ToolCall, now: DateTime<Utc>) -> Result<TaskControlResult> {
    let task = session
        .active_task_mut()
        .ok_or_else(|| anyhow!("no active task for task-control call '{}'", call.name))?;

    match call.name.as_str() {
        TASK_UPDATE_STATE => {
            let state = call.args.get("state").and_then(Value::as_str).unwrap_or_default().to_string();
            task.state = Some(state.clone());
            Ok(TaskControlResult::StateUpdated(state))
        }
        TASK_WAITING_ON_USER => {
            let question = call.args.get("question").and_then(Value::as_str).unwrap_or_default().to_string();
            task.mark_waiting(question.clone());
            Ok(TaskControlResult::Waiting(question))
        }
        TASK_COMPLETE => {
            let final_response =
                call.args.get("final_response").and_then(Value::as_str).unwrap_or_default().to_string();
            let summary = call.args.get("summary").and_then(Value::as_str).unwrap_or_default().to_string();
            task.mark_completed(final_response.clone(), summary.clone(), now);
            Ok(TaskControlResult::Completed { final_response, summary })
        }
        other => Err(anyhow!("'{other}' is not a task-control tool")),
    }
}
