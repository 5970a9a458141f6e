// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use sven_tools::ToolCall;

/// Events emitted by a session's runtime loop (classic or task mode).
/// The supervisor tags each with a session id and forwards it to the UI sink.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// Echoes the user message that started or resumed the current turn.
    UserMessage(String),
    /// A short assistant response shown immediately (e.g. a waiting question
    /// or the final response of a completed task), distinct from streamed
    /// text deltas.
    AgentChoice { agent: String, text: String },
    /// A model stream began for the named agent.
    StreamStarted { session_id: String, agent: String },
    /// A text chunk streamed from the model.
    TextDelta(String),
    /// A thinking/reasoning chunk from the model (extended thinking API).
    ThinkingDelta(String),
    /// The current model stream ended (normally or due to an error).
    StreamStopped,
    /// Informational snapshot of the tool set currently visible to the model
    /// (task-control tools excluded from the count).
    ToolsetInfo { visible_tool_count: usize, loading: bool, agent: String },
    /// Informational snapshot of the team this session is running.
    TeamInfo { available_agents: Vec<String>, current_agent: String },
    /// Emitted when the active agent or its model changes.
    AgentInfo { agent: String, model: String },
    /// The session's display title changed (set by the first classic-mode
    /// summarisation pass or explicitly by the user).
    SessionTitle(String),
    /// A not-yet-complete tool call argument fragment (task-control tool
    /// calls are filtered from this stream; see §4.6).
    PartialToolCall(ToolCall),
    /// A tool call is ready to dispatch.
    ToolCall(ToolCall),
    /// A tool call is gated on user approval.
    ToolCallConfirmation(ToolCall),
    /// The result of a dispatched tool call.
    ToolCallResponse { call_id: String, result: String },
    /// Token/cost accounting for the iteration just completed.
    TokenUsage {
        session_id: String,
        agent: String,
        input: u64,
        output: u64,
        total: u64,
        context_limit: u64,
        cost: f64,
    },
    /// The 100-iteration task cap (§4.6 step 10) was reached.
    MaxIterationsReached,
    /// A new task was started.
    TaskStarted { task_id: String, goal: String, agent: String },
    /// The active task's progress state was updated via `task_update_state`.
    TaskStateUpdated { task_id: String, state: String, agent: String },
    /// The active task is now waiting on the user via `task_waiting_on_user`.
    TaskWaiting { task_id: String, question: String, agent: String },
    /// The active task finished via `task_complete`.
    TaskCompleted { task_id: String, summary: String, agent: String },
    /// A recoverable error (transport failure, budget exhaustion, ...).
    Error(String),
}
