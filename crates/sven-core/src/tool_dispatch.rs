// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tool dispatch (§4.8): task-control tool identity and the confirmation
//! gate shared by both runtime modes.
//!
//! Task-control tools (`task_update_state`, `task_waiting_on_user`,
//! `task_complete`) are visible to the model like any other tool but never
//! reach [`sven_tools::ToolRegistry`] — the task loop intercepts them before
//! dispatch and applies their effect directly to the [`sven_store::Task`].

use serde_json::json;
use sven_model::ToolSchema;
use sven_tools::{ApprovalPolicy, Tool};

pub const TASK_UPDATE_STATE: &str = "task_update_state";
pub const TASK_WAITING_ON_USER: &str = "task_waiting_on_user";
pub const TASK_COMPLETE: &str = "task_complete";

pub fn is_task_control_tool(name: &str) -> bool {
    matches!(name, TASK_UPDATE_STATE | TASK_WAITING_ON_USER | TASK_COMPLETE)
}

/// The three built-in task-control tool schemas, advertised to the model
/// alongside the task's regular tool set (§4.7 step 3).
pub fn task_control_tool_schemas() -> Vec<ToolSchema> {
    vec![
        ToolSchema {
            name: TASK_UPDATE_STATE.into(),
            description: "Record progress on the current task without ending it.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "state": { "type": "string", "description": "Short progress note." }
                },
                "required": ["state"]
            }),
        },
        ToolSchema {
            name: TASK_WAITING_ON_USER.into(),
            description: "Pause the task and ask the user a question before continuing.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "question": { "type": "string" }
                },
                "required": ["question"]
            }),
        },
        ToolSchema {
            name: TASK_COMPLETE.into(),
            description: "Finish the task and report a summary of what was done.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "final_response": {
                        "type": "string",
                        "description": "The clean final answer to show the user."
                    },
                    "summary": {
                        "type": "string",
                        "description": "A short summary of what was done, for the task history."
                    }
                },
                "required": ["final_response", "summary"]
            }),
        },
    ]
}

/// Disposition of a regular (non-task-control) tool call, per §4.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Run immediately.
    Run,
    /// Ask the user first; the caller must emit `ToolCallConfirmation` and
    /// suspend the loop until a resume decision arrives.
    NeedsConfirmation,
    /// Never run; synthesize a rejection result without asking.
    Denied,
}

/// Decide whether `tool` may run given the session's blanket approval flag.
///
/// `ApprovalPolicy::Deny` always wins regardless of `tools_approved` — it
/// marks a tool as categorically unsafe to auto-run, not merely
/// confirmation-gated. `ApprovalPolicy::Auto` always runs. `ApprovalPolicy::Ask`
/// runs only once the session has blanket-approved tools
/// (`session.tools_approved == true`); otherwise it needs per-call
/// confirmation.
pub fn classify(tool: &dyn Tool, tools_approved: bool) -> Disposition {
    match tool.default_policy() {
        ApprovalPolicy::Deny => Disposition::Denied,
        ApprovalPolicy::Auto => Disposition::Run,
        ApprovalPolicy::Ask => {
            if tools_approved {
                Disposition::Run
            } else {
                Disposition::NeedsConfirmation
            }
        }
    }
}
