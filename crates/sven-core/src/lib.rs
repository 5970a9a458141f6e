// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod agent_runtime;
mod classic;
mod events;
mod prompts;
mod runtime_context;
mod task;
mod tool_dispatch;

pub use agent_runtime::{Agent, ToolSet};
pub use classic::{build_classic_prompt, MAX_CLASSIC_MESSAGES};
pub use events::AgentEvent;
pub use prompts::build_skills_section;
pub use runtime_context::AgentRuntimeContext;
pub use task::{
    run_task_turn, PendingConfirmation, ResumeAction, TaskTurnOutcome, MAX_TASK_ITERATIONS,
};
pub use tool_dispatch::{
    classify, is_task_control_tool, task_control_tool_schemas, Disposition, TASK_COMPLETE,
    TASK_UPDATE_STATE, TASK_WAITING_ON_USER,
};
