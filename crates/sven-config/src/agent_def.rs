// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Multi-agent team configuration: the on-disk shape of an `Agent` (§4.4)
//! and the `Team` that groups several of them with sub-agent/handoff edges.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_task_summary_count() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub instruction: String,
    /// Primary model first, fallbacks follow. Each entry is a key into the
    /// top-level `providers` map or a bare provider name.
    pub models: Vec<String>,
    /// Named tool sets this agent exposes to the model.
    #[serde(default)]
    pub tool_sets: Vec<String>,
    /// Sub-agents this agent may hand work off to via `transfer_task`.
    #[serde(default)]
    pub sub_agents: Vec<String>,
    /// Agents that may hand work off to this one (informational; used to
    /// render the reverse edge in handoff system messages).
    #[serde(default)]
    pub parents: Vec<String>,

    #[serde(default)]
    pub add_date: bool,
    #[serde(default)]
    pub add_environment_info: bool,
    #[serde(default)]
    pub skills_enabled: bool,
    #[serde(default)]
    pub add_prompt_files: Vec<String>,

    /// Per-agent override of the task-mode iteration cap. None defers to
    /// the team/global default.
    #[serde(default)]
    pub max_tool_rounds: Option<u32>,
    /// Number of recent completed-task summaries surfaced in the task
    /// prompt (§4.7 step 4). Defaults to 3.
    #[serde(default = "default_task_summary_count")]
    pub task_summary_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Team {
    /// Name of the agent the supervisor starts a new session with.
    pub entrypoint: String,
    pub agents: HashMap<String, AgentDefinition>,
}

impl Team {
    pub fn entry_agent(&self) -> Option<&AgentDefinition> {
        self.agents.get(&self.entrypoint)
    }

    /// All agents declared reachable from the entrypoint via `sub_agents`
    /// edges, entrypoint included. Used to validate a team config has no
    /// dangling handoff target.
    pub fn reachable(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        let mut stack = vec![self.entrypoint.as_str()];
        while let Some(name) = stack.pop() {
            if seen.contains(&name) {
                continue;
            }
            seen.push(name);
            if let Some(def) = self.agents.get(name) {
                for sub in &def.sub_agents {
                    stack.push(sub.as_str());
                }
            }
        }
        seen
    }
}
