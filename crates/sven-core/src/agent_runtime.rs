// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The runtime-resolved [`Agent`] (§4.4): an [`sven_config::AgentDefinition`]
//! bound to live model providers and tool sets.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sven_config::AgentDefinition;
use sven_model::ModelProvider;
use sven_tools::Tool;

use crate::prompts::build_skills_section;
use crate::runtime_context::AgentRuntimeContext;

/// A named collection of tools exposed to an agent, with optional shared
/// instructions prepended to the system prompt (§4.4: "instructions() →
/// optional system prepend").
pub struct ToolSet {
    pub name: String,
    pub tools: Vec<Arc<dyn Tool>>,
    instructions: Option<String>,
}

impl ToolSet {
    pub fn new(name: impl Into<String>, tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { name: name.into(), tools, instructions: None }
    }

    pub fn with_instructions(mut self, text: impl Into<String>) -> Self {
        self.instructions = Some(text.into());
        self
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }
}

/// A resolved, runnable agent: definition plus the model providers and tool
/// sets it was configured with.
pub struct Agent {
    pub def: AgentDefinition,
    /// Primary provider first, fallbacks follow, aligned 1:1 with `def.models`.
    pub providers: Vec<Arc<dyn ModelProvider>>,
    pub tool_sets: Vec<ToolSet>,
    pub context: AgentRuntimeContext,
}

impl Agent {
    pub fn new(
        def: AgentDefinition,
        providers: Vec<Arc<dyn ModelProvider>>,
        tool_sets: Vec<ToolSet>,
        context: AgentRuntimeContext,
    ) -> Self {
        assert!(!providers.is_empty(), "an agent must resolve at least one model");
        Self { def, providers, tool_sets, context }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// The primary model (`def.models[0]`); fallbacks are not auto-retried by
    /// the runtime loop in this core — callers needing failover swap
    /// `providers[0]` before starting a new turn.
    pub fn primary_provider(&self) -> &Arc<dyn ModelProvider> {
        &self.providers[0]
    }

    pub fn all_tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tool_sets.iter().flat_map(|ts| ts.tools.iter().cloned()).collect()
    }

    pub fn tool_set_instructions(&self) -> Vec<String> {
        self.tool_sets.iter().filter_map(|ts| ts.instructions().map(str::to_string)).collect()
    }

    /// §4.5 step 1 / §4.7 step 1: a handoff system message listing valid
    /// `transfer_task` targets, present only when this agent has sub-agents
    /// or parents.
    pub fn handoff_message(&self) -> Option<sven_model::Message> {
        if self.def.sub_agents.is_empty() && self.def.parents.is_empty() {
            return None;
        }
        let mut text = String::from(
            "You are part of a multi-agent team. Use `transfer_task` to hand off work to:\n",
        );
        for sub in &self.def.sub_agents {
            text.push_str(&format!("- {sub}\n"));
        }
        if !self.def.parents.is_empty() {
            text.push_str(&format!("\nYou may receive handoffs from: {}\n", self.def.parents.join(", ")));
        }
        Some(sven_model::Message::system(text))
    }

    /// §4.5 step 2 / §4.7 step 2: instruction text, optionally extended with
    /// today's date, working-directory environment info, named prompt-file
    /// contents, and a Skills section.
    ///
    /// Pure in `now` and the agent's static configuration — the date is only
    /// included when `add_date` is set, preserving prompt-prefix stability
    /// (P6) for agents that disable it.
    pub fn instruction_message(&self, now: DateTime<Utc>) -> sven_model::Message {
        let mut text = self.def.instruction.clone();

        if self.def.add_date {
            text.push_str(&format!("\n\nToday's date: {}", now.format("%Y-%m-%d")));
        }

        if self.def.add_environment_info {
            let wd = self
                .context
                .project_root
                .as_deref()
                .map(|p| p.display().to_string())
                .or_else(|| std::env::current_dir().ok().map(|p| p.display().to_string()))
                .unwrap_or_default();
            text.push_str(&format!("\n\nWorking directory: {wd}"));
        }

        for name in &self.def.add_prompt_files {
            if let Some(contents) = find_prompt_file_upward(name, self.context.project_root.as_deref()) {
                text.push_str(&format!("\n\n--- {name} ---\n{contents}"));
            }
        }

        if self.def.skills_enabled {
            let skills = self.context.skills.get();
            let section = build_skills_section(&skills);
            if !section.is_empty() {
                text.push_str("\n\n");
                text.push_str(&section);
            }
        }

        sven_model::Message::system(text)
    }
}

/// Searches for `name` starting at `start` (or the current directory) and
/// walking up through each ancestor, mirroring the discovery precedence used
/// by the teacher's skill/subagent loaders: closer to the working directory
/// wins on name collision.
fn find_prompt_file_upward(name: &str, start: Option<&Path>) -> Option<String> {
    let mut dir = start.map(Path::to_path_buf).or_else(|| std::env::current_dir().ok())?;
    loop {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return std::fs::read_to_string(candidate).ok();
        }
        if !dir.pop() {
            return None;
        }
    }
}
