// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sven_model::Message;
use std::collections::HashMap;

/// A single entry in a session's timeline.
///
/// Sessions are a tree, not a flat list: a sub-session (created by a
/// `transfer_task` handoff) carries its own recursively-composed items, and
/// a summary marker replaces everything before it for prompt-building
/// purposes without discarding the original history from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionItem {
    Message(Message),
    SubSession {
        agent_name: String,
        items: Vec<SessionItem>,
    },
    SummaryMarker {
        text: String,
        created_at: DateTime<Utc>,
    },
}

impl SessionItem {
    pub fn message(m: Message) -> Self {
        Self::Message(m)
    }

    /// Flatten this item (and any nested sub-session) into its constituent
    /// messages, in order. Summary markers contribute no message.
    pub fn flatten_messages(&self) -> Vec<&Message> {
        match self {
            SessionItem::Message(m) => vec![m],
            SessionItem::SubSession { items, .. } => {
                items.iter().flat_map(|i| i.flatten_messages()).collect()
            }
            SessionItem::SummaryMarker { .. } => vec![],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    Waiting,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// Short action phrase, e.g. "Add rate limiting to the API gateway".
    pub goal: String,
    /// The raw user text that prompted this task.
    pub original_message: String,
    pub status: TaskStatus,
    /// Agent-written progress blob, updated via `task_update_state`.
    pub state: Option<String>,
    pub waiting_question: Option<String>,
    pub final_response: Option<String>,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_input_tokens: u64,
    pub cache_write_tokens: u64,
    pub cost: f64,
}

impl Task {
    pub fn new(id: impl Into<String>, goal: impl Into<String>, original_message: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            goal: goal.into(),
            original_message: original_message.into(),
            status: TaskStatus::Active,
            state: None,
            waiting_question: None,
            final_response: None,
            summary: None,
            created_at: now,
            completed_at: None,
            input_tokens: 0,
            output_tokens: 0,
            cached_input_tokens: 0,
            cache_write_tokens: 0,
            cost: 0.0,
        }
    }

    pub fn total_input_tokens(&self) -> u64 {
        self.input_tokens + self.cached_input_tokens + self.cache_write_tokens
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_input_tokens() + self.output_tokens
    }

    pub fn mark_waiting(&mut self, question: impl Into<String>) {
        self.status = TaskStatus::Waiting;
        self.waiting_question = Some(question.into());
    }

    pub fn resume(&mut self) {
        self.status = TaskStatus::Active;
        self.waiting_question = None;
    }

    pub fn mark_completed(&mut self, final_response: impl Into<String>, summary: impl Into<String>, now: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.final_response = Some(final_response.into());
        self.summary = Some(summary.into());
        self.completed_at = Some(now);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<SessionItem>,
    #[serde(default)]
    pub tools_approved: bool,
    #[serde(default)]
    pub thinking: bool,
    #[serde(default)]
    pub hide_tool_results: bool,
    #[serde(default)]
    pub split_diff: bool,
    #[serde(default)]
    pub working_dir: String,
    #[serde(default)]
    pub allowed_directories: Vec<String>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub send_user_message: bool,
    #[serde(default)]
    pub max_iterations_by_agent: HashMap<String, u32>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub active_task_id: Option<String>,
    #[serde(default = "default_task_summary_count")]
    pub task_summary_count: usize,
    #[serde(default)]
    pub starred: bool,
}

fn default_task_summary_count() -> usize {
    3
}

impl Session {
    pub fn new(id: impl Into<String>, working_dir: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            created_at: now,
            items: Vec::new(),
            tools_approved: false,
            thinking: false,
            hide_tool_results: false,
            split_diff: false,
            working_dir: working_dir.into(),
            allowed_directories: Vec::new(),
            input_tokens: 0,
            output_tokens: 0,
            cost: 0.0,
            send_user_message: true,
            max_iterations_by_agent: HashMap::new(),
            tasks: Vec::new(),
            active_task_id: None,
            task_summary_count: default_task_summary_count(),
            starred: false,
        }
    }

    pub fn push(&mut self, item: SessionItem) {
        self.items.push(item);
    }

    pub fn active_task(&self) -> Option<&Task> {
        let id = self.active_task_id.as_ref()?;
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn active_task_mut(&mut self) -> Option<&mut Task> {
        let id = self.active_task_id.clone()?;
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Up to `task_summary_count` summaries of the most recently completed
    /// tasks, oldest first within the window (§9 open question: insertion
    /// order within the window is preserved, not reversed).
    pub fn recent_task_summaries(&self) -> Vec<&str> {
        let completed: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed && t.summary.is_some())
            .collect();
        let n = self.task_summary_count.min(completed.len());
        completed[completed.len() - n..]
            .iter()
            .filter_map(|t| t.summary.as_deref())
            .collect()
    }

    /// `P4`: at most one task may be non-completed at a time.
    pub fn has_active_or_waiting_task(&self) -> bool {
        self.tasks.iter().any(|t| t.status != TaskStatus::Completed)
    }
}
