// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Task markdown artifact: a human-readable record of a completed task,
//! written to `~/.cagent/sessions/<session_id>/tasks/<task_id>.md`.

use crate::types::Task;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Formats a duration the way the task artifact's Metadata block does:
/// `"30 seconds"`, `"1 minutes 30 seconds"`, `"2 hours 5 minutes"`.
pub fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{hours} hours {minutes} minutes")
    } else if minutes > 0 {
        format!("{minutes} minutes {seconds} seconds")
    } else {
        format!("{seconds} seconds")
    }
}

fn title_line(goal: &str) -> String {
    let flattened = goal.replace('\n', " ");
    if flattened.chars().count() > 80 {
        let truncated: String = flattened.chars().take(77).collect();
        format!("{truncated}...")
    } else {
        flattened
    }
}

pub fn render(task: &Task) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", title_line(&task.goal)));

    out.push_str("## Metadata\n\n");
    out.push_str(&format!("- **ID:** {}\n", task.id));
    out.push_str(&format!("- **Status:** {:?}\n", task.status).to_lowercase());
    out.push_str(&format!("- **Created:** {}\n", task.created_at.to_rfc3339()));
    if let Some(completed_at) = task.completed_at {
        out.push_str(&format!("- **Completed:** {}\n", completed_at.to_rfc3339()));
        let dur = (completed_at - task.created_at).num_seconds();
        out.push_str(&format!("- **Duration:** {}\n", format_duration(dur)));
    }
    if task.total_tokens() > 0 {
        out.push_str(&format!(
            "- **Tokens:** {} input / {} output\n",
            task.total_input_tokens(),
            task.output_tokens
        ));
    }
    if task.cost > 0.0 {
        out.push_str(&format!("- **Cost:** ${:.4}\n", task.cost));
    }
    out.push('\n');

    out.push_str("## Goal\n\n");
    out.push_str(&task.goal);
    out.push_str("\n\n");

    if let Some(state) = &task.state {
        out.push_str("## Final State\n\n");
        out.push_str(state);
        out.push_str("\n\n");
    }

    if let Some(resp) = &task.final_response {
        out.push_str("## Final Response\n\n");
        out.push_str(resp);
        out.push_str("\n\n");
    }

    if let Some(summary) = &task.summary {
        out.push_str("## Summary\n\n");
        out.push_str(summary);
        out.push_str("\n\n");
    }

    out
}

/// Writes the rendered artifact to
/// `<sessions_root>/<session_id>/tasks/<task_id>.md`, creating parent
/// directories with mode 0755 and the file itself with mode 0644.
pub fn write(sessions_root: &Path, session_id: &str, task: &Task) -> anyhow::Result<PathBuf> {
    let dir = sessions_root.join(session_id).join("tasks");
    fs::create_dir_all(&dir)?;
    set_mode(&dir, 0o755)?;
    let file_path = dir.join(format!("{}.md", task.id));
    let mut f = fs::OpenOptions::new().write(true).create(true).truncate(true).open(&file_path)?;
    f.write_all(render(task).as_bytes())?;
    set_mode(&file_path, 0o644)?;
    Ok(file_path)
}
