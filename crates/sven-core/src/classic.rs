// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Classic Runtime (§4.5): builds the message list sent to the model for a
//! non-task turn.
//!
//! [`build_classic_prompt`] is a pure function of the agent's static
//! configuration and the session's stored items — no I/O, no mutation. This
//! is what makes prompt-prefix stability (P6) checkable: calling it twice
//! with the same agent/session/`now` produces byte-identical output.

use chrono::{DateTime, Utc};
use sven_model::{Message, MessageContent};
use sven_store::{Session, SessionItem};

use crate::agent_runtime::Agent;

/// Conversation messages beyond this count are dropped, oldest first
/// (§4.5 step 5, P2). The handoff/instruction/tool-set-instruction prefix is
/// never subject to this cap.
pub const MAX_CLASSIC_MESSAGES: usize = 100;

/// Build the full message list for a classic-mode completion request.
pub fn build_classic_prompt(agent: &Agent, session: &Session, now: DateTime<Utc>) -> Vec<Message> {
    let mut prefix = Vec::new();
    if let Some(handoff) = agent.handoff_message() {
        prefix.push(handoff);
    }
    prefix.push(agent.instruction_message(now));
    for instructions in agent.tool_set_instructions() {
        prefix.push(Message::system(instructions));
    }

    let conversation = trim_to_cap(remaining_messages(session), MAX_CLASSIC_MESSAGES);

    prefix.into_iter().chain(conversation).collect()
}

/// §4.5 step 4: find the most recent summary marker. If present, everything
/// before it collapses into a single "Session Summary: <text>" system
/// message and only items after the marker contribute their messages.
/// Without a marker, every item in the session contributes.
fn remaining_messages(session: &Session) -> Vec<Message> {
    let marker_idx = session
        .items
        .iter()
        .rposition(|item| matches!(item, SessionItem::SummaryMarker { .. }));

    let mut out = Vec::new();
    let tail: &[SessionItem] = match marker_idx {
        Some(idx) => {
            if let SessionItem::SummaryMarker { text, .. } = &session.items[idx] {
                out.push(Message::system(format!("Session Summary: {text}")));
            }
            &session.items[idx + 1..]
        }
        None => &session.items[..],
    };

    for item in tail {
        out.extend(item.flatten_messages().into_iter().cloned());
    }
    out
}

/// Keep at most `cap` trailing messages, then drop any leading `ToolResult`
/// whose matching `ToolCall` fell outside the retained window — an orphaned
/// tool result with no call would otherwise confuse (or be rejected by) the
/// model (P2).
fn trim_to_cap(messages: Vec<Message>, cap: usize) -> Vec<Message> {
    let start = messages.len().saturating_sub(cap);
    let mut trimmed: Vec<Message> = messages[start..].to_vec();

    while let Some(first) = trimmed.first() {
        let orphaned = match &first.content {
            MessageContent::ToolResult { tool_call_id, .. } => !trimmed.iter().any(|m| {
                matches!(
                    &m.content,
                    MessageContent::ToolCall { tool_call_id: id, .. } if id == tool_call_id
                )
            }),
            _ => false,
        };
        if orphaned {
            trimmed.remove(0);
        } else {
            break;
        }
    }

    trimmed
}
