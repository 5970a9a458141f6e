// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Multi-session host (§4.10): owns one background runtime per session,
//! forwards each session's event stream to a single UI sink, and tracks
//! per-tab running/attention/title state.

pub mod listen;

use sven_core::AgentEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify, RwLock};
use tokio_util::sync::CancellationToken;

/// An event tagged with the session it came from, the unit the sink consumes.
#[derive(Debug, Clone)]
pub struct TaggedEvent {
    pub session_id: String,
    pub inner: AgentEvent,
}

#[derive(Debug, Clone)]
pub struct TabInfo {
    pub session_id: String,
    pub title: String,
    pub is_running: bool,
    pub needs_attention: bool,
}

/// Messages delivered to the UI sink.
#[derive(Debug, Clone)]
pub enum SupervisorMessage {
    Event(TaggedEvent),
    TabsUpdated { tabs: Vec<TabInfo>, active_idx: Option<usize> },
}

struct RunnerState {
    title: String,
    is_running: bool,
    needs_attention: bool,
}

struct SessionRunner {
    cancel: CancellationToken,
    state: Arc<RwLock<RunnerState>>,
}

/// Hosts multiple concurrent sessions and fans their events into one sink.
pub struct Supervisor {
    runners: RwLock<HashMap<String, SessionRunner>>,
    order: RwLock<Vec<String>>,
    active_id: RwLock<Option<String>>,
    sink: RwLock<Option<mpsc::UnboundedSender<SupervisorMessage>>>,
    program_ready: Arc<Notify>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            runners: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            active_id: RwLock::new(None),
            sink: RwLock::new(None),
            program_ready: Arc::new(Notify::new()),
        }
    }

    /// Attaches the UI sink. Until this is called, the per-session
    /// subscriber tasks buffer in their channel rather than dropping events.
    pub async fn set_program(&self, sink: mpsc::UnboundedSender<SupervisorMessage>) {
        *self.sink.write().await = Some(sink);
        self.program_ready.notify_waiters();
    }

    /// Registers a new session and spawns its event-forwarding subscriber.
    ///
    /// `event_rx` is the channel the session's agent runtime streams
    /// [`AgentEvent`]s into; `cancel` is this session's cancellation token;
    /// `cleanup` runs (on a fresh, non-cancellable context) once the
    /// subscriber loop exits, whether from closure or cancellation.
    pub async fn add_session<F>(
        self: &Arc<Self>,
        session_id: String,
        working_dir: String,
        mut event_rx: mpsc::Receiver<AgentEvent>,
        cancel: CancellationToken,
        cleanup: F,
    ) where
        F: FnOnce() + Send + 'static,
    {
        let _ = &working_dir; // retained for parity with §4.10's add_session signature
        let state = Arc::new(RwLock::new(RunnerState {
            title: String::new(),
            is_running: false,
            needs_attention: false,
        }));

        {
            let mut runners = self.runners.write().await;
            runners.insert(session_id.clone(), SessionRunner { cancel: cancel.clone(), state: state.clone() });
        }
        self.order.write().await.push(session_id.clone());
        if self.active_id.read().await.is_none() {
            *self.active_id.write().await = Some(session_id.clone());
        }

        let this = self.clone();
        let sid = session_id.clone();
        let ready = self.program_ready.clone();
        tokio::spawn(async move {
            // Don't forward events until a sink is attached, so the welcome
            // burst (agent/team info, etc.) isn't lost before the UI attaches.
            if this.sink.read().await.is_none() {
                ready.notified().await;
            }

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    maybe_ev = event_rx.recv() => {
                        match maybe_ev {
                            Some(ev) => this.handle_event(&sid, ev, &state).await,
                            None => break,
                        }
                    }
                }
            }

            cleanup();
            this.forget(&sid).await;
        });
    }

    async fn handle_event(&self, session_id: &str, ev: AgentEvent, state: &Arc<RwLock<RunnerState>>) {
        let active = self.active_id.read().await.clone();
        let is_active = active.as_deref() == Some(session_id);
        {
            let mut st = state.write().await;
            match &ev {
                AgentEvent::StreamStarted { .. } => st.is_running = true,
                AgentEvent::StreamStopped => st.is_running = false,
                AgentEvent::SessionTitle(t) => st.title = t.clone(),
                AgentEvent::ToolCallConfirmation(_) | AgentEvent::MaxIterationsReached if !is_active => {
                    st.needs_attention = true;
                }
                _ => {}
            }
        }

        self.emit(SupervisorMessage::Event(TaggedEvent { session_id: session_id.to_string(), inner: ev })).await;
        self.emit_tabs_updated().await;
    }

    async fn emit(&self, msg: SupervisorMessage) {
        if let Some(sink) = self.sink.read().await.as_ref() {
            let _ = sink.send(msg);
        }
    }

    async fn emit_tabs_updated(&self) {
        let order = self.order.read().await.clone();
        let runners = self.runners.read().await;
        let active = self.active_id.read().await.clone();
        let mut tabs = Vec::with_capacity(order.len());
        let mut active_idx = None;
        for (i, id) in order.iter().enumerate() {
            if Some(id) == active.as_ref() {
                active_idx = Some(i);
            }
            if let Some(r) = runners.get(id) {
                let st = r.state.read().await;
                tabs.push(TabInfo {
                    session_id: id.clone(),
                    title: st.title.clone(),
                    is_running: st.is_running,
                    needs_attention: st.needs_attention,
                });
            }
        }
        drop(runners);
        self.emit(SupervisorMessage::TabsUpdated { tabs, active_idx }).await;
    }

    async fn forget(&self, session_id: &str) {
        self.runners.write().await.remove(session_id);
        self.order.write().await.retain(|id| id != session_id);
    }

    /// Switches the active session and clears its attention flag.
    pub async fn switch_to(&self, session_id: &str) {
        *self.active_id.write().await = Some(session_id.to_string());
        if let Some(r) = self.runners.read().await.get(session_id) {
            r.state.write().await.needs_attention = false;
        }
        self.emit_tabs_updated().await;
    }

    /// Cancels and removes a session, returning the new active id (empty
    /// string if none remain).
    pub async fn close_session(&self, session_id: &str) -> String {
        let was_active = self.active_id.read().await.as_deref() == Some(session_id);
        if let Some(r) = self.runners.write().await.remove(session_id) {
            r.cancel.cancel();
        }
        self.order.write().await.retain(|id| id != session_id);

        let new_active = if was_active {
            let order = self.order.read().await;
            order.first().cloned()
        } else {
            self.active_id.read().await.clone()
        };
        *self.active_id.write().await = new_active.clone();
        self.emit_tabs_updated().await;
        new_active.unwrap_or_default()
    }

    pub async fn shutdown(&self) {
        let runners = self.runners.write().await;
        for (_, r) in runners.iter() {
            r.cancel.cancel();
        }
    }

    pub async fn active_id(&self) -> Option<String> {
        self.active_id.read().await.clone()
    }

    pub async fn session_count(&self) -> usize {
        self.order.read().await.len()
    }
}
