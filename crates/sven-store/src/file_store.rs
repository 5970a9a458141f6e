// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! JSON-file-backed [`SessionStore`] with legacy-format decoding and a
//! single-row schema-version migration marker.

use crate::error::StoreError;
use crate::types::{Session, SessionItem};
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const CURRENT_SCHEMA_VERSION: u32 = 1;
const SCHEMA_VERSION_KEY: &str = "_schema_version";

pub trait SessionStore: Send + Sync {
    fn add(&self, session: Session) -> Result<(), StoreError>;
    fn get(&self, id: &str) -> Result<Session, StoreError>;
    /// Summaries in reverse-chronological order (most recently created first).
    fn list(&self) -> Result<Vec<Session>, StoreError>;
    fn update(&self, session: Session) -> Result<(), StoreError>;
    fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// Legacy on-disk row: a flat list of messages, no sub-sessions or tasks.
/// Pre-dates the item-tree representation. Distinguished from the current
/// shape by the presence of a `messages` field and the absence of `items`.
#[derive(Debug, Deserialize)]
struct LegacyRow {
    id: String,
    #[serde(default)]
    title: String,
    created_at: chrono::DateTime<chrono::Utc>,
    messages: Vec<sven_model::Message>,
    #[serde(default)]
    working_dir: String,
}

impl From<LegacyRow> for Session {
    fn from(row: LegacyRow) -> Self {
        let mut s = Session::new(row.id, row.working_dir, row.created_at);
        s.title = row.title;
        s.items = row.messages.into_iter().map(SessionItem::message).collect();
        s
    }
}

/// Decode one stored row, trying the current item-tree shape first and
/// falling back to the legacy flat-messages shape. The discriminator is the
/// presence of an `items` field: old rows never had one.
fn decode_row(value: &serde_json::Value) -> anyhow::Result<Session> {
    if value.get("items").is_some() {
        Ok(serde_json::from_value(value.clone())?)
    } else {
        let legacy: LegacyRow = serde_json::from_value(value.clone())?;
        Ok(legacy.into())
    }
}

struct Table {
    rows: HashMap<String, serde_json::Value>,
    schema_version: u32,
}

impl Table {
    fn empty() -> Self {
        Self { rows: HashMap::new(), schema_version: CURRENT_SCHEMA_VERSION }
    }

    fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::empty());
        }
        let mut f = File::open(path)?;
        let mut buf = String::new();
        f.read_to_string(&mut buf)?;
        if buf.trim().is_empty() {
            return Ok(Self::empty());
        }
        let mut raw: HashMap<String, serde_json::Value> = serde_json::from_str(&buf)?;
        let schema_version = raw
            .remove(SCHEMA_VERSION_KEY)
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32;
        let mut table = Self { rows: raw, schema_version };
        table.migrate()?;
        Ok(table)
    }

    /// Applies migrations in sequence up to [`CURRENT_SCHEMA_VERSION`]. There
    /// is currently exactly one migration step (legacy decode happens lazily
    /// on read instead, so this just advances the version marker), but the
    /// loop shape leaves room for real rewrites in future versions.
    fn migrate(&mut self) -> anyhow::Result<()> {
        while self.schema_version < CURRENT_SCHEMA_VERSION {
            self.schema_version += 1;
        }
        Ok(())
    }

    fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = self.rows.clone();
        out.insert(SCHEMA_VERSION_KEY.into(), serde_json::json!(self.schema_version));
        let mut f = OpenOptions::new().write(true).create(true).truncate(true).open(path)?;
        f.write_all(serde_json::to_string_pretty(&out)?.as_bytes())?;
        Ok(())
    }
}

/// Single JSON document store, guarded by an advisory file lock held for the
/// life of the handle plus an in-process mutex over the in-memory mirror.
pub struct FileStore {
    path: PathBuf,
    _lock_file: File,
    table: Mutex<Table>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let lock_file = OpenOptions::new().write(true).create(true).truncate(false).open(&path)?;
        lock_file
            .try_lock_exclusive()
            .map_err(|e| anyhow::anyhow!("could not acquire lock on {}: {e}", path.display()))?;
        let table = Table::load(&path)?;
        Ok(Self { path, _lock_file: lock_file, table: Mutex::new(table) })
    }

    /// Default on-disk location: `~/.cagent/sessions/store.json`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cagent")
            .join("sessions")
            .join("store.json")
    }
}

impl SessionStore for FileStore {
    fn add(&self, session: Session) -> Result<(), StoreError> {
        if session.id.is_empty() {
            return Err(StoreError::EmptyId);
        }
        let mut table = self.table.lock().map_err(|e| StoreError::Lock(e.to_string()))?;
        let value = serde_json::to_value(&session).map_err(|e| StoreError::Lock(e.to_string()))?;
        table.rows.insert(session.id.clone(), value);
        table.save(&self.path).map_err(|e| StoreError::Lock(e.to_string()))?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Session, StoreError> {
        if id.is_empty() {
            return Err(StoreError::EmptyId);
        }
        let table = self.table.lock().map_err(|e| StoreError::Lock(e.to_string()))?;
        let raw = table.rows.get(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        decode_row(raw).map_err(|e| StoreError::Lock(e.to_string()))
    }

    fn list(&self) -> Result<Vec<Session>, StoreError> {
        let table = self.table.lock().map_err(|e| StoreError::Lock(e.to_string()))?;
        let mut sessions: Vec<Session> = table
            .rows
            .values()
            .filter_map(|v| decode_row(v).ok())
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    fn update(&self, session: Session) -> Result<(), StoreError> {
        if session.id.is_empty() {
            return Err(StoreError::EmptyId);
        }
        let mut table = self.table.lock().map_err(|e| StoreError::Lock(e.to_string()))?;
        if !table.rows.contains_key(&session.id) {
            return Err(StoreError::NotFound(session.id));
        }
        let value = serde_json::to_value(&session).map_err(|e| StoreError::Lock(e.to_string()))?;
        table.rows.insert(session.id.clone(), value);
        table.save(&self.path).map_err(|e| StoreError::Lock(e.to_string()))?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        if id.is_empty() {
            return Err(StoreError::EmptyId);
        }
        let mut table = self.table.lock().map_err(|e| StoreError::Lock(e.to_string()))?;
        if table.rows.remove(id).is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        table.save(&self.path).map_err(|e| StoreError::Lock(e.to_string()))?;
        Ok(())
    }
}
