// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Session and task persistence.
//!
//! A [`FileStore`] keeps every session in a single JSON document, guarded by
//! an advisory file lock plus an in-process mutex. Older rows (a flat list
//! of messages, no sub-sessions or tasks) decode transparently into the
//! current item-tree shape.

pub mod artifact;
mod error;
mod file_store;
mod types;

pub use error::StoreError;
pub use file_store::{FileStore, SessionStore};
pub use types::{Session, SessionItem, Task, TaskStatus};
