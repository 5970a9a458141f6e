// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The control-surface listener (§6): accepts a single `addr` string and
//! dispatches to a unix-domain socket, a Windows named pipe, or a plain TCP
//! listener depending on its scheme.

use anyhow::{bail, Context, Result};
use std::time::Duration;

/// A bound, scheme-agnostic listening endpoint. Callers `accept()` in a loop
/// and hand each connection off to the same request handling regardless of
/// transport.
pub enum Endpoint {
    Tcp(tokio::net::TcpListener),
    #[cfg(unix)]
    Unix(tokio::net::UnixListener),
}

/// Binds `addr`, choosing a transport from its scheme:
///
/// - `unix://<path>` — a unix-domain socket. If a socket file already exists
///   at `<path>`, a 100ms connect probe distinguishes a stale socket (no
///   listener behind it — removed and recreated) from one already in use
///   (bind fails with an "already in use" error).
/// - `npipe://<name>` — a Windows named pipe. Not supported on other
///   platforms.
/// - anything else — treated as a `host:port` TCP address.
pub async fn listen(addr: &str) -> Result<Endpoint> {
    if let Some(path) = addr.strip_prefix("unix://") {
        return listen_unix(path).await;
    }
    if let Some(name) = addr.strip_prefix("npipe://") {
        return listen_npipe(name).await;
    }
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind TCP address {addr}"))?;
    Ok(Endpoint::Tcp(listener))
}

#[cfg(unix)]
async fn listen_unix(path: &str) -> Result<Endpoint> {
    let p = std::path::Path::new(path);
    if p.exists() {
        match tokio::time::timeout(Duration::from_millis(100), tokio::net::UnixStream::connect(p)).await {
            Ok(Ok(_)) => bail!("socket {path} is already in use"),
            _ => {
                // No listener answered within the probe window: stale socket
                // file left behind by a previous, uncleanly-terminated run.
                std::fs::remove_file(p).with_context(|| format!("failed to remove stale socket {path}"))?;
            }
        }
    }
    let listener = tokio::net::UnixListener::bind(p).with_context(|| format!("failed to bind unix socket {path}"))?;
    Ok(Endpoint::Unix(listener))
}

#[cfg(not(unix))]
async fn listen_unix(path: &str) -> Result<Endpoint> {
    bail!("unix:// listen addresses are not supported on this platform: {path}")
}

#[cfg(windows)]
async fn listen_npipe(name: &str) -> Result<Endpoint> {
    bail!("npipe:// support is not yet implemented: {name}")
}

#[cfg(not(windows))]
async fn listen_npipe(name: &str) -> Result<Endpoint> {
    bail!("npipe:// listen addresses are only supported on Windows: {name}")
}
