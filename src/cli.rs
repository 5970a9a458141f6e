// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "sven",
    about = "A session-store-backed CLI coding agent runtime",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file (overrides auto-discovery)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the effective configuration and exit
    ShowConfig,

    /// List saved sessions
    Sessions {
        /// Maximum number of sessions to show
        #[arg(long, short = 'n', default_value = "20")]
        limit: usize,
    },

    /// Run one Classic Runtime turn against a session and print the reply
    Chat {
        /// Session id to load (created if it does not exist)
        session: String,
        /// The message to send
        message: String,
    },

    /// Run the Task Runtime to completion (or a waiting/confirmation pause)
    /// against a session.
    Task {
        /// Session id to load (created if it does not exist)
        session: String,
        /// Starting goal for a new task, or the answer when resuming a
        /// waiting task. Omit when resuming after a tool confirmation.
        message: Option<String>,
        /// Skip interactive tool-call confirmation prompts.
        #[arg(long)]
        approve_tools: bool,
    },
}
