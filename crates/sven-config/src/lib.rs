// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod agent_def;
mod loader;
mod schema;

pub use agent_def::{AgentDefinition, Team};
pub use loader::load;
pub use schema::*;
