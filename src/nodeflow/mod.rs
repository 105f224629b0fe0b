// SPDX-License-Identifier: MIT

pub mod broker;
pub mod config;
pub mod engine;
pub mod graph;
pub mod library;
pub mod loader;
pub mod mcp;
pub mod registry;
pub mod sinks;
