// SPDX-License-Identifier: MIT

//! nodeflow-rs: a graph execution engine for typed processing nodes.
//!
//! - [adk] holds the collaborator contracts (models, capabilities, errors)
//! - [nodeflow] holds the graph model, scheduler, executor and resource broker

pub mod adk;
pub mod nodeflow;
