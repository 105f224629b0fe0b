// SPDX-License-Identifier: MIT

//! Graph model, dependency analysis and level scheduling

pub mod builder;
pub mod scheduler;
pub mod types;

pub use builder::{build, DependencyGraph};
pub use scheduler::{plan, schedule, StartSet};
pub use types::{Edge, Graph, Node, NodeConfig, NodeType};
