// SPDX-License-Identifier: MIT

use crate::adk::model::Model;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Model references used by model nodes, resolved by name
#[derive(Clone)]
pub struct ModelRegistry {
    models: Arc<RwLock<HashMap<String, Arc<dyn Model>>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            models: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, name: impl Into<String>, model: Arc<dyn Model>) {
        let mut models = self.models.write().await;
        models.insert(name.into(), model);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Model>> {
        let models = self.models.read().await;
        models.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
