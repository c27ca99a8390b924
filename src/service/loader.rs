//! Work loader backed by the behavior registry.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{BehaviorRegistry, Runnable, WorkLoader};
use crate::error::Result;

/// Resolves behavior refs against a [`BehaviorRegistry`].
///
/// Refs may be full hrefs (`"math:Calculator"`) or bare module names
/// (`"calculator"`).
#[derive(Debug)]
pub struct RegistryWorkLoader {
    behaviors: Arc<BehaviorRegistry>,
}

impl RegistryWorkLoader {
    pub fn new(behaviors: Arc<BehaviorRegistry>) -> Self {
        Self { behaviors }
    }
}

#[async_trait]
impl WorkLoader for RegistryWorkLoader {
    async fn get_work(&self, behavior_ref: &str) -> Result<Arc<dyn Runnable>> {
        debug!(behavior = behavior_ref, "loading behavior");
        self.behaviors.instantiate_lenient(behavior_ref)
    }
}
