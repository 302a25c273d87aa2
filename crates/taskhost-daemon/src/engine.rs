//! Local task engine.
//!
//! A minimal engine behind the construction seam: it records the frozen
//! capability set and the checkpointed tasks it resumed managing. The real
//! container-runtime engine plugs in through the same
//! [`TaskEngineFactory`] trait.

use taskhost_core::engine::{EngineError, ResolvedCapabilities, TaskEngine, TaskEngineFactory};
use taskhost_core::state::TaskSnapshot;
use tracing::info;

/// Engine handle holding the frozen capabilities and resumed tasks.
pub struct LocalTaskEngine {
    capabilities: ResolvedCapabilities,
    resumed: Vec<String>,
}

impl TaskEngine for LocalTaskEngine {
    fn capabilities(&self) -> ResolvedCapabilities {
        self.capabilities
    }

    fn resumed_tasks(&self) -> &[String] {
        &self.resumed
    }
}

/// Factory for [`LocalTaskEngine`].
#[derive(Debug, Default)]
pub struct LocalTaskEngineFactory;

impl TaskEngineFactory for LocalTaskEngineFactory {
    type Engine = LocalTaskEngine;

    fn construct(
        &self,
        capabilities: ResolvedCapabilities,
        snapshot: TaskSnapshot,
    ) -> Result<Self::Engine, EngineError> {
        let resumed = snapshot.task_ids();
        info!(
            resumed = resumed.len(),
            task_resource_limits = capabilities.task_resource_limits,
            "constructing local task engine"
        );
        Ok(LocalTaskEngine {
            capabilities,
            resumed,
        })
    }
}
