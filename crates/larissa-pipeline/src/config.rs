//! Per-pipeline execution settings.

use serde::{Deserialize, Serialize};

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// How the scheduler drives member nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One node at a time, in schedule order.
    #[default]
    Sequential,
    /// Independent nodes run together in waves; a node is admitted once all
    /// of its producers have finished.
    Concurrent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub execution: ExecutionMode,
    /// Capacity of the broadcast channel behind the pipeline's event emitter.
    pub event_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            execution: ExecutionMode::Sequential,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl PipelineConfig {
    pub fn sequential() -> Self {
        Self::default()
    }

    pub fn concurrent() -> Self {
        Self {
            execution: ExecutionMode::Concurrent,
            ..Self::default()
        }
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn is_concurrent(&self) -> bool {
        self.execution == ExecutionMode::Concurrent
    }
}
