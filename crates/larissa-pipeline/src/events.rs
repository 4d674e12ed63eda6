//! Pipeline event system for observability.
//!
//! Emits [`PipelineEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! observers (loggers, editors, test harnesses) can follow a run without
//! holding a reference to the pipeline while it executes.

use larissa_types::NodeId;
use serde::{Deserialize, Serialize};

/// Events emitted while a pipeline runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineEvent {
    ScheduleComputed {
        pipeline: NodeId,
        order: Vec<NodeId>,
    },
    NodeStarted {
        pipeline: NodeId,
        node: NodeId,
        title: String,
    },
    NodeFinished {
        pipeline: NodeId,
        node: NodeId,
        duration_ms: u64,
    },
    /// The node was already `FINISHED` and was not run again.
    NodeSkipped {
        pipeline: NodeId,
        node: NodeId,
    },
    NodeFailed {
        pipeline: NodeId,
        node: NodeId,
        error: String,
    },
    PipelineCompleted {
        pipeline: NodeId,
        completed_nodes: Vec<NodeId>,
        duration_ms: u64,
    },
    PipelineFailed {
        pipeline: NodeId,
        error: String,
    },
}

impl PipelineEvent {
    /// The pipeline that emitted this event.
    pub fn pipeline(&self) -> NodeId {
        match self {
            PipelineEvent::ScheduleComputed { pipeline, .. }
            | PipelineEvent::NodeStarted { pipeline, .. }
            | PipelineEvent::NodeFinished { pipeline, .. }
            | PipelineEvent::NodeSkipped { pipeline, .. }
            | PipelineEvent::NodeFailed { pipeline, .. }
            | PipelineEvent::PipelineCompleted { pipeline, .. }
            | PipelineEvent::PipelineFailed { pipeline, .. } => *pipeline,
        }
    }
}

/// Event emitter wrapping a broadcast sender.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EVENT_CAPACITY)
    }
}
