//! Shared ids, node status, and errors for the Larissa dataflow engine.
//!
//! This crate provides the foundational types used across all other Larissa crates:
//! - `LarissaError`: unified error taxonomy, grouped into [`ErrorKind`] categories
//! - `NodeId` / `PortId`: unique identities for graph vertices
//! - `NodeStatus`: the node lifecycle states
//! - `Value`: the dynamic value carried by ports and block options

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dynamic value held by ports and passed as block options.
pub use serde_json::Value;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Unified error type for all Larissa subsystems.
///
/// Errors are `Clone` so a node can keep the failure it captured while the
/// same failure is handed back to the caller of `run`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LarissaError {
    // === Lookup ===
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    // === State ===
    #[error("Node {node} is already running")]
    AlreadyRunning { node: NodeId },

    #[error("Cannot run node {node}, required inputs have no value: {}", .inputs.join(", "))]
    MissingInputs { node: NodeId, inputs: Vec<String> },

    #[error("Node {node} is not a member of this pipeline")]
    NotAMember { node: NodeId },

    #[error("Port {port} does not belong to a member of this pipeline")]
    ForeignPort { port: PortId },

    #[error("Identifier already exists in this pipeline: {id}")]
    DuplicateId { id: String },

    #[error("Edge already exists: {from} -> {to}")]
    EdgeExists { from: String, to: String },

    #[error("Input port {input} already has a producer")]
    InputAlreadyConnected { input: PortId },

    #[error("Invalid options for '{block}': {message}")]
    InvalidOptions { block: String, message: String },

    #[error("Invalid block type '{block}': {message}")]
    InvalidBlockType { block: String, message: String },

    // === Graph ===
    #[error("Cannot connect ports {from} and {to} because of cycle")]
    Cycle { from: PortId, to: PortId },

    // === Execution ===
    #[error("Node {node} failed: {source}")]
    Execution {
        node: NodeId,
        #[source]
        source: Box<LarissaError>,
    },

    #[error("Block '{block}' failed: {message}")]
    BlockFailed { block: String, message: String },

    #[error("{0}")]
    Other(String),
}

/// The four failure categories every [`LarissaError`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    State,
    Cycle,
    Execution,
}

impl LarissaError {
    /// Shorthand for a lookup failure.
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        LarissaError::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Shorthand for a failure raised by a block executor.
    pub fn block_failed(block: impl Into<String>, message: impl Into<String>) -> Self {
        LarissaError::BlockFailed {
            block: block.into(),
            message: message.into(),
        }
    }

    /// The category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LarissaError::NotFound { .. } => ErrorKind::NotFound,
            LarissaError::AlreadyRunning { .. }
            | LarissaError::MissingInputs { .. }
            | LarissaError::NotAMember { .. }
            | LarissaError::ForeignPort { .. }
            | LarissaError::DuplicateId { .. }
            | LarissaError::EdgeExists { .. }
            | LarissaError::InputAlreadyConnected { .. }
            | LarissaError::InvalidOptions { .. }
            | LarissaError::InvalidBlockType { .. } => ErrorKind::State,
            LarissaError::Cycle { .. } => ErrorKind::Cycle,
            LarissaError::Execution { .. }
            | LarissaError::BlockFailed { .. }
            | LarissaError::Other(_) => ErrorKind::Execution,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_state(&self) -> bool {
        self.kind() == ErrorKind::State
    }

    pub fn is_cycle(&self) -> bool {
        self.kind() == ErrorKind::Cycle
    }

    pub fn is_execution(&self) -> bool {
        self.kind() == ErrorKind::Execution
    }

    /// Follow nested `Execution` wrappers down to the original failure.
    pub fn root_cause(&self) -> &LarissaError {
        let mut current = self;
        while let LarissaError::Execution { source, .. } = current {
            current = source;
        }
        current
    }

    /// The innermost node recorded as having failed, if any.
    pub fn failed_node(&self) -> Option<NodeId> {
        let mut current = self;
        let mut node = None;
        while let LarissaError::Execution { node: n, source } = current {
            node = Some(*n);
            current = source;
        }
        node
    }
}

/// A convenience alias for `Result<T, LarissaError>`.
pub type Result<T> = std::result::Result<T, LarissaError>;

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// Unique identity of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for NodeId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Unique identity of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(Uuid);

impl PortId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PortId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for PortId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// NodeStatus: lifecycle state of a node
// ---------------------------------------------------------------------------

/// Lifecycle state of a node.
///
/// `Ready` is a recognised state that no transition assigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Instantiated,
    Ready,
    Running,
    Finished,
    Errored,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Instantiated => "INSTANTIATED",
            NodeStatus::Ready => "READY",
            NodeStatus::Running => "RUNNING",
            NodeStatus::Finished => "FINISHED",
            NodeStatus::Errored => "ERRORED",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_not_found() {
        let err = LarissaError::not_found("plugin", "logic");
        assert_eq!(err.to_string(), "plugin not found: logic");
    }

    #[test]
    fn error_display_missing_inputs() {
        let node = NodeId::new();
        let err = LarissaError::MissingInputs {
            node,
            inputs: vec!["number1".into(), "number2".into()],
        };
        assert_eq!(
            err.to_string(),
            format!("Cannot run node {node}, required inputs have no value: number1, number2")
        );
    }

    #[test]
    fn error_display_cycle_names_both_ports() {
        let from = PortId::new();
        let to = PortId::new();
        let s = LarissaError::Cycle { from, to }.to_string();
        assert!(s.contains(&from.to_string()));
        assert!(s.contains(&to.to_string()));
    }

    #[test]
    fn error_display_execution_includes_source() {
        let node = NodeId::new();
        let err = LarissaError::Execution {
            node,
            source: Box::new(LarissaError::block_failed("sum", "not a number")),
        };
        assert_eq!(
            err.to_string(),
            format!("Node {node} failed: Block 'sum' failed: not a number")
        );
    }

    // --- kind ---

    #[test]
    fn kind_not_found() {
        assert_eq!(
            LarissaError::not_found("block type", "x").kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn kind_state_variants() {
        let node = NodeId::new();
        assert!(LarissaError::AlreadyRunning { node }.is_state());
        assert!(LarissaError::NotAMember { node }.is_state());
        assert!(LarissaError::MissingInputs {
            node,
            inputs: vec![]
        }
        .is_state());
        assert!(LarissaError::InputAlreadyConnected {
            input: PortId::new()
        }
        .is_state());
    }

    #[test]
    fn kind_cycle() {
        let err = LarissaError::Cycle {
            from: PortId::new(),
            to: PortId::new(),
        };
        assert!(err.is_cycle());
        assert!(!err.is_state());
    }

    #[test]
    fn kind_execution() {
        assert!(LarissaError::block_failed("AND", "boom").is_execution());
        assert!(LarissaError::Other("x".into()).is_execution());
    }

    // --- root_cause / failed_node ---

    #[test]
    fn root_cause_unwraps_nested_execution() {
        let inner = NodeId::new();
        let outer = NodeId::new();
        let err = LarissaError::Execution {
            node: outer,
            source: Box::new(LarissaError::Execution {
                node: inner,
                source: Box::new(LarissaError::block_failed("sum", "bad")),
            }),
        };
        assert!(matches!(
            err.root_cause(),
            LarissaError::BlockFailed { block, .. } if block == "sum"
        ));
        assert_eq!(err.failed_node(), Some(inner));
    }

    #[test]
    fn failed_node_none_for_plain_error() {
        assert_eq!(LarissaError::Other("x".into()).failed_node(), None);
    }

    // --- ids ---

    #[test]
    fn ids_are_unique() {
        assert_ne!(NodeId::new(), NodeId::new());
        assert_ne!(PortId::new(), PortId::new());
    }

    #[test]
    fn node_id_serializes_as_plain_uuid() {
        let id = NodeId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }

    // --- NodeStatus ---

    #[test]
    fn status_serializes_to_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&NodeStatus::Instantiated).unwrap(),
            "\"INSTANTIATED\""
        );
        assert_eq!(
            serde_json::to_string(&NodeStatus::Errored).unwrap(),
            "\"ERRORED\""
        );
        let status: NodeStatus = serde_json::from_str("\"FINISHED\"").unwrap();
        assert_eq!(status, NodeStatus::Finished);
    }

    #[test]
    fn status_display_matches_serialized_form() {
        assert_eq!(NodeStatus::Running.to_string(), "RUNNING");
        assert_eq!(NodeStatus::Ready.to_string(), "READY");
    }
}
