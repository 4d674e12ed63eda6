//! Node lifecycle, pipeline graph, scheduler, and built-in blocks.
//!
//! This crate implements the Larissa dataflow engine: nodes with typed ports
//! and a shared run state machine, pipelines that own a graph of node and
//! port vertices, cycle-rejecting connections, backward-traversal scheduling,
//! and the block registries plugins are resolved through.

pub mod block;
pub mod blocks;
pub mod config;
pub mod environment;
pub mod events;
pub mod graph;
pub mod node;
pub mod pipeline;
pub mod port;
pub mod scheduler;

pub use block::{builtin_registry, Block, BlockContext, BlockExecutor, BlockRegistry, BlockType, PortSpec};
pub use config::{ExecutionMode, PipelineConfig};
pub use environment::{Environment, Plugin};
pub use events::{EventEmitter, PipelineEvent};
pub use graph::{DiGraph, Vertex};
pub use node::{Lifecycle, Node, NodeChange, NodeCore, Subscription};
pub use pipeline::{Endpoint, Pipeline};
pub use port::{Port, PortDirection};
pub use scheduler::execution_order;

pub use larissa_types::{ErrorKind, LarissaError, NodeId, NodeStatus, PortId, Result, Value};
