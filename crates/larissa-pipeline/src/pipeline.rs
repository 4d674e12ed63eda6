//! The pipeline node variant: member arena, graph mutation, and execution.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;

use larissa_types::{LarissaError, NodeId, NodeStatus, PortId, Result, Value};

use crate::block::Block;
use crate::config::{ExecutionMode, PipelineConfig};
use crate::environment::Environment;
use crate::events::{EventEmitter, PipelineEvent};
use crate::graph::{DiGraph, Vertex};
use crate::node::{Lifecycle, Node, NodeCore};
use crate::port::PortDirection;
use crate::scheduler;

/// One side of a [`Pipeline::connect`] call.
///
/// A node stands for its default output when producing and its default
/// input when consuming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Node(NodeId),
    Port(PortId),
}

impl From<NodeId> for Endpoint {
    fn from(id: NodeId) -> Self {
        Endpoint::Node(id)
    }
}

impl From<PortId> for Endpoint {
    fn from(id: PortId) -> Self {
        Endpoint::Port(id)
    }
}

/// Owner and direction of a port registered in the pipeline graph.
#[derive(Debug, Clone, Copy)]
struct PortRef {
    node: NodeId,
    direction: PortDirection,
}

/// A node whose work is running its member nodes in dependency order.
///
/// Members are edited through the pipeline only; their cores are not
/// reachable mutably from outside this crate:
///
/// ```compile_fail
/// use larissa_pipeline::{Environment, Lifecycle, Pipeline, Value};
///
/// let mut p = Pipeline::new(Environment::new());
/// let id = p.new_node("sum", Value::Null).unwrap();
/// p.node_mut(id).unwrap().core_mut().add_input("late", "number", false).unwrap();
/// ```
pub struct Pipeline {
    core: NodeCore,
    env: Arc<Environment>,
    config: PipelineConfig,
    graph: DiGraph,
    members: Vec<Option<Node>>,
    free: Vec<usize>,
    slots: HashMap<NodeId, usize>,
    ports: HashMap<PortId, PortRef>,
    events: EventEmitter,
}

impl Pipeline {
    pub fn new(env: impl Into<Arc<Environment>>) -> Self {
        Self::with_config(env, PipelineConfig::default())
    }

    pub fn with_config(env: impl Into<Arc<Environment>>, config: PipelineConfig) -> Self {
        Self {
            core: NodeCore::new("pipeline"),
            env: env.into(),
            events: EventEmitter::new(config.event_capacity),
            config,
            graph: DiGraph::new(),
            members: Vec::new(),
            free: Vec::new(),
            slots: HashMap::new(),
            ports: HashMap::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn environment(&self) -> &Arc<Environment> {
        &self.env
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn graph(&self) -> &DiGraph {
        &self.graph
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        let slot = *self.slots.get(&id)?;
        self.members.get(slot)?.as_ref()
    }

    /// Mutable access stays inside the crate: a member's ports and id are
    /// mirrored as graph vertices and must not change after insertion.
    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let slot = *self.slots.get(&id)?;
        self.members.get_mut(slot)?.as_mut()
    }

    /// Member nodes in arena order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.members.iter().flatten()
    }

    /// Id of a member's input port; `None` selects the default input.
    pub fn input(&self, node: NodeId, name: Option<&str>) -> Result<PortId> {
        Ok(self.member(node)?.core().input(name)?.id())
    }

    /// Id of a member's output port; `None` selects the default output.
    pub fn output(&self, node: NodeId, name: Option<&str>) -> Result<PortId> {
        Ok(self.member(node)?.core().output(name)?.id())
    }

    /// Value currently held by a member's output.
    pub fn output_value(&self, node: NodeId, name: Option<&str>) -> Result<Option<&Value>> {
        Ok(self.member(node)?.core().output(name)?.value())
    }

    /// Feed a value into a member's input directly.
    pub fn set_input_value(&mut self, node: NodeId, name: &str, value: Value) -> Result<()> {
        self.member_mut(node)?.core_mut().set_input_value(name, value)
    }

    /// Clear the value held by a member's input.
    pub fn reset_member_input(&mut self, node: NodeId, name: &str) -> Result<()> {
        self.member_mut(node)?.reset_input(name)
    }

    pub fn set_node_title(&mut self, node: NodeId, title: impl Into<String>) -> Result<()> {
        self.member_mut(node)?.core_mut().set_title(title);
        Ok(())
    }

    /// Declare an input on this pipeline's own boundary. Ports are declared
    /// before the pipeline is inserted into a parent.
    pub fn add_input(
        &mut self,
        name: impl Into<String>,
        port_type: impl Into<String>,
        required: bool,
    ) -> Result<PortId> {
        self.core.add_input(name, port_type, required)
    }

    /// Declare an output on this pipeline's own boundary.
    pub fn add_output(&mut self, name: impl Into<String>, port_type: impl Into<String>) -> Result<PortId> {
        self.core.add_output(name, port_type)
    }

    pub fn set_default_input(&mut self, name: &str) -> Result<()> {
        self.core.set_default_input(name)
    }

    pub fn set_default_output(&mut self, name: &str) -> Result<()> {
        self.core.set_default_output(name)
    }

    fn member(&self, id: NodeId) -> Result<&Node> {
        self.node(id).ok_or(LarissaError::NotAMember { node: id })
    }

    fn member_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.node_mut(id).ok_or(LarissaError::NotAMember { node: id })
    }

    // -----------------------------------------------------------------------
    // Graph mutation
    // -----------------------------------------------------------------------

    /// Resolve `identifier` through the environment, build a block with
    /// `options`, and add it as a member.
    pub fn new_node(&mut self, identifier: &str, options: Value) -> Result<NodeId> {
        let block_type = self.env.resolve(identifier)?;
        let block = Block::new(block_type, options)?;
        let id = self.insert_node(Node::Block(block))?;
        tracing::debug!(pipeline = %self.core.id(), node = %id, block = identifier, "Node added");
        Ok(id)
    }

    /// Add a pre-built node, e.g. a nested pipeline.
    ///
    /// Adds the node vertex, one vertex per port, and the structural edges
    /// `input -> node` and `node -> output`.
    pub fn insert_node(&mut self, node: impl Into<Node>) -> Result<NodeId> {
        let node = node.into();
        let id = node.id();
        if id == self.core.id() || self.graph.contains(Vertex::Node(id)) {
            return Err(LarissaError::DuplicateId { id: id.to_string() });
        }
        let ports: Vec<(PortId, PortDirection)> = node
            .core()
            .ports()
            .map(|p| (p.id(), p.direction()))
            .collect();
        if let Some((dup, _)) = ports
            .iter()
            .find(|(p, _)| self.graph.contains(Vertex::Port(*p)))
        {
            return Err(LarissaError::DuplicateId { id: dup.to_string() });
        }

        self.graph.add_vertex(Vertex::Node(id))?;
        for &(port, direction) in &ports {
            self.graph.add_vertex(Vertex::Port(port))?;
            match direction {
                PortDirection::Input => self.graph.add_edge(Vertex::Port(port), Vertex::Node(id))?,
                PortDirection::Output => self.graph.add_edge(Vertex::Node(id), Vertex::Port(port))?,
            }
            self.ports.insert(port, PortRef { node: id, direction });
        }

        let slot = match self.free.pop() {
            Some(slot) => {
                self.members[slot] = Some(node);
                slot
            }
            None => {
                self.members.push(Some(node));
                self.members.len() - 1
            }
        };
        self.slots.insert(id, slot);
        Ok(id)
    }

    /// Remove a member, its port vertices, and every edge touching them.
    pub fn remove_node(&mut self, id: NodeId) -> Result<()> {
        let slot = self
            .slots
            .remove(&id)
            .ok_or(LarissaError::NotAMember { node: id })?;
        if let Some(node) = self.members[slot].take() {
            for port in node.core().ports() {
                self.graph.remove_vertex(Vertex::Port(port.id()));
                self.ports.remove(&port.id());
            }
        }
        self.graph.remove_vertex(Vertex::Node(id));
        self.free.push(slot);
        tracing::debug!(pipeline = %self.core.id(), node = %id, "Node removed");
        Ok(())
    }

    /// Connect a producer output to a consumer input.
    ///
    /// The graph is unchanged when this fails.
    pub fn connect(
        &mut self,
        producer: impl Into<Endpoint>,
        consumer: impl Into<Endpoint>,
    ) -> Result<()> {
        let from = self.resolve_endpoint(producer.into(), PortDirection::Output)?;
        let to = self.resolve_endpoint(consumer.into(), PortDirection::Input)?;
        let (from_v, to_v) = (Vertex::Port(from), Vertex::Port(to));

        if self.graph.has_edge(from_v, to_v) {
            return Err(LarissaError::EdgeExists {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        if self
            .graph
            .predecessors(to_v)
            .iter()
            .any(|v| v.as_port().is_some())
        {
            return Err(LarissaError::InputAlreadyConnected { input: to });
        }

        self.graph.add_edge(from_v, to_v)?;
        if self.graph.reaches_cycle_from(to_v) {
            self.graph.remove_edge(from_v, to_v);
            return Err(LarissaError::Cycle { from, to });
        }
        tracing::debug!(pipeline = %self.core.id(), from = %from, to = %to, "Ports connected");
        Ok(())
    }

    fn resolve_endpoint(&self, endpoint: Endpoint, direction: PortDirection) -> Result<PortId> {
        match endpoint {
            Endpoint::Node(id) => {
                let core = self.member(id)?.core();
                let port = match direction {
                    PortDirection::Output => core.output(None)?,
                    PortDirection::Input => core.input(None)?,
                };
                Ok(port.id())
            }
            Endpoint::Port(id) => {
                let port = self
                    .ports
                    .get(&id)
                    .ok_or(LarissaError::ForeignPort { port: id })?;
                if !self.contains(port.node) {
                    return Err(LarissaError::NotAMember { node: port.node });
                }
                if port.direction != direction {
                    let kind = match direction {
                        PortDirection::Output => "output port",
                        PortDirection::Input => "input port",
                    };
                    return Err(LarissaError::not_found(kind, id.to_string()));
                }
                Ok(id)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// The order [`run`](Lifecycle::run) would visit members in.
    pub fn execution_order(&self) -> Vec<NodeId> {
        scheduler::execution_order(&self.graph)
    }

    /// Run one member out of order.
    ///
    /// Inputs receive whatever their producers currently hold; producers are
    /// not run.
    pub async fn run_node(&mut self, id: NodeId) -> Result<()> {
        self.pull_inputs(id)?;
        tracing::debug!(pipeline = %self.core.id(), node = %id, "Running single node");
        self.member_mut(id)?.run().await
    }

    /// Member nodes feeding `id` through a connection.
    fn producers_of(&self, id: NodeId) -> Vec<NodeId> {
        self.graph
            .predecessors(Vertex::Node(id))
            .into_iter()
            .flat_map(|input| self.graph.predecessors(input))
            .filter_map(|v| v.as_port())
            .filter_map(|p| self.ports.get(&p).map(|r| r.node))
            .collect()
    }

    /// Copy each connected producer's output value into `id`'s inputs.
    fn pull_inputs(&mut self, id: NodeId) -> Result<()> {
        let inputs: Vec<PortId> = self
            .member(id)?
            .core()
            .inputs()
            .values()
            .map(|p| p.id())
            .collect();

        let mut values = Vec::new();
        for input in inputs {
            for producer in self.graph.predecessors(Vertex::Port(input)) {
                let Some(output) = producer.as_port() else {
                    continue;
                };
                let Some(owner) = self.ports.get(&output).map(|r| r.node) else {
                    continue;
                };
                let value = self
                    .member(owner)?
                    .core()
                    .port(output)
                    .and_then(|p| p.value())
                    .cloned();
                if let Some(value) = value {
                    values.push((input, value));
                }
            }
        }

        let core = self.member_mut(id)?.core_mut();
        for (input, value) in values {
            if let Some(port) = core.port_mut(input) {
                port.set_value(value);
            }
        }
        Ok(())
    }

    async fn run_sequential(&mut self, order: &[NodeId]) -> Result<()> {
        let pipeline = self.core.id();
        for &id in order {
            if self.member(id)?.status() == NodeStatus::Finished {
                self.events.emit(PipelineEvent::NodeSkipped { pipeline, node: id });
                continue;
            }
            self.pull_inputs(id)?;
            self.emit_started(id)?;

            let started = Instant::now();
            let result = self.member_mut(id)?.run().await;
            self.emit_outcome(id, started.elapsed(), &result);
            result?;
        }
        Ok(())
    }

    /// Run in waves; every node in a wave has all producers finished.
    async fn run_concurrent(&mut self, order: &[NodeId]) -> Result<()> {
        let pipeline = self.core.id();
        let mut pending = Vec::with_capacity(order.len());
        for &id in order {
            if self.member(id)?.status() == NodeStatus::Finished {
                self.events.emit(PipelineEvent::NodeSkipped { pipeline, node: id });
            } else {
                pending.push(id);
            }
        }

        while !pending.is_empty() {
            let (wave, rest): (Vec<NodeId>, Vec<NodeId>) =
                pending.iter().copied().partition(|id| self.producers_finished(*id));
            if wave.is_empty() {
                return Err(LarissaError::Other(format!(
                    "{} nodes in pipeline {pipeline} wait on unfinished producers",
                    rest.len()
                )));
            }
            pending = rest;
            tracing::debug!(pipeline = %pipeline, nodes = wave.len(), "Running wave");

            let mut position = HashMap::with_capacity(wave.len());
            for (pos, &id) in wave.iter().enumerate() {
                self.pull_inputs(id)?;
                self.emit_started(id)?;
                if let Some(&slot) = self.slots.get(&id) {
                    position.insert(slot, pos);
                }
            }

            let runs = self
                .members
                .iter_mut()
                .enumerate()
                .filter_map(|(slot, node)| Some((*position.get(&slot)?, node.as_mut()?)))
                .map(|(pos, node)| async move {
                    let started = Instant::now();
                    let result = node.run().await;
                    (pos, started.elapsed(), result)
                });
            let mut results = join_all(runs).await;
            results.sort_by_key(|(pos, ..)| *pos);

            let mut first_error = None;
            for (pos, elapsed, result) in results {
                self.emit_outcome(wave[pos], elapsed, &result);
                if let Err(e) = result {
                    first_error.get_or_insert(e);
                }
            }
            if let Some(e) = first_error {
                return Err(e);
            }
        }
        Ok(())
    }

    fn producers_finished(&self, id: NodeId) -> bool {
        self.producers_of(id).into_iter().all(|p| {
            self.node(p)
                .is_some_and(|n| n.status() == NodeStatus::Finished)
        })
    }

    fn emit_started(&self, id: NodeId) -> Result<()> {
        let title = self.member(id)?.core().title().to_string();
        self.events.emit(PipelineEvent::NodeStarted {
            pipeline: self.core.id(),
            node: id,
            title,
        });
        Ok(())
    }

    fn emit_outcome(&self, id: NodeId, elapsed: Duration, result: &Result<()>) {
        let pipeline = self.core.id();
        match result {
            Ok(()) => self.events.emit(PipelineEvent::NodeFinished {
                pipeline,
                node: id,
                duration_ms: elapsed.as_millis() as u64,
            }),
            Err(e) => self.events.emit(PipelineEvent::NodeFailed {
                pipeline,
                node: id,
                error: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl Lifecycle for Pipeline {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn kind(&self) -> &'static str {
        "pipeline"
    }

    fn set_options(&mut self, options: Value) -> Result<()> {
        match options {
            Value::Null => Ok(()),
            other => Err(LarissaError::InvalidOptions {
                block: "pipeline".into(),
                message: format!("pipelines take no options, got {other}"),
            }),
        }
    }

    fn ready(&self) -> bool {
        true
    }

    fn compute_status(&self) -> NodeStatus {
        NodeStatus::Instantiated
    }

    async fn compute(&mut self) -> Result<()> {
        let pipeline = self.core.id();
        let order = self.execution_order();
        self.events.emit(PipelineEvent::ScheduleComputed {
            pipeline,
            order: order.clone(),
        });
        tracing::info!(pipeline = %pipeline, nodes = order.len(), mode = ?self.config.execution, "Pipeline run started");

        let started = Instant::now();
        let result = match self.config.execution {
            ExecutionMode::Sequential => self.run_sequential(&order).await,
            ExecutionMode::Concurrent => self.run_concurrent(&order).await,
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(()) => {
                tracing::info!(pipeline = %pipeline, duration_ms, "Pipeline run finished");
                self.events.emit(PipelineEvent::PipelineCompleted {
                    pipeline,
                    completed_nodes: order,
                    duration_ms,
                });
            }
            Err(e) => {
                tracing::warn!(pipeline = %pipeline, duration_ms, error = %e, "Pipeline run halted");
                self.events.emit(PipelineEvent::PipelineFailed {
                    pipeline,
                    error: e.to_string(),
                });
            }
        }
        result
    }

    /// Reset every member, then this pipeline's own ports and status.
    fn reset(&mut self) {
        for node in self.members.iter_mut().flatten() {
            node.reset();
        }
        let status = self.compute_status();
        self.core.set_status(status);
        self.core.reset_ports();
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("core", &self.core)
            .field("config", &self.config)
            .field("members", &self.slots.len())
            .field("vertices", &self.graph.vertex_count())
            .field("edges", &self.graph.edge_count())
            .finish_non_exhaustive()
    }
}
