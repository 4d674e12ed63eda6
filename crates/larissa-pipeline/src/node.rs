//! Node lifecycle: shared node state, change notifications, and the
//! [`Lifecycle`] capability every node variant implements.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use larissa_types::{LarissaError, NodeId, NodeStatus, PortId, Result, Value};

use crate::block::Block;
use crate::pipeline::Pipeline;
use crate::port::{Port, PortDirection};

// ---------------------------------------------------------------------------
// Change notifications
// ---------------------------------------------------------------------------

/// A status or title mutation, delivered synchronously to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeChange {
    Status { node: NodeId, status: NodeStatus },
    Title { node: NodeId, title: String },
}

impl NodeChange {
    /// Name of the field that changed.
    pub fn field(&self) -> &'static str {
        match self {
            NodeChange::Status { .. } => "status",
            NodeChange::Title { .. } => "title",
        }
    }

    pub fn node(&self) -> NodeId {
        match self {
            NodeChange::Status { node, .. } | NodeChange::Title { node, .. } => *node,
        }
    }
}

type Listener = Arc<dyn Fn(&NodeChange) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// Handle returned by [`NodeCore::subscribe`].
///
/// Dropping the handle keeps the listener registered; call
/// [`unsubscribe`](Subscription::unsubscribe) to remove it.
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            let mut guard = listeners.lock().unwrap_or_else(PoisonError::into_inner);
            guard.entries.retain(|(id, _)| *id != self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// ---------------------------------------------------------------------------
// NodeCore: state shared by every node variant
// ---------------------------------------------------------------------------

/// Identity, status, ports, and subscribers of a node.
pub struct NodeCore {
    id: NodeId,
    status: NodeStatus,
    title: String,
    inputs: IndexMap<String, Port>,
    outputs: IndexMap<String, Port>,
    default_input: Option<String>,
    default_output: Option<String>,
    error: Option<LarissaError>,
    listeners: Arc<Mutex<Listeners>>,
}

impl NodeCore {
    pub fn new(title: impl Into<String>) -> Self {
        Self::with_id(NodeId::new(), title)
    }

    pub(crate) fn with_id(id: NodeId, title: impl Into<String>) -> Self {
        Self {
            id,
            status: NodeStatus::Instantiated,
            title: title.into(),
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
            default_input: None,
            default_output: None,
            error: None,
            listeners: Arc::new(Mutex::new(Listeners::default())),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// The failure captured by the last run; only present while `ERRORED`.
    pub fn error(&self) -> Option<&LarissaError> {
        self.error.as_ref()
    }

    pub fn inputs(&self) -> &IndexMap<String, Port> {
        &self.inputs
    }

    pub fn outputs(&self) -> &IndexMap<String, Port> {
        &self.outputs
    }

    /// All ports, inputs first.
    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.inputs.values().chain(self.outputs.values())
    }

    pub fn port(&self, id: PortId) -> Option<&Port> {
        self.ports().find(|p| p.id() == id)
    }

    pub(crate) fn port_mut(&mut self, id: PortId) -> Option<&mut Port> {
        self.inputs
            .values_mut()
            .chain(self.outputs.values_mut())
            .find(|p| p.id() == id)
    }

    /// Look up an input by name, or the default input when `name` is `None`.
    pub fn input(&self, name: Option<&str>) -> Result<&Port> {
        match name {
            Some(name) => self
                .inputs
                .get(name)
                .ok_or_else(|| LarissaError::not_found("input", name)),
            None => self
                .default_input
                .as_ref()
                .and_then(|n| self.inputs.get(n))
                .ok_or_else(|| LarissaError::not_found("default input", self.id.to_string())),
        }
    }

    /// Look up an output by name, or the default output when `name` is `None`.
    pub fn output(&self, name: Option<&str>) -> Result<&Port> {
        match name {
            Some(name) => self
                .outputs
                .get(name)
                .ok_or_else(|| LarissaError::not_found("output", name)),
            None => self
                .default_output
                .as_ref()
                .and_then(|n| self.outputs.get(n))
                .ok_or_else(|| LarissaError::not_found("default output", self.id.to_string())),
        }
    }

    pub(crate) fn input_mut(&mut self, name: &str) -> Result<&mut Port> {
        self.inputs
            .get_mut(name)
            .ok_or_else(|| LarissaError::not_found("input", name))
    }

    pub fn has_default_input(&self) -> bool {
        self.default_input.is_some()
    }

    pub fn has_default_output(&self) -> bool {
        self.default_output.is_some()
    }

    /// Add an input port. Fails if the name is already taken.
    pub(crate) fn add_input(
        &mut self,
        name: impl Into<String>,
        port_type: impl Into<String>,
        required: bool,
    ) -> Result<PortId> {
        let name = name.into();
        if self.inputs.contains_key(&name) {
            return Err(LarissaError::DuplicateId {
                id: format!("input '{name}' on node {}", self.id),
            });
        }
        let port = Port::new(self.id, PortDirection::Input, name.clone(), port_type, required);
        let id = port.id();
        self.inputs.insert(name, port);
        Ok(id)
    }

    /// Add an output port. Fails if the name is already taken.
    pub(crate) fn add_output(
        &mut self,
        name: impl Into<String>,
        port_type: impl Into<String>,
    ) -> Result<PortId> {
        let name = name.into();
        if self.outputs.contains_key(&name) {
            return Err(LarissaError::DuplicateId {
                id: format!("output '{name}' on node {}", self.id),
            });
        }
        let port = Port::new(self.id, PortDirection::Output, name.clone(), port_type, false);
        let id = port.id();
        self.outputs.insert(name, port);
        Ok(id)
    }

    pub(crate) fn set_default_input(&mut self, name: &str) -> Result<()> {
        self.input(Some(name))?;
        self.default_input = Some(name.to_string());
        Ok(())
    }

    pub(crate) fn set_default_output(&mut self, name: &str) -> Result<()> {
        self.output(Some(name))?;
        self.default_output = Some(name.to_string());
        Ok(())
    }

    /// Feed a value into an input directly, e.g. one that has no producer.
    pub fn set_input_value(&mut self, name: &str, value: Value) -> Result<()> {
        self.input_mut(name)?.set_value(value);
        Ok(())
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.notify(NodeChange::Title {
            node: self.id,
            title: self.title.clone(),
        });
    }

    pub(crate) fn set_status(&mut self, status: NodeStatus) {
        if status != NodeStatus::Errored {
            self.error = None;
        }
        if self.status != status {
            self.status = status;
            self.notify(NodeChange::Status {
                node: self.id,
                status,
            });
        }
    }

    pub(crate) fn set_error(&mut self, error: LarissaError) {
        self.error = Some(error);
    }

    /// Names of required inputs that currently hold no value.
    pub fn missing_required_inputs(&self) -> Vec<String> {
        self.inputs
            .values()
            .filter(|p| p.is_required() && !p.has_value())
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Inputs for reading alongside outputs for writing.
    pub(crate) fn ports_split_mut(
        &mut self,
    ) -> (&IndexMap<String, Port>, &mut IndexMap<String, Port>) {
        (&self.inputs, &mut self.outputs)
    }

    pub(crate) fn reset_ports(&mut self) {
        for port in self.inputs.values_mut().chain(self.outputs.values_mut()) {
            port.reset();
        }
    }

    /// Register a listener for status and title changes.
    pub fn subscribe(&self, listener: impl Fn(&NodeChange) + Send + Sync + 'static) -> Subscription {
        let mut guard = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let id = guard.next_id;
        guard.next_id += 1;
        guard.entries.push((id, Arc::new(listener)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    fn notify(&self, change: NodeChange) {
        // Snapshot first so a listener may unsubscribe while being notified.
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(&change);
        }
    }
}

impl fmt::Debug for NodeCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeCore")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("title", &self.title)
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field("outputs", &self.outputs.keys().collect::<Vec<_>>())
            .field("error", &self.error)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Lifecycle: the node state machine
// ---------------------------------------------------------------------------

/// Capability implemented by every node variant.
///
/// Variants supply the required methods; the state machine in [`run`],
/// [`can_run`] and [`reset`] is shared.
///
/// [`run`]: Lifecycle::run
/// [`can_run`]: Lifecycle::can_run
/// [`reset`]: Lifecycle::reset
#[async_trait]
pub trait Lifecycle: Send {
    fn core(&self) -> &NodeCore;

    fn core_mut(&mut self) -> &mut NodeCore;

    /// Short variant name, e.g. `"block"` or `"pipeline"`.
    fn kind(&self) -> &'static str;

    fn set_options(&mut self, options: Value) -> Result<()>;

    /// Variant readiness, consulted once every required input has a value.
    fn ready(&self) -> bool;

    /// The status a reset returns this node to.
    fn compute_status(&self) -> NodeStatus;

    /// The variant's work. Called only by [`run`](Lifecycle::run).
    async fn compute(&mut self) -> Result<()>;

    fn id(&self) -> NodeId {
        self.core().id()
    }

    fn status(&self) -> NodeStatus {
        self.core().status()
    }

    fn can_run(&self) -> bool {
        self.core().missing_required_inputs().is_empty() && self.ready()
    }

    /// Drive the node through `RUNNING` to `FINISHED` or `ERRORED`.
    async fn run(&mut self) -> Result<()> {
        let id = self.id();
        if !self.can_run() {
            let err = LarissaError::MissingInputs {
                node: id,
                inputs: self.core().missing_required_inputs(),
            };
            let core = self.core_mut();
            core.set_status(NodeStatus::Errored);
            core.set_error(err.clone());
            return Err(err);
        }
        match self.status() {
            NodeStatus::Running => return Err(LarissaError::AlreadyRunning { node: id }),
            NodeStatus::Finished => return Ok(()),
            _ => {}
        }

        self.core_mut().set_status(NodeStatus::Running);
        tracing::debug!(node = %id, kind = self.kind(), title = %self.core().title(), "Node running");

        match self.compute().await {
            Ok(()) => {
                self.core_mut().set_status(NodeStatus::Finished);
                tracing::debug!(node = %id, "Node finished");
                Ok(())
            }
            Err(e) => {
                let err = match e {
                    e @ LarissaError::Execution { .. } => e,
                    other => LarissaError::Execution {
                        node: id,
                        source: Box::new(other),
                    },
                };
                tracing::warn!(node = %id, error = %err, "Node failed");
                let core = self.core_mut();
                core.set_status(NodeStatus::Errored);
                core.set_error(err.clone());
                Err(err)
            }
        }
    }

    /// Recompute the status, then clear every port value.
    fn reset(&mut self) {
        let status = self.compute_status();
        let core = self.core_mut();
        core.set_status(status);
        core.reset_ports();
    }

    /// Clear a single input and recompute the status.
    fn reset_input(&mut self, name: &str) -> Result<()> {
        self.core_mut().input_mut(name)?.reset();
        let status = self.compute_status();
        self.core_mut().set_status(status);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Node: tagged union of the concrete variants
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum Node {
    Block(Block),
    Pipeline(Pipeline),
}

impl Node {
    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Node::Block(b) => Some(b),
            Node::Pipeline(_) => None,
        }
    }

    pub fn as_pipeline(&self) -> Option<&Pipeline> {
        match self {
            Node::Pipeline(p) => Some(p),
            Node::Block(_) => None,
        }
    }

    pub fn as_pipeline_mut(&mut self) -> Option<&mut Pipeline> {
        match self {
            Node::Pipeline(p) => Some(p),
            Node::Block(_) => None,
        }
    }
}

impl From<Block> for Node {
    fn from(block: Block) -> Self {
        Node::Block(block)
    }
}

impl From<Pipeline> for Node {
    fn from(pipeline: Pipeline) -> Self {
        Node::Pipeline(pipeline)
    }
}

#[async_trait]
impl Lifecycle for Node {
    fn core(&self) -> &NodeCore {
        match self {
            Node::Block(b) => b.core(),
            Node::Pipeline(p) => p.core(),
        }
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        match self {
            Node::Block(b) => b.core_mut(),
            Node::Pipeline(p) => p.core_mut(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Node::Block(b) => b.kind(),
            Node::Pipeline(p) => p.kind(),
        }
    }

    fn set_options(&mut self, options: Value) -> Result<()> {
        match self {
            Node::Block(b) => b.set_options(options),
            Node::Pipeline(p) => p.set_options(options),
        }
    }

    fn ready(&self) -> bool {
        match self {
            Node::Block(b) => b.ready(),
            Node::Pipeline(p) => p.ready(),
        }
    }

    fn compute_status(&self) -> NodeStatus {
        match self {
            Node::Block(b) => b.compute_status(),
            Node::Pipeline(p) => p.compute_status(),
        }
    }

    async fn compute(&mut self) -> Result<()> {
        match self {
            Node::Block(b) => b.compute().await,
            Node::Pipeline(p) => p.compute().await,
        }
    }

    fn reset(&mut self) {
        match self {
            Node::Block(b) => b.reset(),
            Node::Pipeline(p) => p.reset(),
        }
    }
}
