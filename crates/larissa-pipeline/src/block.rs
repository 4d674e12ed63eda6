//! Block type descriptors, the executor trait, the block node variant, and
//! the block registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

use larissa_types::{LarissaError, NodeId, NodeStatus, Result, Value};

use crate::node::{Lifecycle, NodeCore};
use crate::port::Port;

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Declaration of one input or output on a block type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    pub name: String,
    pub ty: String,
    pub required: bool,
}

impl PortSpec {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Static description of a leaf computation.
#[derive(Clone)]
pub struct BlockType {
    pub name: String,
    pub inputs: Vec<PortSpec>,
    pub outputs: Vec<PortSpec>,
    /// Options schema. Kept for callers; not validated here.
    pub options: Option<Value>,
    pub executor: Arc<dyn BlockExecutor>,
}

impl BlockType {
    pub fn new(name: impl Into<String>, executor: impl BlockExecutor + 'static) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            options: None,
            executor: Arc::new(executor),
        }
    }

    pub fn input(mut self, spec: PortSpec) -> Self {
        self.inputs.push(spec);
        self
    }

    pub fn output(mut self, spec: PortSpec) -> Self {
        self.outputs.push(spec);
        self
    }

    pub fn options_schema(mut self, schema: Value) -> Self {
        self.options = Some(schema);
        self
    }
}

impl fmt::Debug for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockType")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// BlockExecutor trait and its context
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BlockExecutor: Send + Sync {
    /// Read inputs and options from `ctx`, write outputs back to it.
    async fn execute(&self, ctx: &mut BlockContext<'_>) -> Result<()>;
}

/// What an executor can see of the node it runs for.
pub struct BlockContext<'a> {
    node: NodeId,
    block: &'a str,
    inputs: &'a IndexMap<String, Port>,
    outputs: &'a mut IndexMap<String, Port>,
    options: &'a Value,
}

impl<'a> BlockContext<'a> {
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// Name of the block type being executed.
    pub fn block_name(&self) -> &str {
        self.block
    }

    /// Current value of an input. `Ok(None)` when the input holds nothing.
    pub fn get_input(&self, name: &str) -> Result<Option<&Value>> {
        self.inputs
            .get(name)
            .map(Port::value)
            .ok_or_else(|| LarissaError::not_found("input", name))
    }

    /// Current value of an input that must hold one.
    pub fn input(&self, name: &str) -> Result<&Value> {
        self.get_input(name)?.ok_or_else(|| {
            LarissaError::block_failed(self.block, format!("input '{name}' has no value"))
        })
    }

    pub fn get_options(&self) -> &Value {
        self.options
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    pub fn set_output(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let port = self
            .outputs
            .get_mut(name)
            .ok_or_else(|| LarissaError::not_found("output", name))?;
        port.set_value(value.into());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Block: node variant wrapping one descriptor
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Block {
    core: NodeCore,
    block_type: Arc<BlockType>,
    options: Value,
}

impl Block {
    /// Instantiate ports from the descriptor and store `options`.
    ///
    /// A single declared input (or output), or one named `"default"`, becomes
    /// the node's default input (or output).
    pub fn new(block_type: Arc<BlockType>, options: Value) -> Result<Self> {
        let mut core = NodeCore::new(block_type.name.clone());
        let invalid = |e: LarissaError| LarissaError::InvalidBlockType {
            block: block_type.name.clone(),
            message: e.to_string(),
        };

        for spec in &block_type.inputs {
            core.add_input(spec.name.clone(), spec.ty.clone(), spec.required)
                .map_err(invalid)?;
        }
        for spec in &block_type.outputs {
            core.add_output(spec.name.clone(), spec.ty.clone())
                .map_err(invalid)?;
        }

        if let Some(name) = default_port_name(&block_type.inputs) {
            core.set_default_input(&name)?;
        }
        if let Some(name) = default_port_name(&block_type.outputs) {
            core.set_default_output(&name)?;
        }

        let mut block = Self {
            core,
            block_type,
            options: Value::Null,
        };
        block.set_options(options)?;
        Ok(block)
    }

    pub fn block_type(&self) -> &Arc<BlockType> {
        &self.block_type
    }

    pub fn options(&self) -> &Value {
        &self.options
    }
}

fn default_port_name(specs: &[PortSpec]) -> Option<String> {
    if let Some(spec) = specs.iter().find(|s| s.name == "default") {
        return Some(spec.name.clone());
    }
    match specs {
        [only] => Some(only.name.clone()),
        _ => None,
    }
}

#[async_trait]
impl Lifecycle for Block {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn kind(&self) -> &'static str {
        "block"
    }

    fn set_options(&mut self, options: Value) -> Result<()> {
        self.options = options;
        Ok(())
    }

    fn ready(&self) -> bool {
        true
    }

    fn compute_status(&self) -> NodeStatus {
        NodeStatus::Instantiated
    }

    async fn compute(&mut self) -> Result<()> {
        let Block {
            core,
            block_type,
            options,
        } = self;
        let node = core.id();
        let (inputs, outputs) = core.ports_split_mut();
        let mut ctx = BlockContext {
            node,
            block: &block_type.name,
            inputs,
            outputs,
            options: &*options,
        };
        block_type.executor.execute(&mut ctx).await
    }
}

// ---------------------------------------------------------------------------
// BlockRegistry
// ---------------------------------------------------------------------------

/// Name-keyed set of block type descriptors.
#[derive(Debug, Clone, Default)]
pub struct BlockRegistry {
    blocks: HashMap<String, Arc<BlockType>>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `block_type` under an explicit name.
    pub fn insert(&mut self, name: impl Into<String>, block_type: BlockType) {
        self.blocks.insert(name.into(), Arc::new(block_type));
    }

    /// Register `block_type` under its own name.
    pub fn register(&mut self, block_type: BlockType) {
        let name = block_type.name.clone();
        self.insert(name, block_type);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<BlockType>> {
        self.blocks
            .get(name)
            .cloned()
            .ok_or_else(|| LarissaError::not_found("block type", name))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<BlockType>> {
        self.blocks.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.blocks.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.blocks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Built-in registry factory
// ---------------------------------------------------------------------------

/// Registry holding the blocks every environment ships with.
pub fn builtin_registry() -> BlockRegistry {
    let mut reg = BlockRegistry::new();
    reg.register(crate::blocks::number());
    reg.register(crate::blocks::string());
    reg.register(crate::blocks::boolean());
    reg.register(crate::blocks::sum());
    reg
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl BlockExecutor for Echo {
        async fn execute(&self, ctx: &mut BlockContext<'_>) -> Result<()> {
            let value = ctx.input("in")?.clone();
            ctx.set_output("out", value)
        }
    }

    fn echo_type() -> BlockType {
        BlockType::new("echo", Echo)
            .input(PortSpec::new("in", "any").required())
            .output(PortSpec::new("out", "any"))
    }

    #[test]
    fn block_instantiates_ports_from_descriptor() {
        let block = Block::new(Arc::new(echo_type()), Value::Null).unwrap();
        let core = block.core();
        assert_eq!(core.title(), "echo");
        assert_eq!(core.status(), NodeStatus::Instantiated);
        assert!(core.input(Some("in")).unwrap().is_required());
        assert!(core.output(Some("out")).is_ok());
        assert_eq!(core.input(None).unwrap().name(), "in");
        assert_eq!(core.output(None).unwrap().name(), "out");
        assert!(core.ports().all(|p| p.node() == core.id()));
    }

    #[test]
    fn no_default_when_several_ports() {
        let bt = BlockType::new("pair", Echo)
            .input(PortSpec::new("a", "any"))
            .input(PortSpec::new("b", "any"));
        let block = Block::new(Arc::new(bt), Value::Null).unwrap();
        assert!(!block.core().has_default_input());
        assert!(!block.core().has_default_output());
    }

    #[test]
    fn port_named_default_is_the_default() {
        let bt = BlockType::new("pair", Echo)
            .input(PortSpec::new("a", "any"))
            .input(PortSpec::new("default", "any"));
        let block = Block::new(Arc::new(bt), Value::Null).unwrap();
        assert_eq!(block.core().input(None).unwrap().name(), "default");
    }

    #[test]
    fn duplicate_port_names_make_an_invalid_block_type() {
        let bt = BlockType::new("dup", Echo)
            .output(PortSpec::new("x", "any"))
            .output(PortSpec::new("x", "any"));
        let err = Block::new(Arc::new(bt), Value::Null).unwrap_err();
        assert!(matches!(err, LarissaError::InvalidBlockType { .. }));
    }

    #[tokio::test]
    async fn executor_reads_inputs_and_writes_outputs() {
        let mut block = Block::new(Arc::new(echo_type()), Value::Null).unwrap();
        block.core_mut().set_input_value("in", json!("hi")).unwrap();

        block.run().await.unwrap();

        assert_eq!(block.status(), NodeStatus::Finished);
        assert_eq!(
            block.core().output(Some("out")).unwrap().value(),
            Some(&json!("hi"))
        );
    }

    #[tokio::test]
    async fn unknown_output_name_fails_the_block() {
        struct WritesNowhere;

        #[async_trait]
        impl BlockExecutor for WritesNowhere {
            async fn execute(&self, ctx: &mut BlockContext<'_>) -> Result<()> {
                ctx.set_output("missing", json!(1))
            }
        }

        let mut block = Block::new(
            Arc::new(BlockType::new("bad", WritesNowhere)),
            Value::Null,
        )
        .unwrap();
        let err = block.run().await.unwrap_err();
        assert!(err.root_cause().is_not_found());
        assert_eq!(block.status(), NodeStatus::Errored);
    }

    #[tokio::test]
    async fn context_exposes_options() {
        struct ReadsOption;

        #[async_trait]
        impl BlockExecutor for ReadsOption {
            async fn execute(&self, ctx: &mut BlockContext<'_>) -> Result<()> {
                assert_eq!(ctx.get_options(), &json!({"k": 2}));
                let k = ctx.option("k").cloned().unwrap_or(Value::Null);
                ctx.set_output("out", k)
            }
        }

        let bt = BlockType::new("opt", ReadsOption).output(PortSpec::new("out", "number"));
        let mut block = Block::new(Arc::new(bt), json!({"k": 2})).unwrap();
        block.run().await.unwrap();
        assert_eq!(
            block.core().output(None).unwrap().value(),
            Some(&json!(2))
        );
    }

    #[test]
    fn register_and_resolve() {
        let mut reg = BlockRegistry::new();
        reg.register(echo_type());
        assert!(reg.has("echo"));
        assert_eq!(reg.resolve("echo").unwrap().name, "echo");
        assert!(reg.resolve("nope").unwrap_err().is_not_found());
    }

    #[test]
    fn insert_under_alias() {
        let mut reg = BlockRegistry::new();
        reg.insert("copy", echo_type());
        assert!(reg.has("copy"));
        assert!(!reg.has("echo"));
    }

    #[test]
    fn builtin_registry_has_builtins() {
        let reg = builtin_registry();
        assert_eq!(reg.names(), vec!["boolean", "number", "string", "sum"]);
    }
}
