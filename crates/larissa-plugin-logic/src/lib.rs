//! Boolean logic blocks packaged as the `logic` plugin.
//!
//! ```ignore
//! let env = Environment::new().with_plugin(larissa_plugin_logic::plugin());
//! let and = pipeline.new_node("logic/AND", Value::Null)?;
//! ```

use async_trait::async_trait;

use larissa_pipeline::{BlockContext, BlockExecutor, BlockType, Plugin, PortSpec};
use larissa_types::{LarissaError, Result};

pub const PLUGIN_NAME: &str = "logic";

/// The `logic` plugin with `AND`, `OR` and `NOT`.
pub fn plugin() -> Plugin {
    let mut plugin = Plugin::new(PLUGIN_NAME);
    plugin.register(and());
    plugin.register(or());
    plugin.register(not());
    plugin
}

// ---------------------------------------------------------------------------
// Binary operators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum BinaryOp {
    And,
    Or,
}

struct BinaryExecutor(BinaryOp);

#[async_trait]
impl BlockExecutor for BinaryExecutor {
    async fn execute(&self, ctx: &mut BlockContext<'_>) -> Result<()> {
        let a = boolean_input(ctx, "boolean1")?;
        let b = boolean_input(ctx, "boolean2")?;
        let out = match self.0 {
            BinaryOp::And => a && b,
            BinaryOp::Or => a || b,
        };
        tracing::trace!(node = %ctx.node_id(), op = ?self.0, a, b, out, "Logic block evaluated");
        ctx.set_output("boolean", out)
    }
}

fn binary(name: &str, op: BinaryOp) -> BlockType {
    BlockType::new(name, BinaryExecutor(op))
        .input(PortSpec::new("boolean1", "boolean").required())
        .input(PortSpec::new("boolean2", "boolean").required())
        .output(PortSpec::new("boolean", "boolean"))
}

pub fn and() -> BlockType {
    binary("AND", BinaryOp::And)
}

pub fn or() -> BlockType {
    binary("OR", BinaryOp::Or)
}

// ---------------------------------------------------------------------------
// NOT
// ---------------------------------------------------------------------------

struct NotExecutor;

#[async_trait]
impl BlockExecutor for NotExecutor {
    async fn execute(&self, ctx: &mut BlockContext<'_>) -> Result<()> {
        let value = boolean_input(ctx, "boolean")?;
        ctx.set_output("boolean", !value)
    }
}

pub fn not() -> BlockType {
    BlockType::new("NOT", NotExecutor)
        .input(PortSpec::new("boolean", "boolean").required())
        .output(PortSpec::new("boolean", "boolean"))
}

fn boolean_input(ctx: &BlockContext<'_>, name: &str) -> Result<bool> {
    let value = ctx.input(name)?;
    value.as_bool().ok_or_else(|| {
        LarissaError::block_failed(
            ctx.block_name(),
            format!("input '{name}' must be a boolean, got {value}"),
        )
    })
}
