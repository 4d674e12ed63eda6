//! Literal blocks: emit the `value` option on their single output.

use async_trait::async_trait;
use serde_json::json;

use larissa_types::{LarissaError, Result, Value};

use crate::block::{BlockContext, BlockExecutor, BlockType, PortSpec};

/// Copies `options.value` to the named output after checking its JSON type.
pub struct LiteralExecutor {
    output: &'static str,
    accepts: fn(&Value) -> bool,
}

#[async_trait]
impl BlockExecutor for LiteralExecutor {
    async fn execute(&self, ctx: &mut BlockContext<'_>) -> Result<()> {
        let value = ctx.option("value").cloned().ok_or_else(|| LarissaError::InvalidOptions {
            block: ctx.block_name().to_string(),
            message: "missing required option 'value'".into(),
        })?;
        if !(self.accepts)(&value) {
            return Err(LarissaError::InvalidOptions {
                block: ctx.block_name().to_string(),
                message: format!("option 'value' must be a {}, got {value}", self.output),
            });
        }
        ctx.set_output(self.output, value)
    }
}

fn literal(name: &'static str, accepts: fn(&Value) -> bool) -> BlockType {
    BlockType::new(
        name,
        LiteralExecutor {
            output: name,
            accepts,
        },
    )
    .output(PortSpec::new(name, name))
    .options_schema(json!({
        "type": "object",
        "properties": {
            "value": { "type": name, "required": true }
        }
    }))
}

pub fn number() -> BlockType {
    literal("number", Value::is_number)
}

pub fn string() -> BlockType {
    literal("string", Value::is_string)
}

pub fn boolean() -> BlockType {
    literal("boolean", Value::is_boolean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use crate::node::Lifecycle;
    use larissa_types::NodeStatus;
    use std::sync::Arc;

    #[tokio::test]
    async fn number_emits_its_value() {
        let mut block = Block::new(Arc::new(number()), json!({"value": 3})).unwrap();
        block.run().await.unwrap();
        assert_eq!(
            block.core().output(Some("number")).unwrap().value(),
            Some(&json!(3))
        );
    }

    #[tokio::test]
    async fn string_emits_its_value() {
        let mut block = Block::new(Arc::new(string()), json!({"value": "hello"})).unwrap();
        block.run().await.unwrap();
        assert_eq!(
            block.core().output(None).unwrap().value(),
            Some(&json!("hello"))
        );
    }

    #[tokio::test]
    async fn missing_value_option_fails() {
        let mut block = Block::new(Arc::new(boolean()), Value::Null).unwrap();
        let err = block.run().await.unwrap_err();
        assert!(matches!(err.root_cause(), LarissaError::InvalidOptions { .. }));
        assert_eq!(block.status(), NodeStatus::Errored);
    }

    #[tokio::test]
    async fn wrong_value_type_fails() {
        let mut block = Block::new(Arc::new(number()), json!({"value": "three"})).unwrap();
        assert!(block.run().await.is_err());
        assert!(block.core().output(None).unwrap().value().is_none());
    }
}
