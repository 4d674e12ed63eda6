use async_trait::async_trait;
use serde_json::Number;

use larissa_types::{LarissaError, Result, Value};

use crate::block::{BlockContext, BlockExecutor, BlockType, PortSpec};

pub struct SumExecutor;

#[async_trait]
impl BlockExecutor for SumExecutor {
    async fn execute(&self, ctx: &mut BlockContext<'_>) -> Result<()> {
        let a = ctx.input("number1")?;
        let b = ctx.input("number2")?;

        // Integer operands stay integers.
        let total = match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x.checked_add(y).map(Value::from),
            _ => None,
        };
        let total = match total {
            Some(v) => v,
            None => {
                let (x, y) = match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => (x, y),
                    _ => {
                        return Err(LarissaError::block_failed(
                            ctx.block_name(),
                            format!("cannot add {a} and {b}"),
                        ))
                    }
                };
                Number::from_f64(x + y).map(Value::Number).ok_or_else(|| {
                    LarissaError::block_failed(ctx.block_name(), "sum is not a finite number")
                })?
            }
        };
        ctx.set_output("number", total)
    }
}

pub fn sum() -> BlockType {
    BlockType::new("sum", SumExecutor)
        .input(PortSpec::new("number1", "number").required())
        .input(PortSpec::new("number2", "number").required())
        .output(PortSpec::new("number", "number"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use crate::node::Lifecycle;
    use serde_json::json;
    use std::sync::Arc;

    async fn run_sum(a: Value, b: Value) -> Result<Option<Value>> {
        let mut block = Block::new(Arc::new(sum()), Value::Null)?;
        block.core_mut().set_input_value("number1", a)?;
        block.core_mut().set_input_value("number2", b)?;
        block.run().await?;
        Ok(block.core().output(None)?.value().cloned())
    }

    #[tokio::test]
    async fn adds_integers() {
        assert_eq!(run_sum(json!(3), json!(4)).await.unwrap(), Some(json!(7)));
    }

    #[tokio::test]
    async fn adds_floats() {
        assert_eq!(
            run_sum(json!(1.5), json!(2)).await.unwrap(),
            Some(json!(3.5))
        );
    }

    #[tokio::test]
    async fn rejects_non_numbers() {
        let err = run_sum(json!("3"), json!(4)).await.unwrap_err();
        assert!(matches!(err.root_cause(), LarissaError::BlockFailed { .. }));
    }

    #[tokio::test]
    async fn both_inputs_are_required() {
        let mut block = Block::new(Arc::new(sum()), Value::Null).unwrap();
        block.core_mut().set_input_value("number1", json!(1)).unwrap();
        assert!(!block.can_run());
        let err = block.run().await.unwrap_err();
        assert!(matches!(err, LarissaError::MissingInputs { .. }));
    }
}
