//! Built-in block types resolved by bare name.

mod literal;
mod sum;

pub use literal::{boolean, number, string, LiteralExecutor};
pub use sum::{sum, SumExecutor};
