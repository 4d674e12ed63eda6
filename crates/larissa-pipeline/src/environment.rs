//! Plugins and the environment that resolves block identifiers.
//!
//! An identifier is either a bare built-in name (`"sum"`) or a
//! `"plugin/block"` pair resolved through a plugin injected by the
//! embedding application.

use std::collections::HashMap;
use std::sync::Arc;

use larissa_types::{LarissaError, Result};

use crate::block::{builtin_registry, BlockRegistry, BlockType};

/// A named bundle of block types.
#[derive(Debug, Clone)]
pub struct Plugin {
    name: String,
    blocks: BlockRegistry,
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: BlockRegistry::new(),
        }
    }

    pub fn with_blocks(name: impl Into<String>, blocks: BlockRegistry) -> Self {
        Self {
            name: name.into(),
            blocks,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn register(&mut self, block_type: BlockType) {
        self.blocks.register(block_type);
    }

    pub fn blocks(&self) -> &BlockRegistry {
        &self.blocks
    }

    pub fn get_block_type(&self, name: &str) -> Result<Arc<BlockType>> {
        self.blocks.resolve(name)
    }
}

/// Built-in blocks plus the plugins available to pipelines.
#[derive(Debug, Clone)]
pub struct Environment {
    builtins: BlockRegistry,
    plugins: HashMap<String, Plugin>,
}

impl Environment {
    /// Environment with the built-in blocks and no plugins.
    pub fn new() -> Self {
        Self::with_builtins(builtin_registry())
    }

    /// Environment with nothing registered.
    pub fn empty() -> Self {
        Self::with_builtins(BlockRegistry::new())
    }

    pub fn with_builtins(builtins: BlockRegistry) -> Self {
        Self {
            builtins,
            plugins: HashMap::new(),
        }
    }

    pub fn with_plugin(mut self, plugin: Plugin) -> Self {
        self.add_plugin(plugin);
        self
    }

    /// Add or replace a plugin.
    pub fn add_plugin(&mut self, plugin: Plugin) {
        tracing::debug!(plugin = %plugin.name(), blocks = plugin.blocks().len(), "Plugin registered");
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    pub fn builtins(&self) -> &BlockRegistry {
        &self.builtins
    }

    pub fn builtins_mut(&mut self) -> &mut BlockRegistry {
        &mut self.builtins
    }

    pub fn get_plugin(&self, name: &str) -> Result<&Plugin> {
        self.plugins
            .get(name)
            .ok_or_else(|| LarissaError::not_found("plugin", name))
    }

    /// Resolve `"plugin/block"` through the plugin, a bare name through the
    /// built-ins.
    pub fn resolve(&self, identifier: &str) -> Result<Arc<BlockType>> {
        match identifier.split_once('/') {
            Some((plugin, block)) => self.get_plugin(plugin)?.get_block_type(block),
            None => self.builtins.resolve(identifier),
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::number;

    fn env_with_math() -> Environment {
        let mut math = Plugin::new("math");
        math.register(number());
        Environment::new().with_plugin(math)
    }

    #[test]
    fn bare_name_resolves_builtin() {
        let env = Environment::new();
        assert_eq!(env.resolve("sum").unwrap().name, "sum");
    }

    #[test]
    fn plugin_name_resolves_through_plugin() {
        let env = env_with_math();
        assert_eq!(env.resolve("math/number").unwrap().name, "number");
    }

    #[test]
    fn unknown_plugin_is_not_found() {
        let err = env_with_math().resolve("nope/number").unwrap_err();
        assert!(matches!(err, LarissaError::NotFound { kind: "plugin", .. }));
    }

    #[test]
    fn unknown_block_in_plugin_is_not_found() {
        let err = env_with_math().resolve("math/sum").unwrap_err();
        assert!(matches!(err, LarissaError::NotFound { kind: "block type", .. }));
    }

    #[test]
    fn unknown_builtin_is_not_found() {
        assert!(Environment::new().resolve("divide").unwrap_err().is_not_found());
        assert!(Environment::empty().resolve("sum").unwrap_err().is_not_found());
    }
}
