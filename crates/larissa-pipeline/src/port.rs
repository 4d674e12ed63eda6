//! Named, typed value slots owned by a single node.

use larissa_types::{NodeId, PortId, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

/// A value slot on a node.
///
/// The owning node is recorded by id only; a port never outlives membership
/// of that node in a pipeline.
#[derive(Debug, Clone)]
pub struct Port {
    id: PortId,
    name: String,
    port_type: String,
    required: bool,
    direction: PortDirection,
    node: NodeId,
    value: Option<Value>,
}

impl Port {
    pub fn new(
        node: NodeId,
        direction: PortDirection,
        name: impl Into<String>,
        port_type: impl Into<String>,
        required: bool,
    ) -> Self {
        Self {
            id: PortId::new(),
            name: name.into(),
            port_type: port_type.into(),
            required,
            direction,
            node,
            value: None,
        }
    }

    pub fn input(node: NodeId, name: impl Into<String>, port_type: impl Into<String>) -> Self {
        Self::new(node, PortDirection::Input, name, port_type, false)
    }

    pub fn output(node: NodeId, name: impl Into<String>, port_type: impl Into<String>) -> Self {
        Self::new(node, PortDirection::Output, name, port_type, false)
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port_type(&self) -> &str {
        &self.port_type
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    /// The node this port belongs to.
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub(crate) fn set_value(&mut self, value: Value) {
        self.value = Some(value);
    }

    /// Drop the held value.
    pub fn reset(&mut self) {
        self.value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_port_has_no_value() {
        let node = NodeId::new();
        let port = Port::input(node, "number1", "number");
        assert_eq!(port.name(), "number1");
        assert_eq!(port.port_type(), "number");
        assert_eq!(port.direction(), PortDirection::Input);
        assert_eq!(port.node(), node);
        assert!(!port.is_required());
        assert!(!port.has_value());
    }

    #[test]
    fn set_then_reset_clears_value() {
        let mut port = Port::output(NodeId::new(), "number", "number");
        port.set_value(json!(7));
        assert_eq!(port.value(), Some(&json!(7)));
        port.reset();
        assert!(port.value().is_none());
    }

    #[test]
    fn each_port_gets_its_own_id() {
        let node = NodeId::new();
        let a = Port::input(node, "a", "number");
        let b = Port::input(node, "a", "number");
        assert_ne!(a.id(), b.id());
    }
}
