// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.
#![allow(clippy::as_conversions)]

//! The mutable side of the construct-then-freeze lifecycle.
//!
//! Values under construction live in an arena. A [`NodeId`] referenced from
//! two places is a shared reference; a node reachable from itself is a cycle.
//! Nodes are cells: an in-place operation on a scalar node is observed by
//! every holder of that node.

use crate::buffer::{apply_number, NumericBuffer};
use crate::error::{FreezeError, Result};
use crate::freeze::deepfreeze;
use crate::number::Number;
use crate::object::{Callable, NativeFn, NativeValue};
use crate::protected::{InPlaceOp, Mutation, ProtectedOp};
use crate::value::Value;
use crate::Rc;

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::fmt;
use std::collections::HashMap;

/// Stable index of a node in a [`Graph`].
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Null,
    Bool(bool),
    Number(Number),
    String(Rc<str>),
    Bytes(Rc<[u8]>),

    List(Vec<NodeId>),
    Tuple(Vec<NodeId>),
    Map(Vec<(NodeId, NodeId)>),
    Set(Vec<NodeId>),
    Buffer(NumericBuffer),

    /// An arbitrary object with named fields.
    Object {
        type_name: Rc<str>,
        fields: BTreeMap<Rc<str>, NodeId>,
    },
    Function(Callable),
    /// A host object reachable only through [`NativeValue`].
    Native(Rc<dyn NativeValue>),

    /// A value that is already frozen.
    Frozen(Value),
}

impl Node {
    pub fn kind_name(&self) -> &str {
        match self {
            Node::Null => "null",
            Node::Bool(_) => "bool",
            Node::Number(_) => "number",
            Node::String(_) => "string",
            Node::Bytes(_) => "bytes",
            Node::List(_) => "list",
            Node::Tuple(_) => "tuple",
            Node::Map(_) => "mapping",
            Node::Set(_) => "set",
            Node::Buffer(_) => "buffer",
            Node::Object { type_name, .. } => type_name,
            Node::Function(_) => "function",
            Node::Native(native) => native.type_name(),
            Node::Frozen(value) => value.type_name(),
        }
    }

    fn children(&self) -> Vec<NodeId> {
        match self {
            Node::List(items) | Node::Tuple(items) | Node::Set(items) => items.clone(),
            Node::Map(entries) => entries.iter().flat_map(|(k, v)| [*k, *v]).collect(),
            Node::Object { fields, .. } => fields.values().copied().collect(),
            _ => Vec::new(),
        }
    }

    fn remap(&self, ids: &HashMap<NodeId, NodeId>) -> Node {
        let m = |id: &NodeId| ids.get(id).copied().unwrap_or(*id);
        match self {
            Node::List(items) => Node::List(items.iter().map(m).collect()),
            Node::Tuple(items) => Node::Tuple(items.iter().map(m).collect()),
            Node::Set(items) => Node::Set(items.iter().map(m).collect()),
            Node::Map(entries) => Node::Map(entries.iter().map(|(k, v)| (m(k), m(v))).collect()),
            Node::Object { type_name, fields } => Node::Object {
                type_name: type_name.clone(),
                fields: fields.iter().map(|(k, v)| (k.clone(), m(v))).collect(),
            },
            other => other.clone(),
        }
    }
}

/// Arena of mutable nodes.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

fn unsupported(node: &Node, op: ProtectedOp) -> FreezeError {
    FreezeError::graph(alloc::format!(
        "'{}' object does not support {}",
        node.kind_name(),
        op.description()
    ))
}

fn sequence_index(key: &Value, len: usize) -> Result<usize> {
    let index = match key {
        Value::Number(n) if n.is_integer() => n.as_i64(),
        _ => None,
    }
    .ok_or_else(|| FreezeError::graph(alloc::format!("sequence index must be an integer, not {key}")))?;
    let resolved = if index < 0 {
        len as i64 + index
    } else {
        index
    };
    if resolved < 0 || resolved >= len as i64 {
        return Err(FreezeError::graph(alloc::format!(
            "index {index} out of range for sequence of length {len}"
        )));
    }
    Ok(resolved as usize)
}

fn operand_number(operand: &Value, op: InPlaceOp) -> Result<Number> {
    match operand {
        Value::Number(n) => Ok(n.clone()),
        other => Err(FreezeError::graph(alloc::format!(
            "unsupported operand for in-place \"{}\": {}",
            op.name(),
            other.type_name()
        ))),
    }
}

/// Longest sequence in-place repetition may produce.
const MAX_REPEATED_LEN: usize = 1 << 24;

// Negative counts repeat to an empty sequence.
fn repeated_len(len: usize, count: &Number) -> Result<usize> {
    let count = match count.as_i64() {
        Some(n) if count.is_integer() => usize::try_from(n.max(0)).unwrap_or(usize::MAX),
        _ => {
            return Err(FreezeError::graph(alloc::format!(
                "repeat count {count} is not an integer that fits in 64 bits"
            )))
        }
    };
    match len.checked_mul(count) {
        Some(total) if total <= MAX_REPEATED_LEN => Ok(count),
        _ => Err(FreezeError::graph(alloc::format!(
            "repeating {len} items {count} times is too large"
        ))),
    }
}

fn arithmetic(result: anyhow::Result<Number>) -> Result<Number> {
    result.map_err(|e| FreezeError::graph(alloc::format!("{e}")))
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.index()).ok_or(FreezeError::InvalidNode(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.index())
            .ok_or(FreezeError::InvalidNode(id))
    }

    pub fn null(&mut self) -> NodeId {
        self.add(Node::Null)
    }

    pub fn bool(&mut self, b: bool) -> NodeId {
        self.add(Node::Bool(b))
    }

    pub fn number(&mut self, n: impl Into<Number>) -> NodeId {
        self.add(Node::Number(n.into()))
    }

    pub fn string(&mut self, s: &str) -> NodeId {
        self.add(Node::String(s.into()))
    }

    pub fn bytes(&mut self, b: &[u8]) -> NodeId {
        self.add(Node::Bytes(b.into()))
    }

    pub fn list(&mut self, items: Vec<NodeId>) -> NodeId {
        self.add(Node::List(items))
    }

    pub fn tuple(&mut self, items: Vec<NodeId>) -> NodeId {
        self.add(Node::Tuple(items))
    }

    pub fn map(&mut self, entries: Vec<(NodeId, NodeId)>) -> NodeId {
        self.add(Node::Map(entries))
    }

    pub fn set(&mut self, items: Vec<NodeId>) -> NodeId {
        self.add(Node::Set(items))
    }

    pub fn buffer(&mut self, buffer: NumericBuffer) -> NodeId {
        self.add(Node::Buffer(buffer))
    }

    /// A new object of `type_name` with no fields.
    pub fn object(&mut self, type_name: &str) -> NodeId {
        self.add(Node::Object {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        })
    }

    pub fn function(&mut self, name: &str, func: NativeFn) -> NodeId {
        self.add(Node::Function(Callable::new(name, func)))
    }

    pub fn native(&mut self, native: Rc<dyn NativeValue>) -> NodeId {
        self.add(Node::Native(native))
    }

    /// Embeds a value as a node. Scalars become scalar nodes; anything else is
    /// kept as an already-frozen leaf.
    pub fn import(&mut self, value: &Value) -> NodeId {
        match value {
            Value::Null => self.null(),
            Value::Bool(b) => self.bool(*b),
            Value::Number(n) => self.number(n.clone()),
            Value::String(s) => self.add(Node::String(s.clone())),
            Value::Bytes(b) => self.add(Node::Bytes(b.clone())),
            other => self.add(Node::Frozen(other.clone())),
        }
    }

    pub fn set_field(&mut self, object: NodeId, name: &str, value: NodeId) -> Result<()> {
        self.node(value)?;
        match self.node_mut(object)? {
            Node::Object { fields, .. } => {
                fields.insert(name.into(), value);
                Ok(())
            }
            other => Err(unsupported(other, ProtectedOp::SetAttr)),
        }
    }

    pub fn field(&self, object: NodeId, name: &str) -> Result<Option<NodeId>> {
        match self.node(object)? {
            Node::Object { fields, .. } => Ok(fields.get(name).copied()),
            other => Err(FreezeError::graph(alloc::format!(
                "'{}' object has no fields",
                other.kind_name()
            ))),
        }
    }

    pub fn push(&mut self, list: NodeId, item: NodeId) -> Result<()> {
        self.node(item)?;
        match self.node_mut(list)? {
            Node::List(items) => {
                items.push(item);
                Ok(())
            }
            other => Err(unsupported(other, ProtectedOp::SetSlice)),
        }
    }

    /// Elements of a list or tuple node.
    pub fn items(&self, id: NodeId) -> Result<&[NodeId]> {
        match self.node(id)? {
            Node::List(items) | Node::Tuple(items) => Ok(items),
            other => Err(FreezeError::graph(alloc::format!(
                "expected a sequence, found {}",
                other.kind_name()
            ))),
        }
    }

    /// Reads a number from a scalar node or an embedded frozen number.
    pub fn as_number(&self, id: NodeId) -> Result<Number> {
        match self.node(id)? {
            Node::Number(n) | Node::Frozen(Value::Number(n)) => Ok(n.clone()),
            other => Err(FreezeError::graph(alloc::format!(
                "expected a number, found {}",
                other.kind_name()
            ))),
        }
    }

    /// Structural comparison of a mutable node with a frozen value.
    ///
    /// A node equals a value exactly when freezing the node yields that value.
    pub fn equals(&self, id: NodeId, value: &Value) -> bool {
        match deepfreeze(self, id) {
            Ok(frozen) => &frozen == value,
            Err(_) => false,
        }
    }

    /// Copies the subgraph reachable from `root` into a standalone [`Thawed`].
    pub fn extract(&self, root: NodeId) -> Result<Thawed> {
        let mut order = Vec::new();
        let mut ids = HashMap::new();
        let mut stack = alloc::vec![root];
        while let Some(id) = stack.pop() {
            if ids.contains_key(&id) {
                continue;
            }
            ids.insert(id, NodeId(order.len() as u32));
            order.push(id);
            stack.extend(self.node(id)?.children());
        }

        let mut graph = Graph::new();
        for id in &order {
            graph.add(self.node(*id)?.remap(&ids));
        }
        Ok(Thawed {
            graph,
            root: NodeId(0),
        })
    }

    /// Performs `mutation` on node `id` with ordinary mutable semantics.
    pub fn apply(&mut self, id: NodeId, mutation: &Mutation) -> Result<()> {
        let op = mutation.op();
        let result = match mutation {
            Mutation::SetAttr { name, value } | Mutation::SetProperty { name, value } => {
                let value = self.import(value);
                match self.node_mut(id)? {
                    Node::Object { fields, .. } => {
                        fields.insert(name.clone(), value);
                        Ok(())
                    }
                    other => Err(unsupported(other, op)),
                }
            }
            Mutation::DelAttr { name } | Mutation::DelProperty { name } => {
                match self.node_mut(id)? {
                    Node::Object { fields, type_name } => match fields.remove(name) {
                        Some(_) => Ok(()),
                        None => Err(FreezeError::NoAttribute {
                            type_name: type_name.clone(),
                            attribute: name.clone(),
                        }),
                    },
                    other => Err(unsupported(other, op)),
                }
            }
            Mutation::SetItem { key, value } => self.set_item(id, key, value),
            Mutation::DelItem { key } => self.del_item(id, key),
            Mutation::SetSlice {
                start,
                stop,
                values,
            } => {
                let imported: Vec<NodeId> = values.iter().map(|v| self.import(v)).collect();
                match self.node_mut(id)? {
                    Node::List(items) => {
                        let stop = (*stop).min(items.len());
                        let start = (*start).min(stop);
                        items.splice(start..stop, imported);
                        Ok(())
                    }
                    other => Err(unsupported(other, op)),
                }
            }
            Mutation::Append(value) => {
                let item = self.import(value);
                self.push(id, item)
            }
            Mutation::DelSlice { start, stop } => match self.node_mut(id)? {
                Node::List(items) => {
                    let stop = (*stop).min(items.len());
                    let start = (*start).min(stop);
                    items.drain(start..stop);
                    Ok(())
                }
                other => Err(unsupported(other, op)),
            },
            Mutation::InPlace { op, operand } => self.in_place(id, *op, operand),
        };
        result.or_else(|e| match self.node(id) {
            // Frozen leaves answer with their own rejection.
            Ok(Node::Frozen(value)) => value.apply(mutation),
            _ => Err(e),
        })
    }

    fn set_item(&mut self, id: NodeId, key: &Value, value: &Value) -> Result<()> {
        let op = ProtectedOp::SetItem;
        match self.node(id)? {
            Node::List(items) => {
                let index = sequence_index(key, items.len())?;
                let value = self.import(value);
                if let Node::List(items) = self.node_mut(id)? {
                    items[index] = value;
                }
                Ok(())
            }
            Node::Map(entries) => {
                let existing = entries.iter().position(|(k, _)| self.equals(*k, key));
                let value = self.import(value);
                let key = match existing {
                    Some(_) => None,
                    None => Some(self.import(key)),
                };
                if let Node::Map(entries) = self.node_mut(id)? {
                    match (existing, key) {
                        (Some(index), _) => entries[index].1 = value,
                        (None, Some(key)) => entries.push((key, value)),
                        (None, None) => {}
                    }
                }
                Ok(())
            }
            Node::Buffer(buffer) => {
                let index = sequence_index(key, buffer.len())?;
                let n = operand_number(value, InPlaceOp::Add)?;
                if let Node::Buffer(buffer) = self.node_mut(id)? {
                    buffer
                        .set(index, &n)
                        .map_err(|e| FreezeError::graph(alloc::format!("{e}")))?;
                }
                Ok(())
            }
            other => Err(unsupported(other, op)),
        }
    }

    fn del_item(&mut self, id: NodeId, key: &Value) -> Result<()> {
        match self.node(id)? {
            Node::List(items) => {
                let index = sequence_index(key, items.len())?;
                if let Node::List(items) = self.node_mut(id)? {
                    items.remove(index);
                }
                Ok(())
            }
            Node::Map(entries) => {
                let Some(index) = entries.iter().position(|(k, _)| self.equals(*k, key)) else {
                    return Err(FreezeError::graph(alloc::format!("key {key} not found")));
                };
                if let Node::Map(entries) = self.node_mut(id)? {
                    entries.remove(index);
                }
                Ok(())
            }
            other => Err(unsupported(other, ProtectedOp::DelItem)),
        }
    }

    fn in_place(&mut self, id: NodeId, op: InPlaceOp, operand: &Value) -> Result<()> {
        let protected = ProtectedOp::InPlace(op);
        match self.node(id)? {
            Node::Number(n) => {
                let result = arithmetic(apply_number(op, n, &operand_number(operand, op)?))?;
                *self.node_mut(id)? = Node::Number(result);
                Ok(())
            }
            Node::String(s) => {
                let result: alloc::string::String = match (op, operand) {
                    (InPlaceOp::Add | InPlaceOp::Concat, Value::String(rhs)) => {
                        alloc::format!("{s}{rhs}")
                    }
                    (InPlaceOp::Mul | InPlaceOp::Repeat, Value::Number(n)) => {
                        s.repeat(repeated_len(s.len(), n)?)
                    }
                    _ => return Err(unsupported(self.node(id)?, protected)),
                };
                *self.node_mut(id)? = Node::String(result.as_str().into());
                Ok(())
            }
            Node::List(items) => {
                let extended: Vec<NodeId> = match (op, operand) {
                    (InPlaceOp::Add | InPlaceOp::Concat, Value::Tuple(rhs)) => {
                        let mut out = items.clone();
                        for v in rhs.iter() {
                            out.push(self.import(v));
                        }
                        out
                    }
                    (InPlaceOp::Mul | InPlaceOp::Repeat, Value::Number(n)) => {
                        items.repeat(repeated_len(items.len(), n)?)
                    }
                    _ => return Err(unsupported(self.node(id)?, protected)),
                };
                *self.node_mut(id)? = Node::List(extended);
                Ok(())
            }
            Node::Set(items) => {
                let Value::Set(rhs) = operand else {
                    return Err(unsupported(self.node(id)?, protected));
                };
                let contains = |g: &Graph, items: &[NodeId], v: &Value| {
                    items.iter().any(|item| g.equals(*item, v))
                };
                let items = items.clone();
                let result: Vec<NodeId> = match op {
                    InPlaceOp::Or => {
                        let mut out = items.clone();
                        for v in rhs.iter() {
                            if !contains(self, &items, v) {
                                out.push(self.import(v));
                            }
                        }
                        out
                    }
                    InPlaceOp::And => items
                        .iter()
                        .copied()
                        .filter(|item| rhs.iter().any(|v| self.equals(*item, v)))
                        .collect(),
                    InPlaceOp::Sub => items
                        .iter()
                        .copied()
                        .filter(|item| !rhs.iter().any(|v| self.equals(*item, v)))
                        .collect(),
                    InPlaceOp::Xor => {
                        let mut out: Vec<NodeId> = items
                            .iter()
                            .copied()
                            .filter(|item| !rhs.iter().any(|v| self.equals(*item, v)))
                            .collect();
                        for v in rhs.iter() {
                            if !contains(self, &items, v) {
                                out.push(self.import(v));
                            }
                        }
                        out
                    }
                    _ => return Err(unsupported(self.node(id)?, protected)),
                };
                *self.node_mut(id)? = Node::Set(result);
                Ok(())
            }
            Node::Buffer(_) => {
                let n = operand_number(operand, op)?;
                if let Node::Buffer(buffer) = self.node_mut(id)? {
                    buffer
                        .apply_scalar(op, &n)
                        .map_err(|e| FreezeError::graph(alloc::format!("{e}")))?;
                }
                Ok(())
            }
            other => Err(unsupported(other, protected)),
        }
    }
}

/// A standalone mutable value: a graph and the node it is rooted at.
#[derive(Debug, Clone)]
pub struct Thawed {
    pub graph: Graph,
    pub root: NodeId,
}

impl Thawed {
    pub fn new(graph: Graph, root: NodeId) -> Self {
        Self { graph, root }
    }

    /// A mutable copy of `value`.
    pub fn from_value(value: &Value) -> Self {
        let mut graph = Graph::new();
        let root = graph.import(value);
        Self { graph, root }
    }

    pub fn freeze(&self) -> Result<Value> {
        deepfreeze(&self.graph, self.root)
    }

    pub fn apply(&mut self, mutation: &Mutation) -> Result<()> {
        self.graph.apply(self.root, mutation)
    }
}

impl From<Value> for Thawed {
    fn from(value: Value) -> Self {
        Thawed::from_value(&value)
    }
}
