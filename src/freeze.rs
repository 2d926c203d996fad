// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The graph walker.
//!
//! One [`Freezer`] is one session: every node is frozen at most once, and a
//! node referenced from several places resolves to the same frozen value.

use crate::classify::{classify, Classification};
use crate::container;
use crate::error::{FreezeError, Result};
use crate::graph::{Graph, Node, NodeId};
use crate::object::{Attribute, FrozenFunction, FrozenObject, RawSlot};
use crate::options::FreezeOptions;
use crate::registry;
use crate::value::Value;
use crate::Rc;

use alloc::collections::BTreeMap;
use std::collections::{HashMap, HashSet};

pub struct Freezer<'g> {
    graph: &'g Graph,
    memo: HashMap<NodeId, Value>,
    visiting: HashSet<NodeId>,
    options: FreezeOptions,
}

impl<'g> Freezer<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self::with_options(graph, FreezeOptions::default())
    }

    pub fn with_options(graph: &'g Graph, options: FreezeOptions) -> Self {
        Self {
            graph,
            memo: HashMap::new(),
            visiting: HashSet::new(),
            options,
        }
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    /// Number of composite nodes frozen so far in this session.
    pub fn memoized(&self) -> usize {
        self.memo.len()
    }

    /// Returns the frozen counterpart of node `id`.
    pub fn freeze(&mut self, id: NodeId) -> Result<Value> {
        if let Some(value) = self.memo.get(&id) {
            return Ok(value.clone());
        }
        if self.visiting.contains(&id) {
            return Err(FreezeError::CyclicGraph { node: id });
        }

        let graph = self.graph;
        let node = graph.node(id)?;
        if classify(node) == Classification::Atomic {
            return atomic(node);
        }

        if self.options.trace_walk {
            log::trace!("freezing {} {id}", node.kind_name());
        }
        self.visiting.insert(id);
        let result = self.freeze_composite(id, node);
        self.visiting.remove(&id);
        let value = result?;
        if self.options.trace_walk {
            log::trace!("frozen {} {id}", value.type_name());
        }
        self.memo.insert(id, value.clone());
        Ok(value)
    }

    fn freeze_composite(&mut self, id: NodeId, node: &'g Node) -> Result<Value> {
        match node {
            Node::List(items) | Node::Tuple(items) => container::freeze_sequence(self, items),
            Node::Map(entries) => container::freeze_mapping(self, entries),
            Node::Set(items) => container::freeze_set(self, items),
            Node::Buffer(buffer) => Ok(container::freeze_buffer(buffer)),
            Node::Object { type_name, .. } => {
                let fields = self.freeze_fields(id, &[type_name.clone()])?;
                Ok(Value::Object(Rc::new(FrozenObject::record(
                    type_name.clone(),
                    fields,
                ))))
            }
            Node::Function(callable) => Ok(Value::Function(FrozenFunction::new(callable.clone()))),
            Node::Native(native) => Ok(Value::Object(Rc::new(FrozenObject::proxy(native.clone())))),
            other => atomic(other),
        }
    }

    /// Freezes the fields of object `id`, keeping fields excluded for any type
    /// in `lineage` as detached mutable slots.
    pub fn freeze_fields(
        &mut self,
        id: NodeId,
        lineage: &[Rc<str>],
    ) -> Result<BTreeMap<Rc<str>, Attribute>> {
        let graph = self.graph;
        let fields = match graph.node(id)? {
            Node::Object { fields, .. } => fields,
            other => {
                return Err(FreezeError::graph(alloc::format!(
                    "'{}' object has no fields",
                    other.kind_name()
                )))
            }
        };

        let newly_visiting = self.visiting.insert(id);
        let result = fields
            .iter()
            .map(|(name, field)| {
                let attribute = if registry::is_mutable_attribute(lineage, name) {
                    Attribute::Raw(RawSlot::new(graph.extract(*field)?))
                } else {
                    Attribute::Frozen(self.freeze(*field)?)
                };
                Ok((name.clone(), attribute))
            })
            .collect::<Result<BTreeMap<_, _>>>();
        if newly_visiting {
            self.visiting.remove(&id);
        }
        result
    }
}

fn atomic(node: &Node) -> Result<Value> {
    Ok(match node {
        Node::Null => Value::Null,
        Node::Bool(b) => Value::Bool(*b),
        Node::Number(n) => Value::Number(n.clone()),
        Node::String(s) => Value::String(s.clone()),
        Node::Bytes(b) => Value::Bytes(b.clone()),
        Node::Frozen(value) => value.clone(),
        Node::Native(native) => Value::Native(native.clone()),
        other => {
            return Err(FreezeError::graph(alloc::format!(
                "'{}' is not an atomic value",
                other.kind_name()
            )))
        }
    })
}

/// Freezes the graph reachable from `root` in a fresh session.
pub fn deepfreeze(graph: &Graph, root: NodeId) -> Result<Value> {
    Freezer::new(graph).freeze(root)
}
