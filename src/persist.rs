// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Byte round-trip of captured constructor arguments.
//!
//! Only `(args, kwargs)` are written. Restoring re-runs construction, so the
//! bytes never carry instance fields directly. Nested instances are written
//! by class name and rebuilt through the class registry.

use crate::buffer::{BufferData, FrozenBuffer};
use crate::error::{FreezeError, Result};
use crate::graph::{Graph, Node, NodeId};
use crate::instance::{Arguments, Instance};
use crate::number::Number;
use crate::object::Attribute;
use crate::registry;
use crate::value::Value;

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Persisted {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Decimal digits of an integer wider than `i64`.
    BigInt(String),
    String(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Persisted>),
    Map(Vec<(Persisted, Persisted)>),
    Set(Vec<Persisted>),
    Buffer {
        shape: Vec<usize>,
        data: BufferData,
    },
    Record {
        type_name: String,
        fields: Vec<(String, Persisted)>,
    },
    Instance {
        class: String,
        state: State,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct State {
    args: Vec<Persisted>,
    kwargs: Vec<(String, Persisted)>,
}

fn unsupported(kind: &str) -> FreezeError {
    FreezeError::Persistence(alloc::format!("{kind} values cannot be persisted"))
}

impl Persisted {
    fn from_value(value: &Value) -> Result<Persisted> {
        Ok(match value {
            Value::Null => Persisted::Null,
            Value::Bool(b) => Persisted::Bool(*b),
            Value::Number(n) => match n {
                Number::Int(i) => Persisted::Int(*i),
                Number::Float(f) => Persisted::Float(*f),
                Number::BigInt(_) => Persisted::BigInt(n.big_decimal().unwrap_or_default()),
            },
            Value::String(s) => Persisted::String(s.to_string()),
            Value::Bytes(b) => Persisted::Bytes(b.to_vec()),
            Value::Tuple(items) => Persisted::Tuple(Self::from_values(items.iter())?),
            Value::Set(items) => Persisted::Set(Self::from_values(items.iter())?),
            Value::Map(entries) => Persisted::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((Self::from_value(k)?, Self::from_value(v)?)))
                    .collect::<Result<_>>()?,
            ),
            Value::Buffer(b) => Persisted::Buffer {
                shape: b.shape().to_vec(),
                data: b.data().clone(),
            },
            Value::Object(o) => match o.fields() {
                Some(fields) => Persisted::Record {
                    type_name: o.type_name().to_string(),
                    fields: fields
                        .iter()
                        .map(|(name, attribute)| {
                            // Raw slots persist what they currently hold.
                            let value = match attribute {
                                Attribute::Frozen(v) => v.clone(),
                                Attribute::Raw(slot) => slot.snapshot()?,
                            };
                            Ok((name.to_string(), Self::from_value(&value)?))
                        })
                        .collect::<Result<_>>()?,
                },
                None => return Err(unsupported(o.type_name())),
            },
            Value::Instance(i) => Persisted::Instance {
                class: i.class_name().to_string(),
                state: State::from_pair(i.args(), i.kwargs())?,
            },
            Value::Function(_) => return Err(unsupported("function")),
            Value::Native(n) => return Err(unsupported(n.type_name())),
        })
    }

    fn from_values<'a>(values: impl Iterator<Item = &'a Value>) -> Result<Vec<Persisted>> {
        values.map(Self::from_value).collect()
    }

    /// Rebuilds the value as mutable nodes of `graph`.
    fn into_node(self, graph: &mut Graph) -> Result<NodeId> {
        Ok(match self {
            Persisted::Null => graph.null(),
            Persisted::Bool(b) => graph.bool(b),
            Persisted::Int(i) => graph.number(i),
            Persisted::Float(f) => graph.number(f),
            Persisted::BigInt(digits) => {
                let n = Number::from_str(&digits).map_err(|_| {
                    FreezeError::Persistence(alloc::format!("invalid integer {digits}"))
                })?;
                graph.number(n)
            }
            Persisted::String(s) => graph.string(&s),
            Persisted::Bytes(b) => graph.bytes(&b),
            Persisted::Tuple(items) => {
                let items = Self::into_nodes(items, graph)?;
                graph.tuple(items)
            }
            Persisted::Set(items) => {
                let items = Self::into_nodes(items, graph)?;
                graph.set(items)
            }
            Persisted::Map(entries) => {
                let entries = entries
                    .into_iter()
                    .map(|(k, v)| Ok((k.into_node(graph)?, v.into_node(graph)?)))
                    .collect::<Result<Vec<_>>>()?;
                graph.map(entries)
            }
            Persisted::Buffer { shape, data } => {
                let buffer = FrozenBuffer::from_parts(shape, data)
                    .map_err(|e| FreezeError::Persistence(e.to_string()))?;
                graph.buffer(buffer.to_mutable())
            }
            Persisted::Record { type_name, fields } => {
                let object = graph.object(&type_name);
                for (name, field) in fields {
                    let id = field.into_node(graph)?;
                    graph.set_field(object, &name, id)?;
                }
                object
            }
            Persisted::Instance { class, state } => {
                let class = registry::lookup_class(&class)
                    .ok_or_else(|| FreezeError::UnknownClass(class.as_str().into()))?;
                let instance: Instance = class.construct(state.into_arguments()?)?;
                graph.add(Node::Frozen(Value::from(instance)))
            }
        })
    }

    fn into_nodes(items: Vec<Persisted>, graph: &mut Graph) -> Result<Vec<NodeId>> {
        items.into_iter().map(|p| p.into_node(graph)).collect()
    }
}

impl State {
    fn from_pair(args: &Value, kwargs: &Value) -> Result<State> {
        let args = match args {
            Value::Tuple(items) => Persisted::from_values(items.iter())?,
            other => return Err(unsupported(other.type_name())),
        };
        let kwargs = match kwargs {
            Value::Map(entries) => entries
                .iter()
                .map(|(k, v)| match k {
                    Value::String(name) => Ok((name.to_string(), Persisted::from_value(v)?)),
                    other => Err(FreezeError::Persistence(alloc::format!(
                        "keyword name must be a string, not {}",
                        other.type_name()
                    ))),
                })
                .collect::<Result<_>>()?,
            other => return Err(unsupported(other.type_name())),
        };
        Ok(State { args, kwargs })
    }

    fn into_arguments(self) -> Result<Arguments> {
        let mut arguments = Arguments::new();
        for arg in self.args {
            let id = arg.into_node(arguments.graph_mut())?;
            arguments.push(id);
        }
        for (name, arg) in self.kwargs {
            let id = arg.into_node(arguments.graph_mut())?;
            arguments.keyword(&name, id);
        }
        Ok(arguments)
    }
}

/// Encodes a captured `(args, kwargs)` pair.
pub(crate) fn encode(args: &Value, kwargs: &Value) -> Result<Vec<u8>> {
    let state = State::from_pair(args, kwargs)?;
    postcard::to_allocvec(&state).map_err(|e| FreezeError::Persistence(e.to_string()))
}

/// Decodes bytes from [`encode`] into fresh constructor arguments.
pub(crate) fn decode(bytes: &[u8]) -> Result<Arguments> {
    let state: State =
        postcard::from_bytes(bytes).map_err(|e| FreezeError::Persistence(e.to_string()))?;
    state.into_arguments()
}
