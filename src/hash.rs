// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Structural hashing of frozen values.
//!
//! Hashes agree with `Value` equality: equal values hash equally, including
//! an integer and the float of the same magnitude. Buffers are unhashable;
//! a class that captures buffers hashes through a reducer instead.

use crate::error::{FreezeError, Result};
use crate::value::Value;

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;
use core::hash::{Hash, Hasher};
use std::collections::hash_map::DefaultHasher;

impl Value {
    /// Kind of the first component that cannot be hashed, if any.
    pub(crate) fn unhashable_kind(&self) -> Option<&'static str> {
        match self {
            Value::Buffer(_) => Some("frozen buffer"),
            Value::Tuple(items) => items.iter().find_map(Value::unhashable_kind),
            Value::Set(items) => items.iter().find_map(Value::unhashable_kind),
            Value::Map(entries) => entries
                .iter()
                .find_map(|(k, v)| k.unhashable_kind().or_else(|| v.unhashable_kind())),
            Value::Object(o) => match o.native() {
                Some(native) => native.key().unhashable_kind(),
                None => o.frozen_fields().find_map(|(_, v)| v.unhashable_kind()),
            },
            Value::Native(native) => native.key().unhashable_kind(),
            _ => None,
        }
    }

    pub fn is_hashable(&self) -> bool {
        self.unhashable_kind().is_none()
    }

    /// Feeds the value's structure into `state`.
    pub fn try_hash<H: Hasher>(&self, state: &mut H) -> Result<()> {
        if let Some(kind) = self.unhashable_kind() {
            return Err(FreezeError::Unhashable {
                kind,
                role: "hash input",
            });
        }
        self.write_hash(state);
        Ok(())
    }

    fn write_hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => n.hash(state),
            Value::String(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Tuple(items) => {
                state.write_usize(items.len());
                items.iter().for_each(|v| v.write_hash(state));
            }
            Value::Set(items) => {
                state.write_usize(items.len());
                items.iter().for_each(|v| v.write_hash(state));
            }
            Value::Map(entries) => {
                state.write_usize(entries.len());
                for (k, v) in entries.iter() {
                    k.write_hash(state);
                    v.write_hash(state);
                }
            }
            Value::Buffer(b) => b.structural_hash(state),
            Value::Object(o) => {
                o.type_name().hash(state);
                match o.native() {
                    Some(native) => native.key().write_hash(state),
                    None => {
                        for (name, v) in o.frozen_fields() {
                            name.hash(state);
                            v.write_hash(state);
                        }
                    }
                }
            }
            Value::Function(f) => f.address().hash(state),
            Value::Native(native) => {
                native.type_name().hash(state);
                native.key().write_hash(state);
            }
            Value::Instance(i) => {
                i.class_name().hash(state);
                state.write_u64(i.content_hash());
            }
        }
    }
}

/// Hash of a sequence of values with the standard hasher.
pub(crate) fn content_hash<'a>(values: impl IntoIterator<Item = &'a Value>) -> Result<u64> {
    let mut hasher = DefaultHasher::new();
    for v in values {
        v.try_hash(&mut hasher)?;
    }
    Ok(hasher.finish())
}

fn reduce(value: &Value) -> Value {
    match value {
        Value::Buffer(b) => b.reduce(),
        Value::Tuple(items) if !value.is_hashable() => {
            Value::from(items.iter().map(reduce).collect::<Vec<_>>())
        }
        Value::Set(items) if !value.is_hashable() => {
            Value::from(items.iter().map(reduce).collect::<BTreeSet<_>>())
        }
        Value::Map(entries) if !value.is_hashable() => Value::from(
            entries
                .iter()
                .map(|(k, v)| (reduce(k), reduce(v)))
                .collect::<BTreeMap<_, _>>(),
        ),
        other => other.clone(),
    }
}

/// Hash reducer that replaces every buffer inside the captured arguments with
/// `(flattened contents, shape, element-type tag)`.
///
/// Sub-values that are already hashable are passed through unchanged.
pub fn reduce_buffers(args: &Value, kwargs: &Value) -> anyhow::Result<Value> {
    Ok(Value::tuple(alloc::vec![reduce(args), reduce(kwargs)]))
}
