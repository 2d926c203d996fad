// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Immutable equivalents of the container kinds.

use crate::buffer::NumericBuffer;
use crate::error::{FreezeError, Result};
use crate::freeze::Freezer;
use crate::graph::NodeId;
use crate::value::Value;

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

fn ensure_hashable(value: &Value, role: &'static str) -> Result<()> {
    match value.unhashable_kind() {
        Some(kind) => Err(FreezeError::Unhashable { kind, role }),
        None => Ok(()),
    }
}

/// Lists and tuples both freeze to a tuple; order and duplicates are kept.
pub(crate) fn freeze_sequence(freezer: &mut Freezer<'_>, items: &[NodeId]) -> Result<Value> {
    let items = items
        .iter()
        .map(|id| freezer.freeze(*id))
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::from(items))
}

/// Later duplicate keys replace earlier ones.
pub(crate) fn freeze_mapping(
    freezer: &mut Freezer<'_>,
    entries: &[(NodeId, NodeId)],
) -> Result<Value> {
    let mut map = BTreeMap::new();
    for (k, v) in entries {
        let key = freezer.freeze(*k)?;
        ensure_hashable(&key, "mapping key")?;
        let value = freezer.freeze(*v)?;
        map.insert(key, value);
    }
    Ok(Value::from(map))
}

pub(crate) fn freeze_set(freezer: &mut Freezer<'_>, items: &[NodeId]) -> Result<Value> {
    let mut set = BTreeSet::new();
    for id in items {
        let item = freezer.freeze(*id)?;
        ensure_hashable(&item, "set element")?;
        set.insert(item);
    }
    Ok(Value::from(set))
}

/// Copies the buffer once; elements are never visited individually.
pub(crate) fn freeze_buffer(buffer: &NumericBuffer) -> Value {
    Value::from(buffer.freeze())
}
