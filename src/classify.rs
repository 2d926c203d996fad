// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::graph::Node;
use crate::registry;

/// Whether a node can be shared as-is or must be converted when frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Already immutable: scalars, embedded frozen values and host objects of
    /// registered frozen types.
    Atomic,
    /// Anything that can hold mutable state, even when currently empty.
    Composite,
}

impl Classification {
    pub fn is_atomic(self) -> bool {
        self == Classification::Atomic
    }
}

/// Classifies a node. The exclusion registry plays no part here.
pub fn classify(node: &Node) -> Classification {
    match node {
        Node::Null
        | Node::Bool(_)
        | Node::Number(_)
        | Node::String(_)
        | Node::Bytes(_)
        | Node::Frozen(_) => Classification::Atomic,
        Node::Native(native) if registry::is_frozen_type(native.type_name()) => {
            Classification::Atomic
        }
        Node::List(_)
        | Node::Tuple(_)
        | Node::Map(_)
        | Node::Set(_)
        | Node::Buffer(_)
        | Node::Object { .. }
        | Node::Function(_)
        | Node::Native(_) => Classification::Composite,
    }
}
