// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Use README.md as crate documentation.
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

extern crate alloc;

// Frozen values are shared through global registries and across threads once
// construction is complete.
pub(crate) use alloc::sync::Arc as Rc;

mod buffer;
mod classify;
mod container;
mod error;
mod freeze;
mod graph;
mod hash;
mod instance;
mod number;
mod object;
mod options;
mod persist;
mod protected;
pub mod registry;
mod value;

pub use buffer::{BufferData, ElementType, FrozenBuffer, NumericBuffer};
pub use classify::{classify, Classification};
pub use error::{ArgumentRef, FreezeError, Result};
pub use freeze::{deepfreeze, Freezer};
pub use graph::{Graph, Node, NodeId, Thawed};
pub use hash::reduce_buffers;
pub use instance::{
    construct, restore, Arguments, Class, HashReducer, InitFn, Initializer, Instance,
};
pub use number::Number;
pub use object::{
    Attribute, Callable, FrozenFunction, FrozenObject, NativeFn, NativeValue, RawSlot,
};
pub use options::FreezeOptions;
pub use protected::{InPlaceOp, Mutation, ProtectedOp};
pub use registry::{
    lookup_class, register_class, register_frozen_type, register_mutable_attributes,
    RegistryError,
};
pub use value::Value;

