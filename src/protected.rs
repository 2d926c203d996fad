// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The fixed set of operations whose default semantics imply mutation.
//!
//! Every frozen value rejects all of them. The mutable [`Graph`](crate::Graph)
//! and an [`Initializer`](crate::Initializer) carry them out normally, which is
//! what lets a single [`Mutation`] describe an attempted change on either side
//! of the construct-then-freeze boundary.

use crate::value::Value;
use crate::Rc;

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::fmt;

/// In-place arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InPlaceOp {
    Mul,
    Div,
    TrueDiv,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    And,
    Xor,
    Or,
    Add,
    Concat,
    Repeat,
    Sub,
}

impl InPlaceOp {
    pub const ALL: [InPlaceOp; 15] = [
        InPlaceOp::Mul,
        InPlaceOp::Div,
        InPlaceOp::TrueDiv,
        InPlaceOp::FloorDiv,
        InPlaceOp::Mod,
        InPlaceOp::Pow,
        InPlaceOp::LShift,
        InPlaceOp::RShift,
        InPlaceOp::And,
        InPlaceOp::Xor,
        InPlaceOp::Or,
        InPlaceOp::Add,
        InPlaceOp::Concat,
        InPlaceOp::Repeat,
        InPlaceOp::Sub,
    ];

    pub fn name(self) -> &'static str {
        match self {
            InPlaceOp::Mul => "mul",
            InPlaceOp::Div => "div",
            InPlaceOp::TrueDiv => "truediv",
            InPlaceOp::FloorDiv => "floordiv",
            InPlaceOp::Mod => "mod",
            InPlaceOp::Pow => "pow",
            InPlaceOp::LShift => "lshift",
            InPlaceOp::RShift => "rshift",
            InPlaceOp::And => "and",
            InPlaceOp::Xor => "xor",
            InPlaceOp::Or => "or",
            InPlaceOp::Add => "add",
            InPlaceOp::Concat => "concat",
            InPlaceOp::Repeat => "repeat",
            InPlaceOp::Sub => "sub",
        }
    }
}

/// An operation that is forbidden on frozen values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtectedOp {
    SetAttr,
    DelAttr,
    SetItem,
    DelItem,
    SetSlice,
    DelSlice,
    /// Property (descriptor) assignment.
    Set,
    /// Property (descriptor) deletion.
    Delete,
    InPlace(InPlaceOp),
}

lazy_static::lazy_static! {
    static ref BY_METHOD_NAME: BTreeMap<&'static str, ProtectedOp> =
        ProtectedOp::all().map(|op| (op.method_name(), op)).collect();
}

impl ProtectedOp {
    /// Every protected operation, in table order.
    pub fn all() -> impl Iterator<Item = ProtectedOp> {
        [
            ProtectedOp::SetAttr,
            ProtectedOp::DelAttr,
            ProtectedOp::SetItem,
            ProtectedOp::DelItem,
            ProtectedOp::SetSlice,
            ProtectedOp::DelSlice,
            ProtectedOp::Set,
            ProtectedOp::Delete,
        ]
        .into_iter()
        .chain(InPlaceOp::ALL.into_iter().map(ProtectedOp::InPlace))
    }

    /// Looks up an operation by its special-method name, e.g. `__setitem__`.
    pub fn from_method_name(name: &str) -> Option<ProtectedOp> {
        BY_METHOD_NAME.get(name).copied()
    }

    pub fn method_name(self) -> &'static str {
        match self {
            ProtectedOp::SetAttr => "__setattr__",
            ProtectedOp::DelAttr => "__delattr__",
            ProtectedOp::SetItem => "__setitem__",
            ProtectedOp::DelItem => "__delitem__",
            ProtectedOp::SetSlice => "__setslice__",
            ProtectedOp::DelSlice => "__delslice__",
            ProtectedOp::Set => "__set__",
            ProtectedOp::Delete => "__delete__",
            ProtectedOp::InPlace(op) => match op {
                InPlaceOp::Mul => "__imul__",
                InPlaceOp::Div => "__idiv__",
                InPlaceOp::TrueDiv => "__itruediv__",
                InPlaceOp::FloorDiv => "__ifloordiv__",
                InPlaceOp::Mod => "__imod__",
                InPlaceOp::Pow => "__ipow__",
                InPlaceOp::LShift => "__ilshift__",
                InPlaceOp::RShift => "__irshift__",
                InPlaceOp::And => "__iand__",
                InPlaceOp::Xor => "__ixor__",
                InPlaceOp::Or => "__ior__",
                InPlaceOp::Add => "__iadd__",
                InPlaceOp::Concat => "__iconcat__",
                InPlaceOp::Repeat => "__irepeat__",
                InPlaceOp::Sub => "__isub__",
            },
        }
    }

    /// Human-readable description used in diagnostics.
    pub fn description(self) -> alloc::string::String {
        match self {
            ProtectedOp::SetAttr => "attribute assignment".into(),
            ProtectedOp::DelAttr => "attribute deletion".into(),
            ProtectedOp::SetItem => "item assignment".into(),
            ProtectedOp::DelItem => "item deletion".into(),
            ProtectedOp::SetSlice => "slice assignment".into(),
            ProtectedOp::DelSlice => "slice deletion".into(),
            ProtectedOp::Set => "property assignment".into(),
            ProtectedOp::Delete => "property deletion".into(),
            ProtectedOp::InPlace(op) => alloc::format!("in-place \"{}\"", op.name()),
        }
    }

    pub fn category(self) -> &'static str {
        match self {
            ProtectedOp::SetAttr | ProtectedOp::DelAttr => "attribute mutation",
            ProtectedOp::SetItem
            | ProtectedOp::DelItem
            | ProtectedOp::SetSlice
            | ProtectedOp::DelSlice => "item/slice mutation",
            ProtectedOp::Set | ProtectedOp::Delete => "property mutation",
            ProtectedOp::InPlace(_) => "in-place arithmetic",
        }
    }
}

impl fmt::Display for ProtectedOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// An attempted change to a value.
///
/// Operands are frozen values; the mutable side imports them into its graph.
#[derive(Debug, Clone)]
pub enum Mutation {
    SetAttr { name: Rc<str>, value: Value },
    DelAttr { name: Rc<str> },
    SetItem { key: Value, value: Value },
    DelItem { key: Value },
    /// Replace `start..stop` with `values`.
    SetSlice {
        start: usize,
        stop: usize,
        values: Vec<Value>,
    },
    DelSlice { start: usize, stop: usize },
    /// Append to the end of a sequence; an empty slice assignment past the end.
    Append(Value),
    SetProperty { name: Rc<str>, value: Value },
    DelProperty { name: Rc<str> },
    InPlace { op: InPlaceOp, operand: Value },
}

impl Mutation {
    pub fn set_attr(name: &str, value: impl Into<Value>) -> Self {
        Mutation::SetAttr {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn del_attr(name: &str) -> Self {
        Mutation::DelAttr { name: name.into() }
    }

    pub fn set_item(key: impl Into<Value>, value: impl Into<Value>) -> Self {
        Mutation::SetItem {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn in_place(op: InPlaceOp, operand: impl Into<Value>) -> Self {
        Mutation::InPlace {
            op,
            operand: operand.into(),
        }
    }

    /// The protected operation this mutation performs.
    pub fn op(&self) -> ProtectedOp {
        match self {
            Mutation::SetAttr { .. } => ProtectedOp::SetAttr,
            Mutation::DelAttr { .. } => ProtectedOp::DelAttr,
            Mutation::SetItem { .. } => ProtectedOp::SetItem,
            Mutation::DelItem { .. } => ProtectedOp::DelItem,
            Mutation::SetSlice { .. } | Mutation::Append(_) => ProtectedOp::SetSlice,
            Mutation::DelSlice { .. } => ProtectedOp::DelSlice,
            Mutation::SetProperty { .. } => ProtectedOp::Set,
            Mutation::DelProperty { .. } => ProtectedOp::Delete,
            Mutation::InPlace { op, .. } => ProtectedOp::InPlace(*op),
        }
    }
}
