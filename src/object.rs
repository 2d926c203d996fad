// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Protective wrappers around composites that are not containers.
//!
//! A [`FrozenObject`] is either a record whose fields were frozen by the
//! walker, or a proxy around a host object whose attributes are frozen as
//! they are read. Both reject every protected operation.

use crate::error::{FreezeError, Result};
use crate::graph::Thawed;
use crate::protected::{Mutation, ProtectedOp};
use crate::registry;
use crate::value::Value;
use crate::Rc;

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;

/// A host function. It returns its result as a mutable fragment, which the
/// caller freezes before handing it back.
pub type NativeFn = Rc<dyn Fn(&[Value]) -> anyhow::Result<Thawed> + Send + Sync>;

/// A host object exposed to the freezer.
///
/// Implementors are opaque: the freezer never looks inside them except through
/// this interface. Types registered with
/// [`register_frozen_type`](crate::register_frozen_type) are treated as atomic
/// and stored as-is; all others are wrapped in a proxy.
pub trait NativeValue: fmt::Debug + Send + Sync {
    fn type_name(&self) -> &str;

    /// Base type names, nearest first. Exclusions registered for a base apply.
    fn bases(&self) -> Vec<Rc<str>> {
        Vec::new()
    }

    /// Structural identity: equality, ordering and hashing of the object
    /// delegate to this value.
    fn key(&self) -> Value;

    /// Reads an attribute; `Ok(None)` when there is no such attribute.
    fn get_attr(&self, name: &str) -> anyhow::Result<Option<Thawed>>;

    /// Invokes the object; `Ok(None)` when it is not callable.
    fn call(&self, _args: &[Value]) -> anyhow::Result<Option<Thawed>> {
        Ok(None)
    }
}

pub(crate) fn native_lineage(native: &dyn NativeValue) -> Vec<Rc<str>> {
    let mut lineage = alloc::vec![Rc::from(native.type_name())];
    lineage.extend(native.bases());
    lineage
}

/// A named host function, before freezing.
#[derive(Clone)]
pub struct Callable {
    name: Rc<str>,
    func: NativeFn,
}

impl Callable {
    pub fn new(name: &str, func: NativeFn) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn address(&self) -> usize {
        Rc::as_ptr(&self.func).cast::<()>() as usize
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.name)
    }
}

/// A frozen callable: its results are frozen before they are returned.
#[derive(Clone, Debug)]
pub struct FrozenFunction(Callable);

impl FrozenFunction {
    pub(crate) fn new(callable: Callable) -> Self {
        Self(callable)
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn call(&self, args: &[Value]) -> Result<Value> {
        let result = (self.0.func)(args).map_err(|e| FreezeError::from_host(self.name(), e))?;
        result.freeze()
    }

    pub fn apply(&self, mutation: &Mutation) -> Result<()> {
        Err(FreezeError::forbidden("function", mutation.op()))
    }

    pub(crate) fn address(&self) -> usize {
        self.0.address()
    }
}

// Functions have no structure; identity is the only meaningful comparison.
impl PartialEq for FrozenFunction {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0.func, &other.0.func)
    }
}

impl Eq for FrozenFunction {}

impl Ord for FrozenFunction {
    fn cmp(&self, other: &Self) -> Ordering {
        self.address().cmp(&other.address())
    }
}

impl PartialOrd for FrozenFunction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A field kept mutable through the exclusion registry.
#[derive(Clone)]
pub struct RawSlot(Rc<spin::Mutex<Thawed>>);

impl RawSlot {
    pub fn new(thawed: Thawed) -> Self {
        Self(Rc::new(spin::Mutex::new(thawed)))
    }

    pub fn with<R>(&self, f: impl FnOnce(&Thawed) -> R) -> R {
        f(&self.0.lock())
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Thawed) -> R) -> R {
        f(&mut self.0.lock())
    }

    pub fn apply(&self, mutation: &Mutation) -> Result<()> {
        self.0.lock().apply(mutation)
    }

    /// Freezes a copy of the current content.
    pub fn snapshot(&self) -> Result<Value> {
        self.0.lock().freeze()
    }

    pub fn ptr_eq(&self, other: &RawSlot) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for RawSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawSlot(..)")
    }
}

/// The result of reading an attribute of a frozen object or instance.
#[derive(Debug, Clone)]
pub enum Attribute {
    Frozen(Value),
    Raw(RawSlot),
}

impl Attribute {
    pub fn as_frozen(&self) -> Option<&Value> {
        match self {
            Attribute::Frozen(v) => Some(v),
            Attribute::Raw(_) => None,
        }
    }

    pub fn as_raw(&self) -> Option<&RawSlot> {
        match self {
            Attribute::Raw(r) => Some(r),
            Attribute::Frozen(_) => None,
        }
    }

    /// The frozen value, or a frozen snapshot of a raw slot.
    pub fn to_value(&self) -> Result<Value> {
        match self {
            Attribute::Frozen(v) => Ok(v.clone()),
            Attribute::Raw(r) => r.snapshot(),
        }
    }
}

enum ObjectKind {
    Record(BTreeMap<Rc<str>, Attribute>),
    Proxy(Rc<dyn NativeValue>),
}

/// A composite, non-container object behind a read-only interface.
pub struct FrozenObject {
    type_name: Rc<str>,
    kind: ObjectKind,
}

impl FrozenObject {
    pub(crate) fn record(type_name: Rc<str>, fields: BTreeMap<Rc<str>, Attribute>) -> Self {
        Self {
            type_name,
            kind: ObjectKind::Record(fields),
        }
    }

    pub(crate) fn proxy(target: Rc<dyn NativeValue>) -> Self {
        Self {
            type_name: target.type_name().into(),
            kind: ObjectKind::Proxy(target),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self.kind, ObjectKind::Proxy(_))
    }

    /// Fields of a record; `None` for a proxy.
    pub fn fields(&self) -> Option<&BTreeMap<Rc<str>, Attribute>> {
        match &self.kind {
            ObjectKind::Record(fields) => Some(fields),
            ObjectKind::Proxy(_) => None,
        }
    }

    pub(crate) fn frozen_fields(&self) -> impl Iterator<Item = (&Rc<str>, &Value)> {
        self.fields()
            .into_iter()
            .flat_map(|fields| fields.iter())
            .filter_map(|(k, a)| a.as_frozen().map(|v| (k, v)))
    }

    pub(crate) fn native(&self) -> Option<&Rc<dyn NativeValue>> {
        match &self.kind {
            ObjectKind::Proxy(target) => Some(target),
            ObjectKind::Record(_) => None,
        }
    }

    pub fn get_attr(&self, name: &str) -> Result<Attribute> {
        if let Some(op) = ProtectedOp::from_method_name(name) {
            return Err(FreezeError::forbidden(self.type_name.clone(), op));
        }
        match &self.kind {
            ObjectKind::Record(fields) => {
                fields
                    .get(name)
                    .cloned()
                    .ok_or_else(|| FreezeError::NoAttribute {
                        type_name: self.type_name.clone(),
                        attribute: name.into(),
                    })
            }
            ObjectKind::Proxy(target) => {
                let fetched = target
                    .get_attr(name)
                    .map_err(|e| FreezeError::TypeMismatch {
                        type_name: self.type_name.clone(),
                        attribute: name.into(),
                        reason: alloc::format!("attribute access raised: {e:#}"),
                    })?
                    .ok_or_else(|| FreezeError::NoAttribute {
                        type_name: self.type_name.clone(),
                        attribute: name.into(),
                    })?;
                if registry::is_mutable_attribute(&native_lineage(target.as_ref()), name) {
                    return Ok(Attribute::Raw(RawSlot::new(fetched)));
                }
                Ok(Attribute::Frozen(fetched.freeze()?))
            }
        }
    }

    /// Reads an attribute as a frozen value.
    pub fn attr(&self, name: &str) -> Result<Value> {
        self.get_attr(name)?.to_value()
    }

    /// Invokes a callable object and freezes the result.
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        match &self.kind {
            ObjectKind::Proxy(target) => {
                match target
                    .call(args)
                    .map_err(|e| FreezeError::from_host(&self.type_name, e))?
                {
                    Some(result) => result.freeze(),
                    None => Err(self.not_callable("__call__")),
                }
            }
            ObjectKind::Record(fields) => match fields.get("__call__") {
                Some(Attribute::Frozen(Value::Function(f))) => f.call(args),
                _ => Err(self.not_callable("__call__")),
            },
        }
    }

    /// Calls the function stored in field `name` with the object prepended to
    /// `args`.
    pub fn call_method(self: &Rc<Self>, name: &str, args: &[Value]) -> Result<Value> {
        match self.get_attr(name)? {
            Attribute::Frozen(Value::Function(f)) => {
                let mut bound = Vec::with_capacity(args.len() + 1);
                bound.push(Value::Object(self.clone()));
                bound.extend_from_slice(args);
                f.call(&bound)
            }
            Attribute::Frozen(Value::Object(o)) => o.call(args),
            _ => Err(self.not_callable(name)),
        }
    }

    pub fn apply(&self, mutation: &Mutation) -> Result<()> {
        Err(FreezeError::forbidden(self.type_name.clone(), mutation.op()))
    }

    fn not_callable(&self, name: &str) -> FreezeError {
        FreezeError::TypeMismatch {
            type_name: self.type_name.clone(),
            attribute: name.into(),
            reason: "object is not callable".into(),
        }
    }
}

impl fmt::Debug for FrozenObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ObjectKind::Record(fields) => f
                .debug_struct("FrozenObject")
                .field("type", &self.type_name)
                .field("fields", fields)
                .finish(),
            ObjectKind::Proxy(target) => f
                .debug_struct("FrozenObject")
                .field("type", &self.type_name)
                .field("target", target)
                .finish(),
        }
    }
}

impl PartialEq for FrozenObject {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrozenObject {}

impl Ord for FrozenObject {
    fn cmp(&self, other: &Self) -> Ordering {
        self.type_name.cmp(&other.type_name).then_with(|| {
            match (&self.kind, &other.kind) {
                (ObjectKind::Record(_), ObjectKind::Record(_)) => {
                    self.frozen_fields().cmp(other.frozen_fields())
                }
                (ObjectKind::Proxy(a), ObjectKind::Proxy(b)) => a.key().cmp(&b.key()),
                (ObjectKind::Record(_), ObjectKind::Proxy(_)) => Ordering::Less,
                (ObjectKind::Proxy(_), ObjectKind::Record(_)) => Ordering::Greater,
            }
        })
    }
}

impl PartialOrd for FrozenObject {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
