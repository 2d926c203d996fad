// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The construct-then-freeze lifecycle.
//!
//! A [`Class`] turns [`Arguments`] into an [`Instance`]: the initializer runs
//! against a mutable self object, then arguments and fields are frozen in one
//! session, the captured arguments are hashed once and the instance is
//! locked. An instance never returns to the mutable state; restoring from
//! persisted bytes constructs a new one.

use crate::error::{ArgumentRef, FreezeError, Result};
use crate::freeze::Freezer;
use crate::graph::{Graph, NodeId};
use crate::hash;
use crate::number::Number;
use crate::object::Attribute;
use crate::options::FreezeOptions;
use crate::persist;
use crate::protected::{Mutation, ProtectedOp};
use crate::registry;
use crate::value::Value;
use crate::Rc;

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};

use indexmap::IndexMap;

/// Initializer of a class. Runs once per construction, with the instance
/// still mutable.
pub type InitFn = Rc<dyn Fn(&mut Initializer<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Maps captured `(args, kwargs)` to a hashable surrogate.
pub type HashReducer = Rc<dyn Fn(&Value, &Value) -> anyhow::Result<Value> + Send + Sync>;

/// A domain type that opts into the construct-then-freeze lifecycle.
#[derive(Clone)]
pub struct Class {
    name: Rc<str>,
    bases: Vec<Rc<str>>,
    init: InitFn,
    reducer: Option<HashReducer>,
    options: FreezeOptions,
}

impl Class {
    pub fn new(
        name: &str,
        init: impl Fn(&mut Initializer<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            bases: Vec::new(),
            init: Rc::new(init),
            reducer: None,
            options: FreezeOptions::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declares `base` (and its own bases) as ancestors. Exclusions registered
    /// for an ancestor apply to this class. Initializers are not inherited.
    pub fn with_base(mut self, base: &Class) -> Self {
        for name in base.lineage() {
            if !self.bases.contains(&name) {
                self.bases.push(name);
            }
        }
        self
    }

    pub fn with_hash_reducer(
        mut self,
        reducer: impl Fn(&Value, &Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.reducer = Some(Rc::new(reducer));
        self
    }

    pub fn with_options(mut self, options: FreezeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> FreezeOptions {
        self.options
    }

    /// The class name followed by its bases, nearest first.
    pub fn lineage(&self) -> Vec<Rc<str>> {
        let mut lineage = alloc::vec![self.name.clone()];
        lineage.extend(self.bases.iter().cloned());
        lineage
    }

    /// Adds the class to the global class registry.
    pub fn register(&self) -> Result<()> {
        Ok(registry::register_class(self.clone())?)
    }

    pub fn construct(&self, args: Arguments) -> Result<Instance> {
        construct(self, args)
    }

    /// Rebuilds an instance from bytes produced by [`Instance::persist`].
    pub fn restore(&self, bytes: &[u8]) -> Result<Instance> {
        restore(self, bytes)
    }

    fn content_hash(&self, args: &Value, kwargs: &Value) -> Result<u64> {
        match &self.reducer {
            Some(reducer) => {
                let surrogate =
                    reducer(args, kwargs).map_err(|e| FreezeError::from_host(&self.name, e))?;
                hash::content_hash([&surrogate])
            }
            None => hash::content_hash([args, kwargs])
                .map_err(|e| self.unhashable_argument(args, kwargs).unwrap_or(e)),
        }
    }

    // Positional arguments first, then keywords in name order.
    fn unhashable_argument(&self, args: &Value, kwargs: &Value) -> Option<FreezeError> {
        let offender = |argument: ArgumentRef, value: &Value| FreezeError::Construction {
            type_name: self.name.clone(),
            argument,
            value: describe(value),
        };
        if let Ok(args) = args.as_tuple() {
            if let Some((index, value)) = args.iter().enumerate().find(|(_, v)| !v.is_hashable()) {
                return Some(offender(ArgumentRef::Position(index), value));
            }
        }
        if let Ok(kwargs) = kwargs.as_map() {
            for (name, value) in kwargs.iter() {
                if let (Value::String(name), false) = (name, value.is_hashable()) {
                    return Some(offender(ArgumentRef::Keyword(name.clone()), value));
                }
            }
        }
        None
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("bases", &self.bases)
            .field("options", &self.options)
            .finish()
    }
}

fn describe(value: &Value) -> alloc::string::String {
    serde_json::to_string(value).unwrap_or_else(|_| alloc::format!("<{}>", value.type_name()))
}

/// Constructor arguments, built as a mutable graph.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    pub(crate) graph: Graph,
    pub(crate) positional: Vec<NodeId>,
    pub(crate) keywords: IndexMap<Rc<str>, NodeId>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The graph argument nodes are built in.
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Appends node `id` of [`graph_mut`](Self::graph_mut) as the next
    /// positional argument.
    pub fn push(&mut self, id: NodeId) {
        self.positional.push(id);
    }

    /// Sets keyword argument `name` to node `id`, replacing an earlier one.
    pub fn keyword(&mut self, name: &str, id: NodeId) {
        self.keywords.insert(name.into(), id);
    }

    /// Builder form of [`push`](Self::push) for an already-built value.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        let id = self.graph.import(&value.into());
        self.push(id);
        self
    }

    /// Builder form of [`keyword`](Self::keyword) for an already-built value.
    pub fn kwarg(mut self, name: &str, value: impl Into<Value>) -> Self {
        let id = self.graph.import(&value.into());
        self.keyword(name, id);
        self
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Access to the instance under construction.
///
/// Everything reachable from here is still mutable and behaves normally.
pub struct Initializer<'a> {
    class: &'a Class,
    graph: &'a mut Graph,
    this: NodeId,
    positional: &'a [NodeId],
    keywords: &'a IndexMap<Rc<str>, NodeId>,
}

impl<'a> Initializer<'a> {
    pub fn class_name(&self) -> &str {
        self.class.name()
    }

    /// The self object.
    pub fn this(&self) -> NodeId {
        self.this
    }

    pub fn arg_count(&self) -> usize {
        self.positional.len()
    }

    /// Positional argument `index`.
    pub fn arg(&self, index: usize) -> Result<NodeId> {
        self.positional
            .get(index)
            .copied()
            .ok_or_else(|| FreezeError::Initializer {
                type_name: self.class.name.clone(),
                message: alloc::format!("missing positional argument {index}"),
            })
    }

    pub fn kwarg(&self, name: &str) -> Option<NodeId> {
        self.keywords.get(name).copied()
    }

    /// Keyword names in call order. Keywords are captured by name, so an
    /// instance rebuilt by [`Class::restore`] sees them sorted by name.
    pub fn kwarg_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.keywords.keys().map(|k| k.as_ref())
    }

    /// Positional argument `index` read as a number.
    pub fn number_arg(&self, index: usize) -> Result<Number> {
        self.graph.as_number(self.arg(index)?)
    }

    pub fn graph(&self) -> &Graph {
        &*self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut *self.graph
    }

    pub fn set_attr(&mut self, name: &str, value: NodeId) -> Result<()> {
        self.graph.set_field(self.this, name, value)
    }

    pub fn set_attr_value(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let id = self.graph.import(&value.into());
        self.set_attr(name, id)
    }

    pub fn get_attr(&self, name: &str) -> Result<NodeId> {
        self.graph
            .field(self.this, name)?
            .ok_or_else(|| FreezeError::NoAttribute {
                type_name: self.class.name.clone(),
                attribute: name.into(),
            })
    }

    /// Performs `mutation` on the self object with ordinary semantics.
    pub fn apply(&mut self, mutation: &Mutation) -> Result<()> {
        self.graph.apply(self.this, mutation)
    }
}

/// A constructed, frozen domain value.
pub struct Instance {
    class_name: Rc<str>,
    args: Value,
    kwargs: Value,
    hash: u64,
    locked: bool,
    fields: spin::Mutex<BTreeMap<Rc<str>, Attribute>>,
}

impl Instance {
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Captured positional arguments, as a tuple.
    pub fn args(&self) -> &Value {
        &self.args
    }

    /// Captured keyword arguments, as a mapping from name to value.
    pub fn kwargs(&self) -> &Value {
        &self.kwargs
    }

    /// The `(args, kwargs)` pair that identifies the instance.
    pub fn state(&self) -> Value {
        Value::tuple(alloc::vec![self.args.clone(), self.kwargs.clone()])
    }

    pub fn content_hash(&self) -> u64 {
        self.hash
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn field_names(&self) -> Vec<Rc<str>> {
        self.fields.lock().keys().cloned().collect()
    }

    pub fn get_attr(&self, name: &str) -> Result<Attribute> {
        if self.locked {
            if let Some(op) = ProtectedOp::from_method_name(name) {
                return Err(FreezeError::forbidden(self.class_name.clone(), op));
            }
        }
        self.fields
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| FreezeError::NoAttribute {
                type_name: self.class_name.clone(),
                attribute: name.into(),
            })
    }

    /// Reads an attribute as a frozen value; raw slots yield a snapshot.
    pub fn attr(&self, name: &str) -> Result<Value> {
        self.get_attr(name)?.to_value()
    }

    /// Calls the function stored in field `name` with the instance prepended
    /// to `args`.
    pub fn call_method(self: &Rc<Self>, name: &str, args: &[Value]) -> Result<Value> {
        match self.get_attr(name)? {
            Attribute::Frozen(Value::Function(f)) => {
                let mut bound = Vec::with_capacity(args.len() + 1);
                bound.push(Value::Instance(self.clone()));
                bound.extend_from_slice(args);
                f.call(&bound)
            }
            Attribute::Frozen(Value::Object(o)) => o.call(args),
            _ => Err(FreezeError::TypeMismatch {
                type_name: self.class_name.clone(),
                attribute: name.into(),
                reason: "attribute is not callable".into(),
            }),
        }
    }

    /// Rejects every protected operation on a locked instance. An unlocked
    /// instance accepts attribute assignment and deletion.
    pub fn apply(&self, mutation: &Mutation) -> Result<()> {
        let op = mutation.op();
        if self.locked {
            return Err(FreezeError::forbidden(self.class_name.clone(), op));
        }
        let mut fields = self.fields.lock();
        match mutation {
            Mutation::SetAttr { name, value } | Mutation::SetProperty { name, value } => {
                fields.insert(name.clone(), Attribute::Frozen(value.clone()));
                Ok(())
            }
            Mutation::DelAttr { name } | Mutation::DelProperty { name } => {
                match fields.remove(name) {
                    Some(_) => Ok(()),
                    None => Err(FreezeError::NoAttribute {
                        type_name: self.class_name.clone(),
                        attribute: name.clone(),
                    }),
                }
            }
            _ => Err(FreezeError::graph(alloc::format!(
                "'{}' object does not support {}",
                self.class_name,
                op.description()
            ))),
        }
    }

    /// Encodes the captured `(args, kwargs)` pair. Keyword arguments are
    /// written in name order, not call order.
    pub fn persist(&self) -> Result<Vec<u8>> {
        persist::encode(&self.args, &self.kwargs)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class_name)
            .field("args", &self.args)
            .field("kwargs", &self.kwargs)
            .field("locked", &self.locked)
            .finish()
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.class_name)?;
        let mut sep = "";
        if let Ok(args) = self.args.as_tuple() {
            for v in args.iter() {
                write!(f, "{sep}{v}")?;
                sep = ", ";
            }
        }
        if let Ok(kwargs) = self.kwargs.as_map() {
            for (k, v) in kwargs.iter() {
                match k {
                    Value::String(name) => write!(f, "{sep}{name}={v}")?,
                    other => write!(f, "{sep}{other}={v}")?,
                }
                sep = ", ";
            }
        }
        f.write_str(")")
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Instance {}

impl Ord for Instance {
    fn cmp(&self, other: &Self) -> Ordering {
        self.class_name
            .cmp(&other.class_name)
            .then_with(|| self.args.cmp(&other.args))
            .then_with(|| self.kwargs.cmp(&other.kwargs))
    }
}

impl PartialOrd for Instance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for Instance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

/// Allocates, initializes, freezes and locks an instance of `class`.
pub fn construct(class: &Class, args: Arguments) -> Result<Instance> {
    let Arguments {
        mut graph,
        positional,
        keywords,
    } = args;
    let this = graph.object(&class.name);

    let mut init = Initializer {
        class,
        graph: &mut graph,
        this,
        positional: &positional,
        keywords: &keywords,
    };
    (class.init)(&mut init).map_err(|e| FreezeError::from_initializer(&class.name, e))?;

    let mut freezer = Freezer::with_options(&graph, class.options);
    let captured = positional
        .iter()
        .map(|id| freezer.freeze(*id))
        .collect::<Result<Vec<_>>>()?;
    let mut named = BTreeMap::new();
    for (name, id) in keywords.iter() {
        named.insert(Value::String(name.clone()), freezer.freeze(*id)?);
    }
    let (args, kwargs) = (Value::from(captured), Value::from(named));

    let hash = class.content_hash(&args, &kwargs)?;
    let fields = freezer.freeze_fields(this, &class.lineage())?;

    log::debug!(
        "constructed {} with {} field(s), hash {hash:#018x}",
        class.name,
        fields.len()
    );
    Ok(Instance {
        class_name: class.name.clone(),
        args,
        kwargs,
        hash,
        locked: class.options.protections,
        fields: spin::Mutex::new(fields),
    })
}

/// Re-runs the construction of `class` on persisted `(args, kwargs)`.
pub fn restore(class: &Class, bytes: &[u8]) -> Result<Instance> {
    construct(class, persist::decode(bytes)?)
}
