// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::buffer::FrozenBuffer;
use crate::error::{FreezeError, Result as FreezeResult};
use crate::instance::Instance;
use crate::number::Number;
use crate::object::{FrozenFunction, FrozenObject, NativeValue};
use crate::protected::Mutation;
use crate::Rc;

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;
use core::ops;

use anyhow::{anyhow, Result};
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

/// A frozen value.
///
/// Composite variants share their content through `Rc`; a sub-graph that was
/// shared before freezing is pointer-identical afterwards. No variant exposes
/// a mutating operation.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(Rc<str>),
    Bytes(Rc<[u8]>),

    /// Frozen form of every ordered sequence.
    Tuple(Rc<Vec<Value>>),
    Map(Rc<BTreeMap<Value, Value>>),
    Set(Rc<BTreeSet<Value>>),
    Buffer(Rc<FrozenBuffer>),

    Object(Rc<FrozenObject>),
    Function(FrozenFunction),
    /// A host object whose type is registered as inherently immutable.
    Native(Rc<dyn NativeValue>),
    Instance(Rc<Instance>),
}

impl Value {
    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Bytes(_) => 4,
            Value::Tuple(_) => 5,
            Value::Map(_) => 6,
            Value::Set(_) => 7,
            Value::Buffer(_) => 8,
            Value::Object(_) => 9,
            Value::Function(_) => 10,
            Value::Native(_) => 11,
            Value::Instance(_) => 12,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Tuple(a), Value::Tuple(b)) if Rc::ptr_eq(a, b) => Ordering::Equal,
            (Value::Tuple(a), Value::Tuple(b)) => a.cmp(b),
            (Value::Map(a), Value::Map(b)) if Rc::ptr_eq(a, b) => Ordering::Equal,
            (Value::Map(a), Value::Map(b)) => a.cmp(b),
            (Value::Set(a), Value::Set(b)) if Rc::ptr_eq(a, b) => Ordering::Equal,
            (Value::Set(a), Value::Set(b)) => a.cmp(b),
            (Value::Buffer(a), Value::Buffer(b)) => a.cmp(b),
            (Value::Object(a), Value::Object(b)) if Rc::ptr_eq(a, b) => Ordering::Equal,
            (Value::Object(a), Value::Object(b)) => a.cmp(b),
            (Value::Function(a), Value::Function(b)) => a.cmp(b),
            (Value::Native(a), Value::Native(b)) => a
                .type_name()
                .cmp(b.type_name())
                .then_with(|| a.key().cmp(&b.key())),
            (Value::Instance(a), Value::Instance(b)) if Rc::ptr_eq(a, b) => Ordering::Equal,
            (Value::Instance(a), Value::Instance(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::Error;
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => n.serialize(serializer),
            Value::String(s) => serializer.serialize_str(s.as_ref()),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::Tuple(a) => a.serialize(serializer),
            Value::Map(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields.iter() {
                    match k {
                        Value::String(_) => map.serialize_entry(k, v)?,
                        _ => {
                            let key_str = serde_json::to_string(k).map_err(Error::custom)?;
                            map.serialize_entry(&key_str, v)?
                        }
                    }
                }
                map.end()
            }

            // display set as an array
            Value::Set(s) => s.serialize(serializer),

            Value::Buffer(b) => {
                let mut seq = serializer.serialize_seq(Some(b.len()))?;
                for i in 0..b.len() {
                    seq.serialize_element(&b.get(i))?;
                }
                seq.end()
            }
            Value::Object(o) => match o.fields() {
                Some(fields) => {
                    let mut map = serializer.serialize_map(Some(fields.len()))?;
                    for (name, attribute) in fields.iter() {
                        match attribute.to_value() {
                            Ok(value) => map.serialize_entry(name.as_ref(), &value)?,
                            Err(_) => map.serialize_entry(name.as_ref(), "<unfrozen>")?,
                        }
                    }
                    map.end()
                }
                None => o
                    .native()
                    .map(|n| n.key())
                    .unwrap_or(Value::Null)
                    .serialize(serializer),
            },
            Value::Function(f) => serializer.serialize_str(&alloc::format!("<function {}>", f.name())),
            Value::Native(n) => n.key().serialize(serializer),
            Value::Instance(i) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(i.class_name(), &i.state())?;
                map.end()
            }
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a value")
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Bool(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::from(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::from(v))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::from(v))
    }

    fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::String(s.into()))
    }

    fn visit_string<E>(self, s: String) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::String(s.into()))
    }

    fn visit_bytes<E>(self, b: &[u8]) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Bytes(b.into()))
    }

    fn visit_seq<V>(self, mut visitor: V) -> Result<Self::Value, V::Error>
    where
        V: SeqAccess<'de>,
    {
        let mut items = Vec::new();
        while let Some(v) = visitor.next_element()? {
            items.push(v);
        }
        Ok(Value::from(items))
    }

    fn visit_map<V>(self, mut visitor: V) -> Result<Self::Value, V::Error>
    where
        V: MapAccess<'de>,
    {
        let mut map = BTreeMap::new();
        while let Some((key, value)) = visitor.next_entry()? {
            map.insert(key, value);
        }
        Ok(Value::from(map))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => write!(f, "{s}"),
            Err(_e) => Err(fmt::Error),
        }
    }
}

impl Value {
    pub fn new_tuple() -> Value {
        Value::from(Vec::new())
    }

    pub fn new_map() -> Value {
        Value::from(BTreeMap::new())
    }

    pub fn new_set() -> Value {
        Value::from(BTreeSet::new())
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::from(items)
    }

    /// Builds a frozen value from JSON. Arrays become tuples.
    pub fn from_json_str(json: &str) -> Result<Value> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_str(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Name of the value's type, as used in diagnostics.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Tuple(_) => "tuple",
            Value::Map(_) => "frozen mapping",
            Value::Set(_) => "frozen set",
            Value::Buffer(_) => "frozen buffer",
            Value::Object(o) => o.type_name(),
            Value::Function(_) => "function",
            Value::Native(n) => n.type_name(),
            Value::Instance(i) => i.class_name(),
        }
    }

    /// Attempts `mutation` on the value. Frozen values reject every protected
    /// operation; an instance built without protections accepts attribute
    /// changes.
    pub fn apply(&self, mutation: &Mutation) -> FreezeResult<()> {
        match self {
            Value::Object(o) => o.apply(mutation),
            Value::Function(f) => f.apply(mutation),
            Value::Instance(i) => i.apply(mutation),
            _ => Err(FreezeError::forbidden(self.type_name(), mutation.op())),
        }
    }

    /// Reads an attribute of an object or instance as a frozen value.
    pub fn attr(&self, name: &str) -> FreezeResult<Value> {
        match self {
            Value::Object(o) => o.attr(name),
            Value::Instance(i) => i.attr(name),
            _ => Err(FreezeError::NoAttribute {
                type_name: self.type_name().into(),
                attribute: name.into(),
            }),
        }
    }

    /// True when both values share the same allocation.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            (Value::Set(a), Value::Set(b)) => Rc::ptr_eq(a, b),
            (Value::Buffer(a), Value::Buffer(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::String(a), Value::String(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Tuple(Rc::new(a))
    }
}

impl From<BTreeSet<Value>> for Value {
    fn from(s: BTreeSet<Value>) -> Self {
        Value::Set(Rc::new(s))
    }
}

impl From<BTreeMap<Value, Value>> for Value {
    fn from(m: BTreeMap<Value, Value>) -> Self {
        Value::Map(Rc::new(m))
    }
}

impl From<FrozenBuffer> for Value {
    fn from(b: FrozenBuffer) -> Self {
        Value::Buffer(Rc::new(b))
    }
}

impl From<Instance> for Value {
    fn from(i: Instance) -> Self {
        Value::Instance(Rc::new(i))
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            _ => Err(anyhow!("not a bool")),
        }
    }

    pub fn as_number(&self) -> Result<&Number> {
        match self {
            Value::Number(n) => Ok(n),
            _ => Err(anyhow!("not a number")),
        }
    }

    pub fn as_string(&self) -> Result<&Rc<str>> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(anyhow!("not a string")),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            Value::Bytes(b) => Ok(b),
            _ => Err(anyhow!("not bytes")),
        }
    }

    pub fn as_tuple(&self) -> Result<&Vec<Value>> {
        match self {
            Value::Tuple(a) => Ok(a),
            _ => Err(anyhow!("not a tuple")),
        }
    }

    pub fn as_map(&self) -> Result<&BTreeMap<Value, Value>> {
        match self {
            Value::Map(m) => Ok(m),
            _ => Err(anyhow!("not a mapping")),
        }
    }

    pub fn as_set(&self) -> Result<&BTreeSet<Value>> {
        match self {
            Value::Set(s) => Ok(s),
            _ => Err(anyhow!("not a set")),
        }
    }

    pub fn as_buffer(&self) -> Result<&FrozenBuffer> {
        match self {
            Value::Buffer(b) => Ok(b),
            _ => Err(anyhow!("not a buffer")),
        }
    }

    pub fn as_object(&self) -> Result<&Rc<FrozenObject>> {
        match self {
            Value::Object(o) => Ok(o),
            _ => Err(anyhow!("not an object")),
        }
    }

    pub fn as_function(&self) -> Result<&FrozenFunction> {
        match self {
            Value::Function(f) => Ok(f),
            _ => Err(anyhow!("not a function")),
        }
    }

    pub fn as_instance(&self) -> Result<&Rc<Instance>> {
        match self {
            Value::Instance(i) => Ok(i),
            _ => Err(anyhow!("not an instance")),
        }
    }
}

impl ops::Index<usize> for Value {
    type Output = Value;

    fn index(&self, index: usize) -> &Self::Output {
        match self.as_tuple() {
            Ok(a) if index < a.len() => &a[index],
            _ => &Value::Null,
        }
    }
}

impl ops::Index<&str> for Value {
    type Output = Value;

    fn index(&self, key: &str) -> &Self::Output {
        &self[&Value::String(key.into())]
    }
}

impl ops::Index<&Value> for Value {
    type Output = Value;

    fn index(&self, key: &Value) -> &Self::Output {
        match (self, key) {
            (Value::Map(m), _) => m.get(key).unwrap_or(&Value::Null),
            (Value::Set(s), _) => s.get(key).unwrap_or(&Value::Null),
            (Value::Tuple(a), Value::Number(n)) => match n.as_usize() {
                Some(index) if index < a.len() => &a[index],
                _ => &Value::Null,
            },
            _ => &Value::Null,
        }
    }
}
