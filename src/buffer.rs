// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.
#![allow(clippy::as_conversions)]

//! Bulk numeric buffers.
//!
//! A buffer is frozen as a whole: the data is copied once into a
//! [`FrozenBuffer`], which offers no mutable access. Elements are never
//! wrapped individually.

use crate::number::Number;
use crate::protected::InPlaceOp;
use crate::value::Value;
use crate::Rc;

use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Element type tag of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Bool,
    Int64,
    Float64,
}

impl ElementType {
    pub fn tag(self) -> &'static str {
        match self {
            ElementType::Bool => "bool",
            ElementType::Int64 => "int64",
            ElementType::Float64 => "float64",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Flat, row-major element storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BufferData {
    Bool(Vec<bool>),
    Int64(Vec<i64>),
    Float64(Vec<f64>),
}

impl BufferData {
    pub fn len(&self) -> usize {
        match self {
            BufferData::Bool(v) => v.len(),
            BufferData::Int64(v) => v.len(),
            BufferData::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            BufferData::Bool(_) => ElementType::Bool,
            BufferData::Int64(_) => ElementType::Int64,
            BufferData::Float64(_) => ElementType::Float64,
        }
    }

    fn get(&self, index: usize) -> Option<Number> {
        match self {
            BufferData::Bool(v) => v.get(index).map(|b| Number::from(i64::from(*b))),
            BufferData::Int64(v) => v.get(index).map(|i| Number::from(*i)),
            BufferData::Float64(v) => v.get(index).map(|f| Number::from(*f)),
        }
    }

    fn numbers(&self) -> impl Iterator<Item = Number> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    // Elements compared by total order so buffers can live in ordered containers.
    fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (BufferData::Bool(a), BufferData::Bool(b)) => a.cmp(b),
            (BufferData::Int64(a), BufferData::Int64(b)) => a.cmp(b),
            (BufferData::Float64(a), BufferData::Float64(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.total_cmp(y) {
                        Ordering::Equal => continue,
                        o => return o,
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.element_type().cmp(&other.element_type()),
        }
    }

    fn hash_elements<H: Hasher>(&self, state: &mut H) {
        match self {
            BufferData::Bool(v) => v.hash(state),
            BufferData::Int64(v) => v.hash(state),
            BufferData::Float64(v) => {
                state.write_usize(v.len());
                for f in v {
                    state.write_u64(f.to_bits());
                }
            }
        }
    }
}

fn element_count(shape: &[usize]) -> Result<usize> {
    match shape.iter().try_fold(1usize, |n, d| n.checked_mul(*d)) {
        Some(n) => Ok(n),
        None => bail!("shape {shape:?} holds more elements than can be addressed"),
    }
}

/// A mutable numeric buffer, used while a value is being built.
#[derive(Debug, Clone)]
pub struct NumericBuffer {
    shape: Vec<usize>,
    data: BufferData,
}

impl NumericBuffer {
    pub fn new(shape: Vec<usize>, data: BufferData) -> Result<Self> {
        let count = element_count(&shape)?;
        if count != data.len() {
            bail!(
                "shape {shape:?} holds {count} elements but {} were supplied",
                data.len()
            );
        }
        Ok(Self { shape, data })
    }

    /// One-dimensional float buffer.
    pub fn from_f64(values: Vec<f64>) -> Self {
        Self {
            shape: alloc::vec![values.len()],
            data: BufferData::Float64(values),
        }
    }

    /// One-dimensional integer buffer.
    pub fn from_i64(values: Vec<i64>) -> Self {
        Self {
            shape: alloc::vec![values.len()],
            data: BufferData::Int64(values),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &BufferData {
        &self.data
    }

    pub fn get(&self, index: usize) -> Option<Number> {
        self.data.get(index)
    }

    /// Stores `value` at flat `index`, converting to the element type.
    pub fn set(&mut self, index: usize, value: &Number) -> Result<()> {
        if index >= self.len() {
            bail!("index {index} out of range for buffer of {} elements", self.len());
        }
        match &mut self.data {
            BufferData::Bool(v) => v[index] = !value.is_zero(),
            BufferData::Int64(v) => match value.as_i64() {
                Some(i) if value.is_integer() => v[index] = i,
                _ => bail!("cannot store {value} in an int64 buffer"),
            },
            BufferData::Float64(v) => v[index] = value.as_f64(),
        }
        Ok(())
    }

    /// Applies `op` with a scalar operand to every element.
    pub fn apply_scalar(&mut self, op: InPlaceOp, operand: &Number) -> Result<()> {
        let element_type = self.element_type();
        let mut out = Vec::with_capacity(self.len());
        for n in self.data.numbers() {
            out.push(apply_number(op, &n, operand)?);
        }
        self.data = match element_type {
            ElementType::Float64 => BufferData::Float64(out.iter().map(Number::as_f64).collect()),
            _ if out.iter().all(Number::is_integer) && !matches!(op, InPlaceOp::TrueDiv) => {
                let mut ints = Vec::with_capacity(out.len());
                for n in &out {
                    match n.as_i64() {
                        Some(i) => ints.push(i),
                        None => bail!("result {n} overflows an int64 buffer"),
                    }
                }
                BufferData::Int64(ints)
            }
            _ => BufferData::Float64(out.iter().map(Number::as_f64).collect()),
        };
        Ok(())
    }

    /// Copy-then-lock: the only way from a mutable buffer to a frozen one.
    pub fn freeze(&self) -> FrozenBuffer {
        FrozenBuffer {
            shape: self.shape.as_slice().into(),
            data: Rc::new(self.data.clone()),
        }
    }
}

/// Applies an in-place arithmetic operator to two numbers.
pub(crate) fn apply_number(op: InPlaceOp, lhs: &Number, rhs: &Number) -> Result<Number> {
    match op {
        InPlaceOp::Add => lhs.add(rhs),
        InPlaceOp::Sub => lhs.sub(rhs),
        InPlaceOp::Mul => lhs.mul(rhs),
        InPlaceOp::Div | InPlaceOp::TrueDiv => lhs.true_div(rhs),
        InPlaceOp::FloorDiv => lhs.floor_div(rhs),
        InPlaceOp::Mod => lhs.modulo(rhs),
        InPlaceOp::Pow => lhs.pow(rhs),
        InPlaceOp::LShift => lhs.lsh(rhs),
        InPlaceOp::RShift => lhs.rsh(rhs),
        InPlaceOp::And => lhs.and(rhs),
        InPlaceOp::Xor => lhs.xor(rhs),
        InPlaceOp::Or => lhs.or(rhs),
        InPlaceOp::Concat | InPlaceOp::Repeat => {
            bail!("unsupported operand type for in-place \"{}\": number", op.name())
        }
    }
}

/// A read-only buffer produced by freezing a [`NumericBuffer`].
#[derive(Clone)]
pub struct FrozenBuffer {
    shape: Rc<[usize]>,
    data: Rc<BufferData>,
}

impl FrozenBuffer {
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    pub fn data(&self) -> &BufferData {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Number> {
        self.data.get(index)
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.data.numbers().map(|n| n.as_f64()).collect()
    }

    /// A fresh mutable copy for numeric code that needs one.
    pub fn to_mutable(&self) -> NumericBuffer {
        NumericBuffer {
            shape: self.shape.to_vec(),
            data: (*self.data).clone(),
        }
    }

    /// Hashable surrogate `(flattened contents, shape, element-type tag)`.
    pub fn reduce(&self) -> Value {
        let contents: Vec<Value> = self.data.numbers().map(Value::Number).collect();
        let shape: Vec<Value> = self.shape.iter().map(|d| Value::from(*d)).collect();
        Value::tuple(alloc::vec![
            Value::tuple(contents),
            Value::tuple(shape),
            Value::from(self.element_type().tag()),
        ])
    }

    pub(crate) fn structural_hash<H: Hasher>(&self, state: &mut H) {
        self.shape.hash(state);
        self.element_type().hash(state);
        self.data.hash_elements(state);
    }

    pub(crate) fn from_parts(shape: Vec<usize>, data: BufferData) -> Result<Self> {
        Ok(NumericBuffer::new(shape, data)?.freeze())
    }
}

impl fmt::Debug for FrozenBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrozenBuffer")
            .field("shape", &self.shape)
            .field("dtype", &self.element_type())
            .finish()
    }
}

impl PartialEq for FrozenBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrozenBuffer {}

impl Ord for FrozenBuffer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.shape
            .cmp(&other.shape)
            .then_with(|| self.data.total_cmp(&other.data))
    }
}

impl PartialOrd for FrozenBuffer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
