// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.
#![allow(clippy::float_cmp, clippy::as_conversions)]

use alloc::string::{String, ToString};
use core::cmp::Ordering;
use core::fmt::{self, Debug, Display, Formatter};
use core::hash::{Hash, Hasher};
use core::str::FromStr;

use anyhow::{bail, Result};
use num_bigint::BigInt;
use num_traits::{FromPrimitive, Signed, ToPrimitive, Zero};
use serde::ser::Serializer;
use serde::Serialize;

use crate::Rc;

/// Largest integer result, in bits, produced by `pow` and `lsh`.
const MAX_INT_BITS: u64 = 1 << 20;

/// A numeric scalar. Always atomic.
///
/// Integers that fit in an `i64` are kept inline; wider integers are promoted
/// to `BigInt` and demoted again whenever a result fits.
#[derive(Clone)]
pub enum Number {
    Int(i64),
    Float(f64),
    BigInt(Rc<BigInt>),
}

impl Number {
    fn from_bigint_owned(value: BigInt) -> Self {
        match value.to_i64() {
            Some(i) => Number::Int(i),
            None => Number::BigInt(Rc::new(value)),
        }
    }

    fn from_i128(value: i128) -> Self {
        match i64::try_from(value) {
            Ok(i) => Number::Int(i),
            Err(_) => Number::BigInt(Rc::new(BigInt::from(value))),
        }
    }

    fn to_bigint_owned(&self) -> Option<BigInt> {
        match self {
            Number::Int(v) => Some(BigInt::from(*v)),
            Number::BigInt(v) => Some((**v).clone()),
            Number::Float(f) if f.is_finite() && f.fract() == 0.0 => BigInt::from_f64(*f),
            Number::Float(_) => None,
        }
    }

    fn to_f64_lossy(&self) -> f64 {
        match self {
            Number::Int(v) => *v as f64,
            Number::Float(v) => *v,
            Number::BigInt(v) => match v.to_f64() {
                Some(f) => f,
                None if v.is_negative() => f64::NEG_INFINITY,
                None => f64::INFINITY,
            },
        }
    }

    fn is_float(&self) -> bool {
        matches!(self, Number::Float(_))
    }

    pub fn is_integer(&self) -> bool {
        match self {
            Number::Float(f) => f.is_finite() && f.fract() == 0.0,
            _ => true,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Number::Int(v) => *v == 0,
            Number::Float(f) => *f == 0.0,
            Number::BigInt(v) => v.is_zero(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Number::Int(v) => Some(*v),
            Number::BigInt(_) => None,
            Number::Float(_) => self.to_bigint_owned()?.to_i64(),
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        self.as_i64().and_then(|v| usize::try_from(v).ok())
    }

    pub fn as_f64(&self) -> f64 {
        self.to_f64_lossy()
    }

    fn ints(&self, rhs: &Self) -> Option<(BigInt, BigInt)> {
        if self.is_float() || rhs.is_float() {
            return None;
        }
        Some((self.to_bigint_owned()?, rhs.to_bigint_owned()?))
    }

    pub fn add(&self, rhs: &Self) -> Result<Number> {
        if let (Number::Int(a), Number::Int(b)) = (self, rhs) {
            return Ok(Number::from_i128(*a as i128 + *b as i128));
        }
        match self.ints(rhs) {
            Some((a, b)) => Ok(Number::from_bigint_owned(a + b)),
            None => Ok(Number::Float(self.to_f64_lossy() + rhs.to_f64_lossy())),
        }
    }

    pub fn sub(&self, rhs: &Self) -> Result<Number> {
        if let (Number::Int(a), Number::Int(b)) = (self, rhs) {
            return Ok(Number::from_i128(*a as i128 - *b as i128));
        }
        match self.ints(rhs) {
            Some((a, b)) => Ok(Number::from_bigint_owned(a - b)),
            None => Ok(Number::Float(self.to_f64_lossy() - rhs.to_f64_lossy())),
        }
    }

    pub fn mul(&self, rhs: &Self) -> Result<Number> {
        if let (Number::Int(a), Number::Int(b)) = (self, rhs) {
            return Ok(Number::from_i128(*a as i128 * *b as i128));
        }
        match self.ints(rhs) {
            Some((a, b)) => Ok(Number::from_bigint_owned(a * b)),
            None => Ok(Number::Float(self.to_f64_lossy() * rhs.to_f64_lossy())),
        }
    }

    /// True division; always produces a float.
    pub fn true_div(&self, rhs: &Self) -> Result<Number> {
        if rhs.is_zero() {
            bail!("division by zero");
        }
        Ok(Number::Float(self.to_f64_lossy() / rhs.to_f64_lossy()))
    }

    /// Division rounding toward negative infinity.
    pub fn floor_div(&self, rhs: &Self) -> Result<Number> {
        if rhs.is_zero() {
            bail!("integer division by zero");
        }
        match self.ints(rhs) {
            Some((a, b)) => {
                let mut q = &a / &b;
                if !(&a % &b).is_zero() && (a.is_negative() != b.is_negative()) {
                    q -= BigInt::from(1);
                }
                Ok(Number::from_bigint_owned(q))
            }
            None => Ok(Number::Float(
                (self.to_f64_lossy() / rhs.to_f64_lossy()).floor(),
            )),
        }
    }

    /// Remainder taking the sign of the divisor.
    pub fn modulo(&self, rhs: &Self) -> Result<Number> {
        if rhs.is_zero() {
            bail!("modulo by zero");
        }
        match self.ints(rhs) {
            Some((a, b)) => {
                let mut r = &a % &b;
                if !r.is_zero() && (r.is_negative() != b.is_negative()) {
                    r += &b;
                }
                Ok(Number::from_bigint_owned(r))
            }
            None => {
                let (a, b) = (self.to_f64_lossy(), rhs.to_f64_lossy());
                let r = a % b;
                if r != 0.0 && (r < 0.0) != (b < 0.0) {
                    Ok(Number::Float(r + b))
                } else {
                    Ok(Number::Float(r))
                }
            }
        }
    }

    pub fn pow(&self, rhs: &Self) -> Result<Number> {
        if let Some((base, exp)) = self.ints(rhs) {
            if !exp.is_negative() {
                let Some(exp) = exp.to_u32() else {
                    bail!("exponent {exp} is too large");
                };
                // |base| >= 2 gives at least (bits - 1) * exp bits.
                if base.bits() > 1
                    && (base.bits() - 1).saturating_mul(u64::from(exp)) > MAX_INT_BITS
                {
                    bail!("result of {base} ** {exp} is too large");
                }
                return Ok(Number::from_bigint_owned(base.pow(exp)));
            }
        }
        Ok(Number::Float(self.to_f64_lossy().powf(rhs.to_f64_lossy())))
    }

    fn int_operands(&self, rhs: &Self, op: &str) -> Result<(BigInt, BigInt)> {
        match self.ints(rhs) {
            Some(ints) => Ok(ints),
            None => bail!("unsupported operand types for {op}: {self} and {rhs}"),
        }
    }

    pub fn and(&self, rhs: &Self) -> Result<Number> {
        let (a, b) = self.int_operands(rhs, "&")?;
        Ok(Number::from_bigint_owned(a & b))
    }

    pub fn or(&self, rhs: &Self) -> Result<Number> {
        let (a, b) = self.int_operands(rhs, "|")?;
        Ok(Number::from_bigint_owned(a | b))
    }

    pub fn xor(&self, rhs: &Self) -> Result<Number> {
        let (a, b) = self.int_operands(rhs, "^")?;
        Ok(Number::from_bigint_owned(a ^ b))
    }

    pub fn lsh(&self, rhs: &Self) -> Result<Number> {
        let (a, b) = self.int_operands(rhs, "<<")?;
        match b.to_usize() {
            Some(_) if a.is_zero() => Ok(Number::Int(0)),
            Some(shift) if (shift as u64).saturating_add(a.bits()) <= MAX_INT_BITS => {
                Ok(Number::from_bigint_owned(a << shift))
            }
            Some(shift) => bail!("result of {a} << {shift} is too large"),
            None => bail!("negative or oversized shift count {b}"),
        }
    }

    pub fn rsh(&self, rhs: &Self) -> Result<Number> {
        let (a, b) = self.int_operands(rhs, ">>")?;
        match b.to_usize() {
            Some(shift) => Ok(Number::from_bigint_owned(a >> shift)),
            None => bail!("negative or oversized shift count {b}"),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Number {}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        if let (Number::Int(a), Number::Int(b)) = (self, other) {
            return a.cmp(b);
        }
        if let (Some(a), Some(b)) = (self.to_bigint_owned(), other.to_bigint_owned()) {
            return a.cmp(&b);
        }
        self.to_f64_lossy().total_cmp(&other.to_f64_lossy())
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Numbers that compare equal always have the same lossy f64 image, so hashing
// that image keeps Hash consistent with Eq across representations.
impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let f = self.to_f64_lossy();
        let canonical = if f == 0.0 {
            0.0f64.to_bits()
        } else if f.is_nan() {
            f64::NAN.to_bits()
        } else {
            f.to_bits()
        };
        state.write_u64(canonical);
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(v) => write!(f, "{v}"),
            Number::BigInt(v) => write!(f, "{v}"),
            Number::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{v:.1}"),
            Number::Float(v) => write!(f, "{v}"),
        }
    }
}

impl Debug for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl Serialize for Number {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Number::Int(v) => serializer.serialize_i64(*v),
            Number::Float(v) => serializer.serialize_f64(*v),
            // Exceeds every native JSON number width.
            Number::BigInt(v) => serializer.serialize_str(&v.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseNumberError;

impl Display for ParseNumberError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("invalid number literal")
    }
}

impl core::error::Error for ParseNumberError {}

impl FromStr for Number {
    type Err = ParseNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(i) = s.parse::<i64>() {
            return Ok(Number::Int(i));
        }
        if let Ok(big) = s.parse::<BigInt>() {
            return Ok(Number::from_bigint_owned(big));
        }
        s.parse::<f64>()
            .map(Number::Float)
            .map_err(|_| ParseNumberError)
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number::Int(value)
    }
}

impl From<i32> for Number {
    fn from(value: i32) -> Self {
        Number::Int(value.into())
    }
}

impl From<u64> for Number {
    fn from(value: u64) -> Self {
        Number::from_i128(value.into())
    }
}

impl From<usize> for Number {
    fn from(value: usize) -> Self {
        Number::from_i128(value as i128)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number::Float(value)
    }
}

impl From<BigInt> for Number {
    fn from(value: BigInt) -> Self {
        Number::from_bigint_owned(value)
    }
}

impl Number {
    /// Decimal rendering of integers wider than `i64`, for persistence.
    pub(crate) fn big_decimal(&self) -> Option<String> {
        match self {
            Number::BigInt(v) => Some(v.to_string()),
            _ => None,
        }
    }
}
