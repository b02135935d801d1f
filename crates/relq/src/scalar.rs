use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::errors::{RelqError, Result};

/// A single value in a row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    /// Absence of a value.
    #[default]
    Null,

    /// True or false value
    Boolean(bool),

    /// Signed 64bit int
    Int64(i64),

    /// 64bit float
    Float64(f64),

    /// Utf-8 encoded string.
    Utf8(String),

    /// An ordered list of values.
    List(Vec<ScalarValue>),
}

impl ScalarValue {
    pub const fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Name of the variant, used in error messages.
    pub const fn type_name(&self) -> &'static str {
        match self {
            ScalarValue::Null => "null",
            ScalarValue::Boolean(_) => "boolean",
            ScalarValue::Int64(_) => "int64",
            ScalarValue::Float64(_) => "float64",
            ScalarValue::Utf8(_) => "utf8",
            ScalarValue::List(_) => "list",
        }
    }

    fn mismatch(&self, expected: &'static str) -> RelqError {
        RelqError::TypeMismatch {
            expected,
            got: self.to_string(),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            ScalarValue::Boolean(b) => Ok(*b),
            other => Err(other.mismatch("boolean")),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            ScalarValue::Int64(i) => Ok(*i),
            other => Err(other.mismatch("int64")),
        }
    }

    /// Get the value as a float, promoting integers.
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            ScalarValue::Int64(i) => Ok(*i as f64),
            ScalarValue::Float64(f) => Ok(*f),
            other => Err(other.mismatch("float64")),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            ScalarValue::Utf8(s) => Ok(s.as_str()),
            other => Err(other.mismatch("utf8")),
        }
    }

    pub fn as_list(&self) -> Result<&[ScalarValue]> {
        match self {
            ScalarValue::List(vals) => Ok(vals.as_slice()),
            other => Err(other.mismatch("list")),
        }
    }

    /// Equality used for grouping.
    ///
    /// Differs from `PartialEq` only for floats: NaN is equal to NaN so that
    /// all NaNs land in one group.
    pub fn group_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ScalarValue::Float64(a), ScalarValue::Float64(b)) => {
                a == b || (a.is_nan() && b.is_nan())
            }
            (ScalarValue::List(a), ScalarValue::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| a.group_eq(b))
            }
            (a, b) => a == b,
        }
    }

    /// Hash consistent with `group_eq`.
    ///
    /// Integral floats hash like the equivalent integer since `Int64(1)` and
    /// `Float64(1.0)` compare equal.
    pub fn group_hash<H: Hasher>(&self, state: &mut H) {
        match self {
            ScalarValue::Null => 0_u8.hash(state),
            ScalarValue::Boolean(b) => {
                1_u8.hash(state);
                b.hash(state);
            }
            ScalarValue::Int64(i) => {
                2_u8.hash(state);
                i.hash(state);
            }
            ScalarValue::Float64(f) => match float_as_exact_int(*f) {
                Some(i) => {
                    2_u8.hash(state);
                    i.hash(state);
                }
                None if f.is_nan() => 3_u8.hash(state),
                None => {
                    4_u8.hash(state);
                    f.to_bits().hash(state);
                }
            },
            ScalarValue::Utf8(s) => {
                5_u8.hash(state);
                s.hash(state);
            }
            ScalarValue::List(vals) => {
                6_u8.hash(state);
                vals.len().hash(state);
                for val in vals {
                    val.group_hash(state);
                }
            }
        }
    }
}

/// Returns the integer a float represents exactly, if any.
fn float_as_exact_int(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, so use an exclusive upper bound.
    const BOUND: f64 = 9_223_372_036_854_775_808.0;
    if f.fract() == 0.0 && f >= -BOUND && f < BOUND {
        Some(f as i64)
    } else {
        None
    }
}

fn int_float_eq(i: i64, f: f64) -> bool {
    float_as_exact_int(f) == Some(i)
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ScalarValue::Null, ScalarValue::Null) => true,
            (ScalarValue::Boolean(a), ScalarValue::Boolean(b)) => a == b,
            (ScalarValue::Int64(a), ScalarValue::Int64(b)) => a == b,
            (ScalarValue::Float64(a), ScalarValue::Float64(b)) => a == b,
            (ScalarValue::Int64(i), ScalarValue::Float64(f))
            | (ScalarValue::Float64(f), ScalarValue::Int64(i)) => int_float_eq(*i, *f),
            (ScalarValue::Utf8(a), ScalarValue::Utf8(b)) => a == b,
            (ScalarValue::List(a), ScalarValue::List(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for ScalarValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (ScalarValue::Null, ScalarValue::Null) => Some(Ordering::Equal),
            (ScalarValue::Boolean(a), ScalarValue::Boolean(b)) => a.partial_cmp(b),
            (ScalarValue::Int64(a), ScalarValue::Int64(b)) => a.partial_cmp(b),
            (ScalarValue::Float64(a), ScalarValue::Float64(b)) => a.partial_cmp(b),
            (ScalarValue::Int64(a), ScalarValue::Float64(b)) => {
                if int_float_eq(*a, *b) {
                    Some(Ordering::Equal)
                } else {
                    (*a as f64).partial_cmp(b)
                }
            }
            (ScalarValue::Float64(a), ScalarValue::Int64(b)) => {
                if int_float_eq(*b, *a) {
                    Some(Ordering::Equal)
                } else {
                    a.partial_cmp(&(*b as f64))
                }
            }
            (ScalarValue::Utf8(a), ScalarValue::Utf8(b)) => a.partial_cmp(b),
            (ScalarValue::List(a), ScalarValue::List(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
            Self::List(vals) => {
                write!(f, "[")?;
                for (idx, val) in vals.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{val}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Wrapper giving a slice of values hash/eq semantics from `group_eq`.
#[derive(Debug, Clone)]
pub(crate) struct GroupKey(pub Vec<ScalarValue>);

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self.0.iter().zip(other.0.iter()).all(|(a, b)| a.group_eq(b))
    }
}

impl Eq for GroupKey {}

impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for val in &self.0 {
            val.group_hash(state);
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Int64(value as i64)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int64(value)
    }
}

impl From<u32> for ScalarValue {
    fn from(value: u32) -> Self {
        ScalarValue::Int64(value as i64)
    }
}

impl From<usize> for ScalarValue {
    fn from(value: usize) -> Self {
        // Row counts and indexes, never near i64::MAX in memory.
        ScalarValue::Int64(value as i64)
    }
}

impl From<f32> for ScalarValue {
    fn from(value: f32) -> Self {
        ScalarValue::Float64(value as f64)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float64(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Utf8(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Utf8(value)
    }
}

impl From<&ScalarValue> for ScalarValue {
    fn from(value: &ScalarValue) -> Self {
        value.clone()
    }
}

impl<T: Into<ScalarValue>> From<Option<T>> for ScalarValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => ScalarValue::Null,
        }
    }
}

impl<T: Into<ScalarValue>> From<Vec<T>> for ScalarValue {
    fn from(values: Vec<T>) -> Self {
        ScalarValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl TryFrom<serde_json::Value> for ScalarValue {
    type Error = RelqError;

    /// Objects have no scalar representation and are rejected.
    fn try_from(value: serde_json::Value) -> Result<Self> {
        use serde_json::Value;

        Ok(match value {
            Value::Null => ScalarValue::Null,
            Value::Bool(b) => ScalarValue::Boolean(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ScalarValue::Int64(i),
                None => match n.as_f64() {
                    Some(f) => ScalarValue::Float64(f),
                    None => {
                        return Err(RelqError::TypeMismatch {
                            expected: "int64 or float64",
                            got: n.to_string(),
                        });
                    }
                },
            },
            Value::String(s) => ScalarValue::Utf8(s),
            Value::Array(vals) => ScalarValue::List(
                vals.into_iter()
                    .map(ScalarValue::try_from)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Object(_) => {
                return Err(RelqError::TypeMismatch {
                    expected: "scalar",
                    got: "object".to_string(),
                });
            }
        })
    }
}

impl From<ScalarValue> for serde_json::Value {
    /// Non-finite floats become JSON null.
    fn from(value: ScalarValue) -> Self {
        use serde_json::Value;

        match value {
            ScalarValue::Null => Value::Null,
            ScalarValue::Boolean(b) => Value::Bool(b),
            ScalarValue::Int64(i) => Value::from(i),
            ScalarValue::Float64(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ScalarValue::Utf8(s) => Value::String(s),
            ScalarValue::List(vals) => Value::Array(vals.into_iter().map(Into::into).collect()),
        }
    }
}
