//! Builtin aggregates.
//!
//! Every builtin evaluates an input expression against each member row, skips
//! NULLs, and feeds the rest to an accumulator.
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::errors::{RelqError, Result};
use crate::expr::{AggregateFn, RowFn, row_fn};
use crate::row::Row;
use crate::scalar::ScalarValue;

/// Running state for a single aggregate over a single group.
pub trait Accumulator: Send {
    /// Update the state with a non-null value.
    fn update(&mut self, value: &ScalarValue) -> Result<()>;

    /// Produce the final value.
    fn finish(&mut self) -> Result<ScalarValue>;
}

#[derive(Clone)]
pub struct Aggregate {
    name: &'static str,
    func: AggregateFn,
}

impl Aggregate {
    /// Aggregate `expr` over member rows with the accumulator `A`.
    pub fn new<A, F, V>(name: &'static str, expr: F) -> Self
    where
        A: Accumulator + Default + 'static,
        F: Fn(&Row) -> Result<V> + Send + Sync + 'static,
        V: Into<ScalarValue>,
    {
        let expr = row_fn(expr);
        Aggregate {
            name,
            func: Arc::new(move |rows: &[Row]| accumulate(&mut A::default(), &expr, rows)),
        }
    }

    /// Aggregate using an arbitrary closure over the member rows.
    pub fn from_fn<F, V>(f: F) -> Self
    where
        F: Fn(&[Row]) -> Result<V> + Send + Sync + 'static,
        V: Into<ScalarValue>,
    {
        Aggregate {
            name: "custom",
            func: Arc::new(move |rows: &[Row]| -> Result<ScalarValue> { f(rows).map(Into::into) }),
        }
    }

    /// Number of rows in the group.
    pub fn count_star() -> Self {
        Aggregate {
            name: "count_star",
            func: Arc::new(|rows: &[Row]| -> Result<ScalarValue> { Ok(ScalarValue::from(rows.len())) }),
        }
    }

    /// Number of non-null values.
    pub fn count<F, V>(expr: F) -> Self
    where
        F: Fn(&Row) -> Result<V> + Send + Sync + 'static,
        V: Into<ScalarValue>,
    {
        Self::new::<CountAcc, _, _>("count", expr)
    }

    pub fn sum<F, V>(expr: F) -> Self
    where
        F: Fn(&Row) -> Result<V> + Send + Sync + 'static,
        V: Into<ScalarValue>,
    {
        Self::new::<SumAcc, _, _>("sum", expr)
    }

    pub fn avg<F, V>(expr: F) -> Self
    where
        F: Fn(&Row) -> Result<V> + Send + Sync + 'static,
        V: Into<ScalarValue>,
    {
        Self::new::<AvgAcc, _, _>("avg", expr)
    }

    pub fn min<F, V>(expr: F) -> Self
    where
        F: Fn(&Row) -> Result<V> + Send + Sync + 'static,
        V: Into<ScalarValue>,
    {
        Self::new::<MinAcc, _, _>("min", expr)
    }

    pub fn max<F, V>(expr: F) -> Self
    where
        F: Fn(&Row) -> Result<V> + Send + Sync + 'static,
        V: Into<ScalarValue>,
    {
        Self::new::<MaxAcc, _, _>("max", expr)
    }

    /// Sample standard deviation.
    pub fn stdev<F, V>(expr: F) -> Self
    where
        F: Fn(&Row) -> Result<V> + Send + Sync + 'static,
        V: Into<ScalarValue>,
    {
        Self::new::<StdevAcc, _, _>("stdev", expr)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn evaluate(&self, rows: &[Row]) -> Result<ScalarValue> {
        (self.func)(rows)
    }
}

impl fmt::Debug for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregate").field("name", &self.name).finish()
    }
}

fn accumulate(acc: &mut dyn Accumulator, expr: &RowFn, rows: &[Row]) -> Result<ScalarValue> {
    for row in rows {
        let value = expr(row)?;
        if !value.is_null() {
            acc.update(&value)?;
        }
    }
    acc.finish()
}

#[derive(Debug, Default)]
pub struct CountAcc {
    count: i64,
}

impl Accumulator for CountAcc {
    fn update(&mut self, _value: &ScalarValue) -> Result<()> {
        self.count += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<ScalarValue> {
        Ok(ScalarValue::Int64(self.count))
    }
}

#[derive(Debug, Default)]
pub enum SumAcc {
    #[default]
    Empty,
    Int(i64),
    Float(f64),
}

impl Accumulator for SumAcc {
    fn update(&mut self, value: &ScalarValue) -> Result<()> {
        *self = match (&*self, value) {
            (SumAcc::Empty, ScalarValue::Int64(v)) => SumAcc::Int(*v),
            (SumAcc::Int(sum), ScalarValue::Int64(v)) => {
                SumAcc::Int(sum.checked_add(*v).ok_or(RelqError::Overflow)?)
            }
            (SumAcc::Empty, v) => SumAcc::Float(v.as_f64()?),
            (SumAcc::Int(sum), v) => SumAcc::Float(*sum as f64 + v.as_f64()?),
            (SumAcc::Float(sum), v) => SumAcc::Float(sum + v.as_f64()?),
        };
        Ok(())
    }

    fn finish(&mut self) -> Result<ScalarValue> {
        Ok(match self {
            SumAcc::Empty => ScalarValue::Null,
            SumAcc::Int(v) => ScalarValue::Int64(*v),
            SumAcc::Float(v) => ScalarValue::Float64(*v),
        })
    }
}

#[derive(Debug, Default)]
pub struct AvgAcc {
    sum: f64,
    count: i64,
}

impl Accumulator for AvgAcc {
    fn update(&mut self, value: &ScalarValue) -> Result<()> {
        self.sum += value.as_f64()?;
        self.count += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<ScalarValue> {
        if self.count == 0 {
            return Ok(ScalarValue::Null);
        }
        Ok(ScalarValue::Float64(self.sum / self.count as f64))
    }
}

/// Keeps the value that compares as `keep` against every other value.
#[derive(Debug)]
struct ExtremeAcc {
    keep: Ordering,
    current: Option<ScalarValue>,
}

impl ExtremeAcc {
    fn update(&mut self, value: &ScalarValue) -> Result<()> {
        // NaN has no place in the ordering, skip it like a NULL.
        if matches!(value, ScalarValue::Float64(f) if f.is_nan()) {
            return Ok(());
        }
        match &self.current {
            None => self.current = Some(value.clone()),
            Some(current) => match value.partial_cmp(current) {
                Some(ord) if ord == self.keep => self.current = Some(value.clone()),
                Some(_) => (),
                None => {
                    return Err(RelqError::TypeMismatch {
                        expected: current.type_name(),
                        got: value.type_name().to_string(),
                    });
                }
            },
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MinAcc(ExtremeAcc);

impl Default for MinAcc {
    fn default() -> Self {
        MinAcc(ExtremeAcc {
            keep: Ordering::Less,
            current: None,
        })
    }
}

impl Accumulator for MinAcc {
    fn update(&mut self, value: &ScalarValue) -> Result<()> {
        self.0.update(value)
    }

    fn finish(&mut self) -> Result<ScalarValue> {
        Ok(self.0.current.take().unwrap_or_default())
    }
}

#[derive(Debug)]
pub struct MaxAcc(ExtremeAcc);

impl Default for MaxAcc {
    fn default() -> Self {
        MaxAcc(ExtremeAcc {
            keep: Ordering::Greater,
            current: None,
        })
    }
}

impl Accumulator for MaxAcc {
    fn update(&mut self, value: &ScalarValue) -> Result<()> {
        self.0.update(value)
    }

    fn finish(&mut self) -> Result<ScalarValue> {
        Ok(self.0.current.take().unwrap_or_default())
    }
}

/// Sample standard deviation using Welford's online algorithm.
#[derive(Debug, Default)]
pub struct StdevAcc {
    count: i64,
    mean: f64,
    m2: f64,
}

impl Accumulator for StdevAcc {
    fn update(&mut self, value: &ScalarValue) -> Result<()> {
        let v = value.as_f64()?;
        self.count += 1;
        let delta = v - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (v - self.mean);
        Ok(())
    }

    fn finish(&mut self) -> Result<ScalarValue> {
        if self.count < 2 {
            return Ok(ScalarValue::Null);
        }
        Ok(ScalarValue::Float64((self.m2 / (self.count - 1) as f64).sqrt()))
    }
}
