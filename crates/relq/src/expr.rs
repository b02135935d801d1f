use std::fmt;
use std::sync::Arc;

use crate::aggregate::Aggregate;
use crate::errors::{Result, shape};
use crate::ops::Group;
use crate::row::Row;
use crate::scalar::ScalarValue;

/// Expression evaluated against a single row.
pub type RowFn = Arc<dyn Fn(&Row) -> Result<ScalarValue> + Send + Sync>;

/// Boolean expression evaluated against a single row.
pub type Predicate = Arc<dyn Fn(&Row) -> Result<bool> + Send + Sync>;

/// Boolean expression evaluated against a group.
pub type GroupPredicate = Arc<dyn Fn(&Group) -> Result<bool> + Send + Sync>;

/// Expression evaluated against all member rows of a group.
pub type AggregateFn = Arc<dyn Fn(&[Row]) -> Result<ScalarValue> + Send + Sync>;

/// Wrap a closure returning anything convertible to a scalar.
pub fn row_fn<F, V>(f: F) -> RowFn
where
    F: Fn(&Row) -> Result<V> + Send + Sync + 'static,
    V: Into<ScalarValue>,
{
    Arc::new(move |row: &Row| -> Result<ScalarValue> { f(row).map(Into::into) })
}

pub fn predicate<F>(f: F) -> Predicate
where
    F: Fn(&Row) -> Result<bool> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn group_predicate<F>(f: F) -> GroupPredicate
where
    F: Fn(&Group) -> Result<bool> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Expression returning the value of a named column.
pub fn col(name: impl Into<String>) -> impl Fn(&Row) -> Result<ScalarValue> + Send + Sync + Clone + 'static {
    let name = name.into();
    move |row: &Row| row.get(&name).cloned()
}

/// Expression returning a constant.
pub fn lit(value: impl Into<ScalarValue>) -> impl Fn(&Row) -> Result<ScalarValue> + Send + Sync + Clone + 'static {
    let value = value.into();
    move |_: &Row| Ok(value.clone())
}

/// Marker for "every input column, unchanged".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectStar;

pub const STAR: SelectStar = SelectStar;

/// A single output expression.
#[derive(Clone)]
pub enum Expression {
    /// Evaluated per row (or against the group key when grouped).
    Scalar(RowFn),
    /// Evaluated against the members of a group.
    Aggregate(Aggregate),
}

impl Expression {
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Expression::Aggregate(_))
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Scalar(_) => write!(f, "Scalar"),
            Expression::Aggregate(agg) => write!(f, "Aggregate({})", agg.name()),
        }
    }
}

/// The projection of a select: an optional star followed by named
/// expressions.
#[derive(Debug, Clone, Default)]
pub struct QueryComposite {
    star: bool,
    exprs: Vec<(String, Expression)>,
}

impl QueryComposite {
    pub fn new() -> Self {
        QueryComposite::default()
    }

    /// Composite that propagates every input column.
    pub fn star() -> Self {
        QueryComposite {
            star: true,
            exprs: Vec::new(),
        }
    }

    /// Add an output column computed from each row.
    pub fn column<F, V>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Row) -> Result<V> + Send + Sync + 'static,
        V: Into<ScalarValue>,
    {
        self.expr(name, Expression::Scalar(row_fn(f)))
    }

    /// Add an output column computed by an aggregate over group members.
    pub fn aggregate(self, name: impl Into<String>, agg: Aggregate) -> Self {
        self.expr(name, Expression::Aggregate(agg))
    }

    /// Add an output column computed by an arbitrary closure over group
    /// members.
    pub fn aggregate_with<F, V>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Row]) -> Result<V> + Send + Sync + 'static,
        V: Into<ScalarValue>,
    {
        self.aggregate(name, Aggregate::from_fn(f))
    }

    pub fn expr(mut self, name: impl Into<String>, expr: Expression) -> Self {
        self.exprs.push((name.into(), expr));
        self
    }

    pub fn has_star(&self) -> bool {
        self.star
    }

    pub fn has_aggregates(&self) -> bool {
        self.exprs.iter().any(|(_, expr)| expr.is_aggregate())
    }

    pub fn exprs(&self) -> &[(String, Expression)] {
        &self.exprs
    }

    /// Names of the explicit expressions, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.exprs.iter().map(|(name, _)| name.as_str())
    }

    /// Check that no two explicit expressions share a name.
    pub fn validate(&self) -> Result<()> {
        for (idx, (name, _)) in self.exprs.iter().enumerate() {
            if self.exprs[..idx].iter().any(|(other, _)| other == name) {
                return Err(shape!("duplicate output column '{name}'"));
            }
        }
        Ok(())
    }

    /// Output column names given the columns the star would expand to.
    pub(crate) fn output_columns<'a>(&'a self, star_columns: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut columns: Vec<String> = if self.star {
            star_columns.into_iter().map(|c| c.to_string()).collect()
        } else {
            Vec::new()
        };
        for name in self.names() {
            if !columns.iter().any(|c| c == name) {
                columns.push(name.to_string());
            }
        }
        columns
    }
}

impl From<SelectStar> for QueryComposite {
    fn from(_: SelectStar) -> Self {
        QueryComposite::star()
    }
}
