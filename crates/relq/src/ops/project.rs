use std::sync::Arc;

use crate::errors::{Result, shape, usage};
use crate::expr::{Expression, QueryComposite};
use crate::row::{Field, Row, RowSchema};
use crate::scalar::ScalarValue;

use super::Group;

/// Output row under construction.
#[derive(Debug, Default)]
struct Projection {
    fields: Vec<Field>,
    values: Vec<ScalarValue>,
}

impl Projection {
    /// Start a projection with the local columns of `row` when the composite
    /// has a star.
    fn new(composite: &QueryComposite, row: &Row) -> Result<Self> {
        let mut proj = Projection::default();
        if !composite.has_star() {
            return Ok(proj);
        }
        for (field, value) in row.fields().iter().zip(row.values()) {
            if proj.position(&field.name).is_some() {
                return Err(shape!(
                    "ambiguous column '{}' in star expansion",
                    field.name
                ));
            }
            proj.fields.push(Field::new(field.name.clone()));
            proj.values.push(value.clone());
        }
        Ok(proj)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Set a named value, replacing a star column of the same name in place.
    fn set(&mut self, name: &str, value: ScalarValue) {
        match self.position(name) {
            Some(idx) => self.values[idx] = value,
            None => {
                self.fields.push(Field::new(name));
                self.values.push(value);
            }
        }
    }

    fn finish(self) -> Result<Row> {
        Row::try_new(Arc::new(RowSchema::try_new(self.fields)?), self.values)
    }
}

/// Project a single row through a composite.
pub fn select_map(row: &Row, composite: &QueryComposite) -> Result<Row> {
    composite.validate()?;
    let mut proj = Projection::new(composite, row)?;
    for (name, expr) in composite.exprs() {
        let value = match expr {
            Expression::Scalar(f) => f(row)?,
            Expression::Aggregate(_) => {
                return Err(usage!(
                    "aggregate expression '{name}' requires a grouped query"
                ));
            }
        };
        proj.set(name, value);
    }
    proj.finish()
}

/// Project a group through a composite.
///
/// Row expressions see the group key, aggregate expressions see the member
/// rows.
pub fn aggregate_map(group: &Group, composite: &QueryComposite) -> Result<Row> {
    composite.validate()?;
    let mut proj = Projection::new(composite, group.key())?;
    for (name, expr) in composite.exprs() {
        let value = match expr {
            Expression::Scalar(f) => f(group.key())?,
            Expression::Aggregate(agg) => group.aggregate(agg)?,
        };
        proj.set(name, value);
    }
    proj.finish()
}
