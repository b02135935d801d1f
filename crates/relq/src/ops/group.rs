use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

use crate::aggregate::Aggregate;
use crate::errors::Result;
use crate::expr::{RowFn, row_fn};
use crate::row::{Field, Row, RowSchema};
use crate::scalar::{GroupKey, ScalarValue};

#[derive(Clone)]
enum KeyExpr {
    /// Reference to an input column. The key column keeps the input column's
    /// qualifier.
    Column(String),
    /// Computed key with an output name.
    Computed { name: String, expr: RowFn },
}

impl KeyExpr {
    fn name(&self) -> &str {
        match self {
            KeyExpr::Column(name) => name,
            KeyExpr::Computed { name, .. } => name,
        }
    }

    fn evaluate(&self, row: &Row) -> Result<(Field, ScalarValue)> {
        match self {
            KeyExpr::Column(name) => match row.schema().find(name)? {
                Some(idx) => Ok((row.fields()[idx].clone(), row.values()[idx].clone())),
                None => {
                    // Correlated key, constant for the whole input.
                    let value = row.get(name)?.clone();
                    Ok((Field::new(name.clone()), value))
                }
            },
            KeyExpr::Computed { name, expr } => Ok((Field::new(name.clone()), expr(row)?)),
        }
    }
}

/// Expressions rows are grouped by. Empty means all rows form a single group.
#[derive(Clone, Default)]
pub struct GroupBy {
    keys: Vec<KeyExpr>,
}

impl GroupBy {
    pub fn new() -> Self {
        GroupBy::default()
    }

    /// Group by the given input columns.
    pub fn columns<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        GroupBy {
            keys: names.into_iter().map(|n| KeyExpr::Column(n.into())).collect(),
        }
    }

    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.keys.push(KeyExpr::Column(name.into()));
        self
    }

    /// Group by a computed value exposed in the key under `name`.
    pub fn expr<F, V>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Row) -> Result<V> + Send + Sync + 'static,
        V: Into<ScalarValue>,
    {
        self.keys.push(KeyExpr::Computed {
            name: name.into(),
            expr: row_fn(f),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Unqualified names of the key columns.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|k| {
            let name = k.name();
            match k {
                KeyExpr::Column(_) => name.rsplit_once('.').map(|(_, n)| n).unwrap_or(name),
                KeyExpr::Computed { .. } => name,
            }
        })
    }

    fn evaluate(&self, row: &Row) -> Result<(Vec<Field>, Vec<ScalarValue>)> {
        let mut fields = Vec::with_capacity(self.keys.len());
        let mut values = Vec::with_capacity(self.keys.len());
        for key in &self.keys {
            let (field, value) = key.evaluate(row)?;
            fields.push(field);
            values.push(value);
        }
        Ok((fields, values))
    }
}

impl std::fmt::Debug for GroupBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.keys.iter().map(|k| k.name()))
            .finish()
    }
}

/// Rows sharing a group key.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    key: Row,
    members: Vec<Row>,
}

impl Group {
    pub fn new(key: Row, members: Vec<Row>) -> Self {
        Group { key, members }
    }

    /// Row holding the key columns.
    pub fn key(&self) -> &Row {
        &self.key
    }

    /// Member rows in input order.
    pub fn members(&self) -> &[Row] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Get a key column by name.
    pub fn get(&self, name: &str) -> Result<&ScalarValue> {
        self.key.get(name)
    }

    /// Evaluate an aggregate over the members.
    pub fn aggregate(&self, agg: &Aggregate) -> Result<ScalarValue> {
        agg.evaluate(&self.members)
    }
}

/// Partition `rows` into groups.
///
/// Groups are produced in the order their keys are first seen. The whole
/// input is consumed on the first call to `next`.
pub fn group_reduce<I>(rows: I, group_by: GroupBy) -> GroupReduce<I>
where
    I: Iterator<Item = Result<Row>>,
{
    GroupReduce {
        input: Some(rows),
        group_by,
        output: Vec::new().into_iter(),
    }
}

pub struct GroupReduce<I> {
    input: Option<I>,
    group_by: GroupBy,
    output: std::vec::IntoIter<Group>,
}

impl<I> GroupReduce<I>
where
    I: Iterator<Item = Result<Row>>,
{
    fn reduce_groups(&self, input: I) -> Result<Vec<Group>> {
        let mut groups: IndexMap<GroupKey, Group> = IndexMap::new();

        for row in input {
            let row = row?;
            let (fields, values) = self.group_by.evaluate(&row)?;
            let key = GroupKey(values);
            match groups.get_mut(&key) {
                Some(group) => group.members.push(row),
                None => {
                    let schema = Arc::new(RowSchema::try_new(fields)?);
                    let mut key_row = Row::try_new(schema, key.0.clone())?;
                    if let Some(outer) = row.outer_arc() {
                        key_row = key_row.with_outer(outer.clone());
                    }
                    groups.insert(
                        key,
                        Group {
                            key: key_row,
                            members: vec![row],
                        },
                    );
                }
            }
        }

        trace!(groups = groups.len(), keys = ?self.group_by, "grouped rows");

        Ok(groups.into_values().collect())
    }
}

impl<I> Iterator for GroupReduce<I>
where
    I: Iterator<Item = Result<Row>>,
{
    type Item = Result<Group>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(input) = self.input.take() {
            match self.reduce_groups(input) {
                Ok(groups) => self.output = groups.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
        self.output.next().map(Ok)
    }
}
