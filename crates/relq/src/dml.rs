//! Data modification statements.
//!
//! Tables are immutable, so every statement produces a new table and leaves
//! its input untouched.
use std::sync::Arc;

use tracing::debug;

use crate::errors::{Result, shape};
use crate::expr::{Predicate, RowFn, predicate, row_fn};
use crate::row::Row;
use crate::scalar::ScalarValue;
use crate::select::{Select, relabel};
use crate::table::{Table, align_record};

/// Append rows to a table.
#[derive(Debug, Clone)]
pub struct Insert {
    table: Table,
    rows: Vec<Arc<[ScalarValue]>>,
}

impl Insert {
    pub fn into(table: &Table) -> Self {
        Insert {
            table: table.clone(),
            rows: Vec::new(),
        }
    }

    /// Add records of (column, value) pairs. Every record must have exactly
    /// the table's columns, in any order.
    pub fn values<R, K, V>(&self, records: impl IntoIterator<Item = R>) -> Result<Self>
    where
        R: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ScalarValue>,
    {
        let columns: Vec<String> = self.table.columns().map(|c| c.to_string()).collect();
        let mut insert = self.clone();
        for record in records {
            let (keys, values): (Vec<String>, Vec<ScalarValue>) = record
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .unzip();
            insert.rows.push(align_record(&columns, keys, values)?);
        }
        Ok(insert)
    }

    /// Add the rows produced by a query, matched to the table's columns by
    /// position.
    pub fn select(&self, query: &Select) -> Result<Self> {
        let columns: Vec<String> = self.table.columns().map(|c| c.to_string()).collect();
        let mut insert = self.clone();
        for row in relabel(query.execute()?, &columns)? {
            insert.rows.push(row?.values_arc().clone());
        }
        Ok(insert)
    }

    pub fn execute(&self) -> Result<Table> {
        let mut rows = self.table.raw_rows().to_vec();
        rows.extend(self.rows.iter().cloned());
        debug!(table = %self.table.name(), inserted = self.rows.len(), "insert");
        Ok(self.table.with_rows(rows))
    }
}

/// Replace column values of matching rows.
#[derive(Clone)]
pub struct Update {
    table: Table,
    sets: Vec<(usize, RowFn)>,
    filter: Option<Predicate>,
}

impl Update {
    pub fn new(table: &Table) -> Self {
        Update {
            table: table.clone(),
            sets: Vec::new(),
            filter: None,
        }
    }

    /// Set `column` to the result of `f`. All expressions see the row as it
    /// was before the update.
    pub fn set<F, V>(&self, column: &str, f: F) -> Result<Self>
    where
        F: Fn(&Row) -> Result<V> + Send + Sync + 'static,
        V: Into<ScalarValue>,
    {
        let idx = self
            .table
            .columns()
            .position(|c| c == column)
            .ok_or_else(|| shape!("table '{}' has no column '{column}'", self.table.name()))?;
        let mut update = self.clone();
        update.sets.push((idx, row_fn(f)));
        Ok(update)
    }

    /// Only update rows for which `pred` is true. Without a filter every row
    /// is updated.
    pub fn where_<F>(&self, pred: F) -> Self
    where
        F: Fn(&Row) -> Result<bool> + Send + Sync + 'static,
    {
        let mut update = self.clone();
        update.filter = Some(predicate(pred));
        update
    }

    pub fn execute(&self) -> Result<Table> {
        let mut updated = 0;
        let rows = self
            .table
            .rows()
            .map(|row| {
                if !matches_filter(self.filter.as_ref(), &row)? || self.sets.is_empty() {
                    return Ok(row.values_arc().clone());
                }
                let mut values = row.values().to_vec();
                for (idx, f) in &self.sets {
                    values[*idx] = f(&row)?;
                }
                updated += 1;
                Ok(values.into())
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(table = %self.table.name(), updated, "update");
        Ok(self.table.with_rows(rows))
    }
}

impl std::fmt::Debug for Update {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Update")
            .field("table", &self.table.name())
            .field("sets", &self.sets.len())
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

/// Remove matching rows.
#[derive(Clone)]
pub struct Delete {
    table: Table,
    filter: Option<Predicate>,
}

impl Delete {
    pub fn from_(table: &Table) -> Self {
        Delete {
            table: table.clone(),
            filter: None,
        }
    }

    /// Only delete rows for which `pred` is true. Without a filter every row
    /// is deleted.
    pub fn where_<F>(&self, pred: F) -> Self
    where
        F: Fn(&Row) -> Result<bool> + Send + Sync + 'static,
    {
        let mut delete = self.clone();
        delete.filter = Some(predicate(pred));
        delete
    }

    pub fn execute(&self) -> Result<Table> {
        let mut kept = Vec::with_capacity(self.table.len());
        for row in self.table.rows() {
            if !matches_filter(self.filter.as_ref(), &row)? {
                kept.push(row.values_arc().clone());
            }
        }
        debug!(table = %self.table.name(), deleted = self.table.len() - kept.len(), "delete");
        Ok(self.table.with_rows(kept))
    }
}

impl std::fmt::Debug for Delete {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delete")
            .field("table", &self.table.name())
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

fn matches_filter(filter: Option<&Predicate>, row: &Row) -> Result<bool> {
    match filter {
        Some(pred) => pred(row),
        None => Ok(true),
    }
}
