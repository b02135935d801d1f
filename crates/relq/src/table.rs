use std::sync::Arc;

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeSeq, Serializer};

use crate::errors::{Result, shape};
use crate::fetch::fetch_table;
use crate::ops::RowStream;
use crate::row::{Row, RowSchema};
use crate::scalar::ScalarValue;
use crate::select::Select;

/// An immutable, named collection of rows sharing one column set.
///
/// Rows are reference counted, so aliasing and cloning a table never copies
/// row data.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    alias: String,
    /// Columns qualified by `alias`.
    schema: Arc<RowSchema>,
    rows: Arc<[Arc<[ScalarValue]>]>,
}

impl Table {
    /// Create a table from records of (column, value) pairs.
    ///
    /// The first record determines the column order. Later records must have
    /// the same set of columns, and are reordered if their keys are in a
    /// different order.
    pub fn try_new<R, K, V>(name: impl Into<String>, records: impl IntoIterator<Item = R>) -> Result<Self>
    where
        R: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ScalarValue>,
    {
        let mut columns: Option<Vec<String>> = None;
        let mut rows = Vec::new();

        for record in records {
            let (keys, values): (Vec<String>, Vec<ScalarValue>) = record
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .unzip();

            match &columns {
                Some(columns) => rows.push(align_record(columns, keys, values)?),
                None => {
                    columns = Some(keys);
                    rows.push(values.into());
                }
            }
        }

        Self::from_parts(name.into(), columns.unwrap_or_default(), rows)
    }

    /// Create a table from positional rows.
    pub fn try_from_values<S, R>(
        name: impl Into<String>,
        columns: impl IntoIterator<Item = S>,
        rows: impl IntoIterator<Item = R>,
    ) -> Result<Self>
    where
        S: Into<String>,
        R: IntoIterator<Item = ScalarValue>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let rows = rows
            .into_iter()
            .map(|row| {
                let values: Vec<_> = row.into_iter().collect();
                if values.len() != columns.len() {
                    return Err(shape!(
                        "row has {} values, expected {} ({})",
                        values.len(),
                        columns.len(),
                        columns.join(", ")
                    ));
                }
                Ok(values.into())
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_parts(name.into(), columns, rows)
    }

    /// Create a table with columns but no rows.
    pub fn empty<S: Into<String>>(name: impl Into<String>, columns: impl IntoIterator<Item = S>) -> Result<Self> {
        Self::from_parts(
            name.into(),
            columns.into_iter().map(Into::into).collect(),
            Vec::new(),
        )
    }

    /// Create a table from rows produced by a query.
    ///
    /// Columns are taken from the first row by unqualified name. All rows
    /// must have the same column names in the same order.
    pub fn from_rows(name: impl Into<String>, rows: impl IntoIterator<Item = Row>) -> Result<Self> {
        let mut rows = rows.into_iter().peekable();
        let columns = match rows.peek() {
            Some(row) => row.columns().map(|c| c.to_string()).collect(),
            None => Vec::new(),
        };
        Self::collect(name, columns, rows.map(Ok))
    }

    /// Realize a query into a table named `name`.
    pub fn from_query(name: impl Into<String>, query: &Select) -> Result<Self> {
        fetch_table(name, query)
    }

    /// Collect a row stream into a table with the given columns.
    pub(crate) fn collect(
        name: impl Into<String>,
        columns: Vec<String>,
        rows: impl IntoIterator<Item = Result<Row>>,
    ) -> Result<Self> {
        let rows = rows
            .into_iter()
            .map(|row| {
                let row = row?;
                if row.len() != columns.len() || !row.columns().eq(columns.iter().map(|c| c.as_str())) {
                    return Err(shape!(
                        "row columns ({}) don't match table columns ({})",
                        row.columns().collect::<Vec<_>>().join(", "),
                        columns.join(", ")
                    ));
                }
                Ok(row.values_arc().clone())
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_parts(name.into(), columns, rows)
    }

    pub(crate) fn from_parts(name: String, columns: Vec<String>, rows: Vec<Arc<[ScalarValue]>>) -> Result<Self> {
        let schema = RowSchema::qualified(&name, &columns)?;
        Ok(Table {
            alias: name.clone(),
            name,
            schema: Arc::new(schema),
            rows: rows.into(),
        })
    }

    /// Same table with new row data and the same columns and alias.
    pub(crate) fn with_rows(&self, rows: Vec<Arc<[ScalarValue]>>) -> Self {
        Table {
            name: self.name.clone(),
            alias: self.alias.clone(),
            schema: self.schema.clone(),
            rows: rows.into(),
        }
    }

    /// Return the same table referenced under a different name.
    pub fn with_alias(&self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        Table {
            name: self.name.clone(),
            schema: Arc::new(self.schema.requalify(&alias)),
            alias,
            rows: self.rows.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name rows of this table are qualified with. Defaults to the table name.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn schema(&self) -> &Arc<RowSchema> {
        &self.schema
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.schema.fields().iter().map(|f| f.name.as_str())
    }

    pub fn num_columns(&self) -> usize {
        self.schema.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub(crate) fn raw_rows(&self) -> &[Arc<[ScalarValue]>] {
        &self.rows
    }

    /// Iterate the rows of the table.
    pub fn rows(&self) -> TableRows {
        TableRows {
            schema: self.schema.clone(),
            rows: self.rows.clone(),
            idx: 0,
        }
    }

    /// Rows as a fallible stream, the input shape of the query operators.
    pub fn stream(&self) -> RowStream {
        Box::new(self.rows().map(Ok))
    }

    /// Rows as ordered (column, value) maps.
    pub fn to_records(&self) -> Vec<IndexMap<String, ScalarValue>> {
        self.rows().map(|row| row.to_map()).collect()
    }
}

/// Align a record's values to `columns`.
pub(crate) fn align_record(columns: &[String], keys: Vec<String>, values: Vec<ScalarValue>) -> Result<Arc<[ScalarValue]>> {
    if keys.as_slice() == columns {
        return Ok(values.into());
    }
    if keys.len() != columns.len() {
        return Err(shape!(
            "record keys ({}) don't match columns ({})",
            keys.join(", "),
            columns.join(", ")
        ));
    }

    let mut values: Vec<Option<ScalarValue>> = values.into_iter().map(Some).collect();
    columns
        .iter()
        .map(|column| {
            keys.iter()
                .position(|k| k == column)
                .and_then(|idx| values[idx].take())
                .ok_or_else(|| {
                    shape!(
                        "record keys ({}) don't match columns ({})",
                        keys.join(", "),
                        columns.join(", ")
                    )
                })
        })
        .collect::<Result<Vec<_>>>()
        .map(Into::into)
}

/// Iterator over the rows of a table.
#[derive(Debug, Clone)]
pub struct TableRows {
    schema: Arc<RowSchema>,
    rows: Arc<[Arc<[ScalarValue]>]>,
    idx: usize,
}

impl Iterator for TableRows {
    type Item = Row;

    fn next(&mut self) -> Option<Self::Item> {
        let values = self.rows.get(self.idx)?.clone();
        self.idx += 1;
        // Row values are checked against the schema when the table is built.
        Some(Row::new_unchecked(self.schema.clone(), values))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.rows.len() - self.idx;
        (remaining, Some(remaining))
    }
}

impl<'a> IntoIterator for &'a Table {
    type Item = Row;
    type IntoIter = TableRows;

    fn into_iter(self) -> Self::IntoIter {
        self.rows()
    }
}

impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for row in self.rows() {
            seq.serialize_element(&row)?;
        }
        seq.end()
    }
}

/// A source in a FROM clause: either a table value, or the name of a table
/// provided by an enclosing `With`.
#[derive(Debug, Clone)]
pub enum TableRef {
    Table(Table),
    Named { name: String, alias: Option<String> },
}

impl TableRef {
    /// Reference a table by name, resolved when the query runs.
    pub fn named(name: impl Into<String>) -> Self {
        TableRef::Named {
            name: name.into(),
            alias: None,
        }
    }

    pub fn with_alias(self, alias: impl Into<String>) -> Self {
        match self {
            TableRef::Table(table) => TableRef::Table(table.with_alias(alias)),
            TableRef::Named { name, .. } => TableRef::Named {
                name,
                alias: Some(alias.into()),
            },
        }
    }

    /// Name rows from this source are qualified with.
    pub fn reference_name(&self) -> &str {
        match self {
            TableRef::Table(table) => table.alias(),
            TableRef::Named { name, alias } => alias.as_deref().unwrap_or(name),
        }
    }
}

impl From<Table> for TableRef {
    fn from(table: Table) -> Self {
        TableRef::Table(table)
    }
}

impl From<&Table> for TableRef {
    fn from(table: &Table) -> Self {
        TableRef::Table(table.clone())
    }
}
