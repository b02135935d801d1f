use std::fmt;
use std::ops::Index;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::errors::{RelqError, Result, internal, shape};
use crate::scalar::ScalarValue;

/// A named column in a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    /// Reference name (table alias) of the source the column came from.
    /// Projected columns have no qualifier.
    pub qualifier: Option<String>,
    pub name: String,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Field {
            qualifier: None,
            name: name.into(),
        }
    }

    pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Field {
            qualifier: Some(qualifier.into()),
            name: name.into(),
        }
    }

    /// Check if this field is addressed by `name`, which may be of the form
    /// "qualifier.name".
    fn matches(&self, name: &str) -> bool {
        if self.name == name {
            return true;
        }
        match (&self.qualifier, name.split_once('.')) {
            (Some(qualifier), Some((q, n))) => qualifier == q && self.name == n,
            _ => false,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(qualifier) => write!(f, "{}.{}", qualifier, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Ordered set of fields shared by every row produced from the same source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowSchema {
    fields: Vec<Field>,
}

impl RowSchema {
    /// Create a new schema, erroring if two fields share the same qualifier
    /// and name.
    pub fn try_new(fields: Vec<Field>) -> Result<Self> {
        for (idx, field) in fields.iter().enumerate() {
            if fields[..idx].contains(field) {
                return Err(shape!("duplicate column '{field}'"));
            }
        }
        Ok(RowSchema { fields })
    }

    pub fn empty() -> Self {
        RowSchema { fields: Vec::new() }
    }

    /// Schema with every column qualified by `qualifier`.
    pub fn qualified<S: AsRef<str>>(qualifier: &str, names: &[S]) -> Result<Self> {
        Self::try_new(
            names
                .iter()
                .map(|name| Field::qualified(qualifier, name.as_ref()))
                .collect(),
        )
    }

    /// Schema with unqualified columns.
    pub fn unqualified<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        Self::try_new(names.iter().map(|name| Field::new(name.as_ref())).collect())
    }

    /// Concatenate schemas left to right.
    pub fn concat<'a>(schemas: impl IntoIterator<Item = &'a RowSchema>) -> Result<Self> {
        let fields = schemas
            .into_iter()
            .flat_map(|s| s.fields.iter().cloned())
            .collect();
        Self::try_new(fields)
    }

    /// Same fields with every qualifier replaced by `qualifier`.
    ///
    /// Only valid on schemas whose unqualified names are already unique.
    pub(crate) fn requalify(&self, qualifier: &str) -> Self {
        RowSchema {
            fields: self
                .fields
                .iter()
                .map(|f| Field::qualified(qualifier, f.name.clone()))
                .collect(),
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Find the index of the column addressed by `name`.
    ///
    /// Returns `Ok(None)` if nothing matches, and errors if more than one
    /// column matches.
    pub fn find(&self, name: &str) -> Result<Option<usize>> {
        let mut found = None;
        for (idx, field) in self.fields.iter().enumerate() {
            if field.matches(name) {
                if found.is_some() {
                    return Err(shape!("ambiguous column '{name}'"));
                }
                found = Some(idx);
            }
        }
        Ok(found)
    }

    /// Names used when presenting the row as a map. Unqualified names are used
    /// unless two fields share one, in which case the qualified name is used.
    fn display_names(&self) -> Vec<String> {
        self.fields
            .iter()
            .map(|field| {
                let shared = self
                    .fields
                    .iter()
                    .filter(|other| other.name == field.name)
                    .count()
                    > 1;
                if shared {
                    field.to_string()
                } else {
                    field.name.clone()
                }
            })
            .collect()
    }
}

/// An immutable row of named values.
///
/// A row may carry an outer row used to resolve names that aren't found
/// locally (correlated subqueries).
#[derive(Clone)]
pub struct Row {
    schema: Arc<RowSchema>,
    values: Arc<[ScalarValue]>,
    outer: Option<Arc<Row>>,
}

impl Row {
    pub fn try_new(schema: Arc<RowSchema>, values: impl Into<Arc<[ScalarValue]>>) -> Result<Self> {
        let values = values.into();
        if schema.len() != values.len() {
            return Err(internal!(
                "row has {} values for {} columns",
                values.len(),
                schema.len()
            ));
        }
        Ok(Row {
            schema,
            values,
            outer: None,
        })
    }

    /// Create a row whose values are already known to line up with `schema`.
    pub(crate) fn new_unchecked(schema: Arc<RowSchema>, values: Arc<[ScalarValue]>) -> Self {
        debug_assert_eq!(schema.len(), values.len());
        Row {
            schema,
            values,
            outer: None,
        }
    }

    /// Create a row of unqualified columns from (name, value) pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: Into<String>,
        V: Into<ScalarValue>,
    {
        let (fields, values): (Vec<_>, Vec<_>) = pairs
            .into_iter()
            .map(|(k, v)| (Field::new(k), v.into()))
            .unzip();
        Self::try_new(Arc::new(RowSchema::try_new(fields)?), values)
    }

    /// A row with no columns.
    pub fn empty() -> Self {
        Row {
            schema: Arc::new(RowSchema::empty()),
            values: Arc::from(Vec::new()),
            outer: None,
        }
    }

    /// Return this row with `outer` attached as its correlation context.
    pub fn with_outer(mut self, outer: Arc<Row>) -> Self {
        self.outer = Some(outer);
        self
    }

    pub fn outer(&self) -> Option<&Row> {
        self.outer.as_deref()
    }

    pub(crate) fn outer_arc(&self) -> Option<&Arc<Row>> {
        self.outer.as_ref()
    }

    pub fn schema(&self) -> &Arc<RowSchema> {
        &self.schema
    }

    pub fn fields(&self) -> &[Field] {
        self.schema.fields()
    }

    /// Unqualified column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.schema.fields().iter().map(|f| f.name.as_str())
    }

    pub fn values(&self) -> &[ScalarValue] {
        &self.values
    }

    pub(crate) fn values_arc(&self) -> &Arc<[ScalarValue]> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by ordinal.
    pub fn value(&self, idx: usize) -> Option<&ScalarValue> {
        self.values.get(idx)
    }

    /// Get a value by name, falling back to the outer row if the name isn't
    /// found locally.
    pub fn get(&self, name: &str) -> Result<&ScalarValue> {
        match self.try_get(name)? {
            Some(value) => Ok(value),
            None => Err(RelqError::MissingColumn(name.to_string())),
        }
    }

    /// Like `get`, but returns `None` for a missing column.
    pub fn try_get(&self, name: &str) -> Result<Option<&ScalarValue>> {
        match self.schema.find(name)? {
            Some(idx) => Ok(Some(&self.values[idx])),
            None => match &self.outer {
                Some(outer) => outer.try_get(name),
                None => Ok(None),
            },
        }
    }

    /// Check if a name resolves locally or in the outer row.
    pub fn contains(&self, name: &str) -> bool {
        matches!(self.try_get(name), Ok(Some(_)))
    }

    /// Ordered name to value mapping of the local columns.
    pub fn to_map(&self) -> IndexMap<String, ScalarValue> {
        self.schema
            .display_names()
            .into_iter()
            .zip(self.values.iter().cloned())
            .collect()
    }

    /// Concatenate rows whose schema has already been computed.
    pub(crate) fn concat_with_schema(schema: &Arc<RowSchema>, rows: &[&Row]) -> Result<Self> {
        let values: Vec<_> = rows
            .iter()
            .flat_map(|row| row.values.iter().cloned())
            .collect();
        Row::try_new(schema.clone(), values)
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.schema.fields() == other.schema.fields() && self.values == other.values
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (field, value) in self.schema.fields().iter().zip(self.values.iter()) {
            map.entry(&format_args!("{field}"), value);
        }
        map.finish()
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (idx, (field, value)) in self
            .schema
            .fields()
            .iter()
            .zip(self.values.iter())
            .enumerate()
        {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", field.name, value)?;
        }
        write!(f, ")")
    }
}

impl Index<usize> for Row {
    type Output = ScalarValue;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.values[idx]
    }
}

impl Index<&str> for Row {
    type Output = ScalarValue;

    /// Panics if the name is missing or ambiguous. Use `Row::get` for a
    /// fallible lookup.
    fn index(&self, name: &str) -> &Self::Output {
        match self.get(name) {
            Ok(value) => value,
            Err(e) => panic!("{e}"),
        }
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let names = self.schema.display_names();
        let mut map = serializer.serialize_map(Some(names.len()))?;
        for (name, value) in names.iter().zip(self.values.iter()) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
