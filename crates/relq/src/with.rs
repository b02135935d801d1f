//! Named table expressions (`WITH`), including recursive ones.
use std::sync::Arc;

use tracing::debug;

use crate::config::QueryConfig;
use crate::errors::{Result, shape, usage};
use crate::fetch;
use crate::ops::RowStream;
use crate::row::Row;
use crate::scalar::ScalarValue;
use crate::select::{Scope, Select, relabel};
use crate::table::Table;

/// Builder for a set of named table expressions.
#[derive(Debug, Clone, Default)]
pub struct With {
    tables: Vec<(String, Select)>,
    config: Option<Arc<QueryConfig>>,
}

impl With {
    pub fn new() -> Self {
        With::default()
    }

    /// Add a named table expression. Later expressions and the final query
    /// may reference it with `TableRef::named`.
    ///
    /// A query whose union members reference `name` is recursive.
    pub fn table(&self, name: impl Into<String>, query: Select) -> Result<Self> {
        let name = name.into();
        if self.tables.iter().any(|(n, _)| n == &name) {
            return Err(shape!("table expression '{name}' defined more than once"));
        }
        let mut with = self.clone();
        with.tables.push((name, query));
        Ok(with)
    }

    pub fn with_config(&self, config: impl Into<Arc<QueryConfig>>) -> Self {
        let mut with = self.clone();
        with.config = Some(config.into());
        with
    }

    /// Attach the final query.
    pub fn query(&self, query: Select) -> WithQuery {
        WithQuery {
            tables: self.tables.clone(),
            config: self
                .config
                .clone()
                .unwrap_or_else(|| query.config().clone()),
            query,
        }
    }
}

/// A query with its named table expressions.
#[derive(Debug, Clone)]
pub struct WithQuery {
    tables: Vec<(String, Select)>,
    query: Select,
    config: Arc<QueryConfig>,
}

impl WithQuery {
    /// Materialize every table expression in order, then run the final query
    /// against them.
    pub fn execute(&self) -> Result<RowStream> {
        self.query.mark_realized();
        let scope = self.materialize()?;
        self.query.plan(&scope, &self.config)
    }

    /// Materialize the table expressions into tables, in definition order.
    pub fn tables(&self) -> Result<Vec<Table>> {
        let scope = self.materialize()?;
        Ok(self
            .tables
            .iter()
            .filter_map(|(name, _)| scope.get(name).cloned())
            .collect())
    }

    pub fn output_columns(&self) -> Result<Vec<String>> {
        let scope = self.materialize()?;
        self.query.output_columns_in(&scope)
    }

    fn materialize(&self) -> Result<Scope> {
        let mut scope = Scope::new();
        for (name, query) in &self.tables {
            let table = materialize_one(name, query, &scope, &self.config)?;
            debug!(name = %name, rows = table.len(), "materialized table expression");
            scope.insert(name.clone(), table);
        }
        Ok(scope)
    }

    pub fn fetch(&self) -> Result<Vec<Row>> {
        fetch::fetch(self.execute()?)
    }

    /// Errors after materializing the table expressions, but before running
    /// the final query, if it has more than one output column.
    pub fn fetch_all_values(&self) -> Result<Vec<ScalarValue>> {
        let scope = self.materialize()?;
        fetch::check_single_column(&self.query.output_columns_in(&scope)?)?;
        self.query.mark_realized();
        fetch::fetch_all_values(self.query.plan(&scope, &self.config)?)
    }

    pub fn fetch_column_values(&self, column: &str) -> Result<Vec<ScalarValue>> {
        fetch::fetch_column_values(self.execute()?, column)
    }

    pub fn fetch_first_value(&self) -> Result<Option<ScalarValue>> {
        fetch::fetch_first_value(self.execute()?)
    }

    pub fn fetch_table(&self, name: impl Into<String>) -> Result<Table> {
        let scope = self.materialize()?;
        let columns = self.query.output_columns_in(&scope)?;
        self.query.mark_realized();
        Table::collect(name, columns, self.query.plan(&scope, &self.config)?)
    }

    pub fn exists(&self) -> Result<bool> {
        crate::ops::exists(self.execute()?)
    }
}

impl<'a> IntoIterator for &'a WithQuery {
    type Item = Result<Row>;
    type IntoIter = RowStream;

    fn into_iter(self) -> Self::IntoIter {
        match self.execute() {
            Ok(stream) => stream,
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }
}

fn materialize_one(name: &str, query: &Select, scope: &Scope, config: &Arc<QueryConfig>) -> Result<Table> {
    let (recursive, seed): (Vec<_>, Vec<_>) = query
        .members()
        .into_iter()
        .partition(|member| member.references(name));

    if recursive.is_empty() {
        let columns = query.output_columns_in(scope)?;
        return Table::collect(name, columns, query.plan(scope, config)?);
    }

    let columns = match seed.first() {
        Some(first) => first.output_columns_in(scope)?,
        None => {
            return Err(usage!(
                "recursive table expression '{name}' has no non-recursive member"
            ));
        }
    };

    let mut working = collect_members(name, &columns, &seed, scope, config)?;
    let mut rows = working.raw_rows().to_vec();
    let mut step_scope = scope.clone();
    let mut depth = 0;

    while !working.is_empty() {
        depth += 1;
        if depth > config.max_recursion_depth {
            return Err(usage!(
                "recursive table expression '{name}' exceeded max_recursion_depth ({})",
                config.max_recursion_depth
            ));
        }

        step_scope.insert(name.to_string(), working);
        let next = collect_members(name, &columns, &recursive, &step_scope, config)?;
        debug!(name = %name, step = depth, next_rows = next.len(), "recursive step");

        rows.extend(next.raw_rows().iter().cloned());
        working = next;
    }

    Table::from_parts(name.to_string(), columns, rows)
}

/// Run each member and collect all rows into one table with `columns`.
fn collect_members(
    name: &str,
    columns: &[String],
    members: &[Select],
    scope: &Scope,
    config: &Arc<QueryConfig>,
) -> Result<Table> {
    let mut rows = Vec::new();
    for member in members {
        for row in relabel(member.plan(scope, config)?, columns)? {
            rows.push(row?.values_arc().clone());
        }
    }
    Table::from_parts(name.to_string(), columns.to_vec(), rows)
}
