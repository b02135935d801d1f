//! Query builder tying the operators together.
//!
//! A `Select` is persistent: every clause method returns a new builder and
//! leaves the receiver usable. Closures, tables and sub-builders are shared
//! through `Arc`, so deriving builders is cheap.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::config::QueryConfig;
use crate::errors::{Result, shape, usage};
use crate::expr::{GroupPredicate, Predicate, QueryComposite, SelectStar, group_predicate, predicate};
use crate::fetch;
use crate::ops::{
    Group, GroupBy, GroupStream, ProductLimit, RowStream, aggregate_map, from_product, group_reduce,
    having_filter, select_map, where_filter,
};
use crate::row::{Row, RowSchema};
use crate::scalar::ScalarValue;
use crate::table::{Table, TableRef};

/// Tables visible to a query by name.
pub(crate) type Scope = HashMap<String, Table>;

/// Clauses in the order they may be added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ClauseStage {
    Select,
    From,
    Where,
    GroupBy,
    Having,
    Compound,
}

impl fmt::Display for ClauseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClauseStage::Select => "SELECT",
            ClauseStage::From => "FROM",
            ClauseStage::Where => "WHERE",
            ClauseStage::GroupBy => "GROUP BY",
            ClauseStage::Having => "HAVING",
            ClauseStage::Compound => "UNION",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone)]
struct Source {
    table: TableRef,
    on: Option<Predicate>,
}

#[derive(Clone)]
pub struct Select {
    composite: Arc<QueryComposite>,
    sources: Vec<Source>,
    wheres: Vec<Predicate>,
    group_by: Option<GroupBy>,
    having: Option<GroupPredicate>,
    unions: Vec<Select>,
    outer: Option<Arc<Row>>,
    config: Arc<QueryConfig>,
    stage: ClauseStage,
    /// Set once the query has been run. Shared between clones of the same
    /// builder, fresh for derived builders.
    realized: Arc<AtomicBool>,
}

impl Select {
    /// Create a select projecting `composite`.
    ///
    /// Errors if two output expressions share a name.
    pub fn new(composite: impl Into<QueryComposite>) -> Result<Self> {
        let composite = composite.into();
        composite.validate()?;
        Ok(Self::from_composite(composite))
    }

    /// Create a `SELECT *`.
    pub fn star() -> Self {
        Self::from_composite(QueryComposite::star())
    }

    fn from_composite(composite: QueryComposite) -> Self {
        Select {
            composite: Arc::new(composite),
            sources: Vec::new(),
            wheres: Vec::new(),
            group_by: None,
            having: None,
            unions: Vec::new(),
            outer: None,
            config: Arc::new(QueryConfig::default()),
            stage: ClauseStage::Select,
            realized: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Derive a new builder for adding a clause at `stage`.
    fn derive(&self, stage: ClauseStage, repeatable: bool) -> Result<Self> {
        if self.is_realized() {
            return Err(usage!("cannot add a {stage} clause to a query that has already run"));
        }
        if self.stage > stage || (self.stage == stage && !repeatable) {
            return Err(usage!("{stage} clause cannot follow {} clause", self.stage));
        }
        let mut derived = self.clone();
        derived.stage = stage;
        derived.realized = Arc::new(AtomicBool::new(false));
        Ok(derived)
    }

    fn push_source(&mut self, table: TableRef, on: Option<Predicate>) -> Result<()> {
        let name = table.reference_name();
        if self.sources.iter().any(|s| s.table.reference_name() == name) {
            return Err(shape!("table '{name}' referenced more than once"));
        }
        self.sources.push(Source { table, on });
        Ok(())
    }

    /// Set the sources of the query. Multiple sources are cross joined.
    pub fn from_<T: Into<TableRef>>(&self, tables: impl IntoIterator<Item = T>) -> Result<Self> {
        let mut derived = self.derive(ClauseStage::From, false)?;
        for table in tables {
            derived.push_source(table.into(), None)?;
        }
        Ok(derived)
    }

    /// Join another source, keeping combined rows for which `on` is true.
    pub fn join<F>(&self, table: impl Into<TableRef>, on: F) -> Result<Self>
    where
        F: Fn(&Row) -> Result<bool> + Send + Sync + 'static,
    {
        self.add_join(table.into(), Some(predicate(on)))
    }

    /// Join another source, keeping every combination of rows.
    pub fn cross_join(&self, table: impl Into<TableRef>) -> Result<Self> {
        self.add_join(table.into(), None)
    }

    fn add_join(&self, table: TableRef, on: Option<Predicate>) -> Result<Self> {
        if self.stage == ClauseStage::Select {
            return Err(usage!("JOIN requires a FROM clause"));
        }
        let mut derived = self.derive(ClauseStage::From, true)?;
        derived.push_source(table, on)?;
        Ok(derived)
    }

    /// Filter rows. Repeated calls AND the predicates in the order added.
    pub fn where_<F>(&self, pred: F) -> Result<Self>
    where
        F: Fn(&Row) -> Result<bool> + Send + Sync + 'static,
    {
        let mut derived = self.derive(ClauseStage::Where, true)?;
        derived.wheres.push(predicate(pred));
        Ok(derived)
    }

    /// Group by input columns.
    pub fn group_by<S: Into<String>>(&self, columns: impl IntoIterator<Item = S>) -> Result<Self> {
        self.group_by_exprs(GroupBy::columns(columns))
    }

    /// Group by arbitrary key expressions.
    pub fn group_by_exprs(&self, group_by: GroupBy) -> Result<Self> {
        let mut derived = self.derive(ClauseStage::GroupBy, false)?;
        derived.group_by = Some(group_by);
        Ok(derived)
    }

    /// Filter groups.
    pub fn having<F>(&self, pred: F) -> Result<Self>
    where
        F: Fn(&Group) -> Result<bool> + Send + Sync + 'static,
    {
        if self.group_by.is_none() && !self.composite.has_aggregates() {
            return Err(usage!("HAVING requires GROUP BY or an aggregate expression"));
        }
        let mut derived = self.derive(ClauseStage::Having, false)?;
        derived.having = Some(group_predicate(pred));
        Ok(derived)
    }

    /// Append the rows of `other` (UNION ALL).
    ///
    /// Rows of `other` are relabeled with this query's column names.
    pub fn union(&self, other: &Select) -> Result<Self> {
        let mut derived = self.derive(ClauseStage::Compound, true)?;
        derived.unions.push(other.clone());
        Ok(derived)
    }

    /// Return a copy of this query using `config`.
    pub fn with_config(&self, config: impl Into<Arc<QueryConfig>>) -> Self {
        let mut derived = self.clone();
        derived.config = config.into();
        derived.realized = Arc::new(AtomicBool::new(false));
        derived
    }

    /// Return a copy of this query with `outer` as its correlation context.
    ///
    /// Names not found in the query's own rows resolve against `outer`.
    pub fn correlate(&self, outer: &Row) -> Self {
        let outer = Arc::new(outer.clone());
        let mut derived = self.clone();
        derived.realized = Arc::new(AtomicBool::new(false));
        derived.set_outer(outer);
        derived
    }

    fn set_outer(&mut self, outer: Arc<Row>) {
        for union in &mut self.unions {
            union.set_outer(outer.clone());
        }
        self.outer = Some(outer);
    }

    pub fn config(&self) -> &Arc<QueryConfig> {
        &self.config
    }

    pub fn composite(&self) -> &QueryComposite {
        &self.composite
    }

    /// Check if the query aggregates its rows into groups.
    pub fn is_grouped(&self) -> bool {
        self.group_by.is_some() || self.having.is_some() || self.composite.has_aggregates()
    }

    pub fn is_realized(&self) -> bool {
        self.realized.load(Ordering::Acquire)
    }

    pub(crate) fn mark_realized(&self) {
        self.realized.store(true, Ordering::Release);
    }

    /// Check if any source of this query (excluding union members) is the
    /// named table.
    pub(crate) fn references(&self, name: &str) -> bool {
        self.sources
            .iter()
            .any(|s| matches!(&s.table, TableRef::Named { name: n, .. } if n == name))
    }

    /// The query split into its union members, this query's own clauses
    /// first.
    pub(crate) fn members(&self) -> Vec<Select> {
        let mut head = self.clone();
        head.unions = Vec::new();
        let mut members = vec![head];
        for union in &self.unions {
            members.extend(union.members());
        }
        members
    }

    /// Output column names, computed without running the query.
    pub fn output_columns(&self) -> Result<Vec<String>> {
        self.output_columns_in(&Scope::new())
    }

    pub(crate) fn output_columns_in(&self, scope: &Scope) -> Result<Vec<String>> {
        if !self.composite.has_star() {
            return Ok(self.composite.output_columns(std::iter::empty()));
        }
        if self.is_grouped() {
            let names: Vec<_> = self
                .group_by
                .as_ref()
                .map(|g| g.names().collect())
                .unwrap_or_default();
            return Ok(self.composite.output_columns(names));
        }
        let sources = self.resolve_sources(scope)?;
        let mut columns: Vec<String> = Vec::new();
        for (table, _) in &sources {
            for column in table.columns() {
                if columns.iter().any(|c| c == column) {
                    return Err(shape!("ambiguous column '{column}' in star expansion"));
                }
                columns.push(column.to_string());
            }
        }
        Ok(self
            .composite
            .output_columns(columns.iter().map(|c| c.as_str())))
    }

    fn resolve_sources(&self, scope: &Scope) -> Result<Vec<(Table, Option<Predicate>)>> {
        self.sources
            .iter()
            .map(|source| {
                let table = match &source.table {
                    TableRef::Table(table) => table.clone(),
                    TableRef::Named { name, alias } => {
                        let table = scope
                            .get(name)
                            .ok_or_else(|| usage!("unknown table '{name}'"))?;
                        table.with_alias(alias.as_deref().unwrap_or(name))
                    }
                };
                Ok((table, source.on.clone()))
            })
            .collect()
    }

    /// Run the query.
    pub fn execute(&self) -> Result<RowStream> {
        self.mark_realized();
        self.plan(&Scope::new(), &self.config)
    }

    /// Build the row stream for this query against `scope`.
    pub(crate) fn plan(&self, scope: &Scope, config: &Arc<QueryConfig>) -> Result<RowStream> {
        let sources = self.resolve_sources(scope)?;

        debug!(
            sources = sources.len(),
            filters = self.wheres.len(),
            grouped = self.is_grouped(),
            unions = self.unions.len(),
            correlated = self.outer.is_some(),
            "realizing select"
        );

        let mut rows = ProductLimit::wrap(
            from_product(sources, self.outer.clone())?,
            config.max_product_rows,
        );
        for pred in &self.wheres {
            rows = Box::new(where_filter(rows, pred.clone()));
        }

        let composite = self.composite.clone();
        let mut stream: RowStream = if self.is_grouped() {
            let groups = group_reduce(rows, self.group_by.clone().unwrap_or_default());
            let groups: GroupStream = match &self.having {
                Some(pred) => Box::new(having_filter(groups, pred.clone())),
                None => Box::new(groups),
            };
            Box::new(groups.map(move |group| group.and_then(|group| aggregate_map(&group, &composite))))
        } else {
            Box::new(rows.map(move |row| row.and_then(|row| select_map(&row, &composite))))
        };

        if !self.unions.is_empty() {
            let columns = self.output_columns_in(scope)?;
            for union in &self.unions {
                let member = union.plan(scope, config)?;
                let member_columns = union.output_columns_in(scope)?;
                if member_columns.len() != columns.len() {
                    return Err(shape!(
                        "UNION members have different column counts ({} and {})",
                        columns.len(),
                        member_columns.len()
                    ));
                }
                stream = Box::new(stream.chain(relabel(member, &columns)?));
            }
        }

        Ok(stream)
    }

    pub fn fetch(&self) -> Result<Vec<Row>> {
        fetch::fetch(self.execute()?)
    }

    /// Collect the single output column of every row.
    ///
    /// Errors before running the query if it has more than one output column.
    pub fn fetch_all_values(&self) -> Result<Vec<ScalarValue>> {
        fetch::check_single_column(&self.output_columns()?)?;
        fetch::fetch_all_values(self.execute()?)
    }

    pub fn fetch_column_values(&self, column: &str) -> Result<Vec<ScalarValue>> {
        fetch::fetch_column_values(self.execute()?, column)
    }

    pub fn fetch_first_value(&self) -> Result<Option<ScalarValue>> {
        fetch::fetch_first_value(self.execute()?)
    }

    pub fn fetch_table(&self, name: impl Into<String>) -> Result<Table> {
        fetch::fetch_table(name, self)
    }

    /// Check if the query produces any rows. Stops after the first row.
    pub fn exists(&self) -> Result<bool> {
        crate::ops::exists(self.execute()?)
    }
}

/// Relabel every row of `rows` with unqualified `columns`, by position.
pub(crate) fn relabel(rows: RowStream, columns: &[String]) -> Result<RowStream> {
    let schema = Arc::new(RowSchema::unqualified(columns)?);
    Ok(Box::new(rows.map(move |row| {
        let row = row?;
        if row.len() != schema.len() {
            return Err(shape!(
                "row has {} columns, expected {}",
                row.len(),
                schema.len()
            ));
        }
        Row::try_new(schema.clone(), row.values_arc().clone())
    })))
}

impl From<SelectStar> for Select {
    fn from(_: SelectStar) -> Self {
        Select::star()
    }
}

impl<'a> IntoIterator for &'a Select {
    type Item = Result<Row>;
    type IntoIter = RowStream;

    /// Run the query. An error while planning is produced as the only item.
    fn into_iter(self) -> Self::IntoIter {
        match self.execute() {
            Ok(stream) => stream,
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }
}

impl fmt::Debug for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Select")
            .field("composite", &self.composite)
            .field(
                "sources",
                &self
                    .sources
                    .iter()
                    .map(|s| s.table.reference_name())
                    .collect::<Vec<_>>(),
            )
            .field("wheres", &self.wheres.len())
            .field("group_by", &self.group_by)
            .field("having", &self.having.is_some())
            .field("unions", &self.unions)
            .field("stage", &self.stage)
            .field("realized", &self.is_realized())
            .finish()
    }
}
