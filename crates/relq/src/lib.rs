//! Relq is an in-memory relational query algebra over rows of named values.
//!
//! # Data representation
//!
//! The core types are `Table`, an immutable named collection of rows sharing
//! one column set, and `Row`, an immutable ordered mapping of names to
//! `ScalarValue`s. Columns of rows produced from a table are qualified by the
//! table's alias, so joined rows can be addressed by either "name" (if
//! unambiguous) or "alias.name".
//!
//! # Expressions
//!
//! Expressions are plain closures. Row expressions act on a single row,
//! aggregate expressions act on every member row of a group. A
//! `QueryComposite` is the ordered set of named output expressions of a query,
//! optionally starting with every input column (`STAR`).
//!
//! # Execution
//!
//! Operators in `ops` are lazy iterator adapters over `Result<Row>` streams:
//! product, filter, group, project. `Select` composes them the way a SQL
//! SELECT does (FROM, WHERE, GROUP BY, HAVING, projection, UNION ALL), and
//! `With` adds named and recursive table expressions on top. Nothing runs
//! until a query is realized by iterating it or by one of the fetch methods.
pub mod aggregate;
pub mod config;
pub mod dml;
pub mod errors;
pub mod expr;
pub mod fetch;
pub mod ops;
pub mod row;
pub mod scalar;
pub mod select;
pub mod table;
pub mod with;

pub use aggregate::Aggregate;
pub use config::QueryConfig;
pub use dml::{Delete, Insert, Update};
pub use errors::{RelqError, Result};
pub use expr::{QueryComposite, STAR, SelectStar, col, lit};
pub use fetch::{fetch, fetch_all_values, fetch_column_values, fetch_first_value, fetch_table};
pub use ops::{Group, GroupBy, RowStream, exists};
pub use row::{Field, Row};
pub use scalar::ScalarValue;
pub use select::Select;
pub use table::{Table, TableRef};
pub use with::{With, WithQuery};
