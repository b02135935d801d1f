//! Lazy relational operators over row streams.
//!
//! Every operator takes an iterator of `Result<Row>` and returns another one.
//! Errors are stream items and are passed through unmodified.
mod exists;
mod filter;
mod group;
mod product;
mod project;

pub use exists::exists;
pub use filter::{having_filter, where_filter};
pub use group::{Group, GroupBy, GroupReduce, group_reduce};
pub use product::from_product;
pub use project::{aggregate_map, select_map};

pub(crate) use product::ProductLimit;

use crate::errors::Result;
use crate::row::Row;

/// Type erased stream of rows.
pub type RowStream = Box<dyn Iterator<Item = Result<Row>> + Send>;

/// Type erased stream of groups.
pub type GroupStream = Box<dyn Iterator<Item = Result<Group>> + Send>;
