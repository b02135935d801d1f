use crate::errors::Result;
use crate::row::Row;

/// Check if `rows` produces at least one row. Pulls at most one item.
pub fn exists(rows: impl IntoIterator<Item = Result<Row>>) -> Result<bool> {
    match rows.into_iter().next() {
        Some(Ok(_)) => Ok(true),
        Some(Err(e)) => Err(e),
        None => Ok(false),
    }
}
