use crate::errors::Result;
use crate::expr::{GroupPredicate, Predicate};
use crate::row::Row;

use super::Group;

/// Keep the rows for which `pred` returns true.
pub fn where_filter<I>(rows: I, pred: Predicate) -> impl Iterator<Item = Result<Row>> + Send
where
    I: Iterator<Item = Result<Row>> + Send,
{
    rows.filter_map(move |row| match row {
        Ok(row) => match pred(&row) {
            Ok(true) => Some(Ok(row)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        },
        Err(e) => Some(Err(e)),
    })
}

/// Keep the groups for which `pred` returns true.
pub fn having_filter<I>(groups: I, pred: GroupPredicate) -> impl Iterator<Item = Result<Group>> + Send
where
    I: Iterator<Item = Result<Group>> + Send,
{
    groups.filter_map(move |group| match group {
        Ok(group) => match pred(&group) {
            Ok(true) => Some(Ok(group)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        },
        Err(e) => Some(Err(e)),
    })
}
