//! Consumers that realize row streams into values.
use crate::errors::{Result, usage};
use crate::row::Row;
use crate::scalar::ScalarValue;
use crate::select::Select;
use crate::table::Table;

/// Collect every row.
pub fn fetch(rows: impl IntoIterator<Item = Result<Row>>) -> Result<Vec<Row>> {
    rows.into_iter().collect()
}

/// Collect the single value of every row.
///
/// Errors if a row has more than one column.
pub fn fetch_all_values(rows: impl IntoIterator<Item = Result<Row>>) -> Result<Vec<ScalarValue>> {
    rows.into_iter()
        .map(|row| {
            let row = row?;
            single_value(&row).cloned()
        })
        .collect()
}

/// Collect the value of `column` from every row.
pub fn fetch_column_values(rows: impl IntoIterator<Item = Result<Row>>, column: &str) -> Result<Vec<ScalarValue>> {
    rows.into_iter()
        .map(|row| Ok(row?.get(column)?.clone()))
        .collect()
}

/// Get the first value of the first row, or `None` if there are no rows.
///
/// Pulls at most one row.
pub fn fetch_first_value(rows: impl IntoIterator<Item = Result<Row>>) -> Result<Option<ScalarValue>> {
    match rows.into_iter().next() {
        Some(row) => {
            let row = row?;
            match row.value(0) {
                Some(value) => Ok(Some(value.clone())),
                None => Err(usage!("first value requested from a row with no columns")),
            }
        }
        None => Ok(None),
    }
}

/// Realize a query into a table.
pub fn fetch_table(name: impl Into<String>, query: &Select) -> Result<Table> {
    let columns = query.output_columns()?;
    Table::collect(name, columns, query.execute()?)
}

/// Check that a query has exactly one output column before running it.
pub(crate) fn check_single_column(columns: &[String]) -> Result<()> {
    if columns.len() != 1 {
        return Err(usage!(
            "expected a query with a single output column, got {} ({})",
            columns.len(),
            columns.join(", ")
        ));
    }
    Ok(())
}

fn single_value(row: &Row) -> Result<&ScalarValue> {
    match row.values() {
        [value] => Ok(value),
        values => Err(usage!(
            "expected rows with a single column, got {} columns ({})",
            values.len(),
            row.columns().collect::<Vec<_>>().join(", ")
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RelqError;
    use crate::ops::testutil::table;

    #[test]
    fn all_values_single_column() {
        let t = table("t", &["x"], vec![vec![1], vec![2]]);
        assert_eq!(
            vec![ScalarValue::Int64(1), ScalarValue::Int64(2)],
            fetch_all_values(t.stream()).unwrap()
        );
    }

    #[test]
    fn all_values_multi_column() {
        let t = table("t", &["x", "y"], vec![vec![1, 2]]);
        let err = fetch_all_values(t.stream()).unwrap_err();
        assert!(matches!(err, RelqError::Usage(_)));
    }

    #[test]
    fn column_values() {
        let t = table("t", &["x", "y"], vec![vec![1, 2], vec![3, 4]]);
        assert_eq!(
            vec![ScalarValue::Int64(2), ScalarValue::Int64(4)],
            fetch_column_values(t.stream(), "y").unwrap()
        );
    }

    #[test]
    fn first_value() {
        let t = table("t", &["x", "y"], vec![vec![1, 2], vec![3, 4]]);
        assert_eq!(Some(ScalarValue::Int64(1)), fetch_first_value(t.stream()).unwrap());
        assert_eq!(None, fetch_first_value(table("t", &["x"], vec![]).stream()).unwrap());
    }

    #[test]
    fn first_value_pulls_once() {
        let mut pulled = 0;
        let rows = std::iter::from_fn(|| {
            pulled += 1;
            Some(Row::from_pairs([("x", pulled)]))
        });
        assert_eq!(Some(ScalarValue::Int64(1)), fetch_first_value(rows).unwrap());
        assert_eq!(1, pulled);
    }
}
