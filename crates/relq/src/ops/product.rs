use std::sync::Arc;

use tracing::trace;

use crate::errors::{Result, shape, usage};
use crate::expr::Predicate;
use crate::row::{Row, RowSchema};
use crate::table::Table;

use super::RowStream;

/// Produce the cartesian product of `sources`, filtering each join step by
/// that source's predicate.
///
/// Rows are produced in first-table-major order. No source produces a single
/// empty row. Each output row carries `context` as its outer row.
pub fn from_product(sources: Vec<(Table, Option<Predicate>)>, context: Option<Arc<Row>>) -> Result<RowStream> {
    for (idx, (table, _)) in sources.iter().enumerate() {
        if sources[..idx].iter().any(|(other, _)| other.alias() == table.alias()) {
            return Err(shape!("table '{}' referenced more than once", table.alias()));
        }
    }

    trace!(sources = sources.len(), "building product");

    let mut sources = sources.into_iter();
    let (first, first_pred) = match sources.next() {
        Some(source) => source,
        None => {
            let row = match context {
                Some(context) => Row::empty().with_outer(context),
                None => Row::empty(),
            };
            return Ok(Box::new(std::iter::once(Ok(row))));
        }
    };

    let mut schema = first.schema().clone();
    let ctx = context.clone();
    let mut stream: RowStream = Box::new(first.rows().filter_map(move |row| {
        let row = match &ctx {
            Some(ctx) => row.with_outer(ctx.clone()),
            None => row,
        };
        apply_predicate(first_pred.as_ref(), row)
    }));

    for (table, pred) in sources {
        let joined = Arc::new(RowSchema::concat([schema.as_ref(), table.schema().as_ref()])?);
        schema = joined.clone();
        let context = context.clone();

        stream = Box::new(stream.flat_map(move |left| -> RowStream {
            let left = match left {
                Ok(left) => left,
                Err(e) => return Box::new(std::iter::once(Err(e))),
            };
            let joined = joined.clone();
            let context = context.clone();
            let pred = pred.clone();
            Box::new(table.rows().filter_map(move |right| {
                let row = match Row::concat_with_schema(&joined, &[&left, &right]) {
                    Ok(row) => row,
                    Err(e) => return Some(Err(e)),
                };
                let row = match &context {
                    Some(context) => row.with_outer(context.clone()),
                    None => row,
                };
                apply_predicate(pred.as_ref(), row)
            }))
        }));
    }

    Ok(stream)
}

fn apply_predicate(pred: Option<&Predicate>, row: Row) -> Option<Result<Row>> {
    match pred {
        None => Some(Ok(row)),
        Some(pred) => match pred(&row) {
            Ok(true) => Some(Ok(row)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        },
    }
}

/// Errors once more than `max` rows have been produced by a product.
pub(crate) struct ProductLimit {
    input: RowStream,
    max: usize,
    produced: usize,
}

impl ProductLimit {
    /// Wrap `input`. A max of zero means no limit and returns the input as is.
    pub fn wrap(input: RowStream, max: usize) -> RowStream {
        if max == 0 {
            return input;
        }
        Box::new(ProductLimit {
            input,
            max,
            produced: 0,
        })
    }
}

impl Iterator for ProductLimit {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.input.next()?;
        self.produced += 1;
        if self.produced > self.max {
            return Some(Err(usage!(
                "query produced more than {} source rows (max_product_rows)",
                self.max
            )));
        }
        Some(row)
    }
}
