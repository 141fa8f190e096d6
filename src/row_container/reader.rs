use std::sync::Arc;

use crate::{Error, chunk::Chunk, exec_context::ExecContext};

use super::Shared;

/// Independent iteration cursor over the rows of a [`super::RowContainer`].
///
/// A reader only holds a position. Advancing it never modifies the container, and it remains
/// usable after the result set which filled the container has been closed.
pub struct Reader {
    shared: Arc<Shared>,
    position: usize,
    closed: bool,
}

impl Reader {
    pub(super) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            position: 0,
            closed: false,
        }
    }

    /// Returns the next (up to) `max_rows` rows, preserving their order.
    ///
    /// # Return
    ///
    /// `None` if all rows have been read. A `max_rows` of `0` is treated as `1`.
    ///
    /// Fails with [`Error::Closed`] if either the reader or its container has been closed. If the
    /// fetch fails, the position of the reader is unchanged.
    pub fn next_chunk(
        &mut self,
        ctx: &ExecContext,
        max_rows: usize,
    ) -> Result<Option<Chunk>, Error> {
        if self.closed {
            return Err(Error::Closed("row container reader"));
        }
        ctx.check()?;
        let mut store = self.shared.lock();
        if store.closed {
            return Err(Error::Closed("row container"));
        }
        let remaining = store.num_rows().saturating_sub(self.position);
        if remaining == 0 {
            return Ok(None);
        }
        let count = remaining.min(max_rows.max(1));
        let rows = store.read_rows(ctx, self.position, count)?;
        drop(store);

        let mut chunk = Chunk::new(self.shared.field_types.len(), count, count);
        for row in rows {
            chunk.append_row(row);
        }
        self.position += count;
        Ok(Some(chunk))
    }

    /// Number of rows already returned.
    pub fn position(&self) -> usize {
        self.position
    }

    /// `true` if the next call to [`Self::next_chunk`] would not return any rows, either because
    /// every row has been read or because reader or container are closed.
    pub fn is_exhausted(&self) -> bool {
        if self.closed {
            return true;
        }
        let store = self.shared.lock();
        store.closed || self.position >= store.num_rows()
    }

    /// Stops the reader. Idempotent. Does not affect the container or other readers.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        Error, ExecContext, Options,
        chunk::Chunk,
        row_container::RowContainer,
        types::{Datum, FieldKind, FieldType},
    };

    fn filled_container(num_rows: i64) -> RowContainer {
        let ctx = ExecContext::background();
        let container =
            RowContainer::new(vec![FieldType::new(FieldKind::LongLong)], &Options::default());
        let mut chunk = Chunk::new(1, 0, num_rows as usize);
        for i in 0..num_rows {
            chunk.append_row(vec![Datum::Int(i)]);
        }
        container.add_chunk(&ctx, &chunk).unwrap();
        container.freeze();
        container
    }

    #[test]
    fn readers_are_independent() {
        let ctx = ExecContext::background();
        let container = filled_container(4);
        let mut first = container.reader();
        let mut second = container.reader();
        first.next_chunk(&ctx, 3).unwrap();
        let chunk = second.next_chunk(&ctx, 2).unwrap().unwrap();
        assert_eq!(vec![Datum::Int(0)], chunk.rows()[0]);
        assert_eq!(3, first.position());
        assert_eq!(2, second.position());
        assert_eq!(4, container.num_rows());
    }

    #[test]
    fn end_of_data_is_not_an_error() {
        let ctx = ExecContext::background();
        let container = filled_container(2);
        let mut reader = container.reader();
        assert_eq!(2, reader.next_chunk(&ctx, 2).unwrap().unwrap().num_rows());
        assert!(reader.is_exhausted());
        assert!(reader.next_chunk(&ctx, 2).unwrap().is_none());
        assert!(reader.next_chunk(&ctx, 2).unwrap().is_none());
    }

    #[test]
    fn closing_container_fails_pending_reader() {
        let ctx = ExecContext::background();
        let container = filled_container(5);
        let mut reader = container.reader();
        reader.next_chunk(&ctx, 2).unwrap();
        container.close();
        let result = reader.next_chunk(&ctx, 2);
        assert!(matches!(result, Err(Error::Closed("row container"))));
        assert!(reader.is_exhausted());
    }

    #[test]
    fn dropping_container_fails_pending_reader() {
        let ctx = ExecContext::background();
        let mut reader = filled_container(5).reader();
        assert!(matches!(reader.next_chunk(&ctx, 1), Err(Error::Closed(_))));
    }

    #[test]
    fn canceled_fetch_keeps_position() {
        let ctx = ExecContext::background();
        let container = filled_container(5);
        let mut reader = container.reader();
        let canceled = ExecContext::background();
        canceled.cancel_handle().cancel();
        assert!(matches!(reader.next_chunk(&canceled, 2), Err(Error::Canceled)));
        assert_eq!(0, reader.position());
        let chunk = reader.next_chunk(&ctx, 2).unwrap().unwrap();
        assert_eq!(vec![Datum::Int(0)], chunk.rows()[0]);
    }

    #[test]
    fn closed_reader() {
        let ctx = ExecContext::background();
        let container = filled_container(1);
        let mut reader = container.reader();
        reader.close();
        assert!(matches!(
            reader.next_chunk(&ctx, 1),
            Err(Error::Closed("row container reader"))
        ));
    }
}
