use crate::{
    Error,
    chunk::{Chunk, ChunkAllocator},
    exec_context::ExecContext,
    row_container::Reader,
    types::{ColumnInfo, FieldType},
};

use super::{FetchNotifier, ResultSet};

/// A [`ResultSet`] which can hold the reader of a row container. Once its rows have been drained
/// into a [`crate::RowContainer`], fetches go through the stored [`Reader`] rather than through
/// [`ResultSet::next`].
pub trait CursorResultSet: ResultSet {
    /// Fails with [`Error::InvalidState`] if a reader is already stored.
    fn store_row_container_reader(&mut self, reader: Reader) -> Result<(), Error>;

    fn row_container_reader(&self) -> Option<&Reader>;

    fn row_container_reader_mut(&mut self) -> Option<&mut Reader>;

    /// Removes the stored reader, if any.
    fn take_row_container_reader(&mut self) -> Option<Reader>;
}

/// Adds reader storage to any [`ResultSet`]. Every [`ResultSet`] method is delegated to the
/// wrapped set unchanged, so the engine never needs to know about cursors. See
/// [`wrap_with_cursor`].
pub struct CursorWrapper<R> {
    inner: R,
    reader: Option<Reader>,
}

/// Lets `result_set` opt into cursor semantics. The returned wrapper starts without a reader.
///
/// ```
/// use stmt_cursor::{CursorResultSet, ResultSet, wrap_with_cursor};
///
/// fn as_cursor(rs: impl ResultSet) -> impl CursorResultSet {
///     let cursor = wrap_with_cursor(rs);
///     assert!(cursor.row_container_reader().is_none());
///     cursor
/// }
/// ```
pub fn wrap_with_cursor<R>(result_set: R) -> CursorWrapper<R>
where
    R: ResultSet,
{
    CursorWrapper {
        inner: result_set,
        reader: None,
    }
}

impl<R> CursorWrapper<R> {
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Unwraps the result set, dropping the reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R> ResultSet for CursorWrapper<R>
where
    R: ResultSet,
{
    fn columns(&self) -> &[ColumnInfo] {
        self.inner.columns()
    }

    fn field_types(&self) -> &[FieldType] {
        self.inner.field_types()
    }

    fn new_chunk(&self, allocator: &dyn ChunkAllocator) -> Chunk {
        self.inner.new_chunk(allocator)
    }

    fn next(&mut self, ctx: &ExecContext, chunk: &mut Chunk) -> Result<(), Error> {
        self.inner.next(ctx, chunk)
    }

    /// Closes the wrapped result set. The stored reader is left untouched, it reads from the row
    /// container rather than from the result set.
    fn close(&mut self) -> Result<(), Error> {
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn fetch_notifier(&self) -> Option<&dyn FetchNotifier> {
        self.inner.fetch_notifier()
    }
}

impl<R> CursorResultSet for CursorWrapper<R>
where
    R: ResultSet,
{
    fn store_row_container_reader(&mut self, reader: Reader) -> Result<(), Error> {
        if self.reader.is_some() {
            return Err(Error::InvalidState(
                "result set already holds a row container reader",
            ));
        }
        self.reader = Some(reader);
        Ok(())
    }

    fn row_container_reader(&self) -> Option<&Reader> {
        self.reader.as_ref()
    }

    fn row_container_reader_mut(&mut self) -> Option<&mut Reader> {
        self.reader.as_mut()
    }

    fn take_row_container_reader(&mut self) -> Option<Reader> {
        self.reader.take()
    }
}
