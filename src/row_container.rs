//! Buffer for the rows of a server side cursor.
//!
//! A [`RowContainer`] is filled once, by draining a result set, and then read through one or more
//! [`Reader`]s. Rows are kept in memory until a threshold is exceeded. All rows after that are
//! appended to a temporary file. Readers do not notice the difference.

mod reader;
mod spill;

use std::{
    mem::size_of,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use log::debug;

use crate::{
    Error,
    chunk::{Chunk, Row},
    exec_context::ExecContext,
    options::Options,
    types::FieldType,
};

pub use self::reader::Reader;
use self::spill::SpillFile;

/// An ordered, memory bounded buffer of rows which transparently spills to disk.
///
/// The container exclusively owns its rows. Readers obtained with [`Self::reader`] share access to
/// them and stay valid after the result set which filled the container has been closed. Once the
/// container itself is closed (or dropped), every reader fails with [`Error::Closed`].
pub struct RowContainer {
    shared: Arc<Shared>,
}

/// State shared between a container and its readers.
struct Shared {
    field_types: Vec<FieldType>,
    spill_threshold_bytes: usize,
    spill_threshold_rows: Option<usize>,
    spill_dir: Option<PathBuf>,
    store: Mutex<Store>,
}

struct Store {
    in_memory: Vec<Row>,
    /// Estimated size of `in_memory` in bytes.
    mem_bytes: usize,
    /// `Some` once the container spilled. Holds every row appended after the spill.
    spilled: Option<SpillFile>,
    frozen: bool,
    closed: bool,
}

impl Store {
    fn num_rows(&self) -> usize {
        self.in_memory.len() + self.spilled.as_ref().map_or(0, SpillFile::num_rows)
    }

    /// Copies `count` rows starting at `start`. Observes `ctx` between rows, so a canceled fetch
    /// does not return a partially filled result.
    fn read_rows(
        &mut self,
        ctx: &ExecContext,
        start: usize,
        count: usize,
    ) -> Result<Vec<Row>, Error> {
        let end = start + count;
        let mut rows = Vec::with_capacity(count);
        let in_memory = self.in_memory.len();
        if start < in_memory {
            for row in &self.in_memory[start..end.min(in_memory)] {
                ctx.check()?;
                rows.push(row.clone());
            }
        }
        if end > in_memory {
            ctx.check()?;
            let disk_start = start.max(in_memory) - in_memory;
            let spilled = self
                .spilled
                .as_mut()
                .ok_or(Error::InvalidState("row container lost its spilled rows"))?;
            rows.extend(spilled.read_rows(disk_start, end - in_memory - disk_start)?);
        }
        Ok(rows)
    }
}

impl RowContainer {
    /// An empty container for rows of the given types. Spill thresholds and directory are taken
    /// from `options`.
    pub fn new(field_types: Vec<FieldType>, options: &Options) -> Self {
        let shared = Shared {
            field_types,
            spill_threshold_bytes: options.spill_threshold_bytes,
            spill_threshold_rows: options.spill_threshold_rows,
            spill_dir: options.spill_dir.clone(),
            store: Mutex::new(Store {
                in_memory: Vec::new(),
                mem_bytes: 0,
                spilled: None,
                frozen: false,
                closed: false,
            }),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn field_types(&self) -> &[FieldType] {
        &self.shared.field_types
    }

    /// Appends all rows of `chunk`. Fails with [`Error::InvalidState`] after [`Self::freeze`] or if
    /// the chunk does not have one column per field type, and with [`Error::Closed`] after
    /// [`Self::close`].
    pub fn add_chunk(&self, ctx: &ExecContext, chunk: &Chunk) -> Result<(), Error> {
        ctx.check()?;
        if chunk.num_cols() != self.shared.field_types.len() {
            return Err(Error::InvalidState(
                "chunk does not match the columns of the row container",
            ));
        }
        let mut store = self.shared.lock();
        if store.closed {
            return Err(Error::Closed("row container"));
        }
        if store.frozen {
            return Err(Error::InvalidState("row container is frozen, rows can no longer be added"));
        }
        for row in chunk.rows() {
            self.shared.push_row(&mut store, row)?;
        }
        Ok(())
    }

    /// Ends the fill phase. The container is read only afterwards.
    pub fn freeze(&self) {
        self.shared.lock().frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.shared.lock().frozen
    }

    /// Total number of rows, in memory and on disk.
    pub fn num_rows(&self) -> usize {
        self.shared.lock().num_rows()
    }

    /// Estimated memory held by rows which have not been spilled.
    pub fn mem_bytes(&self) -> usize {
        self.shared.lock().mem_bytes
    }

    /// `true` once rows have been written to disk.
    pub fn is_spilled(&self) -> bool {
        self.shared.lock().spilled.is_some()
    }

    /// Number of rows which live on disk.
    pub fn num_spilled_rows(&self) -> usize {
        self.shared
            .lock()
            .spilled
            .as_ref()
            .map_or(0, SpillFile::num_rows)
    }

    /// A reader positioned at the first row. Readers do not modify the container, any number of
    /// them may be created.
    pub fn reader(&self) -> Reader {
        Reader::new(self.shared.clone())
    }

    /// Releases all rows and deletes the spill file. Idempotent. Readers fail with
    /// [`Error::Closed`] afterwards.
    pub fn close(&self) {
        let mut store = self.shared.lock();
        if store.closed {
            return;
        }
        store.closed = true;
        store.in_memory = Vec::new();
        store.mem_bytes = 0;
        if let Some(spilled) = store.spilled.take() {
            debug!(
                "Row container closed. Released spill file of {} bytes.",
                spilled.len_bytes()
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

impl Drop for RowContainer {
    fn drop(&mut self) {
        self.close();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Store> {
        // Nothing panics while holding the lock in a way which would leave the store inconsistent.
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_row(&self, store: &mut Store, row: &Row) -> Result<(), Error> {
        if let Some(spilled) = store.spilled.as_mut() {
            spilled.append(row)?;
            return Ok(());
        }
        let row_bytes = size_of::<Row>() + row.iter().map(|datum| datum.mem_size()).sum::<usize>();
        let exceeds_bytes = store.mem_bytes + row_bytes > self.spill_threshold_bytes;
        let exceeds_rows = self
            .spill_threshold_rows
            .is_some_and(|max_rows| store.in_memory.len() >= max_rows);
        if exceeds_bytes || exceeds_rows {
            let mut spilled = SpillFile::create(self.spill_dir.as_deref())?;
            debug!(
                "Row container exceeded its memory threshold with {} rows ({} bytes). Spilling \
                subsequent rows to disk.",
                store.in_memory.len(),
                store.mem_bytes
            );
            spilled.append(row)?;
            store.spilled = Some(spilled);
        } else {
            store.mem_bytes += row_bytes;
            store.in_memory.push(row.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        Error, ExecContext, Options,
        chunk::Chunk,
        types::{Datum, FieldKind, FieldType},
    };

    use super::RowContainer;

    fn int_chunk(values: impl IntoIterator<Item = i64>) -> Chunk {
        let values: Vec<_> = values.into_iter().collect();
        let mut chunk = Chunk::new(1, values.len(), values.len());
        for value in values {
            chunk.append_row(vec![Datum::Int(value)]);
        }
        chunk
    }

    fn container(options: &Options) -> RowContainer {
        RowContainer::new(vec![FieldType::new(FieldKind::LongLong)], options)
    }

    fn read_all(container: &RowContainer, batch: usize) -> Vec<i64> {
        let ctx = ExecContext::background();
        let mut reader = container.reader();
        let mut values = Vec::new();
        while let Some(chunk) = reader.next_chunk(&ctx, batch).unwrap() {
            for row in chunk.rows() {
                match row[0] {
                    Datum::Int(i) => values.push(i),
                    ref other => panic!("Unexpected value {other:?}"),
                }
            }
        }
        values
    }

    #[test]
    fn rows_stay_in_memory_below_threshold() {
        let ctx = ExecContext::background();
        let container = container(&Options::default());
        container.add_chunk(&ctx, &int_chunk(0..10)).unwrap();
        assert!(!container.is_spilled());
        assert_eq!(10, container.num_rows());
        assert!(container.mem_bytes() > 0);
        assert_eq!((0..10).collect::<Vec<_>>(), read_all(&container, 3));
    }

    #[test]
    fn spill_by_row_threshold() {
        let ctx = ExecContext::background();
        let options = Options {
            spill_threshold_rows: Some(4),
            ..Options::default()
        };
        let container = container(&options);
        container.add_chunk(&ctx, &int_chunk(0..5)).unwrap();
        container.add_chunk(&ctx, &int_chunk(5..10)).unwrap();
        assert!(container.is_spilled());
        assert_eq!(6, container.num_spilled_rows());
        assert_eq!(10, container.num_rows());
        // Batch boundaries straddle the border between memory and disk
        assert_eq!((0..10).collect::<Vec<_>>(), read_all(&container, 3));
    }

    #[test]
    fn spill_by_byte_threshold() {
        let ctx = ExecContext::background();
        let options = Options {
            spill_threshold_bytes: 0,
            ..Options::default()
        };
        let container = container(&options);
        container.add_chunk(&ctx, &int_chunk(0..3)).unwrap();
        assert_eq!(3, container.num_spilled_rows());
        assert_eq!(0, container.mem_bytes());
        assert_eq!(vec![0, 1, 2], read_all(&container, 100));
    }

    #[test]
    fn reader_created_before_spill_sees_all_rows() {
        let ctx = ExecContext::background();
        let options = Options {
            spill_threshold_rows: Some(2),
            ..Options::default()
        };
        let container = container(&options);
        let mut reader = container.reader();
        container.add_chunk(&ctx, &int_chunk(0..5)).unwrap();
        let chunk = reader.next_chunk(&ctx, 10).unwrap().unwrap();
        assert_eq!(5, chunk.num_rows());
        assert!(reader.is_exhausted());
    }

    #[test]
    fn no_rows_after_freeze() {
        let ctx = ExecContext::background();
        let container = container(&Options::default());
        container.freeze();
        let result = container.add_chunk(&ctx, &int_chunk(0..1));
        assert!(matches!(result, Err(Error::InvalidState(_))));
    }

    #[test]
    fn add_to_closed_container() {
        let ctx = ExecContext::background();
        let container = container(&Options::default());
        container.close();
        container.close();
        let result = container.add_chunk(&ctx, &int_chunk(0..1));
        assert!(matches!(result, Err(Error::Closed(_))));
    }

    #[test]
    fn reject_chunk_of_other_width() {
        let ctx = ExecContext::background();
        let container = container(&Options::default());
        let mut chunk = Chunk::new(2, 1, 1);
        chunk.append_row(vec![Datum::Int(1), Datum::Int(2)]);

        let result = container.add_chunk(&ctx, &chunk);

        assert!(matches!(result, Err(Error::InvalidState(_))));
        assert_eq!(0, container.num_rows());
        assert!(container.reader().next_chunk(&ctx, 1).unwrap().is_none());
    }

    #[test]
    fn canceled_fill() {
        let ctx = ExecContext::background();
        ctx.cancel_handle().cancel();
        let container = container(&Options::default());
        let result = container.add_chunk(&ctx, &int_chunk(0..1));
        assert!(matches!(result, Err(Error::Canceled)));
        assert_eq!(0, container.num_rows());
    }
}
