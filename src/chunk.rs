use crate::types::{Datum, FieldType};

/// One row of a result. Values are ordered like the columns of the result set.
pub type Row = Vec<Datum>;

/// A batch of rows with a fixed capacity. Unit of transfer between the execution engine, the row
/// container and the protocol layer.
///
/// The capacity is a fill limit: producers stop appending once [`Chunk::is_full`] returns `true`.
/// Memory for `init_capacity` rows is reserved up front.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    num_cols: usize,
    capacity: usize,
    rows: Vec<Row>,
}

impl Chunk {
    pub fn new(num_cols: usize, init_capacity: usize, capacity: usize) -> Self {
        Self {
            num_cols,
            capacity,
            rows: Vec::with_capacity(init_capacity.min(capacity)),
        }
    }

    /// Number of columns each row is expected to have.
    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    /// Maximum number of rows a producer places in this chunk.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.capacity
    }

    /// Appends a row.
    ///
    /// # Panics
    ///
    /// If the row does not have exactly [`Self::num_cols`] values.
    pub fn append_row(&mut self, row: Row) {
        assert_eq!(
            self.num_cols,
            row.len(),
            "Row must have as many values as the chunk has columns."
        );
        self.rows.push(row);
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Removes all rows, keeping capacity and allocated memory.
    pub fn reset(&mut self) {
        self.rows.clear();
    }
}

/// Decides how chunks for a result set are allocated. The protocol layer may pass its own
/// allocator to reuse memory across result sets.
pub trait ChunkAllocator {
    fn alloc(&self, field_types: &[FieldType], init_capacity: usize, capacity: usize) -> Chunk;
}

/// Allocates a new chunk for every request.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultAllocator;

impl ChunkAllocator for DefaultAllocator {
    fn alloc(&self, field_types: &[FieldType], init_capacity: usize, capacity: usize) -> Chunk {
        Chunk::new(field_types.len(), init_capacity, capacity)
    }
}
