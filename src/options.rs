use std::path::PathBuf;

/// Default for [`Options::init_chunk_size`].
pub const DEFAULT_INIT_CHUNK_SIZE: usize = 32;
/// Default for [`Options::max_chunk_size`].
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1024;
/// Default for [`Options::spill_threshold_bytes`]. 64 MiB.
pub const DEFAULT_SPILL_THRESHOLD_BYTES: usize = 64 << 20;

/// Tuning knobs of a connection. Passed to the driver and copied into every connection
/// [`crate::Context`] it opens.
///
/// ```
/// use stmt_cursor::Options;
///
/// // Spill cursors holding more than 10000 rows to disk.
/// let options = Options {
///     spill_threshold_rows: Some(10_000),
///     ..Options::default()
/// };
/// assert_eq!(1024, options.max_chunk_size);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    /// Number of rows a freshly allocated chunk reserves memory for.
    pub init_chunk_size: usize,
    /// Maximum number of rows a single call to [`crate::ResultSet::next`] places in a chunk.
    pub max_chunk_size: usize,
    /// Estimated in memory size of a row container after which subsequent rows are written to
    /// disk.
    pub spill_threshold_bytes: usize,
    /// If set, a row container spills to disk once it holds this many rows in memory. Whichever
    /// threshold is hit first triggers the spill.
    pub spill_threshold_rows: Option<usize>,
    /// Directory for spill files. `None` uses the temporary directory of the system.
    pub spill_dir: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            init_chunk_size: DEFAULT_INIT_CHUNK_SIZE,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            spill_threshold_bytes: DEFAULT_SPILL_THRESHOLD_BYTES,
            spill_threshold_rows: None,
            spill_dir: None,
        }
    }
}

impl Options {
    /// Chunk sizes with `0` replaced by `1`, and the initial size capped by the maximum.
    pub(crate) fn chunk_sizes(&self) -> (usize, usize) {
        let max = self.max_chunk_size.max(1);
        (self.init_chunk_size.clamp(1, max), max)
    }
}
