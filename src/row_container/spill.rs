use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom, Write},
    path::Path,
};

use crate::{Error, chunk::Row, types::Datum};

/// Rows of a row container which did not fit into memory. Backed by an anonymous temporary file,
/// which is deleted by the operating system once it is dropped.
///
/// Rows are encoded back to back with bincode. The byte offset of each row is kept in memory, so a
/// range of rows is read with a single seek.
pub struct SpillFile {
    file: File,
    /// Byte offset of each row within the file.
    offsets: Vec<u64>,
    /// Offset one past the last byte written.
    end: u64,
    /// Reused between appends to avoid an allocation per row.
    scratch: Vec<u8>,
}

impl SpillFile {
    pub fn create(dir: Option<&Path>) -> io::Result<Self> {
        let file = match dir {
            Some(dir) => tempfile::tempfile_in(dir)?,
            None => tempfile::tempfile()?,
        };
        Ok(Self {
            file,
            offsets: Vec::new(),
            end: 0,
            scratch: Vec::new(),
        })
    }

    pub fn num_rows(&self) -> usize {
        self.offsets.len()
    }

    /// Size of the file in bytes.
    pub fn len_bytes(&self) -> u64 {
        self.end
    }

    pub fn append(&mut self, row: &[Datum]) -> Result<(), Error> {
        self.scratch.clear();
        bincode::serialize_into(&mut self.scratch, row)?;
        self.file.seek(SeekFrom::Start(self.end))?;
        self.file.write_all(&self.scratch)?;
        self.offsets.push(self.end);
        self.end += self.scratch.len() as u64;
        Ok(())
    }

    /// Reads `count` consecutive rows starting with the row at `start` in one go.
    pub fn read_rows(&mut self, start: usize, count: usize) -> Result<Vec<Row>, Error> {
        if count == 0 {
            return Ok(Vec::new());
        }
        if start + count > self.offsets.len() {
            return Err(Error::InvalidState(
                "row requested beyond the end of the spill file",
            ));
        }
        let from = self.offsets[start];
        let to = self.offsets.get(start + count).copied().unwrap_or(self.end);
        let mut buf = vec![0; (to - from) as usize];
        self.file.seek(SeekFrom::Start(from))?;
        self.file.read_exact(&mut buf)?;

        let mut encoded = &buf[..];
        let mut rows = Vec::with_capacity(count);
        for _ in 0..count {
            rows.push(bincode::deserialize_from(&mut encoded)?);
        }
        Ok(rows)
    }
}
