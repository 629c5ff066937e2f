use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use super::io::{read_exact_at, write_all_at};
use crate::error::Result;

/// The finalized index file: concatenated variable-length compressed runs,
/// referenced by `(offset, length)`. Append-only; a published run is never
/// rewritten or truncated.
pub struct AppendFile {
    file: File,
    len: Mutex<u64>,
}

impl AppendFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::options()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            len: Mutex::new(len),
        })
    }

    /// Appends a run and returns its offset. The length mutex serializes
    /// appends, so returned offsets are monotonic and non-overlapping.
    pub fn append(&self, data: &[u8]) -> Result<u64> {
        let mut len = self.len.lock()?;
        let offset = *len;
        write_all_at(&self.file, data, offset)?;
        *len += data.len() as u64;
        Ok(offset)
    }

    /// Reads a published run. No lock: published runs are immutable.
    pub fn read(&self, offset: u64, length: u32) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; length as usize];
        read_exact_at(&self.file, &mut buf, offset)?;
        Ok(buf)
    }

    pub fn size(&self) -> Result<u64> {
        Ok(*self.len.lock()?)
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
