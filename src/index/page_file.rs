use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use super::io::{read_exact_at, write_all_at};
use crate::error::Result;
use crate::Error;

/// Size of one temp page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Size of one stored block number.
pub const ENTRY_SIZE: usize = 4;

/// Block numbers per page.
pub const PAGE_ENTRIES: u32 = (PAGE_SIZE / ENTRY_SIZE) as u32;

/// The temp index file: fixed 4096-byte pages, each buffering the raw
/// little-endian block numbers of one open segment. No header, no magic; the
/// OS page cache is the cache.
pub struct PageFile {
    file: File,
    len: Mutex<u64>,
}

impl PageFile {
    /// Opens or creates the page file. An existing file whose length is not a
    /// whole number of pages was torn by something other than this engine and
    /// is treated as corrupt.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::options()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        let len = file.metadata()?.len();
        if len % PAGE_SIZE as u64 != 0 {
            return Err(Error::Corruption(format!(
                "temp file length {len} is not a multiple of the page size"
            )));
        }
        Ok(Self {
            file,
            len: Mutex::new(len),
        })
    }

    /// Random read of up to one page at a known page offset.
    pub fn read_page(&self, offset: u64, n_bytes: usize) -> Result<Vec<u8>> {
        assert!(n_bytes <= PAGE_SIZE, "page read of {n_bytes} bytes");
        let mut buf = vec![0u8; n_bytes];
        read_exact_at(&self.file, &mut buf, offset)?;
        Ok(buf)
    }

    /// Writes one block number into the given entry slot of a page.
    pub fn write_entry(&self, offset: u64, slot: u32, value: u32) -> Result<()> {
        assert!(slot < PAGE_ENTRIES, "entry slot {slot} out of page bounds");
        let pos = offset + slot as u64 * ENTRY_SIZE as u64;
        write_all_at(&self.file, &value.to_le_bytes(), pos)?;
        Ok(())
    }

    /// Grows the file by one page and returns the new page's offset. Callers
    /// serialize through the free-page allocator lock.
    pub fn allocate(&self) -> Result<u64> {
        let mut len = self.len.lock()?;
        let offset = *len;
        *len += PAGE_SIZE as u64;
        self.file.set_len(*len)?;
        Ok(offset)
    }

    /// Current file size in bytes, always a multiple of the page size.
    pub fn size(&self) -> Result<u64> {
        Ok(*self.len.lock()?)
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
