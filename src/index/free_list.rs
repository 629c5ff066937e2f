use std::sync::Mutex;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use super::page_file::PageFile;
use crate::error::Result;
use crate::store::{Column, Store};
use crate::Error;

/// Reserved key holding the free-page list in the Default column.
pub const FREE_PAGES_KEY: &[u8] = b"freePages";

/// Persistent stack of reusable temp-file page offsets, serialized as a
/// packed little-endian u32 array. The in-memory copy is write-through:
/// every mutation is persisted before it becomes observable, and `load`
/// rebuilds from the store so a stale cache never survives a restart.
pub struct FreeList {
    pages: Mutex<Vec<u32>>,
}

impl FreeList {
    pub fn load(store: &impl Store) -> Result<Self> {
        let pages = match store.get(Column::Default, FREE_PAGES_KEY)? {
            Some(raw) => decode_pages(&raw)?,
            None => Vec::new(),
        };
        Ok(Self {
            pages: Mutex::new(pages),
        })
    }

    /// Pops a reusable page offset, or grows the temp file by one page. Both
    /// paths run under the allocator lock, so concurrent writers can neither
    /// double-pop a page nor interleave growth.
    pub fn acquire(&self, store: &impl Store, temp: &PageFile) -> Result<u64> {
        let mut pages = self.pages.lock()?;
        if let Some(offset) = pages.pop() {
            store.set(Column::Default, FREE_PAGES_KEY, encode_pages(&pages))?;
            return Ok(offset as u64);
        }
        let offset = temp.allocate()?;
        if u32::try_from(offset).is_err() {
            return Err(Error::IO(format!(
                "temp file page offset {offset} exceeds the addressable 4 GiB"
            )));
        }
        debug!(offset, "grew temp file by one page");
        Ok(offset)
    }

    /// Pushes a promoted segment's page back onto the stack.
    pub fn release(&self, store: &impl Store, offset: u64) -> Result<()> {
        let offset = u32::try_from(offset).map_err(|_| {
            Error::Corruption(format!(
                "released page offset {offset} exceeds the addressable 4 GiB"
            ))
        })?;
        let mut pages = self.pages.lock()?;
        pages.push(offset);
        store.set(Column::Default, FREE_PAGES_KEY, encode_pages(&pages))
    }

    /// Number of pages currently available for reuse.
    pub fn available(&self) -> Result<usize> {
        Ok(self.pages.lock()?.len())
    }
}

fn encode_pages(pages: &[u32]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(pages.len() * 4);
    for page in pages {
        raw.write_u32::<LittleEndian>(*page).unwrap();
    }
    raw
}

fn decode_pages(mut raw: &[u8]) -> Result<Vec<u32>> {
    if raw.len() % 4 != 0 {
        return Err(Error::Corruption(format!(
            "free-page list is {} bytes, not a multiple of 4",
            raw.len()
        )));
    }
    let mut pages = Vec::with_capacity(raw.len() / 4);
    while !raw.is_empty() {
        pages.push(raw.read_u32::<LittleEndian>()?);
    }
    Ok(pages)
}
