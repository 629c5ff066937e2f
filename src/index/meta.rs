use super::segment::{first_block_of, segment_key, Descriptor};
use crate::error::Result;
use crate::store::{Column, Store};

/// Typed adapter over the key-value store for segment rows. One row per
/// segment, keyed `user_key || first_block` (big-endian suffix), valued by
/// the 17-byte descriptor.
pub struct MetaStore<S: Store> {
    store: S,
}

impl<S: Store> MetaStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The raw store, for state that lives outside the segment rows (the
    /// free-page list).
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Publishes a segment row. A put at an existing `(key, first_block)`
    /// replaces the row in place, which is how promotion rewrites a TEMP row
    /// as FINAL without a separate delete.
    pub fn put(&self, column: Column, user_key: &[u8], first_block: u32, descriptor: &Descriptor) -> Result<()> {
        self.store
            .set(column, &segment_key(user_key, first_block), descriptor.encode())
    }

    /// Removes a segment row.
    pub fn delete(&self, column: Column, user_key: &[u8], first_block: u32) -> Result<()> {
        self.store.delete(column, &segment_key(user_key, first_block))
    }

    /// The key's newest segment: the open TEMP one when present (it is always
    /// last in iteration order), otherwise the newest finalized one.
    pub fn last_segment(&self, column: Column, user_key: &[u8]) -> Result<Option<(u32, Descriptor)>> {
        let mut last = None;
        for row in self.segments(column, user_key) {
            last = Some(row?);
        }
        Ok(last)
    }

    /// Ascending iteration over a key's segments.
    pub fn segments<'a>(
        &'a self,
        column: Column,
        user_key: &[u8],
    ) -> SegmentIter<S::ScanIterator<'a>> {
        SegmentIter {
            inner: self.store.scan_prefix(column, user_key),
            key_width: user_key.len(),
        }
    }
}

/// Decodes raw prefix-scan rows into `(first_block, Descriptor)` pairs,
/// surfacing misshapen rows as corruption.
pub struct SegmentIter<I> {
    inner: I,
    key_width: usize,
}

impl<I> SegmentIter<I> {
    fn decode(&self, row: (Vec<u8>, Vec<u8>)) -> Result<(u32, Descriptor)> {
        let (key, value) = row;
        Ok((
            first_block_of(&key, self.key_width)?,
            Descriptor::decode(&value)?,
        ))
    }
}

impl<I: Iterator<Item = Result<(Vec<u8>, Vec<u8>)>>> Iterator for SegmentIter<I> {
    type Item = Result<(u32, Descriptor)>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.inner.next()?;
        Some(row.and_then(|row| self.decode(row)))
    }
}
