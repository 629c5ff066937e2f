use std::ops::Bound;

use crossbeam_skiplist::{map::Entry, SkipMap};

use super::{prefix_end, Column, Store};
use crate::error::Result;

/// An in-memory sorted store, one concurrent skip list per column. The
/// reference `Store` implementation: tests and stand-alone embeddings use it
/// directly; a node embeds its own database behind the same trait.
#[derive(Debug)]
pub struct MemoryStore {
    addresses: SkipMap<Vec<u8>, Vec<u8>>,
    topics: SkipMap<Vec<u8>, Vec<u8>>,
    meta: SkipMap<Vec<u8>, Vec<u8>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            addresses: SkipMap::new(),
            topics: SkipMap::new(),
            meta: SkipMap::new(),
        }
    }

    fn map(&self, column: Column) -> &SkipMap<Vec<u8>, Vec<u8>> {
        match column {
            Column::Addresses => &self.addresses,
            Column::Topics => &self.topics,
            Column::Default => &self.meta,
        }
    }
}

impl Store for MemoryStore {
    type ScanIterator<'a> = ScanIter<'a>;

    fn set(&self, column: Column, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.map(column).insert(key.to_vec(), value);
        Ok(())
    }

    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.map(column).get(key).map(|entry| entry.value().clone()))
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<()> {
        self.map(column).remove(key);
        Ok(())
    }

    fn scan_prefix<'a>(&'a self, column: Column, prefix: &[u8]) -> Self::ScanIterator<'a> {
        let start = Bound::Included(prefix.to_vec());
        let end = prefix_end(prefix);
        ScanIter {
            inner: self.map(column).range((start, end)),
        }
    }
}

type SkipMapRange<'a> = crossbeam_skiplist::map::Range<
    'a,
    Vec<u8>,
    (Bound<Vec<u8>>, Bound<Vec<u8>>),
    Vec<u8>,
    Vec<u8>,
>;

pub struct ScanIter<'a> {
    inner: SkipMapRange<'a>,
}

impl<'a> ScanIter<'a> {
    /// Maps a SkipMap Entry to the expected output format.
    fn map(entry: Entry<'_, Vec<u8>, Vec<u8>>) -> <Self as Iterator>::Item {
        Ok((entry.key().clone(), entry.value().clone()))
    }
}

impl<'a> Iterator for ScanIter<'a> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(Self::map)
    }
}
