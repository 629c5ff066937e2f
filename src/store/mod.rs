pub mod memory;

use std::ops::Bound;
use std::sync::Arc;

use crate::error::Result;

/// The key-value namespaces used by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Column {
    /// `address || first_block` -> segment descriptor.
    Addresses,
    /// `topic || first_block` -> segment descriptor.
    Topics,
    /// Engine metadata, currently only the free-page list.
    Default,
}

/// An ordered key-value store with prefix iteration, the persistence layer
/// beneath the index. Implementations must publish each `set` atomically and
/// give every iterator a consistent view: readers never take engine locks and
/// rely on descriptors appearing all-or-nothing.
pub trait Store: Send + Sync {
    /// The iterator returned by scan_prefix().
    type ScanIterator<'a>: Iterator<Item = Result<(Vec<u8>, Vec<u8>)>> + 'a
    where
        Self: 'a;

    /// Inserts or updates a key-value pair in the given column.
    fn set(&self, column: Column, key: &[u8], value: Vec<u8>) -> Result<()>;

    /// Retrieves the value for a given key.
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Removes a key, if present.
    fn delete(&self, column: Column, key: &[u8]) -> Result<()>;

    /// Iterates over all key-value pairs starting with the given prefix, in
    /// ascending lexicographic key order.
    fn scan_prefix<'a>(&'a self, column: Column, prefix: &[u8]) -> Self::ScanIterator<'a>;
}

/// Computes the exclusive upper bound for a prefix scan: the prefix with its
/// last non-0xff byte incremented. An all-0xff prefix has no successor and
/// scans to the end.
pub(crate) fn prefix_end(prefix: &[u8]) -> Bound<Vec<u8>> {
    match prefix.iter().rposition(|b| *b != 0xff) {
        Some(i) => Bound::Excluded(
            prefix[..i]
                .iter()
                .chain(std::iter::once(&(prefix[i] + 1)))
                .copied()
                .collect::<Vec<u8>>(),
        ),
        None => Bound::Unbounded,
    }
}

impl<S: Store> Store for Arc<S> {
    type ScanIterator<'a>
        = S::ScanIterator<'a>
    where
        Self: 'a;

    fn set(&self, column: Column, key: &[u8], value: Vec<u8>) -> Result<()> {
        (**self).set(column, key, value)
    }

    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>> {
        (**self).get(column, key)
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<()> {
        (**self).delete(column, key)
    }

    fn scan_prefix<'a>(&'a self, column: Column, prefix: &[u8]) -> Self::ScanIterator<'a> {
        (**self).scan_prefix(column, prefix)
    }
}
