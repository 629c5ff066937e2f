use std::iter::Peekable;

use super::append_file::AppendFile;
use super::meta::SegmentIter;
use super::page_file::{PageFile, ENTRY_SIZE, PAGE_ENTRIES};
use super::segment::{Descriptor, Kind};
use crate::codec;
use crate::error::Result;
use crate::store::Store;
use crate::Error;

/// Lazily yields the ascending block numbers recorded for one key within
/// `[from, to]`. Single-pass; a fresh query re-runs the scan.
///
/// Segments are visited in ascending `first_block` order and loaded one at a
/// time. A segment overlaps the range iff its `first_block` is at most `to`
/// and the *next* segment's `first_block` is past `from`; the next row's key
/// alone fences the current segment, so non-overlapping segments are rejected
/// without reading their contents.
pub struct RangeScan<'a, S: Store + 'a> {
    rows: Peekable<SegmentIter<S::ScanIterator<'a>>>,
    temp: &'a PageFile,
    finalized: &'a AppendFile,
    from: u32,
    to: u32,
    current: std::vec::IntoIter<u32>,
    done: bool,
}

impl<'a, S: Store + 'a> RangeScan<'a, S> {
    pub(crate) fn new(
        rows: SegmentIter<S::ScanIterator<'a>>,
        temp: &'a PageFile,
        finalized: &'a AppendFile,
        from: u32,
        to: u32,
    ) -> Self {
        Self {
            rows: rows.peekable(),
            temp,
            finalized,
            from,
            to,
            current: Vec::new().into_iter(),
            done: from > to,
        }
    }

    /// Loads one segment's stored block numbers.
    fn load(&self, descriptor: &Descriptor) -> Result<Vec<u32>> {
        match descriptor.kind {
            Kind::Temp => {
                if descriptor.length > PAGE_ENTRIES {
                    return Err(Error::Corruption(format!(
                        "temp segment holds {} entries, page capacity is {PAGE_ENTRIES}",
                        descriptor.length
                    )));
                }
                let raw = self
                    .temp
                    .read_page(descriptor.offset, descriptor.length as usize * ENTRY_SIZE)?;
                codec::unpack_blocks(&raw)
            }
            Kind::Final => {
                let raw = self.finalized.read(descriptor.offset, descriptor.length)?;
                codec::decompress(&raw)
            }
        }
    }

    /// The next segment's `first_block`, the exclusive upper fence of the
    /// current one. A decode error surfaces on the following iteration.
    fn fence(&mut self) -> u32 {
        match self.rows.peek() {
            Some(Ok((first_block, _))) => *first_block,
            _ => u32::MAX,
        }
    }
}

impl<'a, S: Store + 'a> Iterator for RangeScan<'a, S> {
    type Item = Result<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(block) = self.current.next() {
                if block > self.to {
                    // Later segments only hold larger blocks; the scan is over.
                    self.done = true;
                    self.current = Vec::new().into_iter();
                    return None;
                }
                return Some(Ok(block));
            }
            if self.done {
                return None;
            }

            let (first_block, descriptor) = match self.rows.next() {
                Some(Ok(row)) => row,
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    return None;
                }
            };

            if first_block > self.to {
                self.done = true;
                return None;
            }
            if self.fence() <= self.from {
                // Every block of this segment precedes the range.
                continue;
            }

            let mut blocks = match self.load(&descriptor) {
                Ok(blocks) => blocks,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            let start = blocks.partition_point(|block| *block < self.from);
            blocks.drain(..start);
            self.current = blocks.into_iter();
        }
    }
}
