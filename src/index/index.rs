use std::fs;

use itertools::Itertools as _;
use tracing::{debug, info, trace, warn};

use super::append_file::AppendFile;
use super::free_list::FreeList;
use super::lock_table::KeyLockTable;
use super::meta::MetaStore;
use super::page_file::{PageFile, PAGE_ENTRIES, PAGE_SIZE};
use super::scan::RangeScan;
use super::segment::{Descriptor, Kind};
use crate::codec;
use crate::config::IndexConfig;
use crate::error::Result;
use crate::receipt::{Receipt, ADDRESS_LEN, TOPIC_LEN};
use crate::store::{Column, Store};
use crate::{errcorrupt, Error};

/// Page file of open temp segments.
pub const TEMP_FILE_NAME: &str = "temp_index.bin";

/// Append file of compressed finalized runs.
pub const FINAL_FILE_NAME: &str = "finalized_index.bin";

/// The log index engine: a persistent inverted index from log-emitting
/// addresses and topics to the ascending block numbers they appeared in.
///
/// Block numbers for a key accumulate raw in an open temp page; a full page
/// is promoted into a compressed run in the finalized file. One index row per
/// segment lives in the key-value store, so a range query only touches the
/// segments overlapping the requested blocks.
pub struct LogIndex<S: Store> {
    config: IndexConfig,
    meta: MetaStore<S>,
    temp: PageFile,
    finalized: AppendFile,
    free_list: FreeList,
    address_locks: KeyLockTable,
    topic_locks: KeyLockTable,
}

impl<S: Store> LogIndex<S> {
    /// Opens the index in `config.dir`, creating the files on first use. The
    /// free-page list is reloaded from the store, so any in-memory copy a
    /// previous process held is discarded.
    pub fn open(config: IndexConfig, store: S) -> Result<Self> {
        fs::create_dir_all(&config.dir)?;
        let temp = PageFile::open(&config.dir.join(TEMP_FILE_NAME))?;
        let finalized = AppendFile::open(&config.dir.join(FINAL_FILE_NAME))?;
        let free_list = FreeList::load(&store)?;

        info!(
            temp_pages = temp.size()? / PAGE_SIZE as u64,
            finalized_bytes = finalized.size()?,
            free_pages = free_list.available()?,
            "opened log index"
        );

        Ok(Self {
            config,
            meta: MetaStore::new(store),
            temp,
            finalized,
            free_list,
            address_locks: KeyLockTable::new(),
            topic_locks: KeyLockTable::new(),
        })
    }

    /// Indexes every log of a processed block, once per distinct address and
    /// topic. Re-ingesting an already-indexed block is a silent no-op, which
    /// makes reorg replays and backward sync idempotent; `is_backward_sync`
    /// is accepted for interface compatibility and does not alter the
    /// algorithm.
    pub fn set_receipts(
        &self,
        block_number: u32,
        receipts: &[Receipt],
        is_backward_sync: bool,
    ) -> Result<()> {
        trace!(block_number, is_backward_sync, "indexing receipts");
        let logs = || receipts.iter().flat_map(|receipt| receipt.logs.iter());

        for address in logs().map(|log| log.address).unique() {
            self.ingest(Column::Addresses, &self.address_locks, &address, block_number)?;
        }
        for topic in logs().flat_map(|log| log.topics.iter().copied()).unique() {
            self.ingest(Column::Topics, &self.topic_locks, &topic, block_number)?;
        }
        Ok(())
    }

    /// Ascending block numbers within `[from, to]` in which the key emitted a
    /// log. The key width selects the namespace: 20 bytes for addresses,
    /// 32 for topics.
    pub fn get_block_numbers(&self, key: &[u8], from: u32, to: u32) -> Result<RangeScan<'_, S>> {
        let column = match key.len() {
            ADDRESS_LEN => Column::Addresses,
            TOPIC_LEN => Column::Topics,
            width => {
                return Err(Error::InvalidInput(format!(
                    "key width {width} matches no namespace"
                )))
            }
        };
        Ok(RangeScan::new(
            self.meta.segments(column, key),
            &self.temp,
            &self.finalized,
            from,
            to,
        ))
    }

    /// Records one block number for one key, holding the key's write lock for
    /// the duration.
    fn ingest(&self, column: Column, locks: &KeyLockTable, key: &[u8], block: u32) -> Result<()> {
        let lock = locks.handle(key)?;
        let _guard = lock.lock()?;

        match self.meta.last_segment(column, key)? {
            // Already indexed at this block or a replay of an older one.
            Some((_, tail)) if block <= tail.last_block => Ok(()),
            Some((first_block, tail)) if tail.kind == Kind::Temp => {
                self.append(column, key, first_block, tail, block)
            }
            _ => self.start_segment(column, key, block),
        }
    }

    /// Appends a block to the key's open temp segment, promoting it once the
    /// page fills.
    fn append(
        &self,
        column: Column,
        key: &[u8],
        first_block: u32,
        tail: Descriptor,
        block: u32,
    ) -> Result<()> {
        if tail.length >= PAGE_ENTRIES {
            return errcorrupt!(
                "temp segment holds {} entries, page capacity is {PAGE_ENTRIES}",
                tail.length
            );
        }
        self.temp.write_entry(tail.offset, tail.length, block)?;
        let updated = Descriptor {
            kind: Kind::Temp,
            offset: tail.offset,
            length: tail.length + 1,
            last_block: block,
        };
        if updated.length == PAGE_ENTRIES {
            self.promote(column, key, first_block, updated)
        } else {
            self.meta.put(column, key, first_block, &updated)
        }
    }

    /// Opens a fresh temp segment whose first entry is this block, on a
    /// reused page when one is free.
    fn start_segment(&self, column: Column, key: &[u8], block: u32) -> Result<()> {
        let offset = self.free_list.acquire(self.meta.store(), &self.temp)?;
        self.temp.write_entry(offset, 0, block)?;
        let descriptor = Descriptor {
            kind: Kind::Temp,
            offset,
            length: 1,
            last_block: block,
        };
        self.meta.put(column, key, block, &descriptor)
    }

    /// Converts a full temp segment into a finalized run: compress the page,
    /// append it, rewrite the index row in place, release the page. The row
    /// key is unchanged because `first_block` always equals the page's entry
    /// 0. A crash between the steps leaks at most some finalized bytes or one
    /// temp page, never query correctness.
    fn promote(&self, column: Column, key: &[u8], first_block: u32, tail: Descriptor) -> Result<()> {
        let raw = self.temp.read_page(tail.offset, PAGE_SIZE)?;
        let compressed = codec::compress(&raw, self.config.compression_level)?;
        let offset = self.finalized.append(&compressed)?;

        let descriptor = Descriptor {
            kind: Kind::Final,
            offset,
            length: compressed.len() as u32,
            last_block: tail.last_block,
        };
        self.meta.put(column, key, first_block, &descriptor)?;
        self.free_list.release(self.meta.store(), tail.offset)?;

        debug!(
            ?column,
            first_block,
            last_block = tail.last_block,
            offset,
            bytes = descriptor.length,
            "promoted temp segment"
        );
        Ok(())
    }

    /// Flushes both index files to disk.
    pub fn sync(&self) -> Result<()> {
        self.temp.sync()?;
        self.finalized.sync()
    }

    /// Syncs and releases the file handles.
    pub fn close(self) -> Result<()> {
        self.sync()
    }
}

impl<S: Store> Drop for LogIndex<S> {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            warn!(error = %e, "failed to sync index files on close");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receipt::{Address, Log, Topic};
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn addr(byte: u8) -> Address {
        [byte; ADDRESS_LEN]
    }

    fn topic(byte: u8) -> Topic {
        [byte; TOPIC_LEN]
    }

    fn receipts(address: Address, topics: &[Topic]) -> Vec<Receipt> {
        vec![Receipt::new(vec![Log::new(address, topics.to_vec())])]
    }

    fn open_index(dir: &TempDir) -> LogIndex<Arc<MemoryStore>> {
        LogIndex::open(
            IndexConfig::new(dir.path()),
            Arc::new(MemoryStore::new()),
        )
        .expect("Failed to open index")
    }

    fn query(index: &LogIndex<Arc<MemoryStore>>, key: &[u8], from: u32, to: u32) -> Vec<u32> {
        index
            .get_block_numbers(key, from, to)
            .expect("Query failed")
            .collect::<Result<Vec<_>>>()
            .expect("Scan failed")
    }

    fn segments_of(
        index: &LogIndex<Arc<MemoryStore>>,
        column: Column,
        key: &[u8],
    ) -> Vec<(u32, Descriptor)> {
        index
            .meta
            .segments(column, key)
            .collect::<Result<Vec<_>>>()
            .expect("Segment scan failed")
    }

    #[test]
    fn test_single_segment_queries() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let index = open_index(&dir);
        let key = addr(0x11);

        for block in [10, 20, 30, 40, 50] {
            index
                .set_receipts(block, &receipts(key, &[]), false)
                .expect("Ingest failed");
        }

        assert_eq!(query(&index, &key, 15, 45), vec![20, 30, 40]);
        assert_eq!(query(&index, &key, 0, 5), Vec::<u32>::new());
        assert_eq!(query(&index, &key, 30, 30), vec![30]);
        assert_eq!(query(&index, &key, 0, u32::MAX), vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_promotion_boundary() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let index = open_index(&dir);
        let key = addr(0x22);

        for block in 0..PAGE_ENTRIES {
            index
                .set_receipts(block, &receipts(key, &[]), false)
                .expect("Ingest failed");
        }

        // The full page became exactly one finalized row, its page freed.
        let rows = segments_of(&index, Column::Addresses, &key);
        assert_eq!(rows.len(), 1);
        let (first_block, descriptor) = rows[0];
        assert_eq!(first_block, 0);
        assert_eq!(descriptor.kind, Kind::Final);
        assert_eq!(descriptor.last_block, PAGE_ENTRIES - 1);
        assert_eq!(index.free_list.available().expect("Available failed"), 1);

        assert_eq!(query(&index, &key, 500, 500), vec![500]);
        assert_eq!(query(&index, &key, 0, 2000).len(), 1024);
    }

    #[test]
    fn test_two_segments() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let index = open_index(&dir);
        let key = addr(0x33);

        for block in 0..=1500 {
            index
                .set_receipts(block, &receipts(key, &[]), false)
                .expect("Ingest failed");
        }

        let rows = segments_of(&index, Column::Addresses, &key);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, 0);
        assert_eq!(rows[0].1.kind, Kind::Final);
        assert_eq!(rows[1].0, 1024);
        assert_eq!(rows[1].1.kind, Kind::Temp);
        assert_eq!(rows[1].1.length, 477);
        assert_eq!(rows[1].1.last_block, 1500);

        // The range straddles the finalized/temp boundary.
        assert_eq!(query(&index, &key, 1000, 1100), (1000..=1100).collect::<Vec<_>>());
    }

    #[test]
    fn test_duplicate_ingest_is_idempotent() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let index = open_index(&dir);
        let key = addr(0x44);

        for block in [10, 20, 30, 40, 50] {
            index
                .set_receipts(block, &receipts(key, &[]), false)
                .expect("Ingest failed");
        }
        let before = segments_of(&index, Column::Addresses, &key);

        // Replays, in-order and backward, change nothing.
        index
            .set_receipts(30, &receipts(key, &[]), false)
            .expect("Ingest failed");
        index
            .set_receipts(10, &receipts(key, &[]), true)
            .expect("Ingest failed");

        assert_eq!(segments_of(&index, Column::Addresses, &key), before);
        assert_eq!(query(&index, &key, 0, 100), vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_duplicate_ingest_after_promotion() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let index = open_index(&dir);
        let key = addr(0x55);

        for block in 0..PAGE_ENTRIES {
            index
                .set_receipts(block, &receipts(key, &[]), false)
                .expect("Ingest failed");
        }

        // A replayed block must not open a fresh temp segment behind the
        // finalized run.
        index
            .set_receipts(500, &receipts(key, &[]), false)
            .expect("Ingest failed");
        let rows = segments_of(&index, Column::Addresses, &key);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.kind, Kind::Final);
        assert_eq!(query(&index, &key, 500, 500), vec![500]);
    }

    #[test]
    fn test_parallel_disjoint_keys() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let index = Arc::new(open_index(&dir));

        let mut handles = Vec::new();
        for byte in [0x01u8, 0x02, 0x03, 0x04] {
            let index = Arc::clone(&index);
            handles.push(thread::spawn(move || {
                let key = addr(byte);
                for block in 0..200 {
                    index
                        .set_receipts(block, &receipts(key, &[]), false)
                        .expect("Ingest failed");
                }
            }));
        }
        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        // Each key sees exactly its own blocks.
        for byte in [0x01u8, 0x02, 0x03, 0x04] {
            assert_eq!(
                query(&index, &addr(byte), 0, 300),
                (0..200).collect::<Vec<_>>()
            );
        }
    }

    #[test]
    fn test_unknown_key_is_empty() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let index = open_index(&dir);
        index
            .set_receipts(7, &receipts(addr(0x66), &[]), false)
            .expect("Ingest failed");

        assert_eq!(query(&index, &addr(0x99), 0, u32::MAX), Vec::<u32>::new());
        assert_eq!(query(&index, &topic(0x99), 0, u32::MAX), Vec::<u32>::new());
    }

    #[test]
    fn test_page_reuse_bounds_temp_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let index = open_index(&dir);
        let key = addr(0x77);

        // Three promotions for one key recycle a single page.
        for block in 0..3 * PAGE_ENTRIES {
            index
                .set_receipts(block, &receipts(key, &[]), false)
                .expect("Ingest failed");
        }

        assert_eq!(index.temp.size().expect("Size failed"), PAGE_SIZE as u64);
        assert_eq!(index.free_list.available().expect("Available failed"), 1);

        let rows = segments_of(&index, Column::Addresses, &key);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|(_, d)| d.kind == Kind::Final));
        assert_eq!(
            query(&index, &key, 1000, 2100),
            (1000..=2100).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_topics_share_the_engine() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let index = open_index(&dir);
        let key = addr(0x88);
        let transfer = topic(0xaa);
        let approval = topic(0xbb);

        index
            .set_receipts(100, &receipts(key, &[transfer, approval]), false)
            .expect("Ingest failed");
        index
            .set_receipts(200, &receipts(key, &[transfer]), false)
            .expect("Ingest failed");

        assert_eq!(query(&index, &key, 0, 300), vec![100, 200]);
        assert_eq!(query(&index, &transfer, 0, 300), vec![100, 200]);
        assert_eq!(query(&index, &approval, 0, 300), vec![100]);
    }

    #[test]
    fn test_keys_deduplicated_within_call() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let index = open_index(&dir);
        let key = addr(0x99);
        let shared_topic = topic(0xcc);

        // Two receipts, three logs, one address, one repeated topic: each key
        // is recorded once for the block.
        let batch = vec![
            Receipt::new(vec![
                Log::new(key, vec![shared_topic]),
                Log::new(key, vec![shared_topic]),
            ]),
            Receipt::new(vec![Log::new(key, vec![shared_topic])]),
        ];
        index.set_receipts(42, &batch, false).expect("Ingest failed");

        let rows = segments_of(&index, Column::Addresses, &key);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.length, 1);
        let rows = segments_of(&index, Column::Topics, &shared_topic);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.length, 1);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(MemoryStore::new());
        let key = addr(0xaa);

        {
            let index = LogIndex::open(IndexConfig::new(dir.path()), Arc::clone(&store))
                .expect("Failed to open index");
            for block in 0..=1100 {
                index
                    .set_receipts(block, &receipts(key, &[]), false)
                    .expect("Ingest failed");
            }
            index.close().expect("Close failed");
        }

        let index =
            LogIndex::open(IndexConfig::new(dir.path()), store).expect("Failed to reopen index");
        assert_eq!(query(&index, &key, 1020, 1030), (1020..=1030).collect::<Vec<_>>());

        // The reloaded free list keeps recycling the promoted page.
        for block in 1101..2 * PAGE_ENTRIES {
            index
                .set_receipts(block, &receipts(key, &[]), false)
                .expect("Ingest failed");
        }
        assert_eq!(index.temp.size().expect("Size failed"), PAGE_SIZE as u64);
    }

    #[test]
    fn test_invalid_key_width() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let index = open_index(&dir);
        assert!(matches!(
            index.get_block_numbers(&[0u8; 10], 0, 100),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_empty_range() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let index = open_index(&dir);
        let key = addr(0xbb);
        index
            .set_receipts(10, &receipts(key, &[]), false)
            .expect("Ingest failed");

        assert_eq!(query(&index, &key, 20, 10), Vec::<u32>::new());
    }
}
