use std::collections::VecDeque;

use crate::{
    index::hash::{
        bucket_page::HashTableBucketPage,
        codec::{FixedLengthCodec, KeyHasher},
        directory_page::HashTableDirectoryPage,
        extendible_hash_table::ExtendibleHashTable,
        header_page::HashTableHeaderPage,
    },
    iterators::iterator::OperatorIterator,
    storage::page::page::page_constants::INVALID_PAGE_ID,
};

/// Full scan over every entry of an extendible hash index.
///
/// Walks header slots in order, and within each directory visits each
/// bucket once through its canonical slot (the one whose index equals its
/// own low `local_depth` bits). One bucket is buffered at a time; page
/// guards are released between `next` calls, so the scan never blocks
/// writers for longer than a single bucket read.
pub struct HashTableIterator<'a, K, V, H> {
    table: &'a ExtendibleHashTable<K, V, H>,
    directory_cursor: usize,
    bucket_cursor: usize,
    pending: VecDeque<(K, V)>,
    exhausted: bool,
}

impl<'a, K, V, H> HashTableIterator<'a, K, V, H>
where
    K: FixedLengthCodec + PartialEq + Clone,
    V: FixedLengthCodec + Clone,
    H: KeyHasher<K>,
{
    pub fn new(table: &'a ExtendibleHashTable<K, V, H>) -> Self {
        HashTableIterator {
            table,
            directory_cursor: 0,
            bucket_cursor: 0,
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Buffers the next non-empty bucket. `false` once every directory is
    /// walked.
    fn refill(&mut self) -> bool {
        let bpm = self.table.buffer_pool();

        let header_guard = match bpm.read_page(self.table.header_page_id()) {
            Some(guard) => guard,
            None => return false,
        };
        let header = match HashTableHeaderPage::decode(header_guard.data()) {
            Ok(header) => header,
            Err(_) => return false,
        };

        while self.directory_cursor < header.max_size() {
            let directory_page_id = header.directory_page_id(self.directory_cursor);
            if directory_page_id == INVALID_PAGE_ID {
                self.directory_cursor += 1;
                self.bucket_cursor = 0;
                continue;
            }

            let directory_guard = match bpm.read_page(directory_page_id) {
                Some(guard) => guard,
                None => return false,
            };
            let directory = match HashTableDirectoryPage::decode(directory_guard.data()) {
                Ok(directory) => directory,
                Err(_) => return false,
            };

            while self.bucket_cursor < directory.size() {
                let bucket_idx = self.bucket_cursor;
                self.bucket_cursor += 1;

                let bucket_page_id = directory.bucket_page_id(bucket_idx);
                if bucket_page_id == INVALID_PAGE_ID {
                    continue;
                }
                let local_mask = directory.local_depth_mask(bucket_idx) as usize;
                if bucket_idx & local_mask != bucket_idx {
                    // A non-canonical alias of a bucket already visited.
                    continue;
                }

                let bucket_guard = match bpm.read_page(bucket_page_id) {
                    Some(guard) => guard,
                    None => return false,
                };
                let bucket =
                    match HashTableBucketPage::<K, V>::decode(bucket_guard.data()) {
                        Ok(bucket) => bucket,
                        Err(_) => return false,
                    };
                if bucket.is_empty() {
                    continue;
                }

                self.pending.extend(bucket.into_entries());
                return true;
            }

            self.directory_cursor += 1;
            self.bucket_cursor = 0;
        }

        false
    }
}

impl<K, V, H> OperatorIterator for HashTableIterator<'_, K, V, H>
where
    K: FixedLengthCodec + PartialEq + Clone,
    V: FixedLengthCodec + Clone,
    H: KeyHasher<K>,
{
    type Item = (K, V);

    fn init(&mut self) {
        self.directory_cursor = 0;
        self.bucket_cursor = 0;
        self.pending.clear();
        self.exhausted = false;
    }

    fn next(&mut self) -> Option<(K, V)> {
        if self.exhausted {
            return None;
        }
        loop {
            if let Some(entry) = self.pending.pop_front() {
                return Some(entry);
            }
            if !self.refill() {
                self.exhausted = true;
                return None;
            }
        }
    }
}
