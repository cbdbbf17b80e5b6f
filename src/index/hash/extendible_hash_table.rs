use std::{marker::PhantomData, sync::Arc};

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::{
    buffer::buffer_pool_manager::BufferPoolManager,
    index::hash::{
        bucket_page::HashTableBucketPage,
        codec::{FixedLengthCodec, KeyHasher},
        directory_page::HashTableDirectoryPage,
        header_page::HashTableHeaderPage,
    },
    storage::page::{
        page::{page_constants::INVALID_PAGE_ID, PageId},
        page_guard::WritePageGuard,
    },
};

/// Disk-backed extendible hash index over the buffer pool.
///
/// A three-level page hierarchy: one header page routes the top hash bits
/// to directory pages, each directory routes the low bits to bucket pages.
/// Keys are unique. Buckets split on overflow (doubling the directory when
/// a bucket already uses every addressed bit) and empty buckets merge with
/// their split sibling on remove, shrinking the directory when possible.
///
/// Lookups crab read guards down the hierarchy, releasing each level once
/// the next is pinned. Inserts and removes hold the directory's write
/// guard across any structural change.
pub struct ExtendibleHashTable<K, V, H> {
    bpm: Arc<BufferPoolManager>,
    hasher: H,
    header_page_id: PageId,
    directory_max_depth: u32,
    bucket_max_size: u32,
    _marker: PhantomData<(K, V)>,
}

impl<K, V, H> ExtendibleHashTable<K, V, H>
where
    K: FixedLengthCodec + PartialEq + Clone,
    V: FixedLengthCodec + Clone,
    H: KeyHasher<K>,
{
    /// Creates the index and its header page. Directory and bucket pages
    /// are allocated lazily on first insert.
    pub fn new(
        bpm: Arc<BufferPoolManager>,
        hasher: H,
        header_max_depth: u32,
        directory_max_depth: u32,
        bucket_max_size: u32,
    ) -> Result<Self> {
        let header_guard = bpm
            .new_page()
            .context("allocating hash table header page")?;
        let header_page_id = header_guard.page_id();

        let mut header_guard = header_guard.upgrade_write();
        let header = HashTableHeaderPage::new(header_max_depth);
        header.encode(header_guard.data_mut());
        drop(header_guard);

        Ok(ExtendibleHashTable {
            bpm,
            hasher,
            header_page_id,
            directory_max_depth,
            bucket_max_size,
            _marker: PhantomData,
        })
    }

    /// Attaches to an index whose header page already exists, e.g. after
    /// reopening the page file. The depth and size parameters only shape
    /// directories and buckets created from here on; existing pages carry
    /// their own.
    pub fn open(
        bpm: Arc<BufferPoolManager>,
        hasher: H,
        header_page_id: PageId,
        directory_max_depth: u32,
        bucket_max_size: u32,
    ) -> Self {
        ExtendibleHashTable {
            bpm,
            hasher,
            header_page_id,
            directory_max_depth,
            bucket_max_size,
            _marker: PhantomData,
        }
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    pub fn buffer_pool(&self) -> &BufferPoolManager {
        &self.bpm
    }

    /// Point lookup. `None` covers both a missing key and a missing page
    /// anywhere along the path.
    pub fn get_value(&self, key: &K) -> Option<V> {
        let hash = self.hasher.hash_key(key);

        let header_guard = self.bpm.read_page(self.header_page_id)?;
        let header = HashTableHeaderPage::decode(header_guard.data()).ok()?;
        let directory_page_id =
            header.directory_page_id(header.hash_to_directory_index(hash));
        if directory_page_id == INVALID_PAGE_ID {
            return None;
        }

        let directory_guard = self.bpm.read_page(directory_page_id)?;
        drop(header_guard);
        let directory = HashTableDirectoryPage::decode(directory_guard.data()).ok()?;
        let bucket_page_id =
            directory.bucket_page_id(directory.hash_to_bucket_index(hash));
        if bucket_page_id == INVALID_PAGE_ID {
            return None;
        }

        let bucket_guard = self.bpm.read_page(bucket_page_id)?;
        drop(directory_guard);
        let bucket = HashTableBucketPage::<K, V>::decode(bucket_guard.data()).ok()?;
        bucket.lookup(key)
    }

    /// Inserts a unique key. `false` on a duplicate, on an index that has
    /// hit `directory_max_depth` with a full bucket, or when the pool
    /// cannot supply a page.
    pub fn insert(&self, key: K, value: V) -> bool {
        let hash = self.hasher.hash_key(&key);

        let mut header_guard = match self.bpm.write_page(self.header_page_id) {
            Some(guard) => guard,
            None => return false,
        };
        let mut header = match HashTableHeaderPage::decode(header_guard.data()) {
            Ok(header) => header,
            Err(err) => {
                warn!("corrupt header page {}: {err:#}", self.header_page_id);
                return false;
            }
        };

        let directory_idx = header.hash_to_directory_index(hash);
        let directory_page_id = header.directory_page_id(directory_idx);

        if directory_page_id == INVALID_PAGE_ID {
            return self.insert_to_new_directory(
                &mut header_guard,
                &mut header,
                directory_idx,
                hash,
                key,
                value,
            );
        }

        let directory_guard = match self.bpm.write_page(directory_page_id) {
            Some(guard) => guard,
            None => return false,
        };
        drop(header_guard);

        self.insert_into_directory(directory_guard, hash, key, value)
    }

    /// Removes the key, then merges empty buckets upward and shrinks the
    /// directory as far as the local depths allow.
    pub fn remove(&self, key: &K) -> bool {
        let hash = self.hasher.hash_key(key);

        let header_guard = match self.bpm.read_page(self.header_page_id) {
            Some(guard) => guard,
            None => return false,
        };
        let header = match HashTableHeaderPage::decode(header_guard.data()) {
            Ok(header) => header,
            Err(err) => {
                warn!("corrupt header page {}: {err:#}", self.header_page_id);
                return false;
            }
        };
        let directory_page_id =
            header.directory_page_id(header.hash_to_directory_index(hash));
        if directory_page_id == INVALID_PAGE_ID {
            return false;
        }

        let mut directory_guard = match self.bpm.write_page(directory_page_id) {
            Some(guard) => guard,
            None => return false,
        };
        drop(header_guard);
        let mut directory = match HashTableDirectoryPage::decode(directory_guard.data()) {
            Ok(directory) => directory,
            Err(err) => {
                warn!("corrupt directory page {}: {err:#}", directory_page_id);
                return false;
            }
        };

        let bucket_idx = directory.hash_to_bucket_index(hash);
        let bucket_page_id = directory.bucket_page_id(bucket_idx);
        if bucket_page_id == INVALID_PAGE_ID {
            return false;
        }

        {
            let mut bucket_guard = match self.bpm.write_page(bucket_page_id) {
                Some(guard) => guard,
                None => return false,
            };
            let mut bucket =
                match HashTableBucketPage::<K, V>::decode(bucket_guard.data()) {
                    Ok(bucket) => bucket,
                    Err(err) => {
                        warn!("corrupt bucket page {}: {err:#}", bucket_page_id);
                        return false;
                    }
                };
            if !bucket.remove(key) {
                return false;
            }
            bucket.encode(bucket_guard.data_mut());
        }

        self.merge_after_remove(&mut directory, bucket_idx);
        while directory.can_shrink() {
            directory.decr_global_depth();
        }
        directory.encode(directory_guard.data_mut());
        true
    }

    /// Walks every reachable directory and asserts its structural
    /// invariants, plus the bucket placement invariant: each stored key
    /// hashes into the slot group of the bucket holding it.
    pub fn verify_integrity(&self) {
        let header_guard = self.bpm.read_page(self.header_page_id).expect("header");
        let header = HashTableHeaderPage::decode(header_guard.data()).expect("header codec");

        for directory_idx in 0..header.max_size() {
            let directory_page_id = header.directory_page_id(directory_idx);
            if directory_page_id == INVALID_PAGE_ID {
                continue;
            }

            let directory_guard = self.bpm.read_page(directory_page_id).expect("directory");
            let directory =
                HashTableDirectoryPage::decode(directory_guard.data()).expect("directory codec");
            directory.verify_integrity();

            for bucket_idx in 0..directory.size() {
                let bucket_page_id = directory.bucket_page_id(bucket_idx);
                if bucket_page_id == INVALID_PAGE_ID {
                    continue;
                }
                let local_mask = directory.local_depth_mask(bucket_idx);
                if bucket_idx as u32 & local_mask != bucket_idx as u32 {
                    // Not the canonical slot for this bucket; skip the
                    // duplicate visit.
                    continue;
                }

                let bucket_guard = self.bpm.read_page(bucket_page_id).expect("bucket");
                let bucket = HashTableBucketPage::<K, V>::decode(bucket_guard.data())
                    .expect("bucket codec");
                for (key, _) in bucket.entries() {
                    let hash = self.hasher.hash_key(key);
                    assert_eq!(
                        hash & local_mask,
                        bucket_idx as u32 & local_mask,
                        "key hashed to {:#x} stored in bucket slot {}",
                        hash,
                        bucket_idx
                    );
                }
            }
        }
    }

    fn insert_to_new_directory(
        &self,
        header_guard: &mut WritePageGuard<'_>,
        header: &mut HashTableHeaderPage,
        directory_idx: usize,
        hash: u32,
        key: K,
        value: V,
    ) -> bool {
        let directory_guard = match self.bpm.new_page() {
            Some(guard) => guard,
            None => return false,
        };
        let directory_page_id = directory_guard.page_id();
        let mut directory_guard = directory_guard.upgrade_write();
        let mut directory = HashTableDirectoryPage::new(self.directory_max_depth);

        let bucket_guard = match self.bpm.new_page() {
            Some(guard) => guard,
            None => return false,
        };
        let bucket_page_id = bucket_guard.page_id();
        let mut bucket_guard = bucket_guard.upgrade_write();
        let mut bucket = HashTableBucketPage::<K, V>::new(self.bucket_max_size);

        let bucket_idx = directory.hash_to_bucket_index(hash);
        directory.set_bucket_page_id(bucket_idx, bucket_page_id);
        directory.set_local_depth(bucket_idx, 0);

        let inserted = bucket.insert(key, value);

        bucket.encode(bucket_guard.data_mut());
        directory.encode(directory_guard.data_mut());
        header.set_directory_page_id(directory_idx, directory_page_id);
        header.encode(header_guard.data_mut());

        debug!(
            "new directory {} (bucket {}) for header slot {}",
            directory_page_id, bucket_page_id, directory_idx
        );
        inserted
    }

    /// The insert proper, retried in place after each split. The directory
    /// write guard is held for the whole loop; bucket guards live one
    /// iteration.
    fn insert_into_directory(
        &self,
        mut directory_guard: WritePageGuard<'_>,
        hash: u32,
        key: K,
        value: V,
    ) -> bool {
        let mut directory = match HashTableDirectoryPage::decode(directory_guard.data()) {
            Ok(directory) => directory,
            Err(err) => {
                warn!("corrupt directory page {}: {err:#}", directory_guard.page_id());
                return false;
            }
        };

        loop {
            let bucket_idx = directory.hash_to_bucket_index(hash);
            let bucket_page_id = directory.bucket_page_id(bucket_idx);

            if bucket_page_id == INVALID_PAGE_ID {
                return self.insert_to_new_bucket(
                    &mut directory_guard,
                    &mut directory,
                    bucket_idx,
                    key,
                    value,
                );
            }

            let mut bucket_guard = match self.bpm.write_page(bucket_page_id) {
                Some(guard) => guard,
                None => return false,
            };
            let mut bucket =
                match HashTableBucketPage::<K, V>::decode(bucket_guard.data()) {
                    Ok(bucket) => bucket,
                    Err(err) => {
                        warn!("corrupt bucket page {}: {err:#}", bucket_page_id);
                        return false;
                    }
                };

            if bucket.lookup(&key).is_some() {
                return false;
            }

            if !bucket.is_full() {
                let inserted = bucket.insert(key, value);
                bucket.encode(bucket_guard.data_mut());
                return inserted;
            }

            // Split. The new entry retries on the next iteration; it may
            // land in a group that must split again.
            let local_depth = directory.local_depth(bucket_idx);
            if local_depth == directory.global_depth() {
                if directory.global_depth() == directory.max_depth() {
                    debug!(
                        "insert rejected: directory {} full at depth {}",
                        directory_guard.page_id(),
                        directory.max_depth()
                    );
                    return false;
                }
                directory.incr_global_depth();
            }

            let new_bucket_guard = match self.bpm.new_page() {
                Some(guard) => guard,
                None => return false,
            };
            let new_bucket_page_id = new_bucket_guard.page_id();
            let mut new_bucket_guard = new_bucket_guard.upgrade_write();
            let mut new_bucket = HashTableBucketPage::<K, V>::new(self.bucket_max_size);

            // Every slot agreeing with the bucket on its low `local_depth`
            // bits deepens by one; the high half points at the new bucket.
            let low_mask = (1u32 << local_depth) - 1;
            let canonical = bucket_idx as u32 & low_mask;
            for idx in 0..directory.size() {
                if idx as u32 & low_mask != canonical {
                    continue;
                }
                directory.set_local_depth(idx, (local_depth + 1) as u8);
                if (idx >> local_depth) & 1 == 1 {
                    directory.set_bucket_page_id(idx, new_bucket_page_id);
                }
            }

            let moved =
                bucket.drain_entries(|k| (self.hasher.hash_key(k) >> local_depth) & 1 == 1);
            for (moved_key, moved_value) in moved {
                new_bucket.insert(moved_key, moved_value);
            }

            bucket.encode(bucket_guard.data_mut());
            new_bucket.encode(new_bucket_guard.data_mut());
            directory.encode(directory_guard.data_mut());

            debug!(
                "split bucket {} into {} at local depth {}",
                bucket_page_id,
                new_bucket_page_id,
                local_depth + 1
            );
        }
    }

    fn insert_to_new_bucket(
        &self,
        directory_guard: &mut WritePageGuard<'_>,
        directory: &mut HashTableDirectoryPage,
        bucket_idx: usize,
        key: K,
        value: V,
    ) -> bool {
        let bucket_guard = match self.bpm.new_page() {
            Some(guard) => guard,
            None => return false,
        };
        let bucket_page_id = bucket_guard.page_id();
        let mut bucket_guard = bucket_guard.upgrade_write();

        let mut bucket = HashTableBucketPage::<K, V>::new(self.bucket_max_size);
        let inserted = bucket.insert(key, value);
        bucket.encode(bucket_guard.data_mut());

        directory.set_bucket_page_id(bucket_idx, bucket_page_id);
        directory.set_local_depth(bucket_idx, directory.global_depth() as u8);
        directory.encode(directory_guard.data_mut());

        inserted
    }

    /// Coalesces empty buckets with their split siblings. Works in place
    /// on the decoded directory; the caller re-encodes it.
    fn merge_after_remove(&self, directory: &mut HashTableDirectoryPage, bucket_idx: usize) {
        let mut check_idx = bucket_idx;
        let mut check_page_id = directory.bucket_page_id(check_idx);

        loop {
            let local_depth = directory.local_depth(check_idx);
            if local_depth == 0 {
                break;
            }

            let sibling_idx = check_idx ^ (1usize << (local_depth - 1));
            if directory.local_depth(sibling_idx) != local_depth {
                break;
            }
            let sibling_page_id = directory.bucket_page_id(sibling_idx);
            if sibling_page_id == INVALID_PAGE_ID || sibling_page_id == check_page_id {
                break;
            }

            let check_empty = match self.bucket_is_empty(check_page_id) {
                Some(empty) => empty,
                None => break,
            };
            let sibling_empty = match self.bucket_is_empty(sibling_page_id) {
                Some(empty) => empty,
                None => break,
            };
            if !check_empty && !sibling_empty {
                break;
            }

            let (dead, survivor) = if check_empty {
                (check_page_id, sibling_page_id)
            } else {
                (sibling_page_id, check_page_id)
            };

            if !self.bpm.delete_page(dead) {
                warn!("could not delete empty bucket page {}", dead);
                break;
            }

            let new_local_depth = local_depth - 1;
            let mask = (1usize << new_local_depth) - 1;
            let canonical = check_idx & mask;
            for idx in 0..directory.size() {
                if idx & mask == canonical {
                    directory.set_bucket_page_id(idx, survivor);
                    directory.set_local_depth(idx, new_local_depth as u8);
                }
            }

            debug!(
                "merged bucket {} into {} at local depth {}",
                dead, survivor, new_local_depth
            );
            check_idx = canonical;
            check_page_id = survivor;
        }
    }

    fn bucket_is_empty(&self, bucket_page_id: PageId) -> Option<bool> {
        let bucket_guard = self.bpm.read_page(bucket_page_id)?;
        let bucket = HashTableBucketPage::<K, V>::decode(bucket_guard.data()).ok()?;
        Some(bucket.is_empty())
    }
}
