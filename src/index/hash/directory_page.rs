use std::{collections::HashMap, io::Cursor};

use anyhow::{ensure, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::storage::page::page::{page_constants::INVALID_PAGE_ID, PageId};

pub const HTABLE_DIRECTORY_MAX_DEPTH: u32 = 9;

const BUCKET_ARRAY_SIZE: usize = 1 << HTABLE_DIRECTORY_MAX_DEPTH;

/// Directory page of an extendible hash index.
///
/// Maps the low `global_depth` bits of a hash to a bucket page. Several
/// slots may share one bucket; a bucket's `local_depth` says how many low
/// bits its keys actually agree on. On disk:
///
/// `[max_depth: u32] [global_depth: u32]
///  [local_depths: u8 x 2^HTABLE_DIRECTORY_MAX_DEPTH]
///  [bucket_page_ids: i32 x 2^HTABLE_DIRECTORY_MAX_DEPTH]`
pub struct HashTableDirectoryPage {
    max_depth: u32,
    global_depth: u32,
    local_depths: Vec<u8>,
    bucket_page_ids: Vec<PageId>,
}

impl HashTableDirectoryPage {
    pub fn new(max_depth: u32) -> Self {
        HashTableDirectoryPage {
            max_depth: max_depth.min(HTABLE_DIRECTORY_MAX_DEPTH),
            global_depth: 0,
            local_depths: vec![0; BUCKET_ARRAY_SIZE],
            bucket_page_ids: vec![INVALID_PAGE_ID; BUCKET_ARRAY_SIZE],
        }
    }

    /// Bucket slot for a hash: its low `global_depth` bits.
    pub fn hash_to_bucket_index(&self, hash: u32) -> usize {
        (hash & self.global_depth_mask()) as usize
    }

    pub fn global_depth_mask(&self) -> u32 {
        (1u32 << self.global_depth) - 1
    }

    pub fn local_depth_mask(&self, bucket_idx: usize) -> u32 {
        (1u32 << self.local_depth(bucket_idx)) - 1
    }

    pub fn bucket_page_id(&self, bucket_idx: usize) -> PageId {
        self.bucket_page_ids[bucket_idx]
    }

    pub fn set_bucket_page_id(&mut self, bucket_idx: usize, bucket_page_id: PageId) {
        self.bucket_page_ids[bucket_idx] = bucket_page_id;
    }

    /// The index paired with `bucket_idx` under a flip of the highest
    /// in-use bit.
    pub fn split_image_index(&self, bucket_idx: usize) -> usize {
        bucket_idx ^ (1 << (self.global_depth - 1))
    }

    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn local_depth(&self, bucket_idx: usize) -> u32 {
        self.local_depths[bucket_idx] as u32
    }

    pub fn set_local_depth(&mut self, bucket_idx: usize, local_depth: u8) {
        self.local_depths[bucket_idx] = local_depth;
    }

    pub fn incr_local_depth(&mut self, bucket_idx: usize) {
        self.local_depths[bucket_idx] += 1;
    }

    pub fn decr_local_depth(&mut self, bucket_idx: usize) {
        self.local_depths[bucket_idx] -= 1;
    }

    /// Doubles the directory: every new high slot mirrors the bucket and
    /// local depth of its low counterpart.
    pub fn incr_global_depth(&mut self) {
        assert!(
            self.global_depth < self.max_depth,
            "directory already at max depth {}",
            self.max_depth
        );

        let old_size = 1usize << self.global_depth;
        for idx in old_size..old_size * 2 {
            self.bucket_page_ids[idx] = self.bucket_page_ids[idx - old_size];
            self.local_depths[idx] = self.local_depths[idx - old_size];
        }
        self.global_depth += 1;
    }

    pub fn decr_global_depth(&mut self) {
        assert!(self.global_depth > 0, "directory already at depth 0");
        self.global_depth -= 1;
    }

    /// A directory can halve when no bucket uses all `global_depth` bits.
    /// Only the live prefix of the arrays counts.
    pub fn can_shrink(&self) -> bool {
        if self.global_depth == 0 {
            return false;
        }
        self.local_depths[..self.size()]
            .iter()
            .all(|&local_depth| (local_depth as u32) < self.global_depth)
    }

    /// Number of addressable slots, `2^global_depth`.
    pub fn size(&self) -> usize {
        1 << self.global_depth
    }

    pub fn max_size(&self) -> usize {
        1 << self.max_depth
    }

    /// Asserts the structural invariants over the live slots: local depths
    /// never exceed the global depth, all slots sharing a bucket agree on
    /// its local depth, and each bucket owns exactly
    /// `2^(global_depth - local_depth)` slots.
    pub fn verify_integrity(&self) {
        let mut owners: HashMap<PageId, (u32, u32)> = HashMap::new();

        for idx in 0..self.size() {
            let local_depth = self.local_depth(idx);
            assert!(
                local_depth <= self.global_depth,
                "slot {} local depth {} exceeds global depth {}",
                idx,
                local_depth,
                self.global_depth
            );

            let page_id = self.bucket_page_id(idx);
            if page_id == INVALID_PAGE_ID {
                continue;
            }

            let entry = owners.entry(page_id).or_insert((local_depth, 0));
            assert_eq!(
                entry.0, local_depth,
                "bucket {} referenced with local depths {} and {}",
                page_id, entry.0, local_depth
            );
            entry.1 += 1;
        }

        for (page_id, (local_depth, count)) in owners {
            let expected = 1u32 << (self.global_depth - local_depth);
            assert_eq!(
                count, expected,
                "bucket {} owned by {} slots, expected {}",
                page_id, count, expected
            );
        }
    }

    pub fn encode(&self, page: &mut [u8]) {
        let mut cursor = Cursor::new(page);

        cursor.write_u32::<LittleEndian>(self.max_depth).unwrap();
        cursor.write_u32::<LittleEndian>(self.global_depth).unwrap();
        for &local_depth in &self.local_depths {
            cursor.write_u8(local_depth).unwrap();
        }
        for &page_id in &self.bucket_page_ids {
            cursor.write_i32::<LittleEndian>(page_id).unwrap();
        }
    }

    pub fn decode(page: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(page);

        let max_depth = cursor.read_u32::<LittleEndian>()?;
        ensure!(
            max_depth <= HTABLE_DIRECTORY_MAX_DEPTH,
            "directory max depth {} out of range",
            max_depth
        );
        let global_depth = cursor.read_u32::<LittleEndian>()?;
        ensure!(
            global_depth <= max_depth,
            "global depth {} exceeds max depth {}",
            global_depth,
            max_depth
        );

        let mut local_depths = vec![0u8; BUCKET_ARRAY_SIZE];
        for depth in local_depths.iter_mut() {
            *depth = cursor.read_u8()?;
        }
        let mut bucket_page_ids = Vec::with_capacity(BUCKET_ARRAY_SIZE);
        for _ in 0..BUCKET_ARRAY_SIZE {
            bucket_page_ids.push(cursor.read_i32::<LittleEndian>()?);
        }

        Ok(HashTableDirectoryPage {
            max_depth,
            global_depth,
            local_depths,
            bucket_page_ids,
        })
    }
}
