use std::io::Cursor;

use anyhow::{ensure, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::storage::page::page::{page_constants::INVALID_PAGE_ID, PageId};

pub const HTABLE_HEADER_MAX_DEPTH: u32 = 9;

const DIRECTORY_ARRAY_SIZE: usize = 1 << HTABLE_HEADER_MAX_DEPTH;

/// Root page of an extendible hash index.
///
/// Routes the top `max_depth` bits of a hash to one of up to
/// `2^max_depth` directory pages. On disk:
///
/// `[max_depth: u32] [directory_page_ids: i32 x 2^HTABLE_HEADER_MAX_DEPTH]`
///
/// The id array is always serialized at its maximum length; `max_depth`
/// bounds how much of it is addressable.
pub struct HashTableHeaderPage {
    max_depth: u32,
    directory_page_ids: Vec<PageId>,
}

impl HashTableHeaderPage {
    pub fn new(max_depth: u32) -> Self {
        HashTableHeaderPage {
            max_depth: max_depth.min(HTABLE_HEADER_MAX_DEPTH),
            directory_page_ids: vec![INVALID_PAGE_ID; DIRECTORY_ARRAY_SIZE],
        }
    }

    /// Directory slot for a hash: its top `max_depth` bits.
    pub fn hash_to_directory_index(&self, hash: u32) -> usize {
        if self.max_depth == 0 {
            return 0;
        }
        (hash >> (32 - self.max_depth)) as usize
    }

    pub fn directory_page_id(&self, directory_idx: usize) -> PageId {
        self.directory_page_ids[directory_idx]
    }

    pub fn set_directory_page_id(&mut self, directory_idx: usize, page_id: PageId) {
        self.directory_page_ids[directory_idx] = page_id;
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn max_size(&self) -> usize {
        1 << self.max_depth
    }

    pub fn encode(&self, page: &mut [u8]) {
        let mut cursor = Cursor::new(page);

        cursor.write_u32::<LittleEndian>(self.max_depth).unwrap();
        for &page_id in &self.directory_page_ids {
            cursor.write_i32::<LittleEndian>(page_id).unwrap();
        }
    }

    pub fn decode(page: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(page);

        let max_depth = cursor.read_u32::<LittleEndian>()?;
        ensure!(
            max_depth <= HTABLE_HEADER_MAX_DEPTH,
            "header max depth {} out of range",
            max_depth
        );

        let mut directory_page_ids = Vec::with_capacity(DIRECTORY_ARRAY_SIZE);
        for _ in 0..DIRECTORY_ARRAY_SIZE {
            directory_page_ids.push(cursor.read_i32::<LittleEndian>()?);
        }

        Ok(HashTableHeaderPage {
            max_depth,
            directory_page_ids,
        })
    }
}
