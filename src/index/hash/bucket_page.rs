use std::io::Cursor;

use anyhow::{ensure, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::{
    index::hash::codec::FixedLengthCodec,
    storage::page::page::page_constants::PAGE_SIZE,
};

pub const BUCKET_PAGE_HEADER_SIZE: usize = 8;

/// Largest number of `(K, V)` entries one bucket page can carry.
pub fn bucket_array_size<K: FixedLengthCodec, V: FixedLengthCodec>() -> usize {
    (PAGE_SIZE - BUCKET_PAGE_HEADER_SIZE) / (K::SIZE + V::SIZE)
}

/// Leaf page of an extendible hash index: a flat array of key/value pairs
/// with no duplicate keys. On disk:
///
/// `[size: u32] [max_size: u32] [entries: (K, V) x size]`
pub struct HashTableBucketPage<K, V> {
    max_size: u32,
    entries: Vec<(K, V)>,
}

impl<K, V> HashTableBucketPage<K, V>
where
    K: FixedLengthCodec + PartialEq + Clone,
    V: FixedLengthCodec + Clone,
{
    pub fn new(max_size: u32) -> Self {
        let capacity = bucket_array_size::<K, V>() as u32;
        HashTableBucketPage {
            max_size: max_size.min(capacity),
            entries: Vec::new(),
        }
    }

    pub fn lookup(&self, key: &K) -> Option<V> {
        self.entries
            .iter()
            .find(|(entry_key, _)| entry_key == key)
            .map(|(_, value)| value.clone())
    }

    /// Fails on a duplicate key or a full bucket.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        if self.is_full() || self.lookup(&key).is_some() {
            return false;
        }
        self.entries.push((key, value));
        true
    }

    pub fn remove(&mut self, key: &K) -> bool {
        match self.entries.iter().position(|(entry_key, _)| entry_key == key) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Removes and returns every entry whose key matches the predicate.
    /// Used by bucket splits to peel off the high half.
    pub fn drain_entries<F>(&mut self, mut pred: F) -> Vec<(K, V)>
    where
        F: FnMut(&K) -> bool,
    {
        let mut moved = Vec::new();
        let mut idx = 0;
        while idx < self.entries.len() {
            if pred(&self.entries[idx].0) {
                moved.push(self.entries.remove(idx));
            } else {
                idx += 1;
            }
        }
        moved
    }

    pub fn key_at(&self, idx: usize) -> &K {
        &self.entries[idx].0
    }

    pub fn value_at(&self, idx: usize) -> &V {
        &self.entries[idx].1
    }

    pub fn entry_at(&self, idx: usize) -> &(K, V) {
        &self.entries[idx]
    }

    pub fn entries(&self) -> &[(K, V)] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<(K, V)> {
        self.entries
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() as u32 >= self.max_size
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn encode(&self, page: &mut [u8]) {
        let mut cursor = Cursor::new(page);

        cursor
            .write_u32::<LittleEndian>(self.entries.len() as u32)
            .unwrap();
        cursor.write_u32::<LittleEndian>(self.max_size).unwrap();

        let mut offset = BUCKET_PAGE_HEADER_SIZE;
        let page = cursor.into_inner();
        for (key, value) in &self.entries {
            key.encode(&mut page[offset..offset + K::SIZE]);
            offset += K::SIZE;
            value.encode(&mut page[offset..offset + V::SIZE]);
            offset += V::SIZE;
        }
    }

    pub fn decode(page: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(page);

        let size = cursor.read_u32::<LittleEndian>()? as usize;
        let max_size = cursor.read_u32::<LittleEndian>()?;

        let capacity = bucket_array_size::<K, V>();
        ensure!(
            max_size as usize <= capacity,
            "bucket max size {} exceeds page capacity {}",
            max_size,
            capacity
        );
        ensure!(
            size <= max_size as usize,
            "bucket size {} exceeds max size {}",
            size,
            max_size
        );

        let mut entries = Vec::with_capacity(size);
        let mut offset = BUCKET_PAGE_HEADER_SIZE;
        for _ in 0..size {
            let key = K::decode(&page[offset..offset + K::SIZE]);
            offset += K::SIZE;
            let value = V::decode(&page[offset..offset + V::SIZE]);
            offset += V::SIZE;
            entries.push((key, value));
        }

        Ok(HashTableBucketPage { max_size, entries })
    }
}
