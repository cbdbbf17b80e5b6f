use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use byteorder::{ByteOrder, LittleEndian};

use crate::storage::rid::Rid;

/// Fixed-width binary encoding for keys and values stored in hash index
/// pages. Widths are compile-time constants so bucket capacity can be
/// derived from the page envelope.
pub trait FixedLengthCodec: Sized {
    const SIZE: usize;

    fn encode(&self, buf: &mut [u8]);
    fn decode(buf: &[u8]) -> Self;
}

impl FixedLengthCodec for i32 {
    const SIZE: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_i32(buf)
    }
}

impl FixedLengthCodec for u32 {
    const SIZE: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_u32(buf)
    }
}

impl FixedLengthCodec for i64 {
    const SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i64(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_i64(buf)
    }
}

impl FixedLengthCodec for u64 {
    const SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_u64(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_u64(buf)
    }
}

impl FixedLengthCodec for Rid {
    const SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(buf, self.page_id);
        LittleEndian::write_u32(&mut buf[4..], self.slot_num);
    }

    fn decode(buf: &[u8]) -> Self {
        Rid {
            page_id: LittleEndian::read_i32(buf),
            slot_num: LittleEndian::read_u32(&buf[4..]),
        }
    }
}

/// Hash function stored by value inside the index. The top bits of the
/// result address the header, the low bits the directory, so the full
/// 32-bit range matters.
pub trait KeyHasher<K> {
    fn hash_key(&self, key: &K) -> u32;
}

/// Folds the standard library's 64-bit hash down to 32 bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyHasher;

impl<K: Hash> KeyHasher<K> for DefaultKeyHasher {
    fn hash_key(&self, key: &K) -> u32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let hash = hasher.finish();
        (hash ^ (hash >> 32)) as u32
    }
}

/// Uses the key's own bits as the hash. Gives callers (and tests) exact
/// control over directory and bucket placement.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityKeyHasher;

impl KeyHasher<u32> for IdentityKeyHasher {
    fn hash_key(&self, key: &u32) -> u32 {
        *key
    }
}

impl KeyHasher<i32> for IdentityKeyHasher {
    fn hash_key(&self, key: &i32) -> u32 {
        *key as u32
    }
}
