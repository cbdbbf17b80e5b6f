use crate::{
    index::hash::{
        codec::{FixedLengthCodec, KeyHasher},
        extendible_hash_table::ExtendibleHashTable,
    },
    iterators::{hash_table_iterator::HashTableIterator, iterator::OperatorIterator},
    storage::{rid::Rid, tuple::Tuple},
};

/// Executor-facing scan over a rid-valued hash index.
///
/// Adapts the raw entry stream into the `(Tuple, Rid)` shape operators
/// pull on; the tuple carries the encoded key.
pub struct IndexScanIterator<'a, K, H> {
    inner: HashTableIterator<'a, K, Rid, H>,
}

impl<'a, K, H> IndexScanIterator<'a, K, H>
where
    K: FixedLengthCodec + PartialEq + Clone,
    H: KeyHasher<K>,
{
    pub fn new(table: &'a ExtendibleHashTable<K, Rid, H>) -> Self {
        IndexScanIterator {
            inner: HashTableIterator::new(table),
        }
    }
}

impl<K, H> OperatorIterator for IndexScanIterator<'_, K, H>
where
    K: FixedLengthCodec + PartialEq + Clone,
    H: KeyHasher<K>,
{
    type Item = (Tuple, Rid);

    fn init(&mut self) {
        self.inner.init();
    }

    fn next(&mut self) -> Option<(Tuple, Rid)> {
        let (key, rid) = self.inner.next()?;
        let mut encoded = vec![0u8; K::SIZE];
        key.encode(&mut encoded);
        Some((Tuple::new(encoded), rid))
    }
}
