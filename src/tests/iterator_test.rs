#[cfg(test)]
pub mod test {
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::{
        buffer::buffer_pool_manager::{BufferPoolManager, DEFAULT_REPLACER_K},
        index::hash::{
            codec::{DefaultKeyHasher, IdentityKeyHasher},
            extendible_hash_table::ExtendibleHashTable,
        },
        iterators::{
            hash_table_iterator::HashTableIterator,
            index_scan_iterator::IndexScanIterator,
            iterator::OperatorIterator,
        },
        storage::{disk::manager::DiskManager, rid::Rid},
    };

    fn pool(dir: &TempDir) -> Arc<BufferPoolManager> {
        let manager = DiskManager::new(dir.path().join("base.db")).unwrap();
        Arc::new(BufferPoolManager::new(16, manager, DEFAULT_REPLACER_K))
    }

    #[test]
    fn scan_visits_every_entry_once() {
        let dir = TempDir::new().unwrap();
        let bpm = pool(&dir);
        // Small buckets force splits, so the scan crosses shared directory
        // slots and must not double-count aliased buckets.
        let table =
            ExtendibleHashTable::<u32, u64, _>::new(bpm, IdentityKeyHasher, 0, 3, 2).unwrap();

        for key in 0..12u32 {
            assert!(table.insert(key, u64::from(key) * 3));
        }

        let mut iterator = HashTableIterator::new(&table);
        iterator.init();

        let mut seen: Vec<(u32, u64)> = std::iter::from_fn(|| iterator.next()).collect();
        seen.sort_unstable();

        let expected: Vec<(u32, u64)> =
            (0..12u32).map(|key| (key, u64::from(key) * 3)).collect();
        assert_eq!(expected, seen);
    }

    #[test]
    fn exhausted_scan_stays_done_until_init() {
        let dir = TempDir::new().unwrap();
        let bpm = pool(&dir);
        let table =
            ExtendibleHashTable::<u32, u64, _>::new(bpm, IdentityKeyHasher, 0, 2, 4).unwrap();

        for key in 0..6u32 {
            assert!(table.insert(key, u64::from(key)));
        }

        let mut iterator = HashTableIterator::new(&table);
        iterator.init();

        let mut count = 0;
        while iterator.next().is_some() {
            count += 1;
        }
        assert_eq!(6, count);
        assert!(iterator.next().is_none());
        assert!(iterator.next().is_none(), "finished stays finished");

        // init restarts the stream from the top.
        iterator.init();
        let rewound = std::iter::from_fn(|| iterator.next()).count();
        assert_eq!(6, rewound);
    }

    #[test]
    fn empty_index_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let bpm = pool(&dir);
        let table =
            ExtendibleHashTable::<u32, u64, _>::new(bpm, IdentityKeyHasher, 1, 2, 4).unwrap();

        let mut iterator = HashTableIterator::new(&table);
        iterator.init();
        assert!(iterator.next().is_none());

        // An index that drained back to empty also scans as empty.
        assert!(table.insert(3, 30));
        assert!(table.remove(&3));
        iterator.init();
        assert!(iterator.next().is_none());
    }

    #[test]
    fn scan_spans_multiple_directories() {
        let dir = TempDir::new().unwrap();
        let bpm = pool(&dir);
        // header_max_depth 1: the hash's top bit picks one of two
        // directories.
        let table =
            ExtendibleHashTable::<u32, u64, _>::new(bpm, IdentityKeyHasher, 1, 2, 4).unwrap();

        assert!(table.insert(1, 10));
        assert!(table.insert(0x8000_0001, 20));

        let mut iterator = HashTableIterator::new(&table);
        iterator.init();
        let mut seen: Vec<(u32, u64)> = std::iter::from_fn(|| iterator.next()).collect();
        seen.sort_unstable();

        assert_eq!(vec![(1, 10), (0x8000_0001, 20)], seen);
    }

    #[test]
    fn index_scan_yields_encoded_tuples() {
        let dir = TempDir::new().unwrap();
        let bpm = pool(&dir);
        let table =
            ExtendibleHashTable::<u32, Rid, _>::new(bpm, DefaultKeyHasher, 1, 4, 8).unwrap();

        for key in 0..10u32 {
            assert!(table.insert(key, Rid::new(key as i32, key)));
        }

        let mut scan = IndexScanIterator::new(&table);
        scan.init();

        let mut rows = Vec::new();
        while let Some((tuple, rid)) = scan.next() {
            assert_eq!(4, tuple.len());
            let mut key_bytes = [0u8; 4];
            key_bytes.copy_from_slice(tuple.data());
            let key = u32::from_le_bytes(key_bytes);
            assert_eq!(Rid::new(key as i32, key), rid);
            rows.push(key);
        }

        rows.sort_unstable();
        assert_eq!((0..10u32).collect::<Vec<_>>(), rows);
    }
}
