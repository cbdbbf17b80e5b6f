#[cfg(test)]
pub mod test {
    use rand::{seq::SliceRandom, thread_rng, Rng};
    use tempfile::TempDir;

    use crate::{
        buffer::buffer_pool_manager::{BufferPoolManager, DEFAULT_REPLACER_K},
        storage::{disk::manager::DiskManager, page::page::page_constants::PAGE_SIZE},
    };

    fn pool(dir: &TempDir, pool_size: usize) -> BufferPoolManager {
        let manager = DiskManager::new(dir.path().join("base.db")).unwrap();
        BufferPoolManager::new(pool_size, manager, DEFAULT_REPLACER_K)
    }

    #[test]
    fn churn_evicts_and_reloads() {
        let dir = TempDir::new().unwrap();
        let bpm = pool(&dir, 3);

        {
            let page_zero = bpm.new_page().unwrap();
            let page_one = bpm.new_page().unwrap();
            let page_two = bpm.new_page().unwrap();
            assert_eq!(0, page_zero.page_id());
            assert_eq!(1, page_one.page_id());
            assert_eq!(2, page_two.page_id());
        } // all three unpinned clean

        // Pool is full; the next allocation evicts the LRU-K victim.
        let page_three = bpm.new_page().unwrap();
        assert_eq!(3, page_three.page_id());
        drop(page_three);

        // Page 0 left the pool, so this is a disk read. It was never
        // mutated, so it comes back as zeros.
        let guard = bpm.read_page(0).unwrap();
        assert!(guard.data().iter().all(|&byte| byte == 0));
    }

    #[test]
    fn pinned_page_survives_allocation_pressure() {
        let dir = TempDir::new().unwrap();
        let bpm = pool(&dir, 1);

        let seed = bpm.new_page().unwrap();
        let page_id = seed.page_id();
        drop(seed);

        let pinned = bpm.fetch_page_basic(page_id).unwrap();
        assert!(bpm.new_page().is_none(), "pool exhausted must not evict a pin");

        drop(pinned);
        assert!(bpm.new_page().is_some());
    }

    #[test]
    fn dirty_page_written_back_on_eviction() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("base.db");
        let manager = DiskManager::new(&path).unwrap();
        let bpm = BufferPoolManager::new(1, manager, DEFAULT_REPLACER_K);

        let victim_id = {
            let guard = bpm.new_page().unwrap();
            let page_id = guard.page_id();
            let mut guard = guard.upgrade_write();
            guard.data_mut().fill(0xAB);
            page_id
        };

        // Single frame: this allocation evicts the dirty page and must
        // write it out before reading anything else.
        let next = bpm.new_page().unwrap();
        drop(next);

        let mut checker = DiskManager::new(&path).unwrap();
        let mut buffer = [0u8; PAGE_SIZE];
        checker.read_page(victim_id, &mut buffer).unwrap();
        assert_eq!([0xAB; PAGE_SIZE], buffer);
    }

    #[test]
    fn dirty_bit_is_sticky_across_clean_unpins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("base.db");
        let manager = DiskManager::new(&path).unwrap();
        let bpm = BufferPoolManager::new(1, manager, DEFAULT_REPLACER_K);

        let page_id = {
            let guard = bpm.new_page().unwrap();
            let page_id = guard.page_id();
            let mut guard = guard.upgrade_write();
            guard.data_mut().fill(0xCD);
            page_id
        };

        // A read guard unpins clean; that must not erase the earlier
        // dirty unpin.
        drop(bpm.read_page(page_id).unwrap());

        let next = bpm.new_page().unwrap();
        drop(next);

        let mut checker = DiskManager::new(&path).unwrap();
        let mut buffer = [0u8; PAGE_SIZE];
        checker.read_page(page_id, &mut buffer).unwrap();
        assert_eq!([0xCD; PAGE_SIZE], buffer);
    }

    #[test]
    fn fetch_rejects_invalid_ids() {
        let dir = TempDir::new().unwrap();
        let bpm = pool(&dir, 2);

        assert!(bpm.fetch_page_basic(-1).is_none());
        assert!(bpm.fetch_page_basic(0).is_none(), "page 0 not allocated yet");

        let guard = bpm.new_page().unwrap();
        assert_eq!(0, guard.page_id());
        drop(guard);

        assert!(bpm.fetch_page_basic(0).is_some());
        assert!(bpm.fetch_page_basic(1).is_none(), "beyond next_page_id");
    }

    #[test]
    fn unpin_semantics() {
        let dir = TempDir::new().unwrap();
        let bpm = pool(&dir, 2);

        assert!(!bpm.unpin_page(0, false), "nothing resident yet");

        let guard = bpm.new_page().unwrap();
        let page_id = guard.page_id();
        assert_eq!(Some(1), bpm.get_pin_count(page_id));
        drop(guard);
        assert_eq!(Some(0), bpm.get_pin_count(page_id));

        // Second unpin of an already-unpinned page fails.
        assert!(!bpm.unpin_page(page_id, false));
    }

    #[test]
    fn delete_page_semantics() {
        let dir = TempDir::new().unwrap();
        let bpm = pool(&dir, 1);

        assert!(bpm.delete_page(42), "non-resident delete is idempotent");

        let guard = bpm.new_page().unwrap();
        let page_id = guard.page_id();
        assert!(!bpm.delete_page(page_id), "pinned delete must fail");
        drop(guard);

        assert!(bpm.delete_page(page_id));
        assert_eq!(None, bpm.get_pin_count(page_id));

        // The frame went back to the free list; the pool is usable again.
        assert!(bpm.new_page().is_some());
    }

    #[test]
    fn flush_page_persists_without_eviction() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("base.db");
        let manager = DiskManager::new(&path).unwrap();
        let bpm = BufferPoolManager::new(2, manager, DEFAULT_REPLACER_K);

        let page_id = {
            let guard = bpm.new_page().unwrap();
            let page_id = guard.page_id();
            let mut guard = guard.upgrade_write();
            guard.data_mut().fill(0x5A);
            page_id
        };

        assert!(!bpm.flush_page(99), "flush of non-resident page fails");
        assert!(bpm.flush_page(page_id));

        let mut checker = DiskManager::new(&path).unwrap();
        let mut buffer = [0u8; PAGE_SIZE];
        checker.read_page(page_id, &mut buffer).unwrap();
        assert_eq!([0x5A; PAGE_SIZE], buffer);

        // Still resident and unpinned after the flush.
        assert_eq!(Some(0), bpm.get_pin_count(page_id));
    }

    #[test]
    fn flush_all_and_reopen_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("base.db");

        let page_ids: Vec<_> = {
            let manager = DiskManager::new(&path).unwrap();
            let bpm = BufferPoolManager::new(4, manager, DEFAULT_REPLACER_K);

            let page_ids: Vec<_> = (0..4u8)
                .map(|fill| {
                    let guard = bpm.new_page().unwrap();
                    let page_id = guard.page_id();
                    let mut guard = guard.upgrade_write();
                    guard.data_mut().fill(fill + 1);
                    page_id
                })
                .collect();

            bpm.flush_all_pages();
            page_ids
        };

        // A fresh pool over the same file resumes page ids past the
        // persisted ones and serves the old contents.
        let manager = DiskManager::new(&path).unwrap();
        let bpm = BufferPoolManager::new(4, manager, DEFAULT_REPLACER_K);

        for (fill, &page_id) in page_ids.iter().enumerate() {
            let guard = bpm.read_page(page_id).unwrap();
            assert!(guard.data().iter().all(|&byte| byte == fill as u8 + 1));
        }

        let fresh = bpm.new_page().unwrap();
        assert_eq!(page_ids.len() as i32, fresh.page_id());
    }

    #[test]
    fn concurrent_churn_keeps_pin_accounting() {
        const PAGES: i32 = 16;
        const THREADS: usize = 4;
        const ROUNDS: usize = 64;

        let dir = TempDir::new().unwrap();
        let bpm = pool(&dir, 5);

        let page_ids: Vec<_> = (0..PAGES)
            .map(|_| {
                let guard = bpm.new_page().unwrap();
                guard.page_id()
            })
            .collect();

        std::thread::scope(|scope| {
            for _ in 0..THREADS {
                scope.spawn(|| {
                    let mut rng = thread_rng();
                    let mut order = page_ids.clone();
                    for _ in 0..ROUNDS {
                        order.shuffle(&mut rng);
                        let page_id = order[0];
                        if rng.gen_bool(0.5) {
                            let mut guard = bpm.write_page(page_id).unwrap();
                            guard.data_mut()[..4]
                                .copy_from_slice(&page_id.to_le_bytes());
                        } else {
                            let guard = bpm.read_page(page_id).unwrap();
                            let mut stamp = [0u8; 4];
                            stamp.copy_from_slice(&guard.data()[..4]);
                            let value = i32::from_le_bytes(stamp);
                            assert!(value == 0 || value == page_id);
                        }
                    }
                });
            }
        });

        // Quiescence: every pin released, every page still addressable.
        for &page_id in &page_ids {
            let pins = bpm.get_pin_count(page_id);
            assert!(pins.is_none() || pins == Some(0));
            let guard = bpm.read_page(page_id).unwrap();
            assert_eq!(page_id, guard.page_id());
        }
    }
}
