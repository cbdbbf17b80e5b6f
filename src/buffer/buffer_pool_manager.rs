use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc, Mutex,
    },
};

use hashlink::LinkedHashMap;
use log::{debug, warn};
use tokio::sync::oneshot;

use crate::{
    storage::{
        disk::{
            manager::DiskManager,
            scheduler::{DiskData, DiskRequest, DiskScheduler},
        },
        page::{
            page::{
                page_constants::{INVALID_PAGE_ID, PAGE_SIZE},
                FrameHeader, PageId,
            },
            page_guard::{BasicPageGuard, ReadPageGuard, WritePageGuard},
        },
    },
    utils::replacer::{LruKReplacer, Replacer},
};

pub type FrameId = usize;

pub const DEFAULT_REPLACER_K: usize = 2;

// Bookkeeping behind the pool's coarse latch. Critical sections stay short
// and never touch the disk or a page latch.
struct PoolState {
    page_table: LinkedHashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
}

/// Fixed-size cache of disk pages.
///
/// Frames are preallocated once and never move, so page guards can borrow
/// them for the lifetime of the pool. A page id lives in at most one frame;
/// the page table is the single source of that mapping. Lock order is pool
/// latch, then replacer latch, then a frame's page latch; the page latch is
/// never acquired while the pool latch is held.
pub struct BufferPoolManager {
    pool_size: usize,
    next_page_id: AtomicI32,

    frames: Vec<FrameHeader>,
    state: Mutex<PoolState>,

    // Finds unpinned frames to reuse when the free list runs dry.
    replacer: Mutex<LruKReplacer>,

    disk_scheduler: DiskScheduler,
    disk_manager: Arc<Mutex<DiskManager>>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, manager: DiskManager, replacer_k: usize) -> Self {
        // Ids resume after whatever the page file already holds, so a pool
        // opened over an existing file can fetch its pages.
        let next_page_id = manager.capacity_pages();
        let disk_manager = Arc::new(Mutex::new(manager));

        let frames = (0..pool_size).map(FrameHeader::new).collect();
        let free_list = (0..pool_size).collect();

        BufferPoolManager {
            pool_size,
            next_page_id: AtomicI32::new(next_page_id),
            frames,
            state: Mutex::new(PoolState {
                page_table: LinkedHashMap::with_capacity(pool_size),
                free_list,
            }),
            replacer: Mutex::new(LruKReplacer::new(pool_size, replacer_k)),
            disk_scheduler: DiskScheduler::new(Arc::clone(&disk_manager)),
            disk_manager,
        }
    }

    pub fn size(&self) -> usize {
        self.pool_size
    }

    /// Number of frames the replacer could evict right now.
    pub fn evictable_count(&self) -> usize {
        self.replacer.lock().unwrap().size()
    }

    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock().unwrap();
        let frame_id = *state.page_table.get(&page_id)?;
        Some(self.frames[frame_id].pin_count())
    }

    /// Allocates a fresh page and pins it in a frame, zero-filled. `None`
    /// when every frame is pinned.
    pub fn new_page(&self) -> Option<BasicPageGuard<'_>> {
        let page_id = self.allocate_page();

        let (frame_id, old_page_id, old_dirty) = {
            let mut state = self.state.lock().unwrap();
            let acquired = self.acquire_frame(&mut state)?;

            let frame = &self.frames[acquired.0];
            frame.set_page_id(page_id);
            frame.pin();
            state.page_table.insert(page_id, acquired.0);
            acquired
        };

        let frame = &self.frames[frame_id];
        {
            let mut data = frame.latch().write().unwrap();
            let write_back = self.schedule_write_back(old_page_id, old_dirty, &data);
            data.fill(0);
            drop(data);
            frame.set_dirty(false);
            Self::await_write_back(old_page_id, write_back);
        }

        debug!("new page {} in frame {}", page_id, frame_id);
        Some(BasicPageGuard::new(self, frame))
    }

    pub fn fetch_page_basic(&self, page_id: PageId) -> Option<BasicPageGuard<'_>> {
        self.pin_page(page_id)
            .map(|frame| BasicPageGuard::new(self, frame))
    }

    /// Fetches a page and takes its shared latch.
    pub fn read_page(&self, page_id: PageId) -> Option<ReadPageGuard<'_>> {
        self.fetch_page_basic(page_id)
            .map(|guard| guard.upgrade_read())
    }

    /// Fetches a page and takes its exclusive latch.
    pub fn write_page(&self, page_id: PageId) -> Option<WritePageGuard<'_>> {
        self.fetch_page_basic(page_id)
            .map(|guard| guard.upgrade_write())
    }

    /// Drops one pin. The dirty bit only ever accumulates here; clearing is
    /// the flush paths' job.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock().unwrap();
        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return false,
        };

        let frame = &self.frames[frame_id];
        if frame.pin_count() == 0 {
            return false;
        }

        frame.or_dirty(is_dirty);
        if frame.unpin() == 0 {
            self.replacer.lock().unwrap().set_evictable(frame_id, true);
        }
        true
    }

    /// Writes the page out through the scheduler and clears its dirty bit.
    /// Runs even on pinned frames; callers order their own writes.
    pub fn flush_page(&self, page_id: PageId) -> bool {
        // Pin while flushing so the frame cannot be reassigned under us.
        let frame = {
            let state = self.state.lock().unwrap();
            match state.page_table.get(&page_id) {
                Some(&frame_id) => {
                    let frame = &self.frames[frame_id];
                    frame.pin();
                    let mut replacer = self.replacer.lock().unwrap();
                    replacer.record_access(frame_id);
                    replacer.set_evictable(frame_id, false);
                    frame
                }
                None => return false,
            }
        };

        let receiver = {
            let data = frame.latch().read().unwrap();
            let (done, receiver) = DiskScheduler::create_promise();
            self.disk_scheduler.schedule(DiskRequest {
                is_write: true,
                data: DiskData::Write((*data).clone()),
                page_id,
                done,
            });
            receiver
        };

        let ok = receiver.blocking_recv().unwrap_or(false);
        if ok {
            frame.set_dirty(false);
        } else {
            warn!("flush of page {} failed", page_id);
        }

        self.unpin_page(page_id, false);
        ok
    }

    /// Flushes every resident page, in residency order.
    pub fn flush_all_pages(&self) {
        let resident: Vec<PageId> = {
            let state = self.state.lock().unwrap();
            state.page_table.keys().copied().collect()
        };
        for page_id in resident {
            self.flush_page(page_id);
        }
    }

    /// Evicts the page from the pool and retires its id. Idempotent for
    /// non-resident pages; refuses pinned ones.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            let frame_id = match state.page_table.get(&page_id) {
                Some(&frame_id) => frame_id,
                None => return true,
            };

            let frame = &self.frames[frame_id];
            if frame.pin_count() > 0 {
                return false;
            }

            state.page_table.remove(&page_id);
            frame.set_page_id(INVALID_PAGE_ID);
            frame.set_dirty(false);
            self.replacer.lock().unwrap().remove(frame_id);
            state.free_list.push_back(frame_id);
        }

        self.disk_manager.lock().unwrap().deallocate_page(page_id);
        true
    }

    fn allocate_page(&self) -> PageId {
        self.next_page_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Pins `page_id` into a frame, reading it from disk on a miss.
    fn pin_page(&self, page_id: PageId) -> Option<&FrameHeader> {
        if page_id < 0 || page_id >= self.next_page_id.load(Ordering::SeqCst) {
            return None;
        }

        let (frame_id, old_page_id, old_dirty) = {
            let mut state = self.state.lock().unwrap();
            if let Some(frame) = self.pin_resident(&state, page_id) {
                return Some(frame);
            }

            let acquired = self.acquire_frame(&mut state)?;
            let frame = &self.frames[acquired.0];
            frame.set_page_id(page_id);
            frame.pin();
            state.page_table.insert(page_id, acquired.0);
            acquired
        };

        // The mapping is visible before the bytes are resident. Holding the
        // frame's write latch through the read makes any racing fetcher
        // block on its guard until the load finishes.
        let frame = &self.frames[frame_id];
        let mut data = frame.latch().write().unwrap();

        let write_back = self.schedule_write_back(old_page_id, old_dirty, &data);

        let staging = Arc::new(Mutex::new(
            vec![0u8; PAGE_SIZE].into_boxed_slice(),
        ));
        let (done, receiver) = DiskScheduler::create_promise();
        self.disk_scheduler.schedule(DiskRequest {
            is_write: false,
            data: DiskData::Read(Arc::clone(&staging)),
            page_id,
            done,
        });

        Self::await_write_back(old_page_id, write_back);

        if !receiver.blocking_recv().unwrap_or(false) {
            warn!("read of page {} failed", page_id);
            data.fill(0);
            self.rollback_failed_load(page_id, frame_id);
            drop(data);
            return None;
        }

        data.copy_from_slice(&staging.lock().unwrap());
        drop(data);
        frame.set_dirty(false);
        Some(frame)
    }

    fn pin_resident(&self, state: &PoolState, page_id: PageId) -> Option<&FrameHeader> {
        let frame_id = *state.page_table.get(&page_id)?;
        let frame = &self.frames[frame_id];
        frame.pin();

        let mut replacer = self.replacer.lock().unwrap();
        replacer.record_access(frame_id);
        replacer.set_evictable(frame_id, false);
        Some(frame)
    }

    /// Picks a frame off the free list, else asks the replacer for a
    /// victim. The chosen frame leaves here non-evictable with its old
    /// mapping removed; write-back of the old occupant is the caller's job
    /// once the pool latch is gone.
    fn acquire_frame(&self, state: &mut PoolState) -> Option<(FrameId, PageId, bool)> {
        let frame_id = match state.free_list.pop_front() {
            Some(frame_id) => frame_id,
            None => self.replacer.lock().unwrap().evict()?,
        };

        let frame = &self.frames[frame_id];
        let old_page_id = frame.page_id();
        let old_dirty = frame.is_dirty();
        if old_page_id != INVALID_PAGE_ID {
            debug!("evicting page {} from frame {}", old_page_id, frame_id);
            state.page_table.remove(&old_page_id);
        }

        let mut replacer = self.replacer.lock().unwrap();
        replacer.record_access(frame_id);
        replacer.set_evictable(frame_id, false);

        Some((frame_id, old_page_id, old_dirty))
    }

    fn schedule_write_back(
        &self,
        old_page_id: PageId,
        old_dirty: bool,
        data: &[u8],
    ) -> Option<oneshot::Receiver<bool>> {
        if old_page_id == INVALID_PAGE_ID || !old_dirty {
            return None;
        }
        let (done, receiver) = DiskScheduler::create_promise();
        self.disk_scheduler.schedule(DiskRequest {
            is_write: true,
            data: DiskData::Write(data.to_vec().into_boxed_slice()),
            page_id: old_page_id,
            done,
        });
        Some(receiver)
    }

    fn await_write_back(old_page_id: PageId, receiver: Option<oneshot::Receiver<bool>>) {
        if let Some(receiver) = receiver {
            if !receiver.blocking_recv().unwrap_or(false) {
                warn!("write-back of evicted page {} failed", old_page_id);
            }
        }
    }

    /// Undo a miss whose disk read failed. If a racing fetcher already
    /// pinned the mapping we must leave it in place; the page then reads
    /// as zeros.
    fn rollback_failed_load(&self, page_id: PageId, frame_id: FrameId) {
        let mut state = self.state.lock().unwrap();
        let frame = &self.frames[frame_id];

        if frame.pin_count() > 1 {
            warn!("page {} shared during failed load; leaving zeroed", page_id);
            frame.unpin();
            return;
        }

        state.page_table.remove(&page_id);
        frame.unpin();
        frame.set_page_id(INVALID_PAGE_ID);
        frame.set_dirty(false);

        let mut replacer = self.replacer.lock().unwrap();
        replacer.set_evictable(frame_id, true);
        replacer.remove(frame_id);
        drop(replacer);

        state.free_list.push_back(frame_id);
    }
}
