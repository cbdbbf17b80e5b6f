use std::sync::{
    atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering},
    RwLock,
};

use crate::buffer::buffer_pool_manager::FrameId;

pub mod page_constants {
    /// Size of a page on disk and of every frame in the buffer pool.
    pub const PAGE_SIZE: usize = 4096;

    /// Page ids are allocated monotonically starting at zero.
    pub const INVALID_PAGE_ID: super::PageId = -1;
}

/// Identifier of a page in the page file. Valid ids are non-negative;
/// `INVALID_PAGE_ID` marks an empty slot.
pub type PageId = i32;

/// In-memory image of one disk page plus the bookkeeping the buffer pool
/// needs to manage it.
///
/// The `data` lock is the per-page reader/writer latch. It is acquired
/// through page guards only, never while the pool's coarse latch is held.
/// `pin_count`, `is_dirty` and `page_id` sit outside the latch: pins and
/// the dirty bit are adjusted under the pool latch, and `page_id` only
/// changes while the frame is unmapped.
pub struct FrameHeader {
    frame_id: FrameId,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
    page_id: AtomicI32,
    data: RwLock<Box<[u8]>>,
}

impl FrameHeader {
    pub fn new(frame_id: FrameId) -> Self {
        FrameHeader {
            frame_id,
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            page_id: AtomicI32::new(page_constants::INVALID_PAGE_ID),
            data: RwLock::new(vec![0u8; page_constants::PAGE_SIZE].into_boxed_slice()),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn page_id(&self) -> PageId {
        self.page_id.load(Ordering::Acquire)
    }

    pub fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id, Ordering::Release);
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Returns the pin count after the increment.
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns the pin count after the decrement. Callers hold the pool
    /// latch and have checked that the count is non-zero.
    pub fn unpin(&self) -> u32 {
        self.pin_count.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// Sticky dirty OR: a clean unpin after a dirty one must not lose the
    /// dirty bit.
    pub fn or_dirty(&self, dirty: bool) {
        if dirty {
            self.is_dirty.store(true, Ordering::Release);
        }
    }

    pub fn latch(&self) -> &RwLock<Box<[u8]>> {
        &self.data
    }
}
