use std::sync::{RwLockReadGuard, RwLockWriteGuard};

use crate::{
    buffer::buffer_pool_manager::BufferPoolManager,
    storage::page::page::{FrameHeader, PageId},
};

/// Pin-only handle on a buffered page.
///
/// Holds no latch, so it exposes no page data; upgrade to a read or write
/// guard for that. Dropping it releases the pin exactly once. Guards move
/// but do not copy, and a moved-from guard releases nothing.
pub struct BasicPageGuard<'a> {
    bpm: &'a BufferPoolManager,
    frame: Option<&'a FrameHeader>,
}

impl<'a> BasicPageGuard<'a> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, frame: &'a FrameHeader) -> Self {
        BasicPageGuard {
            bpm,
            frame: Some(frame),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.guarded_frame().page_id()
    }

    /// Takes the page's shared latch, consuming the pin-only guard.
    pub fn upgrade_read(mut self) -> ReadPageGuard<'a> {
        let frame = self.frame.take().expect("guard already consumed");
        let data = frame.latch().read().unwrap();
        ReadPageGuard {
            bpm: self.bpm,
            frame,
            data: Some(data),
        }
    }

    /// Takes the page's exclusive latch, consuming the pin-only guard.
    pub fn upgrade_write(mut self) -> WritePageGuard<'a> {
        let frame = self.frame.take().expect("guard already consumed");
        let data = frame.latch().write().unwrap();
        WritePageGuard {
            bpm: self.bpm,
            frame,
            data: Some(data),
            is_dirty: false,
        }
    }

    fn guarded_frame(&self) -> &'a FrameHeader {
        self.frame.expect("guard already consumed")
    }
}

impl Drop for BasicPageGuard<'_> {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.bpm.unpin_page(frame.page_id(), false);
        }
    }
}

/// Pin plus the page's shared latch. Readers of the same page coexist;
/// writers wait.
pub struct ReadPageGuard<'a> {
    bpm: &'a BufferPoolManager,
    frame: &'a FrameHeader,
    data: Option<RwLockReadGuard<'a, Box<[u8]>>>,
}

impl ReadPageGuard<'_> {
    pub fn page_id(&self) -> PageId {
        self.frame.page_id()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref().expect("latch held for guard lifetime")
    }
}

impl Drop for ReadPageGuard<'_> {
    fn drop(&mut self) {
        // Latch goes first; unpinning takes the pool latch and must not
        // overlap the page latch.
        self.data.take();
        self.bpm.unpin_page(self.frame.page_id(), false);
    }
}

/// Pin plus the page's exclusive latch.
///
/// Mutation happens through `data_mut`, which is also what marks the page
/// dirty; inspecting through `data` leaves the dirty bit alone.
pub struct WritePageGuard<'a> {
    bpm: &'a BufferPoolManager,
    frame: &'a FrameHeader,
    data: Option<RwLockWriteGuard<'a, Box<[u8]>>>,
    is_dirty: bool,
}

impl WritePageGuard<'_> {
    pub fn page_id(&self) -> PageId {
        self.frame.page_id()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref().expect("latch held for guard lifetime")
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.is_dirty = true;
        self.data.as_mut().expect("latch held for guard lifetime")
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }
}

impl Drop for WritePageGuard<'_> {
    fn drop(&mut self) {
        self.data.take();
        self.bpm.unpin_page(self.frame.page_id(), self.is_dirty);
    }
}
