use std::collections::{HashMap, VecDeque};

use log::debug;

use crate::buffer::buffer_pool_manager::FrameId;

pub trait Replacer {
    fn evict(&mut self) -> Option<FrameId>;
    fn record_access(&mut self, frame_id: FrameId);
    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool);
    fn remove(&mut self, frame_id: FrameId);
    fn size(&self) -> usize;
}

/// Per-frame access history. Timestamps are kept most recent first, so the
/// k-th most recent access is `history[k - 1]`.
struct LruKNode {
    history: VecDeque<u64>,
    k: usize,
    is_evictable: bool,
}

impl LruKNode {
    fn new(k: usize) -> Self {
        LruKNode {
            history: VecDeque::new(),
            k,
            is_evictable: false,
        }
    }

    fn push_timestamp(&mut self, timestamp: u64) {
        self.history.push_front(timestamp);
    }

    /// Timestamp of the k-th most recent access, `None` while fewer than
    /// `k` accesses are recorded (backward K-distance of +inf).
    fn kth_entry(&self) -> Option<u64> {
        self.history.get(self.k - 1).copied()
    }

    /// Oldest recorded access, used as the tie-break among +inf frames.
    fn last_entry(&self) -> u64 {
        *self.history.back().expect("empty access history")
    }
}

/// LRU-K eviction policy over buffer pool frames.
///
/// Victim selection prefers frames whose backward K-distance is infinite
/// (fewer than `k` recorded accesses), falling back to classical LRU among
/// them; otherwise the frame with the oldest k-th most recent access wins.
/// All operations are O(n) in the number of tracked frames; the caller
/// serializes access behind its own latch.
pub struct LruKReplacer {
    node_store: HashMap<FrameId, LruKNode>,
    current_timestamp: u64,
    curr_size: usize,
    replacer_size: usize,
    k: usize,
}

impl LruKReplacer {
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k > 0, "lru-k requires k > 0");
        LruKReplacer {
            node_store: HashMap::with_capacity(num_frames),
            current_timestamp: 0,
            curr_size: 0,
            replacer_size: num_frames,
            k,
        }
    }

    fn check_frame_id(&self, frame_id: FrameId) {
        assert!(
            frame_id < self.replacer_size,
            "frame id {} out of range (replacer size {})",
            frame_id,
            self.replacer_size
        );
    }
}

impl Replacer for LruKReplacer {
    fn record_access(&mut self, frame_id: FrameId) {
        self.check_frame_id(frame_id);

        let k = self.k;
        let node = self
            .node_store
            .entry(frame_id)
            .or_insert_with(|| LruKNode::new(k));

        node.push_timestamp(self.current_timestamp);
        self.current_timestamp += 1;
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        self.check_frame_id(frame_id);

        let node = self
            .node_store
            .get_mut(&frame_id)
            .expect("set_evictable on untracked frame");

        if node.is_evictable != evictable {
            node.is_evictable = evictable;
            if evictable {
                self.curr_size += 1;
            } else {
                self.curr_size -= 1;
            }
        }
    }

    fn evict(&mut self) -> Option<FrameId> {
        // Frames still short of k accesses take priority, resolved by
        // classical LRU on their oldest access. Among full histories the
        // smallest k-th most recent timestamp wins.
        let mut inf_victim: Option<(FrameId, u64)> = None;
        let mut kth_victim: Option<(FrameId, u64)> = None;

        for (&frame_id, node) in &self.node_store {
            if !node.is_evictable {
                continue;
            }
            match node.kth_entry() {
                None => {
                    let oldest = node.last_entry();
                    if inf_victim.map_or(true, |(_, t)| oldest < t) {
                        inf_victim = Some((frame_id, oldest));
                    }
                }
                Some(kth) => {
                    if kth_victim.map_or(true, |(_, t)| kth < t) {
                        kth_victim = Some((frame_id, kth));
                    }
                }
            }
        }

        let (victim, _) = inf_victim.or(kth_victim)?;

        let node = self.node_store.get_mut(&victim).expect("victim tracked");
        node.history.clear();
        node.is_evictable = false;
        self.curr_size -= 1;

        debug!("lru-k evicting frame {}", victim);
        Some(victim)
    }

    fn remove(&mut self, frame_id: FrameId) {
        match self.node_store.get_mut(&frame_id) {
            // Untracked frames were never handed to the replacer; nothing
            // to forget.
            None => {}
            Some(node) if node.is_evictable => {
                node.history.clear();
                node.is_evictable = false;
                self.curr_size -= 1;
            }
            Some(_) => panic!("remove of pinned frame {}", frame_id),
        }
    }

    fn size(&self) -> usize {
        self.curr_size
    }
}
