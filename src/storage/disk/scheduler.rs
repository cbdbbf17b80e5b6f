use std::{
    sync::{
        mpsc::{self, Sender},
        Arc, Mutex,
    },
    thread::JoinHandle,
};

use log::{debug, warn};
use tokio::sync::oneshot;

use crate::storage::{disk::manager::DiskManager, page::page::PageId};

/// Payload of a disk request. Writes move their buffer into the request;
/// reads land in a shared staging buffer the caller copies out of once the
/// completion fires.
pub enum DiskData {
    Write(Box<[u8]>),
    Read(Arc<Mutex<Box<[u8]>>>),
}

/// A single I/O operation plus the channel its completion is reported on.
pub struct DiskRequest {
    pub is_write: bool,
    pub data: DiskData,
    pub page_id: PageId,

    /// One-shot success signal. Receivers may `blocking_recv` from sync
    /// code or `.await` inside a runtime.
    pub done: oneshot::Sender<bool>,
}

/// Serializes disk traffic from many threads onto one background worker.
///
/// Requests are queued FIFO, so two requests against the same page are
/// served in submission order. `schedule` never blocks; callers wait on the
/// request's completion channel. Dropping the scheduler enqueues a sentinel
/// that drains the queue and joins the worker.
pub struct DiskScheduler {
    request_queue: Sender<Option<DiskRequest>>,
    worker: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    pub fn new(manager: Arc<Mutex<DiskManager>>) -> Self {
        let (tx, rx) = mpsc::channel::<Option<DiskRequest>>();

        let worker = std::thread::spawn(move || {
            while let Ok(Some(request)) = rx.recv() {
                let mut manager_guard = manager.lock().unwrap();

                // I/O failure must reach the issuer, never kill the worker.
                let ok = if request.is_write {
                    match &request.data {
                        DiskData::Write(data) => manager_guard
                            .write_page(request.page_id, data)
                            .map_err(|err| warn!("write of page {} failed: {err:#}", request.page_id))
                            .is_ok(),
                        DiskData::Read(_) => {
                            warn!("write request for page {} carried a read buffer", request.page_id);
                            false
                        }
                    }
                } else {
                    match &request.data {
                        DiskData::Read(buffer) => {
                            let mut buffer_guard = buffer.lock().unwrap();
                            manager_guard
                                .read_page(request.page_id, &mut buffer_guard)
                                .map_err(|err| warn!("read of page {} failed: {err:#}", request.page_id))
                                .is_ok()
                        }
                        DiskData::Write(_) => {
                            warn!("read request for page {} carried a write buffer", request.page_id);
                            false
                        }
                    }
                };

                drop(manager_guard);

                // The issuer may have given up waiting; that is not an error.
                let _ = request.done.send(ok);
            }
            debug!("disk scheduler worker exiting");
        });

        DiskScheduler {
            request_queue: tx,
            worker: Some(worker),
        }
    }

    /// Enqueues a request and returns immediately.
    pub fn schedule(&self, request: DiskRequest) {
        self.request_queue
            .send(Some(request))
            .expect("disk scheduler worker gone");
    }

    /// One-shot completion pair for a request.
    pub fn create_promise() -> (oneshot::Sender<bool>, oneshot::Receiver<bool>) {
        oneshot::channel()
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Sentinel; the worker drains everything queued before it and exits.
        let _ = self.request_queue.send(None);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
