//! Single-worker I/O queue
//!
//! Every file operation of a [`crate::DiskCache`] is shipped to one named
//! thread that owns the [`FileStore`]. Callers block on a reply channel, so the
//! API stays synchronous while only the worker ever touches the filesystem.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use tracing::error;

use crate::error::{Error, Result};
use crate::storage::FileStore;

type Job = Box<dyn FnOnce(&mut FileStore) + Send>;

enum Message {
    Run(Job),
    Shutdown,
}

pub(crate) struct IoQueue {
    sender: Sender<Message>,
    worker: Option<JoinHandle<()>>,
}

impl IoQueue {
    /// Start the worker thread, handing it ownership of `store`
    pub fn spawn(name: String, mut store: FileStore) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Message>();

        let worker = thread::Builder::new().name(name).spawn(move || {
            while let Ok(Message::Run(job)) = receiver.recv() {
                // A panicking job fails its own caller, not the queue
                if panic::catch_unwind(AssertUnwindSafe(|| job(&mut store))).is_err() {
                    error!("Disk cache job panicked");
                }
            }
        })?;

        Ok(Self {
            sender,
            worker: Some(worker),
        })
    }

    /// Run `job` on the worker and wait for its result
    pub fn run<R, F>(&self, job: F) -> Result<R>
    where
        F: FnOnce(&mut FileStore) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply, result) = mpsc::sync_channel(1);

        self.sender
            .send(Message::Run(Box::new(move |store| {
                let _ = reply.send(job(store));
            })))
            .map_err(|_| Error::WorkerGone)?;

        result.recv().map_err(|_| Error::WorkerGone)
    }
}

impl Drop for IoQueue {
    fn drop(&mut self) {
        let _ = self.sender.send(Message::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
