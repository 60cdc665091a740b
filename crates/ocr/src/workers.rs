//! Long-lived recognition workers for engines whose handles are expensive
//! to load and cannot be shared between threads.
//!
//! Each worker thread builds its own handle once at startup and keeps it
//! until the pool is dropped. Requests are queued on a shared channel, so
//! the number of loaded handles never exceeds the worker count no matter
//! which thread the caller runs on.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::preprocess::Raster;
use crate::recognizer::{DenseEngine, DenseWord, OcrError};

/// A loaded engine instance owned by exactly one worker thread.
pub trait DenseHandle {
    fn read_words(&mut self, raster: &Raster) -> Result<Vec<DenseWord>, OcrError>;
}

type Reply = mpsc::Sender<Result<Vec<DenseWord>, OcrError>>;
type Job = (Raster, Reply);

pub struct DenseWorkerPool {
    sender: Option<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl DenseWorkerPool {
    /// Start `workers` threads (at least one), each calling `load` once.
    /// Fails with the first load error; threads already started are shut down.
    pub fn spawn<F, H>(name: &str, workers: usize, load: F) -> Result<Self, OcrError>
    where
        F: Fn() -> Result<H, OcrError> + Send + Sync + 'static,
        H: DenseHandle + 'static,
    {
        let load = Arc::new(load);
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), OcrError>>();

        let mut pool = Self { sender: Some(sender), workers: Vec::new() };
        for index in 0..workers.max(1) {
            let load = Arc::clone(&load);
            let receiver = Arc::clone(&receiver);
            let ready = ready_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || {
                    let mut engine = match load() {
                        Ok(engine) => {
                            let _ = ready.send(Ok(()));
                            engine
                        }
                        Err(e) => {
                            let _ = ready.send(Err(e));
                            return;
                        }
                    };
                    drop(ready);
                    run_worker(&mut engine, &receiver);
                })
                .map_err(|e| OcrError::Engine(format!("failed to spawn {name} worker: {e}")))?;
            pool.workers.push(handle);
        }
        drop(ready_tx);

        for _ in 0..pool.workers.len() {
            match ready_rx.recv() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(OcrError::ModelLoad(format!("{name} worker exited during load")));
                }
            }
        }
        debug!(engine = name, workers = pool.workers.len(), "recognition workers ready");
        Ok(pool)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

fn run_worker<H: DenseHandle>(handle: &mut H, receiver: &Mutex<mpsc::Receiver<Job>>) {
    loop {
        // The lock is released before the job runs so other workers can pick up work.
        let job = match receiver.lock() {
            Ok(rx) => rx.recv(),
            Err(_) => return,
        };
        let Ok((raster, reply)) = job else {
            return;
        };
        let _ = reply.send(handle.read_words(&raster));
    }
}

impl DenseEngine for DenseWorkerPool {
    fn read_words(&self, raster: &Raster) -> Result<Vec<DenseWord>, OcrError> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| OcrError::Engine("worker pool is shut down".into()))?;
        let (reply_tx, reply_rx) = mpsc::channel();
        sender
            .send((raster.clone(), reply_tx))
            .map_err(|_| OcrError::Engine("all recognition workers have exited".into()))?;
        reply_rx
            .recv()
            .map_err(|_| OcrError::Engine("recognition worker died mid-request".into()))?
    }
}

impl Drop for DenseWorkerPool {
    fn drop(&mut self) {
        // Closing the channel ends every worker loop.
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("recognition worker panicked");
            }
        }
    }
}
