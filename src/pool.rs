// CLASSIFICATION: COMMUNITY
// Filename: pool.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Fixed-size worker pool used to bound concurrent disk sessions.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Pool of named worker threads pulling jobs from a shared queue.
///
/// Jobs submitted while every worker is busy wait in the queue.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one) named `<name>-<n>`.
    pub fn new(name: &str, size: usize) -> std::io::Result<Self> {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let mut workers = Vec::with_capacity(size);
        for idx in 0..size {
            let rx = Arc::clone(&receiver);
            let handle = thread::Builder::new()
                .name(format!("{name}-{idx}"))
                .spawn(move || worker_loop(rx))?;
            workers.push(handle);
        }
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job. Returns `false` once the pool has been shut down.
    pub fn execute<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match &self.sender {
            Some(sender) => sender.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    /// Stop accepting jobs and wait for queued and running jobs to finish.
    pub fn join(mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel lets idle workers exit; busy ones detach.
        self.sender.take();
    }
}

fn worker_loop(rx: Arc<Mutex<Receiver<Job>>>) {
    loop {
        let job = {
            let guard = match rx.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.recv()
        };
        match job {
            Ok(job) => job(),
            Err(_) => break,
        }
    }
    debug!("{} exiting", thread::current().name().unwrap_or("worker"));
}
