//! # Delivery execution contexts.
//!
//! Three contexts besides the posting thread itself:
//!
//! - **ordered main consumer** - one dedicated OS thread draining a FIFO
//!   queue; it marks itself as the primary thread, so nested posts from its
//!   handlers classify correctly.
//! - **serialized background consumer** - one dedicated OS thread draining
//!   a FIFO queue; background handlers never run concurrently with each
//!   other.
//! - **unordered pool** - `tokio::task::spawn_blocking`; handlers are
//!   synchronous and may block, which is exactly what the blocking pool is
//!   for.
//!
//! The ordered consumers drain `tokio::sync::mpsc` channels via
//! `blocking_recv`; shutdown drops the senders and the consumers exit after
//! the queue runs dry. Queues are unbounded - a pending-post queue must not
//! drop deliveries.

use std::cell::Cell;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::core::BusCore;
use crate::error::BusError;
use crate::events::Envelope;
use crate::registry::Subscription;

use super::router;

/// One queued delivery.
pub(crate) struct Job {
    pub(crate) core: Arc<BusCore>,
    pub(crate) sub: Arc<Subscription>,
    pub(crate) env: Envelope,
}

thread_local! {
    /// Set once on the ordered main consumer thread.
    static MAIN_CONSUMER: Cell<bool> = const { Cell::new(false) };
}

/// Whether the calling thread is the engine-owned main consumer.
pub(crate) fn on_main_consumer() -> bool {
    MAIN_CONSUMER.with(Cell::get)
}

struct Queue {
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
}

impl Queue {
    fn new(tx: mpsc::UnboundedSender<Job>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    /// Enqueues `job`; hands it back when the queue is already closed.
    fn send(&self, job: Job) -> Option<Job> {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(job).err().map(|e| e.0),
            None => Some(job),
        }
    }

    fn close(&self) {
        *self.tx.lock() = None;
    }
}

pub(crate) struct Executors {
    runtime: Handle,
    main: Queue,
    background: Queue,
    joins: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl Executors {
    pub(crate) fn start(runtime: Handle) -> Result<Self, BusError> {
        let (main_tx, main_rx) = mpsc::unbounded_channel();
        let (background_tx, background_rx) = mpsc::unbounded_channel();
        let main_join = spawn_consumer("polybus-main", true, main_rx)?;
        let background_join = spawn_consumer("polybus-background", false, background_rx)?;
        Ok(Self {
            runtime,
            main: Queue::new(main_tx),
            background: Queue::new(background_tx),
            joins: Mutex::new(vec![main_join, background_join]),
        })
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub(crate) fn enqueue_main(&self, job: Job) -> Option<Job> {
        self.main.send(job)
    }

    pub(crate) fn enqueue_background(&self, job: Job) -> Option<Job> {
        self.background.send(job)
    }

    pub(crate) fn spawn_pooled(&self, job: Job) {
        self.runtime.spawn_blocking(move || {
            router::invoke(&job.core, &job.sub, &job.env);
        });
    }

    /// Closes both ordered queues and joins their consumers (skipping the
    /// calling thread if it happens to be one of them). Idempotent.
    pub(crate) fn shutdown(&self) {
        self.main.close();
        self.background.close();
        let joins = std::mem::take(&mut *self.joins.lock());
        let me = thread::current().id();
        for join in joins {
            if join.thread().id() != me {
                let _ = join.join();
            }
        }
    }
}

fn spawn_consumer(
    name: &str,
    is_main: bool,
    mut rx: mpsc::UnboundedReceiver<Job>,
) -> Result<thread::JoinHandle<()>, BusError> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            if is_main {
                MAIN_CONSUMER.with(|c| c.set(true));
            }
            while let Some(job) = rx.blocking_recv() {
                router::invoke(&job.core, &job.sub, &job.env);
            }
        })
        .map_err(|source| BusError::Spawn { source })
}
