//! A bounded task gate with two priority bands.
//!
//! Closure installation interleaves two kinds of work: metadata discovery
//! (latency-bound, widens the frontier) and NAR installation
//! (throughput-bound, bulk downloads). Both share one permit budget, but a
//! released permit is handed to a waiting discovery task before any
//! waiting install task, so the reference graph is explored as widely as
//! possible before bandwidth is committed to bodies.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, oneshot};

/// Scheduling band of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Band {
    /// Metadata discovery; always preferred when a permit frees up.
    Discover,
    /// Installation (signature check, download, extraction).
    Install,
}

struct GateState {
    available: usize,
    discover: VecDeque<oneshot::Sender<()>>,
    install: VecDeque<oneshot::Sender<()>>,
}

struct Inner {
    gate: Mutex<GateState>,
    /// Tasks spawned and not yet finished (waiting or running).
    pending: AtomicUsize,
    idle: Notify,
}

/// Handle to the shared two-band queue. Cheap to clone.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

impl TaskQueue {
    /// Create a queue running at most `permits` tasks at once.
    pub fn new(permits: usize) -> Self {
        assert!(permits > 0, "queue needs at least one permit");
        Self {
            inner: Arc::new(Inner {
                gate: Mutex::new(GateState {
                    available: permits,
                    discover: VecDeque::new(),
                    install: VecDeque::new(),
                }),
                pending: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Spawn a task in `band`. The future starts once a permit is granted.
    pub fn spawn<F>(&self, band: Band, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let inner = self.inner.clone();
        inner.pending.fetch_add(1, Ordering::AcqRel);
        tokio::spawn(async move {
            let _permit = acquire(&inner, band).await;
            future.await;
            drop(_permit);
            if inner.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                inner.idle.notify_waiters();
            }
        });
    }

    /// Wait until every spawned task (including tasks spawned by tasks)
    /// has finished.
    pub async fn idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct Permit {
    inner: Arc<Inner>,
}

async fn acquire(inner: &Arc<Inner>, band: Band) -> Permit {
    let receiver = {
        let mut gate = inner.gate.lock().expect("queue lock poisoned");
        if gate.available > 0 {
            gate.available -= 1;
            None
        } else {
            let (tx, rx) = oneshot::channel();
            match band {
                Band::Discover => gate.discover.push_back(tx),
                Band::Install => gate.install.push_back(tx),
            }
            Some(rx)
        }
    };
    if let Some(rx) = receiver {
        // The sender is only dropped after a successful hand-off or by
        // release() moving on, so this resolves exactly when the permit
        // transfers.
        let _ = rx.await;
    }
    Permit {
        inner: inner.clone(),
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        let mut gate = self.inner.gate.lock().expect("queue lock poisoned");
        // Hand the permit to a discovery waiter first, then install; if a
        // receiver vanished, keep trying the next one.
        loop {
            let Some(tx) = gate
                .discover
                .pop_front()
                .or_else(|| gate.install.pop_front())
            else {
                gate.available += 1;
                return;
            };
            if tx.send(()).is_ok() {
                return;
            }
        }
    }
}
