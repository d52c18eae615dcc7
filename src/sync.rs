//! Synchronization primitives.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Completion barrier shared by every host worker of a dispatch.
///
/// Workers register the units of work they will perform with `add` and report each
/// finished unit with `done`; `wait` resolves once nothing is outstanding. Every
/// `done` also posts a notification on a channel, which is what `wait` sleeps on.
#[derive(Debug)]
pub struct CompletionCounter {
    outstanding: AtomicUsize,
    completed: AtomicUsize,
    notify_tx: flume::Sender<()>,
    notify_rx: flume::Receiver<()>,
}

impl CompletionCounter {
    pub fn new() -> Self {
        let (notify_tx, notify_rx) = flume::unbounded();
        Self {
            outstanding: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            notify_tx,
            notify_rx,
        }
    }

    pub fn add(&self, units: usize) {
        self.outstanding.fetch_add(units, Ordering::SeqCst);
    }

    pub fn done(&self) {
        let previous = self.outstanding.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "done() called more often than add()");
        self.completed.fetch_add(1, Ordering::SeqCst);
        // The receiver lives as long as `self`, so this cannot fail.
        let _ = self.notify_tx.send(());
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Total number of `done` signals observed so far.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Wait until every registered unit has been reported done.
    pub async fn wait(&self) {
        while self.outstanding() > 0 {
            if self.notify_rx.recv_async().await.is_err() {
                break;
            }
        }
    }
}

impl Default for CompletionCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// The units one worker still owes a `CompletionCounter`.
///
/// Whatever has not been reported when this is dropped (for example because the
/// worker unwound) is reported then, so `wait` can never hang on a dead worker.
pub struct Pending {
    counter: Arc<CompletionCounter>,
    remaining: usize,
}

impl Pending {
    pub fn register(counter: Arc<CompletionCounter>, units: usize) -> Self {
        counter.add(units);
        Self {
            counter,
            remaining: units,
        }
    }

    pub fn complete_one(&mut self) {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.counter.done();
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        for _ in 0..self.remaining {
            self.counter.done();
        }
    }
}
