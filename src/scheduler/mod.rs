// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A bounded pool of worker tasks draining a single FIFO queue: a
//! bounded `mpsc` channel feeds a fixed number of `tokio::spawn`ed
//! loops, shutdown is cooperative via a [`CancellationToken`], and a
//! panicking unit of work is caught so it cannot take the whole pool
//! down with it.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

pub type WorkItem = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct Job {
    item: WorkItem,
    done: Option<oneshot::Sender<()>>,
}

/// A fixed-size pool of workers pulling from one FIFO queue.
///
/// `Submit` enqueues a unit of work and returns immediately; callers
/// that need to know when it finished can await the handle returned by
/// [`Scheduler::submit_and_wait`]. `Close` is idempotent and blocks
/// until all in-flight and queued work has drained.
pub struct Scheduler {
    sender: mpsc::Sender<Job>,
    cancellation: CancellationToken,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Scheduler {
    pub fn new(worker_count: usize, queue_capacity: usize) -> Self {
        assert!(worker_count > 0, "scheduler requires at least one worker");
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let cancellation = CancellationToken::new();
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..worker_count)
            .map(|id| {
                let receiver = receiver.clone();
                let cancellation = cancellation.clone();
                tokio::spawn(worker_loop(id, receiver, cancellation))
            })
            .collect();

        Self {
            sender,
            cancellation,
            workers: tokio::sync::Mutex::new(workers),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueues `item`, blocking if the queue is full. Returns an error
    /// if the scheduler has been closed.
    pub async fn submit(&self, item: WorkItem) -> Result<(), SchedulerClosed> {
        self.sender
            .send(Job { item, done: None })
            .await
            .map_err(|_| SchedulerClosed)
    }

    /// Like [`Scheduler::submit`] but resolves once the item has
    /// finished running (successfully or by panicking).
    pub async fn submit_and_wait(&self, item: WorkItem) -> Result<(), SchedulerClosed> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Job {
                item,
                done: Some(tx),
            })
            .await
            .map_err(|_| SchedulerClosed)?;
        let _ = rx.await;
        Ok(())
    }

    /// Stops accepting new work and waits for queued and in-flight work
    /// to finish. Safe to call more than once (including concurrently,
    /// since every caller shares the same `Arc<Scheduler>`); only the
    /// first call does anything.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancellation.cancel();
        drop(self.sender.clone());
        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            if let Err(err) = handle.await {
                error!(error = %err, "scheduler worker task panicked during shutdown");
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("scheduler is closed")]
pub struct SchedulerClosed;

async fn worker_loop(
    id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    cancellation: CancellationToken,
) {
    loop {
        let job = {
            let mut guard = receiver.lock().await;
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => None,
                job = guard.recv() => job,
            }
        };
        let Some(mut job) = job else {
            debug!(worker = id, "scheduler worker exiting");
            return;
        };
        if AssertUnwindSafe(job.item.as_mut()).catch_unwind().await.is_err() {
            warn!(worker = id, "scheduler work item panicked");
        }
        if let Some(done) = job.done {
            let _ = done.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use test_r::test;

    #[test]
    async fn runs_submitted_work() {
        let scheduler = Scheduler::new(2, 8);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = counter.clone();
            scheduler
                .submit_and_wait(Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .await
                .unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    async fn a_panicking_item_does_not_kill_the_pool() {
        let scheduler = Scheduler::new(1, 8);
        scheduler
            .submit_and_wait(Box::pin(async move {
                panic!("boom");
            }))
            .await
            .unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = counter.clone();
        scheduler
            .submit_and_wait(Box::pin(async move {
                counter2.fetch_add(1, Ordering::SeqCst);
            }))
            .await
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        scheduler.close().await;
    }

    #[test]
    async fn close_is_idempotent() {
        let scheduler = Scheduler::new(1, 4);
        scheduler.close().await;
        scheduler.close().await;
    }
}
