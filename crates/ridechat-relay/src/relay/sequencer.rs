//! Optional per-booking serialisation of message persistence.
//!
//! Each booking gets a single-consumer worker that runs submitted jobs one at
//! a time in submission order. Workers start on first use and exit after
//! `idle` without work.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::debug;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;
type Queues = Arc<Mutex<HashMap<i64, mpsc::UnboundedSender<Job>>>>;

/// Default idle period after which a booking's worker exits.
pub const DEFAULT_IDLE: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct RoomSequencer {
    queues: Queues,
    idle: Duration,
}

impl RoomSequencer {
    pub fn new(idle: Duration) -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            idle,
        }
    }

    /// Queue `job` behind every job previously submitted for `booking_id`.
    pub fn submit<F>(&self, booking_id: i64, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut job: Job = Box::pin(job);
        // Sends happen under the lock so a worker deciding to retire can be
        // sure no job slipped in behind its emptiness check.
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(tx) = queues.get(&booking_id) {
            match tx.send(job) {
                Ok(()) => return,
                // Worker died (job panicked); start a fresh one.
                Err(mpsc::error::SendError(returned)) => job = returned,
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if tx.send(job).is_err() {
            return;
        }
        queues.insert(booking_id, tx);
        drop(queues);

        debug!(booking_id, "Starting booking sequencer");
        tokio::spawn(run_worker(
            booking_id,
            rx,
            Arc::clone(&self.queues),
            self.idle,
        ));
    }

    /// Number of bookings with a live worker.
    pub fn active_queues(&self) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for RoomSequencer {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE)
    }
}

async fn run_worker(
    booking_id: i64,
    mut rx: mpsc::UnboundedReceiver<Job>,
    queues: Queues,
    idle: Duration,
) {
    loop {
        match timeout(idle, rx.recv()).await {
            Ok(Some(job)) => job.await,
            Ok(None) => break,
            Err(_) => {
                let mut queues = queues.lock().unwrap_or_else(PoisonError::into_inner);
                if rx.is_empty() {
                    queues.remove(&booking_id);
                    debug!(booking_id, "Booking sequencer idle, exiting");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn jobs_run_in_submission_order() {
        let sequencer = RoomSequencer::new(Duration::from_secs(5));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        // Earlier jobs take longer; without sequencing they would finish last.
        for (i, delay_ms) in [(1, 300_u64), (2, 200), (3, 100)] {
            let done_tx = done_tx.clone();
            sequencer.submit(42, async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                let _ = done_tx.send(i);
            });
        }

        let mut order = Vec::new();
        for _ in 0..3 {
            order.push(done_rx.recv().await.unwrap());
        }
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn bookings_do_not_block_each_other() {
        let sequencer = RoomSequencer::new(Duration::from_secs(5));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        let slow = done_tx.clone();
        sequencer.submit(1, async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            let _ = slow.send(1);
        });
        sequencer.submit(2, async move {
            let _ = done_tx.send(2);
        });

        assert_eq!(done_rx.recv().await.unwrap(), 2);
        assert_eq!(done_rx.recv().await.unwrap(), 1);
        assert_eq!(sequencer.active_queues(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_worker_retires_and_restarts() {
        let sequencer = RoomSequencer::new(Duration::from_secs(1));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        let first = done_tx.clone();
        sequencer.submit(7, async move {
            let _ = first.send("first");
        });
        assert_eq!(done_rx.recv().await.unwrap(), "first");

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(sequencer.active_queues(), 0);

        sequencer.submit(7, async move {
            let _ = done_tx.send("second");
        });
        assert_eq!(done_rx.recv().await.unwrap(), "second");
    }
}
