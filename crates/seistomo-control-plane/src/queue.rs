//! Per-stage FIFO of task ids.

use std::sync::atomic::{AtomicUsize, Ordering};

use seistomo_core::{Stage, TaskId};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// Unbounded FIFO drained by exactly one worker loop.
///
/// The receiving half sits behind a mutex held for the whole of [`recv`],
/// so a second concurrent consumer simply waits.
///
/// [`recv`]: WorkQueue::recv
pub struct WorkQueue {
    stage: Stage,
    tx: mpsc::UnboundedSender<TaskId>,
    rx: Mutex<mpsc::UnboundedReceiver<TaskId>>,
    len: AtomicUsize,
}

impl WorkQueue {
    pub fn new(stage: Stage) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            stage,
            tx,
            rx: Mutex::new(rx),
            len: AtomicUsize::new(0),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Append a task id.
    pub fn enqueue(&self, task_id: TaskId) {
        self.len.fetch_add(1, Ordering::SeqCst);
        debug!(stage = %self.stage, task_id = %task_id, "Enqueued task");
        if let Err(mpsc::error::SendError(task_id)) = self.tx.send(task_id) {
            // The receiver lives as long as `self`, so this is unreachable in practice.
            self.len.fetch_sub(1, Ordering::SeqCst);
            warn!(stage = %self.stage, task_id = %task_id, "Queue closed, task dropped");
        }
    }

    /// Remove the head without waiting. `None` when empty or while the
    /// worker loop is parked in [`recv`](Self::recv).
    pub fn try_dequeue(&self) -> Option<TaskId> {
        let mut rx = self.rx.try_lock().ok()?;
        let task_id = rx.try_recv().ok()?;
        self.len.fetch_sub(1, Ordering::SeqCst);
        Some(task_id)
    }

    /// Wait for the next task id. Cancel-safe.
    pub async fn recv(&self) -> Option<TaskId> {
        let mut rx = self.rx.lock().await;
        let task_id = rx.recv().await?;
        self.len.fetch_sub(1, Ordering::SeqCst);
        Some(task_id)
    }

    /// Current backlog.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
