//! Fire-and-forget background tasks.
//!
//! Handlers submit a task and move on; delivery is the queue's contract.
//! The worker runs on a spawned Tokio task and drains an unbounded channel,
//! handing each task to the external notification dispatcher.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Notify subscribers that the course changed.
    CourseUpdated(u64),
}

/// Handle for submitting tasks. Cheap to clone into router state.
#[derive(Clone)]
pub struct TaskQueue {
    tx: UnboundedSender<Task>,
}

impl TaskQueue {
    /// Channel plus its receiving end; callers pass the receiver to
    /// `run_worker` (or drain it themselves in tests).
    pub fn new() -> (Self, UnboundedReceiver<Task>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns immediately. A closed worker is logged, never surfaced to the
    /// submitting handler.
    pub fn submit(&self, task: Task) {
        if self.tx.send(task).is_err() {
            warn!("task queue worker is gone; dropping task");
        }
    }
}

/// Drain tasks until the queue side is dropped.
pub async fn run_worker(mut rx: UnboundedReceiver<Task>) {
    while let Some(task) = rx.recv().await {
        match task {
            Task::CourseUpdated(course_id) => send_email_course_update(course_id).await,
        }
    }
}

/// External collaborator: the real mail dispatch lives outside this service,
/// so this end just records the handoff.
async fn send_email_course_update(course_id: u64) {
    info!(course_id, "dispatching course update email");
}
