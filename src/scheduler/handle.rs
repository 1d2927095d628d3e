//! Per-registration schedule handle.
//!
//! Cancellation is an explicit state transition (`Scheduled -> Cancelled`)
//! owned by the registration record, not an implicit side effect of
//! overwriting a map entry. A cancelled tick never fires: cancelling aborts
//! the schedule task, including any sleep in progress.

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScheduleStatus {
    Scheduled,
    Cancelled,
}

#[derive(Debug)]
pub(crate) struct ScheduleHandle {
    task: JoinHandle<()>,
    status: Mutex<ScheduleStatus>,
}

impl ScheduleHandle {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self {
            task,
            status: Mutex::new(ScheduleStatus::Scheduled),
        }
    }

    /// Transition to `Cancelled` and abort the schedule task. Idempotent.
    pub(crate) fn cancel(&self) {
        let mut status = self.status.lock();
        if *status == ScheduleStatus::Cancelled {
            return;
        }
        *status = ScheduleStatus::Cancelled;
        self.task.abort();
        debug!("Schedule handle cancelled");
    }

    pub(crate) fn status(&self) -> ScheduleStatus {
        *self.status.lock()
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_is_an_explicit_transition() {
        let task = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        });
        let handle = ScheduleHandle::new(task);
        assert_eq!(handle.status(), ScheduleStatus::Scheduled);

        handle.cancel();
        assert_eq!(handle.status(), ScheduleStatus::Cancelled);

        // Idempotent.
        handle.cancel();
        assert_eq!(handle.status(), ScheduleStatus::Cancelled);
    }
}
