//! Reconnection policy.
//!
//! The connection task retries with a growing interval (1 s, x1.2, capped
//! at 4 s by default) until the broker accepts the connection, then hands
//! off to the sync task and completes. Losing the connection later
//! schedules a fresh connection task starting again at the initial
//! interval.

use crate::client::{Client, CONNECT_TASK};
use crate::error::ClientResult;
use crate::protocol::SyncState;
use crate::scheduler::{Task, TaskKind, TaskOutcome};
use tracing::{debug, info, warn};

impl Client {
    /// Schedules the connection task unless it is already scheduled.
    pub(crate) fn schedule_reconnect(&mut self) {
        let reconnect = &self.config.reconnect;
        let task = Task::new(CONNECT_TASK, TaskKind::Connect, reconnect.initial_interval)
            .with_backoff(reconnect.backoff());
        if self.scheduler.add_if_absent(task) {
            info!(task = CONNECT_TASK, "task created");
        }
    }

    /// Body of the connection task.
    pub(crate) fn reconnect_step(&mut self) -> ClientResult<TaskOutcome> {
        self.state = SyncState::Connecting;
        info!(device_id = %self.config.device_id, "Connecting to cloud");

        let attempt = self.transport.connect().and_then(|()| self.on_connected());
        match attempt {
            Ok(()) => {
                info!(device_id = %self.config.device_id, state = ?self.state, "Connected");
                Ok(TaskOutcome::Done)
            }
            Err(err) => {
                let retry = self
                    .scheduler
                    .get(CONNECT_TASK)
                    .map_or(self.config.reconnect.initial_interval, Task::interval);
                warn!(
                    error = %err,
                    "Connection failed, retrying after {:.2}s",
                    retry.as_secs_f64()
                );
                self.state = SyncState::Connecting;
                if let Err(err) = self.transport.disconnect() {
                    debug!(error = %err, "disconnect failed");
                }
                Ok(TaskOutcome::Continue)
            }
        }
    }
}
