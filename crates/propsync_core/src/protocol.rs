//! Sync protocol state machine.
//!
//! ```text
//! Disconnected -> Connecting -> Discovering -> Syncing
//!                     ^                           |
//!                     +------ transport error ----+
//! ```
//!
//! While `Discovering`, the client listens on its device topic until the
//! cloud assigns a thing id. It then subscribes to the thing topics, asks
//! the shadow for the last known values of its uninitialized properties and
//! enters `Syncing`, where every tick merges inbound updates and pushes
//! dirty properties.

use crate::client::{Client, SYNC_TASK};
use crate::error::{ClientError, ClientResult};
use crate::property::Property;
use crate::registry::{LAST_VALUES, THING_ID};
use crate::scheduler::{Task, TaskKind, TaskOutcome};
use crate::topics::ThingTopics;
use crate::transport::QoS;
use propsync_codec::Value;
use tracing::{debug, info, warn};

/// Connection state of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// Not started.
    #[default]
    Disconnected,
    /// Waiting for the broker connection.
    Connecting,
    /// Connected, waiting for the thing id.
    Discovering,
    /// Connected and synchronizing properties.
    Syncing,
}

impl SyncState {
    /// Returns true once the broker connection is established.
    pub fn is_connected(&self) -> bool {
        matches!(self, SyncState::Discovering | SyncState::Syncing)
    }

    /// Returns true while properties are synchronized.
    pub fn is_syncing(&self) -> bool {
        matches!(self, SyncState::Syncing)
    }
}

impl Client {
    /// Subscribes after a successful connect and schedules the sync task.
    pub(crate) fn on_connected(&mut self) -> ClientResult<()> {
        match self.topics.clone() {
            None => {
                self.transport
                    .subscribe(&self.device_topic, QoS::AtLeastOnce)?;
                self.state = SyncState::Discovering;
            }
            Some(topics) => {
                self.transport.subscribe(&topics.inbound, QoS::AtMostOnce)?;
                if self.registry.last_values_pending() {
                    self.request_last_values(&topics)?;
                }
                self.state = SyncState::Syncing;
            }
        }
        self.last_keepalive = self.clock.now();

        let task = Task::new(SYNC_TASK, TaskKind::Sync, self.config.sync_interval);
        if self.scheduler.add_if_absent(task) {
            info!(task = SYNC_TASK, "task created");
        }
        Ok(())
    }

    /// Body of the sync task.
    pub(crate) fn sync_step(&mut self) -> ClientResult<TaskOutcome> {
        match self.state {
            SyncState::Discovering => self.discovery_step(),
            SyncState::Syncing => self.push_step(),
            SyncState::Disconnected | SyncState::Connecting => Err(
                ClientError::Transport("sync task running without a connection".into()),
            ),
        }
    }

    /// Stops syncing and schedules a fresh connection attempt. Property
    /// state is kept.
    pub(crate) fn on_sync_lost(&mut self) {
        self.scheduler.remove(SYNC_TASK);
        if let Err(err) = self.transport.disconnect() {
            debug!(error = %err, "disconnect failed");
        }
        self.state = SyncState::Connecting;
        self.schedule_reconnect();
    }

    fn drain_inbound(&mut self) -> ClientResult<usize> {
        let mut inbox: Vec<(String, Vec<u8>)> = Vec::new();
        let count = self
            .transport
            .poll_incoming(&mut |topic, payload| inbox.push((topic.to_string(), payload.to_vec())))?;

        let timestamp = self.clock.unix_time();
        for (topic, payload) in inbox {
            debug!(topic = %topic, bytes = payload.len(), "message received");
            match self
                .registry
                .merge_inbound(&topic, &payload, self.codec.as_ref(), timestamp)
            {
                Ok(report) => debug!(topic = %topic, ?report, "message merged"),
                Err(err) => warn!(topic = %topic, error = %err, "dropping malformed message"),
            }
        }
        Ok(count)
    }

    fn discovery_step(&mut self) -> ClientResult<TaskOutcome> {
        self.drain_inbound()?;

        let discovered = self
            .registry
            .get(THING_ID)
            .is_some_and(Property::is_initialized);
        if !discovered {
            return Ok(TaskOutcome::Continue);
        }

        let thing_id = self
            .registry
            .remove(THING_ID)
            .and_then(|p| p.value().map(Value::to_string))
            .unwrap_or_default();
        if thing_id.is_empty() {
            return Err(ClientError::EmptyIdentity);
        }

        let topics = ThingTopics::new(&thing_id);
        self.thing_id = Some(thing_id);
        self.topics = Some(topics.clone());

        self.transport.subscribe(&topics.inbound, QoS::AtMostOnce)?;
        if self.registry.last_values_pending() {
            self.request_last_values(&topics)?;
        }
        self.state = SyncState::Syncing;
        info!(thing_id = ?self.thing_id, "Device configured via discovery protocol");
        Ok(TaskOutcome::Continue)
    }

    /// Publishes the last-values request on the shadow topic. The request
    /// is dropped from the registry only once it has been sent.
    fn request_last_values(&mut self, topics: &ThingTopics) -> ClientResult<()> {
        let Some(request) = self.registry.get(LAST_VALUES) else {
            return Ok(());
        };
        let mut batch = Vec::new();
        request.clone().add_to_outbound(&mut batch, false);
        let payload = self.codec.encode(&batch)?;

        self.transport.subscribe(&topics.shadow_in, QoS::AtLeastOnce)?;
        self.transport
            .publish(&topics.shadow_out, &payload, QoS::AtLeastOnce)?;
        self.registry.remove(LAST_VALUES);
        info!(topic = %topics.shadow_out, "requested last values from shadow");
        Ok(())
    }

    fn push_step(&mut self) -> ClientResult<TaskOutcome> {
        self.drain_inbound()?;

        let Some(outbound) = self.topics.as_ref().map(|t| t.outbound.clone()) else {
            return Ok(TaskOutcome::Continue);
        };
        let now = self.clock.now();
        let (batch, drained) = self.registry.take_outbound();

        if !batch.is_empty() {
            for record in &batch {
                debug!(record = %record.name, value = ?record.value, "pushing");
            }
            let sent = self
                .codec
                .encode(&batch)
                .map_err(ClientError::from)
                .and_then(|payload| {
                    self.transport
                        .publish(&outbound, &payload, QoS::AtLeastOnce)
                });
            if let Err(err) = sent {
                self.registry.restore_dirty(&drained);
                return Err(err);
            }
            self.last_keepalive = now;
        } else if !self.config.keepalive.is_zero()
            && now.saturating_sub(self.last_keepalive) > self.config.keepalive
        {
            self.transport.ping()?;
            self.last_keepalive = now;
            debug!("no records to push, sent a ping request");
        }
        Ok(TaskOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_predicates() {
        assert_eq!(SyncState::default(), SyncState::Disconnected);
        assert!(!SyncState::Connecting.is_connected());
        assert!(SyncState::Discovering.is_connected());
        assert!(SyncState::Syncing.is_connected());
        assert!(SyncState::Syncing.is_syncing());
        assert!(!SyncState::Discovering.is_syncing());
    }
}
