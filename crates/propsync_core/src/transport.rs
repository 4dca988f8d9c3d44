//! Transport layer abstraction for the pub/sub connection.

use crate::error::{ClientError, ClientResult};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Delivery guarantee requested for a publish or subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    /// Fire and forget.
    #[default]
    AtMostOnce,
    /// Acknowledged delivery.
    AtLeastOnce,
}

/// A pub/sub transport.
///
/// This trait abstracts the broker connection (MQTT over TLS in a real
/// deployment, an in-process loopback in tests). Credentials and wire
/// framing are the implementation's concern.
pub trait Transport: Send {
    /// Opens the connection.
    fn connect(&mut self) -> ClientResult<()>;

    /// Subscribes to a topic.
    fn subscribe(&mut self, topic: &str, qos: QoS) -> ClientResult<()>;

    /// Publishes a payload.
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> ClientResult<()>;

    /// Delivers every queued inbound message to `handler` and returns how
    /// many were delivered. Must not block.
    fn poll_incoming(&mut self, handler: &mut dyn FnMut(&str, &[u8])) -> ClientResult<usize>;

    /// Sends a keepalive ping.
    fn ping(&mut self) -> ClientResult<()>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;

    /// Closes the connection.
    fn disconnect(&mut self) -> ClientResult<()>;
}

/// A message seen by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Topic.
    pub topic: String,
    /// Payload.
    pub payload: Bytes,
    /// Requested QoS.
    pub qos: QoS,
}

#[derive(Debug, Default)]
struct MemoryState {
    connected: bool,
    failing_connects: u32,
    failing_publishes: bool,
    connect_attempts: u32,
    pings: u32,
    subscriptions: Vec<(String, QoS)>,
    inbox: VecDeque<Message>,
    outbox: Vec<Message>,
}

/// An in-process transport.
///
/// The device side is driven by the client; the [`MemoryHandle`] obtained
/// from [`MemoryTransport::handle`] plays the broker and the cloud.
/// Only messages on subscribed topics are delivered.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

/// Cloud-side view of a [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    /// Creates a disconnected transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle sharing this transport's state.
    pub fn handle(&self) -> MemoryHandle {
        MemoryHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self) -> ClientResult<()> {
        let mut state = self.state.lock();
        state.connect_attempts += 1;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(ClientError::Transport("connection refused".into()));
        }
        state.connected = true;
        state.subscriptions.clear();
        Ok(())
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> ClientResult<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(ClientError::Transport("not connected".into()));
        }
        if !state.subscriptions.iter().any(|(t, _)| t == topic) {
            state.subscriptions.push((topic.to_string(), qos));
        }
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> ClientResult<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(ClientError::Transport("not connected".into()));
        }
        if state.failing_publishes {
            return Err(ClientError::Transport("publish rejected".into()));
        }
        state.outbox.push(Message {
            topic: topic.to_string(),
            payload: Bytes::copy_from_slice(payload),
            qos,
        });
        Ok(())
    }

    fn poll_incoming(&mut self, handler: &mut dyn FnMut(&str, &[u8])) -> ClientResult<usize> {
        let delivered: Vec<Message> = {
            let mut state = self.state.lock();
            if !state.connected {
                return Err(ClientError::Transport("not connected".into()));
            }
            let queued: Vec<Message> = state.inbox.drain(..).collect();
            queued
                .into_iter()
                .filter(|m| state.subscriptions.iter().any(|(t, _)| *t == m.topic))
                .collect()
        };
        for message in &delivered {
            handler(&message.topic, &message.payload);
        }
        Ok(delivered.len())
    }

    fn ping(&mut self) -> ClientResult<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(ClientError::Transport("not connected".into()));
        }
        state.pings += 1;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn disconnect(&mut self) -> ClientResult<()> {
        self.state.lock().connected = false;
        Ok(())
    }
}

impl MemoryHandle {
    /// Queues a message for the device.
    pub fn inject(&self, topic: impl Into<String>, payload: impl Into<Bytes>) {
        self.state.lock().inbox.push_back(Message {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtLeastOnce,
        });
    }

    /// Makes the next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.state.lock().failing_connects = count;
    }

    /// Makes publishes fail until reset.
    pub fn set_publish_failure(&self, failing: bool) {
        self.state.lock().failing_publishes = failing;
    }

    /// Drops the connection as a broker would.
    pub fn drop_connection(&self) {
        let mut state = self.state.lock();
        state.connected = false;
        state.subscriptions.clear();
    }

    /// Returns true while the device is connected.
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Messages published by the device so far.
    pub fn published(&self) -> Vec<Message> {
        self.state.lock().outbox.clone()
    }

    /// Takes the messages published by the device so far.
    pub fn take_published(&self) -> Vec<Message> {
        std::mem::take(&mut self.state.lock().outbox)
    }

    /// Current subscriptions.
    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.state.lock().subscriptions.clone()
    }

    /// Returns true if the device subscribed to `topic`.
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.state.lock().subscriptions.iter().any(|(t, _)| t == topic)
    }

    /// Number of connection attempts.
    pub fn connect_attempts(&self) -> u32 {
        self.state.lock().connect_attempts
    }

    /// Number of pings received.
    pub fn pings(&self) -> u32 {
        self.state.lock().pings
    }
}
