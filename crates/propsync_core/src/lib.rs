//! # propsync core
//!
//! Device-side engine keeping a set of named cloud properties in sync with
//! a remote telemetry service over a publish/subscribe transport.
//!
//! This crate provides:
//! - Properties with dirty tracking and echo suppression
//! - A cooperative scheduler running property hooks
//! - The connect → discover → sync protocol state machine
//! - Reconnection with bounded exponential backoff
//! - An in-memory transport for tests and simulations
//!
//! ## Architecture
//!
//! The [`Client`] owns everything: the [`Registry`] of properties, the
//! [`Scheduler`] and the [`Transport`]. One step function,
//! [`Client::update`], runs every due task. The same step drives both
//! execution modes: [`Client::run`] awaits it in a tokio loop, while in
//! [`ExecutionMode::Polled`] the host calls it from its own loop.
//!
//! ## Key Invariants
//!
//! - A value received from the cloud is never pushed back
//! - A property's value kind is fixed by its first assignment
//! - Objects are pushed only when every field is set
//! - A failing hook only takes down its own property

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod clock;
mod config;
mod error;
pub mod objects;
mod property;
mod protocol;
mod reconnect;
mod registry;
mod runtime;
mod scheduler;
pub mod topics;
mod transport;

pub use client::{Client, CONNECT_TASK, SYNC_TASK};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClientConfig, ExecutionMode, ReconnectConfig};
pub use error::{CallbackError, CallbackResult, ClientError, ClientResult};
pub use property::{Property, ReadHook, RunHook, WriteHook, WriteValue};
pub use protocol::SyncState;
pub use registry::{
    MergeReport, Registry, LAST_VALUES, LAST_VALUES_REQUEST, THING_ID, TZ_DST_UNTIL, TZ_OFFSET,
};
pub use scheduler::{Backoff, Scheduler, Task, TaskKind, TaskOutcome};
pub use transport::{MemoryHandle, MemoryTransport, Message, QoS, Transport};

pub use propsync_codec::{PackCodec, Record, SenmlCodec, Value, ValueKind};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
