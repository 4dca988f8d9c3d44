//! Cloud properties.
//!
//! A [`Property`] is one named piece of device state mirrored in the cloud.
//! It is either a *leaf* holding a single scalar, an *object* grouping a
//! fixed set of leaf fields (transmitted as `"name:field"` records), or a
//! *task* that only carries a periodic `on_run` hook.
//!
//! Two flags drive synchronization:
//!
//! - `dirty`: changed locally, not yet pushed to the cloud.
//! - `write_pending`: changed by the cloud, not yet handed to `on_write`.
//!
//! Values arriving from the cloud clear `dirty`, which is what keeps the
//! client from echoing an update back to where it came from.

use crate::clock::unix_now;
use crate::client::Client;
use crate::error::{CallbackResult, ClientError, ClientResult};
use crate::scheduler::Backoff;
use propsync_codec::{Record, Value, ValueKind};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Hook producing a fresh value for the property.
pub type ReadHook = Arc<dyn Fn(&Client) -> CallbackResult<Value> + Send + Sync>;

/// Hook applying a cloud-originated value to the device.
pub type WriteHook = Arc<dyn Fn(&mut Client, &WriteValue) -> CallbackResult<()> + Send + Sync>;

/// Hook run on every scheduler tick of the property.
pub type RunHook = Arc<dyn Fn(&mut Client) -> CallbackResult<()> + Send + Sync>;

/// Value handed to an `on_write` hook.
#[derive(Debug, Clone)]
pub enum WriteValue {
    /// New value of a leaf property.
    Value(Value),
    /// Snapshot of an object property after the update.
    Object(Property),
}

impl WriteValue {
    /// Returns the scalar, if this is a leaf update.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            WriteValue::Value(v) => Some(v),
            WriteValue::Object(_) => None,
        }
    }

    /// Returns the object snapshot, if this is an object update.
    pub fn as_object(&self) -> Option<&Property> {
        match self {
            WriteValue::Object(p) => Some(p),
            WriteValue::Value(_) => None,
        }
    }

    /// Returns a field of an object update.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|p| p.field(key))
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Leaf(Option<Value>),
    Object(BTreeMap<String, Property>),
    Task,
}

/// A named, synchronized piece of device state.
#[derive(Clone)]
pub struct Property {
    name: String,
    slot: Slot,
    dirty: bool,
    write_pending: bool,
    timestamp: u64,
    interval: Option<Duration>,
    backoff: Option<Backoff>,
    on_read: Option<ReadHook>,
    on_write: Option<WriteHook>,
    on_run: Option<RunHook>,
}

impl Property {
    fn with_slot(name: impl Into<String>, slot: Slot) -> Self {
        Self {
            name: name.into(),
            slot,
            dirty: false,
            write_pending: false,
            timestamp: 0,
            interval: None,
            backoff: None,
            on_read: None,
            on_write: None,
            on_run: None,
        }
    }

    /// Creates an uninitialized leaf property.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_slot(name, Slot::Leaf(None))
    }

    /// Creates an object property with the given uninitialized fields.
    ///
    /// Fields are transmitted as `"name:field"`.
    pub fn object(name: impl Into<String>, fields: &[&str]) -> Self {
        let name = name.into();
        let children = fields
            .iter()
            .map(|field| {
                let child = Property::new(format!("{name}:{field}"));
                ((*field).to_string(), child)
            })
            .collect();
        Self::with_slot(name, Slot::Object(children))
    }

    /// Creates a task: a property that is never transmitted and only runs
    /// its `on_run` hook.
    pub fn task(name: impl Into<String>) -> Self {
        Self::with_slot(name, Slot::Task)
    }

    /// Sets the initial value of a leaf. Has no effect on objects and tasks.
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        if let Slot::Leaf(slot) = &mut self.slot {
            *slot = Some(value.into());
        }
        self
    }

    /// Sets the initial value of an object field. Unknown fields are ignored.
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        if let Some(child) = self.child_mut(key) {
            child.slot = Slot::Leaf(Some(value.into()));
        }
        self
    }

    /// Sets the read hook.
    pub fn on_read<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Client) -> CallbackResult<Value> + Send + Sync + 'static,
    {
        self.on_read = Some(Arc::new(hook));
        self
    }

    /// Sets the write hook.
    pub fn on_write<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Client, &WriteValue) -> CallbackResult<()> + Send + Sync + 'static,
    {
        self.on_write = Some(Arc::new(hook));
        self
    }

    /// Sets the run hook.
    pub fn on_run<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Client) -> CallbackResult<()> + Send + Sync + 'static,
    {
        self.on_run = Some(Arc::new(hook));
        self
    }

    /// Sets the task interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Grows the task interval after every run.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value of a leaf property.
    pub fn value(&self) -> Option<&Value> {
        match &self.slot {
            Slot::Leaf(value) => value.as_ref(),
            _ => None,
        }
    }

    /// Kind fixed by the first assignment of a leaf.
    pub fn kind(&self) -> Option<ValueKind> {
        self.value().map(Value::kind)
    }

    /// Returns true for leaf properties.
    pub fn is_leaf(&self) -> bool {
        matches!(self.slot, Slot::Leaf(_))
    }

    /// Returns true for object properties.
    pub fn is_object(&self) -> bool {
        matches!(self.slot, Slot::Object(_))
    }

    /// Returns true for tasks.
    pub fn is_task(&self) -> bool {
        matches!(self.slot, Slot::Task)
    }

    /// Object field by short name.
    pub fn child(&self, key: &str) -> Option<&Property> {
        match &self.slot {
            Slot::Object(children) => children.get(key),
            _ => None,
        }
    }

    fn child_mut(&mut self, key: &str) -> Option<&mut Property> {
        match &mut self.slot {
            Slot::Object(children) => children.get_mut(key),
            _ => None,
        }
    }

    /// Object fields, keyed by short name.
    pub fn children(&self) -> impl Iterator<Item = (&str, &Property)> {
        let children = match &self.slot {
            Slot::Object(children) => Some(children),
            _ => None,
        };
        children
            .into_iter()
            .flat_map(|c| c.iter().map(|(k, v)| (k.as_str(), v)))
    }

    /// Value of an object field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.child(key).and_then(Property::value)
    }

    /// Returns true if the property has a value: a leaf with a value, an
    /// object with every field set, or a task.
    pub fn is_initialized(&self) -> bool {
        match &self.slot {
            Slot::Leaf(value) => value.is_some(),
            Slot::Object(children) => children.values().all(Property::is_initialized),
            Slot::Task => true,
        }
    }

    /// Returns true if the property has any hook and therefore gets a task.
    pub fn is_runnable(&self) -> bool {
        self.on_read.is_some() || self.on_write.is_some() || self.on_run.is_some()
    }

    /// Returns true if the cloud may write this property.
    pub fn is_writable(&self) -> bool {
        self.on_write.is_some()
    }

    /// Returns true if the property changed locally since the last push.
    pub fn is_dirty(&self) -> bool {
        match &self.slot {
            Slot::Object(children) => children.values().any(Property::is_dirty),
            _ => self.dirty,
        }
    }

    /// Returns true if a cloud update awaits the `on_write` hook.
    pub fn is_write_pending(&self) -> bool {
        self.write_pending
    }

    /// Unix time of the last non-null assignment.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Task interval, if set on the property.
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Task backoff, if set on the property.
    pub fn backoff(&self) -> Option<Backoff> {
        self.backoff
    }

    pub(crate) fn read_hook(&self) -> Option<ReadHook> {
        self.on_read.clone()
    }

    pub(crate) fn write_hook(&self) -> Option<WriteHook> {
        self.on_write.clone()
    }

    pub(crate) fn run_hook(&self) -> Option<RunHook> {
        self.on_run.clone()
    }

    /// Assigns a leaf value locally, stamped with the system time.
    ///
    /// Registered properties are updated through [`Client::set`], which
    /// stamps with the client's clock instead.
    pub fn set_value(&mut self, value: impl Into<Option<Value>>) -> ClientResult<()> {
        self.set_value_at(value.into(), unix_now())
    }

    /// Assigns a leaf value locally.
    ///
    /// `None` is ignored. The first value fixes the property's kind and does
    /// not mark it dirty; later values must have the same kind (an integer
    /// assigned to a float property is widened) and mark it dirty.
    #[allow(clippy::cast_precision_loss)]
    pub fn set_value_at(&mut self, value: Option<Value>, timestamp: u64) -> ClientResult<()> {
        let Some(mut value) = value else {
            return Ok(());
        };
        let current = match &mut self.slot {
            Slot::Leaf(current) => current,
            _ => return Err(ClientError::NotALeaf(self.name.clone())),
        };

        match current {
            None => {
                debug!(property = %self.name, value = %value, "initialized");
                *current = Some(value);
            }
            Some(existing) => {
                let widened = match (&*existing, &value) {
                    (Value::Float(_), Value::Integer(n)) => Some(Value::Float(*n as f64)),
                    _ => None,
                };
                if let Some(widened) = widened {
                    value = widened;
                }
                if existing.kind() != value.kind() {
                    return Err(ClientError::TypeMismatch {
                        name: self.name.clone(),
                        expected: existing.kind(),
                        found: value.kind(),
                    });
                }
                *existing = value;
                self.dirty = true;
            }
        }
        self.timestamp = timestamp;
        Ok(())
    }

    /// Assigns an object field locally, stamped with the system time.
    ///
    /// See [`Client::set_child`] for registered properties.
    pub fn set_field(&mut self, key: &str, value: impl Into<Option<Value>>) -> ClientResult<()> {
        self.set_field_at(key, value.into(), unix_now())
    }

    pub(crate) fn set_field_at(
        &mut self,
        key: &str,
        value: Option<Value>,
        timestamp: u64,
    ) -> ClientResult<()> {
        if !self.is_object() {
            return Err(ClientError::NotAComposite(self.name.clone()));
        }
        let name = self.name.clone();
        let child = self
            .child_mut(key)
            .ok_or_else(|| ClientError::UnknownChild {
                name,
                field: key.to_string(),
            })?;
        let assigned = value.is_some();
        child.set_value_at(value, timestamp)?;
        if assigned {
            self.timestamp = timestamp;
        }
        Ok(())
    }

    /// Applies a value received from the cloud.
    pub fn mark_from_network(&mut self, value: Option<Value>, timestamp: u64) -> ClientResult<()> {
        self.set_value_at(value, timestamp)?;
        self.clear_dirty();
        self.write_pending = true;
        Ok(())
    }

    /// Applies an object field received from the cloud.
    ///
    /// The whole object becomes clean and is handed to `on_write` as one.
    pub fn mark_field_from_network(
        &mut self,
        key: &str,
        value: Option<Value>,
        timestamp: u64,
    ) -> ClientResult<()> {
        self.set_field_at(key, value, timestamp)?;
        self.clear_dirty();
        self.write_pending = true;
        Ok(())
    }

    /// Restamps the property and its fields.
    pub(crate) fn stamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
        if let Slot::Object(children) = &mut self.slot {
            for child in children.values_mut() {
                child.timestamp = timestamp;
            }
        }
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
        if let Slot::Object(children) = &mut self.slot {
            for child in children.values_mut() {
                child.dirty = false;
            }
        }
    }

    pub(crate) fn mark_dirty(&mut self) {
        match &mut self.slot {
            Slot::Object(children) => {
                for child in children.values_mut() {
                    child.dirty = true;
                }
            }
            Slot::Leaf(_) => self.dirty = true,
            Slot::Task => {}
        }
    }

    /// Clears the pending write and returns the value to hand to `on_write`.
    ///
    /// Returns `None` when the property has no write hook or nothing is
    /// pending.
    pub(crate) fn take_write(&mut self) -> Option<WriteValue> {
        if self.on_write.is_none() || !self.write_pending {
            return None;
        }
        self.write_pending = false;
        match &self.slot {
            Slot::Object(_) => Some(WriteValue::Object(self.clone())),
            Slot::Leaf(value) => value.clone().map(WriteValue::Value),
            Slot::Task => None,
        }
    }

    /// Appends this property's records to an outbound batch and clears
    /// `dirty`.
    ///
    /// With `require_initialized`, objects are only listed once every field
    /// is set and leaves only when they have a value. Without it, leaves
    /// with no value are listed by name, which is how missing values are
    /// requested.
    pub fn add_to_outbound(&mut self, batch: &mut Vec<Record>, require_initialized: bool) {
        let initialized = self.is_initialized();
        match &mut self.slot {
            Slot::Object(children) => {
                if initialized || !require_initialized {
                    for child in children.values_mut() {
                        child.add_to_outbound(batch, require_initialized);
                    }
                }
            }
            Slot::Leaf(Some(value)) => batch.push(Record {
                name: self.name.clone(),
                value: Some(value.clone()),
                timestamp: Some(self.timestamp),
            }),
            Slot::Leaf(None) => {
                if !require_initialized {
                    batch.push(Record::name_only(self.name.clone()));
                }
            }
            Slot::Task => {}
        }
        self.clear_dirty();
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("slot", &self.slot)
            .field("dirty", &self.dirty)
            .field("write_pending", &self.write_pending)
            .field("timestamp", &self.timestamp)
            .field("runnable", &self.is_runnable())
            .finish()
    }
}
