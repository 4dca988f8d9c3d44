//! Property registry.

use crate::error::{ClientError, ClientResult};
use crate::property::Property;
use crate::topics::is_shadow_topic;
use propsync_codec::{PackCodec, Record};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Name of the pseudo-property requesting the last known values.
pub const LAST_VALUES: &str = "r:m";

/// Value of the last-values request.
pub const LAST_VALUES_REQUEST: &str = "getLastValues";

/// Thing id, initialized by discovery.
pub const THING_ID: &str = "thing_id";

/// Time zone offset in seconds, initialized by the cloud.
pub const TZ_OFFSET: &str = "tz_offset";

/// End of the current daylight saving period, initialized by the cloud.
pub const TZ_DST_UNTIL: &str = "tz_dst_until";

/// What happened to the records of one inbound message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Records applied to a property.
    pub applied: usize,
    /// Records for registered properties not accepting updates.
    pub ignored: usize,
    /// Records for names that are not registered.
    pub unknown: usize,
    /// Records rejected by the property (wrong type or field).
    pub rejected: usize,
    /// Records carrying no value.
    pub skipped: usize,
}

enum Merge {
    Applied,
    Ignored,
    Unknown,
    Rejected,
    Skipped,
}

/// Properties of a client, keyed by name.
#[derive(Debug, Default)]
pub struct Registry {
    records: BTreeMap<String, Property>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no property is registered.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns true if a property with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// Looks up a property.
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.records.get(name)
    }

    /// Looks up a property for mutation.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.records.get_mut(name)
    }

    /// Properties in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.records.values()
    }

    /// Inserts a property. Names must be unique.
    pub fn insert(&mut self, property: Property) -> ClientResult<()> {
        if self.contains(property.name()) {
            return Err(ClientError::DuplicateProperty(property.name().to_string()));
        }
        self.records.insert(property.name().to_string(), property);
        Ok(())
    }

    /// Removes a property.
    pub fn remove(&mut self, name: &str) -> Option<Property> {
        self.records.remove(name)
    }

    /// Returns true while the last-values request has not been sent.
    pub fn last_values_pending(&self) -> bool {
        self.contains(LAST_VALUES)
    }

    /// Names of the properties that accept values from `topic`.
    ///
    /// Uninitialized properties accept values from anywhere. Writable
    /// properties accept live updates but not shadow replies, so a stale
    /// shadow value never overrides the device's own state.
    pub fn staged_for(&self, topic: &str) -> BTreeSet<String> {
        let shadow = is_shadow_topic(topic);
        self.records
            .values()
            .filter(|p| !p.is_initialized() || (p.is_writable() && !shadow))
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Drains every dirty property into a push batch.
    ///
    /// Returns the records and the names of the drained properties, so
    /// they can be marked dirty again if the push fails.
    pub fn take_outbound(&mut self) -> (Vec<Record>, Vec<String>) {
        let mut batch = Vec::new();
        let mut drained = Vec::new();
        for property in self.records.values_mut().filter(|p| p.is_dirty()) {
            property.add_to_outbound(&mut batch, true);
            drained.push(property.name().to_string());
        }
        (batch, drained)
    }

    /// Marks properties dirty again after a failed push.
    pub fn restore_dirty(&mut self, names: &[String]) {
        for name in names {
            if let Some(property) = self.records.get_mut(name) {
                property.mark_dirty();
            }
        }
    }

    /// Decodes an inbound message and applies its records.
    pub fn merge_inbound(
        &mut self,
        topic: &str,
        payload: &[u8],
        codec: &dyn PackCodec,
        timestamp: u64,
    ) -> ClientResult<MergeReport> {
        let staged = self.staged_for(topic);
        let mut records = Vec::new();
        codec.decode(payload, &mut |record| records.push(record))?;

        let mut report = MergeReport::default();
        for record in records {
            match self.apply(record, &staged, timestamp) {
                Merge::Applied => report.applied += 1,
                Merge::Ignored => report.ignored += 1,
                Merge::Unknown => report.unknown += 1,
                Merge::Rejected => report.rejected += 1,
                Merge::Skipped => report.skipped += 1,
            }
        }
        Ok(report)
    }

    fn apply(&mut self, record: Record, staged: &BTreeSet<String>, timestamp: u64) -> Merge {
        let (target, field) = if self.records.contains_key(&record.name) {
            (record.name.as_str(), None)
        } else {
            record.split_name()
        };

        if !staged.contains(target) {
            if self.records.contains_key(target) {
                info!(record = %record.name, "Ignoring cloud initialization for record");
                return Merge::Ignored;
            }
            warn!(record = %record.name, "Unknown record found");
            return Merge::Unknown;
        }
        let Some(property) = self.records.get_mut(target) else {
            return Merge::Unknown;
        };
        let Some(value) = record.value.clone() else {
            debug!(record = %record.name, "skipping record without value");
            return Merge::Skipped;
        };

        let result = match field {
            None => property.mark_from_network(Some(value), timestamp),
            Some(field) => property.mark_field_from_network(field, Some(value), timestamp),
        };
        match result {
            Ok(()) => {
                debug!(record = %record.name, "updated from cloud");
                Merge::Applied
            }
            Err(err) => {
                warn!(record = %record.name, error = %err, "rejected cloud value");
                Merge::Rejected
            }
        }
    }
}
