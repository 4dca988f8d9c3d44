//! Topic layout.

/// Topic on which the device receives its thing id.
pub fn device_inbound(device_id: &str) -> String {
    format!("/a/d/{device_id}/e/i")
}

/// Returns true for shadow (last known values) topics.
pub fn is_shadow_topic(topic: &str) -> bool {
    topic.contains("shadow")
}

/// Topics of a thing, derived once its id is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThingTopics {
    /// Cloud to device updates.
    pub inbound: String,
    /// Device to cloud updates.
    pub outbound: String,
    /// Shadow replies.
    pub shadow_in: String,
    /// Shadow requests.
    pub shadow_out: String,
}

impl ThingTopics {
    /// Derives the topics of a thing.
    pub fn new(thing_id: &str) -> Self {
        Self {
            inbound: thing_topic(thing_id, "e", "i"),
            outbound: thing_topic(thing_id, "e", "o"),
            shadow_in: thing_topic(thing_id, "shadow", "i"),
            shadow_out: thing_topic(thing_id, "shadow", "o"),
        }
    }
}

fn thing_topic(thing_id: &str, channel: &str, direction: &str) -> String {
    format!("/a/t/{thing_id}/{channel}/{direction}")
}
