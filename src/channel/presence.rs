use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::messaging::{ProtocolEvent, PusherEvent};

/// A member of a presence channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceMember {
    pub id: String,
    #[serde(default)]
    pub info: Map<String, Value>,
}

impl PresenceMember {
    pub fn new(id: impl Into<String>, info: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            info,
        }
    }
}

/// Read-only view of a presence channel's members, keyed by member id
pub type MemberSnapshot = Arc<HashMap<String, PresenceMember>>;

#[derive(Debug, Clone, Deserialize)]
struct RawSubscriptionData {
    presence: RawPresence,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPresence {
    #[serde(default)]
    ids: Vec<Value>,
    #[serde(default)]
    hash: HashMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawMemberData {
    user_id: Value,
    #[serde(default)]
    user_info: Value,
}

/// Change applied by a member event
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceChange {
    Added(PresenceMember),
    Removed(PresenceMember),
    Updated(PresenceMember),
}

/// Member list of one presence channel
///
/// Only the subscription payload and member events mutate it; every mutation replaces the
/// shared snapshot, so a snapshot handed out earlier never changes underneath its holder.
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    members: MemberSnapshot,
    me: Option<String>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the member set with the one carried by a `subscription_succeeded` payload.
    ///
    /// Returns `false` (leaving the set untouched) if the payload has no presence section.
    pub fn seed(&mut self, event: &PusherEvent) -> bool {
        let Some(data) = event.data_as::<RawSubscriptionData>() else {
            tracing::warn!(
                "subscription_succeeded on {:?} carried no presence data",
                event.channel()
            );
            return false;
        };

        let mut members: HashMap<String, PresenceMember> = data
            .presence
            .hash
            .into_iter()
            .map(|(id, info)| (id.clone(), PresenceMember::new(id, info_map(info))))
            .collect();

        for id in data.presence.ids.iter().filter_map(member_id) {
            members
                .entry(id.clone())
                .or_insert_with(|| PresenceMember::new(id, Map::new()));
        }

        self.members = Arc::new(members);
        true
    }

    /// Applies a member-added, member-removed or member-updated event
    pub fn apply(&mut self, event: &PusherEvent) -> Option<PresenceChange> {
        let raw = match event.data_as::<RawMemberData>() {
            Some(raw) => raw,
            None => {
                tracing::warn!("Ignoring malformed presence event '{}'", event.name());
                return None;
            }
        };
        let Some(id) = member_id(&raw.user_id) else {
            tracing::warn!("Ignoring presence event '{}' without user_id", event.name());
            return None;
        };

        match event.kind() {
            ProtocolEvent::MemberAdded => {
                let member = PresenceMember::new(id, info_map(raw.user_info));
                Some(PresenceChange::Added(self.add_member(member)))
            }
            ProtocolEvent::MemberRemoved => self.remove_member(&id).map(PresenceChange::Removed),
            ProtocolEvent::MemberUpdated => self
                .update_member(&id, info_map(raw.user_info))
                .map(PresenceChange::Updated),
            _ => None,
        }
    }

    /// Inserts a member; an existing entry with the same id is overwritten
    pub fn add_member(&mut self, member: PresenceMember) -> PresenceMember {
        let members = Arc::make_mut(&mut self.members);
        if members.contains_key(&member.id) {
            tracing::warn!(
                "member_added for already present id '{}', overwriting",
                member.id
            );
        }
        members.insert(member.id.clone(), member.clone());
        member
    }

    /// Removes a member; unknown ids are a no-op
    pub fn remove_member(&mut self, id: &str) -> Option<PresenceMember> {
        if !self.members.contains_key(id) {
            return None;
        }
        Arc::make_mut(&mut self.members).remove(id)
    }

    /// Merges `info` into an existing member; unknown ids are ignored
    pub fn update_member(&mut self, id: &str, info: Map<String, Value>) -> Option<PresenceMember> {
        if !self.members.contains_key(id) {
            tracing::debug!("member_updated for unknown id '{}', ignoring", id);
            return None;
        }
        let member = Arc::make_mut(&mut self.members).get_mut(id)?;
        member.info.extend(info);
        Some(member.clone())
    }

    pub fn snapshot(&self) -> MemberSnapshot {
        Arc::clone(&self.members)
    }

    pub fn get(&self, id: &str) -> Option<&PresenceMember> {
        self.members.get(id)
    }

    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// Id of the local member, if known
    pub fn me(&self) -> Option<&str> {
        self.me.as_deref()
    }

    /// Records the local member id from the authorizer's `channel_data`
    pub fn set_me_from_channel_data(&mut self, channel_data: &str) {
        self.me = serde_json::from_str::<RawMemberData>(channel_data)
            .ok()
            .and_then(|raw| member_id(&raw.user_id));
    }

    /// Forgets all members (the local id is kept for the next subscription)
    pub fn clear(&mut self) {
        self.members = Arc::new(HashMap::new());
    }
}

fn member_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn info_map(info: Value) -> Map<String, Value> {
    match info {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            tracing::debug!("Non-object user_info {} treated as empty", other);
            Map::new()
        }
    }
}
