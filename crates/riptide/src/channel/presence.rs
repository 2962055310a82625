//! Presence rosters derived from server events.
//!
//! The roster is rebuilt atomically from the subscription acknowledgement
//! (`data.presence.hash`) and then patched by `member_added` /
//! `member_removed` deltas. Duplicate adds overwrite; removing an absent id
//! is ignored.

use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// A member of a presence channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// The member's user id.
    pub id: String,
    /// The member's user info as a JSON string, when the server sent any.
    pub info: Option<String>,
}

fn info_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(inner) => Some(inner),
        other => Some(other.to_string()),
    }
}

/// The member set of one presence channel, plus the local member's id.
#[derive(Debug, Default)]
pub(crate) struct MemberRoster {
    members: BTreeMap<String, Member>,
    my_id: Option<String>,
}

impl MemberRoster {
    /// Replace the whole roster from a subscription acknowledgement.
    /// Returns the new members in the server's announcement order.
    pub fn replace(&mut self, snapshot: PresenceSnapshot) -> Vec<Member> {
        self.members.clear();
        let mut hash = snapshot.hash;
        let mut ordered = Vec::with_capacity(snapshot.ids.len());
        for id in snapshot.ids {
            let info = hash.remove(&id).and_then(info_string);
            let member = Member {
                id: id.clone(),
                info,
            };
            self.members.insert(id, member.clone());
            ordered.push(member);
        }
        // Tolerate hash entries the ids list omitted.
        let mut extras: Vec<(String, Value)> = hash.into_iter().collect();
        extras.sort_by(|a, b| a.0.cmp(&b.0));
        for (id, value) in extras {
            let member = Member {
                id: id.clone(),
                info: info_string(value),
            };
            self.members.insert(id, member.clone());
            ordered.push(member);
        }
        ordered
    }

    /// Insert or overwrite one member.
    pub fn insert(&mut self, member: Member) {
        self.members.insert(member.id.clone(), member);
    }

    /// Remove one member, returning it when it was present.
    pub fn remove(&mut self, id: &str) -> Option<Member> {
        self.members.remove(id)
    }

    /// All members, ordered by id.
    pub fn members(&self) -> Vec<Member> {
        self.members.values().cloned().collect()
    }

    pub fn my_id(&self) -> Option<&str> {
        self.my_id.as_deref()
    }

    pub fn set_my_id(&mut self, id: String) {
        self.my_id = Some(id);
    }
}

/// `data` of a presence subscription acknowledgement.
#[derive(Debug, Deserialize)]
pub(crate) struct PresencePayload {
    pub presence: PresenceSnapshot,
}

/// `data.presence` of a subscription acknowledgement.
#[derive(Debug, Deserialize)]
pub(crate) struct PresenceSnapshot {
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub hash: HashMap<String, Value>,
    #[serde(default)]
    #[allow(dead_code)]
    pub count: Option<u64>,
}

/// `data` of `pusher_internal:member_added`.
#[derive(Debug, Deserialize)]
pub(crate) struct MemberAddedPayload {
    pub user_id: String,
    #[serde(default)]
    pub user_info: Option<Value>,
}

impl MemberAddedPayload {
    pub fn into_member(self) -> Member {
        Member {
            id: self.user_id,
            info: self.user_info.and_then(info_string),
        }
    }
}

/// `data` of `pusher_internal:member_removed`.
#[derive(Debug, Deserialize)]
pub(crate) struct MemberRemovedPayload {
    pub user_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(value: serde_json::Value) -> PresenceSnapshot {
        serde_json::from_value::<PresencePayload>(value).unwrap().presence
    }

    #[test]
    fn test_replace_builds_roster_in_announcement_order() {
        let mut roster = MemberRoster::default();
        roster.insert(Member {
            id: "stale".into(),
            info: None,
        });

        let members = roster.replace(snapshot(json!({
            "presence": {
                "ids": ["a", "b"],
                "hash": {"a": {}, "b": {"name": "Bee"}},
                "count": 2,
            }
        })));

        assert_eq!(members.len(), 2);
        assert_eq!(members[0].id, "a");
        assert_eq!(members[1].id, "b");
        assert_eq!(members[1].info.as_deref(), Some("{\"name\":\"Bee\"}"));
        assert!(roster.remove("stale").is_none());
    }

    #[test]
    fn test_duplicate_add_overwrites() {
        let mut roster = MemberRoster::default();
        roster.insert(Member {
            id: "a".into(),
            info: None,
        });
        roster.insert(Member {
            id: "a".into(),
            info: Some("{\"name\":\"Ada\"}".into()),
        });

        let members = roster.members();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].info.as_deref(), Some("{\"name\":\"Ada\"}"));
    }

    #[test]
    fn test_remove_absent_id_is_silent() {
        let mut roster = MemberRoster::default();
        assert!(roster.remove("ghost").is_none());
    }

    #[test]
    fn test_member_added_payload_parses_with_and_without_info() {
        let with_info: MemberAddedPayload =
            serde_json::from_value(json!({"user_id": "c", "user_info": {"name": "Cee"}})).unwrap();
        let member = with_info.into_member();
        assert_eq!(member.id, "c");
        assert_eq!(member.info.as_deref(), Some("{\"name\":\"Cee\"}"));

        let bare: MemberAddedPayload = serde_json::from_value(json!({"user_id": "d"})).unwrap();
        assert!(bare.into_member().info.is_none());
    }

    #[test]
    fn test_my_id_round_trip() {
        let mut roster = MemberRoster::default();
        assert!(roster.my_id().is_none());
        roster.set_my_id("u1".into());
        assert_eq!(roster.my_id(), Some("u1"));
    }
}
