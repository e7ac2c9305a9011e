//! 在线状态跟踪（`user:online` / `user:offline`）

use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone)]
pub struct PresenceTracker {
    users: HashMap<String, Presence>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回状态是否发生变化
    pub fn set_online(&mut self, user_id: &str, at: DateTime<Utc>) -> bool {
        let entry = self.users.entry(user_id.to_string()).or_insert(Presence {
            online: false,
            last_seen: None,
        });
        let changed = !entry.online;
        entry.online = true;
        entry.last_seen = Some(at);
        changed
    }

    pub fn set_offline(&mut self, user_id: &str, last_seen: DateTime<Utc>) -> bool {
        let entry = self.users.entry(user_id.to_string()).or_insert(Presence {
            online: true,
            last_seen: None,
        });
        let changed = entry.online;
        entry.online = false;
        entry.last_seen = Some(last_seen);
        changed
    }

    pub fn get(&self, user_id: &str) -> Option<&Presence> {
        self.users.get(user_id)
    }

    pub fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self
            .users
            .iter()
            .filter(|(_, p)| p.online)
            .map(|(id, _)| id.clone())
            .collect();
        users.sort();
        users
    }

    pub fn clear(&mut self) {
        self.users.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn online_offline_transitions() {
        let mut p = PresenceTracker::new();
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let t1 = Utc.timestamp_opt(1_700_000_060, 0).unwrap();

        assert!(p.set_online("bob", t0));
        assert!(!p.set_online("bob", t0));
        assert_eq!(p.online_users(), vec!["bob".to_string()]);

        assert!(p.set_offline("bob", t1));
        assert!(p.online_users().is_empty());
        assert!(!p.get("bob").unwrap().online);
        assert_eq!(p.get("bob").unwrap().last_seen, Some(t1));
        assert!(p.get("nobody").is_none());
    }

    #[test]
    fn first_offline_for_unknown_user_is_reported() {
        let mut p = PresenceTracker::new();
        assert!(p.set_offline("ghost", Utc::now()));
        assert!(p.online_users().is_empty());
    }
}
