//! 输入状态（typing）跟踪
//!
//! 每个会话维护一组正在输入的用户。收到 `typing:start` 时加入或刷新，
//! `typing:stop` 或该用户的新消息到达时移除；超过 TTL 未刷新的条目自动过期，
//! 避免 stop 事件丢失后一直显示"正在输入"。

use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const DEFAULT_TYPING_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct TypingTracker {
    ttl: Duration,
    /// 会话 key -> (用户 ID -> 过期时间)
    entries: HashMap<String, HashMap<String, Instant>>,
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_TTL)
    }
}

impl TypingTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// 加入或刷新；返回可见集合是否发生变化
    pub fn start(&mut self, conversation: &str, user_id: &str, now: Instant) -> bool {
        let users = self.entries.entry(conversation.to_string()).or_default();
        let deadline = now + self.ttl;
        match users.insert(user_id.to_string(), deadline) {
            Some(previous) => previous <= now,
            None => true,
        }
    }

    /// 移除；返回是否确实移除了条目
    pub fn stop(&mut self, conversation: &str, user_id: &str) -> bool {
        let Some(users) = self.entries.get_mut(conversation) else {
            return false;
        };
        let removed = users.remove(user_id).is_some();
        if users.is_empty() {
            self.entries.remove(conversation);
        }
        removed
    }

    /// 当前正在输入的用户（已排序，不含过期条目）
    pub fn active(&self, conversation: &str, now: Instant) -> Vec<String> {
        let mut users: Vec<String> = self
            .entries
            .get(conversation)
            .map(|users| {
                users
                    .iter()
                    .filter(|(_, deadline)| **deadline > now)
                    .map(|(user, _)| user.clone())
                    .collect()
            })
            .unwrap_or_default();
        users.sort();
        users
    }

    /// 清理过期条目，返回集合发生变化的会话
    pub fn prune(&mut self, now: Instant) -> Vec<String> {
        let mut changed = Vec::new();
        self.entries.retain(|conversation, users| {
            let before = users.len();
            users.retain(|_, deadline| *deadline > now);
            if users.len() != before {
                changed.push(conversation.clone());
            }
            !users.is_empty()
        });
        changed.sort();
        changed
    }
}
