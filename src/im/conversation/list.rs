//! 会话列表
//!
//! 按最近活动时间倒序；新消息到达时更新摘要和未读数。

use crate::im::conversation::types::{ConversationSummary, ConversationTarget};
use crate::im::message::types::Message;
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ConversationList {
    self_id: String,
    items: Vec<ConversationSummary>,
    // 已计入未读数的消息 ID，按会话记录；清零未读时一并清空
    counted: HashMap<String, HashSet<String>>,
}

impl ConversationList {
    pub fn new(self_id: impl Into<String>) -> Self {
        Self {
            self_id: self_id.into(),
            items: Vec::new(),
            counted: HashMap::new(),
        }
    }

    pub fn items(&self) -> &[ConversationSummary] {
        &self.items
    }

    pub fn get(&self, target: &ConversationTarget) -> Option<&ConversationSummary> {
        self.items.iter().find(|c| c.target() == *target)
    }

    pub fn total_unread(&self) -> u32 {
        self.items.iter().map(|c| c.unread_count).sum()
    }

    /// 整体替换（REST 刷新或读取缓存）
    pub fn replace(&mut self, items: Vec<ConversationSummary>) {
        self.items = items;
        self.sort();
    }

    fn sort(&mut self) {
        self.items
            .sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
    }

    /// 新消息到达：更新摘要、活动时间和未读数
    ///
    /// 返回 false 表示消息所属会话不在列表中（需要重新拉取列表）。
    pub fn bump(&mut self, msg: &Message, active: Option<&ConversationTarget>) -> bool {
        let Some(target) = ConversationTarget::of_message(msg) else {
            return false;
        };
        let Some(item) = self.items.iter_mut().find(|c| c.target() == target) else {
            debug!("[ConvList] 未知会话: {}", target);
            return false;
        };
        if msg.created_at >= item.last_activity {
            item.last_message = Some(msg.preview());
            item.last_activity = msg.created_at;
        }
        if msg.sender_id() != self.self_id && active != Some(&target) {
            let newly_counted = self
                .counted
                .entry(target.to_string())
                .or_default()
                .insert(msg.id.clone());
            if newly_counted {
                item.unread_count += 1;
            } else {
                debug!("[ConvList] 重复消息不重复计未读: {}", msg.id);
            }
        }
        self.sort();
        true
    }

    /// 打开会话后清零未读；返回是否有变化
    pub fn mark_read(&mut self, target: &ConversationTarget) -> bool {
        self.counted.remove(&target.to_string());
        match self.items.iter_mut().find(|c| c.target() == *target) {
            Some(item) if item.unread_count > 0 => {
                item.unread_count = 0;
                true
            }
            _ => false,
        }
    }
}
