//! 本地消息存储与乐观消息对账
//!
//! 当前打开会话的有序消息列表，合并两路来源：REST 拉取的历史和 socket 推送的实时事件。
//! 约束：同一消息 ID 在列表中至多出现一次；待确认副本与权威副本同时存在时以权威副本为准。

use crate::im::message::types::{
    DeliveryState, Message, MessageDraft, MessageType, Reaction, ReplyRef, SenderRef,
    DELETED_PLACEHOLDER, EXPIRED_PLACEHOLDER,
};
use crate::im::serialization::{generate_client_id, is_temp_id, temp_id_for};
use crate::im::types::UserSummary;
use crate::im::conversation::types::ConversationTarget;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// `receive` 的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// 替换了一条待确认消息
    ConfirmedPending { temp_id: String },
    /// 已存在的消息被原地更新
    Updated,
    /// 新消息追加到末尾
    Appended,
}

/// 消息列表
#[derive(Debug, Clone)]
pub struct MessageStore {
    target: ConversationTarget,
    me: UserSummary,
    messages: Vec<Message>,
    // 已经认领过待确认消息的服务端 ID，每条至多认领一次
    claimed: HashSet<String>,
}

impl MessageStore {
    pub fn new(target: ConversationTarget, me: UserSummary) -> Self {
        Self {
            target,
            me,
            messages: Vec::new(),
            claimed: HashSet::new(),
        }
    }

    pub fn target(&self) -> &ConversationTarget {
        &self.target
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    pub fn pending_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_pending()).count()
    }

    /// 乐观插入：立即把草稿作为待确认消息追加到列表末尾
    pub fn append_pending(&mut self, draft: &MessageDraft) -> Message {
        let client_id = generate_client_id();
        let (room_id, chat_id) = match &self.target {
            ConversationTarget::Room(id) => (Some(id.clone()), None),
            ConversationTarget::Private(id) => (None, Some(id.clone())),
        };
        let msg = Message {
            id: temp_id_for(&client_id),
            client_id: Some(client_id),
            sender: SenderRef::User(self.me.clone()),
            content: draft.text.trim().to_string(),
            kind: MessageType::from_attachments(&draft.attachments),
            attachments: draft.attachments.clone(),
            reply_to: draft.reply_to.clone().map(ReplyRef::Id),
            disappear_after: draft.disappear_after,
            created_at: Utc::now(),
            edited_at: None,
            delivered_to: Vec::new(),
            read_by: Vec::new(),
            is_deleted: false,
            reactions: Vec::new(),
            room_id,
            chat_id,
            delivery: DeliveryState::Pending,
        };
        debug!("[Store] ⏳ 追加待确认消息: {}", msg.id);
        self.messages.push(msg.clone());
        msg
    }

    /// 处理 `message:new`
    pub fn receive(&mut self, mut msg: Message) -> Reconciled {
        msg.delivery = DeliveryState::Sent;

        // 1. 服务端回显了 clientId：精确匹配
        if let Some(client_id) = msg.client_id.as_deref() {
            if let Some(idx) = self.messages.iter().position(|m| {
                is_temp_id(&m.id) && m.client_id.as_deref() == Some(client_id)
            }) {
                return self.confirm_at(idx, msg);
            }
        }

        // 2. 已存在同 ID：重复投递或历史先到
        if let Some(idx) = self.position(&msg.id) {
            debug!("[Store] 🔁 已存在，合并服务端副本: {}", msg.id);
            let id = msg.id.clone();
            let own = msg.sender_id() == self.me.id;
            let content = msg.content.clone();
            refresh_existing(&mut self.messages[idx], msg);
            if own && !self.claimed.contains(&id) {
                let (room_id, chat_id) = (
                    self.messages[idx].room_id.clone(),
                    self.messages[idx].chat_id.clone(),
                );
                if let Some(pending) = self.oldest_pending_with(&content, &room_id, &chat_id) {
                    let temp_id = self.messages.remove(pending).id;
                    self.claimed.insert(id);
                    info!("[Store] ✅ 权威副本已在列表中，移除待确认消息: {}", temp_id);
                    return Reconciled::ConfirmedPending { temp_id };
                }
            }
            return Reconciled::Updated;
        }

        // 3. 自己发出的消息：按内容匹配最早的待确认消息
        if msg.sender_id() == self.me.id {
            if let Some(idx) =
                self.oldest_pending_with(&msg.content, &msg.room_id, &msg.chat_id)
            {
                return self.confirm_at(idx, msg);
            }
        }

        debug!("[Store] ➕ 追加新消息: {}", msg.id);
        self.messages.push(msg);
        Reconciled::Appended
    }

    /// 同一会话中内容相同、尚未确认的最早一条本地消息
    fn oldest_pending_with(
        &self,
        content: &str,
        room_id: &Option<String>,
        chat_id: &Option<String>,
    ) -> Option<usize> {
        self.messages.iter().position(|m| {
            is_temp_id(&m.id)
                && m.delivery != DeliveryState::Sent
                && m.content == content
                && m.room_id == *room_id
                && m.chat_id == *chat_id
        })
    }

    fn confirm_at(&mut self, idx: usize, msg: Message) -> Reconciled {
        let temp_id = self.messages[idx].id.clone();
        info!("[Store] ✅ 待确认消息已确认: {} -> {}", temp_id, msg.id);
        self.claimed.insert(msg.id.clone());
        // 权威副本可能已经通过其他途径到达（例如历史拉取），此时移除临时副本即可
        if let Some(existing) = self.position(&msg.id) {
            refresh_existing(&mut self.messages[existing], msg);
            self.messages.remove(idx);
        } else {
            self.messages[idx] = msg;
        }
        Reconciled::ConfirmedPending { temp_id }
    }

    /// 合并 REST 拉取的历史
    ///
    /// 以 ID 去重，服务端副本按 `refresh_existing` 的规则合入本地同 ID 记录；
    /// 结果按创建时间排序，尚未确认的本地消息保持发送顺序排在最后。
    /// 服务端未回显 clientId 时，历史中新出现的自己的消息按内容认领待确认消息。
    pub fn merge_history(&mut self, history: Vec<Message>) {
        let mut confirmed: Vec<Message> = Vec::with_capacity(history.len() + self.messages.len());
        let mut local_pending = Vec::new();

        for m in self.messages.drain(..) {
            if is_temp_id(&m.id) {
                local_pending.push(m);
            } else {
                confirmed.push(m);
            }
        }

        let mut fresh_own = Vec::new();
        for mut h in history {
            h.delivery = DeliveryState::Sent;
            if let Some(existing) = confirmed.iter_mut().find(|m| m.id == h.id) {
                refresh_existing(existing, h);
            } else {
                if h.sender_id() == self.me.id && !self.claimed.contains(&h.id) {
                    fresh_own.push(h.id.clone());
                }
                confirmed.push(h);
            }
        }
        confirmed.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let mut kept_pending = Vec::with_capacity(local_pending.len());
        for p in local_pending {
            if let Some(c) = confirmed
                .iter()
                .find(|c| p.client_id.is_some() && c.client_id == p.client_id)
            {
                self.claimed.insert(c.id.clone());
                continue;
            }
            // 取最晚的匹配
            let by_content = confirmed.iter().rev().find(|c| {
                fresh_own.contains(&c.id)
                    && !self.claimed.contains(&c.id)
                    && c.content == p.content
                    && c.room_id == p.room_id
                    && c.chat_id == p.chat_id
            });
            match by_content {
                Some(c) => {
                    debug!("[Store] 历史中已有自己的消息，移除待确认副本: {} -> {}", p.id, c.id);
                    self.claimed.insert(c.id.clone());
                }
                None => kept_pending.push(p),
            }
        }

        debug!(
            "[Store] 📚 合并历史后共 {} 条确认消息, {} 条待确认",
            confirmed.len(),
            kept_pending.len()
        );
        self.messages = confirmed;
        self.messages.extend(kept_pending);
    }

    /// `message:edited`
    pub fn apply_edit(&mut self, id: &str, content: &str, edited_at: Option<DateTime<Utc>>) -> bool {
        let Some(msg) = self.messages.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        if msg.is_deleted {
            warn!("[Store] 忽略对已删除消息的编辑: {}", id);
            return false;
        }
        msg.content = content.to_string();
        msg.edited_at = edited_at.or(msg.edited_at).or_else(|| Some(Utc::now()));
        true
    }

    /// `message:deleted`
    pub fn apply_delete(&mut self, id: &str) -> bool {
        self.tombstone(id, DELETED_PLACEHOLDER)
    }

    /// `message:expired`
    pub fn apply_expired(&mut self, id: &str) -> bool {
        self.tombstone(id, EXPIRED_PLACEHOLDER)
    }

    fn tombstone(&mut self, id: &str, placeholder: &str) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(msg) => {
                msg.tombstone(placeholder);
                true
            }
            None => false,
        }
    }

    /// `message:reacted`：整体替换回应列表
    pub fn apply_reactions(&mut self, id: &str, reactions: Vec<Reaction>) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(msg) => {
                msg.reactions = reactions;
                true
            }
            None => false,
        }
    }

    fn set_delivery(&mut self, temp_id: &str, state: DeliveryState) -> bool {
        match self
            .messages
            .iter_mut()
            .find(|m| m.id == temp_id && is_temp_id(&m.id))
        {
            Some(msg) => {
                msg.delivery = state;
                true
            }
            None => false,
        }
    }

    pub fn mark_failed(&mut self, temp_id: &str) -> bool {
        self.set_delivery(temp_id, DeliveryState::Failed)
    }

    /// 重试前重新置为待确认
    pub fn mark_retrying(&mut self, temp_id: &str) -> bool {
        self.set_delivery(temp_id, DeliveryState::Pending)
    }

    /// 丢弃发送失败的消息，只允许移除 Failed 状态的临时消息
    pub fn remove_failed(&mut self, temp_id: &str) -> Option<Message> {
        let idx = self
            .messages
            .iter()
            .position(|m| m.id == temp_id && m.is_failed())?;
        Some(self.messages.remove(idx))
    }

    /// 本地阅后即焚：到期的消息转为墓碑，返回本次处理的消息 ID
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let mut expired = Vec::new();
        for msg in self.messages.iter_mut() {
            if msg.is_deleted || is_temp_id(&msg.id) {
                continue;
            }
            if let Some(at) = msg.expires_at() {
                if at <= now {
                    msg.tombstone(EXPIRED_PLACEHOLDER);
                    expired.push(msg.id.clone());
                }
            }
        }
        expired
    }

    /// 他人发送、自己尚未读过的消息 ID
    pub fn unread_from_others(&self) -> Vec<String> {
        self.messages
            .iter()
            .filter(|m| {
                !is_temp_id(&m.id)
                    && m.sender_id() != self.me.id
                    && !m.read_by.iter().any(|u| *u == self.me.id)
            })
            .map(|m| m.id.clone())
            .collect()
    }

    /// 记录已读：返回实际发生变化的条数
    pub fn mark_read_by(&mut self, user_id: &str, ids: &[String]) -> usize {
        let mut changed = 0;
        for msg in self.messages.iter_mut().filter(|m| ids.contains(&m.id)) {
            if !msg.read_by.iter().any(|u| u == user_id) {
                msg.read_by.push(user_id.to_string());
                changed += 1;
            }
        }
        changed
    }
}

/// 用服务端副本刷新已有记录
///
/// 本地墓碑不会被撤销；本地编辑比服务端副本新时保留本地内容。
fn refresh_existing(existing: &mut Message, mut incoming: Message) {
    incoming.delivery = DeliveryState::Sent;
    if existing.is_deleted {
        return;
    }
    if existing.edited_at > incoming.edited_at {
        incoming.content = std::mem::take(&mut existing.content);
        incoming.edited_at = existing.edited_at;
    }
    for user in existing.read_by.drain(..) {
        if !incoming.read_by.contains(&user) {
            incoming.read_by.push(user);
        }
    }
    *existing = incoming;
}
