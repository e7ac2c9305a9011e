//! 聊天监听器
//!
//! 调用方通过实现 [`ChatListener`] 接收 SDK 推送的状态变化。回调携带的都是快照，
//! 监听器可以直接拿去渲染，不需要再回头查询客户端。

use crate::im::conversation::types::{ConversationSummary, ConversationTarget};
use crate::im::events::Notification;
use crate::im::message::types::Message;
use crate::im::poll::types::Poll;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait ChatListener: Send + Sync {
    /// 连接状态变化
    async fn on_connection_status_changed(&self, connected: bool, message: String);

    /// 当前会话的消息列表变化（完整快照）
    async fn on_messages_changed(&self, target: ConversationTarget, messages: Vec<Message>);

    /// 消息发送失败：消息保留在列表中并标记为 Failed，可重试或丢弃
    async fn on_send_failed(&self, temp_id: String, error: String);

    /// 当前会话正在输入的用户
    async fn on_typing_changed(&self, target: ConversationTarget, user_ids: Vec<String>);

    async fn on_presence_changed(
        &self,
        user_id: String,
        online: bool,
        last_seen: Option<DateTime<Utc>>,
    );

    async fn on_polls_changed(&self, target: ConversationTarget, polls: Vec<Poll>);

    async fn on_pinned_changed(&self, target: ConversationTarget, pinned: Vec<Message>);

    /// 会话列表变化（已按最近活动排序）
    async fn on_conversations_changed(&self, conversations: Vec<ConversationSummary>);

    async fn on_notification(&self, notification: Notification);

    async fn on_mention(&self, notification: Notification);

    /// 搜索结果；空查询时收到空列表
    async fn on_search_results(&self, query: String, results: Vec<Message>);

    async fn on_search_failed(&self, query: String, error: String);
}

/// 空实现（默认监听器）
pub struct EmptyChatListener;

#[async_trait]
impl ChatListener for EmptyChatListener {
    async fn on_connection_status_changed(&self, _connected: bool, _message: String) {}
    async fn on_messages_changed(&self, _target: ConversationTarget, _messages: Vec<Message>) {}
    async fn on_send_failed(&self, _temp_id: String, _error: String) {}
    async fn on_typing_changed(&self, _target: ConversationTarget, _user_ids: Vec<String>) {}
    async fn on_presence_changed(
        &self,
        _user_id: String,
        _online: bool,
        _last_seen: Option<DateTime<Utc>>,
    ) {
    }
    async fn on_polls_changed(&self, _target: ConversationTarget, _polls: Vec<Poll>) {}
    async fn on_pinned_changed(&self, _target: ConversationTarget, _pinned: Vec<Message>) {}
    async fn on_conversations_changed(&self, _conversations: Vec<ConversationSummary>) {}
    async fn on_notification(&self, _notification: Notification) {}
    async fn on_mention(&self, _notification: Notification) {}
    async fn on_search_results(&self, _query: String, _results: Vec<Message>) {}
    async fn on_search_failed(&self, _query: String, _error: String) {}
}
