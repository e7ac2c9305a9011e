//! REST 后端抽象
//!
//! 客户端只依赖 [`ChatBackend`]，生产环境使用 [`RestBackend`]，测试中替换为内存实现。

use crate::im::conversation::api::ConversationApi;
use crate::im::conversation::types::{ConversationSummary, ConversationTarget};
use crate::im::message::api::MessageApi;
use crate::im::message::types::{Attachment, Message, Reaction};
use crate::im::poll::api::PollApi;
use crate::im::poll::types::{NewPoll, Poll};
use crate::im::types::build_http_client;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>>;

    async fn fetch_history(
        &self,
        target: &ConversationTarget,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>>;

    async fn fetch_pinned(&self, target: &ConversationTarget) -> Result<Vec<Message>>;

    async fn edit_message(&self, message_id: &str, content: &str) -> Result<Message>;

    async fn delete_message(&self, message_id: &str) -> Result<()>;

    async fn react(&self, message_id: &str, emoji: &str) -> Result<Vec<Reaction>>;

    async fn set_pinned(&self, message_id: &str, pinned: bool) -> Result<()>;

    async fn search_messages(
        &self,
        target: Option<&ConversationTarget>,
        query: &str,
    ) -> Result<Vec<Message>>;

    async fn create_poll(&self, room_id: &str, poll: &NewPoll) -> Result<Poll>;

    async fn vote_poll(&self, poll_id: &str, options: &[usize]) -> Result<Poll>;

    async fn upload(&self, path: &Path) -> Result<Attachment>;
}

/// 基于 reqwest 的后端实现，所有 API 共享同一个带认证头的 HTTP 客户端
pub struct RestBackend {
    conversations: ConversationApi,
    messages: MessageApi,
    polls: PollApi,
}

impl RestBackend {
    pub fn new(api_base_url: &str, token: &str, user_id: &str) -> Result<Self> {
        let client = build_http_client(token)?;
        Ok(Self {
            conversations: ConversationApi::new(
                client.clone(),
                api_base_url.to_string(),
                user_id.to_string(),
            ),
            messages: MessageApi::new(client.clone(), api_base_url.to_string()),
            polls: PollApi::new(client, api_base_url.to_string()),
        })
    }
}

#[async_trait]
impl ChatBackend for RestBackend {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        self.conversations.get_all_conversations().await
    }

    async fn fetch_history(
        &self,
        target: &ConversationTarget,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>> {
        self.messages.fetch_history(target, limit, before).await
    }

    async fn fetch_pinned(&self, target: &ConversationTarget) -> Result<Vec<Message>> {
        self.messages.fetch_pinned(target).await
    }

    async fn edit_message(&self, message_id: &str, content: &str) -> Result<Message> {
        self.messages.edit_message(message_id, content).await
    }

    async fn delete_message(&self, message_id: &str) -> Result<()> {
        self.messages.delete_message(message_id).await
    }

    async fn react(&self, message_id: &str, emoji: &str) -> Result<Vec<Reaction>> {
        self.messages.react(message_id, emoji).await
    }

    async fn set_pinned(&self, message_id: &str, pinned: bool) -> Result<()> {
        self.messages.set_pinned(message_id, pinned).await
    }

    async fn search_messages(
        &self,
        target: Option<&ConversationTarget>,
        query: &str,
    ) -> Result<Vec<Message>> {
        self.messages.search(target, query).await
    }

    async fn create_poll(&self, room_id: &str, poll: &NewPoll) -> Result<Poll> {
        self.polls.create(room_id, poll).await
    }

    async fn vote_poll(&self, poll_id: &str, options: &[usize]) -> Result<Poll> {
        self.polls.vote(poll_id, options).await
    }

    async fn upload(&self, path: &Path) -> Result<Attachment> {
        self.messages.upload(path).await
    }
}
