//! 测试辅助：内存后端、记录型监听器和测试日志

use crate::im::backend::ChatBackend;
use crate::im::conversation::types::{ConversationSummary, ConversationTarget};
use crate::im::events::Notification;
use crate::im::listener::ChatListener;
use crate::im::message::types::{Attachment, Message, Reaction};
use crate::im::poll::types::{NewPoll, Poll, PollOption};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::{Mutex, Once};
use std::time::Duration;

static INIT_LOGGER: Once = Once::new();

pub(crate) fn init_test_logger() {
    INIT_LOGGER.call_once(|| {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::EnvFilter;

        let filter_layer = EnvFilter::new("info,chaturway_sdk=debug,sqlx=info");
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
            .with_test_writer();

        let _ = tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .try_init();
    });
}

/// 内存后端：记录调用，返回预置数据
#[derive(Default)]
pub(crate) struct FakeBackend {
    pub conversations: Mutex<Vec<ConversationSummary>>,
    pub history: Mutex<Vec<Message>>,
    pub pinned: Mutex<Vec<Message>>,
    pub search_results: Mutex<Vec<Message>>,
    pub search_delay: Mutex<Duration>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        self.record("conversations".into());
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn fetch_history(
        &self,
        target: &ConversationTarget,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>> {
        self.record(format!("history:{}", target));
        let mut history: Vec<Message> = self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|m| target.owns(m))
            .filter(|m| before.map_or(true, |b| m.created_at < b))
            .cloned()
            .collect();
        let skip = history.len().saturating_sub(limit);
        Ok(history.split_off(skip))
    }

    async fn fetch_pinned(&self, target: &ConversationTarget) -> Result<Vec<Message>> {
        self.record(format!("pinned:{}", target));
        Ok(self.pinned.lock().unwrap().clone())
    }

    async fn edit_message(&self, message_id: &str, content: &str) -> Result<Message> {
        self.record(format!("edit:{}", message_id));
        let mut msg = self
            .history
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("HTTP 错误 404 Not Found: Message not found"))?;
        msg.content = content.to_string();
        msg.edited_at = Some(Utc::now());
        Ok(msg)
    }

    async fn delete_message(&self, message_id: &str) -> Result<()> {
        self.record(format!("delete:{}", message_id));
        Ok(())
    }

    async fn react(&self, message_id: &str, emoji: &str) -> Result<Vec<Reaction>> {
        self.record(format!("react:{}:{}", message_id, emoji));
        Ok(vec![Reaction {
            emoji: emoji.to_string(),
            users: vec!["me".into()],
        }])
    }

    async fn set_pinned(&self, message_id: &str, pinned: bool) -> Result<()> {
        self.record(format!("pin:{}:{}", message_id, pinned));
        Ok(())
    }

    async fn search_messages(
        &self,
        _target: Option<&ConversationTarget>,
        query: &str,
    ) -> Result<Vec<Message>> {
        self.record(format!("search:{}", query));
        let delay = *self.search_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.search_results.lock().unwrap().clone())
    }

    async fn create_poll(&self, room_id: &str, poll: &NewPoll) -> Result<Poll> {
        poll.validate()?;
        self.record(format!("poll:create:{}", room_id));
        Ok(Poll {
            id: "p1".into(),
            room_id: Some(room_id.to_string()),
            question: poll.question.clone(),
            options: poll
                .options
                .iter()
                .map(|text| PollOption {
                    text: text.clone(),
                    votes: vec![],
                })
                .collect(),
            multiple: poll.multiple,
            created_by: Some("me".into()),
            closed: false,
            created_at: None,
        })
    }

    async fn vote_poll(&self, poll_id: &str, options: &[usize]) -> Result<Poll> {
        self.record(format!("poll:vote:{}:{:?}", poll_id, options));
        Ok(Poll {
            id: poll_id.to_string(),
            room_id: Some("r1".into()),
            question: "q".into(),
            options: vec![
                PollOption {
                    text: "a".into(),
                    votes: vec!["me".into()],
                },
                PollOption {
                    text: "b".into(),
                    votes: vec![],
                },
            ],
            multiple: false,
            created_by: None,
            closed: false,
            created_at: None,
        })
    }

    async fn upload(&self, path: &Path) -> Result<Attachment> {
        self.record(format!("upload:{}", path.display()));
        Ok(Attachment {
            url: format!("https://files.example.com/{}", path.display()),
            filename: path.display().to_string(),
            mimetype: "image/png".into(),
            size: 3,
        })
    }
}

/// 记录所有回调的监听器
#[derive(Default)]
pub(crate) struct RecordingListener {
    pub connection: Mutex<Vec<bool>>,
    pub messages: Mutex<Vec<Message>>,
    pub message_updates: Mutex<usize>,
    pub send_failed: Mutex<Vec<String>>,
    pub typing: Mutex<Vec<String>>,
    pub presence: Mutex<Vec<(String, bool)>>,
    pub polls: Mutex<Vec<Poll>>,
    pub pinned: Mutex<Vec<Message>>,
    pub conversations: Mutex<Vec<ConversationSummary>>,
    pub notifications: Mutex<Vec<Notification>>,
    pub searches: Mutex<Vec<(String, usize)>>,
    pub search_errors: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    pub fn conversations(&self) -> Vec<ConversationSummary> {
        self.conversations.lock().unwrap().clone()
    }

    pub fn searches(&self) -> Vec<(String, usize)> {
        self.searches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatListener for RecordingListener {
    async fn on_connection_status_changed(&self, connected: bool, _message: String) {
        self.connection.lock().unwrap().push(connected);
    }

    async fn on_messages_changed(&self, _target: ConversationTarget, messages: Vec<Message>) {
        *self.messages.lock().unwrap() = messages;
        *self.message_updates.lock().unwrap() += 1;
    }

    async fn on_send_failed(&self, temp_id: String, _error: String) {
        self.send_failed.lock().unwrap().push(temp_id);
    }

    async fn on_typing_changed(&self, _target: ConversationTarget, user_ids: Vec<String>) {
        *self.typing.lock().unwrap() = user_ids;
    }

    async fn on_presence_changed(
        &self,
        user_id: String,
        online: bool,
        _last_seen: Option<DateTime<Utc>>,
    ) {
        self.presence.lock().unwrap().push((user_id, online));
    }

    async fn on_polls_changed(&self, _target: ConversationTarget, polls: Vec<Poll>) {
        *self.polls.lock().unwrap() = polls;
    }

    async fn on_pinned_changed(&self, _target: ConversationTarget, pinned: Vec<Message>) {
        *self.pinned.lock().unwrap() = pinned;
    }

    async fn on_conversations_changed(&self, conversations: Vec<ConversationSummary>) {
        *self.conversations.lock().unwrap() = conversations;
    }

    async fn on_notification(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }

    async fn on_mention(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }

    async fn on_search_results(&self, query: String, results: Vec<Message>) {
        self.searches.lock().unwrap().push((query, results.len()));
    }

    async fn on_search_failed(&self, _query: String, error: String) {
        self.search_errors.lock().unwrap().push(error);
    }
}
