//! Chaturway 客户端核心实现模块
//!
//! 把连接管理、REST 后端、当前会话状态和监听器串起来：
//! socket 事件进入事件循环后交给 [`ChatSession`] 做定点修改，
//! 本地操作（发送、编辑、置顶……）先请求后端再同步到本地状态，最后通过监听器推送快照。

use crate::im::backend::{ChatBackend, RestBackend};
use crate::im::conversation::dao::ConversationCache;
use crate::im::conversation::list::ConversationList;
use crate::im::conversation::types::{ConversationSummary, ConversationTarget};
use crate::im::events::{
    ClientEvent, MessageEditedEvent, MessageReactedEvent, MessageRefEvent, OutgoingMessage,
    ServerEvent,
};
use crate::im::listener::{ChatListener, EmptyChatListener};
use crate::im::message::types::{Attachment, Message, MessageDraft, Reaction};
use crate::im::poll::types::{NewPoll, Poll};
use crate::im::presence::{Presence, PresenceTracker};
use crate::im::search::{MessageSearch, DEFAULT_SEARCH_DEBOUNCE};
use crate::im::serialization::is_temp_id;
use crate::im::session::{ChatSession, Changes};
use crate::im::socket::{ConnectionManager, SocketConnector, SocketIoConnector, TransportEvent};
use crate::im::typing::DEFAULT_TYPING_TTL;
use crate::im::types::UserSummary;
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 客户端配置
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// 当前用户 ID
    pub user_id: String,
    pub username: String,
    /// 认证 token（REST 和 socket 共用）
    pub token: String,
    /// HTTP API 基础地址
    pub api_base_url: String,
    /// socket 服务器地址，http(s) 会自动换成 ws(s)
    pub socket_url: String,
    /// 他人输入状态在没有刷新时保留的时长
    pub typing_ttl: Duration,
    /// 自己停止输入多久后自动发送 typing:stop
    pub typing_idle: Duration,
    pub search_debounce: Duration,
    /// 每次拉取历史消息的条数
    pub history_page_size: usize,
    /// 定时维护（输入状态过期、阅后即焚）间隔
    pub maintenance_interval: Duration,
    /// 会话列表缓存的 SQLite URL，`None` 表示不缓存
    ///
    /// 例如：`sqlite://chaturway.db?mode=rwc`
    pub conversation_cache_url: Option<String>,
}

impl ClientConfig {
    /// 创建默认配置
    pub fn new(user_id: String, username: String, token: String) -> Self {
        Self {
            user_id,
            username,
            token,
            api_base_url: "http://localhost:5000".to_string(),
            socket_url: "http://localhost:5000".to_string(),
            typing_ttl: DEFAULT_TYPING_TTL,
            typing_idle: Duration::from_secs(3),
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
            history_page_size: 50,
            maintenance_interval: Duration::from_secs(1),
            conversation_cache_url: Some("sqlite://chaturway.db?mode=rwc".to_string()),
        }
    }

    pub fn me(&self) -> UserSummary {
        UserSummary {
            id: self.user_id.clone(),
            username: self.username.clone(),
            avatar: None,
        }
    }
}

/// 自己正在输入的状态
struct OutgoingTyping {
    target: ConversationTarget,
    generation: u64,
    idle_timer: JoinHandle<()>,
}

/// Chaturway 客户端
#[derive(Clone)]
pub struct ChaturwayClient {
    config: ClientConfig,
    me: UserSummary,
    connection: Arc<ConnectionManager>,
    backend: Arc<dyn ChatBackend>,
    listener: Arc<RwLock<Arc<dyn ChatListener>>>,
    // 当前打开的会话，切换会话时整体丢弃
    session: Arc<Mutex<Option<ChatSession>>>,
    conversations: Arc<Mutex<ConversationList>>,
    presence: Arc<Mutex<PresenceTracker>>,
    cache: Arc<RwLock<Option<Arc<ConversationCache>>>>,
    search: Arc<MessageSearch>,
    typing_out: Arc<Mutex<Option<OutgoingTyping>>>,
    typing_generation: Arc<AtomicU64>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ChaturwayClient {
    /// 使用 REST 后端和 Socket.IO 连接器创建客户端
    pub fn new(config: ClientConfig) -> Result<Self> {
        let backend = RestBackend::new(&config.api_base_url, &config.token, &config.user_id)?;
        let connector = SocketIoConnector::new(config.socket_url.clone());
        Ok(Self::with_parts(
            config,
            Arc::new(connector),
            Arc::new(backend),
        ))
    }

    /// 注入连接器和后端（测试或自定义传输）
    pub fn with_parts(
        config: ClientConfig,
        connector: Arc<dyn SocketConnector>,
        backend: Arc<dyn ChatBackend>,
    ) -> Self {
        let me = config.me();
        Self {
            conversations: Arc::new(Mutex::new(ConversationList::new(me.id.clone()))),
            search: Arc::new(MessageSearch::new(backend.clone(), config.search_debounce)),
            connection: Arc::new(ConnectionManager::new(connector)),
            backend,
            listener: Arc::new(RwLock::new(Arc::new(EmptyChatListener))),
            session: Arc::new(Mutex::new(None)),
            presence: Arc::new(Mutex::new(PresenceTracker::new())),
            cache: Arc::new(RwLock::new(None)),
            typing_out: Arc::new(Mutex::new(None)),
            typing_generation: Arc::new(AtomicU64::new(0)),
            tasks: Arc::new(Mutex::new(Vec::new())),
            config,
            me,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn me(&self) -> &UserSummary {
        &self.me
    }

    /// 注册监听器
    pub async fn set_listener(&self, listener: Arc<dyn ChatListener>) {
        *self.listener.write().await = listener;
    }

    async fn listener(&self) -> Arc<dyn ChatListener> {
        self.listener.read().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    pub async fn current_target(&self) -> Option<ConversationTarget> {
        self.session.lock().await.as_ref().map(|s| s.target().clone())
    }

    /// 当前会话消息快照
    pub async fn messages(&self) -> Vec<Message> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.messages())
            .unwrap_or_default()
    }

    pub async fn conversations(&self) -> Vec<ConversationSummary> {
        self.conversations.lock().await.items().to_vec()
    }

    pub async fn presence(&self, user_id: &str) -> Option<Presence> {
        self.presence.lock().await.get(user_id).cloned()
    }

    /// 当前在线的用户（按 ID 排序）
    pub async fn online_users(&self) -> Vec<String> {
        self.presence.lock().await.online_users()
    }

    /// 所有会话的未读总数
    pub async fn total_unread(&self) -> u32 {
        self.conversations.lock().await.total_unread()
    }

    /// 建立 socket 连接，启动事件循环和定时维护，并刷新会话列表
    pub async fn connect(&self) -> Result<()> {
        info!("[Client] 🚀 开始连接: user={}", self.me.id);
        self.open_cache().await;

        let rx = self
            .connection
            .connect(&self.config.token)
            .await
            .context("建立 socket 连接失败")?;

        {
            let mut tasks = self.tasks.lock().await;
            for task in tasks.drain(..) {
                task.abort();
            }
            let this = self.clone();
            tasks.push(tokio::spawn(async move { this.run_event_loop(rx).await }));
            let this = self.clone();
            tasks.push(tokio::spawn(async move { this.run_maintenance().await }));
        }

        if let Err(e) = self.refresh_conversations().await {
            warn!("[Client] 刷新会话列表失败: {:#}", e);
        }
        Ok(())
    }

    /// 登出：停止后台任务、断开连接、丢弃会话状态
    pub async fn logout(&self) -> Result<()> {
        info!("[Client] 👋 登出: user={}", self.me.id);
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        if let Err(e) = self.stop_typing().await {
            debug!("[Client] 登出时发送 typing:stop 失败: {:#}", e);
        }
        self.search.cancel().await;
        *self.session.lock().await = None;
        self.presence.lock().await.clear();
        *self.conversations.lock().await = ConversationList::new(self.me.id.clone());
        // 缓存不区分账号，登出后清空
        let cache = self.cache.write().await.take();
        if let Some(cache) = cache {
            if let Err(e) = cache.clear().await {
                warn!("[Client] 清空会话缓存失败: {:#}", e);
            }
        }
        let result = self.connection.disconnect().await;
        self.listener()
            .await
            .on_connection_status_changed(false, "已登出".to_string())
            .await;
        result
    }

    async fn open_cache(&self) {
        let Some(url) = self.config.conversation_cache_url.as_deref() else {
            return;
        };
        if self.cache.read().await.is_some() {
            return;
        }
        match ConversationCache::new(url).await {
            Ok(cache) => {
                match cache.load().await {
                    Ok(items) if !items.is_empty() => {
                        info!("[Client] 💾 从缓存加载 {} 个会话", items.len());
                        self.conversations.lock().await.replace(items);
                        self.notify_conversations().await;
                    }
                    Ok(_) => {}
                    Err(e) => warn!("[Client] 读取会话缓存失败: {:#}", e),
                }
                *self.cache.write().await = Some(Arc::new(cache));
            }
            Err(e) => warn!("[Client] 打开会话缓存失败，仅使用内存列表: {:#}", e),
        }
    }

    async fn run_event_loop(self, mut rx: mpsc::UnboundedReceiver<TransportEvent>) {
        info!("[Client] 📡 事件循环启动");
        while let Some(event) = rx.recv().await {
            self.handle_transport_event(event).await;
        }
        info!("[Client] 事件循环结束");
    }

    async fn run_maintenance(self) {
        let mut ticker = tokio::time::interval(self.config.maintenance_interval);
        loop {
            ticker.tick().await;
            self.prune().await;
        }
    }

    /// 定时维护：过期输入状态、本地阅后即焚
    pub(crate) async fn prune(&self) {
        let now = tokio::time::Instant::now().into_std();
        let changes = {
            let mut guard = self.session.lock().await;
            match guard.as_mut() {
                Some(session) => session.prune(now, Utc::now()),
                None => return,
            }
        };
        self.notify_changes(&changes).await;
    }

    pub(crate) async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                info!("[Client] ✅ socket 已连接");
                self.listener()
                    .await
                    .on_connection_status_changed(true, "已连接".to_string())
                    .await;
                // 重连后重新加入当前会话
                if let Some(target) = self.current_target().await {
                    if let Err(e) = self.connection.emit(ClientEvent::Join(target)).await {
                        warn!("[Client] 重新加入会话失败: {:#}", e);
                    }
                }
            }
            TransportEvent::Disconnected { reason } => {
                warn!("[Client] ⚠️ socket 已断开: {}", reason);
                self.listener()
                    .await
                    .on_connection_status_changed(false, reason)
                    .await;
            }
            TransportEvent::Event(event) => self.handle_server_event(event).await,
        }
    }

    async fn handle_server_event(&self, event: ServerEvent) {
        debug!("[Client] 📥 收到事件: {}", event.name());
        match &event {
            ServerEvent::UserOnline(p) | ServerEvent::UserOffline(p) => {
                let online = matches!(event, ServerEvent::UserOnline(_));
                let at = p.last_seen.unwrap_or_else(Utc::now);
                let changed = {
                    let mut tracker = self.presence.lock().await;
                    if online {
                        tracker.set_online(&p.user_id, at)
                    } else {
                        tracker.set_offline(&p.user_id, at)
                    }
                };
                if changed {
                    self.listener()
                        .await
                        .on_presence_changed(p.user_id.clone(), online, Some(at))
                        .await;
                }
                return;
            }
            ServerEvent::Notification(n) => {
                self.listener().await.on_notification(n.clone()).await;
                return;
            }
            ServerEvent::Mention(n) => {
                info!("[Client] 🔔 收到提及: {}", n.text);
                self.listener().await.on_mention(n.clone()).await;
                return;
            }
            ServerEvent::MessageNew(msg) => self.bump_conversation(msg).await,
            _ => {}
        }

        let changes = {
            let mut guard = self.session.lock().await;
            match guard.as_mut() {
                Some(session) => session.apply(&event, tokio::time::Instant::now().into_std()),
                None => return,
            }
        };
        if let Some(temp_id) = &changes.confirmed {
            debug!("[Client] ✅ 发送确认: {}", temp_id);
        }
        self.notify_changes(&changes).await;

        // 当前会话中收到他人消息，立即标记已读
        if let ServerEvent::MessageNew(msg) = &event {
            if changes.messages && msg.sender_id() != self.me.id {
                if let Err(e) = self.mark_read().await {
                    warn!("[Client] 标记已读失败: {:#}", e);
                }
            }
        }
    }

    async fn bump_conversation(&self, msg: &Message) {
        let Some(target) = ConversationTarget::of_message(msg) else {
            return;
        };
        let active = self.current_target().await;
        let (bumped, item) = {
            let mut list = self.conversations.lock().await;
            let bumped = list.bump(msg, active.as_ref());
            (bumped, list.get(&target).cloned())
        };
        if bumped {
            if let Some(item) = item {
                self.cache_upsert(&item).await;
            }
            self.notify_conversations().await;
        } else {
            // 列表里还没有这个会话（新建的私聊等），后台重新拉取
            debug!("[Client] 收到未知会话的消息，刷新会话列表: {}", target);
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(e) = this.refresh_conversations().await {
                    warn!("[Client] 刷新会话列表失败: {:#}", e);
                }
            });
        }
    }

    async fn cache_upsert(&self, item: &ConversationSummary) {
        let cache = self.cache.read().await.clone();
        if let Some(cache) = cache {
            if let Err(e) = cache.upsert(item).await {
                warn!("[Client] 更新会话缓存失败: {:#}", e);
            }
        }
    }

    /// 把变化的视图快照推给监听器
    async fn notify_changes(&self, changes: &Changes) {
        if changes.is_empty() {
            return;
        }
        let now = tokio::time::Instant::now().into_std();
        let (target, messages, typing, polls, pinned) = {
            let guard = self.session.lock().await;
            let Some(session) = guard.as_ref() else {
                return;
            };
            (
                session.target().clone(),
                changes.messages.then(|| session.messages()),
                changes.typing.then(|| session.typing_users(now)),
                changes.polls.then(|| session.polls().to_vec()),
                changes.pinned.then(|| session.pinned().to_vec()),
            )
        };
        let listener = self.listener().await;
        if let Some(messages) = messages {
            listener.on_messages_changed(target.clone(), messages).await;
        }
        if let Some(users) = typing {
            listener.on_typing_changed(target.clone(), users).await;
        }
        if let Some(polls) = polls {
            listener.on_polls_changed(target.clone(), polls).await;
        }
        if let Some(pinned) = pinned {
            listener.on_pinned_changed(target, pinned).await;
        }
    }

    async fn notify_conversations(&self) {
        let items = self.conversations.lock().await.items().to_vec();
        self.listener().await.on_conversations_changed(items).await;
    }

    /// 对当前会话应用一个本地构造的事件（REST 操作成功后同步本地状态）
    async fn apply_local(&self, event: ServerEvent) {
        let changes = {
            let mut guard = self.session.lock().await;
            match guard.as_mut() {
                Some(session) => session.apply(&event, tokio::time::Instant::now().into_std()),
                None => return,
            }
        };
        self.notify_changes(&changes).await;
    }

    /// 打开会话：丢弃旧会话状态，加入房间，拉取历史和置顶消息
    pub async fn open_conversation(&self, target: ConversationTarget) -> Result<()> {
        info!("[Client] 📂 打开会话: {}", target);
        if let Err(e) = self.stop_typing().await {
            debug!("[Client] 切换会话时发送 typing:stop 失败: {:#}", e);
        }
        self.search.cancel().await;
        *self.session.lock().await = Some(ChatSession::new(
            target.clone(),
            self.me.clone(),
            self.config.typing_ttl,
        ));

        if let Err(e) = self.connection.emit(ClientEvent::Join(target.clone())).await {
            warn!("[Client] 加入会话失败: {:#}", e);
        }

        let history = self
            .backend
            .fetch_history(&target, self.config.history_page_size, None)
            .await
            .with_context(|| format!("拉取历史消息失败: {}", target))?;
        let pinned = match self.backend.fetch_pinned(&target).await {
            Ok(pinned) => pinned,
            Err(e) => {
                warn!("[Client] 拉取置顶消息失败: {:#}", e);
                Vec::new()
            }
        };
        debug!(
            "[Client] 历史消息 {} 条, 置顶 {} 条",
            history.len(),
            pinned.len()
        );

        {
            let mut guard = self.session.lock().await;
            match guard.as_mut() {
                Some(session) if *session.target() == target => {
                    session.store_mut().merge_history(history);
                    session.set_pinned(pinned);
                }
                _ => {
                    warn!("[Client] 会话已切换，丢弃 {} 的历史", target);
                    return Ok(());
                }
            }
        }
        self.notify_changes(&Changes {
            messages: true,
            pinned: true,
            ..Default::default()
        })
        .await;

        if let Err(e) = self.mark_read().await {
            warn!("[Client] 标记已读失败: {:#}", e);
        }
        let changed = self.conversations.lock().await.mark_read(&target);
        if changed {
            self.notify_conversations().await;
        }
        Ok(())
    }

    /// 向前翻页，返回新加载的条数
    pub async fn load_older_messages(&self) -> Result<usize> {
        let (target, before) = {
            let guard = self.session.lock().await;
            let session = guard
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("没有打开的会话"))?;
            let before = session
                .store()
                .messages()
                .iter()
                .filter(|m| !is_temp_id(&m.id))
                .map(|m| m.created_at)
                .min();
            (session.target().clone(), before)
        };
        let Some(before) = before else {
            return Ok(0);
        };

        let older = self
            .backend
            .fetch_history(&target, self.config.history_page_size, Some(before))
            .await
            .with_context(|| format!("拉取更早的消息失败: {}", target))?;
        let count = older.len();
        if count == 0 {
            return Ok(0);
        }
        {
            let mut guard = self.session.lock().await;
            match guard.as_mut() {
                Some(session) if *session.target() == target => {
                    session.store_mut().merge_history(older)
                }
                _ => return Ok(0),
            }
        }
        self.notify_changes(&Changes {
            messages: true,
            ..Default::default()
        })
        .await;
        Ok(count)
    }

    /// 发送消息：先乐观插入待确认消息，再通过 socket 发出
    ///
    /// 发送失败时消息保留并标记为 Failed，监听器收到 `on_send_failed`，
    /// 之后可以 [`retry_send`](Self::retry_send) 或 [`discard_failed`](Self::discard_failed)。
    pub async fn send_message(&self, draft: MessageDraft) -> Result<Message> {
        if draft.is_empty() {
            return Err(anyhow::anyhow!("消息内容为空"));
        }
        let pending = {
            let mut guard = self.session.lock().await;
            let session = guard
                .as_mut()
                .ok_or_else(|| anyhow::anyhow!("没有打开的会话"))?;
            session.store_mut().append_pending(&draft)
        };
        info!("[Client] 📤 发送消息: {}", pending.id);
        self.notify_changes(&Changes {
            messages: true,
            ..Default::default()
        })
        .await;

        if let Err(e) = self.stop_typing().await {
            debug!("[Client] 发送前 typing:stop 失败: {:#}", e);
        }
        self.emit_pending(pending).await
    }

    async fn emit_pending(&self, pending: Message) -> Result<Message> {
        let target = ConversationTarget::of_message(&pending)
            .ok_or_else(|| anyhow::anyhow!("消息缺少会话信息: {}", pending.id))?;
        let outgoing = OutgoingMessage::from_pending(target, &pending);
        match self.connection.emit(ClientEvent::SendMessage(outgoing)).await {
            Ok(()) => Ok(pending),
            Err(e) => {
                error!("[Client] ❌ 消息发送失败: {} - {:#}", pending.id, e);
                let marked = {
                    let mut guard = self.session.lock().await;
                    guard
                        .as_mut()
                        .map(|s| s.store_mut().mark_failed(&pending.id))
                        .unwrap_or(false)
                };
                if marked {
                    self.notify_changes(&Changes {
                        messages: true,
                        ..Default::default()
                    })
                    .await;
                }
                self.listener()
                    .await
                    .on_send_failed(pending.id.clone(), e.to_string())
                    .await;
                Err(e.context(format!("发送消息失败: {}", pending.id)))
            }
        }
    }

    /// 重发失败的消息（沿用原 clientId，服务端可据此去重）
    pub async fn retry_send(&self, temp_id: &str) -> Result<Message> {
        let pending = {
            let mut guard = self.session.lock().await;
            let session = guard
                .as_mut()
                .ok_or_else(|| anyhow::anyhow!("没有打开的会话"))?;
            let failed = session
                .store()
                .get(temp_id)
                .map(Message::is_failed)
                .unwrap_or(false);
            if !failed || !session.store_mut().mark_retrying(temp_id) {
                return Err(anyhow::anyhow!("没有可重试的失败消息: {}", temp_id));
            }
            session
                .store()
                .get(temp_id)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("没有可重试的失败消息: {}", temp_id))?
        };
        info!("[Client] 🔁 重发消息: {}", temp_id);
        self.notify_changes(&Changes {
            messages: true,
            ..Default::default()
        })
        .await;
        self.emit_pending(pending).await
    }

    /// 丢弃失败的消息
    pub async fn discard_failed(&self, temp_id: &str) -> Result<()> {
        let removed = {
            let mut guard = self.session.lock().await;
            guard
                .as_mut()
                .and_then(|s| s.store_mut().remove_failed(temp_id))
        };
        if removed.is_none() {
            return Err(anyhow::anyhow!("没有可丢弃的失败消息: {}", temp_id));
        }
        debug!("[Client] 🗑️ 丢弃失败消息: {}", temp_id);
        self.notify_changes(&Changes {
            messages: true,
            ..Default::default()
        })
        .await;
        Ok(())
    }

    pub async fn edit_message(&self, message_id: &str, content: &str) -> Result<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(anyhow::anyhow!("编辑内容不能为空"));
        }
        let updated = self.backend.edit_message(message_id, content).await?;
        self.apply_local(ServerEvent::MessageEdited(MessageEditedEvent {
            message_id: message_id.to_string(),
            content: updated.content.clone(),
            edited_at: updated.edited_at,
            room_id: updated.room_id.clone(),
            chat_id: updated.chat_id.clone(),
        }))
        .await;
        Ok(updated)
    }

    pub async fn delete_message(&self, message_id: &str) -> Result<()> {
        self.backend.delete_message(message_id).await?;
        self.apply_local(ServerEvent::MessageDeleted(MessageRefEvent {
            message_id: message_id.to_string(),
            room_id: None,
            chat_id: None,
        }))
        .await;
        Ok(())
    }

    pub async fn react(&self, message_id: &str, emoji: &str) -> Result<Vec<Reaction>> {
        let reactions = self.backend.react(message_id, emoji).await?;
        self.apply_local(ServerEvent::MessageReacted(MessageReactedEvent {
            message_id: message_id.to_string(),
            reactions: reactions.clone(),
            room_id: None,
            chat_id: None,
        }))
        .await;
        Ok(reactions)
    }

    pub async fn pin_message(&self, message_id: &str) -> Result<()> {
        self.set_pinned(message_id, true).await
    }

    pub async fn unpin_message(&self, message_id: &str) -> Result<()> {
        self.set_pinned(message_id, false).await
    }

    async fn set_pinned(&self, message_id: &str, pinned: bool) -> Result<()> {
        self.backend.set_pinned(message_id, pinned).await?;
        let changed = {
            let mut guard = self.session.lock().await;
            guard
                .as_mut()
                .map(|s| s.toggle_pinned(message_id, pinned))
                .unwrap_or(false)
        };
        if changed {
            self.notify_changes(&Changes {
                pinned: true,
                ..Default::default()
            })
            .await;
        }
        Ok(())
    }

    /// 本地有输入：首次发送 typing:start，空闲一段时间后自动发送 typing:stop
    pub async fn notify_typing(&self) -> Result<()> {
        let target = self
            .current_target()
            .await
            .ok_or_else(|| anyhow::anyhow!("没有打开的会话"))?;
        let generation = self.typing_generation.fetch_add(1, Ordering::SeqCst) + 1;

        let mut slot = self.typing_out.lock().await;
        let already_typing = match slot.take() {
            Some(previous) => {
                previous.idle_timer.abort();
                if previous.target != target {
                    if let Err(e) = self
                        .connection
                        .emit(ClientEvent::TypingStop(previous.target))
                        .await
                    {
                        debug!("[Client] typing:stop 发送失败: {:#}", e);
                    }
                    false
                } else {
                    true
                }
            }
            None => false,
        };
        if !already_typing {
            self.connection
                .emit(ClientEvent::TypingStart(target.clone()))
                .await?;
        }

        let this = self.clone();
        let idle = self.config.typing_idle;
        let idle_timer = tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            this.typing_idle_elapsed(generation).await;
        });
        *slot = Some(OutgoingTyping {
            target,
            generation,
            idle_timer,
        });
        Ok(())
    }

    async fn typing_idle_elapsed(&self, generation: u64) {
        let state = {
            let mut slot = self.typing_out.lock().await;
            match slot.as_ref() {
                Some(s) if s.generation == generation => slot.take(),
                _ => None,
            }
        };
        if let Some(state) = state {
            debug!("[Client] ⌨️ 输入空闲，发送 typing:stop");
            if let Err(e) = self
                .connection
                .emit(ClientEvent::TypingStop(state.target))
                .await
            {
                warn!("[Client] typing:stop 发送失败: {:#}", e);
            }
        }
    }

    /// 立即停止输入
    pub async fn stop_typing(&self) -> Result<()> {
        let state = self.typing_out.lock().await.take();
        if let Some(state) = state {
            state.idle_timer.abort();
            self.connection
                .emit(ClientEvent::TypingStop(state.target))
                .await?;
        }
        Ok(())
    }

    /// 把当前会话中他人发送的未读消息标记为已读
    pub async fn mark_read(&self) -> Result<()> {
        let (target, ids) = {
            let guard = self.session.lock().await;
            let Some(session) = guard.as_ref() else {
                return Ok(());
            };
            (session.target().clone(), session.store().unread_from_others())
        };
        if ids.is_empty() {
            return Ok(());
        }
        self.connection
            .emit(ClientEvent::MarkRead {
                target: target.clone(),
                message_ids: ids.clone(),
            })
            .await?;
        let changed = {
            let mut guard = self.session.lock().await;
            guard
                .as_mut()
                .filter(|s| *s.target() == target)
                .map(|s| s.store_mut().mark_read_by(&self.me.id, &ids))
                .unwrap_or(0)
        };
        if changed > 0 {
            self.notify_changes(&Changes {
                messages: true,
                ..Default::default()
            })
            .await;
        }
        Ok(())
    }

    /// 搜索消息（防抖、可取消）；结果通过 `on_search_results` 回调
    pub async fn search_messages(&self, query: &str) {
        let target = self.current_target().await;
        self.search.search(self.listener().await, target, query).await;
    }

    /// 上传附件，返回的附件可以放进 [`MessageDraft`]
    pub async fn upload_attachment(&self, path: &Path) -> Result<Attachment> {
        self.backend.upload(path).await
    }

    /// 在当前房间创建投票
    pub async fn create_poll(&self, poll: NewPoll) -> Result<Poll> {
        let room_id = match self.current_target().await {
            Some(ConversationTarget::Room(id)) => id,
            Some(ConversationTarget::Private(_)) => {
                return Err(anyhow::anyhow!("只能在房间中创建投票"))
            }
            None => return Err(anyhow::anyhow!("没有打开的会话")),
        };
        let created = self.backend.create_poll(&room_id, &poll).await?;
        info!("[Client] 📊 投票已创建: {}", created.id);
        self.upsert_poll(created.clone()).await;
        if let Err(e) = self
            .connection
            .emit(ClientEvent::PollCreated {
                room_id,
                poll: created.clone(),
            })
            .await
        {
            warn!("[Client] 广播投票失败: {:#}", e);
        }
        Ok(created)
    }

    pub async fn vote_poll(&self, poll_id: &str, options: Vec<usize>) -> Result<Poll> {
        if options.is_empty() {
            return Err(anyhow::anyhow!("至少选择一个选项"));
        }
        let poll = self.backend.vote_poll(poll_id, &options).await?;
        self.upsert_poll(poll.clone()).await;
        let room_id = match (poll.room_id.clone(), self.current_target().await) {
            (Some(id), _) => Some(id),
            (None, Some(ConversationTarget::Room(id))) => Some(id),
            _ => None,
        };
        if let Some(room_id) = room_id {
            if let Err(e) = self
                .connection
                .emit(ClientEvent::PollVoted {
                    room_id,
                    poll: poll.clone(),
                })
                .await
            {
                warn!("[Client] 广播投票结果失败: {:#}", e);
            }
        }
        Ok(poll)
    }

    async fn upsert_poll(&self, poll: Poll) {
        let updated = {
            let mut guard = self.session.lock().await;
            match guard.as_mut() {
                Some(session) => {
                    session.upsert_poll(poll);
                    true
                }
                None => false,
            }
        };
        if updated {
            self.notify_changes(&Changes {
                polls: true,
                ..Default::default()
            })
            .await;
        }
    }

    /// 从服务器重新拉取会话列表并写入缓存
    pub async fn refresh_conversations(&self) -> Result<()> {
        let items = self
            .backend
            .list_conversations()
            .await
            .context("拉取会话列表失败")?;
        let snapshot = {
            let mut list = self.conversations.lock().await;
            list.replace(items);
            list.items().to_vec()
        };
        let cache = self.cache.read().await.clone();
        if let Some(cache) = cache {
            if let Err(e) = cache.save_all(&snapshot).await {
                warn!("[Client] 写入会话缓存失败: {:#}", e);
            }
        }
        self.listener()
            .await
            .on_conversations_changed(snapshot)
            .await;
        Ok(())
    }
}
