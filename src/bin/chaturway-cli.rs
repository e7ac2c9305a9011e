//! Chaturway CLI 客户端
//!
//! 登录、连接并打开一个房间或私聊，打印所有监听器回调；
//! 标准输入的每一行作为消息发送，`/quit` 退出。

use anyhow::{Context, Result};
use chaturway_sdk::im::conversation::types::{ConversationSummary, ConversationTarget};
use chaturway_sdk::im::events::Notification;
use chaturway_sdk::im::message::types::{Message, MessageDraft};
use chaturway_sdk::im::poll::types::Poll;
use chaturway_sdk::{login_async, ChatListener, ChaturwayClient, ClientConfig};
use chrono::{DateTime, Utc};
use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

/// Chaturway CLI 客户端
#[derive(Parser, Debug)]
#[command(name = "chaturway-cli")]
#[command(about = "Chaturway CLI 客户端 - 收发消息并展示实时事件", long_about = None)]
struct Args {
    /// HTTP API 地址
    #[arg(long, env = "CHATURWAY_API_URL", default_value = "http://localhost:5000")]
    api_url: String,

    /// socket 服务器地址（默认与 API 地址相同）
    #[arg(long, env = "CHATURWAY_SOCKET_URL")]
    socket_url: Option<String>,

    /// 登录邮箱
    #[arg(short, long, env = "CHATURWAY_EMAIL")]
    email: String,

    /// 登录密码
    #[arg(short, long, env = "CHATURWAY_PASSWORD")]
    password: String,

    /// 打开的房间 ID
    #[arg(long, conflicts_with = "chat")]
    room: Option<String>,

    /// 打开的私聊 ID
    #[arg(long)]
    chat: Option<String>,

    /// 会话列表缓存（SQLite URL）
    #[arg(long, env = "CHATURWAY_CACHE_DB", default_value = "sqlite://chaturway.db?mode=rwc")]
    cache_db: String,

    /// 日志级别（默认: info,chaturway_sdk=debug）
    #[arg(long, default_value = "info,chaturway_sdk=debug")]
    log_level: String,
}

/// 初始化日志（同时输出到 stdout 和文件）
fn init_logger(log_level: &str) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG，否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .context("无法创建日志文件 debug.log")?;

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    // 文件不需要颜色
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("[CLI] 📝 日志已同时输出到控制台和文件: debug.log");
    Ok(())
}

/// 打印所有回调
struct CliListener;

#[async_trait::async_trait]
impl ChatListener for CliListener {
    async fn on_connection_status_changed(&self, connected: bool, message: String) {
        if connected {
            info!("[CLI] 🔗 已连接: {}", message);
        } else {
            error!("[CLI] 🔗 断开连接: {}", message);
        }
    }

    async fn on_messages_changed(&self, target: ConversationTarget, messages: Vec<Message>) {
        info!("[CLI/Message] 📨 {} 共 {} 条消息", target, messages.len());
        if let Some(last) = messages.last() {
            info!(
                "[CLI/Message]   最新: [{}] {}: {} ({:?})",
                last.id,
                last.sender_id(),
                last.preview(),
                last.delivery
            );
        }
    }

    async fn on_send_failed(&self, temp_id: String, error: String) {
        error!(
            "[CLI/Message] ❌ 发送失败: {} - {}（/retry {} 或 /discard {}）",
            temp_id, error, temp_id, temp_id
        );
    }

    async fn on_typing_changed(&self, target: ConversationTarget, user_ids: Vec<String>) {
        info!("[CLI/Typing] ⌨️ {} 正在输入: {:?}", target, user_ids);
    }

    async fn on_presence_changed(
        &self,
        user_id: String,
        online: bool,
        last_seen: Option<DateTime<Utc>>,
    ) {
        info!(
            "[CLI/Presence] 👤 {} {} (last_seen={:?})",
            user_id,
            if online { "上线" } else { "下线" },
            last_seen
        );
    }

    async fn on_polls_changed(&self, target: ConversationTarget, polls: Vec<Poll>) {
        for poll in polls {
            info!(
                "[CLI/Poll] 📊 {} {} 共 {} 票",
                target,
                poll.question,
                poll.total_votes()
            );
        }
    }

    async fn on_pinned_changed(&self, target: ConversationTarget, pinned: Vec<Message>) {
        info!("[CLI/Pinned] 📌 {} 置顶 {} 条", target, pinned.len());
    }

    async fn on_conversations_changed(&self, conversations: Vec<ConversationSummary>) {
        info!("[CLI/Conversation] 📋 会话列表（共 {} 个）:", conversations.len());
        for conv in conversations.iter().take(5) {
            let latest: String = conv
                .last_message
                .as_deref()
                .unwrap_or_default()
                .chars()
                .take(30)
                .collect();
            info!(
                "[CLI/Conversation]   - {} | 未读: {} | 最新: {}",
                conv.name, conv.unread_count, latest
            );
        }
    }

    async fn on_notification(&self, notification: Notification) {
        info!("[CLI/Notify] 🔔 {}", notification.text);
    }

    async fn on_mention(&self, notification: Notification) {
        info!("[CLI/Notify] 📣 提及: {}", notification.text);
    }

    async fn on_search_results(&self, query: String, results: Vec<Message>) {
        info!("[CLI/Search] 🔍 \"{}\" 命中 {} 条", query, results.len());
        for msg in results.iter().take(10) {
            info!("[CLI/Search]   [{}] {}", msg.id, msg.preview());
        }
    }

    async fn on_search_failed(&self, query: String, error: String) {
        warn!("[CLI/Search] 搜索 \"{}\" 失败: {}", query, error);
    }
}

/// 处理一行输入；返回 false 表示退出
async fn handle_line(client: &ChaturwayClient, line: &str) -> Result<bool> {
    let line = line.trim();
    let (command, rest) = match line.split_once(' ') {
        Some((c, r)) => (c, r.trim()),
        None => (line, ""),
    };
    match command {
        "" => {}
        "/quit" => return Ok(false),
        "/search" => client.search_messages(rest).await,
        "/older" => {
            let n = client.load_older_messages().await?;
            info!("[CLI] 加载了 {} 条更早的消息", n);
        }
        "/retry" => {
            client.retry_send(rest).await?;
        }
        "/discard" => client.discard_failed(rest).await?,
        "/delete" => client.delete_message(rest).await?,
        "/edit" => {
            let (id, text) = rest
                .split_once(' ')
                .ok_or_else(|| anyhow::anyhow!("用法: /edit <消息ID> <内容>"))?;
            client.edit_message(id, text).await?;
        }
        "/react" => {
            let (id, emoji) = rest
                .split_once(' ')
                .ok_or_else(|| anyhow::anyhow!("用法: /react <消息ID> <表情>"))?;
            client.react(id, emoji.trim()).await?;
        }
        "/online" => {
            info!("[CLI/Presence] 👤 在线用户: {:?}", client.online_users().await);
        }
        "/unread" => {
            info!("[CLI/Conversation] 📬 未读总数: {}", client.total_unread().await);
        }
        "/pin" => client.pin_message(rest).await?,
        "/unpin" => client.unpin_message(rest).await?,
        _ => {
            client.send_message(MessageDraft::text(line)).await?;
        }
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level)?;

    info!("[CLI] 🚀 Chaturway CLI 客户端");
    info!("[CLI] 🌐 API: {}", args.api_url);

    let login = login_async(&args.api_url, args.email.clone(), args.password.clone())
        .await
        .context("登录失败")?;
    info!("[CLI] ✅ 登录成功！用户ID: {}", login.user.id);

    let mut config = ClientConfig::new(login.user.id.clone(), login.user.username.clone(), login.token);
    config.api_base_url = args.api_url.clone();
    config.socket_url = args.socket_url.unwrap_or_else(|| args.api_url.clone());
    config.conversation_cache_url = Some(args.cache_db);

    let client = ChaturwayClient::new(config)?;
    client.set_listener(Arc::new(CliListener)).await;

    info!("[CLI] 🔗 正在连接服务器...");
    client.connect().await.context("连接失败")?;

    let target = match (args.room, args.chat) {
        (Some(room), _) => Some(ConversationTarget::Room(room)),
        (None, Some(chat)) => Some(ConversationTarget::Private(chat)),
        (None, None) => None,
    };
    match target {
        Some(target) => client.open_conversation(target).await?,
        None => warn!("[CLI] 未指定 --room 或 --chat，只展示会话列表和通知"),
    }

    info!("[CLI] 💡 输入文字发送消息，/quit 退出");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("读取标准输入失败")? {
        match handle_line(&client, &line).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => error!("[CLI] ❌ {:#}", e),
        }
    }

    client.logout().await?;
    info!("[CLI] 👋 程序退出");
    Ok(())
}
