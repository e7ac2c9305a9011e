//! socket 传输层
//!
//! [`SocketTransport`] 负责发出事件，[`SocketConnector`] 建立连接并返回入站事件通道。
//! 生产环境使用基于 tokio-tungstenite 的 Socket.IO 实现，测试使用内存实现。

use crate::im::events::{ClientEvent, ServerEvent};
use crate::im::socket::codec::{self, EnginePacket, SocketPacket};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

/// WebSocket 写入端类型别名
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// WebSocket 读取端类型别名
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// 入站事件
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected { reason: String },
    Event(ServerEvent),
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn emit(&self, event: ClientEvent) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn connect(
        &self,
        token: &str,
    ) -> Result<(Arc<dyn SocketTransport>, mpsc::UnboundedReceiver<TransportEvent>)>;
}

/// Socket.IO over WebSocket 连接器
pub struct SocketIoConnector {
    socket_url: String,
}

impl SocketIoConnector {
    pub fn new(socket_url: impl Into<String>) -> Self {
        Self {
            socket_url: socket_url.into(),
        }
    }

    /// 构建 Engine.IO WebSocket 地址；token 只放在 connect 包的 auth 中
    fn build_url(&self) -> String {
        let base = self.socket_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}/socket.io/?EIO=4&transport=websocket", base)
    }
}

#[async_trait]
impl SocketConnector for SocketIoConnector {
    async fn connect(
        &self,
        token: &str,
    ) -> Result<(Arc<dyn SocketTransport>, mpsc::UnboundedReceiver<TransportEvent>)> {
        let (transport, rx) = SocketIoTransport::connect(&self.build_url(), token).await?;
        let transport: Arc<dyn SocketTransport> = transport;
        Ok((transport, rx))
    }
}

/// 基于 tokio-tungstenite 的 Socket.IO 传输
pub struct SocketIoTransport {
    writer: Arc<Mutex<WsWriter>>,
    reader_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SocketIoTransport {
    /// 建立连接：等待 open 握手，发送带 token 的 connect 包，等待服务端确认
    pub async fn connect(
        url: &str,
        token: &str,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<TransportEvent>)> {
        info!("[Socket] 🔗 连接 socket 服务器");
        let (ws_stream, response) = connect_async(url).await.context("WebSocket 连接失败")?;
        info!("[Socket] ✅ WebSocket 连接成功, 状态: {}", response.status());

        let (write, mut read) = ws_stream.split();
        let writer = Arc::new(Mutex::new(write));

        // Engine.IO open
        let handshake = match next_packet(&mut read).await? {
            EnginePacket::Open(hs) => hs,
            other => return Err(anyhow::anyhow!("期望握手包，收到: {:?}", other)),
        };
        debug!(
            "[Socket] 握手完成 sid={}, pingInterval={}ms",
            handshake.sid, handshake.ping_interval
        );

        // Socket.IO connect（auth 中携带 token）
        let auth = serde_json::json!({ "token": token });
        writer
            .lock()
            .await
            .send(WsMessage::Text(codec::encode_connect(Some(&auth))))
            .await
            .context("发送 connect 包失败")?;

        loop {
            match next_packet(&mut read).await? {
                EnginePacket::Message(SocketPacket::Connect(_)) => break,
                EnginePacket::Message(SocketPacket::ConnectError(msg)) => {
                    error!("[Socket] ❌ 服务器拒绝连接: {}", msg);
                    return Err(anyhow::anyhow!("socket 鉴权失败: {}", msg));
                }
                EnginePacket::Ping => {
                    writer
                        .lock()
                        .await
                        .send(WsMessage::Text(codec::encode_pong()))
                        .await?;
                }
                other => debug!("[Socket] 等待 connect 确认时忽略: {:?}", other),
            }
        }
        info!("[Socket] ✅ Socket.IO 命名空间已连接");

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(TransportEvent::Connected);

        let reader_writer = writer.clone();
        let reader_task = tokio::spawn(async move {
            let reason = read_loop(read, reader_writer, &tx).await;
            warn!("[Socket] 👋 连接关闭: {}", reason);
            let _ = tx.send(TransportEvent::Disconnected { reason });
        });

        Ok((
            Arc::new(Self {
                writer,
                reader_task: std::sync::Mutex::new(Some(reader_task)),
            }),
            rx,
        ))
    }
}

/// 读取下一个可解析的 Engine.IO 包
async fn next_packet(read: &mut WsReader) -> Result<EnginePacket> {
    loop {
        match read.next().await {
            Some(Ok(WsMessage::Text(text))) => return codec::decode(&text),
            Some(Ok(WsMessage::Close(frame))) => {
                return Err(anyhow::anyhow!("握手阶段连接被关闭: {:?}", frame))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(anyhow::anyhow!("WebSocket 错误: {}", e)),
            None => return Err(anyhow::anyhow!("握手阶段连接已结束")),
        }
    }
}

/// 事件循环：应答 ping，解析事件并转发；返回断开原因
async fn read_loop(
    mut read: WsReader,
    writer: Arc<Mutex<WsWriter>>,
    tx: &mpsc::UnboundedSender<TransportEvent>,
) -> String {
    while let Some(msg_result) = read.next().await {
        let text = match msg_result {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(frame)) => return format!("服务器关闭连接: {:?}", frame),
            Ok(_) => continue,
            Err(e) => {
                error!("[Socket] WebSocket 错误: {}", e);
                return format!("WebSocket 错误: {}", e);
            }
        };

        let packet = match codec::decode(&text) {
            Ok(p) => p,
            Err(e) => {
                warn!("[Socket] 无法解析的帧: {}, 原始数据: {}", e, text);
                continue;
            }
        };

        match packet {
            EnginePacket::Ping => {
                let mut w = writer.lock().await;
                if let Err(e) = w.send(WsMessage::Text(codec::encode_pong())).await {
                    return format!("发送 pong 失败: {}", e);
                }
            }
            EnginePacket::Close => return "服务器关闭 Engine.IO 会话".to_string(),
            EnginePacket::Message(SocketPacket::Disconnect) => {
                return "服务器断开命名空间".to_string()
            }
            EnginePacket::Message(SocketPacket::Event { name, data, .. }) => {
                match ServerEvent::parse(&name, data) {
                    Ok(Some(event)) => {
                        debug!("[Socket] 📥 收到事件: {}", name);
                        if tx.send(TransportEvent::Event(event)).is_err() {
                            return "事件接收端已关闭".to_string();
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("[Socket] 事件 {} 解析失败: {:#}", name, e),
                }
            }
            other => debug!("[Socket] 忽略包: {:?}", other),
        }
    }
    "连接已结束".to_string()
}

#[async_trait]
impl SocketTransport for SocketIoTransport {
    async fn emit(&self, event: ClientEvent) -> Result<()> {
        let frame = codec::encode_event(event.name(), &event.payload())?;
        debug!("[Socket] 📤 发出事件: {}", event.name());
        let mut w = self.writer.lock().await;
        w.send(WsMessage::Text(frame))
            .await
            .with_context(|| format!("发送事件 {} 失败", event.name()))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        {
            let mut w = self.writer.lock().await;
            let _ = w.send(WsMessage::Text(codec::encode_disconnect())).await;
            let _ = w.close().await;
        }
        if let Ok(mut slot) = self.reader_task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        Ok(())
    }
}

/// 内存传输：记录发出的事件，可注入入站事件和发送失败
#[derive(Clone, Default)]
pub struct MemoryTransport {
    emitted: Arc<std::sync::Mutex<Vec<ClientEvent>>>,
    fail_emits: Arc<std::sync::atomic::AtomicBool>,
    closed: Arc<std::sync::atomic::AtomicBool>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitted(&self) -> Vec<ClientEvent> {
        self.emitted
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn emitted_names(&self) -> Vec<&'static str> {
        self.emitted().iter().map(ClientEvent::name).collect()
    }

    /// 之后的 emit 全部失败
    pub fn set_fail_emits(&self, fail: bool) {
        self.fail_emits
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl SocketTransport for MemoryTransport {
    async fn emit(&self, event: ClientEvent) -> Result<()> {
        if self.fail_emits.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(anyhow::anyhow!("模拟发送失败: {}", event.name()));
        }
        if self.is_closed() {
            return Err(anyhow::anyhow!("连接已关闭"));
        }
        self.emitted
            .lock()
            .map_err(|_| anyhow::anyhow!("记录锁已损坏"))?
            .push(event);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed
            .store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

/// 内存连接器：每次连接返回同一个 [`MemoryTransport`]，并保留入站发送端供测试注入事件
#[derive(Clone, Default)]
pub struct MemoryConnector {
    transport: MemoryTransport,
    inbound: Arc<std::sync::Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>>,
    connections: Arc<std::sync::atomic::AtomicUsize>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(&self) -> MemoryTransport {
        self.transport.clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// 向最近一次连接注入入站事件
    pub fn push(&self, event: TransportEvent) -> Result<()> {
        let guard = self
            .inbound
            .lock()
            .map_err(|_| anyhow::anyhow!("入站锁已损坏"))?;
        let tx = guard.as_ref().ok_or_else(|| anyhow::anyhow!("尚未连接"))?;
        tx.send(event).map_err(|_| anyhow::anyhow!("入站接收端已关闭"))
    }
}

#[async_trait]
impl SocketConnector for MemoryConnector {
    async fn connect(
        &self,
        _token: &str,
    ) -> Result<(Arc<dyn SocketTransport>, mpsc::UnboundedReceiver<TransportEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(TransportEvent::Connected);
        if let Ok(mut slot) = self.inbound.lock() {
            *slot = Some(tx);
        }
        self.transport
            .closed
            .store(false, std::sync::atomic::Ordering::SeqCst);
        self.connections
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let transport: Arc<dyn SocketTransport> = Arc::new(self.transport.clone());
        Ok((transport, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::conversation::types::ConversationTarget;

    #[test]
    fn socket_url_is_built_from_http_base_without_token() {
        let c = SocketIoConnector::new("https://chat.example.com/");
        assert_eq!(
            c.build_url(),
            "wss://chat.example.com/socket.io/?EIO=4&transport=websocket"
        );
        let c = SocketIoConnector::new("ws://localhost:5000");
        assert!(c.build_url().starts_with("ws://localhost:5000/socket.io/"));
    }

    #[tokio::test]
    async fn memory_connector_records_emits_and_forwards_inbound() {
        let connector = MemoryConnector::new();
        let (transport, mut rx) = connector.connect("t").await.unwrap();
        assert_eq!(rx.recv().await, Some(TransportEvent::Connected));

        transport
            .emit(ClientEvent::Join(ConversationTarget::Room("r1".into())))
            .await
            .unwrap();
        assert_eq!(connector.transport().emitted_names(), vec!["room:join"]);

        connector
            .push(TransportEvent::Disconnected {
                reason: "bye".into(),
            })
            .unwrap();
        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::Disconnected {
                reason: "bye".into()
            })
        );
    }

    #[tokio::test]
    async fn memory_transport_failure_injection() {
        let t = MemoryTransport::new();
        t.set_fail_emits(true);
        let target = ConversationTarget::Room("r1".into());
        assert!(t.emit(ClientEvent::TypingStart(target.clone())).await.is_err());
        t.set_fail_emits(false);
        t.emit(ClientEvent::TypingStart(target.clone())).await.unwrap();
        t.close().await.unwrap();
        assert!(t.emit(ClientEvent::TypingStop(target)).await.is_err());
        assert_eq!(t.emitted().len(), 1);
    }
}
