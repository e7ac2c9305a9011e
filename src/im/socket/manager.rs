//! 会话级连接管理
//!
//! 登录后建立连接、登出时销毁；通过注入 [`SocketConnector`] 替代进程级单例，
//! 测试中可替换为内存传输。

use crate::im::events::ClientEvent;
use crate::im::socket::transport::{SocketConnector, SocketTransport, TransportEvent};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

pub struct ConnectionManager {
    connector: Arc<dyn SocketConnector>,
    transport: RwLock<Option<Arc<dyn SocketTransport>>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn SocketConnector>) -> Self {
        Self {
            connector,
            transport: RwLock::new(None),
        }
    }

    /// 建立连接；已有连接时先关闭旧连接再重连
    pub async fn connect(&self, token: &str) -> Result<mpsc::UnboundedReceiver<TransportEvent>> {
        let previous = self.transport.write().await.take();
        if let Some(old) = previous {
            warn!("[Conn] 已存在连接，关闭旧连接");
            if let Err(e) = old.close().await {
                warn!("[Conn] 关闭旧连接失败: {}", e);
            }
        }
        let (transport, rx) = self.connector.connect(token).await?;
        *self.transport.write().await = Some(transport);
        info!("[Conn] ✅ 连接已建立");
        Ok(rx)
    }

    pub async fn is_connected(&self) -> bool {
        self.transport.read().await.is_some()
    }

    pub async fn emit(&self, event: ClientEvent) -> Result<()> {
        let transport = self
            .transport
            .read()
            .await
            .clone()
            .ok_or_else(|| anyhow::anyhow!("socket 未连接，无法发送 {}", event.name()))?;
        transport.emit(event).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        let transport = self.transport.write().await.take();
        if let Some(t) = transport {
            info!("[Conn] 👋 断开连接");
            t.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::conversation::types::ConversationTarget;
    use crate::im::socket::transport::MemoryConnector;

    #[tokio::test]
    async fn emit_requires_connection() {
        let connector = MemoryConnector::new();
        let manager = ConnectionManager::new(Arc::new(connector.clone()));
        let join = ClientEvent::Join(ConversationTarget::Room("r1".into()));

        let err = manager.emit(join.clone()).await.unwrap_err();
        assert!(err.to_string().contains("未连接"));

        let _rx = manager.connect("token").await.unwrap();
        assert!(manager.is_connected().await);
        manager.emit(join).await.unwrap();
        assert_eq!(connector.transport().emitted_names(), vec!["room:join"]);

        manager.disconnect().await.unwrap();
        assert!(!manager.is_connected().await);
        assert!(connector.transport().is_closed());
    }
}
