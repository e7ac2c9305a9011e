//! socket 客户端
//!
//! Socket.IO 帧编解码、传输实现和会话级连接管理

pub mod codec;
pub mod manager;
pub mod transport;

pub use manager::ConnectionManager;
pub use transport::{
    MemoryConnector, MemoryTransport, SocketConnector, SocketIoConnector, SocketIoTransport,
    SocketTransport, TransportEvent,
};
