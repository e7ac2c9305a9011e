//! 消息模块
//!
//! 消息类型、本地消息列表（乐观发送与对账）和消息 HTTP API

pub mod api;
pub mod store;
pub mod types;

// 重新导出主要类型
pub use api::MessageApi;
pub use store::{MessageStore, Reconciled};
pub use types::{
    Attachment, DeliveryState, Message, MessageDraft, MessageType, Reaction, ReplyRef, SenderRef,
    DELETED_PLACEHOLDER, EXPIRED_PLACEHOLDER,
};
