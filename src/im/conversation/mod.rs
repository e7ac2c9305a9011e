//! 会话模块
//!
//! 会话标识、会话列表及其本地缓存

pub mod api;
pub mod dao;
pub mod list;
pub mod types;

// 重新导出主要类型
pub use api::ConversationApi;
pub use dao::ConversationCache;
pub use list::ConversationList;
pub use types::{ConversationKind, ConversationSummary, ConversationTarget};
