pub mod auth;
pub mod backend;
pub mod client;
pub mod conversation;
pub mod events;
pub mod listener;
pub mod message;
pub mod poll;
pub mod presence;
pub mod search;
pub mod serialization;
pub mod session;
pub mod socket;
pub mod types;
pub mod typing;

#[cfg(test)]
pub(crate) mod testing;

// 重新导出认证相关函数
pub use auth::{login_async, LoginData};
