//! 投票模块

pub mod api;
pub mod board;
pub mod types;

pub use api::PollApi;
pub use board::PollBoard;
pub use types::{NewPoll, Poll, PollOption};
