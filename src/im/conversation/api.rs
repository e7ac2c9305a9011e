//! 会话 HTTP API 客户端
//!
//! 拉取房间和私聊列表，统一转换为 [`ConversationSummary`]

use crate::im::conversation::types::{ConversationSummary, PrivateChatDto, RoomDto};
use crate::im::types::handle_http_response;
use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RoomsResp {
    List(Vec<RoomDto>),
    Wrapped { rooms: Vec<RoomDto> },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChatsResp {
    List(Vec<PrivateChatDto>),
    Wrapped { chats: Vec<PrivateChatDto> },
}

/// 会话相关的 HTTP API 客户端
pub struct ConversationApi {
    client: reqwest::Client,
    api_base_url: String,
    user_id: String,
}

impl ConversationApi {
    /// `client` 应该已经配置好认证头
    pub fn new(client: reqwest::Client, api_base_url: String, user_id: String) -> Self {
        Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            user_id,
        }
    }

    pub async fn get_rooms(&self) -> Result<Vec<ConversationSummary>> {
        let url = format!("{}/api/rooms", self.api_base_url);
        debug!("[ConvAPI] 请求URL: {}", url);
        let response = self.client.get(&url).send().await.context("请求失败")?;
        let rooms = match handle_http_response::<RoomsResp>(response, "获取房间列表").await? {
            RoomsResp::List(v) => v,
            RoomsResp::Wrapped { rooms } => rooms,
        };
        Ok(rooms.into_iter().map(RoomDto::into_summary).collect())
    }

    pub async fn get_private_chats(&self) -> Result<Vec<ConversationSummary>> {
        let url = format!("{}/api/chats", self.api_base_url);
        debug!("[ConvAPI] 请求URL: {}", url);
        let response = self.client.get(&url).send().await.context("请求失败")?;
        let chats = match handle_http_response::<ChatsResp>(response, "获取私聊列表").await? {
            ChatsResp::List(v) => v,
            ChatsResp::Wrapped { chats } => chats,
        };
        Ok(chats
            .into_iter()
            .map(|c| c.into_summary(&self.user_id))
            .collect())
    }

    /// 房间和私聊合并后的完整列表
    pub async fn get_all_conversations(&self) -> Result<Vec<ConversationSummary>> {
        info!("[ConvAPI] 📡 拉取会话列表");
        let (rooms, chats) = tokio::try_join!(self.get_rooms(), self.get_private_chats())?;
        info!(
            "[ConvAPI] ✅ 会话列表: {} 个房间, {} 个私聊",
            rooms.len(),
            chats.len()
        );
        let mut all = rooms;
        all.extend(chats);
        Ok(all)
    }
}
