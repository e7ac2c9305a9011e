//! 投票 HTTP API 客户端

use crate::im::poll::types::{NewPoll, Poll};
use crate::im::types::handle_http_response;
use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

/// 接口可能直接返回投票，也可能包一层 `poll`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PollResp {
    Wrapped { poll: Poll },
    Plain(Poll),
}

impl PollResp {
    fn into_poll(self) -> Poll {
        match self {
            PollResp::Wrapped { poll } => poll,
            PollResp::Plain(poll) => poll,
        }
    }
}

pub struct PollApi {
    client: reqwest::Client,
    api_base_url: String,
}

impl PollApi {
    pub fn new(client: reqwest::Client, api_base_url: String) -> Self {
        Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn create(&self, room_id: &str, poll: &NewPoll) -> Result<Poll> {
        poll.validate()?;
        let url = format!("{}/api/polls", self.api_base_url);
        info!("[PollAPI] 📊 创建投票: room={}, question={}", room_id, poll.question);

        let options: Vec<&str> = poll
            .options
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .collect();
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "roomId": room_id,
                "question": poll.question.trim(),
                "options": options,
                "multiple": poll.multiple,
            }))
            .send()
            .await
            .context("请求失败")?;
        Ok(handle_http_response::<PollResp>(response, "创建投票")
            .await?
            .into_poll())
    }

    /// 投票，`options` 为选项下标
    pub async fn vote(&self, poll_id: &str, options: &[usize]) -> Result<Poll> {
        let url = format!("{}/api/polls/{}/vote", self.api_base_url, poll_id);
        debug!("[PollAPI] 投票: {} {:?}", poll_id, options);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "optionIndexes": options }))
            .send()
            .await
            .context("请求失败")?;
        Ok(handle_http_response::<PollResp>(response, "投票")
            .await?
            .into_poll())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_response_accepts_wrapped_and_plain() {
        let body = serde_json::json!({ "_id": "p1", "question": "lunch?", "options": [] });
        let plain: PollResp = serde_json::from_value(body.clone()).unwrap();
        assert_eq!(plain.into_poll().id, "p1");
        let wrapped: PollResp = serde_json::from_value(serde_json::json!({ "poll": body })).unwrap();
        assert_eq!(wrapped.into_poll().question, "lunch?");
    }

    #[tokio::test]
    async fn invalid_poll_is_rejected_before_request() {
        // 端口不可达：若真的发出请求会得到连接错误而不是校验错误
        let api = PollApi::new(reqwest::Client::new(), "http://127.0.0.1:1".into());
        let err = api
            .create(
                "r1",
                &NewPoll {
                    question: "q".into(),
                    options: vec!["only".into(), " ".into()],
                    multiple: false,
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("两个选项"));
    }
}
