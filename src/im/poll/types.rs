//! 投票类型定义

use crate::im::serialization::deserialize_null_default;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOption {
    pub text: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub votes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default, alias = "room", skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    pub question: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub options: Vec<PollOption>,
    /// 是否允许多选
    #[serde(default, alias = "allowMultiple")]
    pub multiple: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default)]
    pub closed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Poll {
    pub fn total_votes(&self) -> usize {
        self.options.iter().map(|o| o.votes.len()).sum()
    }

    /// 用户投过的选项下标
    pub fn voted_options(&self, user_id: &str) -> Vec<usize> {
        self.options
            .iter()
            .enumerate()
            .filter(|(_, o)| o.votes.iter().any(|v| v == user_id))
            .map(|(i, _)| i)
            .collect()
    }
}

/// 创建投票请求
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPoll {
    pub question: String,
    pub options: Vec<String>,
    pub multiple: bool,
}

impl NewPoll {
    /// 题目非空且至少两个非空选项
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.question.trim().is_empty() {
            return Err(anyhow::anyhow!("投票题目不能为空"));
        }
        let filled = self.options.iter().filter(|o| !o.trim().is_empty()).count();
        if filled < 2 {
            return Err(anyhow::anyhow!("投票至少需要两个选项"));
        }
        Ok(())
    }
}
