use crate::im::types::{handle_http_response, UserSummary};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginData {
    pub token: String,
    pub user: UserSummary,
}

pub async fn login_async(api_base_url: &str, email: String, password: String) -> Result<LoginData> {
    let client = reqwest::Client::new();
    let url = format!("{}/api/auth/login", api_base_url.trim_end_matches('/'));
    let login_req = LoginRequest { email, password };

    info!("🔐 正在登录...");
    debug!("   URL: {}", url);
    debug!("   邮箱: {}", login_req.email);

    let response = client
        .post(&url)
        .header("Accept", "application/json, text/plain, */*")
        .json(&login_req)
        .send()
        .await
        .context("请求失败")?;

    let data: LoginData = handle_http_response(response, "登录").await?;
    info!("✅ 登录成功: {} ({})", data.user.username, data.user.id);
    Ok(data)
}
