use serde::{Deserialize, Deserializer};

/// 乐观消息临时 ID 前缀
pub const TEMP_ID_PREFIX: &str = "temp-";

/// 反序列化时把 `null` 当作默认值（服务端对空列表有时返回 null）
pub fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    let opt: Option<T> = Deserialize::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// 生成客户端幂等 ID（UUID v4），随发送请求一起上报
pub fn generate_client_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 由客户端 ID 构造本地临时消息 ID
pub fn temp_id_for(client_id: &str) -> String {
    format!("{}{}", TEMP_ID_PREFIX, client_id)
}

/// 是否为本地临时消息 ID
pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "deserialize_null_default")]
        items: Vec<String>,
    }

    #[test]
    fn null_list_becomes_empty() {
        let h: Holder = serde_json::from_str(r#"{"items":null}"#).unwrap();
        assert!(h.items.is_empty());
        let h: Holder = serde_json::from_str(r#"{}"#).unwrap();
        assert!(h.items.is_empty());
    }

    #[test]
    fn temp_ids_carry_prefix() {
        let client_id = generate_client_id();
        let temp = temp_id_for(&client_id);
        assert!(is_temp_id(&temp));
        assert!(temp.ends_with(&client_id));
        assert!(!is_temp_id("665f1c2e9b1d"));
    }
}
