//! Engine.IO v4 / Socket.IO v5 文本帧编解码
//!
//! 帧格式：首字符为 Engine.IO 包类型，`4`（message）之后紧跟 Socket.IO 包：
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,..}   open
//! 2 / 3                                   ping / pong
//! 40{"token":".."}                        connect（携带 auth）
//! 41                                      disconnect
//! 42["message:new",{...}]                 event
//! 4213["event",{...}]                     带 ack id 的 event
//! 43 / 44                                 ack / connect_error
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

/// open 包携带的握手信息
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event {
        ack_id: Option<u64>,
        name: String,
        data: Value,
    },
    Ack {
        ack_id: u64,
        data: Vec<Value>,
    },
    ConnectError(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// 解码一个文本帧
pub fn decode(frame: &str) -> Result<EnginePacket> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or_else(|| anyhow::anyhow!("空帧"))?;
    let rest = chars.as_str();
    match kind {
        '0' => {
            let hs: Handshake = serde_json::from_str(rest).context("解析握手包失败")?;
            Ok(EnginePacket::Open(hs))
        }
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping),
        '3' => Ok(EnginePacket::Pong),
        '4' => Ok(EnginePacket::Message(decode_socket_packet(rest)?)),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(anyhow::anyhow!("未知 Engine.IO 包类型: {}", other)),
    }
}

fn decode_socket_packet(body: &str) -> Result<SocketPacket> {
    let mut chars = body.chars();
    let kind = chars
        .next()
        .ok_or_else(|| anyhow::anyhow!("空 Socket.IO 包"))?;
    let mut rest = chars.as_str();

    // 命名空间："/chat,"，默认命名空间省略
    if rest.starts_with('/') {
        rest = match rest.find(',') {
            Some(idx) => &rest[idx + 1..],
            None => "",
        };
    }

    // ack id：紧跟的十进制数字
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    let ack_id = if digits > 0 {
        Some(rest[..digits].parse::<u64>().context("解析 ack id 失败")?)
    } else {
        None
    };
    let payload = &rest[digits..];

    match kind {
        '0' => {
            if payload.is_empty() {
                Ok(SocketPacket::Connect(None))
            } else {
                let v: Value = serde_json::from_str(payload).context("解析 connect 包失败")?;
                Ok(SocketPacket::Connect(Some(v)))
            }
        }
        '1' => Ok(SocketPacket::Disconnect),
        '2' => {
            let arr: Vec<Value> = serde_json::from_str(payload).context("解析 event 包失败")?;
            let mut iter = arr.into_iter();
            let name = match iter.next() {
                Some(Value::String(name)) => name,
                other => return Err(anyhow::anyhow!("event 包缺少事件名: {:?}", other)),
            };
            let data = iter.next().unwrap_or(Value::Null);
            Ok(SocketPacket::Event { ack_id, name, data })
        }
        '3' => {
            let ack_id = ack_id.ok_or_else(|| anyhow::anyhow!("ack 包缺少 id"))?;
            let data: Vec<Value> = serde_json::from_str(payload).context("解析 ack 包失败")?;
            Ok(SocketPacket::Ack { ack_id, data })
        }
        '4' => {
            let message = serde_json::from_str::<Value>(payload)
                .ok()
                .and_then(|v| match v {
                    Value::String(s) => Some(s),
                    Value::Object(obj) => obj
                        .get("message")
                        .and_then(|m| m.as_str())
                        .map(str::to_string),
                    _ => None,
                })
                .unwrap_or_else(|| payload.to_string());
            Ok(SocketPacket::ConnectError(message))
        }
        '5' | '6' => Err(anyhow::anyhow!("不支持二进制 Socket.IO 包")),
        other => Err(anyhow::anyhow!("未知 Socket.IO 包类型: {}", other)),
    }
}

/// 连接默认命名空间，可选携带 auth 载荷
pub fn encode_connect(auth: Option<&Value>) -> String {
    match auth {
        Some(v) => format!("40{}", v),
        None => "40".to_string(),
    }
}

pub fn encode_disconnect() -> String {
    "41".to_string()
}

pub fn encode_pong() -> String {
    "3".to_string()
}

pub fn encode_event(name: &str, data: &Value) -> Result<String> {
    let body = serde_json::to_string(&json!([name, data])).context("序列化事件失败")?;
    Ok(format!("42{}", body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_open_handshake() {
        let pkt = decode(r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#)
            .unwrap();
        match pkt {
            EnginePacket::Open(hs) => {
                assert_eq!(hs.sid, "abc");
                assert_eq!(hs.ping_interval, 25000);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn decodes_event_with_and_without_ack_id() {
        let pkt = decode(r#"42["message:deleted",{"messageId":"m1"}]"#).unwrap();
        assert_eq!(
            pkt,
            EnginePacket::Message(SocketPacket::Event {
                ack_id: None,
                name: "message:deleted".into(),
                data: json!({ "messageId": "m1" }),
            })
        );

        let pkt = decode(r#"4217["typing:start",{"userId":"u1"}]"#).unwrap();
        match pkt {
            EnginePacket::Message(SocketPacket::Event { ack_id, name, .. }) => {
                assert_eq!(ack_id, Some(17));
                assert_eq!(name, "typing:start");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn event_without_payload_has_null_data() {
        match decode(r#"42["ping:custom"]"#).unwrap() {
            EnginePacket::Message(SocketPacket::Event { data, .. }) => assert!(data.is_null()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn namespace_prefix_is_skipped() {
        match decode(r#"42/chat,["user:online","u1"]"#).unwrap() {
            EnginePacket::Message(SocketPacket::Event { name, data, .. }) => {
                assert_eq!(name, "user:online");
                assert_eq!(data, json!("u1"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn decodes_control_packets() {
        assert_eq!(decode("2").unwrap(), EnginePacket::Ping);
        assert_eq!(decode("3").unwrap(), EnginePacket::Pong);
        assert_eq!(decode("1").unwrap(), EnginePacket::Close);
        assert_eq!(
            decode("41").unwrap(),
            EnginePacket::Message(SocketPacket::Disconnect)
        );
        assert_eq!(
            decode(r#"40{"sid":"x"}"#).unwrap(),
            EnginePacket::Message(SocketPacket::Connect(Some(json!({ "sid": "x" }))))
        );
        assert_eq!(
            decode(r#"44{"message":"Authentication error"}"#).unwrap(),
            EnginePacket::Message(SocketPacket::ConnectError("Authentication error".into()))
        );
        assert_eq!(
            decode(r#"431[{"ok":true}]"#).unwrap(),
            EnginePacket::Message(SocketPacket::Ack {
                ack_id: 1,
                data: vec![json!({ "ok": true })],
            })
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode("").is_err());
        assert!(decode("9").is_err());
        assert!(decode("42not-json").is_err());
        assert!(decode("451-[\"upload\",{}]").is_err());
    }

    #[test]
    fn encodes_outgoing_frames() {
        assert_eq!(
            encode_event("room:join", &json!({ "roomId": "r1" })).unwrap(),
            r#"42["room:join",{"roomId":"r1"}]"#
        );
        assert_eq!(encode_connect(Some(&json!({ "token": "t" }))), r#"40{"token":"t"}"#);
        assert_eq!(encode_connect(None), "40");
        assert_eq!(encode_pong(), "3");
        assert_eq!(encode_disconnect(), "41");
    }
}
