//! 即时消息实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 即时消息
///
/// 追加到会话后不可变。时间戳为 UTC 毫秒精度，在会话的消息流中标识该消息。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstantMessage {
    /// 消息 UTC 时间戳，服务端写入时盖章
    pub timestamp: DateTime<Utc>,

    /// 作者用户 ID
    #[serde(default)]
    pub author: String,

    /// 消息文本，若有附件可为空
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// 附件，若有文本可为空
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<Attachment>,

    /// 可选的扩展元数据
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl InstantMessage {
    /// 文本消息的快捷构造
    pub fn text(author: impl Into<String>, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            author: author.into(),
            message: Some(text.into()),
            file: None,
            metadata: None,
        }
    }

    /// 既无文本也无附件的消息视为空消息，不允许发送
    pub fn is_empty(&self) -> bool {
        self.message.as_deref().map_or(true, |m| m.trim().is_empty()) && self.file.is_none()
    }
}

/// 消息附件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// 附件 MIME 类型
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn empty_detection() {
        let mut msg = InstantMessage::text("u1", "hi", Utc::now());
        assert!(!msg.is_empty());

        msg.message = Some("   ".into());
        assert!(msg.is_empty());

        msg.file = Some(Attachment {
            url: "https://files.example/1".into(),
            icon_url: None,
            name: None,
            size: None,
            kind: None,
        });
        assert!(!msg.is_empty());
    }
}
