//! RPC 出入参模型

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use domain::{Chat, InstantMessage, UserProfile};
use serde::{Deserialize, Serialize};

/// 会话概要：列表和单查的返回形态，在线状态来自连接注册表快照
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_on: Option<DateTime<Utc>>,
    pub message_count: usize,
    /// 当前用户自己的已读水位
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_on: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<InstantMessage>,
    pub participants: Vec<ParticipantSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSummary {
    pub id: String,
    pub profile: UserProfile,
    pub is_deleted: bool,
    pub has_left: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_on: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_on: Option<DateTime<Utc>>,
    pub is_online: bool,
}

impl ChatSummary {
    pub fn build(chat: &Chat, current_user_id: &str, online_users: &HashSet<String>) -> Self {
        Self {
            id: chat.id.clone(),
            title: chat.title.clone(),
            started_by: chat.started_by.clone(),
            started_on: chat.started_on,
            message_count: chat.message_count,
            read_on: chat
                .participant(current_user_id)
                .and_then(|p| p.read_on),
            last_message: chat.messages.last().cloned(),
            participants: chat
                .participants
                .iter()
                .map(|p| ParticipantSummary {
                    id: p.id.clone(),
                    profile: p.profile.clone(),
                    is_deleted: p.is_deleted,
                    has_left: p.has_left,
                    read_on: p.read_on,
                    delivered_on: p.delivered_on,
                    is_online: online_users.contains(&p.id),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub user_id: String,
    pub is_online: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub service: String,
    pub storage: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageParams {
    pub chat_id: String,
    pub message: InstantMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartChatParams {
    pub chat: Chat,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetChatParams {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMessagesParams {
    pub chat_id: String,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub move_backward: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeTitleParams {
    pub chat_id: String,
    pub title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatIdParams {
    pub chat_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkParams {
    pub chat_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAllParams {
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddParticipantsParams {
    pub chat_id: String,
    pub ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetUserStatusParams {
    pub ids: Vec<String>,
}

/// count 省略或非正时的默认页大小
pub const DEFAULT_HISTORY_COUNT: usize = 30;

impl GetMessagesParams {
    /// 解析窗口默认值：正向覆盖 [MIN, MAX]，反向覆盖 (MAX, MIN]
    pub fn resolve(&self) -> (DateTime<Utc>, DateTime<Utc>, usize) {
        let count = match self.count {
            Some(c) if c > 0 => c as usize,
            _ => DEFAULT_HISTORY_COUNT,
        };
        let (from, to) = if self.move_backward {
            (
                self.from.unwrap_or(DateTime::<Utc>::MAX_UTC),
                self.to.unwrap_or(DateTime::<Utc>::MIN_UTC),
            )
        } else {
            (
                self.from.unwrap_or(DateTime::<Utc>::MIN_UTC),
                self.to.unwrap_or(DateTime::<Utc>::MAX_UTC),
            )
        };
        (from, to, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::Participant;

    #[test]
    fn summary_resolves_online_flag_and_own_watermark() {
        let mut chat = Chat {
            id: "c1".into(),
            participants: vec![Participant::new("u1"), Participant::new("u2")],
            ..Chat::default()
        };
        chat.participant_mut("u1").unwrap().read_on = Some(Utc::now());

        let online: HashSet<String> = ["u2".to_string()].into();
        let summary = ChatSummary::build(&chat, "u1", &online);

        assert!(summary.read_on.is_some());
        assert!(!summary.participants[0].is_online);
        assert!(summary.participants[1].is_online);
        assert!(summary.last_message.is_none());
    }

    #[test]
    fn history_defaults_span_everything() {
        let params = GetMessagesParams {
            chat_id: "c1".into(),
            from: None,
            to: None,
            count: Some(0),
            move_backward: false,
        };
        let (from, to, count) = params.resolve();
        assert_eq!(from, DateTime::<Utc>::MIN_UTC);
        assert_eq!(to, DateTime::<Utc>::MAX_UTC);
        assert_eq!(count, DEFAULT_HISTORY_COUNT);

        let params = GetMessagesParams {
            chat_id: "c1".into(),
            from: None,
            to: None,
            count: Some(-5),
            move_backward: true,
        };
        let (from, to, count) = params.resolve();
        assert_eq!(from, DateTime::<Utc>::MAX_UTC);
        assert_eq!(to, DateTime::<Utc>::MIN_UTC);
        assert_eq!(count, DEFAULT_HISTORY_COUNT);
    }
}
