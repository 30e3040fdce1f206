//! 会话与参与者实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::InstantMessage;
use crate::profile::UserProfile;

/// 会话参与者
///
/// `is_deleted` 为全局删除标记（跨会话、粘性），`has_left` 为单会话内可逆的退出标记。
/// 三个水位时间戳一旦写入只会单调前进。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,

    #[serde(default)]
    pub profile: UserProfile,

    #[serde(default)]
    pub is_deleted: bool,

    #[serde(default)]
    pub has_left: bool,

    #[serde(default)]
    pub is_muted: bool,

    /// 已读水位
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_on: Option<DateTime<Utc>>,

    /// 已送达水位
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_on: Option<DateTime<Utc>>,

    /// 该参与者最后一次发消息的时间，乐观并发追加的判断依据
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_on: Option<DateTime<Utc>>,
}

impl Participant {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            profile: UserProfile::default(),
            is_deleted: false,
            has_left: false,
            is_muted: false,
            read_on: None,
            delivered_on: None,
            last_message_on: None,
        }
    }

    /// 活跃参与者：未退出且未被全局删除
    pub fn is_active(&self) -> bool {
        !self.has_left && !self.is_deleted
    }
}

/// 会话
///
/// 消息序列只追加，存储顺序即时间顺序。参与者按用户 ID 唯一。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default)]
    pub participants: Vec<Participant>,

    #[serde(default)]
    pub messages: Vec<InstantMessage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_on: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity_on: Option<DateTime<Utc>>,

    #[serde(default)]
    pub message_count: usize,
}

impl Chat {
    /// 恰好两个参与者的会话为 P2P 会话
    pub fn is_p2p(&self) -> bool {
        self.participants.len() == 2
    }

    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == user_id)
    }

    pub fn participant_mut(&mut self, user_id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == user_id)
    }

    /// 用户是否为活跃参与者
    pub fn has_active_participant(&self, user_id: &str) -> bool {
        self.participant(user_id).is_some_and(Participant::is_active)
    }

    pub fn active_participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.is_active())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p2p_detection() {
        let mut chat = Chat::default();
        chat.participants.push(Participant::new("a"));
        assert!(!chat.is_p2p());
        chat.participants.push(Participant::new("b"));
        assert!(chat.is_p2p());
    }

    #[test]
    fn active_participant_filters_left_and_deleted() {
        let mut chat = Chat::default();
        chat.participants.push(Participant::new("a"));
        chat.participants.push(Participant {
            has_left: true,
            ..Participant::new("b")
        });
        chat.participants.push(Participant {
            is_deleted: true,
            ..Participant::new("c")
        });

        assert!(chat.has_active_participant("a"));
        assert!(!chat.has_active_participant("b"));
        assert!(!chat.has_active_participant("c"));
        assert_eq!(chat.active_participants().count(), 1);
    }
}
