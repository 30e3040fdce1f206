//! 聊天领域事件
//!
//! 会话范围的事件都携带会话 ID、操作者和来源连接 ID，
//! 通知分发时靠来源连接 ID 抑制对操作方连接的回声。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::InstantMessage;
use crate::profile::ResolvedUser;

/// 聊天领域事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChatEvent {
    /// 新消息已追加到会话
    MessageNew {
        chat_id: String,
        connection_id: Option<String>,
        message: InstantMessage,
    },

    /// 参与者已读水位更新
    MessageRead {
        chat_id: String,
        user_id: String,
        connection_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// 参与者送达水位更新
    MessageDelivered {
        chat_id: String,
        user_id: String,
        connection_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// 新参与者加入会话（重新激活已退出的参与者不发布此事件）
    ParticipantAdded {
        chat_id: String,
        /// 执行添加操作的用户
        user_id: String,
        connection_id: Option<String>,
        participant: ResolvedUser,
    },

    /// 参与者退出会话
    ParticipantLeftChat {
        chat_id: String,
        user_id: String,
        connection_id: Option<String>,
    },

    ParticipantStartTyping {
        chat_id: String,
        user_id: String,
        connection_id: Option<String>,
    },

    ParticipantStopTyping {
        chat_id: String,
        user_id: String,
        connection_id: Option<String>,
    },

    ChatTitleUpdated {
        chat_id: String,
        user_id: String,
        connection_id: Option<String>,
        title: String,
    },

    /// 用户上线（按连接粒度发布）
    UserConnected {
        user_id: String,
        connection_id: String,
        broadcast_group: Option<String>,
    },

    /// 用户连接断开。`connection_id` 为 None 表示断开时注册表中已无对应条目
    UserDisconnected {
        user_id: String,
        connection_id: Option<String>,
        broadcast_group: Option<String>,
    },

    /// 无法投递：addressee 当前没有任何在线连接。
    /// 本系统内无消费者，留作离线推送集成的扩展点。
    NotDelivery {
        event: Box<ChatEvent>,
        addressee: String,
    },
}

/// 事件类别，事件总线注册表的键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    MessageNew,
    MessageRead,
    MessageDelivered,
    ParticipantAdded,
    ParticipantLeftChat,
    ParticipantStartTyping,
    ParticipantStopTyping,
    ChatTitleUpdated,
    UserConnected,
    UserDisconnected,
    NotDelivery,
}

impl EventKind {
    /// 所有事件类别，方便一次性订阅
    pub const ALL: [EventKind; 11] = [
        EventKind::MessageNew,
        EventKind::MessageRead,
        EventKind::MessageDelivered,
        EventKind::ParticipantAdded,
        EventKind::ParticipantLeftChat,
        EventKind::ParticipantStartTyping,
        EventKind::ParticipantStopTyping,
        EventKind::ChatTitleUpdated,
        EventKind::UserConnected,
        EventKind::UserDisconnected,
        EventKind::NotDelivery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageNew => "MessageNew",
            Self::MessageRead => "MessageRead",
            Self::MessageDelivered => "MessageDelivered",
            Self::ParticipantAdded => "ParticipantAdded",
            Self::ParticipantLeftChat => "ParticipantLeftChat",
            Self::ParticipantStartTyping => "ParticipantStartTyping",
            Self::ParticipantStopTyping => "ParticipantStopTyping",
            Self::ChatTitleUpdated => "ChatTitleUpdated",
            Self::UserConnected => "UserConnected",
            Self::UserDisconnected => "UserDisconnected",
            Self::NotDelivery => "NotDelivery",
        }
    }
}

impl ChatEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MessageNew { .. } => EventKind::MessageNew,
            Self::MessageRead { .. } => EventKind::MessageRead,
            Self::MessageDelivered { .. } => EventKind::MessageDelivered,
            Self::ParticipantAdded { .. } => EventKind::ParticipantAdded,
            Self::ParticipantLeftChat { .. } => EventKind::ParticipantLeftChat,
            Self::ParticipantStartTyping { .. } => EventKind::ParticipantStartTyping,
            Self::ParticipantStopTyping { .. } => EventKind::ParticipantStopTyping,
            Self::ChatTitleUpdated { .. } => EventKind::ChatTitleUpdated,
            Self::UserConnected { .. } => EventKind::UserConnected,
            Self::UserDisconnected { .. } => EventKind::UserDisconnected,
            Self::NotDelivery { .. } => EventKind::NotDelivery,
        }
    }

    /// 会话范围事件的会话 ID
    pub fn chat_id(&self) -> Option<&str> {
        match self {
            Self::MessageNew { chat_id, .. }
            | Self::MessageRead { chat_id, .. }
            | Self::MessageDelivered { chat_id, .. }
            | Self::ParticipantAdded { chat_id, .. }
            | Self::ParticipantLeftChat { chat_id, .. }
            | Self::ParticipantStartTyping { chat_id, .. }
            | Self::ParticipantStopTyping { chat_id, .. }
            | Self::ChatTitleUpdated { chat_id, .. } => Some(chat_id.as_str()),
            _ => None,
        }
    }

    /// 触发事件的用户
    pub fn acting_user(&self) -> Option<&str> {
        match self {
            Self::MessageNew { message, .. } => Some(message.author.as_str()),
            Self::MessageRead { user_id, .. }
            | Self::MessageDelivered { user_id, .. }
            | Self::ParticipantAdded { user_id, .. }
            | Self::ParticipantLeftChat { user_id, .. }
            | Self::ParticipantStartTyping { user_id, .. }
            | Self::ParticipantStopTyping { user_id, .. }
            | Self::ChatTitleUpdated { user_id, .. }
            | Self::UserConnected { user_id, .. }
            | Self::UserDisconnected { user_id, .. } => Some(user_id.as_str()),
            Self::NotDelivery { .. } => None,
        }
    }

    /// 事件来源连接，分发时对该连接抑制回声
    pub fn origin_connection(&self) -> Option<&str> {
        match self {
            Self::MessageNew { connection_id, .. }
            | Self::MessageRead { connection_id, .. }
            | Self::MessageDelivered { connection_id, .. }
            | Self::ParticipantAdded { connection_id, .. }
            | Self::ParticipantLeftChat { connection_id, .. }
            | Self::ParticipantStartTyping { connection_id, .. }
            | Self::ParticipantStopTyping { connection_id, .. }
            | Self::ChatTitleUpdated { connection_id, .. }
            | Self::UserDisconnected { connection_id, .. } => connection_id.as_deref(),
            Self::UserConnected { connection_id, .. } => Some(connection_id.as_str()),
            Self::NotDelivery { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn message_new_acting_user_is_author() {
        let event = ChatEvent::MessageNew {
            chat_id: "c1".into(),
            connection_id: Some("conn-1".into()),
            message: InstantMessage::text("u1", "hello", Utc::now()),
        };
        assert_eq!(event.acting_user(), Some("u1"));
        assert_eq!(event.chat_id(), Some("c1"));
        assert_eq!(event.origin_connection(), Some("conn-1"));
        assert_eq!(event.kind(), EventKind::MessageNew);
    }

    #[test]
    fn all_kinds_are_distinct() {
        use std::collections::HashSet;
        let kinds: HashSet<_> = EventKind::ALL.iter().collect();
        assert_eq!(kinds.len(), EventKind::ALL.len());
    }
}
