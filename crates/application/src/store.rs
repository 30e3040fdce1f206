//! 会话存储端口
//!
//! 存储负责会话、参与者和消息的持久化，实现方可以是内存表，
//! 也可以是文档数据库。服务层只依赖这里的契约。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Chat, ChatResult, InstantMessage, Participant, UserProfile};

/// 会话列表的附加过滤条件
#[derive(Debug, Clone, Default)]
pub struct ChatFilter {
    pub title_equals: Option<String>,
}

impl ChatFilter {
    pub fn matches(&self, chat: &Chat) -> bool {
        match &self.title_equals {
            Some(title) => chat.title.as_deref() == Some(title.as_str()),
            None => true,
        }
    }
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// 用户作为活跃参与者的所有会话
    async fn get_user_chat_list(
        &self,
        user_id: &str,
        filter: Option<ChatFilter>,
    ) -> ChatResult<Vec<Chat>>;

    /// 按 ID 取会话，不存在返回 NotFound
    async fn get(&self, chat_id: &str) -> ChatResult<Chat>;

    /// 查找恰好由这两个用户组成的会话（无序对）
    async fn find_chat_with_participants(
        &self,
        user_id1: &str,
        user_id2: &str,
    ) -> ChatResult<Option<Chat>>;

    /// 创建会话并分配 ID，返回持久化后的副本
    async fn create(&self, chat: Chat) -> ChatResult<Chat>;

    /// 乐观并发追加消息。
    ///
    /// 仅当作者参与者的 `last_message_on` 仍早于消息时间戳（或为空）时生效；
    /// 条件不满足但作者在场时返回 Concurrency，会话或作者不在场时返回 NotFound。
    async fn add_message(&self, chat_id: &str, msg: &InstantMessage) -> ChatResult<()>;

    /// 推进已读水位，只允许单调前进
    async fn set_participant_read(
        &self,
        chat_id: &str,
        user_id: &str,
        timestamp: DateTime<Utc>,
    ) -> ChatResult<()>;

    /// 对用户所有有未读消息的会话推进已读水位，返回受影响的会话 ID
    async fn set_participant_read_all(
        &self,
        user_id: &str,
        timestamp: DateTime<Utc>,
    ) -> ChatResult<Vec<String>>;

    /// 推进送达水位，只允许单调前进
    async fn set_participant_delivered(
        &self,
        chat_id: &str,
        user_id: &str,
        timestamp: DateTime<Utc>,
    ) -> ChatResult<()>;

    async fn set_participant_left(
        &self,
        chat_id: &str,
        user_id: &str,
        has_left: bool,
    ) -> ChatResult<()>;

    /// 全局删除标记，作用于用户出现的所有会话
    async fn set_participant_deleted(&self, user_id: &str, is_deleted: bool) -> ChatResult<()>;

    /// 整体替换会话的参与者列表
    async fn set_participants(
        &self,
        chat_id: &str,
        participants: Vec<Participant>,
    ) -> ChatResult<()>;

    async fn get_participants(&self, chat_id: &str) -> ChatResult<Vec<Participant>>;

    async fn set_title(&self, chat_id: &str, title: &str) -> ChatResult<()>;

    /// 刷新用户在所有会话中的资料快照
    async fn update_profile(&self, user_id: &str, profile: &UserProfile) -> ChatResult<()>;

    /// 存储实现的描述信息，用于诊断
    async fn get_info(&self) -> ChatResult<String>;
}
