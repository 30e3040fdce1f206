//! 客户端通知端口
//!
//! 服务端可以在客户端上调用的单向方法，由具体传输实现，
//! 通知分发器按连接逐个调用。全部 fire-and-forget 语义。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{ChatResult, InstantMessage, UserProfile};

#[async_trait]
pub trait ClientEndpoint: Send + Sync {
    /// 会话里出现新消息
    async fn message_new(&self, chat_id: &str, message: &InstantMessage) -> ChatResult<()>;

    /// 某参与者读到了 timestamp 水位
    async fn message_read(
        &self,
        chat_id: &str,
        user_id: &str,
        timestamp: DateTime<Utc>,
    ) -> ChatResult<()>;

    /// 某参与者收到了 timestamp 水位之前的消息
    async fn message_delivered(
        &self,
        chat_id: &str,
        user_id: &str,
        timestamp: DateTime<Utc>,
    ) -> ChatResult<()>;

    /// user_id 把 participant_id 加进了会话
    async fn participant_added(
        &self,
        chat_id: &str,
        user_id: &str,
        participant_id: &str,
        profile: &UserProfile,
    ) -> ChatResult<()>;

    async fn participant_left(&self, chat_id: &str, user_id: &str) -> ChatResult<()>;

    async fn participant_start_typing(&self, chat_id: &str, user_id: &str) -> ChatResult<()>;

    async fn participant_stop_typing(&self, chat_id: &str, user_id: &str) -> ChatResult<()>;

    async fn chat_title_changed(
        &self,
        chat_id: &str,
        user_id: &str,
        title: &str,
    ) -> ChatResult<()>;

    /// 广播组内有用户上线
    async fn user_connected(&self, user_id: &str) -> ChatResult<()>;

    /// 广播组内有用户下线（最后一个连接断开时才广播）
    async fn user_disconnected(&self, user_id: &str) -> ChatResult<()>;
}

/// 丢弃所有通知的空实现
#[derive(Debug, Default)]
pub struct NullClientEndpoint;

#[async_trait]
impl ClientEndpoint for NullClientEndpoint {
    async fn message_new(&self, _chat_id: &str, _message: &InstantMessage) -> ChatResult<()> {
        Ok(())
    }

    async fn message_read(
        &self,
        _chat_id: &str,
        _user_id: &str,
        _timestamp: DateTime<Utc>,
    ) -> ChatResult<()> {
        Ok(())
    }

    async fn message_delivered(
        &self,
        _chat_id: &str,
        _user_id: &str,
        _timestamp: DateTime<Utc>,
    ) -> ChatResult<()> {
        Ok(())
    }

    async fn participant_added(
        &self,
        _chat_id: &str,
        _user_id: &str,
        _participant_id: &str,
        _profile: &UserProfile,
    ) -> ChatResult<()> {
        Ok(())
    }

    async fn participant_left(&self, _chat_id: &str, _user_id: &str) -> ChatResult<()> {
        Ok(())
    }

    async fn participant_start_typing(&self, _chat_id: &str, _user_id: &str) -> ChatResult<()> {
        Ok(())
    }

    async fn participant_stop_typing(&self, _chat_id: &str, _user_id: &str) -> ChatResult<()> {
        Ok(())
    }

    async fn chat_title_changed(
        &self,
        _chat_id: &str,
        _user_id: &str,
        _title: &str,
    ) -> ChatResult<()> {
        Ok(())
    }

    async fn user_connected(&self, _user_id: &str) -> ChatResult<()> {
        Ok(())
    }

    async fn user_disconnected(&self, _user_id: &str) -> ChatResult<()> {
        Ok(())
    }
}
