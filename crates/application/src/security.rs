//! 安全策略端口
//!
//! 每个聊天操作执行前都会征询安全策略，策略拒绝时返回 Authorization 错误。
//! 策略的具体实现（ACL、租户隔离等）由集成方提供。

use async_trait::async_trait;
use domain::{Chat, ChatResult, InstantMessage};

use crate::auth::AuthContext;

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SecurityPolicy: Send + Sync {
    /// 是否允许创建会话
    async fn try_start(&self, actor: &AuthContext, chat: &Chat) -> ChatResult<()>;

    /// 是否允许读取会话（标题、参与者、全部消息）
    async fn try_read(&self, actor: &AuthContext, chat_id: &str, chat: &Chat) -> ChatResult<()>;

    /// 是否允许向会话发消息
    async fn try_send_message(
        &self,
        actor: &AuthContext,
        chat_id: &str,
        msg: &InstantMessage,
        chat: &Chat,
    ) -> ChatResult<()>;

    /// 是否允许添加新参与者（或请回已退出的参与者）
    async fn try_add_participant(
        &self,
        actor: &AuthContext,
        chat_id: &str,
        participant_id: &str,
        chat: &Chat,
    ) -> ChatResult<()>;
}

/// 放行一切操作的策略，适用于内网部署和测试
#[derive(Debug, Default)]
pub struct AllowAll;

#[async_trait]
impl SecurityPolicy for AllowAll {
    async fn try_start(&self, _actor: &AuthContext, _chat: &Chat) -> ChatResult<()> {
        Ok(())
    }

    async fn try_read(&self, _actor: &AuthContext, _chat_id: &str, _chat: &Chat) -> ChatResult<()> {
        Ok(())
    }

    async fn try_send_message(
        &self,
        _actor: &AuthContext,
        _chat_id: &str,
        _msg: &InstantMessage,
        _chat: &Chat,
    ) -> ChatResult<()> {
        Ok(())
    }

    async fn try_add_participant(
        &self,
        _actor: &AuthContext,
        _chat_id: &str,
        _participant_id: &str,
        _chat: &Chat,
    ) -> ChatResult<()> {
        Ok(())
    }
}
