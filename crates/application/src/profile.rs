//! 用户资料提供方端口

use async_trait::async_trait;
use domain::{ChatResult, ResolvedUser, UserProfile};

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    /// 解析用户资料快照和全局删除标记
    async fn get(&self, user_id: &str) -> ChatResult<ResolvedUser>;
}

/// 以用户 ID 作昵称的兜底实现，没有接入真实用户系统时使用
#[derive(Debug, Default)]
pub struct StaticProfileProvider;

#[async_trait]
impl ProfileProvider for StaticProfileProvider {
    async fn get(&self, user_id: &str) -> ChatResult<ResolvedUser> {
        Ok(ResolvedUser::active(
            user_id,
            UserProfile {
                nickname: Some(user_id.to_string()),
                ..UserProfile::default()
            },
        ))
    }
}
