//! 用户资料快照

use serde::{Deserialize, Serialize};

/// 用户资料快照
///
/// 会话中每个参与者持有一份加入时解析的资料副本，
/// 由外部的资料提供方负责刷新。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    /// 业务方自定义扩展字段
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// 资料提供方的解析结果：资料快照 + 全局删除标记
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedUser {
    pub id: String,
    pub profile: UserProfile,
    pub is_deleted: bool,
}

impl ResolvedUser {
    pub fn active(id: impl Into<String>, profile: UserProfile) -> Self {
        Self {
            id: id.into(),
            profile,
            is_deleted: false,
        }
    }
}
