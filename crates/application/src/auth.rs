//! 操作者上下文
//!
//! 身份提取由传输层完成，这里只携带提取结果。

/// 当前操作者：用户 ID 加可选的来源连接 ID。
///
/// HTTP 这类无连接语义的传输没有连接 ID。
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    pub user_id: String,
    pub connection_id: Option<String>,
}

impl AuthContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            connection_id: None,
        }
    }

    pub fn with_connection(user_id: impl Into<String>, connection_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            connection_id: Some(connection_id.into()),
        }
    }
}
