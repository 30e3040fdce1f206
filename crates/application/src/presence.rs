//! 连接注册表
//!
//! 进程内唯一记录"谁在线、以哪个用户身份、属于哪个广播组"的地方。
//! 同一用户可以有多个并存连接（多设备）。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::endpoint::ClientEndpoint;

/// 在线连接条目
///
/// 创建后不可变；生命周期与传输连接一致，只被注册表持有。
#[derive(Clone)]
pub struct ConnectionInfo {
    pub id: String,
    pub user_id: String,
    /// 广播组为空表示该连接不参与上线/下线广播
    pub broadcast_group: Option<String>,
    /// 通知下发通道
    pub client: Arc<dyn ClientEndpoint>,
}

impl ConnectionInfo {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        broadcast_group: Option<String>,
        client: Arc<dyn ClientEndpoint>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            broadcast_group,
            client,
        }
    }
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("broadcast_group", &self.broadcast_group)
            .finish()
    }
}

/// 连接 ID → 连接条目的并发映射
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, ConnectionInfo>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入或替换。重复的连接 ID 以后写为准，并记一条告警。
    pub async fn add(&self, info: ConnectionInfo) {
        let mut connections = self.connections.write().await;
        if let Some(existing) = connections.insert(info.id.clone(), info.clone()) {
            warn!(
                connection_id = %existing.id,
                old_user = %existing.user_id,
                new_user = %info.user_id,
                "existing connection replaced"
            );
        } else {
            debug!(
                connection_id = %info.id,
                user_id = %info.user_id,
                broadcast_group = info.broadcast_group.as_deref().unwrap_or("-"),
                "connection added"
            );
        }
    }

    pub async fn delete(&self, connection_id: &str) -> Option<ConnectionInfo> {
        let removed = self.connections.write().await.remove(connection_id);
        match &removed {
            Some(info) => debug!(
                connection_id = %info.id,
                user_id = %info.user_id,
                "connection dropped"
            ),
            None => debug!(connection_id, "no connection found to drop"),
        }
        removed
    }

    pub async fn get(&self, connection_id: &str) -> Option<ConnectionInfo> {
        self.connections.read().await.get(connection_id).cloned()
    }

    /// 当前所有连接的时点快照，可在并发变更下安全遍历，无顺序保证
    pub async fn list_all(&self) -> Vec<ConnectionInfo> {
        self.connections.read().await.values().cloned().collect()
    }

    /// 用户是否还有任何在线连接
    pub async fn is_user_online(&self, user_id: &str) -> bool {
        self.connections
            .read()
            .await
            .values()
            .any(|c| c.user_id == user_id)
    }
}
