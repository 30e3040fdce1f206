//! 通知分发处理器
//!
//! 订阅领域事件，解析应当被告知的在线连接并逐个推送通知。
//! 会话范围事件推给活跃参与者的全部连接（来源连接除外）；
//! 上线/下线事件按广播组推送，下线只在用户最后一个连接关闭时广播。

use std::sync::Arc;

use async_trait::async_trait;
use domain::{ChatEvent, ChatResult, Participant};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, EventHandler};
use crate::presence::{ConnectionInfo, ConnectionRegistry};
use crate::store::ChatStore;

pub struct NotificationFanout {
    store: Arc<dyn ChatStore>,
    registry: Arc<ConnectionRegistry>,
    bus: Arc<EventBus>,
}

impl NotificationFanout {
    pub fn new(
        store: Arc<dyn ChatStore>,
        registry: Arc<ConnectionRegistry>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            registry,
            bus,
        }
    }

    async fn handle_chat_scoped(&self, event: &ChatEvent) -> ChatResult<()> {
        let Some(chat_id) = event.chat_id() else {
            return Ok(());
        };

        let participants = self.store.get_participants(chat_id).await?;
        let active: Vec<&Participant> = participants.iter().filter(|p| p.is_active()).collect();
        let origin = event.origin_connection();

        let recipients: Vec<ConnectionInfo> = self
            .registry
            .list_all()
            .await
            .into_iter()
            .filter(|c| active.iter().any(|p| p.id == c.user_id))
            .filter(|c| origin != Some(c.id.as_str()))
            .collect();

        debug!(
            event = event.kind().as_str(),
            %chat_id,
            participant_count = participants.len(),
            connection_count = recipients.len(),
            "fan out chat event"
        );

        // 并发推送；单个接收端失败不影响其它接收端
        join_all(recipients.iter().map(|c| self.push(c, event))).await;

        // 无在线连接的活跃参与者走无法投递回退，留给离线推送集成消费
        if let ChatEvent::MessageNew { message, .. } = event {
            for participant in &active {
                if participant.id == message.author {
                    continue;
                }
                if recipients.iter().any(|c| c.user_id == participant.id) {
                    continue;
                }
                self.bus
                    .publish(ChatEvent::NotDelivery {
                        event: Box::new(event.clone()),
                        addressee: participant.id.clone(),
                    })
                    .await;
            }
        }

        Ok(())
    }

    async fn handle_user_connected(&self, user_id: &str, broadcast_group: Option<&str>) {
        let Some(group) = broadcast_group else {
            return;
        };

        let peers: Vec<ConnectionInfo> = self
            .registry
            .list_all()
            .await
            .into_iter()
            .filter(|c| c.user_id != user_id && c.broadcast_group.as_deref() == Some(group))
            .collect();

        join_all(peers.iter().map(|peer| async move {
            if let Err(err) = peer.client.user_connected(user_id).await {
                warn!(
                    connection_id = %peer.id,
                    user_id = %peer.user_id,
                    error = %err,
                    "user connected push failed"
                );
            }
        }))
        .await;
    }

    async fn handle_user_disconnected(
        &self,
        user_id: &str,
        connection_id: Option<&str>,
        broadcast_group: Option<&str>,
    ) {
        if connection_id.is_none() {
            warn!(%user_id, "unable to broadcast the disconnect, connection not found in registry");
            return;
        }

        let connections = self.registry.list_all().await;
        if connections.iter().any(|c| c.user_id == user_id) {
            debug!(%user_id, "user still online with another connection, skip broadcast");
            return;
        }

        let Some(group) = broadcast_group else {
            debug!(%user_id, "user has no broadcast group, none notified");
            return;
        };

        info!(broadcast_group = %group, %user_id, "notify group about the disconnect");
        let peers: Vec<&ConnectionInfo> = connections
            .iter()
            .filter(|c| c.user_id != user_id && c.broadcast_group.as_deref() == Some(group))
            .collect();

        join_all(peers.iter().map(|peer| async move {
            if let Err(err) = peer.client.user_disconnected(user_id).await {
                warn!(
                    connection_id = %peer.id,
                    user_id = %peer.user_id,
                    error = %err,
                    "user disconnected push failed"
                );
            }
        }))
        .await;
    }

    /// 按事件类别调用接收端对应的通知方法，失败只记录
    async fn push(&self, conn: &ConnectionInfo, event: &ChatEvent) {
        let result = match event {
            ChatEvent::MessageNew {
                chat_id, message, ..
            } => conn.client.message_new(chat_id, message).await,
            ChatEvent::MessageRead {
                chat_id,
                user_id,
                timestamp,
                ..
            } => conn.client.message_read(chat_id, user_id, *timestamp).await,
            ChatEvent::MessageDelivered {
                chat_id,
                user_id,
                timestamp,
                ..
            } => {
                conn.client
                    .message_delivered(chat_id, user_id, *timestamp)
                    .await
            }
            ChatEvent::ParticipantAdded {
                chat_id,
                user_id,
                participant,
                ..
            } => {
                conn.client
                    .participant_added(chat_id, user_id, &participant.id, &participant.profile)
                    .await
            }
            ChatEvent::ParticipantLeftChat {
                chat_id, user_id, ..
            } => conn.client.participant_left(chat_id, user_id).await,
            ChatEvent::ParticipantStartTyping {
                chat_id, user_id, ..
            } => conn.client.participant_start_typing(chat_id, user_id).await,
            ChatEvent::ParticipantStopTyping {
                chat_id, user_id, ..
            } => conn.client.participant_stop_typing(chat_id, user_id).await,
            ChatEvent::ChatTitleUpdated {
                chat_id,
                user_id,
                title,
                ..
            } => {
                conn.client
                    .chat_title_changed(chat_id, user_id, title)
                    .await
            }
            _ => Ok(()),
        };

        if let Err(err) = result {
            warn!(
                connection_id = %conn.id,
                user_id = %conn.user_id,
                event = event.kind().as_str(),
                error = %err,
                "notification push failed"
            );
        }
    }
}

#[async_trait]
impl EventHandler for NotificationFanout {
    fn name(&self) -> &'static str {
        "notification-fanout"
    }

    async fn handle(&self, event: &ChatEvent) -> ChatResult<()> {
        match event {
            ChatEvent::UserConnected {
                user_id,
                broadcast_group,
                ..
            } => {
                self.handle_user_connected(user_id, broadcast_group.as_deref())
                    .await;
                Ok(())
            }
            ChatEvent::UserDisconnected {
                user_id,
                connection_id,
                broadcast_group,
            } => {
                self.handle_user_disconnected(
                    user_id,
                    connection_id.as_deref(),
                    broadcast_group.as_deref(),
                )
                .await;
                Ok(())
            }
            ChatEvent::NotDelivery { .. } => Ok(()),
            _ => self.handle_chat_scoped(event).await,
        }
    }
}
