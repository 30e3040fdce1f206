//! 把通知写进 JRPC 通道的客户端端点实现

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{ChatResult, InstantMessage, UserProfile};
use infrastructure::{ChannelWriter, RpcMessage};
use serde_json::{json, Value};
use tracing::debug;

use application::ClientEndpoint;

/// 通过共享的通道写句柄下发 camelCase 方法名的 JSON-RPC 通知
pub struct JrpcClientEndpoint {
    writer: ChannelWriter,
}

impl JrpcClientEndpoint {
    pub fn new(writer: ChannelWriter) -> Self {
        Self { writer }
    }

    async fn notify(&self, method: &str, params: Value) -> ChatResult<()> {
        debug!(method, "notify client");
        self.writer
            .send(&RpcMessage::notification(method, Some(params)))
            .await
    }
}

#[async_trait]
impl ClientEndpoint for JrpcClientEndpoint {
    async fn message_new(&self, chat_id: &str, message: &InstantMessage) -> ChatResult<()> {
        self.notify("messageNew", json!({ "chatId": chat_id, "message": message }))
            .await
    }

    async fn message_read(
        &self,
        chat_id: &str,
        user_id: &str,
        timestamp: DateTime<Utc>,
    ) -> ChatResult<()> {
        self.notify(
            "messageRead",
            json!({ "chatId": chat_id, "userId": user_id, "timestamp": timestamp }),
        )
        .await
    }

    async fn message_delivered(
        &self,
        chat_id: &str,
        user_id: &str,
        timestamp: DateTime<Utc>,
    ) -> ChatResult<()> {
        self.notify(
            "messageDelivered",
            json!({ "chatId": chat_id, "userId": user_id, "timestamp": timestamp }),
        )
        .await
    }

    async fn participant_added(
        &self,
        chat_id: &str,
        user_id: &str,
        participant_id: &str,
        profile: &UserProfile,
    ) -> ChatResult<()> {
        self.notify(
            "participantAdded",
            json!({
                "chatId": chat_id,
                "userId": user_id,
                "participant": { "id": participant_id, "profile": profile },
            }),
        )
        .await
    }

    async fn participant_left(&self, chat_id: &str, user_id: &str) -> ChatResult<()> {
        self.notify(
            "participantLeft",
            json!({ "chatId": chat_id, "userId": user_id }),
        )
        .await
    }

    async fn participant_start_typing(&self, chat_id: &str, user_id: &str) -> ChatResult<()> {
        self.notify(
            "participantStartTyping",
            json!({ "chatId": chat_id, "userId": user_id }),
        )
        .await
    }

    async fn participant_stop_typing(&self, chat_id: &str, user_id: &str) -> ChatResult<()> {
        self.notify(
            "participantStopTyping",
            json!({ "chatId": chat_id, "userId": user_id }),
        )
        .await
    }

    async fn chat_title_changed(
        &self,
        chat_id: &str,
        user_id: &str,
        title: &str,
    ) -> ChatResult<()> {
        self.notify(
            "chatTitleChanged",
            json!({ "chatId": chat_id, "userId": user_id, "title": title }),
        )
        .await
    }

    async fn user_connected(&self, user_id: &str) -> ChatResult<()> {
        self.notify("userConnected", json!({ "userId": user_id }))
            .await
    }

    async fn user_disconnected(&self, user_id: &str) -> ChatResult<()> {
        self.notify("userDisconnected", json!({ "userId": user_id }))
            .await
    }
}
