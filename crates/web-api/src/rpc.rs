//! RPC 请求分发
//!
//! 按方法名把通道上的请求分发到聊天服务。业务错误在这里折叠成
//! 对外的不透明错误负载，不把内部细节漏到线上。

use std::collections::HashSet;

use application::{AuthContext, ChatFilter};
use chrono::Utc;
use domain::ChatError;
use infrastructure::{RpcError, RpcMessage};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::dto::{
    AddParticipantsParams, ChangeTitleParams, ChatIdParams, ChatSummary, GetChatParams,
    GetMessagesParams, GetUserStatusParams, MarkAllParams, MarkParams, PingResponse,
    SendMessageParams, StartChatParams, UserStatus,
};
use crate::state::AppState;

/// 一条连接对应一个 RPC 服务端实例，身份在连接建立时固定
pub struct ChatRpcServer {
    state: AppState,
    auth: AuthContext,
}

impl ChatRpcServer {
    pub fn new(state: AppState, auth: AuthContext) -> Self {
        Self { state, auth }
    }

    /// 处理一条入站消息。请求产生应答，通知没有回应，
    /// 游离的应答消息直接忽略。
    pub async fn dispatch(&self, message: RpcMessage) -> Option<RpcMessage> {
        match message {
            RpcMessage::Request {
                id, method, params, ..
            } => {
                info!(method = %method, user_id = %self.auth.user_id, "rpc request");
                Some(match self.call(&method, params).await {
                    Ok(result) => RpcMessage::result(id, result),
                    Err(failure) => RpcMessage::error(id, failure),
                })
            }
            RpcMessage::Notification { method, params, .. } => {
                if let Err(failure) = self.call(&method, params).await {
                    warn!(method = %method, code = failure.code, "notification handling failed");
                }
                None
            }
            RpcMessage::Response { .. } => {
                debug!("stray response message ignored");
                None
            }
        }
    }

    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        match method {
            "Ping" => self.ping().await,
            "SendMessage" => {
                let p: SendMessageParams = parse(params)?;
                let stamped = self
                    .state
                    .chat_service
                    .send_message(&self.auth, &p.chat_id, p.message)
                    .await
                    .map_err(opaque)?;
                to_result(stamped)
            }
            "GetContactsOnline" => self.get_contacts_online().await,
            "GetUserStatus" => {
                let p: GetUserStatusParams = parse(params)?;
                let online = self.online_users().await;
                let statuses: Vec<UserStatus> = p
                    .ids
                    .into_iter()
                    .map(|user_id| UserStatus {
                        is_online: online.contains(&user_id),
                        user_id,
                    })
                    .collect();
                to_result(statuses)
            }
            "StartChat" => {
                let p: StartChatParams = parse(params)?;
                let chat = self
                    .state
                    .chat_service
                    .start_chat(&self.auth, p.chat)
                    .await
                    .map_err(opaque)?;
                let online = self.online_users().await;
                to_result(ChatSummary::build(&chat, &self.auth.user_id, &online))
            }
            "GetChats" => {
                let chats = self
                    .state
                    .chat_service
                    .get_chats(&self.auth, None::<ChatFilter>)
                    .await
                    .map_err(opaque)?;
                let online = self.online_users().await;
                let summaries: Vec<ChatSummary> = chats
                    .iter()
                    .map(|c| ChatSummary::build(c, &self.auth.user_id, &online))
                    .collect();
                to_result(summaries)
            }
            "GetChat" => {
                let p: GetChatParams = parse(params)?;
                let chat = self
                    .state
                    .chat_service
                    .get_chat(&self.auth, &p.id)
                    .await
                    .map_err(opaque)?;
                let online = self.online_users().await;
                to_result(ChatSummary::build(&chat, &self.auth.user_id, &online))
            }
            "GetMessages" => {
                let p: GetMessagesParams = parse(params)?;
                let (from, to, count) = p.resolve();
                let messages = self
                    .state
                    .chat_service
                    .get_message_history(&self.auth, &p.chat_id, from, to, count, p.move_backward)
                    .await
                    .map_err(opaque)?;
                to_result(messages)
            }
            "ChangeTitle" => {
                let p: ChangeTitleParams = parse(params)?;
                self.state
                    .chat_service
                    .change_title(&self.auth, &p.chat_id, &p.title)
                    .await
                    .map_err(opaque)?;
                Ok(Value::Null)
            }
            "LeaveChat" => {
                let p: ChatIdParams = parse(params)?;
                self.state
                    .chat_service
                    .leave_chat(&self.auth, &p.chat_id)
                    .await
                    .map_err(opaque)?;
                Ok(Value::Null)
            }
            "Read" => {
                let p: MarkParams = parse(params)?;
                let stamped = self
                    .state
                    .chat_service
                    .mark_read(&self.auth, &p.chat_id, p.timestamp)
                    .await
                    .map_err(opaque)?;
                to_result(stamped)
            }
            "ReadAll" => {
                let p: MarkAllParams = parse(params)?;
                let stamped = self
                    .state
                    .chat_service
                    .mark_read_bulk(&self.auth, p.timestamp)
                    .await
                    .map_err(opaque)?;
                to_result(stamped)
            }
            "Received" => {
                let p: MarkParams = parse(params)?;
                let stamped = self
                    .state
                    .chat_service
                    .mark_delivered(&self.auth, &p.chat_id, p.timestamp)
                    .await
                    .map_err(opaque)?;
                to_result(stamped)
            }
            "AddParticipants" => {
                let p: AddParticipantsParams = parse(params)?;
                self.state
                    .chat_service
                    .add_participants(&self.auth, &p.chat_id, &p.ids)
                    .await
                    .map_err(opaque)?;
                Ok(Value::Null)
            }
            "StartTyping" => {
                let p: ChatIdParams = parse(params)?;
                self.state
                    .chat_service
                    .participant_start_typing(&self.auth, &p.chat_id)
                    .await;
                Ok(Value::Null)
            }
            "StopTyping" => {
                let p: ChatIdParams = parse(params)?;
                self.state
                    .chat_service
                    .participant_stop_typing(&self.auth, &p.chat_id)
                    .await;
                Ok(Value::Null)
            }
            other => {
                warn!(method = other, "unknown rpc method");
                Err(RpcError::method_not_found(other))
            }
        }
    }

    async fn ping(&self) -> Result<Value, RpcError> {
        let storage = self
            .state
            .chat_service
            .storage_info()
            .await
            .map_err(opaque)?;
        to_result(PingResponse {
            service: format!("instachat {}", env!("CARGO_PKG_VERSION")),
            storage,
            user_id: self.auth.user_id.clone(),
            timestamp: Utc::now(),
        })
    }

    /// 同一广播组里除自己外的在线用户，按用户去重
    async fn get_contacts_online(&self) -> Result<Value, RpcError> {
        let me = match &self.auth.connection_id {
            Some(connection_id) => self.state.registry.get(connection_id).await,
            None => None,
        };
        let Some(me) = me else {
            return to_result(Vec::<String>::new());
        };

        let mut seen = HashSet::new();
        let contacts: Vec<String> = self
            .state
            .registry
            .list_all()
            .await
            .into_iter()
            .filter(|c| c.user_id != me.user_id)
            .filter(|c| c.broadcast_group == me.broadcast_group)
            .filter(|c| seen.insert(c.user_id.clone()))
            .map(|c| c.user_id)
            .collect();
        to_result(contacts)
    }

    async fn online_users(&self) -> HashSet<String> {
        self.state
            .registry
            .list_all()
            .await
            .into_iter()
            .map(|c| c.user_id)
            .collect()
    }
}

fn parse<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    let params = params.ok_or_else(|| RpcError::invalid_params("params are required"))?;
    serde_json::from_value(params).map_err(|err| RpcError::invalid_params(err.to_string()))
}

fn to_result<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|err| {
        error!(error = %err, "result serialization failed");
        RpcError::opaque(&ChatError::protocol("result serialization failed"))
    })
}

fn opaque(err: ChatError) -> RpcError {
    error!(error = %err, kind = err.kind(), "chat operation failed");
    RpcError::opaque(&err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use application::{
        profile::StaticProfileProvider, AllowAll, ChatService, ChatServiceDependencies,
        ConnectionInfo, ConnectionRegistry, EventBus, NullClientEndpoint, SystemClock,
    };
    use infrastructure::{
        wire::{GENERIC_ERROR_CODE, INVALID_PARAMS_CODE, METHOD_NOT_FOUND_CODE},
        ChannelConfig, InMemoryChatStore,
    };
    use serde_json::json;
    use std::sync::Arc;

    fn test_state() -> AppState {
        let store = Arc::new(InMemoryChatStore::new());
        let bus = Arc::new(EventBus::new());
        let service = Arc::new(ChatService::new(ChatServiceDependencies {
            store,
            security: Arc::new(AllowAll),
            profiles: Arc::new(StaticProfileProvider),
            clock: Arc::new(SystemClock),
            bus: bus.clone(),
        }));
        AppState::new(
            service,
            Arc::new(ConnectionRegistry::new()),
            bus,
            ChannelConfig::default(),
        )
    }

    fn server(state: &AppState, user_id: &str, connection_id: &str) -> ChatRpcServer {
        ChatRpcServer::new(
            state.clone(),
            AuthContext::with_connection(user_id, connection_id),
        )
    }

    async fn expect_result(server: &ChatRpcServer, method: &str, params: Value) -> Value {
        let request = RpcMessage::request(json!(1), method, Some(params));
        match server.dispatch(request).await {
            Some(RpcMessage::Response {
                result: Some(result),
                error: None,
                ..
            }) => result,
            other => panic!("expected result, got {other:?}"),
        }
    }

    async fn expect_error(server: &ChatRpcServer, method: &str, params: Option<Value>) -> RpcError {
        let request = RpcMessage::request(json!(1), method, params);
        match server.dispatch(request).await {
            Some(RpcMessage::Response {
                result: None,
                error: Some(error),
                ..
            }) => error,
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ping_reports_service_and_storage() {
        let state = test_state();
        let server = server(&state, "u1", "conn-1");
        let result = expect_result(&server, "Ping", json!({})).await;
        assert!(result["service"]
            .as_str()
            .expect("service string")
            .starts_with("instachat"));
        assert!(result["storage"].as_str().expect("storage").contains("in-memory"));
        assert_eq!(result["userId"], json!("u1"));
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let state = test_state();
        let server = server(&state, "u1", "conn-1");
        let error = expect_error(&server, "Bogus", Some(json!({}))).await;
        assert_eq!(error.code, METHOD_NOT_FOUND_CODE);
    }

    #[tokio::test]
    async fn missing_params_are_invalid() {
        let state = test_state();
        let server = server(&state, "u1", "conn-1");
        let error = expect_error(&server, "SendMessage", None).await;
        assert_eq!(error.code, INVALID_PARAMS_CODE);
    }

    #[tokio::test]
    async fn business_errors_become_opaque_payloads() {
        let state = test_state();
        let server = server(&state, "u1", "conn-1");
        let error = expect_error(
            &server,
            "SendMessage",
            Some(json!({ "chatId": "missing", "message": { "timestamp": Utc::now(), "message": "hi" } })),
        )
        .await;
        assert_eq!(error.code, GENERIC_ERROR_CODE);
        assert_eq!(error.data, Some(json!({ "kind": "not_found" })));
        assert!(!error.message.contains("missing"));
    }

    #[tokio::test]
    async fn start_chat_then_messaging_roundtrip() {
        let state = test_state();
        let alice = server(&state, "alice", "conn-1");
        let bob = server(&state, "bob", "conn-2");

        let summary = expect_result(
            &alice,
            "StartChat",
            json!({ "chat": { "participants": [ { "id": "bob" } ] } }),
        )
        .await;
        let chat_id = summary["id"].as_str().expect("chat id").to_string();
        assert_eq!(summary["participants"].as_array().map(Vec::len), Some(2));

        expect_result(
            &alice,
            "SendMessage",
            json!({ "chatId": chat_id, "message": { "timestamp": Utc::now(), "message": "hi bob" } }),
        )
        .await;

        let chats = expect_result(&bob, "GetChats", json!({})).await;
        let listed = chats.as_array().expect("chat list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["lastMessage"]["message"], json!("hi bob"));
        assert_eq!(listed[0]["messageCount"], json!(1));

        let messages = expect_result(
            &bob,
            "GetMessages",
            json!({ "chatId": chat_id, "moveBackward": true }),
        )
        .await;
        assert_eq!(messages.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn user_status_reflects_registry() {
        let state = test_state();
        state
            .registry
            .add(ConnectionInfo::new(
                "conn-2",
                "bob",
                None,
                Arc::new(NullClientEndpoint),
            ))
            .await;

        let server = server(&state, "alice", "conn-1");
        let statuses = expect_result(
            &server,
            "GetUserStatus",
            json!({ "ids": ["bob", "carol"] }),
        )
        .await;
        assert_eq!(
            statuses,
            json!([
                { "userId": "bob", "isOnline": true },
                { "userId": "carol", "isOnline": false },
            ])
        );
    }

    #[tokio::test]
    async fn contacts_online_is_scoped_to_broadcast_group() {
        let state = test_state();
        for (conn, user, group) in [
            ("conn-1", "alice", Some("office")),
            ("conn-2", "bob", Some("office")),
            ("conn-3", "bob", Some("office")),
            ("conn-4", "carol", Some("lab")),
            ("conn-5", "dave", None),
        ] {
            state
                .registry
                .add(ConnectionInfo::new(
                    conn,
                    user,
                    group.map(str::to_string),
                    Arc::new(NullClientEndpoint),
                ))
                .await;
        }

        let server = server(&state, "alice", "conn-1");
        let contacts = expect_result(&server, "GetContactsOnline", json!({})).await;
        assert_eq!(contacts, json!(["bob"]));
    }

    #[tokio::test]
    async fn notifications_produce_no_response() {
        let state = test_state();
        let server = server(&state, "u1", "conn-1");
        let note = RpcMessage::notification("StartTyping", Some(json!({ "chatId": "c1" })));
        assert!(server.dispatch(note).await.is_none());
    }
}
