//! WebSocket 端点
//!
//! 连接升级后：注册连接、广播上线、跑监听循环；循环退出后
//! 摘掉注册表条目并广播下线。身份提取留在这条边界上
//! （x-user-id / x-broadcast-group 头），认证机制本身由外部网关负责。

use std::sync::Arc;

use application::AuthContext;
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use domain::{ChatError, ChatEvent, ChatResult};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use infrastructure::{ChannelWriter, Frame, FrameSink, FrameSource, JrpcChannel};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::endpoint::JrpcClientEndpoint;
use crate::rpc::ChatRpcServer;
use crate::state::AppState;
use application::ConnectionInfo;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let Some(user_id) = header_value(&headers, "x-user-id") else {
        warn!("unauthenticated websocket request, return 401");
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let broadcast_group = header_value(&headers, "x-broadcast-group");

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id, broadcast_group))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    user_id: String,
    broadcast_group: Option<String>,
) {
    let connection_id = Uuid::new_v4().simple().to_string();
    info!(
        %connection_id,
        %user_id,
        broadcast_group = broadcast_group.as_deref().unwrap_or("-"),
        "incoming connection"
    );

    let (sink, stream) = socket.split();
    let mut channel = JrpcChannel::new(
        Box::new(WsFrameSource { inner: stream }),
        Box::new(WsFrameSink { inner: sink }),
        state.channel_config.clone(),
    );
    let writer = channel.writer();

    let client = Arc::new(JrpcClientEndpoint::new(writer.clone()));
    state
        .registry
        .add(ConnectionInfo::new(
            connection_id.clone(),
            user_id.clone(),
            broadcast_group.clone(),
            client,
        ))
        .await;

    // 上线广播不阻塞监听循环的启动
    {
        let bus = state.bus.clone();
        let event = ChatEvent::UserConnected {
            user_id: user_id.clone(),
            connection_id: connection_id.clone(),
            broadcast_group: broadcast_group.clone(),
        };
        tokio::spawn(async move { bus.publish(event).await });
    }

    let auth = AuthContext::with_connection(user_id.clone(), connection_id.clone());
    let rpc = ChatRpcServer::new(state.clone(), auth);
    listen(&mut channel, &rpc, &writer, &state).await;

    // 先摘条目再广播：分发器据此判断是否还有同用户的其它连接
    let removed = state.registry.delete(&connection_id).await;
    debug!(%connection_id, %user_id, "listening finished, send disconnect broadcast");
    state
        .bus
        .publish(ChatEvent::UserDisconnected {
            user_id,
            connection_id: removed.map(|c| c.id),
            broadcast_group,
        })
        .await;
}

/// 监听循环：收一条处理一条，应答通过共享写句柄串行写回
async fn listen(
    channel: &mut JrpcChannel,
    rpc: &ChatRpcServer,
    writer: &ChannelWriter,
    state: &AppState,
) {
    loop {
        match channel.recv(&state.shutdown).await {
            Ok(Some(message)) => {
                if let Some(response) = rpc.dispatch(message).await {
                    if let Err(err) = writer.send(&response).await {
                        warn!(error = %err, "response write failed, stop listening");
                        break;
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                debug!(error = %err, "listening stopped");
                break;
            }
        }
    }
}

struct WsFrameSource {
    inner: SplitStream<WebSocket>,
}

#[async_trait]
impl FrameSource for WsFrameSource {
    async fn next_frame(&mut self) -> ChatResult<Option<Frame>> {
        loop {
            match self.inner.next().await {
                None => return Ok(None),
                Some(Err(err)) => {
                    return Err(ChatError::connection(format!(
                        "websocket receive failed: {err}"
                    )))
                }
                // axum 在传输层已完成分片重组，这里的文本帧都是完整消息
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Frame::Text {
                        payload: text.as_str().to_string(),
                        is_final: true,
                    }))
                }
                Some(Ok(Message::Binary(_))) => {
                    return Err(ChatError::protocol("binary frames are not supported"))
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    return Ok(Some(Frame::Close {
                        reason: frame.map(|f| f.reason.as_str().to_string()),
                    }))
                }
            }
        }
    }
}

struct WsFrameSink {
    inner: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn send_text(&mut self, payload: &str) -> ChatResult<()> {
        self.inner
            .send(Message::Text(payload.to_string().into()))
            .await
            .map_err(|err| ChatError::connection(format!("websocket send failed: {err}")))
    }

    async fn send_close(&mut self, reason: &str) -> ChatResult<()> {
        self.inner
            .send(Message::Close(Some(CloseFrame {
                code: close_code::NORMAL,
                reason: reason.to_string().into(),
            })))
            .await
            .map_err(|err| ChatError::connection(format!("websocket close failed: {err}")))
    }
}
