use std::sync::Arc;

use application::{ChatService, ConnectionRegistry, EventBus};
use infrastructure::ChannelConfig;
use tokio_util::sync::CancellationToken;

/// 传输层共享状态
#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    pub registry: Arc<ConnectionRegistry>,
    pub bus: Arc<EventBus>,
    pub channel_config: ChannelConfig,
    /// 进程级关停信号，所有监听循环协作退出
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        chat_service: Arc<ChatService>,
        registry: Arc<ConnectionRegistry>,
        bus: Arc<EventBus>,
        channel_config: ChannelConfig,
    ) -> Self {
        Self {
            chat_service,
            registry,
            bus,
            channel_config,
            shutdown: CancellationToken::new(),
        }
    }
}
