//! 主程序入口
//!
//! 装配内存存储、聊天服务、事件总线和通知分发，启动 WebSocket 服务。

use std::sync::Arc;
use std::time::Duration;

use application::{
    profile::StaticProfileProvider, AllowAll, ChatService, ChatServiceDependencies,
    ConnectionRegistry, EventBus, NotificationFanout, SystemClock,
};
use config::AppConfig;
use domain::EventKind;
use infrastructure::{ChannelConfig, InMemoryChatStore};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load()?;

    let store = Arc::new(InMemoryChatStore::new());
    let registry = Arc::new(ConnectionRegistry::new());
    let bus = Arc::new(EventBus::new());

    // 通知分发订阅除 NotDelivery 之外的所有事件；
    // NotDelivery 是离线推送集成的挂载点，这里没有消费者
    let fanout = Arc::new(NotificationFanout::new(
        store.clone(),
        registry.clone(),
        bus.clone(),
    ));
    let fanout_kinds: Vec<EventKind> = EventKind::ALL
        .into_iter()
        .filter(|kind| *kind != EventKind::NotDelivery)
        .collect();
    bus.subscribe(&fanout_kinds, fanout).await;

    let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
        store,
        security: Arc::new(AllowAll),
        profiles: Arc::new(StaticProfileProvider),
        clock: Arc::new(SystemClock),
        bus: bus.clone(),
    }));

    let channel_config = ChannelConfig {
        write_timeout: Duration::from_millis(config.channel.write_timeout_ms),
        shutdown_timeout: Duration::from_millis(config.channel.shutdown_timeout_ms),
        dead_timeout: Duration::from_secs(config.channel.dead_timeout_secs),
        liveness_check_interval: Duration::from_secs(config.channel.liveness_check_secs),
    };

    let state = AppState::new(chat_service, registry, bus, channel_config);
    let shutdown = state.shutdown.clone();

    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "instachat server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %err, "shutdown signal listener failed");
            }
            tracing::info!("shutdown signal received, cancel all listen loops");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
