//! JRPC 双向通道
//!
//! 把一条持久连接变成双向的 RPC 消息流：单读者循环做分片重组和
//! 关闭握手，写路径用互斥锁串行，伴随活性检测和协作式取消。
//! 通道通过 FrameSource/FrameSink 与具体传输解耦。
//!
//! 连接级状态机：Open → (ReceivingClose | Cancelling | TimedOut) → Closed。
//! 只有 Open 允许新的写入，Closed 是终态。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{ChatError, ChatResult};
use tokio::sync::{Mutex, RwLock};
use tokio::time::{interval_at, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::wire::RpcMessage;

/// 关闭握手应答里的固定理由
pub const GOODBYE_REASON: &str = "goodbye, see you";

/// 传输层的一帧
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// 文本帧；`is_final` 为假时后续分片会继续到来
    Text { payload: String, is_final: bool },
    /// 对端发来的关闭帧
    Close { reason: Option<String> },
}

/// 通道的读侧传输端口
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// 下一帧；底层传输结束时返回 None
    async fn next_frame(&mut self) -> ChatResult<Option<Frame>>;
}

/// 通道的写侧传输端口
#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, payload: &str) -> ChatResult<()>;
    async fn send_close(&mut self, reason: &str) -> ChatResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Open,
    /// 收到对端关闭帧、尚未回应答
    ReceivingClose,
    /// 外部取消，正在尽力优雅关闭
    Cancelling,
    /// 活性超时，单方面判死
    TimedOut,
    Closed,
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// 写锁获取超时，超过即同步失败
    pub write_timeout: Duration,
    /// 关闭锁获取超时，超过则关闭退化为空操作
    pub shutdown_timeout: Duration,
    /// 距最后一次收到字节超过该时长即视连接已死
    pub dead_timeout: Duration,
    /// 活性检查周期
    pub liveness_check_interval: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_millis(200),
            dead_timeout: Duration::from_secs(90),
            liveness_check_interval: Duration::from_secs(3),
        }
    }
}

struct ChannelShared {
    sink: Mutex<Box<dyn FrameSink>>,
    state: RwLock<ChannelState>,
    last_received: RwLock<Instant>,
    config: ChannelConfig,
}

impl ChannelShared {
    async fn state(&self) -> ChannelState {
        *self.state.read().await
    }

    async fn set_state(&self, state: ChannelState) {
        *self.state.write().await = state;
    }
}

/// 通道的写句柄，可以克隆给通知下发方
#[derive(Clone)]
pub struct ChannelWriter {
    shared: Arc<ChannelShared>,
}

impl ChannelWriter {
    /// 串行写：同一时刻至多一个写者，后来者在锁上排队，
    /// 超时拿不到锁按同步失败上报
    pub async fn send(&self, message: &RpcMessage) -> ChatResult<()> {
        if self.shared.state().await != ChannelState::Open {
            return Err(ChatError::connection("channel is not open for writes"));
        }

        let mut sink = timeout(self.shared.config.write_timeout, self.shared.sink.lock())
            .await
            .map_err(|_| ChatError::connection("unable to acquire lock for write operation"))?;

        let text = message.encode()?;
        if let Err(err) = sink.send_text(&text).await {
            error!(error = %err, "error on write to socket");
            return Err(err);
        }
        Ok(())
    }

    /// 尽力而为的优雅关闭。只在 Open 或 ReceivingClose 状态下有意义；
    /// 短超时内拿不到锁就放弃，不重试。
    pub async fn shutdown(&self, reason: &str) -> ChatResult<()> {
        let state = self.shared.state().await;
        if !matches!(state, ChannelState::Open | ChannelState::ReceivingClose) {
            warn!(?state, "channel is not in a closable state, do nothing");
            return Ok(());
        }

        match timeout(self.shared.config.shutdown_timeout, self.shared.sink.lock()).await {
            Ok(mut sink) => {
                // 等锁期间状态可能已经变了，再确认一次
                let state = self.shared.state().await;
                if matches!(state, ChannelState::Open | ChannelState::ReceivingClose) {
                    sink.send_close(reason).await?;
                    self.shared.set_state(ChannelState::Closed).await;
                    info!(reason, "close frame sent");
                } else {
                    warn!(?state, "channel state changed while waiting, do nothing");
                }
            }
            Err(_) => {
                warn!("waiting for shutdown lock failed, do nothing");
            }
        }
        Ok(())
    }

    pub async fn state(&self) -> ChannelState {
        self.shared.state().await
    }
}

/// 双向 RPC 通道。读侧独占，写侧通过 [`ChannelWriter`] 共享。
pub struct JrpcChannel {
    source: Box<dyn FrameSource>,
    shared: Arc<ChannelShared>,
}

enum Step {
    Cancelled,
    LivenessTick,
    Inbound(ChatResult<Option<Frame>>),
}

impl JrpcChannel {
    pub fn new(
        source: Box<dyn FrameSource>,
        sink: Box<dyn FrameSink>,
        config: ChannelConfig,
    ) -> Self {
        let shared = Arc::new(ChannelShared {
            sink: Mutex::new(sink),
            state: RwLock::new(ChannelState::Open),
            last_received: RwLock::new(Instant::now()),
            config,
        });
        Self { source, shared }
    }

    pub fn writer(&self) -> ChannelWriter {
        ChannelWriter {
            shared: self.shared.clone(),
        }
    }

    pub async fn state(&self) -> ChannelState {
        self.shared.state().await
    }

    /// 读取下一条完整消息。
    ///
    /// 分片帧在这里重组；收到关闭帧先回一个固定理由的关闭应答再报告流结束；
    /// 活性超时静默判死（只记日志）；取消先做一次尽力关闭再把取消上抛。
    /// 返回 `Ok(None)` 表示不会再有消息。
    pub async fn recv(&mut self, cancel: &CancellationToken) -> ChatResult<Option<RpcMessage>> {
        if self.shared.state().await == ChannelState::Closed {
            return Ok(None);
        }

        let period = self.shared.config.liveness_check_interval;
        let mut liveness = interval_at(Instant::now() + period, period);
        let mut buffer: Option<String> = None;

        loop {
            let step = tokio::select! {
                _ = cancel.cancelled() => Step::Cancelled,
                _ = liveness.tick() => Step::LivenessTick,
                frame = self.source.next_frame() => Step::Inbound(frame),
            };

            match step {
                Step::Cancelled => return Err(self.cancelled_teardown().await),
                Step::LivenessTick => {
                    let elapsed = self.shared.last_received.read().await.elapsed();
                    if elapsed >= self.shared.config.dead_timeout {
                        warn!(
                            elapsed_ms = elapsed.as_millis() as u64,
                            "no bytes received within dead timeout, treat connection as dead"
                        );
                        self.shared.set_state(ChannelState::TimedOut).await;
                        self.shared.set_state(ChannelState::Closed).await;
                        return Ok(None);
                    }
                }
                Step::Inbound(Err(err)) => {
                    error!(error = %err, "read from transport failed");
                    self.shared.set_state(ChannelState::Closed).await;
                    return Err(err);
                }
                Step::Inbound(Ok(None)) => {
                    debug!("transport stream ended");
                    self.shared.set_state(ChannelState::Closed).await;
                    return Ok(None);
                }
                Step::Inbound(Ok(Some(Frame::Close { reason }))) => {
                    info!(
                        reason = reason.as_deref().unwrap_or("unknown"),
                        "close frame received, do graceful socket shutdown"
                    );
                    self.shared.set_state(ChannelState::ReceivingClose).await;
                    if let Err(err) = self.writer().shutdown(GOODBYE_REASON).await {
                        warn!(error = %err, "close acknowledgement failed");
                    }
                    self.shared.set_state(ChannelState::Closed).await;
                    return Ok(None);
                }
                Step::Inbound(Ok(Some(Frame::Text { payload, is_final }))) => {
                    *self.shared.last_received.write().await = Instant::now();
                    let assembled = match buffer.take() {
                        None => payload,
                        Some(mut acc) => {
                            acc.push_str(&payload);
                            acc
                        }
                    };
                    if is_final {
                        return Ok(Some(RpcMessage::decode(&assembled)?));
                    }
                    debug!(buffered = assembled.len(), "partial frame buffered");
                    buffer = Some(assembled);
                }
            }
        }
    }

    /// 取消路径：还开着就尽力发一个关闭帧，期间的错误吞掉，最后上抛取消
    async fn cancelled_teardown(&self) -> ChatError {
        info!("we are shutting down...");
        if self.shared.state().await == ChannelState::Open {
            self.shared.set_state(ChannelState::Cancelling).await;
            match timeout(
                self.shared.config.shutdown_timeout,
                self.shared.sink.lock(),
            )
            .await
            {
                Ok(mut sink) => {
                    if let Err(err) = sink.send_close("shutting down").await {
                        debug!(error = %err, "best-effort close failed, ignore");
                    }
                }
                Err(_) => warn!("shutdown lock not acquired during cancellation, skip close"),
            }
        }
        self.shared.set_state(ChannelState::Closed).await;
        ChatError::connection("listening cancelled")
    }
}
