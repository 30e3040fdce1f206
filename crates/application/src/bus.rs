//! 事件总线
//!
//! 显式注册表：事件类别 → 处理器有序列表，装配阶段填充，发布阶段只读。
//! 投递是尽力而为的：处理器失败被记录并吞掉，不影响其它处理器。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{ChatEvent, ChatResult, EventKind};
use tokio::sync::RwLock;
use tracing::{error, warn};

#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 处理器名称，只用于日志
    fn name(&self) -> &'static str {
        "handler"
    }

    async fn handle(&self, event: &ChatEvent) -> ChatResult<()>;
}

/// 类型化的发布/订阅分发器
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<Arc<dyn EventHandler>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为一组事件类别注册处理器，应只在装配阶段调用
    pub async fn subscribe(&self, kinds: &[EventKind], handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        for kind in kinds {
            handlers.entry(*kind).or_default().push(handler.clone());
        }
    }

    /// 分发事件到该类别的所有处理器。
    ///
    /// 无处理器不是错误，但要可观测；处理器失败被隔离。
    pub async fn publish(&self, event: ChatEvent) {
        let kind = event.kind();
        let matched = {
            let handlers = self.handlers.read().await;
            handlers.get(&kind).cloned().unwrap_or_default()
        };

        if matched.is_empty() {
            warn!(event = kind.as_str(), "no handler registered for event");
            return;
        }

        for handler in matched {
            if let Err(err) = handler.handle(&event).await {
                error!(
                    event = kind.as_str(),
                    handler = handler.name(),
                    error = %err,
                    "event handler failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::ChatError;
    use std::sync::Mutex;

    struct Recording {
        seen: Mutex<Vec<EventKind>>,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn handle(&self, event: &ChatEvent) -> ChatResult<()> {
            self.seen.lock().unwrap().push(event.kind());
            if self.fail {
                return Err(ChatError::connection("boom"));
            }
            Ok(())
        }
    }

    fn typing_event() -> ChatEvent {
        ChatEvent::ParticipantStartTyping {
            chat_id: "c1".into(),
            user_id: "u1".into(),
            connection_id: None,
        }
    }

    #[tokio::test]
    async fn dispatches_to_registered_kind_only() {
        let bus = EventBus::new();
        let handler = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            fail: false,
        });
        bus.subscribe(&[EventKind::ParticipantStartTyping], handler.clone())
            .await;

        bus.publish(typing_event()).await;
        bus.publish(ChatEvent::ParticipantStopTyping {
            chat_id: "c1".into(),
            user_id: "u1".into(),
            connection_id: None,
        })
        .await;

        let seen = handler.seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[EventKind::ParticipantStartTyping]);
    }

    #[tokio::test]
    async fn failing_handler_does_not_block_others() {
        let bus = EventBus::new();
        let failing = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            fail: true,
        });
        let healthy = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            fail: false,
        });
        bus.subscribe(&[EventKind::ParticipantStartTyping], failing.clone())
            .await;
        bus.subscribe(&[EventKind::ParticipantStartTyping], healthy.clone())
            .await;

        bus.publish(typing_event()).await;

        assert_eq!(failing.seen.lock().unwrap().len(), 1);
        assert_eq!(healthy.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn publish_without_handlers_is_not_an_error() {
        let bus = EventBus::new();
        // 只要不 panic 即可，缺失处理器通过 warn 日志观测
        bus.publish(typing_event()).await;
    }
}
