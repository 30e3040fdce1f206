//! 聊天业务编排
//!
//! 每个聊天操作在这里完成校验、鉴权、存储调用和事件发布。
//! P2P 建会去重和消息追加的乐观并发重试也集中在这一层。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain::time::round_to_millis;
use domain::{validate, Chat, ChatError, ChatEvent, ChatResult, InstantMessage, Participant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::auth::AuthContext;
use crate::bus::EventBus;
use crate::clock::Clock;
use crate::profile::ProfileProvider;
use crate::security::SecurityPolicy;
use crate::store::{ChatFilter, ChatStore};

/// 乐观并发追加的总尝试次数
const ADD_MESSAGE_ATTEMPTS: u32 = 3;

pub struct ChatServiceDependencies {
    pub store: Arc<dyn ChatStore>,
    pub security: Arc<dyn SecurityPolicy>,
    pub profiles: Arc<dyn ProfileProvider>,
    pub clock: Arc<dyn Clock>,
    pub bus: Arc<EventBus>,
}

pub struct ChatService {
    deps: ChatServiceDependencies,
    /// P2P 建会决策的全局串行点。吞吐让位于正确性。
    create_chat_lock: Mutex<()>,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self {
            deps,
            create_chat_lock: Mutex::new(()),
        }
    }

    /// 创建会话。
    ///
    /// 两人会话先查重：已有同一对用户的会话时复用并复活它，
    /// 携带的初始消息追加到已有会话，不会创建新会话。
    pub async fn start_chat(&self, actor: &AuthContext, mut chat: Chat) -> ChatResult<Chat> {
        Self::validate_new_chat(&chat)?;
        self.fill_up_new_chat_fields(actor, &mut chat).await?;
        self.deps.security.try_start(actor, &chat).await?;

        // 查重、复活、创建的决策必须串行，否则并发建会产生重复的 P2P 会话
        let _guard = self.create_chat_lock.lock().await;

        if chat.is_p2p() {
            let duplicate = self
                .deps
                .store
                .find_chat_with_participants(&chat.participants[0].id, &chat.participants[1].id)
                .await?;
            if let Some(existing) = duplicate {
                debug!(chat_id = %existing.id, "duplicate p2p chat found, reuse it");
                self.revive_p2p_chat(&existing).await?;

                for msg in &chat.messages {
                    self.deps.store.add_message(&existing.id, msg).await?;
                    self.push_new_message(&existing.id, actor, msg).await;
                }
                return self.deps.store.get(&existing.id).await;
            }
        }

        let created = self.deps.store.create(chat).await?;
        for msg in &created.messages {
            self.push_new_message(&created.id, actor, msg).await;
        }
        Ok(created)
    }

    /// 发送消息，返回服务端盖章的消息时间戳。
    ///
    /// 追加采用乐观并发：冲突时重新拉取会话整体重试，
    /// 共尝试 3 次，仍冲突则返回 Concurrency。
    pub async fn send_message(
        &self,
        actor: &AuthContext,
        chat_id: &str,
        mut message: InstantMessage,
    ) -> ChatResult<DateTime<Utc>> {
        validate::not_empty(chat_id, "chat id")?;
        if message.is_empty() {
            return Err(ChatError::validation("message could not be empty"));
        }

        let chat = self.deps.store.get(chat_id).await?;
        self.deps
            .security
            .try_send_message(actor, chat_id, &message, &chat)
            .await?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = if attempt == 1 {
                chat.clone()
            } else {
                self.deps.store.get(chat_id).await?
            };
            self.revive_p2p_chat(&current).await?;

            message.timestamp = round_to_millis(self.deps.clock.now());
            message.author = actor.user_id.clone();

            match self.deps.store.add_message(chat_id, &message).await {
                Ok(()) => break,
                Err(ChatError::Concurrency { .. }) if attempt < ADD_MESSAGE_ATTEMPTS => {
                    warn!(%chat_id, attempt, "optimistic append conflict, retry");
                    continue;
                }
                Err(err) => return Err(err),
            }
        }

        debug!(%chat_id, author = %message.author, "message added to chat");
        self.push_new_message(chat_id, actor, &message).await;
        Ok(message.timestamp)
    }

    /// 按时间窗口读取消息历史。
    ///
    /// 正向：`timestamp > from && timestamp <= to`，升序截断到 count。
    /// 反向：从消息流末尾回走，`timestamp < from && timestamp >= to`，
    /// 取 count 条后翻回升序返回。
    /// 操作者不是活跃参与者时返回空结果而不是报错。
    pub async fn get_message_history(
        &self,
        actor: &AuthContext,
        chat_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        count: usize,
        move_backward: bool,
    ) -> ChatResult<Vec<InstantMessage>> {
        validate::not_empty(chat_id, "chat id")?;
        let chat = self.deps.store.get(chat_id).await?;
        self.deps.security.try_read(actor, chat_id, &chat).await?;

        if !chat.has_active_participant(&actor.user_id) {
            warn!(%chat_id, user_id = %actor.user_id, "participant not found in chat or disabled");
            return Ok(Vec::new());
        }

        let messages = if move_backward {
            let mut picked: Vec<InstantMessage> = chat
                .messages
                .iter()
                .rev()
                .filter(|m| m.timestamp < from && m.timestamp >= to)
                .take(count)
                .cloned()
                .collect();
            picked.reverse();
            picked
        } else {
            chat.messages
                .iter()
                .filter(|m| m.timestamp > from && m.timestamp <= to)
                .take(count)
                .cloned()
                .collect()
        };
        Ok(messages)
    }

    /// 操作者作为活跃参与者的会话列表
    pub async fn get_chats(
        &self,
        actor: &AuthContext,
        filter: Option<ChatFilter>,
    ) -> ChatResult<Vec<Chat>> {
        self.deps
            .store
            .get_user_chat_list(&actor.user_id, filter)
            .await
    }

    /// 单个会话。操作者不是活跃参与者时视为不存在。
    pub async fn get_chat(&self, actor: &AuthContext, chat_id: &str) -> ChatResult<Chat> {
        validate::not_empty(chat_id, "chat id")?;
        let chat = self.deps.store.get(chat_id).await?;
        self.deps.security.try_read(actor, chat_id, &chat).await?;

        if chat.has_active_participant(&actor.user_id) {
            return Ok(chat);
        }
        Err(ChatError::not_found("chat", chat_id))
    }

    pub async fn mark_read(
        &self,
        actor: &AuthContext,
        chat_id: &str,
        timestamp: DateTime<Utc>,
    ) -> ChatResult<DateTime<Utc>> {
        validate::not_empty(chat_id, "chat id")?;
        self.deps
            .store
            .set_participant_read(chat_id, &actor.user_id, timestamp)
            .await?;
        self.deps
            .bus
            .publish(ChatEvent::MessageRead {
                chat_id: chat_id.to_string(),
                user_id: actor.user_id.clone(),
                connection_id: actor.connection_id.clone(),
                timestamp,
            })
            .await;
        Ok(timestamp)
    }

    /// 推进所有有未读消息的会话的已读水位，每个受影响会话发布一条 MessageRead
    pub async fn mark_read_bulk(
        &self,
        actor: &AuthContext,
        timestamp: DateTime<Utc>,
    ) -> ChatResult<DateTime<Utc>> {
        let chat_ids = self
            .deps
            .store
            .set_participant_read_all(&actor.user_id, timestamp)
            .await?;
        for chat_id in chat_ids {
            self.deps
                .bus
                .publish(ChatEvent::MessageRead {
                    chat_id,
                    user_id: actor.user_id.clone(),
                    connection_id: actor.connection_id.clone(),
                    timestamp,
                })
                .await;
        }
        Ok(timestamp)
    }

    pub async fn mark_delivered(
        &self,
        actor: &AuthContext,
        chat_id: &str,
        timestamp: DateTime<Utc>,
    ) -> ChatResult<DateTime<Utc>> {
        validate::not_empty(chat_id, "chat id")?;
        self.deps
            .store
            .set_participant_delivered(chat_id, &actor.user_id, timestamp)
            .await?;
        self.deps
            .bus
            .publish(ChatEvent::MessageDelivered {
                chat_id: chat_id.to_string(),
                user_id: actor.user_id.clone(),
                connection_id: actor.connection_id.clone(),
                timestamp,
            })
            .await;
        Ok(timestamp)
    }

    pub async fn leave_chat(&self, actor: &AuthContext, chat_id: &str) -> ChatResult<()> {
        validate::not_empty(chat_id, "chat id")?;
        self.deps
            .store
            .set_participant_left(chat_id, &actor.user_id, true)
            .await?;
        self.deps
            .bus
            .publish(ChatEvent::ParticipantLeftChat {
                chat_id: chat_id.to_string(),
                user_id: actor.user_id.clone(),
                connection_id: actor.connection_id.clone(),
            })
            .await;
        Ok(())
    }

    /// 添加参与者。
    ///
    /// 已是活跃参与者的请求 ID 直接跳过；此前退出的参与者翻回活跃态，
    /// 但不发布 ParticipantAdded（其余参与者不会感知这次回归，
    /// 与新参与者的行为不对称，这是沿袭下来的既定语义）；
    /// 全新参与者逐个过安全策略、解析资料后加入，事件在一次持久化之后统一发布。
    pub async fn add_participants(
        &self,
        actor: &AuthContext,
        chat_id: &str,
        participant_ids: &[String],
    ) -> ChatResult<()> {
        validate::not_empty(chat_id, "chat id")?;
        validate::not_empty_list(participant_ids, "participant ids")?;

        let mut unique: Vec<&String> = Vec::new();
        for id in participant_ids {
            validate::not_empty(id, "participant id")?;
            if !unique.contains(&id) {
                unique.push(id);
            }
        }

        let mut chat = self.deps.store.get(chat_id).await?;
        if !chat.has_active_participant(&actor.user_id) {
            return Err(ChatError::authorization(
                "you are not an active chat participant",
            ));
        }

        let mut need_update = false;
        let mut queued = Vec::new();
        for participant_id in unique {
            let existing = chat
                .participants
                .iter()
                .position(|p| &p.id == participant_id);
            match existing {
                Some(idx) => {
                    if !chat.participants[idx].has_left {
                        debug!(%participant_id, "participant already in the chat, nothing to add");
                        continue;
                    }
                    debug!(%participant_id, "participant marked as active again");
                    chat.participants[idx].has_left = false;
                    need_update = true;
                }
                None => {
                    self.deps
                        .security
                        .try_add_participant(actor, chat_id, participant_id, &chat)
                        .await?;
                    let user = self.deps.profiles.get(participant_id).await?;
                    chat.participants.push(Participant {
                        profile: user.profile.clone(),
                        is_deleted: user.is_deleted,
                        ..Participant::new(participant_id.clone())
                    });
                    queued.push(ChatEvent::ParticipantAdded {
                        chat_id: chat_id.to_string(),
                        user_id: actor.user_id.clone(),
                        connection_id: actor.connection_id.clone(),
                        participant: user,
                    });
                    need_update = true;
                }
            }
        }

        if need_update {
            self.deps
                .store
                .set_participants(chat_id, chat.participants.clone())
                .await?;
            for event in queued {
                self.deps.bus.publish(event).await;
            }
        }
        Ok(())
    }

    pub async fn get_participants(&self, chat_id: &str) -> ChatResult<Vec<Participant>> {
        validate::not_empty(chat_id, "chat id")?;
        self.deps.store.get_participants(chat_id).await
    }

    pub async fn change_title(
        &self,
        actor: &AuthContext,
        chat_id: &str,
        title: &str,
    ) -> ChatResult<()> {
        validate::not_empty(chat_id, "chat id")?;
        validate::not_empty(title, "title")?;

        self.deps.store.set_title(chat_id, title).await?;
        self.deps
            .bus
            .publish(ChatEvent::ChatTitleUpdated {
                chat_id: chat_id.to_string(),
                user_id: actor.user_id.clone(),
                connection_id: actor.connection_id.clone(),
                title: title.to_string(),
            })
            .await;
        debug!(%chat_id, "chat title updated");
        Ok(())
    }

    /// 打字通知不落存储，参数缺失时静默跳过
    pub async fn participant_start_typing(&self, actor: &AuthContext, chat_id: &str) {
        if chat_id.is_empty() {
            warn!("start typing called with empty chat id, do nothing");
            return;
        }
        self.deps
            .bus
            .publish(ChatEvent::ParticipantStartTyping {
                chat_id: chat_id.to_string(),
                user_id: actor.user_id.clone(),
                connection_id: actor.connection_id.clone(),
            })
            .await;
    }

    pub async fn participant_stop_typing(&self, actor: &AuthContext, chat_id: &str) {
        if chat_id.is_empty() {
            warn!("stop typing called with empty chat id, do nothing");
            return;
        }
        self.deps
            .bus
            .publish(ChatEvent::ParticipantStopTyping {
                chat_id: chat_id.to_string(),
                user_id: actor.user_id.clone(),
                connection_id: actor.connection_id.clone(),
            })
            .await;
    }

    pub async fn storage_info(&self) -> ChatResult<String> {
        self.deps.store.get_info().await
    }

    fn validate_new_chat(chat: &Chat) -> ChatResult<()> {
        validate::not_empty_list(&chat.participants, "chat has no participants")?;
        for participant in &chat.participants {
            validate::not_empty(&participant.id, "participant id")?;
        }
        Ok(())
    }

    /// 补全新会话：解析参与者资料、把操作者补进参与者、盖章时间字段
    async fn fill_up_new_chat_fields(
        &self,
        actor: &AuthContext,
        chat: &mut Chat,
    ) -> ChatResult<()> {
        let now = round_to_millis(self.deps.clock.now());

        for participant in &mut chat.participants {
            let user = self.deps.profiles.get(&participant.id).await?;
            participant.profile = user.profile;
            participant.is_deleted = user.is_deleted;
        }

        if !chat.participants.iter().any(|p| p.id == actor.user_id) {
            let author = self.deps.profiles.get(&actor.user_id).await?;
            chat.participants.push(Participant {
                profile: author.profile,
                is_deleted: author.is_deleted,
                read_on: Some(now),
                ..Participant::new(actor.user_id.clone())
            });
        }

        chat.started_on = Some(now);
        chat.started_by = Some(actor.user_id.clone());
        chat.last_activity_on = Some(now);
        chat.message_count = chat.messages.len();
        for msg in &mut chat.messages {
            msg.timestamp = now;
            msg.author = actor.user_id.clone();
        }
        Ok(())
    }

    /// P2P 会话里有参与者退出时拉回来；有全局删除的参与者则拒绝
    async fn revive_p2p_chat(&self, chat: &Chat) -> ChatResult<()> {
        if !chat.is_p2p() || !chat.participants.iter().any(|p| p.has_left) {
            return Ok(());
        }

        if chat.participants.iter().any(|p| p.is_deleted) {
            warn!(chat_id = %chat.id, "p2p chat has a deleted participant, revive refused");
            return Err(ChatError::validation("user is deleted"));
        }

        debug!(chat_id = %chat.id, "p2p chat detected with left participants, revive");
        for participant in &chat.participants {
            if participant.has_left {
                self.deps
                    .store
                    .set_participant_left(&chat.id, &participant.id, false)
                    .await?;
            }
        }
        Ok(())
    }

    async fn push_new_message(&self, chat_id: &str, actor: &AuthContext, msg: &InstantMessage) {
        self.deps
            .bus
            .publish(ChatEvent::MessageNew {
                chat_id: chat_id.to_string(),
                connection_id: actor.connection_id.clone(),
                message: msg.clone(),
            })
            .await;
    }
}
