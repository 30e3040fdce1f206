//! 内存版会话存储
//!
//! 把会话整体放进一张受读写锁保护的表，读出和写入都走深拷贝，
//! 调用方拿到的永远是时点快照。乐观并发和水位单调性在这里落实。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Chat, ChatError, ChatResult, InstantMessage, Participant, UserProfile};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use application::store::{ChatFilter, ChatStore};

/// 会话存储的内存实现，适用于单机部署和测试
#[derive(Default)]
pub struct InMemoryChatStore {
    chats: RwLock<Vec<Chat>>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn get_user_chat_list(
        &self,
        user_id: &str,
        filter: Option<ChatFilter>,
    ) -> ChatResult<Vec<Chat>> {
        let chats = self.chats.read().await;
        Ok(chats
            .iter()
            .filter(|c| {
                c.participants
                    .iter()
                    .any(|p| p.id == user_id && p.is_active())
            })
            .filter(|c| filter.as_ref().map_or(true, |f| f.matches(c)))
            .cloned()
            .collect())
    }

    async fn get(&self, chat_id: &str) -> ChatResult<Chat> {
        let chats = self.chats.read().await;
        chats
            .iter()
            .find(|c| c.id == chat_id)
            .cloned()
            .ok_or_else(|| ChatError::not_found("chat", chat_id))
    }

    async fn find_chat_with_participants(
        &self,
        user_id1: &str,
        user_id2: &str,
    ) -> ChatResult<Option<Chat>> {
        let chats = self.chats.read().await;
        Ok(chats
            .iter()
            .find(|c| {
                c.participants.len() == 2
                    && c.participants.iter().any(|p| p.id == user_id1)
                    && c.participants.iter().any(|p| p.id == user_id2)
            })
            .cloned())
    }

    async fn create(&self, mut chat: Chat) -> ChatResult<Chat> {
        chat.id = Uuid::new_v4().simple().to_string();
        let mut chats = self.chats.write().await;
        chats.push(chat.clone());
        debug!(chat_id = %chat.id, "chat created");
        Ok(chat)
    }

    async fn add_message(&self, chat_id: &str, msg: &InstantMessage) -> ChatResult<()> {
        let mut chats = self.chats.write().await;
        let chat = chats
            .iter_mut()
            .find(|c| c.id == chat_id)
            .ok_or_else(|| ChatError::not_found("chat", chat_id))?;

        let author = chat
            .participants
            .iter_mut()
            .find(|p| p.id == msg.author)
            .ok_or_else(|| {
                ChatError::not_found("chat with participant", format!("{chat_id}/{}", msg.author))
            })?;

        // 条件追加：作者的 last_message_on 必须仍早于新消息的时间戳
        match author.last_message_on {
            Some(last) if last >= msg.timestamp => {
                warn!(%chat_id, author = %msg.author, "nothing updated, concurrent append detected");
                return Err(ChatError::concurrency("message append precondition failed"));
            }
            _ => {}
        }

        author.last_message_on = Some(msg.timestamp);
        chat.last_activity_on = Some(msg.timestamp);
        chat.message_count += 1;
        chat.messages.push(msg.clone());
        Ok(())
    }

    async fn set_participant_read(
        &self,
        chat_id: &str,
        user_id: &str,
        timestamp: DateTime<Utc>,
    ) -> ChatResult<()> {
        let mut chats = self.chats.write().await;
        let matched = chats
            .iter_mut()
            .find(|c| c.id == chat_id)
            .and_then(|c| c.participant_mut(user_id));
        if let Some(participant) = matched {
            // 水位只允许前进，旧的时间戳静默丢弃
            if participant.is_active() && participant.read_on.map_or(true, |r| r < timestamp) {
                participant.read_on = Some(timestamp);
            }
        }
        Ok(())
    }

    async fn set_participant_read_all(
        &self,
        user_id: &str,
        timestamp: DateTime<Utc>,
    ) -> ChatResult<Vec<String>> {
        let mut chats = self.chats.write().await;
        let mut affected = Vec::new();
        for chat in chats.iter_mut() {
            let chat_id = chat.id.clone();
            if let Some(participant) = chat.participant_mut(user_id) {
                if participant.is_active() && participant.read_on.map_or(true, |r| r < timestamp) {
                    participant.read_on = Some(timestamp);
                    affected.push(chat_id);
                }
            }
        }
        Ok(affected)
    }

    async fn set_participant_delivered(
        &self,
        chat_id: &str,
        user_id: &str,
        timestamp: DateTime<Utc>,
    ) -> ChatResult<()> {
        let mut chats = self.chats.write().await;
        let matched = chats
            .iter_mut()
            .find(|c| c.id == chat_id)
            .and_then(|c| c.participant_mut(user_id));
        if let Some(participant) = matched {
            if participant.is_active() && participant.delivered_on.map_or(true, |d| d < timestamp) {
                participant.delivered_on = Some(timestamp);
            }
        }
        Ok(())
    }

    async fn set_participant_left(
        &self,
        chat_id: &str,
        user_id: &str,
        has_left: bool,
    ) -> ChatResult<()> {
        let mut chats = self.chats.write().await;
        let chat = chats
            .iter_mut()
            .find(|c| c.id == chat_id)
            .ok_or_else(|| ChatError::not_found("chat", chat_id))?;
        let participant = chat
            .participants
            .iter_mut()
            .find(|p| p.id == user_id && !p.is_deleted)
            .ok_or_else(|| ChatError::not_found("participant", user_id))?;
        participant.has_left = has_left;
        Ok(())
    }

    async fn set_participant_deleted(&self, user_id: &str, is_deleted: bool) -> ChatResult<()> {
        let mut chats = self.chats.write().await;
        for chat in chats.iter_mut() {
            if let Some(participant) = chat.participant_mut(user_id) {
                participant.is_deleted = is_deleted;
            }
        }
        Ok(())
    }

    async fn set_participants(
        &self,
        chat_id: &str,
        participants: Vec<Participant>,
    ) -> ChatResult<()> {
        let mut chats = self.chats.write().await;
        let chat = chats
            .iter_mut()
            .find(|c| c.id == chat_id)
            .ok_or_else(|| ChatError::not_found("chat", chat_id))?;
        chat.participants = participants;
        Ok(())
    }

    async fn get_participants(&self, chat_id: &str) -> ChatResult<Vec<Participant>> {
        let chats = self.chats.read().await;
        chats
            .iter()
            .find(|c| c.id == chat_id)
            .map(|c| c.participants.clone())
            .ok_or_else(|| ChatError::not_found("chat", chat_id))
    }

    async fn set_title(&self, chat_id: &str, title: &str) -> ChatResult<()> {
        let mut chats = self.chats.write().await;
        let chat = chats
            .iter_mut()
            .find(|c| c.id == chat_id)
            .ok_or_else(|| ChatError::not_found("chat", chat_id))?;
        chat.title = Some(title.to_string());
        Ok(())
    }

    async fn update_profile(&self, user_id: &str, profile: &UserProfile) -> ChatResult<()> {
        let mut chats = self.chats.write().await;
        for chat in chats.iter_mut() {
            if let Some(participant) = chat
                .participants
                .iter_mut()
                .find(|p| p.id == user_id && p.is_active())
            {
                participant.profile = profile.clone();
            }
        }
        Ok(())
    }

    async fn get_info(&self) -> ChatResult<String> {
        Ok(format!(
            "in-memory, crate version {}",
            env!("CARGO_PKG_VERSION")
        ))
    }
}
