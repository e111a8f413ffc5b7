// General-channel and direct messages: posting, listing, soft delete

use crate::error::ChatError;
use crate::events::EventBus;
use crate::store::DataStore;
use crate::types::{ChatEvent, DirectMessage, GeneralMessage, StoredUser};
use crate::users::UserService;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Retention cap for the general channel (oldest evicted first)
const GENERAL_RETENTION: usize = 1000;

/// Global retention cap for direct messages
const DIRECT_RETENTION: usize = 2000;

/// Default page size for message listings
pub const DEFAULT_LIST_LIMIT: usize = 200;

/// Message posting and listing with mute and retention enforcement
pub struct MessageService {
    store: Arc<DataStore>,
    events: Arc<EventBus>,
    users: Arc<UserService>,
}

impl MessageService {
    pub fn new(store: Arc<DataStore>, events: Arc<EventBus>, users: Arc<UserService>) -> Self {
        Self {
            store,
            events,
            users,
        }
    }

    /// Most recent non-deleted general messages, oldest to newest
    pub async fn list_general(&self, limit: usize) -> Result<Vec<GeneralMessage>, ChatError> {
        let data = self.store.load().await?;
        let visible: Vec<GeneralMessage> = data
            .general_messages
            .iter()
            .filter(|message| message.deleted_at.is_none())
            .cloned()
            .collect();

        let skip = visible.len().saturating_sub(limit);
        Ok(visible.into_iter().skip(skip).collect())
    }

    /// Append a message to the general channel
    pub async fn post_general(
        &self,
        sender: &StoredUser,
        content: &str,
    ) -> Result<GeneralMessage, ChatError> {
        check_can_post(sender)?;
        let content = non_empty_content(content)?;

        let message = GeneralMessage {
            id: Uuid::new_v4().to_string(),
            content,
            sender_id: sender.id.clone(),
            sender_username: sender.username.clone(),
            sender_display_name: sender.display_name.clone(),
            sender_role: sender.role,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };

        let posted = self
            .store
            .with_mutation(move |data| {
                data.general_messages.push(message.clone());
                let excess = data.general_messages.len().saturating_sub(GENERAL_RETENTION);
                if excess > 0 {
                    data.general_messages.drain(..excess);
                }
                Ok(message)
            })
            .await?;

        self.events
            .broadcast(&ChatEvent::GeneralMessage {
                message: posted.clone(),
            })
            .await;
        Ok(posted)
    }

    /// Soft-delete a general message: the record stays in storage with
    /// `deleted_at` set and disappears from listings.
    pub async fn delete_general(
        &self,
        moderator: &StoredUser,
        message_id: &str,
    ) -> Result<(), ChatError> {
        let target = message_id.to_string();
        self.store
            .with_mutation(move |data| {
                let message = data
                    .general_messages
                    .iter_mut()
                    .find(|message| message.id == target)
                    .ok_or_else(|| ChatError::NotFound("Message not found".to_string()))?;

                let now = Utc::now();
                message.deleted_at = Some(now);
                message.updated_at = now;
                Ok(())
            })
            .await?;

        self.events
            .broadcast(&ChatEvent::GeneralMessageDeleted {
                message_id: message_id.to_string(),
                moderator: moderator.username.clone(),
                timestamp: Utc::now(),
            })
            .await;

        self.users
            .record_log(
                "delete_message",
                &moderator.username,
                None,
                Some(format!("Deleted message {}", message_id)),
            )
            .await?;

        tracing::info!("Message {} deleted by {}", message_id, moderator.username);
        Ok(())
    }

    /// Direct messages between `user` and `peer` in either direction,
    /// oldest to newest
    pub async fn list_direct(
        &self,
        user: &StoredUser,
        peer: &StoredUser,
        limit: usize,
    ) -> Result<Vec<DirectMessage>, ChatError> {
        let data = self.store.load().await?;
        let thread: Vec<DirectMessage> = data
            .direct_messages
            .iter()
            .filter(|message| {
                (message.sender_id == user.id && message.recipient_id == peer.id)
                    || (message.sender_id == peer.id && message.recipient_id == user.id)
            })
            .cloned()
            .collect();

        let skip = thread.len().saturating_sub(limit);
        Ok(thread.into_iter().skip(skip).collect())
    }

    /// Send a private message.
    ///
    /// The banned-recipient check lives here in the service contract, not in
    /// the route layer.
    pub async fn post_direct(
        &self,
        sender: &StoredUser,
        recipient: &StoredUser,
        content: &str,
    ) -> Result<DirectMessage, ChatError> {
        check_can_post(sender)?;
        if recipient.is_banned {
            return Err(ChatError::State("Recipient is unavailable".to_string()));
        }
        let content = non_empty_content(content)?;

        let now = Utc::now();
        let message = DirectMessage {
            id: Uuid::new_v4().to_string(),
            content,
            sender_id: sender.id.clone(),
            sender_username: sender.username.clone(),
            sender_display_name: sender.display_name.clone(),
            sender_role: sender.role,
            recipient_id: recipient.id.clone(),
            recipient_username: recipient.username.clone(),
            recipient_display_name: recipient.display_name.clone(),
            created_at: now,
            updated_at: now,
        };

        let posted = self
            .store
            .with_mutation(move |data| {
                data.direct_messages.push(message.clone());
                let excess = data.direct_messages.len().saturating_sub(DIRECT_RETENTION);
                if excess > 0 {
                    data.direct_messages.drain(..excess);
                }
                Ok(message)
            })
            .await?;

        self.events
            .broadcast(&ChatEvent::DirectMessage {
                message: posted.clone(),
            })
            .await;
        Ok(posted)
    }
}

fn check_can_post(sender: &StoredUser) -> Result<(), ChatError> {
    if sender.is_muted {
        return Err(ChatError::State("User is muted".to_string()));
    }
    Ok(())
}

fn non_empty_content(content: &str) -> Result<String, ChatError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ChatError::Validation("Message is empty".to_string()));
    }
    Ok(trimmed.to_string())
}
