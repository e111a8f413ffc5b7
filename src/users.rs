// User directory, moderation actions and the audit log

use crate::error::ChatError;
use crate::events::EventBus;
use crate::password::{hash_password, verify_password, PasswordHash};
use crate::store::DataStore;
use crate::types::{
    ChatEvent, CreateUserPayload, ModerationAction, ModerationLog, PublicUser, StoredUser,
    UpdateUserPayload, UserRole,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Audit log retention cap (newest first)
const LOG_RETENTION: usize = 5000;

/// Default page size for log listings
pub const DEFAULT_LOG_LIMIT: usize = 250;

/// Accounts, profile updates, moderation and audit logging.
///
/// Every write funnels through the store's `with_mutation` so the
/// read-modify-write is observed as a unit within this process.
pub struct UserService {
    store: Arc<DataStore>,
    events: Arc<EventBus>,
}

impl UserService {
    pub fn new(store: Arc<DataStore>, events: Arc<EventBus>) -> Self {
        Self { store, events }
    }

    /// Seed the bootstrap admin account if no user with that name exists yet
    pub async fn ensure_default_admin(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(), ChatError> {
        let data = self.store.load().await?;
        if data.users.iter().any(|user| user.username == username) {
            return Ok(());
        }

        let user = build_user(username, "Administrator", UserRole::Admin, None, password);
        let username = username.to_string();
        self.store
            .with_mutation(move |data| {
                if data.users.iter().any(|user| user.username == username) {
                    return Ok(());
                }
                data.users.push(user);
                Ok(())
            })
            .await?;

        tracing::info!("Seeded bootstrap admin account");
        Ok(())
    }

    /// Check credentials. Unknown username or wrong password yields `None`;
    /// a banned user fails outright regardless of password correctness.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<StoredUser>, ChatError> {
        let data = self.store.load().await?;
        let user = match data.users.iter().find(|user| user.username == username) {
            Some(user) => user.clone(),
            None => return Ok(None),
        };

        // Banned accounts fail outright, regardless of password correctness
        if user.is_banned {
            return Err(ChatError::State("User is banned".to_string()));
        }

        let stored = PasswordHash {
            salt: user.password_salt.clone(),
            hash: user.password_hash.clone(),
        };
        if !verify_password(password, &stored) {
            return Ok(None);
        }

        Ok(Some(user))
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<StoredUser>, ChatError> {
        let data = self.store.load().await?;
        Ok(data
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    /// All users, sorted by display name
    pub async fn list_public(&self) -> Result<Vec<PublicUser>, ChatError> {
        let data = self.store.load().await?;
        let mut users: Vec<PublicUser> = data.users.iter().map(StoredUser::to_public).collect();
        users.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(users)
    }

    /// Create an account on behalf of `actor`
    pub async fn create_account(
        &self,
        actor: &StoredUser,
        payload: CreateUserPayload,
    ) -> Result<StoredUser, ChatError> {
        let username = payload.username.trim().to_string();
        let display_name = payload.display_name.trim().to_string();

        if username.is_empty() {
            return Err(ChatError::Validation("Username is required".to_string()));
        }
        if display_name.is_empty() {
            return Err(ChatError::Validation("Display name is required".to_string()));
        }

        let role = payload.role.unwrap_or(UserRole::Member);
        let user = build_user(
            &username,
            &display_name,
            role,
            payload.avatar_data.clone(),
            &payload.password,
        );

        let created = self
            .store
            .with_mutation(move |data| {
                if data.users.iter().any(|other| other.username == username) {
                    return Err(ChatError::Conflict("Username already taken".to_string()));
                }
                data.users.push(user.clone());
                Ok(user)
            })
            .await?;

        self.broadcast_user(&created).await;
        self.record_log(
            "create_user",
            &actor.username,
            Some(created.username.clone()),
            Some(format!("Created account {}", created.display_name)),
        )
        .await?;

        tracing::info!("User {} created by {}", created.username, actor.username);
        Ok(created)
    }

    /// Partial profile update; only fields present in `updates` change
    pub async fn update_profile(
        &self,
        actor: &StoredUser,
        username: &str,
        updates: UpdateUserPayload,
    ) -> Result<StoredUser, ChatError> {
        let target = username.to_string();
        let updated = self
            .store
            .with_mutation(move |data| {
                let user = data
                    .users
                    .iter_mut()
                    .find(|user| user.username == target)
                    .ok_or_else(|| ChatError::NotFound("User not found".to_string()))?;

                if let Some(display_name) = &updates.display_name {
                    user.display_name = display_name.trim().to_string();
                }
                if let Some(avatar) = &updates.avatar_data {
                    user.avatar_url = avatar.clone();
                }
                if let Some(role) = updates.role {
                    user.role = role;
                }
                if let Some(password) = &updates.password {
                    if !password.is_empty() {
                        let rehashed = hash_password(password, None);
                        user.password_salt = rehashed.salt;
                        user.password_hash = rehashed.hash;
                    }
                }

                user.updated_at = Utc::now();
                Ok(user.clone())
            })
            .await?;

        self.broadcast_user(&updated).await;
        self.record_log(
            "update_profile",
            &actor.username,
            Some(updated.username.clone()),
            Some("Updated user profile".to_string()),
        )
        .await?;

        Ok(updated)
    }

    /// Apply a ban/unban/mute/unmute to `username`.
    ///
    /// An admin cannot ban or mute their own account; the lifting actions are
    /// allowed on self. Flag flips are idempotent but still logged.
    pub async fn apply_moderation(
        &self,
        actor: &StoredUser,
        action: ModerationAction,
        username: &str,
        context: Option<String>,
    ) -> Result<StoredUser, ChatError> {
        let actor_id = actor.id.clone();
        let target = username.to_string();
        let updated = self
            .store
            .with_mutation(move |data| {
                let user = data
                    .users
                    .iter_mut()
                    .find(|user| user.username == target)
                    .ok_or_else(|| ChatError::NotFound("User not found".to_string()))?;

                let self_action = user.id == actor_id;
                if self_action
                    && matches!(action, ModerationAction::Ban | ModerationAction::Mute)
                {
                    return Err(ChatError::State(
                        "Cannot apply this action to your own account".to_string(),
                    ));
                }

                match action {
                    ModerationAction::Ban => user.is_banned = true,
                    ModerationAction::Unban => user.is_banned = false,
                    ModerationAction::Mute => user.is_muted = true,
                    ModerationAction::Unmute => user.is_muted = false,
                }

                user.updated_at = Utc::now();
                Ok(user.clone())
            })
            .await?;

        self.broadcast_user(&updated).await;
        self.record_log(
            action.as_str(),
            &actor.username,
            Some(updated.username.clone()),
            context,
        )
        .await?;

        tracing::info!(
            "Moderation action {} applied to {} by {}",
            action.as_str(),
            updated.username,
            actor.username
        );
        Ok(updated)
    }

    /// Prepend an audit entry, enforce retention and broadcast it
    pub async fn record_log(
        &self,
        action: &str,
        actor_username: &str,
        target_username: Option<String>,
        context: Option<String>,
    ) -> Result<ModerationLog, ChatError> {
        let log = ModerationLog {
            id: Uuid::new_v4().to_string(),
            action: action.to_string(),
            actor_username: actor_username.to_string(),
            target_username,
            context,
            created_at: Utc::now(),
        };

        let recorded = self
            .store
            .with_mutation(move |data| {
                data.logs.insert(0, log.clone());
                data.logs.truncate(LOG_RETENTION);
                Ok(log)
            })
            .await?;

        self.events
            .broadcast(&ChatEvent::ModerationLog {
                log: recorded.clone(),
            })
            .await;
        Ok(recorded)
    }

    /// Most recent audit entries, newest first
    pub async fn list_logs(&self, limit: usize) -> Result<Vec<ModerationLog>, ChatError> {
        let data = self.store.load().await?;
        Ok(data.logs.iter().take(limit).cloned().collect())
    }

    async fn broadcast_user(&self, user: &StoredUser) {
        self.events
            .broadcast(&ChatEvent::UserStatus {
                user: user.to_public(),
            })
            .await;
    }
}

fn build_user(
    username: &str,
    display_name: &str,
    role: UserRole,
    avatar_url: Option<String>,
    password: &str,
) -> StoredUser {
    let now = Utc::now();
    let derived = hash_password(password, None);

    StoredUser {
        id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        display_name: display_name.to_string(),
        role,
        avatar_url,
        is_muted: false,
        is_banned: false,
        password_salt: derived.salt,
        password_hash: derived.hash,
        created_at: now,
        updated_at: now,
    }
}
