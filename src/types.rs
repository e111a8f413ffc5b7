// Data model and wire types for the chat service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role assigned to a user account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Member,
}

/// A user record as persisted in the data document
///
/// Users are never hard-deleted; ban/mute flags and profile updates are the
/// only mutations after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredUser {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub role: UserRole,
    pub avatar_url: Option<String>,
    pub is_muted: bool,
    pub is_banned: bool,
    pub password_salt: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredUser {
    /// Projection safe to expose over the API (omits password material)
    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            role: self.role,
            avatar_url: self.avatar_url.clone(),
            is_muted: self.is_muted,
            is_banned: self.is_banned,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// User fields visible to other users
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub role: UserRole,
    pub avatar_url: Option<String>,
    pub is_muted: bool,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A message in the general channel
///
/// Deleted messages keep their record with `deleted_at` set and are excluded
/// from listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralMessage {
    pub id: String,
    pub content: String,
    pub sender_id: String,
    pub sender_username: String,
    pub sender_display_name: String,
    pub sender_role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A private message between two users
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    pub id: String,
    pub content: String,
    pub sender_id: String,
    pub sender_username: String,
    pub sender_display_name: String,
    pub sender_role: UserRole,
    pub recipient_id: String,
    pub recipient_username: String,
    pub recipient_display_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An entry in the append-only audit log (newest first)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationLog {
    pub id: String,
    pub action: String,
    pub actor_username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Administrative state change applied to a user account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationAction {
    Ban,
    Unban,
    Mute,
    Unmute,
}

impl ModerationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationAction::Ban => "ban",
            ModerationAction::Unban => "unban",
            ModerationAction::Mute => "mute",
            ModerationAction::Unmute => "unmute",
        }
    }
}

/// The root aggregate, sole unit of persistence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppData {
    pub users: Vec<StoredUser>,
    pub general_messages: Vec<GeneralMessage>,
    pub direct_messages: Vec<DirectMessage>,
    pub logs: Vec<ModerationLog>,
}

/// Events fanned out to every connected streaming client
///
/// Delivery is global; each client's own query layer filters to what is
/// relevant to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChatEvent {
    #[serde(rename_all = "camelCase")]
    GeneralMessage { message: GeneralMessage },
    #[serde(rename_all = "camelCase")]
    GeneralMessageDeleted {
        message_id: String,
        moderator: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    DirectMessage { message: DirectMessage },
    #[serde(rename_all = "camelCase")]
    UserStatus { user: PublicUser },
    #[serde(rename_all = "camelCase")]
    ModerationLog { log: ModerationLog },
}

/// Payload for admin account creation
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserPayload {
    pub username: String,
    pub password: String,
    pub display_name: String,
    #[serde(default)]
    pub role: Option<UserRole>,
    #[serde(default)]
    pub avatar_data: Option<String>,
}

/// Partial-update payload for admin profile edits
///
/// Only fields present in the payload are changed; `avatar_data: null`
/// explicitly clears the avatar.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserPayload {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub avatar_data: Option<Option<String>>,
    #[serde(default)]
    pub role: Option<UserRole>,
}

// Distinguishes an absent field (outer None) from an explicit null
// (Some(None)) during partial updates.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
