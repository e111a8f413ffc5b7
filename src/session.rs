// In-memory session management with opaque tokens and sliding expiry

use crate::error::ChatError;
use crate::store::DataStore;
use crate::types::StoredUser;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Sliding session lifetime
const SESSION_TTL_DAYS: i64 = 7;

/// Token entropy in bytes (hex-encoded on the wire)
const TOKEN_LENGTH: usize = 32;

/// An issued session. Held only in process memory; restarting the process
/// invalidates all sessions.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Issues, validates, renews and revokes opaque session tokens.
///
/// Expiry is lazy: expired entries are evicted when read, there is no
/// background sweep.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::with_ttl(Duration::days(SESSION_TTL_DAYS))
    }

    /// Custom TTL, used by tests exercising expiry
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Issue a new session for `user`
    pub async fn create_session(&self, user: &StoredUser) -> Session {
        let now = Utc::now();
        let session = Session {
            token: generate_token(),
            user_id: user.id.clone(),
            created_at: now,
            updated_at: now,
            expires_at: now + self.ttl,
        };

        let mut sessions = self.sessions.write().await;
        sessions.insert(session.token.clone(), session.clone());
        session
    }

    /// Look up a session, evicting it when expired
    pub async fn get_session(&self, token: &str) -> Option<Session> {
        let session = {
            let sessions = self.sessions.read().await;
            sessions.get(token).cloned()
        }?;

        if session.expires_at < Utc::now() {
            self.invalidate_session(token).await;
            return None;
        }

        Some(session)
    }

    /// Idempotent removal
    pub async fn invalidate_session(&self, token: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(token);
    }

    /// Resolve the session, then the user behind it.
    ///
    /// A banned user's outstanding sessions stop working here without
    /// requiring a logout. On success the expiry window slides forward.
    pub async fn get_user_from_token(
        &self,
        store: &DataStore,
        token: Option<&str>,
    ) -> Result<Option<StoredUser>, ChatError> {
        let token = match token {
            Some(token) => token,
            None => return Ok(None),
        };

        let session = match self.get_session(token).await {
            Some(session) => session,
            None => return Ok(None),
        };

        let data = store.load().await?;
        let user = data.users.iter().find(|user| user.id == session.user_id);

        let user = match user {
            Some(user) => user.clone(),
            None => {
                self.invalidate_session(token).await;
                return Ok(None);
            }
        };

        if user.is_banned {
            self.invalidate_session(token).await;
            return Ok(None);
        }

        self.touch(token).await;
        Ok(Some(user))
    }

    /// Same as [`get_user_from_token`](Self::get_user_from_token) but fails
    /// with an authentication error, for request-gating middleware.
    pub async fn require_user_from_token(
        &self,
        store: &DataStore,
        token: Option<&str>,
    ) -> Result<StoredUser, ChatError> {
        self.get_user_from_token(store, token)
            .await?
            .ok_or(ChatError::Authentication)
    }

    /// Number of live entries, including not-yet-evicted expired ones
    pub async fn session_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    async fn touch(&self, token: &str) {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(token) {
            session.updated_at = now;
            session.expires_at = now + self.ttl;
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate an unforgeable opaque token (256 bits of randomness)
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_LENGTH];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
