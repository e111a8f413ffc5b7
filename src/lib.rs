//! noskills - a small community chat server
//!
//! Server side of the No-Skills Messagerie: an admin-provisioned user
//! directory, a general channel, private direct messages, moderation actions
//! with an audit log, and live update delivery over a server-sent-events
//! stream. All durable state lives in a single JSON document on disk;
//! sessions are process-local memory only.

pub mod config;
pub mod error;
pub mod events;
pub mod messages;
pub mod password;
pub mod server;
pub mod session;
pub mod store;
pub mod types;
pub mod users;

pub use config::Config;
pub use error::ChatError;
pub use events::EventBus;
pub use messages::MessageService;
pub use server::AppState;
pub use session::{Session, SessionManager};
pub use store::DataStore;
pub use types::{
    AppData, ChatEvent, DirectMessage, GeneralMessage, ModerationAction, ModerationLog, PublicUser,
    StoredUser, UserRole,
};
pub use users::UserService;
