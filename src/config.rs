// Runtime configuration

use clap::Parser;
use std::path::PathBuf;

/// No-Skills Messagerie chat server
///
/// Serves the chat API over HTTP, keeps all durable state in a single JSON
/// document under the data directory, and seeds a bootstrap admin account on
/// first start.
#[derive(Debug, Clone, Parser)]
#[command(name = "noskills", version, about)]
pub struct Config {
    /// Port to listen on
    #[arg(short, long, default_value = "8080", env = "NOSKILLS_PORT")]
    pub port: u16,

    /// Directory holding the JSON data document
    #[arg(short, long, default_value = "data", env = "NOSKILLS_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Username for the bootstrap admin account
    ///
    /// Only used to seed the very first account when the store is empty.
    #[arg(long, default_value = "admin", env = "ADMIN_USERNAME")]
    pub admin_username: String,

    /// Password for the bootstrap admin account
    #[arg(long, default_value = "change-me-now", env = "ADMIN_PASSWORD")]
    pub admin_password: String,

    /// Mark session cookies as Secure (set when serving behind TLS)
    #[arg(long, env = "NOSKILLS_PRODUCTION")]
    pub production: bool,
}

impl Config {
    /// Configuration pointing at a throwaway data directory, for tests
    pub fn for_data_dir(data_dir: PathBuf) -> Self {
        Self {
            port: 0,
            data_dir,
            admin_username: "admin".to_string(),
            admin_password: "change-me-now".to_string(),
            production: false,
        }
    }
}
