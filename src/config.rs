//! Process-wide settings, built once at start-up and shared read-only.

use std::{fmt::Debug, path::PathBuf};

use time::Duration;

use crate::{LedgerPolicy, pagination::PaginationConfig};

/// How long access tokens are valid for when not configured.
pub const DEFAULT_TOKEN_DURATION: Duration = Duration::minutes(30);

/// The settings that components need at request time.
///
/// The server binary constructs this from its command line arguments and
/// environment, then hands it to [crate::AppState::new]. Nothing reads
/// settings from ambient globals.
#[derive(Clone)]
pub struct AppConfig {
    /// The secret used to derive the access token signing key.
    pub token_secret: String,

    /// How long newly issued access tokens are valid for.
    pub token_duration: Duration,

    /// The directory that uploaded files (avatars) are written to and served from.
    pub upload_dir: PathBuf,

    /// The bcrypt cost used when hashing new passwords.
    pub password_hash_cost: u32,

    /// The defaults and limits for paged list endpoints.
    pub pagination: PaginationConfig,

    /// The rules the ledger applies when posting events.
    pub ledger_policy: LedgerPolicy,
}

impl AppConfig {
    /// Create a config with the given token secret and default values for
    /// everything else.
    pub fn new(token_secret: &str) -> Self {
        Self {
            token_secret: token_secret.to_owned(),
            token_duration: DEFAULT_TOKEN_DURATION,
            upload_dir: PathBuf::from("uploads"),
            password_hash_cost: bcrypt::DEFAULT_COST,
            pagination: PaginationConfig::default(),
            ledger_policy: LedgerPolicy::default(),
        }
    }
}

impl Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("token_secret", &"********")
            .field("token_duration", &self.token_duration)
            .field("upload_dir", &self.upload_dir)
            .field("password_hash_cost", &self.password_hash_cost)
            .field("pagination", &self.pagination)
            .field("ledger_policy", &self.ledger_policy)
            .finish()
    }
}
