//! Why loading or validating [`PushlinkSettings`](crate::PushlinkSettings)
//! can fail.

use thiserror::Error;

/// A settings file that could not be used, or settings the client cannot
/// connect with.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// `settings.json` exists but could not be read.
    #[error("cannot read pushlink settings: {0}")]
    Io(#[from] std::io::Error),
    /// `settings.json` is not a JSON object of known fields.
    #[error("malformed pushlink settings: {0}")]
    Json(#[from] serde_json::Error),
    /// A field holds a value the client rejects.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
    /// `appId` or `appSecret` is empty; the endpoint call cannot be made.
    #[error("missing credentials: {0} is not set")]
    MissingCredentials(&'static str),
}

/// Shorthand for settings results.
pub type Result<T> = std::result::Result<T, SettingsError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
