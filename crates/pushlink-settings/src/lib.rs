//! # pushlink-settings
//!
//! Configuration for the pushlink long-connection client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`PushlinkSettings::default()`]
//! 2. **User file**: `~/.pushlink/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `PUSHLINK_*` overrides (highest priority)
//!
//! Connection policy (ping interval, reconnect budget) is not configured
//! here: the gateway hands it out on every connect.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings,
    load_settings_from_path, settings_path,
};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
