//! # tether-settings
//!
//! Layered configuration for the tether client: compiled defaults, an
//! optional `~/.tether/settings.json` deep-merged on top, and `TETHER_*`
//! environment variables as the highest-priority layer.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::{AuthSettings, ClientSettings, ConnectionSettings, Protocol, RpcSettings};
