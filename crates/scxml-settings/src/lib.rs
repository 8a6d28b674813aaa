//! # scxml-settings
//!
//! Configuration for the scxml client, loaded from three layers (in priority
//! order):
//! 1. **Compiled defaults**: [`ClientSettings::default()`]
//! 2. **User file**: `~/.scxml/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `SCXML_*` overrides (highest priority)
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
