//! # scxml-core
//!
//! Shared vocabulary for the scxml client crates:
//!
//! - **Resource identifiers**: [`ResourceRef`] parsed from `name` or `name/id`
//! - **Change events**: the closed [`ChangeEvent`] enumeration decoded from
//!   change streams, with [`StatePayload`] for entry/exit notifications
//! - **Errors**: the [`SyncError`] taxonomy (transport, protocol, parse, render)
//! - **Logging**: `tracing` subscriber setup and test capture helpers

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod logging;
pub mod resource;

pub use errors::SyncError;
pub use events::{ChangeEvent, ChangeKind, StatePayload};
pub use resource::{ResourceRef, TargetKind};
