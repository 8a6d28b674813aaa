//! # scxml-sync
//!
//! Consumers of change streams:
//! - [`session`]: [`SubscriptionSession`] routes one resource's change events
//!   to a [`SessionHandler`] and owns the connection's lifetime
//! - [`console`]: [`ConsoleSubscriber`] prints one line per event
//! - [`viz`]: [`VisualizationSynchronizer`] keeps a drawn diagram in step
//!   with a definition and, optionally, one of its instances

#![deny(unsafe_code)]

pub mod console;
pub mod session;
pub mod viz;

pub use console::ConsoleSubscriber;
pub use session::{SessionHandle, SessionHandler, SessionOutcome, SubscriptionSession};
pub use viz::{
    DrawnGraph, RenderFailure, Renderer, Reporter, StatechartDocument, SyncHandle, TextRenderer,
    VisualizationSynchronizer,
};
