//! # scxml-client
//!
//! Network side of the scxml client:
//! - [`sse`]: Server-Sent-Events frame decoder (line buffering, `retry:`
//!   and `id:` tracking, split-chunk handling)
//! - [`stream`]: [`EventStreamClient`] turning one change endpoint into a
//!   sequence of typed [`ChangeEvent`](scxml_core::ChangeEvent)s
//! - [`api`]: thin REST client for definitions and instances

#![deny(unsafe_code)]

pub mod api;
pub mod sse;
pub mod stream;

pub use api::{ApiClient, ApiError, InstanceEvent};
pub use stream::{ConnectionState, EventStreamClient, StreamConnection, StreamOptions};
