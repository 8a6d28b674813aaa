use std::fmt;

use crate::events::ChangeKind;
use crate::resource::ResourceRef;

/// Errors surfaced by change subscriptions and the visualization loop.
///
/// Transport errors and protocol violations end the session they occur on.
/// Parse and render errors are reported and the caller keeps going.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    // Terminal for the owning session
    /// The stream or request failed.
    #[error("transport error on {resource}: {message}")]
    Transport {
        resource: String,
        /// HTTP status when the server answered.
        status: Option<u16>,
        message: String,
    },
    /// An event arrived on an endpoint that never sends it.
    #[error("protocol violation on {resource}: unexpected `{event}` ({reason})")]
    ProtocolViolation {
        resource: String,
        event: ChangeKind,
        reason: String,
    },

    // Reported, never terminal
    /// A document or payload did not parse.
    #[error("parse error for {resource}: {message}")]
    Parse { resource: String, message: String },
    /// The renderer rejected a document.
    #[error("render error for {resource}: {message}")]
    Render { resource: String, message: String },
}

impl SyncError {
    /// A transport failure with no HTTP status.
    pub fn transport(resource: &ResourceRef, message: impl fmt::Display) -> Self {
        Self::Transport {
            resource: resource.to_string(),
            status: None,
            message: message.to_string(),
        }
    }

    /// A non-2xx response.
    pub fn from_status(resource: &ResourceRef, status: u16, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            format!("unexpected status {status}")
        } else {
            format!("unexpected status {status}: {body}")
        };
        Self::Transport {
            resource: resource.to_string(),
            status: Some(status),
            message,
        }
    }

    /// An `event` that `resource`'s endpoint must not send.
    pub fn protocol(resource: &ResourceRef, event: ChangeKind, reason: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            resource: resource.to_string(),
            event,
            reason: reason.into(),
        }
    }

    /// A document or payload for `resource` did not parse.
    pub fn parse(resource: &ResourceRef, message: impl fmt::Display) -> Self {
        Self::Parse {
            resource: resource.to_string(),
            message: message.to_string(),
        }
    }

    /// The renderer rejected the document for `resource`.
    pub fn render(resource: &ResourceRef, message: impl fmt::Display) -> Self {
        Self::Render {
            resource: resource.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether this error ends the session it was raised on.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::ProtocolViolation { .. })
    }

    /// The resource identifier the error refers to.
    pub fn resource(&self) -> &str {
        match self {
            Self::Transport { resource, .. }
            | Self::ProtocolViolation { resource, .. }
            | Self::Parse { resource, .. }
            | Self::Render { resource, .. } => resource,
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport_error",
            Self::ProtocolViolation { .. } => "protocol_violation",
            Self::Parse { .. } => "parse_error",
            Self::Render { .. } => "render_error",
        }
    }
}
