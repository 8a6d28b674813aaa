//! Change events decoded from a change stream.
//!
//! The remote service pushes four event names. Each maps to exactly one
//! [`ChangeEvent`] variant; any other name is not a change event at all and
//! [`ChangeEvent::from_frame`] returns `None` for it.
//!
//! | wire name    | variant                          | endpoint   |
//! |--------------|----------------------------------|------------|
//! | `subscribed` | [`ChangeEvent::Subscribed`]        | both       |
//! | `onChange`   | [`ChangeEvent::DefinitionChanged`] | definition |
//! | `onEntry`    | [`ChangeEvent::StateEntered`]      | instance   |
//! | `onExit`     | [`ChangeEvent::StateExited`]       | instance   |

use std::fmt;

use serde::{Deserialize, Serialize};

/// Payload-free discriminant of a [`ChangeEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// The server accepted the subscription.
    Subscribed,
    /// The definition document was replaced.
    DefinitionChanged,
    /// The instance entered one or more states.
    StateEntered,
    /// The instance exited one or more states.
    StateExited,
}

impl ChangeKind {
    /// Map a wire event name to its kind.
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "subscribed" => Some(Self::Subscribed),
            "onChange" => Some(Self::DefinitionChanged),
            "onEntry" => Some(Self::StateEntered),
            "onExit" => Some(Self::StateExited),
            _ => None,
        }
    }

    /// The wire event name for this kind.
    pub fn event_name(self) -> &'static str {
        match self {
            Self::Subscribed => "subscribed",
            Self::DefinitionChanged => "onChange",
            Self::StateEntered => "onEntry",
            Self::StateExited => "onExit",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

/// State identifiers carried by an entry or exit notification.
///
/// Compound and parallel entries are reported as a list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatePayload {
    /// A single state identifier.
    Single(String),
    /// Several identifiers, in the order the server reported them.
    Many(Vec<String>),
}

impl StatePayload {
    /// Decode an `onEntry`/`onExit` data field.
    ///
    /// A JSON list of strings becomes [`StatePayload::Many`], a JSON string or
    /// a bare identifier becomes [`StatePayload::Single`]. Anything that looks
    /// like a list but does not decode is kept verbatim as a single payload.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if trimmed.starts_with('[') {
            return match serde_json::from_str::<Vec<String>>(trimmed) {
                Ok(ids) => Self::Many(ids),
                Err(_) => Self::Single(raw.to_string()),
            };
        }

        if trimmed.starts_with('"') {
            if let Ok(id) = serde_json::from_str::<String>(trimmed) {
                return Self::Single(id);
            }
        }

        Self::Single(trimmed.to_string())
    }

    /// The identifiers in order.
    pub fn ids(&self) -> &[String] {
        match self {
            Self::Single(id) => std::slice::from_ref(id),
            Self::Many(ids) => ids,
        }
    }
}

impl fmt::Display for StatePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(id) => f.write_str(id),
            Self::Many(ids) => {
                let encoded = serde_json::to_string(ids).map_err(|_| fmt::Error)?;
                f.write_str(&encoded)
            }
        }
    }
}

/// A typed change notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeEvent {
    /// The server accepted the subscription.
    Subscribed,
    /// The definition document was replaced.
    DefinitionChanged,
    /// The instance entered the given states.
    StateEntered(StatePayload),
    /// The instance exited the given states.
    StateExited(StatePayload),
}

impl ChangeEvent {
    /// Decode a stream frame by event name and data.
    ///
    /// Returns `None` for event names that are not change events. Payloads of
    /// `subscribed` and `onChange` are ignored.
    pub fn from_frame(event_name: &str, data: &str) -> Option<Self> {
        let kind = ChangeKind::from_event_name(event_name)?;
        Some(match kind {
            ChangeKind::Subscribed => Self::Subscribed,
            ChangeKind::DefinitionChanged => Self::DefinitionChanged,
            ChangeKind::StateEntered => Self::StateEntered(StatePayload::parse(data)),
            ChangeKind::StateExited => Self::StateExited(StatePayload::parse(data)),
        })
    }

    /// Kind without the payload.
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Subscribed => ChangeKind::Subscribed,
            Self::DefinitionChanged => ChangeKind::DefinitionChanged,
            Self::StateEntered(_) => ChangeKind::StateEntered,
            Self::StateExited(_) => ChangeKind::StateExited,
        }
    }

    /// The entry/exit payload, if any.
    pub fn payload(&self) -> Option<&StatePayload> {
        match self {
            Self::StateEntered(p) | Self::StateExited(p) => Some(p),
            Self::Subscribed | Self::DefinitionChanged => None,
        }
    }
}
