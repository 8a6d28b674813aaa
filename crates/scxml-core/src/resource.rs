//! Resource identifiers.
//!
//! Every command and subscription addresses either a statechart definition
//! (`name`) or a running instance of one (`name/id`). The slash is the only
//! discriminator; no other validation is applied.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which kind of remote resource a [`ResourceRef`] points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// A statechart definition.
    Definition,
    /// A running instance of a definition.
    Instance,
}

impl TargetKind {
    /// Human-readable noun used in console output ("statechart" / "instance").
    pub fn noun(self) -> &'static str {
        match self {
            Self::Definition => "statechart",
            Self::Instance => "instance",
        }
    }
}

/// A definition name, optionally paired with an instance id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    definition_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    instance_id: Option<String>,
}

impl ResourceRef {
    /// Reference a statechart definition.
    pub fn definition(name: impl Into<String>) -> Self {
        Self {
            definition_name: name.into(),
            instance_id: None,
        }
    }

    /// Reference a running instance of a definition.
    pub fn instance(name: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            definition_name: name.into(),
            instance_id: Some(instance_id.into()),
        }
    }

    /// Parse `name` or `name/id`.
    ///
    /// Anything after a second slash is ignored, and an empty instance part
    /// (`name/`) is treated as absent.
    pub fn parse(identifier: &str) -> Self {
        let mut parts = identifier.split('/');
        let name = parts.next().unwrap_or_default();
        match parts.next().filter(|id| !id.is_empty()) {
            Some(id) => Self::instance(name, id),
            None => Self::definition(name),
        }
    }

    /// Name of the definition, also for instance refs.
    pub fn definition_name(&self) -> &str {
        &self.definition_name
    }

    /// Instance id, absent for definition refs.
    pub fn instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref()
    }

    /// Which endpoint family this ref addresses.
    pub fn target(&self) -> TargetKind {
        if self.instance_id.is_some() {
            TargetKind::Instance
        } else {
            TargetKind::Definition
        }
    }

    /// The definition this resource belongs to (itself, for a definition).
    pub fn definition_ref(&self) -> Self {
        Self::definition(self.definition_name.clone())
    }

    /// Path of the resource relative to the API base: `name` or `name/id`.
    pub fn resource_path(&self) -> String {
        self.to_string()
    }

    /// Path of the change-notification endpoint relative to the API base.
    pub fn changes_path(&self) -> String {
        format!("{self}/_changes")
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance_id {
            Some(id) => write!(f, "{}/{id}", self.definition_name),
            None => f.write_str(&self.definition_name),
        }
    }
}

impl FromStr for ResourceRef {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for ResourceRef {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}
