//! Owned SCXML document model.
//!
//! Only the structure a diagram needs is kept: the state tree, initial
//! states and transitions. Executable content is ignored.

use std::fmt;

/// Why a definition text could not be used.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// Not well-formed XML.
    #[error("malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    /// Well-formed, but the root is some other element.
    #[error("root element is <{0}>, expected <scxml>")]
    NotScxml(String),
}

/// Element a state came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateKind {
    /// `<state>`
    State,
    /// `<parallel>`
    Parallel,
    /// `<final>`
    Final,
    /// `<history>`
    History,
}

impl StateKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "state" => Some(Self::State),
            "parallel" => Some(Self::Parallel),
            "final" => Some(Self::Final),
            "history" => Some(Self::History),
            _ => None,
        }
    }

    /// Element name.
    pub fn tag(self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Parallel => "parallel",
            Self::Final => "final",
            Self::History => "history",
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A `<transition>` element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    /// Triggering event; `None` for eventless transitions.
    pub event: Option<String>,
    /// Guard expression, kept as written.
    pub cond: Option<String>,
    /// Target state ids, split on whitespace.
    pub targets: Vec<String>,
}

/// One state and its subtree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateNode {
    /// `None` for states the author left anonymous.
    pub id: Option<String>,
    /// Element the state was declared with.
    pub kind: StateKind,
    /// `initial` attribute or `<initial>` child target.
    pub initial: Option<String>,
    /// Outgoing transitions in document order.
    pub transitions: Vec<Transition>,
    /// Nested states in document order.
    pub children: Vec<StateNode>,
}

impl StateNode {
    fn walk<'a>(&'a self, out: &mut Vec<&'a StateNode>) {
        out.push(self);
        for child in &self.children {
            child.walk(out);
        }
    }
}

/// A parsed statechart definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatechartDocument {
    name: Option<String>,
    initial: Option<String>,
    states: Vec<StateNode>,
}

impl StatechartDocument {
    /// Parse an SCXML document. The root must be `<scxml>`.
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        let doc = roxmltree::Document::parse(text)?;
        let root = doc.root_element();
        let tag = root.tag_name().name();
        if tag != "scxml" {
            return Err(DocumentError::NotScxml(tag.to_string()));
        }

        Ok(Self {
            name: root.attribute("name").map(String::from),
            initial: initial_of(root),
            states: children_of(root),
        })
    }

    /// `name` attribute of the root.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Initial state of the root.
    pub fn initial(&self) -> Option<&str> {
        self.initial.as_deref()
    }

    /// Top-level states.
    pub fn states(&self) -> &[StateNode] {
        &self.states
    }

    /// Every state, depth first in document order.
    pub fn all_states(&self) -> Vec<&StateNode> {
        let mut out = Vec::new();
        for state in &self.states {
            state.walk(&mut out);
        }
        out
    }

    /// Ids of [`Self::all_states`], anonymous states skipped.
    pub fn state_ids(&self) -> Vec<&str> {
        self.all_states()
            .into_iter()
            .filter_map(|s| s.id.as_deref())
            .collect()
    }

    /// State with the given id, searching the whole tree.
    pub fn find(&self, id: &str) -> Option<&StateNode> {
        self.all_states()
            .into_iter()
            .find(|s| s.id.as_deref() == Some(id))
    }

    /// Whether a state with this id exists anywhere in the tree.
    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }
}

fn children_of(node: roxmltree::Node<'_, '_>) -> Vec<StateNode> {
    node.children()
        .filter(roxmltree::Node::is_element)
        .filter_map(|child| {
            let kind = StateKind::from_tag(child.tag_name().name())?;
            Some(StateNode {
                id: child.attribute("id").map(String::from),
                kind,
                initial: initial_of(child),
                transitions: transitions_of(child),
                children: children_of(child),
            })
        })
        .collect()
}

/// `initial` attribute, or the target of an `<initial>` child's transition.
fn initial_of(node: roxmltree::Node<'_, '_>) -> Option<String> {
    if let Some(initial) = node.attribute("initial") {
        return Some(initial.to_string());
    }
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == "initial")
        .and_then(|init| init.children().find(|c| c.tag_name().name() == "transition"))
        .and_then(|t| t.attribute("target"))
        .map(String::from)
}

fn transitions_of(node: roxmltree::Node<'_, '_>) -> Vec<Transition> {
    node.children()
        .filter(|c| c.is_element() && c.tag_name().name() == "transition")
        .map(|t| Transition {
            event: t.attribute("event").map(String::from),
            cond: t.attribute("cond").map(String::from),
            targets: t
                .attribute("target")
                .map(|targets| targets.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
        })
        .collect()
}
