//! Plain-text rendering of a statechart for terminals.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::io::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::document::{StateKind, StateNode, StatechartDocument};
use super::graph::{DrawnGraph, RenderFailure, Renderer};

/// Receives every redrawn frame.
pub type FrameSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Draws the state tree as indented text, active states marked with `*`.
pub struct TextRenderer {
    sink: FrameSink,
}

impl TextRenderer {
    /// Renderer handing every frame to `sink`.
    pub fn new(sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self { sink: Arc::new(sink) }
    }

    /// Renderer printing frames to stdout.
    pub fn stdout() -> Self {
        Self::new(|frame| {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{frame}");
            let _ = out.flush();
        })
    }
}

#[async_trait]
impl Renderer for TextRenderer {
    async fn render(&mut self, document: &StatechartDocument) -> Result<Box<dyn DrawnGraph>, RenderFailure> {
        check_drawable(document)?;
        Ok(Box::new(TextGraph {
            document: document.clone(),
            active: BTreeSet::new(),
            sink: Arc::clone(&self.sink),
        }))
    }
}

struct TextGraph {
    document: StatechartDocument,
    active: BTreeSet<String>,
    sink: FrameSink,
}

impl TextGraph {
    fn redraw(&self) {
        (self.sink)(&draw(&self.document, &self.active));
    }
}

#[async_trait]
impl DrawnGraph for TextGraph {
    fn highlight(&mut self, state_id: &str, entering: bool) {
        if !self.document.contains(state_id) {
            debug!(state_id, "highlight for a state not in the drawn document");
            return;
        }
        let changed = if entering {
            self.active.insert(state_id.to_string())
        } else {
            self.active.remove(state_id)
        };
        if changed {
            self.redraw();
        }
    }

    fn unhighlight_all(&mut self) {
        if !self.active.is_empty() {
            self.active.clear();
            self.redraw();
        }
    }

    async fn update(&mut self, document: &StatechartDocument) -> Result<(), RenderFailure> {
        check_drawable(document)?;
        self.document = document.clone();
        self.active.retain(|id| document.contains(id));
        Ok(())
    }

    fn fit(&mut self) {
        self.redraw();
    }
}

fn check_drawable(document: &StatechartDocument) -> Result<(), RenderFailure> {
    if document.states().is_empty() {
        return Err(RenderFailure("document has no states to draw".into()));
    }
    Ok(())
}

/// One frame: a header line, then one line per state and per transition.
pub fn draw(document: &StatechartDocument, active: &BTreeSet<String>) -> String {
    let mut out = String::from(document.name().unwrap_or("statechart"));
    if let Some(initial) = document.initial() {
        let _ = write!(out, " (initial: {initial})");
    }
    out.push('\n');
    for state in document.states() {
        draw_state(&mut out, state, active, 1);
    }
    out
}

fn draw_state(out: &mut String, state: &StateNode, active: &BTreeSet<String>, depth: usize) {
    let indent = "  ".repeat(depth);
    let is_active = state.id.as_ref().is_some_and(|id| active.contains(id));
    let mark = if is_active { '*' } else { '-' };
    let label = state.id.as_deref().unwrap_or("(anonymous)");

    let _ = write!(out, "{indent}{mark} {label}");
    if state.kind != StateKind::State {
        let _ = write!(out, " [{}]", state.kind);
    }
    if let Some(initial) = &state.initial {
        let _ = write!(out, " (initial: {initial})");
    }
    out.push('\n');

    for t in &state.transitions {
        let event = t.event.as_deref().unwrap_or("(eventless)");
        let _ = write!(out, "{indent}    {event} -> {}", t.targets.join(" "));
        if let Some(cond) = &t.cond {
            let _ = write!(out, " [{cond}]");
        }
        out.push('\n');
    }

    for child in &state.children {
        draw_state(out, child, active, depth + 1);
    }
}
