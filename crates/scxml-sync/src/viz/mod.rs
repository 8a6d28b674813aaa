//! Live diagram synchronization for `view`.
//!
//! - [`document`]: owned SCXML state tree
//! - [`graph`]: the [`Renderer`] / [`DrawnGraph`] layout seam
//! - [`highlight`]: payload and configuration resolution to highlight calls
//! - [`text`]: terminal renderer
//! - [`synchronizer`]: the single-inbox loop tying it together

pub mod document;
pub mod graph;
pub mod highlight;
pub mod synchronizer;
pub mod text;

pub use document::{DocumentError, StateKind, StateNode, StatechartDocument, Transition};
pub use graph::{DrawnGraph, RenderFailure, Renderer};
pub use highlight::Highlight;
pub use synchronizer::{RenderState, Reporter, StderrReporter, SyncHandle, VisualizationSynchronizer};
pub use text::TextRenderer;
