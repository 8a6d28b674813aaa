//! Layout capability seams.
//!
//! The synchronizer never draws anything itself. It hands documents to a
//! [`Renderer`] and drives the resulting [`DrawnGraph`].

use async_trait::async_trait;

use super::document::StatechartDocument;

/// The layout capability rejected a document or an update.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct RenderFailure(pub String);

/// A document that has been drawn and can be updated in place.
#[async_trait]
pub trait DrawnGraph: Send {
    /// Mark `state_id` active (`entering`) or inactive.
    fn highlight(&mut self, state_id: &str, entering: bool);

    /// Clear every highlight.
    fn unhighlight_all(&mut self);

    /// Move to a new document keeping view state. Highlights must not be
    /// applied until this has resolved.
    async fn update(&mut self, document: &StatechartDocument) -> Result<(), RenderFailure>;

    /// Re-fit the view to the drawn content.
    fn fit(&mut self);
}

/// Produces a [`DrawnGraph`] for a document.
#[async_trait]
pub trait Renderer: Send {
    async fn render(&mut self, document: &StatechartDocument) -> Result<Box<dyn DrawnGraph>, RenderFailure>;
}
