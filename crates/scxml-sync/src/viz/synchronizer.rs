//! Keeps a drawn diagram in step with a remote definition and instance.
//!
//! Everything that touches [`RenderState`] runs on one task draining one
//! inbox. Both change feeds only forward into that inbox, so an event that
//! arrives while a fetch or a graph update is awaited waits in the queue and
//! is applied afterwards, in arrival order.

use std::collections::BTreeSet;
use std::io::Write;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use scxml_client::{ApiClient, EventStreamClient, StreamOptions};
use scxml_core::{ResourceRef, StatePayload, SyncError};

use super::document::StatechartDocument;
use super::graph::{DrawnGraph, Renderer};
use super::highlight::{self, Highlight};
use crate::session::{SessionHandle, SessionHandler, SubscriptionSession};

/// Receives errors the synchronizer survives.
pub trait Reporter: Send + 'static {
    /// Called for every error the loop sees while running.
    fn report(&mut self, error: &SyncError);

    /// A change feed confirmed its subscription.
    fn connected(&mut self, _resource: &ResourceRef) {}
}

/// Writes `ERROR: ...` lines to stderr.
#[derive(Debug, Default)]
pub struct StderrReporter;

impl Reporter for StderrReporter {
    fn report(&mut self, error: &SyncError) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "ERROR: {error}");
    }
}

/// What the loop reacts to.
#[derive(Debug)]
enum SyncInput {
    Connected(ResourceRef),
    DefinitionChanged,
    Highlight(StatePayload, bool),
    SessionError(SyncError),
}

/// Forwards session callbacks into the synchronizer inbox.
struct InboxHandler {
    tx: mpsc::UnboundedSender<SyncInput>,
}

impl InboxHandler {
    fn forward(&self, input: SyncInput) {
        // The loop is gone once stopped; late events have nowhere to go.
        let _ = self.tx.send(input);
    }
}

impl SessionHandler for InboxHandler {
    fn on_connected(&mut self, resource: &ResourceRef) {
        self.forward(SyncInput::Connected(resource.clone()));
    }

    fn on_definition_changed(&mut self) {
        self.forward(SyncInput::DefinitionChanged);
    }

    fn on_state_entered(&mut self, payload: &StatePayload) {
        self.forward(SyncInput::Highlight(payload.clone(), true));
    }

    fn on_state_exited(&mut self, payload: &StatePayload) {
        self.forward(SyncInput::Highlight(payload.clone(), false));
    }

    fn on_error(&mut self, error: SyncError) {
        self.forward(SyncInput::SessionError(error));
    }
}

/// The drawn view of one definition.
#[derive(Default)]
pub struct RenderState {
    document: Option<StatechartDocument>,
    graph: Option<Box<dyn DrawnGraph>>,
    highlighted: BTreeSet<String>,
}

impl RenderState {
    /// Last document drawn successfully.
    pub fn document(&self) -> Option<&StatechartDocument> {
        self.document.as_ref()
    }

    /// Whether anything has been drawn yet.
    pub fn has_graph(&self) -> bool {
        self.graph.is_some()
    }

    /// States currently shown as active.
    pub fn highlighted(&self) -> &BTreeSet<String> {
        &self.highlighted
    }

    fn apply(&mut self, highlights: &[Highlight]) {
        let Some(graph) = self.graph.as_mut() else {
            debug!(count = highlights.len(), "no graph yet, dropping highlights");
            return;
        };
        for h in highlights {
            graph.highlight(&h.state_id, h.entering);
            if h.entering {
                let _ = self.highlighted.insert(h.state_id.clone());
            } else {
                let _ = self.highlighted.remove(&h.state_id);
            }
        }
    }
}

/// Stops a running synchronizer from elsewhere.
#[derive(Clone, Debug)]
pub struct SyncHandle {
    cancel: CancellationToken,
}

impl SyncHandle {
    /// Stop the loop and close both feeds. Results of work in flight are dropped.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether [`Self::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Drives a [`Renderer`] from a definition and, optionally, one instance.
pub struct VisualizationSynchronizer<R, P> {
    resource: ResourceRef,
    api: ApiClient,
    streams: EventStreamClient,
    renderer: R,
    reporter: P,
    state: RenderState,
    inbox_tx: mpsc::UnboundedSender<SyncInput>,
    inbox_rx: mpsc::UnboundedReceiver<SyncInput>,
    cancel: CancellationToken,
    definition_feed: Option<SessionHandle>,
    instance_feed: Option<SessionHandle>,
    seeded: bool,
}

impl<R: Renderer, P: Reporter> VisualizationSynchronizer<R, P> {
    /// Synchronizer for `resource` against the service at `api_base_url`.
    pub fn new(resource: ResourceRef, api_base_url: &str, options: StreamOptions, renderer: R, reporter: P) -> Self {
        let api = ApiClient::new(api_base_url);
        let streams = EventStreamClient::new(api_base_url, options);
        Self::with_clients(resource, api, streams, renderer, reporter)
    }

    /// Same as [`Self::new`] with prebuilt clients.
    pub fn with_clients(
        resource: ResourceRef,
        api: ApiClient,
        streams: EventStreamClient,
        renderer: R,
        reporter: P,
    ) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            resource,
            api,
            streams,
            renderer,
            reporter,
            state: RenderState::default(),
            inbox_tx,
            inbox_rx,
            cancel: CancellationToken::new(),
            definition_feed: None,
            instance_feed: None,
            seeded: false,
        }
    }

    /// Handle that stops this synchronizer once it runs.
    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            cancel: self.cancel.clone(),
        }
    }

    /// Render state so far; [`Self::run`] hands back the final one.
    pub fn state(&self) -> &RenderState {
        &self.state
    }

    /// Draw the definition and follow changes until stopped.
    ///
    /// Returns the final render state once both feeds are closed.
    pub async fn run(mut self) -> RenderState {
        info!(resource = %self.resource, "starting visualization");
        self.refresh().await;

        loop {
            let input = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                input = self.inbox_rx.recv() => input,
            };
            let Some(input) = input else { break };
            self.handle_input(input).await;
        }

        self.shutdown().await;
        self.state
    }

    async fn handle_input(&mut self, input: SyncInput) {
        match input {
            SyncInput::Connected(resource) => {
                debug!(resource = %resource, "change feed connected");
                self.reporter.connected(&resource);
            }
            SyncInput::DefinitionChanged => {
                debug!(resource = %self.resource, "definition changed, refreshing");
                self.refresh().await;
            }
            SyncInput::Highlight(payload, entering) => {
                self.state.apply(&highlight::from_payload(&payload, entering));
            }
            SyncInput::SessionError(error) => {
                warn!(error = %error, kind = error.error_kind(), "change feed ended");
                self.reporter.report(&error);
            }
        }
    }

    /// Fetch, parse and draw the definition, then make sure the feeds are
    /// open. The definition feed opens even when drawing failed so a later
    /// change can recover.
    async fn refresh(&mut self) {
        let drawn = self.redraw().await;
        if self.stopped() {
            return;
        }

        if self.definition_feed.is_none() {
            let definition = self.resource.definition_ref();
            self.definition_feed = Some(self.open_feed(definition));
        }

        if !drawn || self.resource.instance_id().is_none() {
            return;
        }
        if self.instance_feed.is_none() {
            self.instance_feed = Some(self.open_feed(self.resource.clone()));
        }
        if !self.seeded {
            self.seeded = true;
            self.seed_configuration().await;
        }
    }

    async fn redraw(&mut self) -> bool {
        let definition = self.resource.definition_ref();

        let text = match self.api.get_definition(definition.definition_name()).await {
            Ok(text) => text,
            Err(e) => return self.fail(e.into_sync_error(&definition)),
        };
        if self.stopped() {
            return false;
        }
        let document = match StatechartDocument::parse(&text) {
            Ok(doc) => doc,
            Err(e) => return self.fail(SyncError::parse(&definition, e)),
        };

        let result = match self.state.graph.as_mut() {
            Some(graph) => {
                graph.unhighlight_all();
                self.state.highlighted.clear();
                graph.update(&document).await
            }
            None => match self.renderer.render(&document).await {
                Ok(graph) => {
                    self.state.graph = Some(graph);
                    Ok(())
                }
                Err(e) => Err(e),
            },
        };
        if self.stopped() {
            return false;
        }
        if let Err(e) = result {
            return self.fail(SyncError::render(&definition, e));
        }

        debug!(resource = %definition, states = document.all_states().len(), "definition drawn");
        self.state.document = Some(document);
        if let Some(graph) = self.state.graph.as_mut() {
            graph.fit();
        }
        true
    }

    async fn seed_configuration(&mut self) {
        let Some(id) = self.resource.instance_id() else {
            return;
        };
        let configuration = match self.api.get_instance(self.resource.definition_name(), id).await {
            Ok(configuration) => configuration,
            Err(e) => {
                let _ = self.fail(e.into_sync_error(&self.resource));
                return;
            }
        };
        if self.stopped() {
            return;
        }

        let highlights: Vec<Highlight> = highlight::ids_from_configuration(&configuration)
            .into_iter()
            .map(|state_id| Highlight {
                state_id,
                entering: true,
            })
            .collect();
        debug!(resource = %self.resource, count = highlights.len(), "seeding highlights from configuration");
        self.state.apply(&highlights);
    }

    fn open_feed(&self, resource: ResourceRef) -> SessionHandle {
        let handler = InboxHandler {
            tx: self.inbox_tx.clone(),
        };
        SubscriptionSession::start(&self.streams, resource, handler)
    }

    fn fail(&mut self, error: SyncError) -> bool {
        if self.stopped() {
            debug!(error = %error, "dropping failure after stop");
            return false;
        }
        warn!(error = %error, kind = error.error_kind(), "visualization step failed");
        self.reporter.report(&error);
        false
    }

    fn stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn shutdown(&mut self) {
        for feed in [self.definition_feed.take(), self.instance_feed.take()].into_iter().flatten() {
            feed.stop();
            let _ = feed.join().await;
        }
        debug!(resource = %self.resource, "visualization stopped");
    }
}
