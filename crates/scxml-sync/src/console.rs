//! Line-per-event console output for `subscribe`.

use std::io::{self, Stderr, Stdout, Write};

use scxml_client::EventStreamClient;
use scxml_core::{ResourceRef, StatePayload, SyncError, TargetKind};

use crate::session::{SessionHandle, SessionHandler, SubscriptionSession};

/// Prints session events as status lines and errors to a separate stream.
pub struct ConsoleSubscriber<O, E> {
    target: TargetKind,
    out: O,
    err: E,
}

impl ConsoleSubscriber<Stdout, Stderr> {
    /// Status lines to stdout, errors to stderr.
    pub fn stdio(resource: &ResourceRef) -> Self {
        Self::new(resource, io::stdout(), io::stderr())
    }
}

impl<O, E> ConsoleSubscriber<O, E>
where
    O: Write + Send + 'static,
    E: Write + Send + 'static,
{
    /// The confirmation wording is fixed here from the resource target.
    pub fn new(resource: &ResourceRef, out: O, err: E) -> Self {
        Self {
            target: resource.target(),
            out,
            err,
        }
    }

    /// Start a session for `resource` printing through this subscriber.
    pub fn attach(self, client: &EventStreamClient, resource: ResourceRef) -> SessionHandle {
        SubscriptionSession::start(client, resource, self)
    }

    fn line(&mut self, text: &str) {
        let _ = writeln!(self.out, "{text}");
        let _ = self.out.flush();
    }
}

impl<O, E> SessionHandler for ConsoleSubscriber<O, E>
where
    O: Write + Send + 'static,
    E: Write + Send + 'static,
{
    fn on_connected(&mut self, _resource: &ResourceRef) {
        let text = format!("Started listening to {} changes", self.target.noun());
        self.line(&text);
    }

    fn on_definition_changed(&mut self) {
        self.line("Statechart changed");
    }

    fn on_state_entered(&mut self, payload: &StatePayload) {
        self.line(&format!("onEntry - {payload}"));
    }

    fn on_state_exited(&mut self, payload: &StatePayload) {
        self.line(&format!("onExit - {payload}"));
    }

    fn on_error(&mut self, error: SyncError) {
        let _ = writeln!(self.err, "ERROR: Error listening to the {}: {error}", self.target.noun());
        let _ = self.err.flush();
    }
}
