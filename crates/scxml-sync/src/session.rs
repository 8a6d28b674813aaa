//! Subscription sessions.
//!
//! A session owns exactly one change-stream connection for one
//! [`ResourceRef`] and routes its events to a [`SessionHandler`]. Which events
//! are legal depends on the target:
//!
//! | event               | definition target       | instance target         |
//! |---------------------|-------------------------|-------------------------|
//! | `Subscribed`        | `on_connected`          | `on_connected`          |
//! | `DefinitionChanged` | `on_definition_changed` | protocol violation      |
//! | `StateEntered`      | protocol violation      | `on_state_entered`      |
//! | `StateExited`       | protocol violation      | `on_state_exited`       |
//!
//! The first error (transport or protocol) is delivered through
//! [`SessionHandler::on_error`] and ends the session. Nothing is delivered
//! after that, or once the session task has seen [`SessionHandle::stop`].

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use scxml_client::{EventStreamClient, StreamConnection};
use scxml_core::{ChangeEvent, ChangeKind, ResourceRef, StatePayload, SyncError, TargetKind};

/// Callbacks for one session. Invoked from the session task, one at a time.
pub trait SessionHandler: Send + 'static {
    /// The server confirmed the subscription.
    fn on_connected(&mut self, resource: &ResourceRef);

    /// Definition targets only.
    fn on_definition_changed(&mut self) {}

    /// Instance targets only.
    fn on_state_entered(&mut self, _payload: &StatePayload) {}

    /// Instance targets only.
    fn on_state_exited(&mut self, _payload: &StatePayload) {}

    /// Called at most once; the session is over when this returns.
    fn on_error(&mut self, error: SyncError);
}

/// How a session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// [`SessionHandle::stop`] was called.
    Stopped,
    /// The server closed the stream and reconnecting was disabled.
    Closed,
    /// A transport error or protocol violation ended the session.
    Failed(SyncError),
}

impl SessionOutcome {
    /// `true` for [`SessionOutcome::Failed`].
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Where an event goes for a given target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Dispatch {
    Connected,
    DefinitionChanged,
    Entered(StatePayload),
    Exited(StatePayload),
    Violation(ChangeKind),
}

pub(crate) fn route(target: TargetKind, event: ChangeEvent) -> Dispatch {
    let kind = event.kind();
    match (target, event) {
        (_, ChangeEvent::Subscribed) => Dispatch::Connected,
        (TargetKind::Definition, ChangeEvent::DefinitionChanged) => Dispatch::DefinitionChanged,
        (TargetKind::Instance, ChangeEvent::StateEntered(payload)) => Dispatch::Entered(payload),
        (TargetKind::Instance, ChangeEvent::StateExited(payload)) => Dispatch::Exited(payload),
        (TargetKind::Instance, ChangeEvent::DefinitionChanged)
        | (TargetKind::Definition, ChangeEvent::StateEntered(_) | ChangeEvent::StateExited(_)) => {
            Dispatch::Violation(kind)
        }
    }
}

/// Starts sessions.
pub struct SubscriptionSession;

impl SubscriptionSession {
    /// Open the change stream for `resource` and start delivering to `handler`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<H: SessionHandler>(
        client: &EventStreamClient,
        resource: ResourceRef,
        handler: H,
    ) -> SessionHandle {
        let cancel = CancellationToken::new();
        let connection = client.open(&resource);
        debug!(resource = %resource, url = connection.url(), "starting subscription session");
        let task = tokio::spawn(run_session(connection, resource, handler, cancel.clone()));
        SessionHandle { cancel, task }
    }
}

/// Control side of a running session.
pub struct SessionHandle {
    cancel: CancellationToken,
    task: JoinHandle<SessionOutcome>,
}

impl SessionHandle {
    /// Close the connection. Once the session task sees the cancellation no
    /// further handler fires; a callback already being dispatched may finish.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the session task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to end.
    pub async fn join(self) -> SessionOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "session task did not complete");
                SessionOutcome::Stopped
            }
        }
    }

    /// Run until the session ends on its own or `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> SessionOutcome
    where
        F: Future<Output = ()>,
    {
        let cancel = self.cancel.clone();
        let mut task = self.task;
        tokio::select! {
            outcome = &mut task => outcome.unwrap_or(SessionOutcome::Stopped),
            () = shutdown => {
                cancel.cancel();
                task.await.unwrap_or(SessionOutcome::Stopped)
            }
        }
    }
}

async fn run_session<H: SessionHandler>(
    mut connection: StreamConnection,
    resource: ResourceRef,
    mut handler: H,
    cancel: CancellationToken,
) -> SessionOutcome {
    let target = resource.target();

    let outcome = loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break SessionOutcome::Stopped,
            next = connection.next_event() => next,
        };
        if cancel.is_cancelled() {
            break SessionOutcome::Stopped;
        }

        let event = match next {
            None => break SessionOutcome::Closed,
            Some(Ok(event)) => event,
            Some(Err(error)) => {
                handler.on_error(error.clone());
                break SessionOutcome::Failed(error);
            }
        };

        match route(target, event) {
            Dispatch::Connected => handler.on_connected(&resource),
            Dispatch::DefinitionChanged => handler.on_definition_changed(),
            Dispatch::Entered(payload) => handler.on_state_entered(&payload),
            Dispatch::Exited(payload) => handler.on_state_exited(&payload),
            Dispatch::Violation(kind) => {
                let reason = format!("{} endpoint", target.noun());
                let error = SyncError::protocol(&resource, kind, reason);
                warn!(resource = %resource, event = %kind, "event not valid for this endpoint");
                handler.on_error(error.clone());
                break SessionOutcome::Failed(error);
            }
        }
    };

    connection.close();
    debug!(resource = %resource, ?outcome, "subscription session ended");
    outcome
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use scxml_client::StreamOptions;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Call {
        Connected(String),
        DefinitionChanged,
        Entered(StatePayload),
        Exited(StatePayload),
        Error(SyncError),
    }

    #[derive(Clone, Default)]
    struct RecordingHandler {
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl RecordingHandler {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        fn errors(&self) -> usize {
            self.calls().iter().filter(|c| matches!(c, Call::Error(_))).count()
        }
    }

    impl SessionHandler for RecordingHandler {
        fn on_connected(&mut self, resource: &ResourceRef) {
            self.calls.lock().push(Call::Connected(resource.to_string()));
        }
        fn on_definition_changed(&mut self) {
            self.calls.lock().push(Call::DefinitionChanged);
        }
        fn on_state_entered(&mut self, payload: &StatePayload) {
            self.calls.lock().push(Call::Entered(payload.clone()));
        }
        fn on_state_exited(&mut self, payload: &StatePayload) {
            self.calls.lock().push(Call::Exited(payload.clone()));
        }
        fn on_error(&mut self, error: SyncError) {
            self.calls.lock().push(Call::Error(error));
        }
    }

    fn client(server: &MockServer) -> EventStreamClient {
        let options = StreamOptions {
            reconnect: false,
            default_retry: Duration::from_millis(10),
        };
        EventStreamClient::new(server.uri(), options)
    }

    async fn serve(server: &MockServer, at: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body.to_string()),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn routing_table() {
        let entered = ChangeEvent::StateEntered(StatePayload::Single("a".into()));
        assert_eq!(route(TargetKind::Definition, ChangeEvent::Subscribed), Dispatch::Connected);
        assert_eq!(route(TargetKind::Instance, ChangeEvent::Subscribed), Dispatch::Connected);
        assert_eq!(
            route(TargetKind::Definition, ChangeEvent::DefinitionChanged),
            Dispatch::DefinitionChanged
        );
        assert_eq!(
            route(TargetKind::Instance, entered.clone()),
            Dispatch::Entered(StatePayload::Single("a".into()))
        );
        assert_eq!(
            route(TargetKind::Instance, ChangeEvent::DefinitionChanged),
            Dispatch::Violation(ChangeKind::DefinitionChanged)
        );
        assert_eq!(
            route(TargetKind::Definition, entered),
            Dispatch::Violation(ChangeKind::StateEntered)
        );
    }

    #[test]
    fn violation_keeps_the_offending_kind() {
        let exited = ChangeEvent::StateExited(StatePayload::Single("a".into()));
        assert_eq!(
            route(TargetKind::Definition, exited),
            Dispatch::Violation(ChangeKind::StateExited)
        );
    }

    #[tokio::test]
    async fn definition_session_routes_changes() {
        let server = MockServer::start().await;
        serve(&server, "/chart1/_changes", "event: subscribed\ndata: \n\nevent: onChange\ndata: \n\n").await;

        let handler = RecordingHandler::default();
        let handle = SubscriptionSession::start(&client(&server), ResourceRef::parse("chart1"), handler.clone());

        assert_eq!(handle.join().await, SessionOutcome::Closed);
        assert_eq!(
            handler.calls(),
            vec![Call::Connected("chart1".into()), Call::DefinitionChanged]
        );
    }

    #[tokio::test]
    async fn instance_session_routes_entries_and_exits() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/chart1/inst1/_changes",
            "event: subscribed\ndata: \n\nevent: onEntry\ndata: [\"s1\",\"s2\"]\n\nevent: onExit\ndata: s1\n\n",
        )
        .await;

        let handler = RecordingHandler::default();
        let handle =
            SubscriptionSession::start(&client(&server), ResourceRef::parse("chart1/inst1"), handler.clone());

        assert_eq!(handle.join().await, SessionOutcome::Closed);
        assert_eq!(
            handler.calls(),
            vec![
                Call::Connected("chart1/inst1".into()),
                Call::Entered(StatePayload::Many(vec!["s1".into(), "s2".into()])),
                Call::Exited(StatePayload::Single("s1".into())),
            ]
        );
    }

    #[tokio::test]
    async fn definition_change_on_instance_is_a_violation_and_nothing_follows() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/chart1/inst1/_changes",
            "event: subscribed\ndata: \n\nevent: onChange\ndata: \n\nevent: onEntry\ndata: late\n\n",
        )
        .await;

        let handler = RecordingHandler::default();
        let handle =
            SubscriptionSession::start(&client(&server), ResourceRef::parse("chart1/inst1"), handler.clone());

        let outcome = handle.join().await;
        assert_matches!(
            outcome,
            SessionOutcome::Failed(SyncError::ProtocolViolation { event: ChangeKind::DefinitionChanged, .. })
        );
        let calls = handler.calls();
        assert_eq!(calls.len(), 2);
        assert_matches!(calls.last(), Some(Call::Error(_)));
        assert!(!calls.iter().any(|c| matches!(c, Call::DefinitionChanged | Call::Entered(_))));
    }

    #[tokio::test]
    async fn state_events_on_definition_are_violations() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/chart1/_changes",
            "event: subscribed\ndata: \n\nevent: onExit\ndata: a\n\nevent: onChange\ndata: \n\n",
        )
        .await;

        let handler = RecordingHandler::default();
        let handle = SubscriptionSession::start(&client(&server), ResourceRef::parse("chart1"), handler.clone());

        assert!(handle.join().await.is_failure());
        assert_eq!(handler.errors(), 1);
        assert!(!handler.calls().iter().any(|c| matches!(c, Call::Exited(_) | Call::DefinitionChanged)));
    }

    #[tokio::test]
    async fn transport_error_is_delivered_exactly_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chart1/_changes"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let handler = RecordingHandler::default();
        let handle = SubscriptionSession::start(&client(&server), ResourceRef::parse("chart1"), handler.clone());

        assert_matches!(
            handle.join().await,
            SessionOutcome::Failed(SyncError::Transport { status: Some(503), .. })
        );
        assert_eq!(handler.errors(), 1);
        assert_eq!(handler.calls().len(), 1);
    }

    #[tokio::test]
    async fn stop_ends_session_without_further_calls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chart1/_changes"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string("event: subscribed\ndata: \n\n")
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let handler = RecordingHandler::default();
        let handle = SubscriptionSession::start(&client(&server), ResourceRef::parse("chart1"), handler.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;

        handle.stop();
        assert_eq!(handle.join().await, SessionOutcome::Stopped);
        assert!(handler.calls().is_empty());
    }

    #[tokio::test]
    async fn run_until_stops_on_shutdown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chart1/_changes"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let handle = SubscriptionSession::start(
            &client(&server),
            ResourceRef::parse("chart1"),
            RecordingHandler::default(),
        );
        let outcome = handle
            .run_until(tokio::time::sleep(Duration::from_millis(20)))
            .await;
        assert_eq!(outcome, SessionOutcome::Stopped);
    }

    #[tokio::test]
    async fn exactly_one_connection_per_target() {
        let server = MockServer::start().await;
        serve(&server, "/chart1/_changes", "event: subscribed\ndata: \n\n").await;
        serve(&server, "/chart1/inst1/_changes", "event: subscribed\ndata: \n\n").await;

        let streams = client(&server);
        let a = SubscriptionSession::start(&streams, ResourceRef::parse("chart1"), RecordingHandler::default());
        let b = SubscriptionSession::start(&streams, ResourceRef::parse("chart1/inst1"), RecordingHandler::default());
        assert_eq!(a.join().await, SessionOutcome::Closed);
        assert_eq!(b.join().await, SessionOutcome::Closed);

        // `expect(1)` on each mock is verified when the server drops.
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }
}
