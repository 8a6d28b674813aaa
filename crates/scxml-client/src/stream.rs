//! Change-stream connections.
//!
//! [`EventStreamClient::open`] returns a lazy [`StreamConnection`]; the HTTP
//! request is issued on the first [`StreamConnection::next_event`] call.
//!
//! Lifecycle:
//!
//! ```text
//! Connecting ──subscribed──▶ Open ──transport error──▶ Error
//!     │                        │
//!     └─other event─▶ Error    └──clean EOF──▶ Connecting (reconnect) | Closed
//! ```
//!
//! Reconnection only follows a clean end of the response body. The delay is
//! the server's latest `retry:` hint (or [`StreamOptions::default_retry`]) and
//! the request carries `Last-Event-ID` when the server sent ids. A reconnected
//! stream has to confirm `subscribed` again before it is `Open`. Transport
//! errors are never retried.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tracing::{debug, instrument, warn};

use scxml_core::{ChangeEvent, ResourceRef, SyncError};
use scxml_settings::StreamSettings;

use crate::sse::{FrameDecoder, SseFrame};

const LAST_EVENT_ID: &str = "Last-Event-ID";

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Transport options for change streams.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamOptions {
    /// Reconnect after the server closes the stream cleanly.
    pub reconnect: bool,
    /// Delay before reconnecting until the server sends a `retry:` hint.
    pub default_retry: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self::from(&StreamSettings::default())
    }
}

impl From<&StreamSettings> for StreamOptions {
    fn from(settings: &StreamSettings) -> Self {
        Self {
            reconnect: settings.reconnect,
            default_retry: settings.retry_delay(),
        }
    }
}

/// Lifecycle state of a [`StreamConnection`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Request in flight, or response open but `subscribed` not yet seen.
    Connecting,
    /// `subscribed` observed; change events are flowing.
    Open,
    /// Terminal failure. No further events.
    Error,
    /// Closed by the caller or by the server with reconnect disabled.
    Closed,
}

impl ConnectionState {
    /// `Error` or `Closed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Error | Self::Closed)
    }
}

/// Opens change streams against one API base URL.
#[derive(Clone, Debug)]
pub struct EventStreamClient {
    http: reqwest::Client,
    base_url: String,
    options: StreamOptions,
}

impl EventStreamClient {
    /// Streams under `base_url` with a default HTTP client.
    pub fn new(base_url: impl Into<String>, options: StreamOptions) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, options)
    }

    /// Same as [`EventStreamClient::new`] with a caller-built HTTP client.
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>, options: StreamOptions) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            options,
        }
    }

    /// Reconnect behaviour applied to every connection.
    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    /// Full URL of the change endpoint for `resource`.
    pub fn changes_url(&self, resource: &ResourceRef) -> String {
        format!("{}/{}", self.base_url, resource.changes_path())
    }

    /// Prepare a connection to the change endpoint of `resource`.
    pub fn open(&self, resource: &ResourceRef) -> StreamConnection {
        StreamConnection {
            http: self.http.clone(),
            url: self.changes_url(resource),
            resource: resource.clone(),
            options: self.options.clone(),
            state: ConnectionState::Connecting,
            body: None,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
        }
    }
}

/// One server-push connection to a single resource.
pub struct StreamConnection {
    http: reqwest::Client,
    url: String,
    resource: ResourceRef,
    options: StreamOptions,
    state: ConnectionState,
    body: Option<ByteStream>,
    decoder: FrameDecoder,
    pending: VecDeque<SseFrame>,
}

impl StreamConnection {
    /// The `_changes` URL this connection reads.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Resource this connection follows.
    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Delay the transport waits before reconnecting.
    pub fn retry_delay(&self) -> Duration {
        self.decoder.retry().unwrap_or(self.options.default_retry)
    }

    /// Drop the response body and stop producing events.
    pub fn close(&mut self) {
        self.body = None;
        self.pending.clear();
        if !self.state.is_terminal() {
            self.state = ConnectionState::Closed;
        }
    }

    /// Next typed event.
    ///
    /// Returns `Some(Err(_))` exactly once when the connection fails, then
    /// `None` forever. Unrecognized event names are skipped. Cancel-safe: a
    /// dropped call loses no decoded frame.
    pub async fn next_event(&mut self) -> Option<Result<ChangeEvent, SyncError>> {
        loop {
            if self.state.is_terminal() {
                return None;
            }

            if let Some(frame) = self.pending.pop_front() {
                match self.accept(&frame) {
                    Some(item) => return Some(item),
                    None => continue,
                }
            }

            let Some(body) = self.body.as_mut() else {
                match self.connect().await {
                    Ok(body) => self.body = Some(body),
                    Err(e) => return Some(Err(self.fail(e))),
                }
                continue;
            };

            match body.next().await {
                Some(Ok(chunk)) => {
                    let frames = self.decoder.feed(&chunk);
                    self.pending.extend(frames);
                }
                Some(Err(e)) => {
                    let err = SyncError::transport(&self.resource, format!("stream read failed: {e}"));
                    return Some(Err(self.fail(err)));
                }
                None => {
                    self.body = None;
                    self.decoder.reset();
                    if !self.options.reconnect {
                        debug!(resource = %self.resource, "change stream ended");
                        self.state = ConnectionState::Closed;
                        return None;
                    }
                    let delay = self.retry_delay();
                    debug!(resource = %self.resource, delay_ms = delay.as_millis(), "change stream ended, reconnecting");
                    self.state = ConnectionState::Connecting;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    #[instrument(skip(self), fields(resource = %self.resource))]
    async fn connect(&mut self) -> Result<ByteStream, SyncError> {
        debug!(url = %self.url, "opening change stream");

        let mut req = self
            .http
            .get(&self.url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        if let Some(id) = self.decoder.last_event_id() {
            req = req.header(LAST_EVENT_ID, id);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| SyncError::transport(&self.resource, e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::from_status(&self.resource, status, &body));
        }

        Ok(Box::pin(resp.bytes_stream()))
    }

    fn accept(&mut self, frame: &SseFrame) -> Option<Result<ChangeEvent, SyncError>> {
        let Some(event) = ChangeEvent::from_frame(frame.event_name(), &frame.data) else {
            debug!(resource = %self.resource, event = frame.event_name(), "dropping unrecognized event");
            return None;
        };

        match (self.state, &event) {
            (ConnectionState::Connecting, ChangeEvent::Subscribed) => {
                debug!(resource = %self.resource, "subscribed");
                self.state = ConnectionState::Open;
                Some(Ok(event))
            }
            (ConnectionState::Connecting, other) => {
                let err = SyncError::protocol(&self.resource, other.kind(), "received before `subscribed`");
                Some(Err(self.fail(err)))
            }
            _ => Some(Ok(event)),
        }
    }

    fn fail(&mut self, error: SyncError) -> SyncError {
        warn!(resource = %self.resource, error = %error, kind = error.error_kind(), "change stream failed");
        self.state = ConnectionState::Error;
        self.body = None;
        self.pending.clear();
        error
    }
}
