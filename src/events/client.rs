//! Event stream transport client.
//!
//! [`EventStreamClient`] opens the daemon's SSE endpoint and spawns a
//! background worker that owns the HTTP connection, decodes frames, and
//! forwards typed events over a channel. The worker reconnects forever after
//! the initial connect succeeds, honoring the server's `retry:` hint and
//! replaying the `Last-Event-ID` header.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::backoff::BackoffPolicy;
use crate::events::proto::VesselEvent;
use crate::events::sse::SseDecoder;
use crate::events::stores::EventRouter;

/// Default event stream endpoint of a locally running daemon.
pub const EVENTS_ENDPOINT: &str = "http://127.0.0.1:3031/events";

const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Entry point for opening event stream connections.
#[derive(Clone, Debug, Default)]
pub struct EventStreamClient {
    endpoint_override: Option<String>,
    backoff: BackoffPolicy,
}

impl EventStreamClient {
    /// Creates a client targeting the local daemon endpoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an explicit endpoint override.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        self.endpoint_override = Some(endpoint.trim().to_string());
        self
    }

    /// Replaces the reconnect backoff policy.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Opens the event stream.
    ///
    /// This spawns a background worker that owns the connection and returns
    /// once the initial request succeeds. A failure before the first
    /// successful connect is returned here; later failures are logged and
    /// retried by the worker.
    pub async fn connect(&self) -> Result<EventStream, EventStreamError> {
        let http = reqwest::Client::builder().no_proxy().build()?;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let url = self.endpoint().to_string();
        let backoff = self.backoff.clone();

        tokio::spawn(async move {
            event_stream_worker(http, url, backoff, inbound_tx, status_tx, ready_tx).await;
        });

        match ready_rx.await {
            Ok(Ok(())) => Ok(EventStream {
                receiver: inbound_rx,
                status: status_rx,
            }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(EventStreamError::Protocol(
                "event stream worker stopped before initial connect".to_string(),
            )),
        }
    }

    fn endpoint(&self) -> &str {
        self.endpoint_override.as_deref().unwrap_or(EVENTS_ENDPOINT)
    }
}

/// Connection lifecycle updates produced by the stream worker.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// Handle to an open event stream.
///
/// Events are produced by the background worker in arrival order. Use
/// [`EventStream::into_router`] to fan events out into reactive stores, or
/// [`EventStream::recv`] to consume them manually.
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<VesselEvent>,
    status: mpsc::UnboundedReceiver<ConnectionStatus>,
}

impl EventStream {
    /// Receives the next decoded event.
    pub async fn recv(&mut self) -> Option<VesselEvent> {
        self.receiver.recv().await
    }

    /// Splits into the raw event receiver and the connection status receiver.
    pub fn split_with_status(
        self,
    ) -> (
        mpsc::UnboundedReceiver<VesselEvent>,
        mpsc::UnboundedReceiver<ConnectionStatus>,
    ) {
        (self.receiver, self.status)
    }

    /// Spawns the dispatcher task and returns a router for creating stores.
    ///
    /// The dispatcher is the single writer pushing events into every store
    /// attached to the router.
    pub fn into_router(self) -> EventRouter {
        EventRouter::spawn(self.receiver)
    }
}

/// Errors produced by event stream transport handling.
#[derive(Debug, Error)]
pub enum EventStreamError {
    /// HTTP transport error.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status.
    #[error("unexpected http status {status}")]
    HttpStatus { status: StatusCode },

    /// Endpoint or worker broke the event stream contract.
    #[error("protocol error: {0}")]
    Protocol(String),
}

enum SessionEnd {
    /// Server closed the stream or the transport dropped mid-stream.
    StreamEnded,
    /// Every event receiver is gone; the worker can stop.
    ReceiversClosed,
}

async fn event_stream_worker(
    http: reqwest::Client,
    url: String,
    backoff: BackoffPolicy,
    inbound_tx: mpsc::UnboundedSender<VesselEvent>,
    status_tx: mpsc::UnboundedSender<ConnectionStatus>,
    ready_tx: oneshot::Sender<Result<(), EventStreamError>>,
) {
    let mut ready_tx = Some(ready_tx);
    let mut last_event_id: Option<String> = None;
    let mut retry_hint: Option<Duration> = None;
    let mut attempt: usize = 1;

    loop {
        match run_stream_session(
            &http,
            &url,
            &inbound_tx,
            &status_tx,
            &mut ready_tx,
            &mut last_event_id,
            &mut retry_hint,
        )
        .await
        {
            Ok(SessionEnd::ReceiversClosed) => break,
            Ok(SessionEnd::StreamEnded) => {
                let _ = status_tx.send(ConnectionStatus::Disconnected);
                attempt = 1;
            }
            Err(err) => {
                // Before the first successful connect, surface the error to
                // the caller instead of retrying.
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(Err(err));
                    return;
                }
                warn!(event = "event_stream_connect_failed", error = %err, attempt);
                let _ = status_tx.send(ConnectionStatus::Disconnected);
                attempt += 1;
            }
        }

        if inbound_tx.is_closed() {
            break;
        }

        let delay = backoff.reconnect_delay(attempt, retry_hint);
        debug!(event = "event_stream_reconnect", delay_ms = delay.as_millis() as u64);
        tokio::time::sleep(delay).await;
    }
}

async fn run_stream_session(
    http: &reqwest::Client,
    url: &str,
    inbound_tx: &mpsc::UnboundedSender<VesselEvent>,
    status_tx: &mpsc::UnboundedSender<ConnectionStatus>,
    ready_tx: &mut Option<oneshot::Sender<Result<(), EventStreamError>>>,
    last_event_id: &mut Option<String>,
    retry_hint: &mut Option<Duration>,
) -> Result<SessionEnd, EventStreamError> {
    let mut request = http.get(url).header(ACCEPT, EVENT_STREAM_CONTENT_TYPE);
    if let Some(id) = last_event_id.as_deref() {
        request = request.header("Last-Event-ID", id);
    }

    let response = request.send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(EventStreamError::HttpStatus { status });
    }

    let is_event_stream = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with(EVENT_STREAM_CONTENT_TYPE));
    if !is_event_stream {
        return Err(EventStreamError::Protocol(format!(
            "endpoint did not answer with {EVENT_STREAM_CONTENT_TYPE}"
        )));
    }

    let _ = status_tx.send(ConnectionStatus::Connected);
    if let Some(tx) = ready_tx.take() {
        let _ = tx.send(Ok(()));
    }

    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                // Mid-stream transport failures never mutate store state;
                // the reconnect loop takes over.
                warn!(event = "event_stream_broken", error = %err);
                remember_stream_state(&decoder, last_event_id, retry_hint);
                return Ok(SessionEnd::StreamEnded);
            }
        };

        for message in decoder.feed(&chunk) {
            match VesselEvent::decode(&message.event, &message.data) {
                Ok(Some(event)) => {
                    if inbound_tx.send(event).is_err() {
                        return Ok(SessionEnd::ReceiversClosed);
                    }
                }
                Ok(None) => {
                    debug!(event = "event_stream_unrecognized", name = %message.event);
                }
                Err(err) => {
                    // One bad payload only loses that message; the stream
                    // keeps going.
                    warn!(
                        event = "event_decode_failed",
                        name = %message.event,
                        error = %err,
                    );
                }
            }
        }
        remember_stream_state(&decoder, last_event_id, retry_hint);
    }

    Ok(SessionEnd::StreamEnded)
}

fn remember_stream_state(
    decoder: &SseDecoder,
    last_event_id: &mut Option<String>,
    retry_hint: &mut Option<Duration>,
) {
    if let Some(id) = decoder.last_event_id() {
        *last_event_id = Some(id.to_string());
    }
    if let Some(hint) = decoder.retry_hint() {
        *retry_hint = Some(hint);
    }
}
