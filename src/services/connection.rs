//! Stream Connection
//!
//! Owns the lifecycle of one push-based subscription to an evaluation's
//! SSE event channel: connect, read, reconnect with bounded exponential
//! backoff, and scoped teardown. Emits parsed events over an mpsc channel
//! and connection-state transitions over a watch channel; it never touches
//! stage or category state itself.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::event::EvaluationEvent;
use crate::utils::config::ApiConfig;
use crate::utils::error::{AppError, AppResult};

/// Lifetime retry budget per session. Once spent the connection gives up
/// permanently; it is never refilled by later successes.
pub const MAX_RETRIES: u32 = 5;

/// Ceiling on the exponential backoff delay.
pub const BACKOFF_CAP_MS: u64 = 30_000;

/// Capacity of the delivered-event channel.
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Connection lifecycle state. Retry bookkeeping lives only in these
/// transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    /// First connection attempt in progress
    Connecting,
    /// Subscription live and delivering events
    Open,
    /// Transport dropped; waiting out backoff before attempt `attempt` of
    /// the lifetime budget
    Retrying { attempt: u32 },
    /// Retry budget exhausted; permanent for this session
    Failed,
    /// Torn down (consumer close or terminal event)
    Closed,
}

/// A pinned stream of parsed evaluation events.
pub type EventStream = Pin<Box<dyn Stream<Item = AppResult<EvaluationEvent>> + Send>>;

/// Producer seam for the event channel.
///
/// The real implementation speaks SSE over HTTP; tests feed synthetic
/// events without a transport.
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Open one subscription for the given evaluation id.
    async fn connect(&self, session_id: &str) -> AppResult<EventStream>;
}

/// SSE transport over reqwest.
pub struct SseTransport {
    client: reqwest::Client,
    config: ApiConfig,
}

impl SseTransport {
    /// Create a transport for the configured API origin.
    pub fn new(config: ApiConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Wrap an existing reqwest client (caller controls TLS/proxy setup).
    pub fn with_reqwest_client(client: reqwest::Client, config: ApiConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl EventTransport for SseTransport {
    async fn connect(&self, session_id: &str) -> AppResult<EventStream> {
        let url = self.config.stream_url(session_id)?;
        debug!(session_id, %url, "opening event stream");

        // Streaming reads must outlive the REST timeout.
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(15 * 60))
            .send()
            .await?;
        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Http { status, body });
        }

        let byte_stream = response.bytes_stream();
        Ok(Box::pin(parse_byte_stream_as_sse(byte_stream)))
    }
}

/// Parses a raw byte stream (from a reqwest response) into evaluation
/// events.
///
/// Buffers incoming chunks, splits on newlines, and parses `data:` lines as
/// JSON. Follows the SSE framing:
///
/// ```text
/// data: {"event_type":"stage_start","sommelier":"marcel"}
///
/// data: [DONE]
/// ```
///
/// Malformed data lines are dropped with a logged warning; one bad frame
/// must not corrupt the session.
fn parse_byte_stream_as_sse<S>(byte_stream: S) -> impl Stream<Item = AppResult<EvaluationEvent>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
{
    let state = SseParserState {
        inner: Box::pin(byte_stream),
        buffer: String::new(),
        pending_events: VecDeque::new(),
    };

    futures_util::stream::unfold(state, |mut state| async move {
        if let Some(event) = state.pending_events.pop_front() {
            return Some((event, state));
        }

        loop {
            match state.inner.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.push_str(&String::from_utf8_lossy(&chunk));

                    while let Some(pos) = state.buffer.find('\n') {
                        let line = state.buffer[..pos].to_string();
                        state.buffer = state.buffer[pos + 1..].to_string();

                        if let Some(event) = parse_sse_line(&line) {
                            state.pending_events.push_back(Ok(event));
                        }
                    }

                    if let Some(event) = state.pending_events.pop_front() {
                        return Some((event, state));
                    }
                    // No complete events yet, keep reading
                }
                Some(Err(e)) => {
                    return Some((
                        Err(AppError::network(format!("Stream read error: {}", e))),
                        state,
                    ));
                }
                None => {
                    // Stream ended; flush any unterminated final line.
                    if !state.buffer.is_empty() {
                        let remaining = std::mem::take(&mut state.buffer);
                        if let Some(event) = parse_sse_line(&remaining) {
                            return Some((Ok(event), state));
                        }
                    }
                    return None;
                }
            }
        }
    })
}

/// Internal state for the SSE byte-stream parser.
struct SseParserState {
    inner: Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>,
    buffer: String,
    pending_events: VecDeque<AppResult<EvaluationEvent>>,
}

/// Parses a single SSE line into an optional event.
///
/// Returns `None` for empty lines, comments, `[DONE]`, non-data fields, and
/// unparseable payloads (logged and dropped).
fn parse_sse_line(line: &str) -> Option<EvaluationEvent> {
    let trimmed = line.trim();

    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }

    if let Some(data) = trimmed.strip_prefix("data: ") {
        if data == "[DONE]" {
            return None;
        }
        match serde_json::from_str::<EvaluationEvent>(data) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, data, "dropping malformed stream event");
                None
            }
        }
    } else {
        // Ignore non-data SSE fields (event:, id:, retry:)
        None
    }
}

/// At most one live subscription per session, with transparent
/// reconnect-with-backoff.
pub struct StreamConnection {
    cancel: CancellationToken,
    state_rx: watch::Receiver<ConnectionState>,
}

impl StreamConnection {
    /// Begin connecting. Never blocks the caller; events and state
    /// transitions arrive over the returned channels.
    pub fn open(
        transport: Arc<dyn EventTransport>,
        session_id: impl Into<String>,
    ) -> (
        Self,
        mpsc::Receiver<EvaluationEvent>,
        watch::Receiver<ConnectionState>,
    ) {
        let session_id = session_id.into();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            run_connection(transport, session_id, event_tx, state_tx, task_cancel).await;
        });

        let connection = Self {
            cancel,
            state_rx: state_rx.clone(),
        };
        (connection, event_rx, state_rx)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Idempotent teardown: releases the transport and stops the backoff
    /// timer; no further events are delivered. Calling after a terminal
    /// state is a no-op.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Connection task: connect, pump events, back off and reconnect on
/// transport failure until the lifetime budget is spent.
async fn run_connection(
    transport: Arc<dyn EventTransport>,
    session_id: String,
    event_tx: mpsc::Sender<EvaluationEvent>,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
) {
    // The backoff exponent resets on any successful delivery; the spent
    // budget never does.
    let mut backoff_attempt: u32 = 0;
    let mut retries_spent: u32 = 0;

    loop {
        let stream = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = state_tx.send(ConnectionState::Closed);
                return;
            }
            result = transport.connect(&session_id) => result,
        };

        match stream {
            Ok(mut stream) => {
                loop {
                    let item = tokio::select! {
                        _ = cancel.cancelled() => {
                            let _ = state_tx.send(ConnectionState::Closed);
                            return;
                        }
                        item = stream.next() => item,
                    };

                    match item {
                        Some(Ok(event)) => {
                            if *state_tx.borrow() != ConnectionState::Open {
                                info!(session_id, "event stream open");
                                let _ = state_tx.send(ConnectionState::Open);
                            }
                            backoff_attempt = 0;

                            let terminal = event.is_terminal();
                            if event_tx.send(event).await.is_err() {
                                // Consumer dropped its receiver; nothing left to do.
                                let _ = state_tx.send(ConnectionState::Closed);
                                return;
                            }
                            if terminal {
                                debug!(session_id, "terminal event delivered, closing stream");
                                let _ = state_tx.send(ConnectionState::Closed);
                                return;
                            }
                        }
                        Some(Err(e)) => {
                            warn!(session_id, error = %e, "event stream read failed");
                            break;
                        }
                        None => {
                            warn!(session_id, "event stream ended before a terminal event");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(session_id, error = %e, "event stream connect failed");
            }
        }

        // Transport failure: spend one retry from the lifetime budget.
        if retries_spent >= MAX_RETRIES {
            warn!(session_id, "retry budget exhausted, giving up");
            let _ = state_tx.send(ConnectionState::Failed);
            return;
        }
        retries_spent += 1;
        backoff_attempt += 1;
        let _ = state_tx.send(ConnectionState::Retrying {
            attempt: retries_spent,
        });

        let delay = backoff_delay(backoff_attempt);
        debug!(
            session_id,
            attempt = retries_spent,
            delay_ms = delay.as_millis() as u64,
            "backing off before reconnect"
        );
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = state_tx.send(ConnectionState::Closed);
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// `min(2^attempt * 1000ms, 30000ms)`, attempt starting at 1.
fn backoff_delay(attempt: u32) -> Duration {
    let ms = 1000u64
        .saturating_mul(1u64 << attempt.min(16))
        .min(BACKOFF_CAP_MS);
    Duration::from_millis(ms)
}
