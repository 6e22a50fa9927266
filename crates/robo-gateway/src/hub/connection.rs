//! Per-connection read and write loops.

use std::fmt;
use std::sync::Arc;

use axum::extract::ws::{CloseCode, CloseFrame, Message, Utf8Bytes, close_code};
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use robo_broker::Broker;
use robo_proto::Envelope;
use tokio::time::{Instant, MissedTickBehavior, timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::error::HubError;
use super::id::{ConnectionId, ConnectionState};
use super::liveness::Liveness;
use super::session::{Outbound, OutboundReceiver, Session, outbound_queue};
use crate::config::{HubConfig, MIN_PING_INTERVAL};

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent a close frame or the stream ended.
    PeerClosed,
    /// Reading from the socket failed.
    ReadFailed,
    /// The peer stayed silent past the liveness window.
    LivenessExpired,
    /// The peer sent a frame over the size limit.
    FrameTooLarge,
    /// Writing to the socket failed or timed out.
    WriteFailed,
    /// The gateway is shutting down.
    Shutdown,
    /// The shutdown grace period ran out before the connection drained.
    Aborted,
}

impl CloseReason {
    /// Lower-case name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::ReadFailed => "read_failed",
            Self::LivenessExpired => "liveness_expired",
            Self::FrameTooLarge => "frame_too_large",
            Self::WriteFailed => "write_failed",
            Self::Shutdown => "shutdown",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a finished connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSummary {
    /// The connection.
    pub id: ConnectionId,
    /// Why it ended.
    pub reason: CloseReason,
    /// Subscriptions released during teardown.
    pub released: usize,
}

/// One accepted connection and its lifecycle.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    state: ConnectionState,
    broker: Arc<Broker>,
    config: HubConfig,
    shutdown: CancellationToken,
    abort: CancellationToken,
}

impl Connection {
    /// Accept a connection. `shutdown` is the gateway-wide stop signal.
    #[must_use]
    pub fn accept(broker: Arc<Broker>, config: HubConfig, shutdown: CancellationToken) -> Self {
        let id = ConnectionId::next();
        debug!(connection_id = %id, state = %ConnectionState::Accepted, "connection accepted");
        Self {
            id,
            state: ConnectionState::Accepted,
            broker,
            config,
            shutdown,
            abort: CancellationToken::new(),
        }
    }

    /// Abandon the write loop's final flush once `abort` is cancelled.
    #[must_use]
    pub fn with_abort(mut self, abort: CancellationToken) -> Self {
        self.abort = abort;
        self
    }

    /// The connection identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    fn transition(&mut self, next: ConnectionState) {
        debug_assert!(self.state.can_transition_to(next));
        debug!(connection_id = %self.id, from = %self.state, to = %next, "connection state");
        self.state = next;
    }

    /// Run both loops until the connection ends, then tear down.
    ///
    /// The write loop runs as its own task; the read loop runs on the caller's
    /// task. Whichever finishes first cancels the other, and this returns only
    /// after both have exited and every subscription is released.
    pub async fn run<R, E, W>(mut self, mut reader: R, writer: W) -> ConnectionSummary
    where
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: fmt::Display,
        W: Sink<Message> + Unpin + Send + 'static,
        W::Error: fmt::Display,
    {
        let cancel = self.shutdown.child_token();
        let liveness = Arc::new(Liveness::new());
        let (outbound, rx) = outbound_queue(self.config.outbound_capacity);
        let mut session = Session::new(
            self.id,
            Arc::clone(&self.broker),
            outbound,
            self.config.max_subscriptions,
        );

        self.transition(ConnectionState::Active);
        info!(connection_id = %self.id, "client connected");

        let writer_task = tokio::spawn(write_loop(
            WriteContext {
                id: self.id,
                config: self.config,
                liveness: Arc::clone(&liveness),
                cancel: cancel.clone(),
                shutdown: self.shutdown.clone(),
            },
            writer,
            rx,
        ));

        let read_reason = read_loop(
            &mut reader,
            &mut session,
            &liveness,
            &cancel,
            &self.config,
        )
        .await;

        cancel.cancel();
        self.transition(ConnectionState::Closing);
        let released = session.teardown();
        drop(session);

        let mut writer_task = writer_task;
        let write_reason = tokio::select! {
            joined = &mut writer_task => match joined {
                Ok(reason) => reason,
                Err(e) => {
                    warn!(connection_id = %self.id, error = %e, "write loop panicked");
                    Some(CloseReason::WriteFailed)
                }
            },
            () = self.abort.cancelled() => {
                writer_task.abort();
                warn!(connection_id = %self.id, "write loop aborted before draining");
                Some(CloseReason::Aborted)
            }
        };
        drop(reader);

        let reason = read_reason.or(write_reason).unwrap_or(CloseReason::Shutdown);
        self.transition(ConnectionState::Closed);
        info!(connection_id = %self.id, %reason, released, "client disconnected");

        ConnectionSummary {
            id: self.id,
            reason,
            released,
        }
    }
}

/// Reads frames and feeds them to the session. Returns `None` when stopped by
/// cancellation.
async fn read_loop<R, E>(
    reader: &mut R,
    session: &mut Session,
    liveness: &Liveness,
    cancel: &CancellationToken,
    config: &HubConfig,
) -> Option<CloseReason>
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let id = session.id();
    loop {
        let deadline = liveness.deadline(config.pong_wait);
        let next = tokio::select! {
            () = cancel.cancelled() => return None,
            next = timeout_at(deadline, reader.next()) => next,
        };

        let message = match next {
            Err(_) => {
                debug!(connection_id = %id, "read deadline expired");
                return Some(CloseReason::LivenessExpired);
            }
            Ok(None) => return Some(CloseReason::PeerClosed),
            Ok(Some(Err(e))) => {
                debug!(connection_id = %id, error = %e, "read failed");
                return Some(CloseReason::ReadFailed);
            }
            Ok(Some(Ok(message))) => message,
        };
        liveness.touch();

        let result = match message {
            Message::Text(text) => {
                let text = text.as_str();
                if text.len() > config.max_frame_size {
                    return Some(reject_oversized(session, text.len(), config).await);
                }
                session.handle_text(text).await
            }
            Message::Binary(data) => {
                if data.len() > config.max_frame_size {
                    return Some(reject_oversized(session, data.len(), config).await);
                }
                session.handle_binary(&data).await
            }
            Message::Ping(_) | Message::Pong(_) => {
                trace!(connection_id = %id, "keepalive frame");
                Ok(())
            }
            Message::Close(frame) => {
                debug!(connection_id = %id, code = ?frame.map(|f| f.code), "peer sent close");
                return Some(CloseReason::PeerClosed);
            }
        };

        if result.is_err() {
            // The writer already stopped and cancelled us.
            return None;
        }
    }
}

async fn reject_oversized(session: &Session, size: usize, config: &HubConfig) -> CloseReason {
    warn!(
        connection_id = %session.id(),
        size,
        limit = config.max_frame_size,
        "oversized frame, closing connection"
    );
    if session.close(close_code::SIZE).await.is_err() {
        debug!(connection_id = %session.id(), "writer gone before close could be queued");
    }
    CloseReason::FrameTooLarge
}

struct WriteContext {
    id: ConnectionId,
    config: HubConfig,
    liveness: Arc<Liveness>,
    cancel: CancellationToken,
    shutdown: CancellationToken,
}

/// Drains the outbound queue into the socket and keeps the peer alive.
/// Returns `None` when stopped by cancellation.
async fn write_loop<W>(ctx: WriteContext, mut sink: W, mut rx: OutboundReceiver) -> Option<CloseReason>
where
    W: Sink<Message> + Unpin,
    W::Error: fmt::Display,
{
    let _cancel_on_exit = ctx.cancel.clone().drop_guard();
    let period = ctx.config.ping_interval.max(MIN_PING_INTERVAL);
    let mut ping = tokio::time::interval_at(Instant::now() + period, period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            () = ctx.cancel.cancelled() => {
                finish(&ctx, &mut sink, &mut rx).await;
                return None;
            }

            item = rx.recv() => {
                let Some(item) = item else {
                    send_close(&ctx, &mut sink, close_code::NORMAL).await;
                    return None;
                };
                let (batch, close) = collect_batch(item, &mut rx, ctx.config.max_batch);
                if let Err(e) = write_batch(&ctx, &mut sink, &batch).await {
                    warn!(connection_id = %ctx.id, error = %e, "write failed");
                    return Some(CloseReason::WriteFailed);
                }
                if let Some(code) = close {
                    send_close(&ctx, &mut sink, code).await;
                    return None;
                }
            }

            _ = ping.tick() => {
                if ctx.liveness.is_expired(ctx.config.pong_wait) {
                    debug!(connection_id = %ctx.id, "no pong within liveness window");
                    return Some(CloseReason::LivenessExpired);
                }
                let sent = timeout(ctx.config.write_timeout, sink.send(Message::Ping(Bytes::new()))).await;
                match sent {
                    Ok(Ok(())) => trace!(connection_id = %ctx.id, "ping sent"),
                    Ok(Err(e)) => {
                        warn!(connection_id = %ctx.id, error = %e, "ping failed");
                        return Some(CloseReason::WriteFailed);
                    }
                    Err(_) => {
                        warn!(connection_id = %ctx.id, "ping timed out");
                        return Some(CloseReason::WriteFailed);
                    }
                }
            }
        }
    }
}

/// Take `first` plus whatever else is already queued, up to `max` envelopes.
/// Stops early at a close request and returns its code.
fn collect_batch(
    first: Outbound,
    rx: &mut OutboundReceiver,
    max: usize,
) -> (Vec<Envelope>, Option<CloseCode>) {
    let mut batch = Vec::new();
    let mut next = Some(first);
    while let Some(item) = next.take() {
        match item {
            Outbound::Envelope(envelope) => batch.push(envelope),
            Outbound::Close(code) => return (batch, Some(code)),
        }
        if batch.len() < max {
            next = rx.try_recv().ok();
        }
    }
    (batch, None)
}

/// Feed every envelope, then flush once, all within the write deadline.
async fn write_batch<W>(ctx: &WriteContext, sink: &mut W, batch: &[Envelope]) -> Result<(), HubError>
where
    W: Sink<Message> + Unpin,
    W::Error: fmt::Display,
{
    if batch.is_empty() {
        return Ok(());
    }
    let write = async {
        for envelope in batch {
            match envelope.encode() {
                Ok(text) => sink
                    .feed(Message::Text(Utf8Bytes::from(text)))
                    .await
                    .map_err(HubError::transport)?,
                Err(e) => {
                    warn!(connection_id = %ctx.id, kind = %envelope.kind(), error = %e, "dropping unencodable envelope");
                }
            }
        }
        sink.flush().await.map_err(HubError::transport)
    };
    timeout(ctx.config.write_timeout, write)
        .await
        .map_err(|_| HubError::WriteTimeout(ctx.config.write_timeout))??;
    trace!(connection_id = %ctx.id, frames = batch.len(), "batch flushed");
    Ok(())
}

/// Stop accepting deliveries, flush what is queued, and close the socket.
async fn finish<W>(ctx: &WriteContext, sink: &mut W, rx: &mut OutboundReceiver)
where
    W: Sink<Message> + Unpin,
    W::Error: fmt::Display,
{
    rx.close();
    let mut code = if ctx.shutdown.is_cancelled() {
        close_code::AWAY
    } else {
        close_code::NORMAL
    };

    let mut pending = Vec::new();
    while let Ok(item) = rx.try_recv() {
        match item {
            Outbound::Envelope(envelope) => pending.push(envelope),
            Outbound::Close(requested) => {
                code = requested;
                break;
            }
        }
    }

    if !pending.is_empty() {
        debug!(connection_id = %ctx.id, pending = pending.len(), "flushing queued messages");
        for chunk in pending.chunks(ctx.config.max_batch) {
            if let Err(e) = write_batch(ctx, sink, chunk).await {
                debug!(connection_id = %ctx.id, error = %e, "flush on close failed");
                return;
            }
        }
    }
    send_close(ctx, sink, code).await;
}

async fn send_close<W>(ctx: &WriteContext, sink: &mut W, code: CloseCode)
where
    W: Sink<Message> + Unpin,
    W::Error: fmt::Display,
{
    let frame = Message::Close(Some(CloseFrame {
        code,
        reason: Utf8Bytes::from_static(""),
    }));
    match timeout(ctx.config.write_timeout, sink.send(frame)).await {
        Ok(Ok(())) => trace!(connection_id = %ctx.id, code, "close sent"),
        Ok(Err(e)) => debug!(connection_id = %ctx.id, error = %e, "close frame not sent"),
        Err(_) => debug!(connection_id = %ctx.id, "close frame timed out"),
    }
}
