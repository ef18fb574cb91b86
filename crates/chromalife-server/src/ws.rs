//! `WebSocket` transport boundary.
//!
//! Clients connect to `GET /` and are upgraded to a `WebSocket`. Each
//! connection is split in two:
//!
//! - a writer task draining the connection's bounded outbound queue into
//!   the socket, giving up on the first write that fails or exceeds the
//!   configured send timeout;
//! - the reader loop below, which parses client commands and feeds
//!   accepted submissions through the [`InputGate`](chromalife_core::gate::InputGate).
//!
//! The registry holds the only strong sender for the queue; the reader
//! replies through a weak one. Pruning therefore closes the queue, the
//! writer sends a close frame and exits, and the reader stops with it.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use chromalife_core::gate::RateLimiter;
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::command::{Command, PONG};
use crate::registry::{ClientHandle, ClientSink, ClientTx, Outbound};
use crate::state::{AppState, now};

/// Acknowledgement for a message with an unsupported `type`.
pub const INVALID_REQUEST: &str = "invalid request";

/// Upgrade an HTTP request to a `WebSocket` and join the game.
///
/// # Route
///
/// `GET /`
pub async fn ws_connect(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: Arc<AppState>) {
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::channel(state.transport.outbound_buffer);
    let replies = tx.downgrade();
    let mut writer = tokio::spawn(write_outbound(sink, rx, state.transport.send_timeout));

    let client = join(&state, tx).await;
    debug!(client = %client.id, color = client.color, "WebSocket client connected");

    let mut limiter = RateLimiter::default();
    loop {
        tokio::select! {
            _ = &mut writer => {
                debug!(client = %client.id, "writer finished, closing reader");
                break;
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    handle_text(&state, &client, &mut limiter, &replies, text.as_str()).await;
                }
                Some(Ok(Message::Ping(data))) => reply(&replies, Outbound::Pong(data)),
                Some(Ok(Message::Binary(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(client = %client.id, error = %e, "WebSocket read error");
                    break;
                }
            },
        }
    }

    // Dropping the writer's receiver makes the registry's next broadcast
    // to this client fail, which prunes it.
    writer.abort();
    debug!(client = %client.id, color = client.color, "WebSocket client disconnected");
}

/// Queue a non-consuming full-sync frame on `tx`, then register it.
///
/// Both happen under the grid lock, so every delta built afterwards
/// reaches the client and lands behind the snapshot in its queue. The
/// registry takes ownership of `tx`.
pub async fn join(state: &AppState, tx: ClientTx) -> ClientHandle {
    let grid = state.grid.lock().await;
    match state.codec.snapshot(&grid) {
        Ok(frame) => reply(&tx, Outbound::Binary(frame.into_bytes().into())),
        Err(e) => warn!(error = %e, "failed to encode connect snapshot"),
    }
    state.registry.register(tx).await
}

/// Handle one inbound text message from `client`, replying on `replies`.
///
/// Accepted submissions are written into the grid in the client's color
/// and acknowledged. Throttled submissions and malformed messages get no
/// reply.
pub async fn handle_text<R: ClientSink>(
    state: &AppState,
    client: &ClientHandle,
    limiter: &mut RateLimiter,
    replies: &R,
    text: &str,
) {
    let (width, height) = state.dimensions();
    match Command::parse(text, width, height) {
        Ok(Command::Ping) => reply(replies, Outbound::Text(PONG.to_owned())),
        Ok(Command::Points(points)) => {
            if !state.gate.admit(limiter, now()) {
                trace!(client = %client.id, "submission throttled");
                return;
            }
            let written = {
                let mut grid = state.grid.lock().await;
                state.gate.activate(&mut grid, client.color, &points)
            };
            debug!(client = %client.id, color = client.color, written, "points applied");
            reply(replies, Outbound::Text(acknowledgement(state.gate.interval())));
        }
        Ok(Command::Unknown(kind)) => {
            debug!(client = %client.id, kind = %kind, "unsupported command type");
            reply(replies, Outbound::Text(INVALID_REQUEST.to_owned()));
        }
        Err(e) => debug!(client = %client.id, error = %e, "discarding malformed message"),
    }
}

/// Text sent back after an accepted submission, naming the cool-down in
/// seconds.
pub fn acknowledgement(interval: Duration) -> String {
    format!("received {}", interval.as_secs_f64())
}

/// Best-effort send to this connection only. A full or closed queue means
/// the connection is on its way out; the registry handles that.
fn reply<R: ClientSink>(replies: &R, message: Outbound) {
    if let Err(e) = replies.deliver(message) {
        trace!(error = %e, "reply dropped");
    }
}

/// Drain `rx` into `sink` until the queue closes or a write fails.
///
/// A closed queue means the registry pruned the connection, so the
/// client is sent a close frame.
async fn write_outbound<W>(mut sink: W, mut rx: mpsc::Receiver<Outbound>, send_timeout: Duration)
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    while let Some(outbound) = rx.recv().await {
        let message = match outbound {
            Outbound::Binary(bytes) => Message::Binary(bytes),
            Outbound::Text(text) => Message::Text(text.into()),
            Outbound::Pong(data) => Message::Pong(data),
        };
        match tokio::time::timeout(send_timeout, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(error = %e, "WebSocket write failed");
                return;
            }
            Err(_) => {
                warn!(
                    timeout_ms = send_timeout.as_millis(),
                    "WebSocket write timed out, dropping connection"
                );
                return;
            }
        }
    }

    if let Ok(Err(e)) = tokio::time::timeout(send_timeout, sink.send(Message::Close(None))).await {
        trace!(error = %e, "close frame not sent");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use chromalife_core::codec::{DecodedFrame, FrameKind};
    use chromalife_core::config::{ChromalifeConfig, CompressionKind};

    use super::*;

    fn small_state() -> AppState {
        let mut config = ChromalifeConfig::default();
        config.grid.width = 8;
        config.grid.height = 8;
        config.wire.compression = CompressionKind::None;
        AppState::new(&config).unwrap()
    }

    fn text(message: Outbound) -> String {
        match message {
            Outbound::Text(text) => text,
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn acknowledgement_names_whole_and_fractional_seconds() {
        assert_eq!(acknowledgement(Duration::from_millis(2000)), "received 2");
        assert_eq!(acknowledgement(Duration::from_millis(500)), "received 0.5");
    }

    #[tokio::test]
    async fn join_queues_snapshot_without_consuming_changes() {
        let state = small_state();
        {
            let mut grid = state.grid.lock().await;
            grid.activate(2, 3, 4);
            grid.activate(7, 7, 1);
        }
        let (tx, mut rx) = mpsc::channel(4);

        let client = join(&state, tx).await;

        assert_eq!(client.color, 1);
        assert_eq!(state.registry.len().await, 1);
        assert_eq!(state.grid.lock().await.changed_count(), 2);

        let Outbound::Binary(bytes) = rx.try_recv().unwrap() else {
            panic!("expected the snapshot first");
        };
        assert_eq!(bytes.first(), Some(&FrameKind::FullSync.tag()));
        let DecodedFrame::FullSync(cells) = state.codec.decode(&bytes, 64).unwrap() else {
            panic!("expected a full sync");
        };
        let cell = cells.get(2 * 8 + 3).unwrap();
        assert!(cell.alive);
        assert_eq!(cell.color, 4);
    }

    /// Join a client and drain its snapshot. Returns the weak reply
    /// handle the connection task would keep.
    async fn joined(
        state: &AppState,
    ) -> (ClientHandle, mpsc::WeakSender<Outbound>, mpsc::Receiver<Outbound>) {
        let (tx, mut rx) = mpsc::channel(4);
        let replies = tx.downgrade();
        let client = join(state, tx).await;
        assert!(matches!(rx.try_recv(), Ok(Outbound::Binary(_))));
        (client, replies, rx)
    }

    #[tokio::test]
    async fn accepted_points_are_written_and_acknowledged() {
        let state = small_state();
        let (client, replies, mut rx) = joined(&state).await;

        let mut limiter = RateLimiter::default();
        handle_text(
            &state,
            &client,
            &mut limiter,
            &replies,
            r#"{"type":"points","data":[{"x":1,"y":2},{"x":6,"y":0}]}"#,
        )
        .await;

        {
            let grid = state.grid.lock().await;
            assert_eq!(grid.cell(1, 2).unwrap().color, client.color);
            assert!(grid.cell(6, 0).unwrap().alive);
            assert_eq!(grid.alive_count(), 2);
        }
        assert_eq!(text(rx.try_recv().unwrap()), "received 2");
    }

    #[tokio::test]
    async fn throttled_points_change_nothing_and_get_no_reply() {
        let state = small_state();
        let (client, replies, mut rx) = joined(&state).await;
        let mut limiter = RateLimiter::default();

        let first = r#"{"type":"points","data":[{"x":0,"y":0}]}"#;
        handle_text(&state, &client, &mut limiter, &replies, first).await;
        assert_eq!(text(rx.try_recv().unwrap()), "received 2");

        let second = r#"{"type":"points","data":[{"x":5,"y":5}]}"#;
        handle_text(&state, &client, &mut limiter, &replies, second).await;
        assert!(rx.try_recv().is_err());
        let grid = state.grid.lock().await;
        assert!(!grid.cell(5, 5).unwrap().alive);
        assert_eq!(grid.alive_count(), 1);
    }

    #[tokio::test]
    async fn unknown_type_and_ping_get_text_replies() {
        let state = small_state();
        let (client, replies, mut rx) = joined(&state).await;
        let mut limiter = RateLimiter::default();

        handle_text(&state, &client, &mut limiter, &replies, r#"{"type":"erase","data":[]}"#).await;
        assert_eq!(text(rx.try_recv().unwrap()), INVALID_REQUEST);

        handle_text(&state, &client, &mut limiter, &replies, "ping").await;
        assert_eq!(text(rx.try_recv().unwrap()), PONG);

        handle_text(&state, &client, &mut limiter, &replies, "{not json").await;
        assert!(rx.try_recv().is_err());
        // Neither reply counted against the rate limit.
        assert!(limiter.last_accepted().is_none());
    }

    #[tokio::test]
    async fn replies_stop_once_the_registry_prunes_the_client() {
        let state = small_state();
        let (tx, mut rx) = mpsc::channel(1);
        let replies = tx.downgrade();
        let client = join(&state, tx).await;

        // The snapshot fills the queue, so the next broadcast prunes.
        let report = state.registry.broadcast_text("time 1.0").await;
        assert_eq!(report.pruned, 1);

        let mut limiter = RateLimiter::default();
        handle_text(&state, &client, &mut limiter, &replies, "ping").await;
        assert!(matches!(rx.recv().await, Some(Outbound::Binary(_))));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn writer_sends_close_when_the_queue_closes() {
        let (sink, mut written) = futures::channel::mpsc::unbounded::<Message>();
        let (tx, rx) = mpsc::channel(4);
        let writer = tokio::spawn(write_outbound(sink, rx, Duration::from_secs(1)));

        tx.deliver(Outbound::Text("time 9.5".to_owned())).unwrap();
        drop(tx);
        writer.await.unwrap();

        assert!(matches!(written.next().await, Some(Message::Text(t)) if t.as_str() == "time 9.5"));
        assert!(matches!(written.next().await, Some(Message::Close(None))));
        assert!(written.next().await.is_none());
    }
}
