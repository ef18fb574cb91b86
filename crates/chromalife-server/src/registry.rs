//! Connection registry and best-effort broadcast.
//!
//! The registry tracks every live connection together with the color it
//! was assigned on connect. Broadcasting hands the same message to each
//! connection's [`ClientSink`]; a connection whose sink refuses the
//! message is assumed dead and dropped in the same pass. Nothing is
//! retried.
//!
//! Pruning is copy-and-swap: the pass drains the current roster, keeps
//! the connections that accepted the message, and installs the survivors
//! as the new roster, all under the registry lock.
//!
//! Sinks never block. The production sink is a bounded
//! [`mpsc::Sender`] feeding a per-connection writer task, so a stalled
//! socket fills its queue and gets pruned instead of holding up the pass.

use std::fmt;

use axum::body::Bytes;
use chromalife_core::codec::Frame;
use chromalife_core::grid::ColorId;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, trace};
use uuid::Uuid;

/// A message queued for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A binary wire frame.
    Binary(Bytes),
    /// A text notice or acknowledgement.
    Text(String),
    /// A pong answering a transport-level ping.
    Pong(Bytes),
}

/// Why a sink refused a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The connection's writer has gone away.
    #[error("connection closed")]
    Closed,
    /// The connection is not draining its queue.
    #[error("outbound queue full")]
    Full,
}

/// Non-blocking handle used to push messages toward one connection.
pub trait ClientSink: Send {
    /// Queue `message` for delivery.
    fn deliver(&self, message: Outbound) -> Result<(), DeliveryError>;
}

impl ClientSink for mpsc::Sender<Outbound> {
    fn deliver(&self, message: Outbound) -> Result<(), DeliveryError> {
        self.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// A weak sender refuses once every strong sender is gone, even if the
/// receiver is still alive.
impl ClientSink for mpsc::WeakSender<Outbound> {
    fn deliver(&self, message: Outbound) -> Result<(), DeliveryError> {
        self.upgrade().ok_or(DeliveryError::Closed)?.deliver(message)
    }
}

/// The sink type used by the `WebSocket` transport.
pub type ClientTx = mpsc::Sender<Outbound>;

/// Unique identifier of a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What the transport learns about its connection on registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientHandle {
    /// Registry identifier.
    pub id: ClientId,
    /// Assigned color, never [`NEUTRAL`](chromalife_core::grid::NEUTRAL).
    pub color: ColorId,
}

/// Outcome of one broadcast pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections that accepted the message.
    pub delivered: usize,
    /// Connections dropped because they refused it.
    pub pruned: usize,
}

struct Client<S> {
    handle: ClientHandle,
    sink: S,
}

struct Roster<S> {
    clients: Vec<Client<S>>,
    next_color: ColorId,
}

/// The set of live connections.
pub struct Registry<S = ClientTx> {
    num_colors: ColorId,
    roster: Mutex<Roster<S>>,
}

impl<S: ClientSink> Registry<S> {
    /// Create an empty registry handing out colors `1..=num_colors`.
    ///
    /// A `num_colors` of zero is treated as one.
    pub fn new(num_colors: ColorId) -> Self {
        Self {
            num_colors: num_colors.max(1),
            roster: Mutex::new(Roster {
                clients: Vec::new(),
                next_color: 1,
            }),
        }
    }

    /// Number of colors handed out before wrapping.
    pub const fn num_colors(&self) -> ColorId {
        self.num_colors
    }

    /// Add a connection and assign it the next color round-robin.
    pub async fn register(&self, sink: S) -> ClientHandle {
        let mut roster = self.roster.lock().await;

        let color = roster.next_color;
        roster.next_color = match color.checked_add(1) {
            Some(next) if next <= self.num_colors => next,
            _ => 1,
        };

        let handle = ClientHandle {
            id: ClientId::new(),
            color,
        };
        roster.clients.push(Client { handle, sink });
        debug!(client = %handle.id, color, connections = roster.clients.len(), "connection registered");
        handle
    }

    /// Send `message` to every connection, pruning any that refuse it.
    pub async fn broadcast(&self, message: &Outbound) -> BroadcastReport {
        let mut roster = self.roster.lock().await;
        let previous = std::mem::take(&mut roster.clients);

        let mut report = BroadcastReport::default();
        let mut active = Vec::with_capacity(previous.len());
        for client in previous {
            match client.sink.deliver(message.clone()) {
                Ok(()) => {
                    report.delivered = report.delivered.saturating_add(1);
                    active.push(client);
                }
                Err(e) => {
                    debug!(
                        client = %client.handle.id,
                        color = client.handle.color,
                        error = %e,
                        "pruning connection"
                    );
                    report.pruned = report.pruned.saturating_add(1);
                }
            }
        }

        roster.clients = active;
        report
    }

    /// Broadcast a binary frame.
    pub async fn broadcast_frame(&self, frame: Frame) -> BroadcastReport {
        let kind = frame.kind();
        let cells = frame.cell_count();
        let message = Outbound::Binary(Bytes::from(frame.into_bytes()));
        let report = self.broadcast(&message).await;
        trace!(?kind, cells, delivered = report.delivered, pruned = report.pruned, "frame broadcast");
        report
    }

    /// Broadcast a text notice.
    pub async fn broadcast_text(&self, text: &str) -> BroadcastReport {
        self.broadcast(&Outbound::Text(text.to_owned())).await
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.roster.lock().await.clients.len()
    }

    /// Whether no connection is registered.
    pub async fn is_empty(&self) -> bool {
        self.roster.lock().await.clients.is_empty()
    }

    /// Handles of every registered connection, in registration order.
    pub async fn handles(&self) -> Vec<ClientHandle> {
        self.roster
            .lock()
            .await
            .clients
            .iter()
            .map(|c| c.handle)
            .collect()
    }
}
