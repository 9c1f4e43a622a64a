//! Per-session message relay.
//!
//! Clients submit [`ClientMsg`]s into one inbound queue drained by the host
//! runtime; the host publishes [`ServerMsg`]s on a broadcast channel every
//! connection subscribes to. Delivery to subscribers is best effort: a lagging
//! subscriber skips messages instead of stalling the host.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::session::SessionError;
use crate::ws::protocol::{ClientMsg, JoinResult, PlayerId, ServerMsg};

const INBOUND_CAPACITY: usize = 256;
const OUTBOUND_CAPACITY: usize = 256;

/// A client message tagged with its sender
#[derive(Debug, Clone)]
pub struct Envelope {
    pub sender: PlayerId,
    pub msg: ClientMsg,
}

/// A host message, optionally addressed to a single player
#[derive(Debug, Clone)]
pub struct Outbound {
    /// `None` means every subscriber
    pub recipient: Option<PlayerId>,
    pub msg: ServerMsg,
}

impl Outbound {
    /// Whether a connection for `player_id` should forward this message
    pub fn is_for(&self, player_id: &PlayerId) -> bool {
        self.recipient.map_or(true, |r| &r == player_id)
    }
}

type JoinWaiters = DashMap<Uuid, oneshot::Sender<JoinResult>>;

/// Cheap-to-clone handle onto one session's channels
#[derive(Clone)]
pub struct Relay {
    session_id: Uuid,
    inbound_tx: mpsc::Sender<Envelope>,
    outbound_tx: broadcast::Sender<Outbound>,
    pending_joins: Arc<JoinWaiters>,
    join_timeout: Duration,
}

impl Relay {
    /// Create the relay and the inbound receiver the host runtime drains
    pub fn new(session_id: Uuid, join_timeout: Duration) -> (Self, mpsc::Receiver<Envelope>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (outbound_tx, _) = broadcast::channel(OUTBOUND_CAPACITY);

        let relay = Self {
            session_id,
            inbound_tx,
            outbound_tx,
            pending_joins: Arc::new(DashMap::new()),
            join_timeout,
        };
        (relay, inbound_rx)
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Queue a client message for the host
    pub async fn submit(&self, sender: PlayerId, msg: ClientMsg) -> Result<(), SessionError> {
        self.inbound_tx
            .send(Envelope { sender, msg })
            .await
            .map_err(|_| SessionError::RelayClosed)
    }

    /// Publish to every subscriber. Having no subscribers is not an error.
    pub fn broadcast(&self, msg: ServerMsg) {
        let _ = self.outbound_tx.send(Outbound {
            recipient: None,
            msg,
        });
    }

    /// Publish to a single player's connection
    pub fn send_to(&self, player_id: PlayerId, msg: ServerMsg) {
        let _ = self.outbound_tx.send(Outbound {
            recipient: Some(player_id),
            msg,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.outbound_tx.subscribe()
    }

    /// Ask the host to admit a player and wait for its acknowledgment.
    ///
    /// `sender` is the id the player will hold if admitted as a new player;
    /// `player_id` is set when re-attaching to an existing record. The pending
    /// waiter is removed on every exit path.
    pub async fn request_join(
        &self,
        sender: PlayerId,
        display_name: String,
        player_id: Option<PlayerId>,
    ) -> Result<JoinResult, SessionError> {
        let request_id = Uuid::new_v4();
        let (ack_tx, ack_rx) = oneshot::channel();
        self.pending_joins.insert(request_id, ack_tx);
        let _waiter = PendingJoin {
            waiters: &self.pending_joins,
            request_id,
        };

        self.submit(
            sender,
            ClientMsg::JoinRequest {
                request_id,
                display_name,
                player_id,
            },
        )
        .await?;

        match tokio::time::timeout(self.join_timeout, ack_rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(SessionError::RelayClosed),
            Err(_) => {
                warn!(
                    session_id = %self.session_id,
                    request_id = %request_id,
                    "Join request timed out"
                );
                Err(SessionError::JoinTimeout)
            }
        }
    }

    /// Resolve a pending join. Returns false if nobody is waiting any more.
    pub fn acknowledge_join(&self, request_id: Uuid, result: JoinResult) -> bool {
        match self.pending_joins.remove(&request_id) {
            Some((_, waiter)) => waiter.send(result).is_ok(),
            None => {
                debug!(request_id = %request_id, "Join acknowledged with no waiter");
                false
            }
        }
    }

    pub fn pending_joins(&self) -> usize {
        self.pending_joins.len()
    }
}

/// Deregisters a join waiter when the requesting future finishes or is dropped
struct PendingJoin<'a> {
    waiters: &'a JoinWaiters,
    request_id: Uuid,
}

impl Drop for PendingJoin<'_> {
    fn drop(&mut self) {
        self.waiters.remove(&self.request_id);
    }
}
