//! Event handlers for one chat connection.
//!
//! Every handler re-validates its own token: the token must verify, name the
//! booking given in the request, and that booking must be the one the
//! connection bound on join.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::auth::{Claims, TokenVerifier};
use crate::gateway::{PersistenceGateway, StoreMessageRequest};
use crate::registry::{ConnectionId, OutboundFrame, RoomRegistry};

use super::error::RelayError;
use super::protocol::{
    self, Ack, ClientEvent, DecodeError, JoinBooking, ReceiptBatch, SendMessage, ServerEvent,
    TypingSignal,
};
use super::sequencer::RoomSequencer;
use super::session::ConnectionSession;

/// A validated `message` waiting for persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub sender: ConnectionId,
    pub request: StoreMessageRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptKind {
    Delivered,
    Read,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingKind {
    Start,
    Stop,
}

/// Shared relay state used by every connection.
pub struct ChatRelay {
    verifier: TokenVerifier,
    registry: RoomRegistry,
    gateway: PersistenceGateway,
    sequencer: Option<RoomSequencer>,
}

impl ChatRelay {
    pub fn new(
        verifier: TokenVerifier,
        registry: RoomRegistry,
        gateway: PersistenceGateway,
    ) -> Self {
        Self {
            verifier,
            registry,
            gateway,
            sequencer: None,
        }
    }

    /// Serialise persistence per booking through `sequencer`.
    #[must_use]
    pub fn with_sequencer(mut self, sequencer: RoomSequencer) -> Self {
        self.sequencer = Some(sequencer);
        self
    }

    pub const fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Register a new transport connection.
    pub async fn connect(&self, tx: tokio::sync::mpsc::Sender<OutboundFrame>) -> ConnectionSession {
        ConnectionSession::new(self.registry.register(tx).await)
    }

    /// Forget a connection. Peers are not notified.
    pub async fn disconnect(&self, session: &ConnectionSession) {
        let rooms = self.registry.unregister(session.id()).await;
        debug!(conn_id = session.id(), rooms = rooms.len(), "Connection closed");
    }

    /// Verify `token` for `booking_id` on behalf of `session`.
    fn authorize(
        &self,
        session: &ConnectionSession,
        booking_id: i64,
        token: &str,
    ) -> Result<Claims, RelayError> {
        let claims = self.verify_for_booking(booking_id, token)?;
        if !session.is_bound_to(booking_id) {
            debug!(
                conn_id = session.id(),
                booking_id, "Action on a booking the connection has not joined"
            );
            return Err(RelayError::Unauthorized);
        }
        Ok(claims)
    }

    fn verify_for_booking(&self, booking_id: i64, token: &str) -> Result<Claims, RelayError> {
        let claims = self.verifier.verify(token).map_err(|e| {
            debug!(booking_id, reason = %e, "Token rejected");
            RelayError::Unauthorized
        })?;
        if claims.booking_id != booking_id {
            debug!(
                booking_id,
                token_booking_id = claims.booking_id,
                "Token issued for another booking"
            );
            return Err(RelayError::Unauthorized);
        }
        Ok(claims)
    }

    /// `join_booking`: bind the connection and add it to the booking room.
    #[instrument(skip_all, fields(conn_id = session.id()))]
    pub async fn join_booking(
        &self,
        session: &mut ConnectionSession,
        req: JoinBooking,
    ) -> Result<(), RelayError> {
        let (Some(booking_id), Some(token)) = (req.booking_id, req.token) else {
            return Err(RelayError::JOIN_FIELDS);
        };
        let claims = self.verify_for_booking(booking_id, &token)?;

        session.bind(&claims).inspect_err(|_| {
            warn!(booking_id, "Connection tried to join a second booking");
        })?;
        self.registry.join(booking_id, session.id()).await;
        info!(booking_id, user_id = claims.user_id, "Joined booking chat");
        Ok(())
    }

    /// Validate a `message` request without touching the store.
    pub fn prepare_message(
        &self,
        session: &ConnectionSession,
        req: SendMessage,
    ) -> Result<PendingMessage, RelayError> {
        let (Some(booking_id), Some(text), Some(token)) = (req.booking_id, req.text, req.token)
        else {
            return Err(RelayError::MESSAGE_FIELDS);
        };
        let claims = self.authorize(session, booking_id, &token)?;

        // Whitespace-only text is forwarded as empty; the store decides.
        Ok(PendingMessage {
            sender: session.id(),
            request: StoreMessageRequest {
                booking_id,
                user_id: claims.user_id,
                message: text.trim().to_string(),
            },
        })
    }

    /// Persist a validated message and broadcast the stored record to the
    /// whole room, sender included. Nothing is broadcast on failure.
    #[instrument(skip_all, fields(conn_id = pending.sender, booking_id = pending.request.booking_id))]
    pub async fn deliver_message(&self, pending: &PendingMessage) -> Result<Value, RelayError> {
        let stored = self
            .gateway
            .store_message(&pending.request)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to store chat message");
                RelayError::Downstream(e.client_message())
            })?;

        let recipients = self
            .broadcast(
                pending.request.booking_id,
                &ServerEvent::Message(stored.clone()),
                None,
            )
            .await;
        debug!(recipients, "Chat message relayed");
        Ok(stored)
    }

    /// `message`: validate, persist, broadcast.
    pub async fn send_message(
        &self,
        session: &ConnectionSession,
        req: SendMessage,
    ) -> Result<Value, RelayError> {
        let pending = self.prepare_message(session, req)?;
        self.deliver_message(&pending).await
    }

    /// `mark_delivered` / `mark_read`: relay receipt ids to the whole room.
    pub async fn mark(
        &self,
        session: &ConnectionSession,
        req: ReceiptBatch,
        kind: ReceiptKind,
    ) -> Result<(), RelayError> {
        let (Some(booking_id), Some(token)) = (req.booking_id, req.token) else {
            return Err(RelayError::RECEIPT_FIELDS);
        };
        if req.message_ids.is_empty() {
            return Err(RelayError::RECEIPT_FIELDS);
        }
        self.authorize(session, booking_id, &token)?;

        let message_ids = req.message_ids;
        let event = match kind {
            ReceiptKind::Delivered => ServerEvent::MessageDelivered { message_ids },
            ReceiptKind::Read => ServerEvent::MessageRead { message_ids },
        };
        self.broadcast(booking_id, &event, None).await;
        Ok(())
    }

    /// `typing` / `typing_stop`: best effort, to everyone but the sender.
    /// Invalid signals are dropped without feedback.
    pub async fn typing(&self, session: &ConnectionSession, req: TypingSignal, kind: TypingKind) {
        let (Some(booking_id), Some(token)) = (req.booking_id, req.token) else {
            return;
        };
        let Ok(claims) = self.authorize(session, booking_id, &token) else {
            return;
        };

        let user_id = claims.user_id;
        let event = match kind {
            TypingKind::Start => ServerEvent::Typing { user_id },
            TypingKind::Stop => ServerEvent::TypingStop { user_id },
        };
        self.broadcast(booking_id, &event, Some(session.id())).await;
    }

    async fn broadcast(
        &self,
        booking_id: i64,
        event: &ServerEvent,
        excluding: Option<ConnectionId>,
    ) -> usize {
        match event.encode() {
            Ok(frame) => {
                self.registry
                    .broadcast(booking_id, Arc::from(frame), excluding)
                    .await
            }
            Err(e) => {
                warn!(error = %e, "Failed to encode room event");
                0
            }
        }
    }

    async fn reply(&self, conn_id: ConnectionId, id: Option<u64>, ack: &Ack) {
        let Some(id) = id else {
            return;
        };
        match protocol::encode_ack(id, ack) {
            Ok(frame) => {
                if !self.registry.send_to(conn_id, Arc::from(frame)).await {
                    debug!(conn_id, "Ack dropped, connection gone or saturated");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode ack"),
        }
    }

    /// Handle one inbound text frame.
    ///
    /// Validation runs inline so a join is visible to the next frame of the
    /// same connection. The store round trip of a `message` runs in its own
    /// task (or the booking's sequencer) so it never stalls this connection.
    pub async fn handle_frame(self: &Arc<Self>, session: &mut ConnectionSession, text: &str) {
        let request = match protocol::decode(text) {
            Ok(request) => request,
            Err(DecodeError::UnknownEvent { id, name }) => {
                debug!(conn_id = session.id(), event = %name, "Unknown event");
                self.reply(session.id(), id, &Ack::error(&RelayError::UnknownEvent))
                    .await;
                return;
            }
            Err(e) => {
                debug!(conn_id = session.id(), error = %e, "Ignoring undecodable frame");
                return;
            }
        };

        let id = request.id;
        match request.event {
            ClientEvent::JoinBooking(req) => {
                let ack: Ack = self.join_booking(session, req).await.into();
                self.reply(session.id(), id, &ack).await;
            }
            ClientEvent::SendMessage(req) => match self.prepare_message(session, req) {
                Ok(pending) => self.spawn_delivery(pending, id),
                Err(e) => self.reply(session.id(), id, &Ack::error(&e)).await,
            },
            ClientEvent::MarkDelivered(req) => {
                let ack: Ack = self.mark(session, req, ReceiptKind::Delivered).await.into();
                self.reply(session.id(), id, &ack).await;
            }
            ClientEvent::MarkRead(req) => {
                let ack: Ack = self.mark(session, req, ReceiptKind::Read).await.into();
                self.reply(session.id(), id, &ack).await;
            }
            ClientEvent::Typing(req) => self.typing(session, req, TypingKind::Start).await,
            ClientEvent::TypingStop(req) => self.typing(session, req, TypingKind::Stop).await,
        }
    }

    fn spawn_delivery(self: &Arc<Self>, pending: PendingMessage, id: Option<u64>) {
        let relay = Arc::clone(self);
        let booking_id = pending.request.booking_id;
        let job = async move {
            let ack = match relay.deliver_message(&pending).await {
                Ok(message) => Ack::with_message(message),
                Err(e) => Ack::error(&e),
            };
            relay.reply(pending.sender, id, &ack).await;
        };

        match &self.sequencer {
            Some(sequencer) => sequencer.submit(booking_id, job),
            None => {
                tokio::spawn(job);
            }
        }
    }
}
