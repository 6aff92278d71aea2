//! Best-effort fan-out of booking and chat events.
//!
//! Subscribers that lag behind the channel capacity lose the oldest events and
//! disconnected subscribers miss everything until they reconnect. Clients are
//! expected to re-fetch state after reconnecting.

use crate::chat::Message;
use crate::types::Booking;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::{self, Receiver, Sender};
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    BookingCreated {
        booking: Booking,
    },
    BookingStatusChanged {
        booking: Booking,
    },
    MessageSent {
        message: Message,
    },
    #[serde(rename_all = "camelCase")]
    MessageDelivered {
        message_id: Uuid,
        delivered_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    MessageRead {
        message_id: Uuid,
        read_at: DateTime<Utc>,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::BookingCreated { .. } => "booking_created",
            EventKind::BookingStatusChanged { .. } => "booking_status_changed",
            EventKind::MessageSent { .. } => "message_sent",
            EventKind::MessageDelivered { .. } => "message_delivered",
            EventKind::MessageRead { .. } => "message_read",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayEvent {
    #[serde(skip)]
    pub recipients: Vec<Uuid>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl RelayEvent {
    pub fn is_for(&self, user_id: Uuid) -> bool {
        self.recipients.contains(&user_id)
    }
}

#[derive(Debug, Clone)]
pub struct EventRelay {
    sender: Sender<RelayEvent>,
}

impl EventRelay {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, recipients: Vec<Uuid>, kind: EventKind) {
        let name = kind.name();
        match self.sender.send(RelayEvent { recipients, kind }) {
            Ok(receivers) => debug!(event = name, receivers, "Relayed event"),
            Err(_) => debug!(event = name, "No subscribers, event dropped"),
        }
    }

    pub fn subscribe(&self) -> Receiver<RelayEvent> {
        self.sender.subscribe()
    }

    pub fn stream(&self) -> BroadcastStream<RelayEvent> {
        BroadcastStream::new(self.subscribe())
    }
}
