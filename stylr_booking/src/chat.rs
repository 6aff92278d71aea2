use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery state of a chat message. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sent" => Some(MessageStatus::Sent),
            "delivered" => Some(MessageStatus::Delivered),
            "read" => Some(MessageStatus::Read),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub body: String,
    pub status: MessageStatus,
    pub sent_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(sender_id: Uuid, recipient_id: Uuid, body: String, sent_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id,
            recipient_id,
            body,
            status: MessageStatus::Sent,
            sent_at,
            delivered_at: None,
            read_at: None,
        }
    }

    fn last_transition_at(&self) -> DateTime<Utc> {
        self.read_at
            .or(self.delivered_at)
            .unwrap_or(self.sent_at)
    }

    /// Moves the message to `next`. Reading an undelivered message delivers it
    /// at the same instant. Timestamps never go backwards even when `at` lags
    /// behind an earlier transition. Returns `false` when `next` is not ahead
    /// of the current status.
    pub fn advance(&mut self, next: MessageStatus, at: DateTime<Utc>) -> bool {
        if next <= self.status {
            return false;
        }

        let stamp = at.max(self.last_transition_at());
        if self.delivered_at.is_none() {
            self.delivered_at = Some(stamp);
        }
        if next == MessageStatus::Read {
            self.read_at = Some(stamp);
        }
        self.status = next;
        true
    }

    pub fn involves(&self, user_id: Uuid) -> bool {
        self.sender_id == user_id || self.recipient_id == user_id
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn message() -> Message {
        let sent_at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        Message::new(Uuid::new_v4(), Uuid::new_v4(), "Hi, is 3pm free?".into(), sent_at)
    }

    #[test]
    fn test_sent_delivered_read() {
        let mut message = message();
        let delivered = message.sent_at + Duration::seconds(5);
        let read = message.sent_at + Duration::seconds(30);

        assert!(message.advance(MessageStatus::Delivered, delivered));
        assert_eq!(message.status, MessageStatus::Delivered);
        assert_eq!(message.delivered_at, Some(delivered));
        assert_eq!(message.read_at, None);

        assert!(message.advance(MessageStatus::Read, read));
        assert_eq!(message.status, MessageStatus::Read);
        assert_eq!(message.delivered_at, Some(delivered));
        assert_eq!(message.read_at, Some(read));
    }

    #[test]
    fn test_read_implies_delivery() {
        let mut message = message();
        let read = message.sent_at + Duration::seconds(10);

        assert!(message.advance(MessageStatus::Read, read));
        assert_eq!(message.delivered_at, Some(read));
        assert_eq!(message.read_at, Some(read));
    }

    #[test]
    fn test_status_never_moves_backwards() {
        let mut message = message();
        let read = message.sent_at + Duration::seconds(10);
        message.advance(MessageStatus::Read, read);

        assert!(!message.advance(MessageStatus::Delivered, read + Duration::seconds(1)));
        assert!(!message.advance(MessageStatus::Read, read + Duration::seconds(1)));
        assert_eq!(message.status, MessageStatus::Read);
        assert_eq!(message.read_at, Some(read));
    }

    #[test]
    fn test_timestamps_are_monotonic() {
        let mut message = message();
        let delivered = message.sent_at + Duration::seconds(20);
        message.advance(MessageStatus::Delivered, delivered);

        // Clock skew between relay nodes
        message.advance(MessageStatus::Read, message.sent_at - Duration::seconds(3));
        assert_eq!(message.read_at, Some(delivered));

        let mut early = self::message();
        early.advance(MessageStatus::Delivered, early.sent_at - Duration::minutes(1));
        assert_eq!(early.delivered_at, Some(early.sent_at));
    }

    #[test]
    fn test_status_round_trips_through_storage_names() {
        for status in [MessageStatus::Sent, MessageStatus::Delivered, MessageStatus::Read] {
            assert_eq!(MessageStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MessageStatus::parse("seen"), None);
    }
}
