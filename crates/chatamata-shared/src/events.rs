//! Typed realtime change events.
//!
//! The change feed delivers loosely-typed JSON payloads keyed by table name
//! and operation. They are decoded into one tagged variant per table here,
//! at the subscription boundary; nothing downstream ever sees raw payloads.
//! Payloads that fail to decode are logged and dropped by the socket task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EventDecodeError;
use crate::types::{ConversationId, MessageId, UserId};

/// A decoded row-change notification from the gateway's change feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ChangeEvent {
    /// A message row was committed.
    MessageInserted(MessageChange),

    /// A read receipt was committed for a message.
    ReadReceiptInserted(ReadReceiptChange),

    /// An identity was added to a conversation.
    ParticipantInserted(ParticipantChange),

    /// A profile row changed.
    ProfileUpdated(ProfileChange),

    /// Any change to the friendships table. Deliberately carries no row
    /// data: friendship consumers refetch wholesale.
    FriendshipChanged,
}

/// Bare message row from a change payload: no profile join. Consumers that
/// need the sender profile fetch the full row afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageChange {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadReceiptChange {
    pub message_id: MessageId,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    /// The identity that acknowledged the message.
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticipantChange {
    pub user_id: UserId,
    pub conversation_id: ConversationId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileChange {
    pub id: UserId,
}

impl ChangeEvent {
    /// Decode a change payload of the shape
    /// `{ "table": ..., "type": ..., "record": { ... } }`.
    pub fn decode(payload: &Value) -> Result<Self, EventDecodeError> {
        let table = payload
            .get("table")
            .and_then(Value::as_str)
            .ok_or(EventDecodeError::MissingField("table"))?;
        let op = payload
            .get("type")
            .and_then(Value::as_str)
            .ok_or(EventDecodeError::MissingField("type"))?;

        // Friendship changes are coarse on purpose: every operation maps to
        // the same variant and the consumer refetches.
        if table == "friendships" {
            return Ok(ChangeEvent::FriendshipChanged);
        }

        let record = payload
            .get("record")
            .ok_or(EventDecodeError::MissingField("record"))?;

        match (table, op) {
            ("messages", "INSERT") => Ok(ChangeEvent::MessageInserted(serde_json::from_value(
                record.clone(),
            )?)),
            ("message_read_statuses", "INSERT") => Ok(ChangeEvent::ReadReceiptInserted(
                serde_json::from_value(record.clone())?,
            )),
            ("participants", "INSERT") => Ok(ChangeEvent::ParticipantInserted(
                serde_json::from_value(record.clone())?,
            )),
            ("profiles", "UPDATE") => Ok(ChangeEvent::ProfileUpdated(serde_json::from_value(
                record.clone(),
            )?)),
            ("messages", other) | ("message_read_statuses", other) | ("participants", other)
            | ("profiles", other) => Err(EventDecodeError::UnknownOperation(other.to_string())),
            (other, _) => Err(EventDecodeError::UnknownTable(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_decode_message_insert() {
        let payload = json!({
            "table": "messages",
            "type": "INSERT",
            "record": {
                "id": 99,
                "conversation_id": 42,
                "sender_id": Uuid::nil(),
                "content": "hey",
                "created_at": "2025-06-01T12:00:00Z"
            }
        });
        match ChangeEvent::decode(&payload).unwrap() {
            ChangeEvent::MessageInserted(m) => {
                assert_eq!(m.id, MessageId(99));
                assert_eq!(m.conversation_id, ConversationId(42));
                assert_eq!(m.content.as_deref(), Some("hey"));
                assert!(m.image_url.is_none());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_decode_read_receipt_insert() {
        let payload = json!({
            "table": "message_read_statuses",
            "type": "INSERT",
            "record": {
                "message_id": 99,
                "conversation_id": 42,
                "user_id": Uuid::nil(),
                "read_at": "2025-06-01T12:01:00Z"
            }
        });
        match ChangeEvent::decode(&payload).unwrap() {
            ChangeEvent::ReadReceiptInserted(r) => {
                assert_eq!(r.message_id, MessageId(99));
                assert_eq!(r.conversation_id, Some(ConversationId(42)));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_friendship_changes_are_coarse() {
        for op in ["INSERT", "UPDATE", "DELETE"] {
            let payload = json!({ "table": "friendships", "type": op });
            assert_eq!(
                ChangeEvent::decode(&payload).unwrap(),
                ChangeEvent::FriendshipChanged
            );
        }
    }

    #[test]
    fn test_unknown_table_is_rejected() {
        let payload = json!({ "table": "payments", "type": "INSERT", "record": {} });
        assert!(matches!(
            ChangeEvent::decode(&payload),
            Err(EventDecodeError::UnknownTable(_))
        ));
    }

    #[test]
    fn test_unhandled_operation_is_rejected() {
        let payload = json!({ "table": "messages", "type": "DELETE", "record": {} });
        assert!(matches!(
            ChangeEvent::decode(&payload),
            Err(EventDecodeError::UnknownOperation(_))
        ));
    }
}
