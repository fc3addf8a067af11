//! Typed row queries and remote procedures for the chat data model.

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use chatamata_shared::models::{ConversationPreview, FriendshipRow, Message, NewMessage, Profile};
use chatamata_shared::types::{ConversationId, FriendResponse, MessageId, UserId};

use crate::error::Result;
use crate::http::Gateway;

/// Join expression for message pages: sender profile plus read receipts.
const MESSAGE_PAGE_SELECT: &str = "*,sender:profiles(*),message_read_statuses(read_at)";

/// Join expression for a single message with its sender.
const MESSAGE_SELECT: &str = "*,sender:profiles(*)";

/// Join expression for friendship rows with both side profiles.
const FRIENDSHIP_SELECT: &str = "id,status,action_user_id,\
     user_one:profiles!friendships_user_one_id_fkey(*),\
     user_two:profiles!friendships_user_two_id_fkey(*)";

/// Raw message row as returned with the read-receipt join. The receipt
/// join arrives as a (possibly empty) array; it is flattened to a single
/// `read_at` here, at the decode boundary.
#[derive(Debug, Deserialize)]
struct MessagePageRow {
    #[serde(flatten)]
    message: Message,
    #[serde(default, rename = "message_read_statuses")]
    read_statuses: Vec<ReadAtRow>,
}

#[derive(Debug, Deserialize)]
struct ReadAtRow {
    read_at: Option<chrono::DateTime<Utc>>,
}

impl MessagePageRow {
    fn into_message(self) -> Message {
        let mut message = self.message;
        if message.read_at.is_none() {
            message.read_at = self.read_statuses.into_iter().find_map(|r| r.read_at);
        }
        message
    }
}

impl Gateway {
    /// Fetch one pagination window of a conversation's messages,
    /// newest-first, soft-deleted rows excluded. The caller reverses the
    /// page for oldest-first display.
    pub async fn messages_page(
        &self,
        conversation_id: ConversationId,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let rows: Vec<MessagePageRow> = self
            .select_rows(
                "messages",
                &[
                    ("select", MESSAGE_PAGE_SELECT.to_string()),
                    ("conversation_id", format!("eq.{conversation_id}")),
                    ("deleted_at", "is.null".to_string()),
                    ("order", "created_at.desc".to_string()),
                    ("offset", offset.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(MessagePageRow::into_message).collect())
    }

    /// Fetch a single message with its sender profile joined. Used by
    /// realtime ingestion, where change payloads carry no joins.
    pub async fn message_with_sender(&self, id: MessageId) -> Result<Message> {
        self.select_single(
            "messages",
            &[
                ("select", MESSAGE_SELECT.to_string()),
                ("id", format!("eq.{id}")),
            ],
        )
        .await
    }

    /// Insert a message row and return it committed, with the sender
    /// profile joined.
    pub async fn insert_message(&self, new: &NewMessage) -> Result<Message> {
        self.insert_returning("messages", MESSAGE_SELECT, new).await
    }

    /// Soft-delete a message by stamping `deleted_at`. The row stays in
    /// storage and is filtered from every subsequent fetch.
    pub async fn soft_delete_message(&self, id: MessageId) -> Result<()> {
        self.update_rows(
            "messages",
            &[("id", format!("eq.{id}"))],
            &json!({ "deleted_at": Utc::now() }),
        )
        .await
    }

    /// Every friendship row that names `self_id` on either side, with both
    /// side profiles joined.
    pub async fn friendship_rows(&self, self_id: UserId) -> Result<Vec<FriendshipRow>> {
        self.select_rows(
            "friendships",
            &[
                ("select", FRIENDSHIP_SELECT.to_string()),
                (
                    "or",
                    format!("(user_one_id.eq.{self_id},user_two_id.eq.{self_id})"),
                ),
            ],
        )
        .await
    }

    /// Case-insensitive username substring search, excluding the searching
    /// identity, capped at `limit` rows.
    pub async fn search_profiles(
        &self,
        query: &str,
        exclude: UserId,
        limit: u32,
    ) -> Result<Vec<Profile>> {
        self.select_rows(
            "profiles",
            &[
                ("select", "*".to_string()),
                ("username", format!("ilike.*{query}*")),
                ("id", format!("neq.{exclude}")),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    // -- Remote procedures --------------------------------------------------

    /// One preview row per conversation the current identity participates
    /// in.
    pub async fn user_conversations(&self) -> Result<Vec<ConversationPreview>> {
        self.rpc("get_user_conversations", &json!({})).await
    }

    /// Acknowledge every unread incoming message in a conversation.
    pub async fn mark_messages_as_read(&self, conversation_id: ConversationId) -> Result<()> {
        self.rpc_void(
            "mark_messages_as_read",
            &json!({ "p_conversation_id": conversation_id }),
        )
        .await
    }

    pub async fn send_friend_request(&self, receiver: UserId) -> Result<()> {
        self.rpc_void("send_friend_request", &json!({ "p_receiver_id": receiver }))
            .await
    }

    pub async fn respond_to_friend_request(
        &self,
        sender: UserId,
        response: FriendResponse,
    ) -> Result<()> {
        self.rpc_void(
            "respond_to_friend_request",
            &json!({ "p_sender_id": sender, "p_response": response }),
        )
        .await
    }

    /// Generate a fresh unique public handle for a new account.
    pub async fn generate_chatamata_id(&self) -> Result<String> {
        self.rpc("generate_unique_chatamata_id", &json!({})).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatamata_shared::types::MessageStatus;
    use uuid::Uuid;

    #[test]
    fn test_page_row_flattens_read_receipts() {
        let json = serde_json::json!({
            "id": 5,
            "conversation_id": 42,
            "sender_id": Uuid::nil(),
            "content": "hi",
            "image_url": null,
            "created_at": "2025-06-01T12:00:00Z",
            "sender": {
                "id": Uuid::nil(),
                "username": "ann",
                "full_name": null,
                "avatar_url": null,
                "banner_url": null,
                "description": null,
                "chatamata_id": null,
                "joined_at": null,
                "updated_at": null
            },
            "message_read_statuses": [{ "read_at": "2025-06-01T12:05:00Z" }]
        });
        let row: MessagePageRow = serde_json::from_value(json).unwrap();
        let msg = row.into_message();
        assert!(msg.read_at.is_some());
        assert_eq!(msg.status, MessageStatus::Success);
    }

    #[test]
    fn test_page_row_without_receipts_is_unread() {
        let json = serde_json::json!({
            "id": 5,
            "conversation_id": 42,
            "sender_id": Uuid::nil(),
            "content": "hi",
            "image_url": null,
            "created_at": "2025-06-01T12:00:00Z",
            "sender": {
                "id": Uuid::nil(),
                "username": "ann",
                "full_name": null,
                "avatar_url": null,
                "banner_url": null,
                "description": null,
                "chatamata_id": null,
                "joined_at": null,
                "updated_at": null
            },
            "message_read_statuses": []
        });
        let row: MessagePageRow = serde_json::from_value(json).unwrap();
        assert!(row.into_message().read_at.is_none());
    }
}
