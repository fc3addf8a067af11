//! Domain model structs exchanged between the gateway, the synchronizers,
//! and the presentation layer.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be decoded
//! straight from gateway responses and handed to the UI unchanged. The
//! gateway owns every durable row; the client only ever holds read-through
//! copies of these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    ConversationId, FriendStatus, FriendshipId, MessageId, MessageStatus, Plan, UserId,
};

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// An identity's public-facing record, owned by the `profiles` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: UserId,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub banner_url: Option<String>,
    pub description: Option<String>,
    /// Short public handle, unique per account.
    pub chatamata_id: Option<String>,
    #[serde(default)]
    pub plan: Plan,
    pub joined_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub profile_setup_complete: bool,
}

impl Profile {
    /// Snapshot of the signed-in user as a profile, built from auth
    /// metadata. Used for the sender field of optimistic placeholders
    /// before the server row (with its joined profile) arrives.
    pub fn from_auth_user(user: &AuthUser) -> Self {
        Self {
            id: user.id,
            username: user.user_metadata.username.clone(),
            full_name: user.user_metadata.full_name.clone(),
            avatar_url: user.user_metadata.profile_pic.clone(),
            banner_url: user.user_metadata.banner_url.clone(),
            description: None,
            chatamata_id: user.user_metadata.chatamata_id.clone(),
            plan: user.user_metadata.plan.unwrap_or_default(),
            joined_at: None,
            updated_at: None,
            profile_setup_complete: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat entry with its joined sender profile.
///
/// `content` and `image_url` may both be present; `content` is `None` when
/// only an image was sent. `deleted_at` soft-deletes the row: it stays in
/// storage but is filtered from every view once set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Set once the recipient has acknowledged the message.
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    pub sender: Profile,
    /// Client-only delivery state; not stored by the gateway.
    #[serde(default)]
    pub status: MessageStatus,
}

/// Insert payload for a new message row. Exactly one of `content` /
/// `image_url` is usually set; the gateway assigns id and timestamps.
#[derive(Debug, Clone, Serialize)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Conversation preview
// ---------------------------------------------------------------------------

/// Denormalized per-identity summary row returned by the
/// `get_user_conversations` remote procedure: one entry per conversation
/// the identity participates in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationPreview {
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub is_group: bool,
    /// The other participant's name for a direct chat, or group metadata.
    pub display_name: Option<String>,
    pub display_avatar: Option<String>,
    /// Direct chats only.
    pub other_user_id: Option<UserId>,
    pub latest_message_content: Option<String>,
    pub latest_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u32,
}

// ---------------------------------------------------------------------------
// Friendship
// ---------------------------------------------------------------------------

/// A friendship row as stored by the gateway, with both side profiles
/// joined. `action_user_id` marks which side created the request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FriendshipRow {
    pub id: FriendshipId,
    pub status: FriendStatus,
    pub action_user_id: UserId,
    pub user_one: Profile,
    pub user_two: Profile,
}

/// A directed friendship as seen from the current identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Friendship {
    pub id: FriendshipId,
    pub friend: Profile,
    pub status: FriendStatus,
    /// Whether the current identity initiated the request.
    pub is_requester: bool,
}

// ---------------------------------------------------------------------------
// Auth session
// ---------------------------------------------------------------------------

/// Mutable metadata attached to the auth account. The gateway stores these
/// under camelCase keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chatamata_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
}

/// The authenticated account as returned by the auth endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthUser {
    pub id: UserId,
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

/// An authenticated session: tokens plus the account they belong to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

impl Session {
    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn auth_user() -> AuthUser {
        AuthUser {
            id: UserId(Uuid::new_v4()),
            email: Some("nika@example.com".into()),
            user_metadata: UserMetadata {
                username: Some("nika".into()),
                full_name: Some("Nika K".into()),
                chatamata_id: Some("nika#0042".into()),
                profile_pic: Some("https://cdn.example/avatar.jpg".into()),
                banner_url: None,
                description: None,
                plan: Some(Plan::Premium),
            },
        }
    }

    #[test]
    fn test_profile_snapshot_from_auth_user() {
        let user = auth_user();
        let profile = Profile::from_auth_user(&user);
        assert_eq!(profile.id, user.id);
        assert_eq!(profile.username.as_deref(), Some("nika"));
        assert_eq!(profile.plan, Plan::Premium);
        assert!(profile.profile_setup_complete);
    }

    #[test]
    fn test_metadata_uses_camel_case_keys() {
        let meta = UserMetadata {
            full_name: Some("Nika K".into()),
            chatamata_id: Some("nika#0042".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["fullName"], "Nika K");
        assert_eq!(json["chatamataId"], "nika#0042");
        assert!(json.get("profilePic").is_none());
    }

    #[test]
    fn test_message_row_decodes_with_defaults() {
        let json = serde_json::json!({
            "id": 7,
            "conversation_id": 42,
            "sender_id": Uuid::nil(),
            "content": "hello",
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
            }
        });
        let msg: Message = serde_json::from_value(json).unwrap();
        assert_eq!(msg.id, MessageId(7));
        assert_eq!(msg.status, MessageStatus::Success);
        assert!(msg.read_at.is_none());
        assert!(msg.deleted_at.is_none());
        assert_eq!(msg.sender.plan, Plan::Free);
    }
}
