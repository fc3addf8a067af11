//! Object storage client: authenticated uploads and public URL derivation
//! for the avatar, banner, and chat-image buckets.

use bytes::Bytes;
use tracing::info;

use chatamata_shared::types::{ConversationId, UserId};

use crate::error::Result;
use crate::http::Gateway;

impl Gateway {
    /// Upload a file to a bucket. With `upsert` set, an existing object at
    /// the same path is replaced (profile media reuses one path per user).
    pub async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        content_type: &str,
        upsert: bool,
    ) -> Result<()> {
        let url = format!("{}/object/{}/{}", self.config().storage_url(), bucket, path);
        let resp = self
            .authed(self.http().post(&url).body(bytes))
            .header("Content-Type", content_type)
            .header("x-upsert", if upsert { "true" } else { "false" })
            .send()
            .await?;
        Self::check(resp).await?;
        info!(bucket, path, "Uploaded object");
        Ok(())
    }

    /// Public URL for an object in a public bucket. Purely derived; no
    /// remote call.
    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/object/public/{}/{}",
            self.config().storage_url(),
            bucket,
            path
        )
    }
}

/// Storage path for a chat image upload: scoped to the conversation, named
/// by upload time so concurrent uploads never collide on a filename.
pub fn chat_image_path(conversation_id: ConversationId, millis: i64, file_name: &str) -> String {
    let ext = file_name.rsplit('.').next().filter(|e| !e.is_empty() && *e != file_name);
    format!("{}/{}.{}", conversation_id, millis, ext.unwrap_or("bin"))
}

/// Storage path for profile media; one object per user per kind.
pub fn profile_media_path(user_id: &UserId, kind: &str) -> String {
    format!("{user_id}/{kind}.jpg")
}
