use axum::{
    extract::{Multipart, State},
    Extension, Json,
};
use rand::{distributions::Alphanumeric, Rng};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DeleteMediaRequest {
    pub url: String,
}

/// Accept only images and videos, capped at the configured ceiling, before
/// anything is handed to the object store.
fn validate_media(content_type: &str, size: u64, max_bytes: u64) -> Result<(), String> {
    if !content_type.starts_with("image/") && !content_type.starts_with("video/") {
        return Err("Only image and video files can be attached".into());
    }
    if size > max_bytes {
        return Err(format!(
            "File is too large (max {} MB)",
            max_bytes / (1024 * 1024)
        ));
    }
    Ok(())
}

/// Object key: `{user_id}/{entry_id|temp}/{millis}_{random}.{ext}`. The
/// leading user id segment is what ties an object to its owner; deletion
/// checks it (see [`key_owner`]).
fn object_key(user_id: Uuid, entry_id: Option<&str>, filename: &str) -> String {
    let ext = filename.rsplit('.').next().unwrap_or("bin");
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();
    let scope = entry_id.unwrap_or("temp");
    format!(
        "{}/{}/{}_{}.{}",
        user_id,
        scope,
        chrono::Utc::now().timestamp_millis(),
        suffix,
        ext
    )
}

/// The owner encoded in an object key's first path segment, if any.
fn key_owner(path: &str) -> Option<Uuid> {
    path.split('/').next().and_then(|s| Uuid::parse_str(s).ok())
}

/// POST /api/media — multipart form with a `file` field and an optional
/// `entry_id` text field. Returns the public URL of the stored object.
pub async fn upload_media(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> AppResult<Json<serde_json::Value>> {
    let mut entry_id: Option<String> = None;
    let mut file: Option<(String, String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::Validation("Malformed multipart request".into()))?
    {
        match field.name() {
            Some("entry_id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|_| AppError::Validation("Malformed entry_id field".into()))?;
                if !value.is_empty() {
                    entry_id = Some(value);
                }
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload.bin").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| AppError::Validation("Failed to read uploaded file".into()))?;
                file = Some((filename, content_type, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let (filename, content_type, bytes) =
        file.ok_or_else(|| AppError::Validation("Missing file field".into()))?;

    validate_media(&content_type, bytes.len() as u64, state.config.media_max_bytes)
        .map_err(AppError::Validation)?;

    let key = object_key(auth_user.id, entry_id.as_deref(), &filename);
    let url = state.storage.upload(&key, &content_type, bytes).await?;

    tracing::info!(user_id = %auth_user.id, key = %key, "Media uploaded");

    Ok(Json(serde_json::json!({ "url": url })))
}

/// DELETE /api/media — remove a previously uploaded object by public URL.
/// Only the owner may delete: the key must carry the caller's user id, or
/// the URL must be referenced by one of the caller's entries (pre-prefix
/// uploads).
pub async fn delete_media(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<DeleteMediaRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let Some(path) = state.storage.object_path_from_url(&body.url) else {
        return Err(AppError::Validation(
            "URL does not belong to the media bucket".into(),
        ));
    };

    if key_owner(&path) != Some(auth_user.id) {
        let referenced: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM diary_entries WHERE user_id = $1 AND $2 = ANY(media_urls))",
        )
        .bind(auth_user.id)
        .bind(&body.url)
        .fetch_one(&state.db)
        .await?;

        if !referenced {
            return Err(AppError::Forbidden);
        }
    }

    let deleted = state.storage.delete_by_url(&body.url).await?;
    if !deleted {
        tracing::warn!(user_id = %auth_user.id, url = %body.url, "Media object delete did not succeed");
    }

    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: u64 = 100 * 1024 * 1024;

    #[test]
    fn accepts_images_and_videos_under_limit() {
        assert!(validate_media("image/png", 1024, MAX).is_ok());
        assert!(validate_media("image/jpeg", MAX, MAX).is_ok());
        assert!(validate_media("video/mp4", 50 * 1024 * 1024, MAX).is_ok());
    }

    #[test]
    fn rejects_other_content_types() {
        assert!(validate_media("application/pdf", 1024, MAX).is_err());
        assert!(validate_media("text/html", 1024, MAX).is_err());
        assert!(validate_media("audio/mpeg", 1024, MAX).is_err());
    }

    #[test]
    fn rejects_files_over_the_ceiling() {
        let err = validate_media("image/png", MAX + 1, MAX).unwrap_err();
        assert!(err.contains("100 MB"));
    }

    #[test]
    fn object_key_scopes_by_user_then_entry() {
        let user = Uuid::new_v4();
        let key = object_key(user, Some("entry-42"), "photo.PNG");
        assert!(key.starts_with(&format!("{}/entry-42/", user)));
        assert!(key.ends_with(".PNG"));

        let key = object_key(user, None, "clip.mp4");
        assert!(key.starts_with(&format!("{}/temp/", user)));
        assert!(key.ends_with(".mp4"));
    }

    #[test]
    fn object_key_handles_missing_extension() {
        let key = object_key(Uuid::new_v4(), None, "noext");
        // a filename without a dot keeps itself as the "extension" tail
        assert!(key.ends_with(".noext"));
    }

    #[test]
    fn key_owner_comes_from_the_first_segment() {
        let user = Uuid::new_v4();
        let key = object_key(user, Some("entry-42"), "photo.png");
        assert_eq!(key_owner(&key), Some(user));
    }

    #[test]
    fn key_owner_rejects_foreign_and_legacy_keys() {
        let caller = Uuid::new_v4();
        let other = Uuid::new_v4();
        let foreign = object_key(other, None, "clip.mp4");
        assert_ne!(key_owner(&foreign), Some(caller));
        // keys from before the user-id prefix have no owner segment
        assert_eq!(key_owner("temp/1700000000000_abcd1234.png"), None);
    }
}
