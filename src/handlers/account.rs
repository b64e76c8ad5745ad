use axum::{extract::State, Extension, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;

use crate::auth::middleware::AuthUser;
use crate::auth::password::verify_password;
use crate::error::{AppError, AppResult};
use crate::models::user::User;
use crate::AppState;

/// Session cookie names cleared on account deletion: the current name plus
/// the legacy spellings older clients may still hold.
pub const SESSION_COOKIES: [&str; 4] = [
    "moondiary.session-token",
    "__Secure-moondiary.session-token",
    "session-token",
    "__Secure-session-token",
];

#[derive(Debug, Deserialize)]
pub struct DeleteAccountRequest {
    pub password: String,
}

/// DELETE /api/account/delete
///
/// Re-verifies the password (credential failure is reported distinctly from
/// deletion failure), purges the user's media objects best-effort, deletes
/// the user row (entries and refresh tokens cascade), and clears session
/// cookies. A failure after the row delete is surfaced as-is; there is no
/// rollback of a partial deletion.
pub async fn delete_account(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    jar: CookieJar,
    Json(body): Json<DeleteAccountRequest>,
) -> AppResult<(CookieJar, Json<serde_json::Value>)> {
    // The deletion route keeps the 401/400/500 status family of the
    // original contract, so a missing password is 400, not 422.
    if body.password.trim().is_empty() {
        return Err(AppError::BadRequest("Password is required".into()));
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(auth_user.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound("User not found".into()))?;

    // Re-authentication before the destructive step
    if !verify_password(&body.password, &user.password_hash)? {
        return Err(AppError::Unauthorized);
    }

    let media_urls: Vec<Vec<String>> = sqlx::query_scalar(
        "SELECT media_urls FROM diary_entries WHERE user_id = $1",
    )
    .bind(auth_user.id)
    .fetch_all(&state.db)
    .await?;
    let media_urls: Vec<String> = media_urls.into_iter().flatten().collect();

    if !media_urls.is_empty() {
        state.storage.delete_all_by_url(&media_urls).await;
    }

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(auth_user.id)
        .execute(&state.db)
        .await?;

    tracing::info!(user_id = %auth_user.id, "Account deleted");

    let mut jar = jar;
    for name in SESSION_COOKIES {
        jar = jar.remove(Cookie::build((name, "")).path("/").build());
    }

    Ok((jar, Json(serde_json::json!({ "ok": true }))))
}
