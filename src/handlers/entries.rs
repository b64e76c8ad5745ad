use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{Datelike, NaiveDate};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::entry::{
    CreateEntryRequest, DiaryEntry, EntryQuery, UpdateEntryRequest, MOOD_MAPPINGS,
};
use crate::AppState;

const DEFAULT_PER_PAGE: i64 = 10;
const MAX_PER_PAGE: i64 = 100;

/// Map a unique violation from the legacy one-entry-per-date schema revision
/// to a user-facing conflict. Everything else passes through.
fn map_insert_error(err: sqlx::Error, date: NaiveDate) -> AppError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some("23505") {
            return AppError::Conflict(format!(
                "An entry already exists for {}. Edit it or pick another date.",
                date
            ));
        }
    }
    AppError::Database(err)
}

pub async fn create_entry(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<CreateEntryRequest>,
) -> AppResult<Json<DiaryEntry>> {
    let media_urls = body.media_urls.unwrap_or_default();

    let entry = sqlx::query_as::<_, DiaryEntry>(
        r#"
        INSERT INTO diary_entries (id, user_id, date, mood, note, media_urls)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth_user.id)
    .bind(body.date)
    .bind(body.mood)
    .bind(&body.note)
    .bind(&media_urls)
    .fetch_one(&state.db)
    .await
    .map_err(|e| map_insert_error(e, body.date))?;

    Ok(Json(entry))
}

pub async fn get_entry(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(entry_id): Path<Uuid>,
) -> AppResult<Json<DiaryEntry>> {
    let entry = sqlx::query_as::<_, DiaryEntry>(
        "SELECT * FROM diary_entries WHERE id = $1 AND user_id = $2",
    )
    .bind(entry_id)
    .bind(auth_user.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("Entry not found".into()))?;

    Ok(Json(entry))
}

/// List entries. Three query forms, checked in order:
/// `?date=` (one day, newest first), `?start_date=&end_date=` (range,
/// ascending), and the paginated feed (`?month=`, `?page=`, `?per_page=`)
/// ordered date desc with created_at desc tie-break.
pub async fn list_entries(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<EntryQuery>,
) -> AppResult<Json<Vec<DiaryEntry>>> {
    if let Some(date) = query.date {
        let entries = sqlx::query_as::<_, DiaryEntry>(
            r#"
            SELECT * FROM diary_entries
            WHERE user_id = $1 AND date = $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(auth_user.id)
        .bind(date)
        .fetch_all(&state.db)
        .await?;
        return Ok(Json(entries));
    }

    if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
        let entries = sqlx::query_as::<_, DiaryEntry>(
            r#"
            SELECT * FROM diary_entries
            WHERE user_id = $1 AND date BETWEEN $2 AND $3
            ORDER BY date ASC
            "#,
        )
        .bind(auth_user.id)
        .bind(start)
        .bind(end)
        .fetch_all(&state.db)
        .await?;
        return Ok(Json(entries));
    }

    if query.start_date.is_some() != query.end_date.is_some() {
        return Err(AppError::Validation(
            "start_date and end_date must be provided together".into(),
        ));
    }

    let month_range = match query.month.as_deref() {
        Some(month) => Some(parse_month_range(month)?),
        None => None,
    };

    let page = query.page.unwrap_or(0).max(0);
    let per_page = query
        .per_page
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);
    let offset = page * per_page;

    let entries = if let Some((month_start, month_end)) = month_range {
        sqlx::query_as::<_, DiaryEntry>(
            r#"
            SELECT * FROM diary_entries
            WHERE user_id = $1 AND date BETWEEN $2 AND $3
            ORDER BY date DESC, created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(auth_user.id)
        .bind(month_start)
        .bind(month_end)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&state.db)
        .await?
    } else {
        sqlx::query_as::<_, DiaryEntry>(
            r#"
            SELECT * FROM diary_entries
            WHERE user_id = $1
            ORDER BY date DESC, created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(auth_user.id)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&state.db)
        .await?
    };

    Ok(Json(entries))
}

pub async fn update_entry(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(entry_id): Path<Uuid>,
    Json(body): Json<UpdateEntryRequest>,
) -> AppResult<Json<DiaryEntry>> {
    let entry = sqlx::query_as::<_, DiaryEntry>(
        r#"
        UPDATE diary_entries SET
            date = COALESCE($3, date),
            mood = COALESCE($4, mood),
            note = COALESCE($5, note),
            media_urls = COALESCE($6, media_urls),
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(entry_id)
    .bind(auth_user.id)
    .bind(body.date)
    .bind(body.mood)
    .bind(&body.note)
    .bind(&body.media_urls)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("Entry not found".into()))?;

    Ok(Json(entry))
}

pub async fn delete_entry(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(entry_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let entry = sqlx::query_as::<_, DiaryEntry>(
        "SELECT * FROM diary_entries WHERE id = $1 AND user_id = $2",
    )
    .bind(entry_id)
    .bind(auth_user.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("Entry not found".into()))?;

    // Media objects go first, best effort; the row delete is the real delete.
    if !entry.media_urls.is_empty() {
        state.storage.delete_all_by_url(&entry.media_urls).await;
    }

    sqlx::query("DELETE FROM diary_entries WHERE id = $1 AND user_id = $2")
        .bind(entry_id)
        .bind(auth_user.id)
        .execute(&state.db)
        .await?;

    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Pick one uniformly random entry (the "random diary" feature).
pub async fn random_entry(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<DiaryEntry>> {
    let entry = sqlx::query_as::<_, DiaryEntry>(
        "SELECT * FROM diary_entries WHERE user_id = $1 ORDER BY random() LIMIT 1",
    )
    .bind(auth_user.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("No entries yet".into()))?;

    Ok(Json(entry))
}

/// GET /api/moods — the fixed mood vocabulary with display metadata. Static
/// data, no auth required.
pub async fn list_moods() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "moods": MOOD_MAPPINGS }))
}

/// Parse `YYYY-MM` into the month's first and last calendar day.
fn parse_month_range(month: &str) -> AppResult<(NaiveDate, NaiveDate)> {
    let parsed = NaiveDate::parse_from_str(&format!("{}-01", month), "%Y-%m-%d")
        .map_err(|_| AppError::Validation("month must be in YYYY-MM format".into()))?;
    let days = crate::stats::days_in_month(parsed.year(), parsed.month());
    let last = parsed + chrono::Duration::days(days as i64 - 1);
    Ok((parsed, last))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_range_covers_whole_month() {
        let (start, end) = parse_month_range("2025-02").unwrap();
        assert_eq!(start, "2025-02-01".parse::<NaiveDate>().unwrap());
        assert_eq!(end, "2025-02-28".parse::<NaiveDate>().unwrap());

        let (start, end) = parse_month_range("2024-02").unwrap();
        assert_eq!(start, "2024-02-01".parse::<NaiveDate>().unwrap());
        assert_eq!(end, "2024-02-29".parse::<NaiveDate>().unwrap());
    }

    #[test]
    fn month_range_rejects_garbage() {
        assert!(parse_month_range("2025").is_err());
        assert!(parse_month_range("2025-13").is_err());
        assert!(parse_month_range("march").is_err());
    }
}
