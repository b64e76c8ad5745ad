use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{Datelike, Utc};
use serde::Deserialize;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::entry::DiaryEntry;
use crate::stats::{build_report, Period, StatsReport, Thresholds};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub period: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
}

fn parse_period(query: &StatsQuery, today: chrono::NaiveDate) -> AppResult<Period> {
    let year = query.year.unwrap_or_else(|| today.year());
    let month = query.month.unwrap_or_else(|| today.month());

    match query.period.as_deref().unwrap_or("month") {
        "month" => {
            if !(1..=12).contains(&month) {
                return Err(AppError::Validation("month must be 1-12".into()));
            }
            Ok(Period::Month { year, month })
        }
        "year" => Ok(Period::Year { year }),
        "all" => Ok(Period::All),
        other => Err(AppError::Validation(format!(
            "Unknown period '{}': expected month, year, or all",
            other
        ))),
    }
}

/// GET /api/stats — aggregate the caller's entries for one period. The
/// heavy lifting is in the pure stats module; this handler only fetches and
/// delegates.
pub async fn get_stats(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<StatsQuery>,
) -> AppResult<Json<StatsReport>> {
    let today = Utc::now().date_naive();
    let period = parse_period(&query, today)?;

    let entries = sqlx::query_as::<_, DiaryEntry>(
        "SELECT * FROM diary_entries WHERE user_id = $1",
    )
    .bind(auth_user.id)
    .fetch_all(&state.db)
    .await?;

    let report = build_report(&entries, period, today, &Thresholds::default());
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(period: Option<&str>, year: Option<i32>, month: Option<u32>) -> StatsQuery {
        StatsQuery {
            period: period.map(Into::into),
            year,
            month,
        }
    }

    #[test]
    fn defaults_to_current_month() {
        let today = "2025-06-15".parse().unwrap();
        let period = parse_period(&q(None, None, None), today).unwrap();
        assert_eq!(period, Period::Month { year: 2025, month: 6 });
    }

    #[test]
    fn explicit_periods_parse() {
        let today = "2025-06-15".parse().unwrap();
        assert_eq!(
            parse_period(&q(Some("year"), Some(2024), None), today).unwrap(),
            Period::Year { year: 2024 }
        );
        assert_eq!(
            parse_period(&q(Some("all"), None, None), today).unwrap(),
            Period::All
        );
    }

    #[test]
    fn rejects_unknown_period_and_bad_month() {
        let today = "2025-06-15".parse().unwrap();
        assert!(parse_period(&q(Some("week"), None, None), today).is_err());
        assert!(parse_period(&q(Some("month"), None, Some(13)), today).is_err());
    }
}
