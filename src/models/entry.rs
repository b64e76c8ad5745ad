use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A mood expressed as a moon phase. The four values are fixed app
/// vocabulary; the display mapping lives in [`MoodMapping`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "moon_phase", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MoonPhase {
    New,
    Waxing,
    Full,
    Waning,
}

impl MoonPhase {
    /// Stable iteration order used for counting and tie-breaking.
    pub const ALL: [MoonPhase; 4] = [
        MoonPhase::New,
        MoonPhase::Waxing,
        MoonPhase::Full,
        MoonPhase::Waning,
    ];
}

/// Static display metadata for a moon phase. Configuration data, not user
/// state.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MoodMapping {
    pub phase: MoonPhase,
    pub emoji: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub const MOOD_MAPPINGS: [MoodMapping; 4] = [
    MoodMapping {
        phase: MoonPhase::New,
        emoji: "\u{1F311}",
        name: "New Moon",
        description: "down / lethargic",
    },
    MoodMapping {
        phase: MoonPhase::Waxing,
        emoji: "\u{1F313}",
        name: "Waxing Moon",
        description: "focused / accomplished",
    },
    MoodMapping {
        phase: MoonPhase::Full,
        emoji: "\u{1F315}",
        name: "Full Moon",
        description: "joyful / full of energy",
    },
    MoodMapping {
        phase: MoonPhase::Waning,
        emoji: "\u{1F317}",
        name: "Waning Moon",
        description: "calm / stable",
    },
];

pub fn mood_mapping(phase: MoonPhase) -> &'static MoodMapping {
    // ALL and MOOD_MAPPINGS share the same order
    &MOOD_MAPPINGS[MoonPhase::ALL.iter().position(|p| *p == phase).unwrap_or(0)]
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DiaryEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub mood: MoonPhase,
    pub note: Option<String>,
    pub media_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEntryRequest {
    pub date: NaiveDate,
    pub mood: MoonPhase,
    pub note: Option<String>,
    pub media_urls: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEntryRequest {
    pub date: Option<NaiveDate>,
    pub mood: Option<MoonPhase>,
    pub note: Option<String>,
    pub media_urls: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct EntryQuery {
    pub date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Month filter in `YYYY-MM` form (feed view).
    pub month: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mood_mapping_lookup_matches_phase() {
        for phase in MoonPhase::ALL {
            assert_eq!(mood_mapping(phase).phase, phase);
        }
        assert_eq!(mood_mapping(MoonPhase::Full).name, "Full Moon");
    }
}
