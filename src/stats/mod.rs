//! Pure aggregation over a user's diary entries.
//!
//! Everything here is a plain data transformation: no I/O, no clock reads.
//! Callers pass the entry list, the period selector, and the reference date.
//! The balance/trend thresholds are heuristic constants, not statistically
//! derived; they live in [`Thresholds`] so they stay tunable in one place.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::Serialize;

use crate::models::entry::{mood_mapping, DiaryEntry, MoonPhase};

/// Heuristic cutoffs for the mood-balance and trend classification.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    /// New-moon ratio above which the period is classified negative.
    pub negative_ratio: f64,
    /// Full+waxing ratio above which the period is classified positive.
    pub positive_ratio: f64,
    /// Waning ratio above which the period is classified neutral.
    pub neutral_ratio: f64,
    /// Positivity delta (percentage points as a fraction) for trend detection.
    pub trend_delta: f64,
    /// Size of the trailing trend window in days.
    pub trend_window_days: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            negative_ratio: 0.4,
            positive_ratio: 0.5,
            neutral_ratio: 0.4,
            trend_delta: 0.15,
            trend_window_days: 14,
        }
    }
}

/// Aggregation window selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Month { year: i32, month: u32 },
    Year { year: i32 },
    All,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct MoodCounts {
    pub new: usize,
    pub waxing: usize,
    pub full: usize,
    pub waning: usize,
}

impl MoodCounts {
    pub fn get(&self, phase: MoonPhase) -> usize {
        match phase {
            MoonPhase::New => self.new,
            MoonPhase::Waxing => self.waxing,
            MoonPhase::Full => self.full,
            MoonPhase::Waning => self.waning,
        }
    }

    fn bump(&mut self, phase: MoonPhase) {
        match phase {
            MoonPhase::New => self.new += 1,
            MoonPhase::Waxing => self.waxing += 1,
            MoonPhase::Full => self.full += 1,
            MoonPhase::Waning => self.waning += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.new + self.waxing + self.full + self.waning
    }
}

/// One bar of the activity chart: a day key (`YYYY-MM-DD`) for monthly
/// periods, a month key (`YYYY-MM`) otherwise.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ActivityBucket {
    pub bucket: String,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MoodBalance {
    Balanced,
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
    Insufficient,
}

#[derive(Debug, Serialize)]
pub struct Analysis {
    pub summary: String,
    pub insights: Vec<String>,
    pub dominant_mood: Option<MoonPhase>,
    pub mood_balance: MoodBalance,
    pub recent_trend: Trend,
}

/// The full stats payload for one period.
#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub total_entries: usize,
    pub mood_counts: MoodCounts,
    pub activity: Vec<ActivityBucket>,
    pub record_rate: u32,
    pub analysis: Analysis,
}

pub fn build_report(
    entries: &[DiaryEntry],
    period: Period,
    today: NaiveDate,
    thresholds: &Thresholds,
) -> StatsReport {
    let filtered = filter_by_period(entries, period);
    StatsReport {
        total_entries: filtered.len(),
        mood_counts: mood_counts(&filtered),
        activity: activity_series(&filtered, period, today),
        record_rate: record_rate(&filtered, period, today),
        analysis: analyze(&filtered, today, thresholds),
    }
}

pub fn filter_by_period(entries: &[DiaryEntry], period: Period) -> Vec<DiaryEntry> {
    entries
        .iter()
        .filter(|e| match period {
            Period::Month { year, month } => {
                e.date.year() == year && e.date.month() == month
            }
            Period::Year { year } => e.date.year() == year,
            Period::All => true,
        })
        .cloned()
        .collect()
}

pub fn mood_counts(entries: &[DiaryEntry]) -> MoodCounts {
    let mut counts = MoodCounts::default();
    for entry in entries {
        counts.bump(entry.mood);
    }
    counts
}

/// Time-bucketed entry counts. Only buckets with at least one entry appear,
/// in ascending bucket order.
pub fn activity_series(
    entries: &[DiaryEntry],
    period: Period,
    today: NaiveDate,
) -> Vec<ActivityBucket> {
    let mut buckets: BTreeMap<String, usize> = BTreeMap::new();

    match period {
        Period::Month { .. } => {
            for e in entries {
                *buckets.entry(e.date.format("%Y-%m-%d").to_string()).or_default() += 1;
            }
        }
        Period::Year { .. } => {
            for e in entries {
                *buckets.entry(e.date.format("%Y-%m").to_string()).or_default() += 1;
            }
        }
        Period::All => {
            // Trailing 12 calendar months only
            let start = today
                .checked_sub_months(Months::new(12))
                .unwrap_or(NaiveDate::MIN);
            for e in entries.iter().filter(|e| e.date > start && e.date <= today) {
                *buckets.entry(e.date.format("%Y-%m").to_string()).or_default() += 1;
            }
        }
    }

    buckets
        .into_iter()
        .map(|(bucket, count)| ActivityBucket { bucket, count })
        .collect()
}

/// Percentage of days in the period with at least one entry recorded,
/// counting multiple entries per day at face value (as the original did).
pub fn record_rate(entries: &[DiaryEntry], period: Period, today: NaiveDate) -> u32 {
    if entries.is_empty() {
        return 0;
    }
    let count = entries.len() as f64;

    let days = match period {
        Period::Month { year, month } => days_in_month(year, month) as f64,
        Period::Year { year } => {
            if is_leap_year(year) {
                366.0
            } else {
                365.0
            }
        }
        Period::All => {
            let first = entries.iter().map(|e| e.date).min().unwrap_or(today);
            let days_since_first = (today - first).num_days();
            if days_since_first <= 0 {
                return 0;
            }
            days_since_first as f64
        }
    };

    (count / days * 100.0).round() as u32
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month");
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1).expect("valid date")
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1).expect("valid date")
    };
    (next - first).num_days() as u32
}

fn is_positive(phase: MoonPhase) -> bool {
    matches!(phase, MoonPhase::Full | MoonPhase::Waxing)
}

pub fn analyze(entries: &[DiaryEntry], today: NaiveDate, thresholds: &Thresholds) -> Analysis {
    if entries.is_empty() {
        return Analysis {
            summary: "No diary entries yet. Write your first entry! \u{1F319}".into(),
            insights: Vec::new(),
            dominant_mood: None,
            mood_balance: MoodBalance::Balanced,
            recent_trend: Trend::Insufficient,
        };
    }

    let counts = mood_counts(entries);
    let total = entries.len();

    // Most-recorded mood; ties keep the earlier phase in declaration order.
    let mut dominant = MoonPhase::New;
    for phase in MoonPhase::ALL {
        if counts.get(phase) > counts.get(dominant) {
            dominant = phase;
        }
    }
    let dominant_map = mood_mapping(dominant);
    let dominant_pct = (counts.get(dominant) as f64 / total as f64 * 100.0).round() as u32;

    let positive_ratio = (counts.full + counts.waxing) as f64 / total as f64;
    let negative_ratio = counts.new as f64 / total as f64;
    let neutral_ratio = counts.waning as f64 / total as f64;

    let mood_balance = if negative_ratio > thresholds.negative_ratio {
        MoodBalance::Negative
    } else if positive_ratio > thresholds.positive_ratio {
        MoodBalance::Positive
    } else if neutral_ratio > thresholds.neutral_ratio {
        MoodBalance::Neutral
    } else {
        MoodBalance::Balanced
    };

    // Trailing window vs everything before it. Entries dated exactly on the
    // cutoff fall in neither bucket.
    let cutoff = today - Duration::days(thresholds.trend_window_days);
    let recent: Vec<&DiaryEntry> = entries.iter().filter(|e| e.date > cutoff).collect();
    let older: Vec<&DiaryEntry> = entries.iter().filter(|e| e.date < cutoff).collect();

    let recent_trend = if recent.is_empty() {
        Trend::Insufficient
    } else if older.is_empty() {
        Trend::Stable
    } else {
        let recent_positive =
            recent.iter().filter(|e| is_positive(e.mood)).count() as f64 / recent.len() as f64;
        let older_positive =
            older.iter().filter(|e| is_positive(e.mood)).count() as f64 / older.len() as f64;

        if recent_positive > older_positive + thresholds.trend_delta {
            Trend::Improving
        } else if recent_positive < older_positive - thresholds.trend_delta {
            Trend::Declining
        } else {
            Trend::Stable
        }
    };

    let summary = if total < 5 {
        format!(
            "{} ({}) was your most recorded mood at {}%. Write more entries for a more accurate analysis!",
            dominant_map.name, dominant_map.emoji, dominant_pct
        )
    } else {
        format!(
            "Looking at your mood pattern, {} ({}) was your most recorded mood at {}%.",
            dominant_map.name, dominant_map.emoji, dominant_pct
        )
    };

    let mut insights = Vec::new();

    match mood_balance {
        MoodBalance::Positive => insights.push(format!(
            "Positive moods (Full Moon, Waxing Moon) make up {}% of your entries. Plenty of energetic days! \u{1F31F}",
            (positive_ratio * 100.0).round() as u32
        )),
        MoodBalance::Negative => insights.push(format!(
            "New Moon moods are at {}%. Hard moments are worth recording too. Give yourself room to acknowledge and care for how you feel. \u{1F499}",
            (negative_ratio * 100.0).round() as u32
        )),
        MoodBalance::Neutral => insights.push(format!(
            "Calm moods (Waning Moon) make up {}% of your entries. A peaceful, steady stretch. \u{1F60C}",
            (neutral_ratio * 100.0).round() as u32
        )),
        MoodBalance::Balanced => insights.push(
            "Your moods are fairly evenly distributed. You are experiencing a rich mix of feelings. \u{2728}".into(),
        ),
    }

    match recent_trend {
        Trend::Improving => insights.push(
            "Positive moods have been rising over the last two weeks. A good change is under way! \u{1F308}".into(),
        ),
        Trend::Declining => insights.push(
            "Your mood has shifted over the last two weeks. Consider taking time to rest and look after yourself. \u{1F4AD}".into(),
        ),
        Trend::Stable => {
            insights.push("Your recent mood pattern has stayed steady.".into())
        }
        Trend::Insufficient => {}
    }

    // Recording cadence, once there is enough history to say anything.
    let first_date = entries.iter().map(|e| e.date).min().unwrap_or(today);
    let days_since_first = (today - first_date).num_days();
    if total >= 10 && days_since_first > 0 {
        let weeks = (days_since_first as f64 / 7.0).max(1.0);
        let per_week = total as f64 / weeks;
        if per_week >= 4.0 {
            insights.push(format!(
                "You are averaging {:.1} entries a week. Great consistency! \u{1F4DD}",
                per_week
            ));
        } else if per_week >= 2.0 {
            insights.push(format!(
                "You are averaging about {:.1} entries a week. Keeping at it is what counts! \u{1F4AA}",
                per_week
            ));
        }
    }

    if counts.full as f64 > total as f64 * 0.4 {
        insights.push(format!(
            "Full Moon moods are at {}%. You are carrying a lot of energy! \u{2B50}",
            (counts.full as f64 / total as f64 * 100.0).round() as u32
        ));
    }

    Analysis {
        summary,
        insights,
        dominant_mood: Some(dominant),
        mood_balance,
        recent_trend,
    }
}
