//! Publish-age bucketing
//!
//! Classifies records into one of eight fixed age ranges and tracks
//! per-bucket fill targets so the harvest balances its coverage across
//! content ages.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Day thresholds separating the buckets, oldest boundary last
const DAY_THRESHOLDS: [i64; 7] = [1, 7, 30, 90, 180, 365, 1095];

/// Stand-in older edge for the open-ended oldest bucket
const OPEN_ENDED_DAYS: i64 = 7300;

/// One of the eight fixed publish-age ranges
///
/// Ordering follows age: the youngest bucket sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgeBucket {
    #[serde(rename = "less-1day")]
    LessOneDay,
    #[serde(rename = "1day-1week")]
    OneDayOneWeek,
    #[serde(rename = "1week-1month")]
    OneWeekOneMonth,
    #[serde(rename = "1month-3month")]
    OneMonthThreeMonths,
    #[serde(rename = "3month-6month")]
    ThreeMonthsSixMonths,
    #[serde(rename = "6month-1year")]
    SixMonthsOneYear,
    #[serde(rename = "1year-3year")]
    OneYearThreeYears,
    #[serde(rename = "3year-more")]
    ThreeYearsMore,
}

impl AgeBucket {
    /// All buckets, youngest first
    pub const ALL: [AgeBucket; 8] = [
        Self::LessOneDay,
        Self::OneDayOneWeek,
        Self::OneWeekOneMonth,
        Self::OneMonthThreeMonths,
        Self::ThreeMonthsSixMonths,
        Self::SixMonthsOneYear,
        Self::OneYearThreeYears,
        Self::ThreeYearsMore,
    ];

    /// The document key for this bucket
    pub fn label(&self) -> &'static str {
        match self {
            Self::LessOneDay => "less-1day",
            Self::OneDayOneWeek => "1day-1week",
            Self::OneWeekOneMonth => "1week-1month",
            Self::OneMonthThreeMonths => "1month-3month",
            Self::ThreeMonthsSixMonths => "3month-6month",
            Self::SixMonthsOneYear => "6month-1year",
            Self::OneYearThreeYears => "1year-3year",
            Self::ThreeYearsMore => "3year-more",
        }
    }

    /// Parses a bucket from its document key
    pub fn from_label(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| b.label() == s)
    }

    /// Classifies a publish timestamp into its bucket relative to `now`
    ///
    /// The first threshold the age is still under wins, so a record aged
    /// exactly 7 days falls into `1week-1month` rather than `1day-1week`.
    pub fn classify(published_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let age = now - published_at;
        for (bucket, days) in Self::ALL.iter().zip(DAY_THRESHOLDS.iter()) {
            if age < Duration::days(*days) {
                return *bucket;
            }
        }
        Self::ThreeYearsMore
    }

    /// The older edge of this bucket's age range, in days
    pub fn older_edge_days(&self) -> i64 {
        match self {
            Self::LessOneDay => 1,
            Self::OneDayOneWeek => 7,
            Self::OneWeekOneMonth => 30,
            Self::OneMonthThreeMonths => 90,
            Self::ThreeMonthsSixMonths => 180,
            Self::SixMonthsOneYear => 365,
            Self::OneYearThreeYears => 1095,
            Self::ThreeYearsMore => OPEN_ENDED_DAYS,
        }
    }

    /// The earliest publish instant that still falls in this bucket
    pub fn published_floor(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.older_edge_days())
    }
}

impl fmt::Display for AgeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Per-bucket fill targets for one category
///
/// The configuration table sums to the category's total record target.
#[derive(Debug, Clone)]
pub struct BucketTargets {
    targets: BTreeMap<AgeBucket, usize>,
}

impl BucketTargets {
    pub fn new(targets: BTreeMap<AgeBucket, usize>) -> Self {
        Self { targets }
    }

    /// Target count for one bucket
    pub fn target(&self, bucket: AgeBucket) -> usize {
        self.targets.get(&bucket).copied().unwrap_or(0)
    }

    /// Sum of all bucket targets
    pub fn total(&self) -> usize {
        self.targets.values().sum()
    }

    /// How many more records each bucket still needs given current counts
    ///
    /// Buckets already at or above target report zero.
    pub fn shortfall(&self, counts: &BTreeMap<AgeBucket, usize>) -> BTreeMap<AgeBucket, usize> {
        let mut missing = BTreeMap::new();
        for bucket in AgeBucket::ALL {
            let have = counts.get(&bucket).copied().unwrap_or(0);
            missing.insert(bucket, self.target(bucket).saturating_sub(have));
        }
        missing
    }

    /// Total records still needed across all buckets
    pub fn total_remaining(&self, counts: &BTreeMap<AgeBucket, usize>) -> usize {
        self.shortfall(counts).values().sum()
    }

    /// True when every bucket has reached its target
    pub fn all_filled(&self, counts: &BTreeMap<AgeBucket, usize>) -> bool {
        self.total_remaining(counts) == 0
    }

    /// Search cursor derived from current shortfalls
    ///
    /// Returns the older edge of the oldest bucket that still needs
    /// records, so search focuses where the remaining gap is largest.
    /// Falls back to the oldest bucket's edge when everything is filled.
    pub fn published_after(
        &self,
        counts: &BTreeMap<AgeBucket, usize>,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let missing = self.shortfall(counts);
        for bucket in AgeBucket::ALL.iter().rev() {
            if missing.get(bucket).copied().unwrap_or(0) > 0 {
                return bucket.published_floor(now);
            }
        }
        AgeBucket::ThreeYearsMore.published_floor(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn hours_ago(h: i64) -> DateTime<Utc> {
        now() - Duration::hours(h)
    }

    #[test]
    fn test_classify_less_1day() {
        assert_eq!(AgeBucket::classify(hours_ago(23), now()), AgeBucket::LessOneDay);
    }

    #[test]
    fn test_classify_week_boundary() {
        // Boundary is "age < threshold": 6.99 days is still 1day-1week,
        // exactly 7.0 days and beyond moves to 1week-1month.
        let just_under = now() - Duration::minutes(7 * 24 * 60 - 10);
        let exactly = now() - Duration::days(7);
        let just_over = now() - Duration::minutes(7 * 24 * 60 + 10);

        assert_eq!(AgeBucket::classify(just_under, now()), AgeBucket::OneDayOneWeek);
        assert_eq!(AgeBucket::classify(exactly, now()), AgeBucket::OneWeekOneMonth);
        assert_eq!(AgeBucket::classify(just_over, now()), AgeBucket::OneWeekOneMonth);
    }

    #[test]
    fn test_classify_day_8_is_week_bucket() {
        let published = now() - Duration::days(8);
        assert_eq!(AgeBucket::classify(published, now()), AgeBucket::OneWeekOneMonth);
    }

    #[test]
    fn test_classify_oldest() {
        let published = now() - Duration::days(2000);
        assert_eq!(AgeBucket::classify(published, now()), AgeBucket::ThreeYearsMore);
    }

    #[test]
    fn test_label_roundtrip() {
        for bucket in AgeBucket::ALL {
            assert_eq!(AgeBucket::from_label(bucket.label()), Some(bucket));
        }
        assert_eq!(AgeBucket::from_label("2day-4day"), None);
    }

    #[test]
    fn test_ordering_young_first() {
        assert!(AgeBucket::LessOneDay < AgeBucket::ThreeYearsMore);
        let mut sorted = AgeBucket::ALL.to_vec();
        sorted.sort();
        assert_eq!(sorted, AgeBucket::ALL.to_vec());
    }

    #[test]
    fn test_serde_as_map_key() {
        let mut map = BTreeMap::new();
        map.insert(AgeBucket::LessOneDay, 1u32);
        map.insert(AgeBucket::ThreeYearsMore, 2u32);
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains("\"less-1day\""));
        assert!(json.contains("\"3year-more\""));

        let back: BTreeMap<AgeBucket, u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    fn targets() -> BucketTargets {
        let mut t = BTreeMap::new();
        for bucket in AgeBucket::ALL {
            t.insert(bucket, 2);
        }
        BucketTargets::new(t)
    }

    #[test]
    fn test_shortfall() {
        let mut counts = BTreeMap::new();
        counts.insert(AgeBucket::LessOneDay, 2);
        counts.insert(AgeBucket::OneDayOneWeek, 1);

        let missing = targets().shortfall(&counts);
        assert_eq!(missing[&AgeBucket::LessOneDay], 0);
        assert_eq!(missing[&AgeBucket::OneDayOneWeek], 1);
        assert_eq!(missing[&AgeBucket::ThreeYearsMore], 2);
        assert_eq!(targets().total_remaining(&counts), 13);
    }

    #[test]
    fn test_shortfall_overfilled_is_zero() {
        let mut counts = BTreeMap::new();
        counts.insert(AgeBucket::LessOneDay, 10);
        assert_eq!(targets().shortfall(&counts)[&AgeBucket::LessOneDay], 0);
    }

    #[test]
    fn test_all_filled() {
        let mut counts = BTreeMap::new();
        for bucket in AgeBucket::ALL {
            counts.insert(bucket, 2);
        }
        assert!(targets().all_filled(&counts));
        counts.insert(AgeBucket::LessOneDay, 1);
        assert!(!targets().all_filled(&counts));
    }

    #[test]
    fn test_published_after_favors_oldest_in_need() {
        let mut counts = BTreeMap::new();
        for bucket in AgeBucket::ALL {
            counts.insert(bucket, 2);
        }
        // Only the 1week-1month bucket still needs records
        counts.insert(AgeBucket::OneWeekOneMonth, 0);

        let cursor = targets().published_after(&counts, now());
        assert_eq!(cursor, now() - Duration::days(30));
    }

    #[test]
    fn test_published_after_open_ended_bucket() {
        let counts = BTreeMap::new();
        let cursor = targets().published_after(&counts, now());
        assert_eq!(cursor, now() - Duration::days(7300));
    }
}
