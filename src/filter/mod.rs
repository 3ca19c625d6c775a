//! Adaptive engagement filtering
//!
//! This module maintains rolling samples of the engagement metrics seen so
//! far in a category and recomputes minimum-acceptance thresholds as
//! higher-quality content is discovered, so quota is not wasted
//! re-confirming already-known-good baselines. Thresholds chase a
//! percentile of the rolling arrays with exponential smoothing rather than
//! jumping, which keeps a single unusually good or bad batch from causing
//! oscillation.

mod buckets;

pub use buckets::{AgeBucket, BucketTargets};

use crate::config::FilterConfig;
use serde::Deserialize;

/// Combination rule over the three per-metric threshold comparisons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterRule {
    /// Every metric must meet its threshold
    All,
    /// At least one metric must meet its threshold
    Any,
    /// At least two of the three metrics must meet their thresholds.
    /// The default: ALL is too strict against platform-reported-zero
    /// metrics and ANY floods low-quality results.
    #[default]
    Majority,
}

/// Engagement counters for one candidate record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Engagement {
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
}

/// Self-adjusting quality filter over engagement metrics
///
/// State is per-category: `reset` is called at each category boundary so
/// thresholds reflect the category's own engagement distribution.
#[derive(Debug)]
pub struct AdaptiveFilter {
    config: FilterConfig,

    views: Vec<u64>,
    likes: Vec<u64>,
    comments: Vec<u64>,
    durations: Vec<u32>,

    min_views: u64,
    min_likes: u64,
    min_comments: u64,

    /// Accepted records since the last threshold recomputation
    since_recompute: usize,
}

impl AdaptiveFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            config,
            views: Vec::new(),
            likes: Vec::new(),
            comments: Vec::new(),
            durations: Vec::new(),
            min_views: 0,
            min_likes: 0,
            min_comments: 0,
            since_recompute: 0,
        }
    }

    /// Current thresholds as (views, likes, comments)
    pub fn thresholds(&self) -> (u64, u64, u64) {
        (self.min_views, self.min_likes, self.min_comments)
    }

    /// Number of samples in the rolling arrays
    pub fn sample_count(&self) -> usize {
        self.views.len()
    }

    /// Decides whether a candidate passes the filter
    ///
    /// The duration ceiling is a hard cutoff applied before the
    /// combination rule: anything longer than the configured maximum is
    /// rejected regardless of engagement.
    pub fn accepts(&self, engagement: &Engagement, duration_secs: Option<u32>) -> bool {
        if let Some(secs) = duration_secs {
            if secs > self.config.max_duration_secs {
                return false;
            }
        }

        let passed = [
            engagement.views >= self.min_views,
            engagement.likes >= self.min_likes,
            engagement.comments >= self.min_comments,
        ];
        let passed_count = passed.iter().filter(|p| **p).count();

        match self.config.rule {
            FilterRule::All => passed_count == 3,
            FilterRule::Any => passed_count >= 1,
            FilterRule::Majority => passed_count >= 2,
        }
    }

    /// Records an accepted candidate's metrics into the rolling arrays
    pub fn record_accepted(&mut self, engagement: &Engagement, duration_secs: Option<u32>) {
        self.views.push(engagement.views);
        self.likes.push(engagement.likes);
        self.comments.push(engagement.comments);
        if let Some(secs) = duration_secs {
            if secs > 0 {
                self.durations.push(secs);
            }
        }
        self.since_recompute += 1;
    }

    /// Recomputes thresholds when enough new samples have accumulated
    ///
    /// A no-op unless the rolling arrays hold at least `min_samples` AND
    /// (`force` or the accepted-since-last-recompute counter has reached
    /// the recompute interval). The first recompute after the sample floor
    /// is reached is always forced so filtering starts early. The counter
    /// resets after any recompute, forced or not.
    pub fn maybe_recompute(&mut self, force: bool) {
        if self.views.len() < self.config.min_samples {
            return;
        }

        let mut force = force;
        if self.min_views == 0 && self.min_likes == 0 && self.min_comments == 0 {
            force = true;
        }

        if !force && self.since_recompute < self.config.recompute_interval {
            return;
        }

        self.since_recompute = 0;

        self.min_views = self.adjusted_threshold(&self.views, self.min_views);
        self.min_likes = self.adjusted_threshold(&self.likes, self.min_likes);
        self.min_comments = self.adjusted_threshold(&self.comments, self.min_comments);

        tracing::info!(
            "Thresholds recomputed: views >= {}, likes >= {}, comments >= {} ({} samples, {} with duration)",
            self.min_views,
            self.min_likes,
            self.min_comments,
            self.views.len(),
            self.durations.len()
        );
    }

    /// Computes the new threshold for one metric
    ///
    /// Non-positive samples are excluded as outliers. When the current
    /// threshold is unset or below half the target percentile the
    /// threshold snaps directly; otherwise it moves a configured fraction
    /// of the way toward the percentile.
    fn adjusted_threshold(&self, samples: &[u64], current: u64) -> u64 {
        let mut positive: Vec<u64> = samples.iter().copied().filter(|v| *v > 0).collect();
        if positive.len() < self.config.min_samples {
            return current;
        }
        positive.sort_unstable();

        let q = percentile(&positive, self.config.quality_percentile);

        let new = if current == 0 || (current as f64) < q * 0.5 {
            q
        } else {
            current as f64 + (q - current as f64) * self.config.smoothing
        };

        new.max(0.0) as u64
    }

    /// Clears samples and thresholds at a category boundary
    pub fn reset(&mut self) {
        self.views.clear();
        self.likes.clear();
        self.comments.clear();
        self.durations.clear();
        self.min_views = 0;
        self.min_likes = 0;
        self.min_comments = 0;
        self.since_recompute = 0;
    }

    /// Reseeds the rolling arrays from previously persisted records
    ///
    /// Used when resuming an interrupted harvest: every record already
    /// admitted passed the filter at the time, so all of them re-enter the
    /// arrays, and thresholds are recomputed from the full set. When fewer
    /// than `min_samples` records exist a low-percentile floor is set so
    /// early filtering still cuts off the very worst candidates.
    pub fn seed<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = (Engagement, Option<u32>)>,
    {
        for (engagement, duration) in records {
            self.views.push(engagement.views);
            self.likes.push(engagement.likes);
            self.comments.push(engagement.comments);
            if let Some(secs) = duration {
                if secs > 0 {
                    self.durations.push(secs);
                }
            }
        }

        if self.views.len() >= self.config.min_samples {
            self.maybe_recompute(true);
            self.since_recompute = 0;
        } else if !self.views.is_empty() {
            self.min_views = seed_floor(&self.views);
            self.min_likes = seed_floor(&self.likes);
            self.min_comments = seed_floor(&self.comments);
        }
    }
}

fn seed_floor(samples: &[u64]) -> u64 {
    let mut sorted: Vec<u64> = samples.to_vec();
    sorted.sort_unstable();
    percentile(&sorted, 10.0) as u64
}

/// Linear-interpolated percentile of a sorted slice
fn percentile(sorted: &[u64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0] as f64;
    }

    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo] as f64;
    }
    let weight = rank - lo as f64;
    sorted[lo] as f64 * (1.0 - weight) + sorted[hi] as f64 * weight
}
