//! Aggregate deviation samples fed to the notification engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which aggregate value a target's tiers are computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationMetric {
    /// Plain share of differing pixels.
    #[default]
    Overall,
    /// Category-weighted share, when the sample carries one.
    Weighted,
}

/// Per-category detail attached to a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    /// Category name, e.g. a palette group or sub-area.
    pub name: String,
    /// Differing pixels in this category.
    pub diff_pixels: u64,
    /// Total reference pixels in this category.
    pub total_pixels: u64,
}

impl CategoryBreakdown {
    /// Share of differing pixels in percent; zero for an empty category.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total_pixels == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let pct = self.diff_pixels as f64 * 100.0 / self.total_pixels as f64;
        pct
    }
}

/// One observation of the watched area's deviation from its reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationSample {
    /// Percentage of reference pixels that differ.
    pub diff_percentage: f64,
    /// Category-weighted percentage, if computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weighted_diff_percentage: Option<f64>,
    /// Differing pixel count.
    pub diff_pixels: u64,
    /// Reference pixel count.
    pub total_pixels: u64,
    /// Optional per-category detail.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breakdown: Vec<CategoryBreakdown>,
    /// Observation time.
    pub observed_at: DateTime<Utc>,
}

impl DeviationSample {
    /// Sample carrying only an overall percentage.
    #[must_use]
    pub fn overall(diff_percentage: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            diff_percentage,
            weighted_diff_percentage: None,
            diff_pixels: 0,
            total_pixels: 0,
            breakdown: Vec::new(),
            observed_at,
        }
    }

    /// Builder-style setter for the weighted percentage.
    #[must_use]
    pub const fn with_weighted(mut self, weighted: f64) -> Self {
        self.weighted_diff_percentage = Some(weighted);
        self
    }

    /// Builder-style setter for raw counts.
    #[must_use]
    pub const fn with_counts(mut self, diff_pixels: u64, total_pixels: u64) -> Self {
        self.diff_pixels = diff_pixels;
        self.total_pixels = total_pixels;
        self
    }

    /// Value selected by `metric`; weighted falls back to overall when absent.
    #[must_use]
    pub fn value(&self, metric: NotificationMetric) -> f64 {
        match metric {
            NotificationMetric::Overall => self.diff_percentage,
            NotificationMetric::Weighted => self
                .weighted_diff_percentage
                .unwrap_or(self.diff_percentage),
        }
    }
}
