//! Per-actor activity records and the painter identity returned by lookups.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::pixel::PixelCoordinate;

/// Direction of a pixel transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    /// The pixel entered the diff (it was vandalized).
    Vandal,
    /// The pixel left the diff (it was restored).
    Restore,
}

impl ActivityKind {
    /// Wire discriminator handed to burst callbacks.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vandal => "vandal",
            Self::Restore => "restore",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External account an actor has been linked to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedIdentity {
    /// Stable account id on the external platform.
    pub account_id: String,
    /// Display handle on the external platform, if known.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub handle: String,
}

/// Identity of whoever painted a pixel, as reported by the upstream lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PainterInfo {
    /// Numeric upstream id; never zero for a real painter.
    pub id: u64,
    /// Display name (may be empty).
    pub name: String,
    /// Alliance/group name (may be empty).
    pub alliance_name: String,
    /// Linked external identity, when the upstream exposes one.
    pub linked: Option<LinkedIdentity>,
}

impl PainterInfo {
    /// Key under which this painter's [`ActorRecord`] is stored.
    #[must_use]
    pub fn actor_id(&self) -> String {
        self.id.to_string()
    }
}

/// Accumulated statistics for one external actor.
///
/// `activity_score` always equals `restored_count - vandal_count`, and for every
/// date the daily score equals the restored bucket minus the vandal bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRecord {
    /// Upstream actor id.
    pub id: String,
    /// Last known display name.
    #[serde(default)]
    pub name: String,
    /// Last known alliance name.
    #[serde(default, rename = "allianceName")]
    pub alliance_name: String,
    /// Linked external account, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked: Option<LinkedIdentity>,
    /// Timestamp of the most recent attributed action.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_seen: Option<DateTime<Utc>>,
    /// Number of vandalized pixels attributed to this actor.
    #[serde(default)]
    pub vandal_count: u64,
    /// Number of restored pixels attributed to this actor.
    #[serde(default)]
    pub restored_count: u64,
    /// Derived score: restorations minus vandalisms.
    #[serde(default)]
    pub activity_score: i64,
    /// Vandal counts keyed by reporting-timezone date (`YYYY-MM-DD`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub daily_vandal_counts: BTreeMap<String, u64>,
    /// Restore counts keyed by reporting-timezone date.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub daily_restored_counts: BTreeMap<String, u64>,
    /// Derived daily scores keyed by reporting-timezone date.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub daily_activity_scores: BTreeMap<String, i64>,
    /// Last pixel this actor touched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_pixel: Option<PixelCoordinate>,
    /// One-shot flag: a vandal burst notification was already emitted.
    #[serde(default)]
    pub vandal_burst_notified: bool,
    /// One-shot flag: a restore burst notification was already emitted.
    #[serde(default)]
    pub restore_burst_notified: bool,
    // Flat link fields written by older documents; folded into `linked` by `normalize`.
    #[serde(default, rename = "discord_id", alias = "discordId", skip_serializing)]
    legacy_account_id: String,
    #[serde(default, rename = "discord", alias = "discord_name", skip_serializing)]
    legacy_handle: String,
}

impl ActorRecord {
    /// Empty record for an actor id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            alliance_name: String::new(),
            linked: None,
            last_seen: None,
            vandal_count: 0,
            restored_count: 0,
            activity_score: 0,
            daily_vandal_counts: BTreeMap::new(),
            daily_restored_counts: BTreeMap::new(),
            daily_activity_scores: BTreeMap::new(),
            last_pixel: None,
            vandal_burst_notified: false,
            restore_burst_notified: false,
            legacy_account_id: String::new(),
            legacy_handle: String::new(),
        }
    }

    /// Record one attributed action.
    pub fn record(
        &mut self,
        kind: ActivityKind,
        at: DateTime<Utc>,
        date_key: &str,
        pixel: PixelCoordinate,
    ) {
        match kind {
            ActivityKind::Vandal => {
                self.vandal_count += 1;
                *self.daily_vandal_counts.entry(date_key.to_owned()).or_default() += 1;
                self.activity_score -= 1;
                *self.daily_activity_scores.entry(date_key.to_owned()).or_default() -= 1;
            }
            ActivityKind::Restore => {
                self.restored_count += 1;
                *self.daily_restored_counts.entry(date_key.to_owned()).or_default() += 1;
                self.activity_score += 1;
                *self.daily_activity_scores.entry(date_key.to_owned()).or_default() += 1;
            }
        }
        self.last_seen = Some(at);
        self.last_pixel = Some(pixel);
    }

    /// Copy non-empty identity fields from a lookup result.
    pub fn refresh_identity(&mut self, painter: &PainterInfo) {
        if !painter.name.is_empty() {
            self.name.clone_from(&painter.name);
        }
        if !painter.alliance_name.is_empty() {
            self.alliance_name.clone_from(&painter.alliance_name);
        }
        if self.linked.is_none() && painter.linked.is_some() {
            self.linked.clone_from(&painter.linked);
        }
    }

    /// Score implied by the raw counters.
    #[must_use]
    pub fn expected_score(&self) -> i64 {
        i64::try_from(self.restored_count).unwrap_or(i64::MAX)
            - i64::try_from(self.vandal_count).unwrap_or(i64::MAX)
    }

    /// Total count for one direction.
    #[must_use]
    pub const fn count(&self, kind: ActivityKind) -> u64 {
        match kind {
            ActivityKind::Vandal => self.vandal_count,
            ActivityKind::Restore => self.restored_count,
        }
    }

    /// Count for one direction on one date.
    #[must_use]
    pub fn daily_count(&self, kind: ActivityKind, date_key: &str) -> u64 {
        let buckets = match kind {
            ActivityKind::Vandal => &self.daily_vandal_counts,
            ActivityKind::Restore => &self.daily_restored_counts,
        };
        buckets.get(date_key).copied().unwrap_or(0)
    }

    /// Recompute derived fields from the raw counters.
    ///
    /// Legacy flat link fields are moved into `linked` unless a link is
    /// already present. Returns `true` if anything changed, i.e. the record
    /// was stale.
    pub fn normalize(&mut self) -> bool {
        let migrated = self.migrate_legacy_link();
        let expected = self.expected_score();
        let mut rebuilt: BTreeMap<String, i64> = BTreeMap::new();
        for (date, count) in &self.daily_vandal_counts {
            *rebuilt.entry(date.clone()).or_default() -= i64::try_from(*count).unwrap_or(i64::MAX);
        }
        for (date, count) in &self.daily_restored_counts {
            *rebuilt.entry(date.clone()).or_default() += i64::try_from(*count).unwrap_or(i64::MAX);
        }
        let changed = self.activity_score != expected || self.daily_activity_scores != rebuilt;
        self.activity_score = expected;
        self.daily_activity_scores = rebuilt;
        changed || migrated
    }

    fn migrate_legacy_link(&mut self) -> bool {
        if self.legacy_account_id.is_empty() && self.legacy_handle.is_empty() {
            return false;
        }
        let account_id = std::mem::take(&mut self.legacy_account_id);
        let handle = std::mem::take(&mut self.legacy_handle);
        if self.linked.is_none() && !account_id.trim().is_empty() {
            self.linked = Some(LinkedIdentity {
                account_id: account_id.trim().to_owned(),
                handle: handle.trim().to_owned(),
            });
        }
        true
    }

    /// Whether the burst notification for `kind` has already fired.
    #[must_use]
    pub const fn burst_notified(&self, kind: ActivityKind) -> bool {
        match kind {
            ActivityKind::Vandal => self.vandal_burst_notified,
            ActivityKind::Restore => self.restore_burst_notified,
        }
    }

    /// Set the one-shot flag for `kind`.
    pub const fn mark_burst_notified(&mut self, kind: ActivityKind) {
        match kind {
            ActivityKind::Vandal => self.vandal_burst_notified = true,
            ActivityKind::Restore => self.restore_burst_notified = true,
        }
    }

    /// Re-arm both one-shot flags.
    pub const fn reset_burst_flags(&mut self) {
        self.vandal_burst_notified = false;
        self.restore_burst_notified = false;
    }

    /// Name for display, falling back to `ID:<id>`.
    #[must_use]
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            format!("ID:{}", self.id)
        } else {
            self.name.clone()
        }
    }
}

// Older documents store an empty string when no timestamp was ever recorded.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-15T03:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn record_keeps_score_consistent() {
        let mut rec = ActorRecord::new("7");
        let px = PixelCoordinate::new(1, 2);
        rec.record(ActivityKind::Vandal, at(), "2026-02-15", px);
        rec.record(ActivityKind::Vandal, at(), "2026-02-15", px);
        rec.record(ActivityKind::Restore, at(), "2026-02-16", px);
        assert_eq!(rec.activity_score, rec.expected_score());
        assert_eq!(rec.activity_score, -1);
        assert_eq!(rec.daily_activity_scores["2026-02-15"], -2);
        assert_eq!(rec.daily_activity_scores["2026-02-16"], 1);
        assert!(!rec.normalize());
    }

    #[test]
    fn normalize_repairs_stale_score() {
        let mut rec = ActorRecord::new("7");
        rec.vandal_count = 3;
        rec.restored_count = 1;
        rec.daily_vandal_counts.insert("2026-02-15".into(), 3);
        rec.daily_restored_counts.insert("2026-02-15".into(), 1);
        assert!(rec.normalize());
        assert_eq!(rec.activity_score, -2);
        assert_eq!(rec.daily_activity_scores["2026-02-15"], -2);
    }

    #[test]
    fn legacy_link_fields_fold_into_linked() {
        let mut rec: ActorRecord = serde_json::from_str(
            r#"{"id":"5","name":"a","vandal_count":1,"activity_score":-1,
                "discord_id":"123456","discord":"someone"}"#,
        )
        .unwrap();
        assert!(rec.normalize());
        assert_eq!(
            rec.linked,
            Some(LinkedIdentity {
                account_id: "123456".into(),
                handle: "someone".into(),
            })
        );
        let written = serde_json::to_value(&rec).unwrap();
        assert!(written.get("discord_id").is_none());
        assert!(written.get("discord").is_none());
        assert_eq!(written["linked"]["account_id"], "123456");

        let mut reread: ActorRecord = serde_json::from_value(written).unwrap();
        assert!(!reread.normalize());
        assert_eq!(reread, rec);
    }

    #[test]
    fn legacy_link_does_not_replace_existing_link() {
        let mut rec: ActorRecord = serde_json::from_str(
            r#"{"id":"5","discordId":"old","discord_name":"old-name",
                "linked":{"account_id":"new","handle":"new-name"}}"#,
        )
        .unwrap();
        assert!(rec.normalize());
        assert_eq!(rec.linked.as_ref().map(|l| l.account_id.as_str()), Some("new"));
        assert!(!rec.normalize());
    }

    #[test]
    fn clone_is_deep() {
        let mut src = ActorRecord::new("1");
        src.daily_vandal_counts.insert("2026-02-15".into(), 3);
        src.last_pixel = Some(PixelCoordinate::new(10, 20));
        let cloned = src.clone();
        src.daily_vandal_counts.insert("2026-02-15".into(), 999);
        src.last_pixel = Some(PixelCoordinate::new(777, 20));
        assert_eq!(cloned.daily_vandal_counts["2026-02-15"], 3);
        assert_eq!(cloned.last_pixel, Some(PixelCoordinate::new(10, 20)));
    }

    #[test]
    fn empty_last_seen_is_accepted() {
        let rec: ActorRecord =
            serde_json::from_str(r#"{"id":"5","name":"a","allianceName":"","last_seen":""}"#)
                .unwrap();
        assert_eq!(rec.last_seen, None);
        assert_eq!(rec.display_name(), "a");
    }
}
