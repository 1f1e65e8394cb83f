//! Daily leaderboards over actor records.

use std::cmp::Reverse;

use pixguard_core::{ActivityKind, ActorRecord};
use serde::{Deserialize, Serialize};

/// Which per-day value a ranking orders by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingKind {
    /// Pixels vandalized that day.
    Vandal,
    /// Pixels restored that day.
    Restore,
    /// Net score that day (restored minus vandalized).
    Score,
}

/// One row of a ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingEntry {
    /// Actor id.
    pub actor_id: String,
    /// Display name, `ID:<id>` when the actor has none.
    pub name: String,
    /// Alliance name, possibly empty.
    pub alliance_name: String,
    /// Ranked value.
    pub value: i64,
}

fn value_on(record: &ActorRecord, kind: RankingKind, date_key: &str) -> i64 {
    let count = |k| i64::try_from(record.daily_count(k, date_key)).unwrap_or(i64::MAX);
    match kind {
        RankingKind::Vandal => count(ActivityKind::Vandal),
        RankingKind::Restore => count(ActivityKind::Restore),
        RankingKind::Score => record
            .daily_activity_scores
            .get(date_key)
            .copied()
            .unwrap_or(0),
    }
}

/// Rank `records` for `date_key`.
///
/// Behavior:
/// - actors whose value is zero that day are left out
/// - rows are ordered by value descending, then display name ascending
/// - at most `limit` rows are returned
pub fn rank<'a>(
    records: impl IntoIterator<Item = &'a ActorRecord>,
    date_key: &str,
    kind: RankingKind,
    limit: usize,
) -> Vec<RankingEntry> {
    let mut rows: Vec<RankingEntry> = records
        .into_iter()
        .filter_map(|r| {
            let value = value_on(r, kind, date_key);
            (value != 0).then(|| RankingEntry {
                actor_id: r.id.clone(),
                name: r.display_name(),
                alliance_name: r.alliance_name.clone(),
                value,
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        Reverse(a.value)
            .cmp(&Reverse(b.value))
            .then_with(|| a.name.cmp(&b.name))
    });
    rows.truncate(limit);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pixguard_core::PixelCoordinate;

    fn actor(id: &str, name: &str, vandal: u32, restore: u32) -> ActorRecord {
        let mut r = ActorRecord::new(id);
        r.name = name.to_owned();
        let px = PixelCoordinate::new(0, 0);
        for _ in 0..vandal {
            r.record(ActivityKind::Vandal, Utc::now(), "2025-03-01", px);
        }
        for _ in 0..restore {
            r.record(ActivityKind::Restore, Utc::now(), "2025-03-01", px);
        }
        r
    }

    #[test]
    fn orders_by_value_then_name() {
        let records = [
            actor("1", "bob", 3, 0),
            actor("2", "alice", 3, 0),
            actor("3", "", 5, 0),
            actor("4", "zed", 0, 2),
        ];
        let rows = rank(&records, "2025-03-01", RankingKind::Vandal, 10);
        let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["ID:3", "alice", "bob"]);
        assert_eq!(rows[0].value, 5);
    }

    #[test]
    fn score_keeps_negative_values_and_limit_applies() {
        let records = [actor("1", "a", 0, 4), actor("2", "b", 2, 0), actor("3", "c", 1, 1)];
        let rows = rank(&records, "2025-03-01", RankingKind::Score, 10);
        assert_eq!(
            rows.iter().map(|r| r.value).collect::<Vec<_>>(),
            vec![4, -2]
        );
        assert_eq!(rank(&records, "2025-03-01", RankingKind::Score, 1).len(), 1);
    }

    #[test]
    fn other_dates_are_empty() {
        let records = [actor("1", "a", 2, 2)];
        assert!(rank(&records, "2025-03-02", RankingKind::Restore, 10).is_empty());
    }
}
