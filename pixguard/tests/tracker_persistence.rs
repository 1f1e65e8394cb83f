mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::*;
use pixguard::{ActivityTracker, ActorRecord, DailyTotals, VandalIndexDocument};
use pixguard_core::{ACTORS_FILE, DAILY_TOTALS_FILE, VANDAL_INDEX_FILE, WorkerGroup};
use pixguard_mock::mask_png;

fn read<T: serde::de::DeserializeOwned>(path: std::path::PathBuf) -> T {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn flush_writes_all_three_documents() {
    let tmp = tempfile::tempdir().unwrap();
    let lookup = MockLookup::new();
    lookup.set_painter(px(1, 2), painter(9, "vandal"));
    let t = ActivityTracker::open(tracker_cfg(tmp.path()), Arc::new(lookup.clone()), clock());

    t.update_diff_pixels([px(1, 2), px(3, 4)]);
    t.process_queued().await;
    t.flush().await.unwrap();

    let actors: std::collections::BTreeMap<String, ActorRecord> = read(tmp.path().join(ACTORS_FILE));
    assert_eq!(actors["9"].vandal_count, 1);
    let index: VandalIndexDocument = read(tmp.path().join(VANDAL_INDEX_FILE));
    assert_eq!(index.vandalized_pixels, vec![[1, 2], [3, 4]]);
    assert_eq!(index.pixel_to_painter.get("(1, 2)").map(String::as_str), Some("9"));
    let totals: DailyTotals = read(tmp.path().join(DAILY_TOTALS_FILE));
    assert_eq!(totals.on(DAY), (2, 0));

    let text = std::fs::read_to_string(tmp.path().join(VANDAL_INDEX_FILE)).unwrap();
    assert!(text.contains('\n'), "documents are pretty-printed");
}

#[tokio::test]
async fn clean_documents_are_not_rewritten() {
    let tmp = tempfile::tempdir().unwrap();
    let lookup = MockLookup::new();
    let t = ActivityTracker::open(tracker_cfg(tmp.path()), Arc::new(lookup.clone()), clock());

    t.update_diff_pixels([px(1, 1)]);
    t.flush().await.unwrap();
    std::fs::remove_file(tmp.path().join(DAILY_TOTALS_FILE)).unwrap();
    t.flush().await.unwrap();
    assert!(!tmp.path().join(DAILY_TOTALS_FILE).exists());
    assert!(!tmp.path().join(ACTORS_FILE).exists());
}

#[tokio::test]
async fn restart_resumes_from_persisted_snapshot() {
    let tmp = tempfile::tempdir().unwrap();
    let lookup = MockLookup::new();
    lookup.set_painter(px(1, 1), painter(3, "x"));
    {
        let t = ActivityTracker::open(tracker_cfg(tmp.path()), Arc::new(lookup.clone()), clock());
        t.update_diff_pixels([px(1, 1), px(2, 2)]);
        t.process_queued().await;
        t.flush().await.unwrap();
    }

    let t = ActivityTracker::open(tracker_cfg(tmp.path()), Arc::new(lookup.clone()), clock());
    assert_eq!(t.snapshot_len(), 2);
    assert_eq!(t.vandal_index().get(&px(1, 1)).map(String::as_str), Some("3"));
    let s = t.update_diff_pixels([px(1, 1), px(2, 2)]);
    assert_eq!(s.enqueued, 0);
    assert_eq!(t.actor("3").unwrap().vandal_count, 1);
}

#[tokio::test]
async fn stale_scores_are_migrated_on_load() {
    let tmp = tempfile::tempdir().unwrap();
    let stale = r#"{
        "11": {
            "id": "11",
            "name": "old",
            "last_seen": "",
            "vandal_count": 4,
            "restored_count": 1,
            "daily_vandal_counts": {"2025-02-01": 4},
            "daily_restored_counts": {"2025-02-01": 1}
        }
    }"#;
    std::fs::write(tmp.path().join(ACTORS_FILE), stale).unwrap();

    let t = ActivityTracker::open(tracker_cfg(tmp.path()), Arc::new(MockLookup::new()), clock());
    let rec = t.actor("11").unwrap();
    assert_eq!(rec.activity_score, -3);
    assert_eq!(rec.daily_activity_scores.get("2025-02-01"), Some(&-3));
    assert!(rec.last_seen.is_none());

    let on_disk: std::collections::BTreeMap<String, ActorRecord> = read(tmp.path().join(ACTORS_FILE));
    assert_eq!(on_disk["11"].activity_score, -3);
}

#[tokio::test]
async fn malformed_documents_start_empty_and_survive_the_next_flush() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join(VANDAL_INDEX_FILE), "[1, 2").unwrap();
    let t = ActivityTracker::open(tracker_cfg(tmp.path()), Arc::new(MockLookup::new()), clock());
    assert_eq!(t.snapshot_len(), 0);
    assert!(t.actors().is_empty());

    t.update_diff_pixels([px(2, 2)]);
    t.flush().await.unwrap();

    let kept: Vec<String> = std::fs::read_dir(tmp.path())
        .unwrap()
        .filter_map(|e| e.unwrap().file_name().into_string().ok())
        .filter(|n| n.starts_with(&format!("{VANDAL_INDEX_FILE}.corrupt-")))
        .collect();
    assert_eq!(kept.len(), 1);
    let original = std::fs::read_to_string(tmp.path().join(&kept[0])).unwrap();
    assert_eq!(original, "[1, 2");
    let index: VandalIndexDocument = read(tmp.path().join(VANDAL_INDEX_FILE));
    assert_eq!(index.vandalized_pixels, vec![[2, 2]]);
}

#[tokio::test]
async fn failed_flush_is_retried() {
    let tmp = tempfile::tempdir().unwrap();
    let blocker = tmp.path().join("data");
    std::fs::write(&blocker, b"a file where the directory should be").unwrap();
    let t = ActivityTracker::open(tracker_cfg(&blocker), Arc::new(MockLookup::new()), clock());

    t.update_diff_pixels([px(1, 1)]);
    assert!(t.flush().await.is_err());

    std::fs::remove_file(&blocker).unwrap();
    t.flush().await.unwrap();
    let index: VandalIndexDocument = read(blocker.join(VANDAL_INDEX_FILE));
    assert_eq!(index.vandalized_pixels, vec![[1, 1]]);
}

#[tokio::test(start_paused = true)]
async fn workers_ingest_attribute_and_flush() {
    let tmp = tempfile::tempdir().unwrap();
    let lookup = MockLookup::new();
    lookup.set_painter(px(2, 3), painter(77, "tagger"));
    let t = ActivityTracker::open(tracker_cfg(tmp.path()), Arc::new(lookup.clone()), clock());

    let mut group = WorkerGroup::new();
    t.spawn_workers(&mut group);

    assert!(!t.enqueue_diff_image(mask_png(8, 8, &[(0, 0)])).unwrap());
    assert!(t.enqueue_diff_image(mask_png(8, 8, &[(2, 3)])).unwrap());
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(t.snapshot_len(), 1);
    assert_eq!(t.actor("77").map(|r| r.vandal_count), Some(1));

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(tmp.path().join(ACTORS_FILE).exists());

    group.stop().await;
    let index: VandalIndexDocument = read(tmp.path().join(VANDAL_INDEX_FILE));
    assert_eq!(index.vandalized_pixels, vec![[2, 3]]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_flushes_leave_the_latest_state_on_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let lookup = MockLookup::new();
    let t = ActivityTracker::open(tracker_cfg(tmp.path()), Arc::new(lookup.clone()), clock());

    let mut flushes = Vec::new();
    for x in 0..32 {
        t.update_diff_pixels((0..=x).map(|i| px(i, 0)));
        let t = t.clone();
        flushes.push(tokio::spawn(async move { t.flush().await }));
    }
    for f in flushes {
        f.await.unwrap().unwrap();
    }
    t.flush().await.unwrap();

    let index: VandalIndexDocument = read(tmp.path().join(VANDAL_INDEX_FILE));
    assert_eq!(index.vandalized_pixels.len(), 32);
    assert_eq!(index.vandalized_pixels.last(), Some(&[31, 0]));
}
