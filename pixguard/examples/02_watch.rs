//! Watch the default region: diff it against a baseline snapshot, feed the
//! diff mask to the tracker and the deviation percentage to the tier engine.
//!
//! `RUST_LOG=pixguard=debug` shows attribution and flush activity.
mod common;

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::get_connectors;
use image::{ImageFormat, Rgba, RgbaImage};
use pixguard::{DeviationSample, NotifySettings, Pixguard, RankingKind, TierEvent};
use tracing_subscriber::EnvFilter;

const ROUNDS: usize = 5;
const POLL_EVERY: Duration = Duration::from_secs(30);

fn diff_mask(baseline: &RgbaImage, current: &RgbaImage) -> (RgbaImage, u64, u64) {
    let mut mask = RgbaImage::new(baseline.width(), baseline.height());
    let (mut differing, mut total) = (0u64, 0u64);
    for (x, y, want) in baseline.enumerate_pixels() {
        if want.0[3] == 0 {
            continue;
        }
        total += 1;
        if current.get_pixel(x, y).0[..3] != want.0[..3] {
            differing += 1;
            mask.put_pixel(x, y, Rgba([255, 0, 0, 255]));
        }
    }
    (mask, differing, total)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pixguard=info")),
        )
        .init();

    // 1. Build the hub around the connectors.
    let (tiles, lookup) = get_connectors()?;
    let hub = Pixguard::builder()
        .tile_source(tiles)
        .painter_lookup(lookup)
        .data_dir(std::env::temp_dir().join("pixguard-demo"))
        .tier_sink(Arc::new(|target: &str, event: TierEvent| match event {
            TierEvent::Escalated { tier, value, mention, .. } => {
                println!("[{target}] {tier} reached at {value:.2}% (mention: {mention})");
            }
            TierEvent::BurstActor { kind, actor } => {
                println!("[{target}] {kind} burst by {}", actor.display_name());
            }
            other => println!("[{target}] {other:?}"),
        }))
        .build()?;
    hub.engine().configure("console", NotifySettings::default());
    hub.start();

    // 2. The first snapshot is the reference.
    let tracker_cfg = hub.config().tracker.clone();
    let origin = tracker_cfg.origin.pixel();
    let baseline = hub
        .tiles()
        .fetch_region(origin, tracker_cfg.width, tracker_cfg.height)
        .await?;

    // 3. Poll, diff, and feed both consumers until ctrl-c or ROUNDS polls.
    let watch = async {
        for round in 1..=ROUNDS {
            tokio::time::sleep(POLL_EVERY).await;
            let current = hub
                .tiles()
                .fetch_region(origin, tracker_cfg.width, tracker_cfg.height)
                .await?;
            let (mask, differing, total) = diff_mask(&baseline, &current);
            let mut png = Vec::new();
            mask.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
            hub.ingest_diff(png)?;

            #[allow(clippy::cast_precision_loss)]
            let pct = if total == 0 { 0.0 } else { differing as f64 * 100.0 / total as f64 };
            hub.observe(&DeviationSample::overall(pct, Utc::now()).with_counts(differing, total));
            println!("round {round}: {differing}/{total} pixels differ ({pct:.2}%)");
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    };
    tokio::select! {
        res = watch => res?,
        _ = tokio::signal::ctrl_c() => println!("interrupted"),
    }

    // 4. Stop workers and flush the tracker documents.
    hub.shutdown().await?;
    let today = hub.tracker().today();
    for row in hub.tracker().daily_ranking(&today, RankingKind::Vandal, 5) {
        println!("{:>5}  {}", row.value, row.name);
    }
    Ok(())
}
