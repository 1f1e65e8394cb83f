mod common;
use common::get_connectors;
use pixguard::{TilePipeline, TrackerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Create connectors (mock when PIXGUARD_EXAMPLES_USE_MOCK is set).
    let (tiles, _) = get_connectors()?;

    // 2. Wrap them in a pipeline; no limiter or cache for a one-off fetch.
    let pipeline = TilePipeline::new(tiles, pixguard::TileConfig::default());

    // 3. Fetch the default monitored region, which straddles a tile seam.
    let cfg = TrackerConfig::default();
    let origin = cfg.origin.pixel();
    println!("Fetching {}x{} region at {origin}...", cfg.width, cfg.height);
    let img = pipeline.fetch_region(origin, cfg.width, cfg.height).await?;

    // 4. Summarize what came back.
    let opaque = img.pixels().filter(|p| p.0[3] != 0).count();
    println!(
        "Got {}x{} bitmap, {opaque} opaque pixels",
        img.width(),
        img.height()
    );

    Ok(())
}
