use std::sync::Arc;

use pixguard::{PainterLookup, TILE_SIZE, TileSource};
use pixguard_mock::{MockBehavior, MockLookup, MockTiles, painter, solid_tile_png};

/// Tile source and painter lookup for the examples.
///
/// Set `PIXGUARD_EXAMPLES_USE_MOCK` to run offline against in-memory connectors.
pub fn get_connectors() -> Result<(Arc<dyn TileSource>, Arc<dyn PainterLookup>), Box<dyn std::error::Error>>
{
    if std::env::var("PIXGUARD_EXAMPLES_USE_MOCK").is_ok() {
        println!("--- (Using mock connectors) ---");
        let tiles = MockTiles::new();
        tiles.set_default(MockBehavior::Return(solid_tile_png(
            TILE_SIZE,
            [200, 30, 30, 255],
        )));
        let lookup = MockLookup::new();
        lookup.set_default(MockBehavior::Return(Some(painter(1, "mock-painter"))));
        Ok((Arc::new(tiles), Arc::new(lookup)))
    } else {
        Ok((
            Arc::new(pixguard_wplace::WplaceTiles::new()?),
            Arc::new(pixguard_wplace::WplacePixels::new()?),
        ))
    }
}
