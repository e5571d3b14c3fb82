// In crates/market-sim/src/lib.rs

//! Seeded stand-ins for a market data feed and an analysis service, used by
//! the `run` and `simulate` commands.

pub mod feed;
pub mod signals;

pub use feed::{PriceBoard, RandomWalkFeed};
pub use signals::RandomSignalSource;

/// Builds a feed and a signal source that share one price board.
pub fn from_settings(
    settings: &app_config::SimulationSettings,
    seed: u64,
) -> (RandomWalkFeed, RandomSignalSource) {
    let feed = RandomWalkFeed::from_settings(settings, seed);
    // Offset the seed so the two generators do not mirror each other.
    let source = RandomSignalSource::new(
        feed.board(),
        settings.signal_probability,
        seed.wrapping_add(1),
    );
    (feed, source)
}
