// In crates/market-sim/src/feed.rs

use app_config::SimulationSettings;
use chrono::{DateTime, Utc};
use core_types::{PriceTick, Symbol};
use engine::PriceFeed;
use num_traits::{FromPrimitive, ToPrimitive};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tokio::sync::watch;

/// The latest simulated price of every symbol.
pub type PriceBoard = watch::Receiver<BTreeMap<Symbol, Decimal>>;

/// A per-symbol geometric random walk.
///
/// Every call to [`PriceFeed::ticks`] advances all symbols by one step, not
/// only the requested ones, so prices keep moving while the book is flat.
pub struct RandomWalkFeed {
    rng: StdRng,
    /// Maximum relative move per step, as a fraction.
    step: f64,
    prices: BTreeMap<Symbol, f64>,
    board: watch::Sender<BTreeMap<Symbol, Decimal>>,
}

impl RandomWalkFeed {
    pub fn new(start_prices: &[(Symbol, f64)], volatility_bps: f64, seed: u64) -> Self {
        let prices: BTreeMap<Symbol, f64> = start_prices
            .iter()
            .filter(|(_, price)| *price > 0.0)
            .cloned()
            .collect();
        let (board, _) = watch::channel(to_board(&prices));
        Self {
            rng: StdRng::seed_from_u64(seed),
            step: (volatility_bps / 10_000.0).clamp(0.0, 0.5),
            prices,
            board,
        }
    }

    pub fn from_settings(settings: &SimulationSettings, seed: u64) -> Self {
        let start_prices: Vec<(Symbol, f64)> = settings
            .symbols
            .iter()
            .map(|s| (Symbol(s.symbol.clone()), s.start_price))
            .collect();
        Self::new(&start_prices, settings.volatility_bps, seed)
    }

    /// A live view of the current prices.
    pub fn board(&self) -> PriceBoard {
        self.board.subscribe()
    }

    pub fn price(&self, symbol: &Symbol) -> Option<Decimal> {
        self.prices.get(symbol).copied().and_then(to_price)
    }

    fn advance(&mut self) {
        for price in self.prices.values_mut() {
            let change = self.rng.gen_range(-1.0..=1.0) * self.step;
            *price *= 1.0 + change;
        }
        self.board.send_replace(to_board(&self.prices));
    }
}

impl PriceFeed for RandomWalkFeed {
    fn ticks(&mut self, symbols: &[Symbol], at: DateTime<Utc>) -> Vec<PriceTick> {
        self.advance();
        symbols
            .iter()
            .filter_map(|symbol| {
                let price = self.price(symbol)?;
                Some(PriceTick { symbol: symbol.clone(), price, timestamp: at })
            })
            .collect()
    }
}

/// Significant digits kept on simulated prices, whatever their magnitude.
const PRICE_DIGITS: u32 = 8;

fn to_price(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value)?
        .round_sf(PRICE_DIGITS)
        .filter(|price| *price > Decimal::ZERO)
}

fn to_board(prices: &BTreeMap<Symbol, f64>) -> BTreeMap<Symbol, Decimal> {
    prices
        .iter()
        .filter_map(|(symbol, price)| Some((symbol.clone(), to_price(*price)?)))
        .collect()
}

/// The board price of `symbol` as a float, for building payloads.
pub(crate) fn board_price(board: &PriceBoard, symbol: &Symbol) -> Option<f64> {
    board.borrow().get(symbol).and_then(|p| p.to_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeds() -> Vec<(Symbol, f64)> {
        vec![(Symbol::from("BTCUSDT"), 43000.0), (Symbol::from("ETHUSDT"), 2500.0)]
    }

    #[test]
    fn test_same_seed_same_path() {
        let mut a = RandomWalkFeed::new(&seeds(), 50.0, 7);
        let mut b = RandomWalkFeed::new(&seeds(), 50.0, 7);
        let symbols = [Symbol::from("BTCUSDT"), Symbol::from("ETHUSDT")];
        let at = Utc::now();

        for _ in 0..100 {
            assert_eq!(a.ticks(&symbols, at), b.ticks(&symbols, at));
        }
    }

    #[test]
    fn test_steps_stay_within_volatility_and_positive() {
        let mut feed = RandomWalkFeed::new(&seeds(), 100.0, 3);
        let btc = Symbol::from("BTCUSDT");
        let mut last = 43000.0;

        for _ in 0..1000 {
            let tick = feed.ticks(&[btc.clone()], Utc::now()).remove(0);
            let price = tick.price.to_f64().unwrap();
            assert!(price > 0.0);
            // 1% step, plus rounding slack.
            assert!((price / last - 1.0).abs() <= 0.0101, "{last} -> {price}");
            last = price;
        }
    }

    #[test]
    fn test_unknown_symbols_are_skipped_and_board_follows() {
        let mut feed = RandomWalkFeed::new(&seeds(), 25.0, 1);
        let board = feed.board();

        let ticks = feed.ticks(&[Symbol::from("DOGEUSDT")], Utc::now());
        assert!(ticks.is_empty());
        assert_eq!(
            board.borrow().get(&Symbol::from("ETHUSDT")).copied(),
            feed.price(&Symbol::from("ETHUSDT"))
        );
    }

    #[test]
    fn test_small_prices_keep_their_digits() {
        assert_eq!(to_price(43012.3456789), Some(Decimal::new(43012346, 3)));
        assert_eq!(to_price(0.00123456789), Some(Decimal::new(12345679, 10)));
        assert_eq!(to_price(0.0), None);

        // A walk that drifts far below a cent still yields usable ticks.
        let mut feed = RandomWalkFeed::new(&[(Symbol::from("PEPEUSDT"), 0.004)], 5000.0, 11);
        let pepe = Symbol::from("PEPEUSDT");
        for _ in 0..200 {
            let ticks = feed.ticks(&[pepe.clone()], Utc::now());
            assert!(ticks.iter().all(|tick| tick.price > Decimal::ZERO));
        }
    }
}
