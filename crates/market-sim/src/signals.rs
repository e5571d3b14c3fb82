// In crates/market-sim/src/signals.rs

use crate::feed::{PriceBoard, board_price};
use chrono::{DateTime, Utc};
use core_types::SignalPayload;
use engine::SignalSource;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Emits random signals priced off a [`PriceBoard`].
pub struct RandomSignalSource {
    rng: StdRng,
    board: PriceBoard,
    probability: f64,
}

impl RandomSignalSource {
    pub fn new(board: PriceBoard, probability: f64, seed: u64) -> Self {
        let probability = if probability.is_nan() { 0.0 } else { probability.clamp(0.0, 1.0) };
        Self {
            rng: StdRng::seed_from_u64(seed),
            board,
            probability,
        }
    }
}

impl SignalSource for RandomSignalSource {
    fn poll(&mut self, at: DateTime<Utc>) -> Option<SignalPayload> {
        if !self.rng.gen_bool(self.probability) {
            return None;
        }
        let symbols: Vec<_> = self.board.borrow().keys().cloned().collect();
        if symbols.is_empty() {
            return None;
        }
        let symbol = symbols[self.rng.gen_range(0..symbols.len())].clone();
        let entry = board_price(&self.board, &symbol)?;

        let long = self.rng.gen_bool(0.5);
        let confidence = (self.rng.gen_range(70.0..100.0_f64) * 10.0).round() / 10.0;
        // Roughly half the signals carry their own target.
        let take_profit = self.rng.gen_bool(0.5).then(|| {
            let distance = self.rng.gen_range(0.02..0.06);
            if long { entry * (1.0 + distance) } else { entry * (1.0 - distance) }
        });

        tracing::debug!(%symbol, long, confidence, entry, "Simulated signal.");
        Some(SignalPayload {
            symbol: Some(symbol.0),
            direction: Some(if long { "long" } else { "short" }.into()),
            confidence: Some(confidence),
            entry_price: Some(entry),
            stop_loss: None,
            take_profit,
            timestamp: Some(at),
        })
    }
}
