use async_trait::async_trait;
use mt5bot_core::{Quote, Side, Strategy};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::trace;

/// Random entries: on each quote, enter with probability
/// `entry_probability` on a side chosen by a fair coin.
pub struct CoinFlipStrategy {
    id: String,
    config: CoinFlipConfig,
    rng: Mutex<StdRng>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoinFlipConfig {
    /// Clamped to `0.0..=1.0`.
    pub entry_probability: f64,
    /// Fixed seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for CoinFlipConfig {
    fn default() -> Self {
        Self {
            entry_probability: 1.0,
            seed: None,
        }
    }
}

impl std::fmt::Debug for CoinFlipStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoinFlipStrategy")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish()
    }
}

impl CoinFlipStrategy {
    pub fn new(config: CoinFlipConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let config = CoinFlipConfig {
            entry_probability: clamp_probability(config.entry_probability),
            ..config
        };
        Self {
            id: format!("coin_flip_{}", (config.entry_probability * 100.0).round() as u32),
            config,
            rng: Mutex::new(rng),
        }
    }

    pub fn config(&self) -> &CoinFlipConfig {
        &self.config
    }

    fn flip(&self) -> Option<Side> {
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        if !rng.gen_bool(self.config.entry_probability) {
            return None;
        }
        Some(if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell })
    }
}

fn clamp_probability(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

#[async_trait]
impl Strategy for CoinFlipStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Coin Flip"
    }

    async fn on_quote(&self, symbol: &str, quote: &Quote) -> Option<Side> {
        let side = self.flip();
        trace!(%symbol, buy = %quote.buy, sell = %quote.sell, ?side, "Coin flipped");
        side
    }
}
