pub mod coin_flip;

pub use coin_flip::{CoinFlipConfig, CoinFlipStrategy};
