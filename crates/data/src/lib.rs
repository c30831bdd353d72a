pub mod config;
pub mod db;
pub mod market_data;
pub mod memory;
pub mod table;

pub use config::{load_section, ConfigError, DatabaseConfig};
pub use db::PgOrderJournal;
pub use market_data::{MarketDataTable, MarketFeed, RawQuote};
pub use memory::MemoryJournal;
