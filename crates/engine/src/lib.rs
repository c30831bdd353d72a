pub mod connector;
pub mod runner;

pub use connector::{Connector, ConnectorError, RatesStart, RequestParams};
pub use runner::{RunnerConfig, StrategyRunner, TraderReport};
