//! MetaTrader 5 terminal access.
//!
//! `BridgeTerminal` talks to an MQL5 EA running inside MT5 over a TCP socket
//! bridge; `SimulatedTerminal` implements the same `Terminal` contract in
//! memory for tests and dry runs.

pub mod client;
pub mod protocol;
pub mod simulated;

pub use client::{BridgeTerminal, TerminalConfig};
pub use simulated::{forex_symbol, SimulatedTerminal, SimulatedTerminalConfig};
