// espherd: host-side command dispatcher for a bench of ESP32 dev boards.
//
// Discovers boards over their USB-to-serial bridges and broadcasts one
// command line to all of them at once. The per-board transcripts are
// folded into a single report, served over the web API or printed by the
// CLI.

pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod link;
pub mod metrics;
pub mod protocol;
pub mod report;
pub mod web;

pub use dispatch::{DispatchError, Dispatcher};
pub use report::{AggregateReport, DeviceOutcome, DeviceResult};
