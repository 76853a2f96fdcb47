//! Report structures handed to the web boundary and the CLI renderer.

use serde::ser::{Serialize, SerializeTuple, Serializer};

/// Port id substituted when discovery finds no boards at all.
pub const PLACEHOLDER_PORT: &str = "NONE";
/// Informational line carried by the placeholder entry.
pub const PLACEHOLDER_LINE: &str = "No ESP32 boards found!";

/// Outcome of one board's command exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceOutcome {
    /// The exchange ran; lines may be empty if the board stayed silent
    /// until the read deadline.
    Success { lines: Vec<String> },
    /// Open or write failed; carries the single synthetic `ERR ...` line.
    Failure { line: String },
}

/// One board's contribution to the aggregate report.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceResult {
    pub port: String,
    pub outcome: DeviceOutcome,
}

impl DeviceResult {
    pub fn completed(port: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            port: port.into(),
            outcome: DeviceOutcome::Success { lines },
        }
    }

    pub fn failed(port: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self {
            port: port.into(),
            outcome: DeviceOutcome::Failure {
                line: format!("ERR {message}"),
            },
        }
    }

    pub fn placeholder() -> Self {
        Self::completed(PLACEHOLDER_PORT, vec![PLACEHOLDER_LINE.to_string()])
    }

    /// The response burst as displayed lines, for any outcome.
    pub fn lines(&self) -> &[String] {
        match &self.outcome {
            DeviceOutcome::Success { lines } => lines,
            DeviceOutcome::Failure { line } => std::slice::from_ref(line),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, DeviceOutcome::Success { .. })
    }
}

// Wire shape is the `[port, [line, ...]]` pair consumed by dashboards.
impl Serialize for DeviceResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut pair = serializer.serialize_tuple(2)?;
        pair.serialize_element(&self.port)?;
        pair.serialize_element(self.lines())?;
        pair.end()
    }
}

/// The unified report for one broadcast: discovered ports, one result per
/// board, and the advisory hashrate total.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AggregateReport {
    pub ports: Vec<String>,
    pub results: Vec<DeviceResult>,
    pub total_hs: f64,
}

impl AggregateReport {
    /// Report returned when discovery finds no boards: an empty port list
    /// plus the single placeholder entry.
    pub fn no_boards() -> Self {
        Self {
            ports: Vec::new(),
            results: vec![DeviceResult::placeholder()],
            total_hs: 0.0,
        }
    }
}
