//! Advisory hashrate aggregation across device results.

use crate::report::DeviceResult;

/// Sentinel prefix of a response line carrying a numeric rate payload.
pub const METRIC_PREFIX: &str = "HASH_DONE";

/// Parse the rate payload of one metric line, if present and well-formed.
pub fn parse_rate(line: &str) -> Option<f64> {
    if !line.starts_with(METRIC_PREFIX) {
        return None;
    }
    line.split_whitespace().nth(1)?.parse().ok()
}

/// Sum every parsable rate across all results. Missing or malformed payloads
/// are skipped; they never abort aggregation of the remaining lines.
pub fn total_hashrate(results: &[DeviceResult]) -> f64 {
    results
        .iter()
        .flat_map(|result| result.lines().iter())
        .filter_map(|line| parse_rate(line))
        .sum()
}
