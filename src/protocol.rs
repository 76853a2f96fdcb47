//! Line protocol spoken by the board firmware.
//!
//! Boards stream progress lines and finish each command with a terminal
//! line. The reader accumulates lines until a terminal line, end of
//! stream, or the overall response deadline, whichever comes first.

use tokio::time::{Instant, timeout};

use crate::config::LinkConfig;
use crate::link::RawLink;

/// Prefixes that mark the final line of a board response.
pub const TERMINAL_PREFIXES: [&str; 5] = ["DONE", "RESULT", "HASH_DONE", "ERR", "PONG"];

const READ_CHUNK: usize = 256;

/// Whether `line` ends a board response.
pub fn is_terminal(line: &str) -> bool {
    TERMINAL_PREFIXES
        .iter()
        .any(|prefix| line.starts_with(prefix))
}

fn decode_line(raw: &[u8]) -> String {
    // Firmware noise during boot can interleave garbage bytes; keep the
    // valid UTF-8 and drop the rest.
    let mut text = String::new();
    for chunk in raw.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    text.trim().to_string()
}

/// Surfaces a partially received line, reporting whether it was terminal.
fn flush_partial(pending: &mut Vec<u8>, lines: &mut Vec<String>) -> bool {
    if pending.is_empty() {
        return false;
    }
    let line = decode_line(pending);
    pending.clear();
    if line.is_empty() {
        return false;
    }
    let terminal = is_terminal(&line);
    lines.push(line);
    terminal
}

/// Reads response lines until a terminal line or the response deadline.
///
/// Two clocks run independently: each read is capped by the link I/O
/// timeout, and the whole response is capped by the read deadline. A
/// single read timeout is not fatal; the loop keeps polling until the
/// deadline runs out. Whatever was collected by then is the result, so a
/// slow or silent board degrades to a partial transcript rather than an
/// error. A read that times out or a stream that ends surfaces its
/// partially received line, terminal-checked like any other; only bytes
/// after the first terminal line are discarded.
pub async fn read_response(link: &mut dyn RawLink, config: &LinkConfig) -> Vec<String> {
    let deadline = Instant::now() + config.read_deadline();
    let mut lines = Vec::new();
    let mut pending: Vec<u8> = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = pending.drain(..=pos).collect();
            let line = decode_line(&raw[..pos]);
            if line.is_empty() {
                continue;
            }
            let terminal = is_terminal(&line);
            lines.push(line);
            if terminal {
                return lines;
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        let per_read = config.io_timeout().min(remaining);

        match timeout(per_read, link.read(&mut chunk)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => pending.extend_from_slice(&chunk[..n]),
            Ok(Err(e)) => {
                tracing::debug!("Read failed mid-response: {}", e);
                break;
            }
            // A timed-out read surfaces whatever partial line is buffered,
            // the way a line read hands back its partial buffer on timeout.
            // The deadline check above decides when to give up entirely.
            Err(_) => {
                if flush_partial(&mut pending, &mut lines) {
                    return lines;
                }
            }
        }
    }

    flush_partial(&mut pending, &mut lines);
    lines
}
