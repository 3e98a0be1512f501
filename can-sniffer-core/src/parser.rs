//! Wire line parser and outbound command encoder
//!
//! The adapter firmware emits one text line per received bus message:
//!
//! ```text
//! FRAME:<id>|<rtr>|<ide>|<dlc>|<b0> <b1> ... <bN>\n
//! ```
//!
//! fields pipe-delimited, payload bytes as space-delimited two-hex-digit
//! tokens. Anything that does not start with the `FRAME:` sentinel (noise,
//! boot banners, partial reads) is not an error and is dropped without a
//! trace. Commands travel the other way as `SEND:<id>|<b0> <b1> ...\n`.

use crate::types::{Frame, PAYLOAD_LEN};

/// Sentinel prefix of an inbound frame line.
pub const FRAME_PREFIX: &str = "FRAME:";

/// Sentinel prefix of an outbound command line.
pub const SEND_PREFIX: &str = "SEND:";

const FIELD_SEPARATOR: char = '|';
const FIELD_COUNT: usize = 5;

/// Parse one line of text into a [`Frame`] stamped with `capture_time`.
///
/// Returns `None` for anything unrecognized or malformed:
/// - missing `FRAME:` prefix,
/// - fewer than five pipe-separated fields,
/// - RTR/IDE flags other than `0`/`1`,
/// - DLC outside 0..=8 (the frame is dropped, not corrected),
/// - any payload token that is not a two-hex-digit byte.
///
/// The payload is normalized to exactly 8 bytes: short payloads are
/// zero-padded, excess tokens are truncated.
pub fn parse_line(line: &str, capture_time: f64) -> Option<Frame> {
    let rest = line.trim_end().strip_prefix(FRAME_PREFIX)?;

    let fields: Vec<&str> = rest.splitn(FIELD_COUNT, FIELD_SEPARATOR).collect();
    if fields.len() < FIELD_COUNT {
        return None;
    }

    let id = fields[0].trim();
    if id.is_empty() {
        return None;
    }

    let rtr = parse_flag(fields[1])?;
    let ide = parse_flag(fields[2])?;

    let dlc: u8 = fields[3].trim().parse().ok()?;
    if dlc > PAYLOAD_LEN as u8 {
        return None;
    }

    let mut payload = [0u8; PAYLOAD_LEN];
    for (i, token) in fields[4].split_whitespace().enumerate() {
        let byte = parse_hex_byte(token)?;
        if i < PAYLOAD_LEN {
            payload[i] = byte;
        }
        // tokens past the eighth are validated, then truncated
    }

    Some(Frame {
        id: id.to_ascii_uppercase(),
        rtr,
        ide,
        dlc,
        payload,
        capture_time,
    })
}

/// Encode an outbound command line for `id` and `payload`.
///
/// Used by manual transmission and by playback retransmit; the payload is
/// sent verbatim (no normalization; the caller decides how many bytes go
/// on the wire).
pub fn encode_send(id: &str, payload: &[u8]) -> String {
    let data: Vec<String> = payload.iter().map(|b| format!("{:02X}", b)).collect();
    format!("{}{}{}{}\n", SEND_PREFIX, id, FIELD_SEPARATOR, data.join(" "))
}

fn parse_flag(token: &str) -> Option<bool> {
    match token.trim() {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

fn parse_hex_byte(token: &str) -> Option<u8> {
    if token.len() != 2 {
        return None;
    }
    u8::from_str_radix(token, 16).ok()
}
