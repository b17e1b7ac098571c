//! Length-prefixed text framing.
//!
//! Every body exchanged over the polling transport is a single frame of the form
//! `<decimal length>:<payload>`, where the length counts the characters of the
//! payload. The same convention carries the heartbeat frame (`1:3`).

use thiserror::Error;

/// Separator between the length prefix and the payload.
pub const DELIMITER: char = ':';

/// Payload sent in place of real data when a poll idles out.
pub const HEARTBEAT_PAYLOAD: &str = "3";

/// The full heartbeat frame.
pub const HEARTBEAT_FRAME: &str = "1:3";

/// Problems decoding a frame received from the peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// No `:` separates the length from the payload.
    #[error("frame has no length delimiter")]
    MissingDelimiter,

    /// The prefix is not a decimal number.
    #[error("invalid length prefix {0:?}")]
    InvalidLength(String),

    /// The announced length does not match the payload.
    #[error("frame announces {announced} characters but carries {actual}")]
    LengthMismatch { announced: usize, actual: usize },
}

/// Frame a payload for the wire.
pub fn encode(payload: &str) -> String {
    let mut frame = payload.chars().count().to_string();
    frame.push(DELIMITER);
    frame.push_str(payload);
    frame
}

/// Decode a single frame, checking the announced length.
pub fn decode(frame: &str) -> Result<&str, FrameError> {
    let (prefix, payload) = frame
        .split_once(DELIMITER)
        .ok_or(FrameError::MissingDelimiter)?;

    let announced: usize = prefix
        .parse()
        .map_err(|_| FrameError::InvalidLength(prefix.to_string()))?;

    let actual = payload.chars().count();
    if announced != actual {
        return Err(FrameError::LengthMismatch { announced, actual });
    }

    Ok(payload)
}

/// Drop everything up to and including the first delimiter.
///
/// Bodies posted by clients are trusted to carry a well-formed prefix; the
/// length is not checked. A body without any delimiter is returned whole.
pub fn strip_length_prefix(body: &str) -> &str {
    match body.find(DELIMITER) {
        Some(index) => &body[index + DELIMITER.len_utf8()..],
        None => body,
    }
}

/// Whether a decoded payload is the heartbeat.
pub fn is_heartbeat(frame: &str) -> bool {
    frame == HEARTBEAT_FRAME
}
