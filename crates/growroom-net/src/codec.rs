//! Newline-delimited JSON framing

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Longest line accepted from a peer, in bytes
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Serialize one message as a single line, newline included
pub fn encode_line<T: Serialize>(message: &T) -> Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Parse one line (with or without its trailing newline)
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T> {
    if line.len() > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge {
            len: line.len(),
            max: MAX_FRAME_LEN,
        });
    }
    Ok(serde_json::from_str(line.trim_end())?)
}
