//! ADB host-protocol codec
//!
//! Requests to the ADB server are framed as:
//! ```text
//! [ 4 bytes: payload length (lower-case hex ASCII) ][ N bytes: payload ]
//! ```
//!
//! Replies start with a 4-byte status word. `OKAY` is followed by the
//! service's own data; `FAIL` is followed by a hex length and a message.
//! Shell services stream raw output until the server closes the socket,
//! which [`LineDecoder`] splits back into lines.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Maximum request payload expressible with a 4-digit hex length
pub const MAX_PAYLOAD_SIZE: usize = 0xFFFF;

/// Width of the hex length prefix and of the status word
pub const PREFIX_LEN: usize = 4;

const OKAY: &[u8; 4] = b"OKAY";
const FAIL: &[u8; 4] = b"FAIL";

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Request too large: {0} bytes (max: {MAX_PAYLOAD_SIZE})")]
    RequestTooLarge(usize),

    #[error("Invalid hex length prefix: {0:?}")]
    InvalidLength(String),

    #[error("Unknown status word: {0:?}")]
    UnknownStatus(String),

    #[error("Payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Status word at the start of every server reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// The request was accepted
    Okay,
    /// The request was refused, with the server's reason
    Fail(String),
}

/// Encode a request payload into a length-prefixed byte buffer
pub fn encode_request(payload: &str) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::with_capacity(PREFIX_LEN + payload.len());
    encode_request_into(payload, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a request payload directly into a provided buffer
pub fn encode_request_into(payload: &str, buf: &mut BytesMut) -> Result<(), CodecError> {
    let len = payload.len();
    if len > MAX_PAYLOAD_SIZE {
        return Err(CodecError::RequestTooLarge(len));
    }

    buf.reserve(PREFIX_LEN + len);
    buf.put_slice(format!("{:04x}", len).as_bytes());
    buf.put_slice(payload.as_bytes());

    Ok(())
}

/// Parse a 4-digit hex length prefix
fn parse_hex_length(prefix: &[u8]) -> Result<usize, CodecError> {
    let text = String::from_utf8_lossy(prefix);
    if prefix.len() != PREFIX_LEN || !prefix.iter().all(u8::is_ascii_hexdigit) {
        return Err(CodecError::InvalidLength(text.into_owned()));
    }
    usize::from_str_radix(&text, 16).map_err(|_| CodecError::InvalidLength(text.into_owned()))
}

/// Try to decode a hex-length-prefixed string from a buffer
///
/// Returns:
/// - `Ok(Some(text))` if a complete message was decoded
/// - `Ok(None)` if more data is needed (nothing is consumed)
/// - `Err(...)` if the data is invalid
pub fn decode_length_prefixed(buf: &mut BytesMut) -> Result<Option<String>, CodecError> {
    if buf.len() < PREFIX_LEN {
        return Ok(None);
    }

    let msg_len = parse_hex_length(&buf[..PREFIX_LEN])?;
    if buf.len() < PREFIX_LEN + msg_len {
        return Ok(None);
    }

    buf.advance(PREFIX_LEN);
    let msg_bytes = buf.split_to(msg_len);

    Ok(Some(String::from_utf8(msg_bytes.to_vec())?))
}

/// Try to decode a reply status from a buffer
///
/// A `FAIL` status is only returned once its whole message is buffered.
pub fn decode_status(buf: &mut BytesMut) -> Result<Option<Status>, CodecError> {
    if buf.len() < PREFIX_LEN {
        return Ok(None);
    }

    let word = [buf[0], buf[1], buf[2], buf[3]];
    match &word {
        word if word == OKAY => {
            buf.advance(PREFIX_LEN);
            Ok(Some(Status::Okay))
        }
        word if word == FAIL => {
            let mut rest = BytesMut::from(&buf[PREFIX_LEN..]);
            match decode_length_prefixed(&mut rest)? {
                Some(message) => {
                    let consumed = buf.len() - rest.len();
                    buf.advance(consumed);
                    Ok(Some(Status::Fail(message)))
                }
                None => Ok(None),
            }
        }
        word => Err(CodecError::UnknownStatus(
            String::from_utf8_lossy(word).into_owned(),
        )),
    }
}

/// Streaming splitter turning raw shell output into lines
#[derive(Debug, Default)]
pub struct LineDecoder {
    /// Bytes of the line currently being accumulated
    buffer: BytesMut,
}

impl LineDecoder {
    /// Create a new line decoder
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Take the next complete line, without its terminator
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|b| *b == b'\n')?;
        let mut line = self.buffer.split_to(pos + 1);
        line.truncate(pos);
        if line.last() == Some(&b'\r') {
            line.truncate(pos - 1);
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Take every complete line currently buffered
    pub fn drain_lines(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.next_line()).collect()
    }

    /// Flush a trailing line that has no terminator
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = self.buffer.split();
        let text = String::from_utf8_lossy(&rest);
        Some(text.strip_suffix('\r').unwrap_or(text.as_ref()).to_string())
    }
}
