//! Port handshake parsing.
//!
//! The child announces its listening port by writing it as base-10 text to
//! stdout. Every chunk read from stdout is parsed on its own; there is no
//! buffering across reads, so a port split over two writes yields two
//! `Ready` events.

use std::fmt;

/// Port reported by a stdout chunk, or the "unknown" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandshakePort(i32);

impl HandshakePort {
    /// Sentinel for "ready, but no usable port". Not an error.
    pub const UNKNOWN: HandshakePort = HandshakePort(-1);

    /// Parses one whole stdout chunk.
    ///
    /// The chunk is decoded lossily, trimmed, and must then be exactly a
    /// base-10 `i32` (an optional sign is accepted). Anything else,
    /// including an empty chunk or a value that overflows, is `UNKNOWN`.
    pub fn parse(chunk: &[u8]) -> Self {
        let text = String::from_utf8_lossy(chunk);
        text.trim()
            .parse::<i32>()
            .map(HandshakePort)
            .unwrap_or(Self::UNKNOWN)
    }

    pub fn from_raw(raw: i32) -> Self {
        HandshakePort(raw)
    }

    /// The value carried on the wire: the parsed integer or -1.
    pub fn raw(self) -> i32 {
        self.0
    }

    pub fn is_known(self) -> bool {
        self != Self::UNKNOWN
    }

    /// The value as a TCP port, if it is one.
    pub fn as_u16(self) -> Option<u16> {
        u16::try_from(self.0).ok()
    }
}

impl fmt::Display for HandshakePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "{}", self.0)
        } else {
            f.write_str("unknown")
        }
    }
}
