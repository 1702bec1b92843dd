//! Wire-level view of a chat message.
//!
//! A datagram carries nothing but shifted text: there is no header, no length prefix and no
//! checksum. A handful of reserved literals double as the control protocol:
//!
//! `!status` asks the peer to prove it is reachable, `!acknowledgement` is the answer and
//! `!exit` tells the peer to shut down along with us.
//!
//! The shift is applied by [`ShiftCodec`], which plugs into [`tokio_util::udp::UdpFramed`] so
//! that the workers only ever see decoded payloads.

use std::fmt;
use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::MAX_MESSAGE_LEN;

/// Default distance every byte is moved by on the wire.
pub const SHIFT: u8 = 5;

pub const EXIT: &str = "!exit";
pub const STATUS: &str = "!status";
pub const ACKNOWLEDGEMENT: &str = "!acknowledgement";

/// A reserved protocol literal. Ordinary chat text never parses as one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// The sender is leaving and wants us to leave too.
    Exit,
    /// Asks the peer whether it is there.
    Status,
    /// Reply to `!status`.
    Acknowledgement,
}

impl Control {
    /// Classifies a decoded payload. The line terminator the sender typed is ignored, anything
    /// else around the literal makes it ordinary text.
    pub fn parse(payload: &[u8]) -> Option<Control> {
        let line = payload.strip_suffix(b"\n").unwrap_or(payload);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        match line {
            l if l == EXIT.as_bytes() => Some(Control::Exit),
            l if l == STATUS.as_bytes() => Some(Control::Status),
            l if l == ACKNOWLEDGEMENT.as_bytes() => Some(Control::Acknowledgement),
            _ => None,
        }
    }

    pub fn literal(self) -> &'static str {
        match self {
            Control::Exit => EXIT,
            Control::Status => STATUS,
            Control::Acknowledgement => ACKNOWLEDGEMENT,
        }
    }

    pub fn to_bytes(self) -> Bytes {
        Bytes::from_static(self.literal().as_bytes())
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.literal())
    }
}

pub fn encode(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().map(|b| b.wrapping_add(SHIFT)).collect()
}

pub fn decode(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().map(|b| b.wrapping_sub(SHIFT)).collect()
}

/// Shifts every byte forward on the way out and back on the way in.
///
/// Each datagram is a whole frame: `decode` takes everything that was received and hands it back
/// as one message.
#[derive(Debug, Clone, Copy)]
pub struct ShiftCodec {
    shift: u8,
}

impl ShiftCodec {
    pub fn new() -> ShiftCodec {
        ShiftCodec::with_shift(SHIFT)
    }

    pub fn with_shift(shift: u8) -> ShiftCodec {
        ShiftCodec { shift }
    }
}

impl Default for ShiftCodec {
    fn default() -> Self {
        ShiftCodec::new()
    }
}

impl Decoder for ShiftCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if buf.is_empty() {
            return Ok(None);
        }
        let mut frame = buf.split_to(buf.len());
        frame.truncate(MAX_MESSAGE_LEN);
        for byte in frame.iter_mut() {
            *byte = byte.wrapping_sub(self.shift);
        }
        Ok(Some(frame.freeze()))
    }
}

impl Encoder<Bytes> for ShiftCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > MAX_MESSAGE_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "message of {} bytes exceeds the {} byte limit",
                    item.len(),
                    MAX_MESSAGE_LEN
                ),
            ));
        }
        dst.reserve(item.len());
        for byte in item.iter() {
            dst.put_u8(byte.wrapping_add(self.shift));
        }
        Ok(())
    }
}
