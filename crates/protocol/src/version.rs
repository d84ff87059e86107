//! AOA protocol version reported by the device

use crate::error::{ProtocolError, Result};
use byteorder::{ByteOrder, LittleEndian};
use std::fmt;

/// Protocol version returned by the get-protocol request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AoaVersion(pub u16);

impl AoaVersion {
    /// AOA 1.0: accessory mode only
    pub const V1: AoaVersion = AoaVersion(1);
    /// AOA 2.0: adds audio output and HID support
    pub const V2: AoaVersion = AoaVersion(2);

    /// Decode the 2-byte little-endian get-protocol response
    pub fn from_response(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(ProtocolError::TruncatedVersion(bytes.len()));
        }
        Ok(Self(LittleEndian::read_u16(bytes)))
    }

    /// Only versions 1 and 2 are defined
    pub fn is_supported(&self) -> bool {
        matches!(self.0, 1 | 2)
    }

    /// Audio mode switching exists from version 2 on
    pub fn supports_audio(&self) -> bool {
        *self == Self::V2
    }
}

impl fmt::Display for AoaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AOAv{}", self.0)
    }
}
