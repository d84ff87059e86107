//! HID descriptor and report framing
//!
//! HID data reaches the proxy as base64 text, one item per line. The first
//! line carries the report descriptor, every following line one input
//! report.

use crate::error::{ProtocolError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// The proxy registers a single HID device under this id
pub const HID_INDEX: u16 = 0;

/// The register request carries the descriptor length in a 16-bit wIndex
pub const MAX_HID_DESCRIPTOR_LEN: usize = u16::MAX as usize;

fn decode_line(line: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(line.trim())
        .map_err(|e| ProtocolError::InvalidBase64(e.to_string()))
}

/// A HID report descriptor ready to be registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidDescriptor {
    bytes: Vec<u8>,
}

/// One set-hid-report-desc transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HidChunk<'a> {
    /// Byte offset of this chunk inside the descriptor (sent as wIndex)
    pub offset: u16,
    pub data: &'a [u8],
}

impl HidDescriptor {
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() > MAX_HID_DESCRIPTOR_LEN {
            return Err(ProtocolError::DescriptorTooLarge {
                len: bytes.len(),
                max: MAX_HID_DESCRIPTOR_LEN,
            });
        }
        Ok(Self { bytes })
    }

    pub fn from_base64_line(line: &str) -> Result<Self> {
        Self::new(decode_line(line)?)
    }

    /// Total length, as announced by the register request
    pub fn len(&self) -> u16 {
        // Bounded by MAX_HID_DESCRIPTOR_LEN in new()
        self.bytes.len() as u16
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Split into consecutive chunks of at most `max_packet_size` bytes
    pub fn chunks(&self, max_packet_size: usize) -> impl Iterator<Item = HidChunk<'_>> {
        let size = max_packet_size.max(1);
        self.bytes
            .chunks(size)
            .enumerate()
            .map(move |(i, data)| HidChunk {
                offset: (i * size) as u16,
                data,
            })
    }
}

/// One decoded input report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidReport {
    bytes: Vec<u8>,
}

impl HidReport {
    /// Decode a report line; reports must fit in one control packet
    pub fn from_base64_line(line: &str, max_packet_size: usize) -> Result<Self> {
        let bytes = decode_line(line)?;
        if bytes.len() > max_packet_size {
            return Err(ProtocolError::ReportTooLarge {
                len: bytes.len(),
                max: max_packet_size,
            });
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    #[test]
    fn test_descriptor_chunking() {
        let bytes: Vec<u8> = (0..150u8).collect();
        let descriptor = HidDescriptor::new(bytes.clone()).unwrap();
        let chunks: Vec<_> = descriptor.chunks(64).collect();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].offset, 0);
        assert_eq!(chunks[1].offset, 64);
        assert_eq!(chunks[2].offset, 128);
        assert_eq!(chunks[2].data.len(), 22);

        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.data.to_vec()).collect();
        assert_eq!(joined, bytes);
    }

    #[test]
    fn test_descriptor_size_limit() {
        assert!(HidDescriptor::new(vec![0; MAX_HID_DESCRIPTOR_LEN]).is_ok());

        let line = encode(&vec![0xAA; 70_000]);
        assert_eq!(
            HidDescriptor::from_base64_line(&line),
            Err(ProtocolError::DescriptorTooLarge {
                len: 70_000,
                max: MAX_HID_DESCRIPTOR_LEN
            })
        );
    }

    #[test]
    fn test_line_whitespace_is_ignored() {
        let line = format!("{}\r\n", encode(&[1, 2, 3]));
        let descriptor = HidDescriptor::from_base64_line(&line).unwrap();
        assert_eq!(descriptor.as_bytes(), &[1, 2, 3]);
        assert_eq!(descriptor.len(), 3);
    }

    #[test]
    fn test_report_size_limit() {
        let line = encode(&[0; 8]);
        assert!(HidReport::from_base64_line(&line, 8).is_ok());
        assert_eq!(
            HidReport::from_base64_line(&line, 7),
            Err(ProtocolError::ReportTooLarge { len: 8, max: 7 })
        );
    }

    #[test]
    fn test_invalid_base64() {
        assert!(matches!(
            HidReport::from_base64_line("not base64!", 64),
            Err(ProtocolError::InvalidBase64(_))
        ));
    }
}
