//! Protocol error types

use thiserror::Error;

/// Protocol-level errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Topology address text could not be parsed or is out of range
    #[error("Invalid topology address '{input}': {reason}")]
    InvalidTopology { input: String, reason: String },

    /// Identification string exceeds what a single control transfer carries
    #[error("Identification field {field} too long: {len} bytes (max: {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// Identification string contains a NUL byte and cannot be terminated
    #[error("Identification field {field} contains a NUL byte")]
    FieldContainsNul { field: &'static str },

    /// HID line was not valid base64
    #[error("Invalid base64 HID line: {0}")]
    InvalidBase64(String),

    /// HID descriptor exceeds the 16-bit length carried by the register request
    #[error("HID descriptor too big for AOA: {len} bytes (max: {max})")]
    DescriptorTooLarge { len: usize, max: usize },

    /// HID report exceeds the control endpoint's max packet size
    #[error("HID report too big for AOA: {len} bytes (max packet size: {max})")]
    ReportTooLarge { len: usize, max: usize },

    /// Version response shorter than the two bytes the protocol defines
    #[error("Truncated protocol version response: got {0} bytes")]
    TruncatedVersion(usize),
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::DescriptorTooLarge {
            len: 70_000,
            max: 65_535,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("HID descriptor too big"));
        assert!(msg.contains("70000"));
        assert!(msg.contains("65535"));
    }

    #[test]
    fn test_report_too_large_error() {
        let err = ProtocolError::ReportTooLarge { len: 65, max: 64 };
        assert!(format!("{}", err).contains("max packet size: 64"));
    }
}
