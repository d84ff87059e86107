//! Common error types

use crate::transport::TransferDirection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    #[error("Device not found at {0}")]
    DeviceNotFound(String),

    #[error("Access denied opening device at {0}")]
    AccessDenied(String),

    #[error("Failed to open device at {address}: {source}")]
    Open {
        address: String,
        source: rusb::Error,
    },

    #[error("Failed to enable kernel driver auto-detach: {0}")]
    AutoDetach(rusb::Error),

    #[error("Failed to claim interface {interface}: {source}")]
    Claim { interface: u8, source: rusb::Error },

    #[error("Control transfer '{step}' failed: {source}")]
    Control {
        step: &'static str,
        source: rusb::Error,
    },

    #[error("Device is in {0} mode, which has no accessory interface to forward")]
    NoAccessoryInterface(protocol::AccessoryProduct),

    #[error("A {0} transfer is already in flight")]
    TransferInFlight(TransferDirection),

    #[error("Transfer task failed: {0}")]
    Task(String),

    #[error("Device session busy: outstanding transfers still hold the handle")]
    SessionBusy,

    #[error("Short write to external output: wrote {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },

    #[error("Failed to connect to localhost:{port}: {source}")]
    Connect {
        port: u16,
        source: std::io::Error,
    },

    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this is a permission problem the user can fix with udev rules
    pub fn is_access_denied(&self) -> bool {
        matches!(
            self,
            Error::AccessDenied(_)
                | Error::Usb(rusb::Error::Access)
                | Error::Claim {
                    source: rusb::Error::Access,
                    ..
                }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ShortWrite {
            expected: 10,
            written: 4,
        };
        assert_eq!(
            err.to_string(),
            "Short write to external output: wrote 4 of 10 bytes"
        );

        let err = Error::Control {
            step: "start",
            source: rusb::Error::Pipe,
        };
        assert!(err.to_string().contains("'start'"));
    }

    #[test]
    fn test_access_denied_classification() {
        assert!(Error::AccessDenied("1-1".to_string()).is_access_denied());
        assert!(Error::Usb(rusb::Error::Access).is_access_denied());
        assert!(!Error::DeviceNotFound("1-1".to_string()).is_access_denied());
    }
}
