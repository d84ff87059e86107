//! Common utilities for aoa-proxy
//!
//! This crate provides functionality shared between the proxy components:
//! the error type, logging setup, the USB transport seams and the mock
//! transports used by tests.

pub mod error;
pub mod logging;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transport;

pub use error::{Error, Result};
pub use logging::setup_logging;
pub use transport::{
    AccessoryPipe, BulkEndpoints, BulkPipe, ControlTransport, TransferDirection,
};
