//! USB transport seams
//!
//! The negotiator and the HID channel only need vendor control transfers,
//! the bridge only needs one bulk endpoint pair. Both are expressed as
//! traits so the components run against rusb in production and against
//! scripted mocks in tests.

use rusb::{DeviceHandle, UsbContext};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Direction of a transfer, from the host's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    /// Device to host
    In,
    /// Host to device
    Out,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferDirection::In => f.write_str("IN"),
            TransferDirection::Out => f.write_str("OUT"),
        }
    }
}

/// Blocking control transfers on endpoint 0
pub trait ControlTransport {
    fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize>;

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        timeout: Duration,
    ) -> rusb::Result<usize>;
}

impl<T: UsbContext> ControlTransport for DeviceHandle<T> {
    fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        DeviceHandle::read_control(self, request_type, request, value, index, buf, timeout)
    }

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        DeviceHandle::write_control(self, request_type, request, value, index, buf, timeout)
    }
}

/// Blocking transfers on the accessory's bulk endpoint pair
///
/// Implementations are shared with the blocking pool, so they must be
/// `Send + Sync`. A zero timeout waits forever.
pub trait BulkPipe: Send + Sync + 'static {
    fn write_bulk(&self, data: &[u8], timeout: Duration) -> rusb::Result<usize>;

    fn read_bulk(&self, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize>;

    /// Size of the per-direction transfer buffers
    fn max_packet_size(&self) -> usize;
}

/// Bulk endpoint addresses of the accessory interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkEndpoints {
    pub in_address: u8,
    pub out_address: u8,
    pub max_packet_size: u16,
}

impl BulkEndpoints {
    /// Addresses used when the descriptor does not list a bulk pair
    pub const FALLBACK: BulkEndpoints = BulkEndpoints {
        in_address: 0x81,
        out_address: 0x01,
        max_packet_size: 512,
    };
}

/// rusb-backed bulk pipe
pub struct AccessoryPipe<T: UsbContext> {
    handle: Arc<DeviceHandle<T>>,
    endpoints: BulkEndpoints,
}

impl<T: UsbContext> AccessoryPipe<T> {
    pub fn new(handle: Arc<DeviceHandle<T>>, endpoints: BulkEndpoints) -> Self {
        Self { handle, endpoints }
    }
}

impl<T: UsbContext + 'static> BulkPipe for AccessoryPipe<T> {
    fn write_bulk(&self, data: &[u8], timeout: Duration) -> rusb::Result<usize> {
        self.handle
            .write_bulk(self.endpoints.out_address, data, timeout)
    }

    fn read_bulk(&self, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        self.handle.read_bulk(self.endpoints.in_address, buf, timeout)
    }

    fn max_packet_size(&self) -> usize {
        self.endpoints.max_packet_size as usize
    }
}
