//! Device session
//!
//! Wraps one opened device with its cached descriptor. The session owns
//! the handle exclusively; the bulk pipe handed to the bridge shares it
//! only with the bridge's own in-flight transfers.

use common::{AccessoryPipe, BulkEndpoints, Error, Result};
use protocol::{AccessoryProduct, TopologyAddress, is_accessory_mode};
use rusb::{Context, Device, DeviceDescriptor, DeviceHandle, Direction, TransferType};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Interface carrying the accessory bulk endpoints
pub const ACCESSORY_INTERFACE: u8 = 0;

/// Result of a best-effort reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    Reset,
    /// The device had already left the bus (e.g. it re-enumerated)
    AlreadyGone,
}

/// Map a reset result, treating a vanished device as success
pub fn reset_outcome(result: rusb::Result<()>) -> Result<ResetOutcome> {
    match result {
        Ok(()) => Ok(ResetOutcome::Reset),
        Err(rusb::Error::NotFound) | Err(rusb::Error::NoDevice) => Ok(ResetOutcome::AlreadyGone),
        Err(e) => Err(Error::Usb(e)),
    }
}

/// Packet size from a raw wMaxPacketSize (bits 11-12 are for isochronous)
fn packet_size(raw: u16) -> u16 {
    raw & 0x07ff
}

/// Endpoint 0 packet size from bMaxPacketSize0, which USB 3.x devices
/// report as a power-of-two exponent
fn control_packet_size(usb_major: u8, raw: u8) -> usize {
    if usb_major >= 3 {
        1usize << raw.min(15)
    } else {
        raw as usize
    }
}

/// One opened USB device
pub struct DeviceSession {
    device: Device<Context>,
    handle: Arc<DeviceHandle<Context>>,
    descriptor: DeviceDescriptor,
    address: TopologyAddress,
    claimed_interface: Option<u8>,
    endpoints: Option<BulkEndpoints>,
}

impl DeviceSession {
    pub fn new(
        device: Device<Context>,
        handle: DeviceHandle<Context>,
        descriptor: DeviceDescriptor,
        address: TopologyAddress,
    ) -> Self {
        Self {
            device,
            handle: Arc::new(handle),
            descriptor,
            address,
            claimed_interface: None,
            endpoints: None,
        }
    }

    pub fn address(&self) -> &TopologyAddress {
        &self.address
    }

    pub fn vendor_id(&self) -> u16 {
        self.descriptor.vendor_id()
    }

    pub fn product_id(&self) -> u16 {
        self.descriptor.product_id()
    }

    /// Whether the device already enumerates as an accessory
    pub fn is_accessory_mode(&self) -> bool {
        is_accessory_mode(self.vendor_id(), self.product_id())
    }

    pub fn accessory_product(&self) -> Option<AccessoryProduct> {
        AccessoryProduct::from_ids(self.vendor_id(), self.product_id())
    }

    /// Endpoint 0 packet size, the limit for a single HID control payload
    pub fn control_max_packet_size(&self) -> usize {
        control_packet_size(
            self.descriptor.usb_version().major(),
            self.descriptor.max_packet_size(),
        )
    }

    /// Handle for control transfers
    pub fn handle(&self) -> &DeviceHandle<Context> {
        &self.handle
    }

    fn handle_mut(&mut self) -> Result<&mut DeviceHandle<Context>> {
        Arc::get_mut(&mut self.handle).ok_or(Error::SessionBusy)
    }

    /// Claim the accessory interface and hand out its bulk pipe
    ///
    /// Kernel drivers are detached automatically while the interface is
    /// claimed and reattached when it is released.
    pub fn open_bulk_pipe(&mut self) -> Result<AccessoryPipe<Context>> {
        let endpoints = match self.endpoints {
            Some(endpoints) => endpoints,
            None => self.claim_accessory_interface()?,
        };
        Ok(AccessoryPipe::new(Arc::clone(&self.handle), endpoints))
    }

    fn claim_accessory_interface(&mut self) -> Result<BulkEndpoints> {
        self.handle_mut()?
            .set_auto_detach_kernel_driver(true)
            .map_err(Error::AutoDetach)?;

        self.handle_mut()?
            .claim_interface(ACCESSORY_INTERFACE)
            .map_err(|source| Error::Claim {
                interface: ACCESSORY_INTERFACE,
                source,
            })?;
        self.claimed_interface = Some(ACCESSORY_INTERFACE);
        debug!(
            "Claimed interface {} on device at {}",
            ACCESSORY_INTERFACE, self.address
        );

        let endpoints = self.discover_endpoints();
        info!(
            "Accessory endpoints: IN {:#04x}, OUT {:#04x}, max packet size {}",
            endpoints.in_address, endpoints.out_address, endpoints.max_packet_size
        );
        self.endpoints = Some(endpoints);
        Ok(endpoints)
    }

    /// Bulk endpoint pair of the accessory interface's first alternate setting
    fn discover_endpoints(&self) -> BulkEndpoints {
        let config = match self.device.active_config_descriptor() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to get active config descriptor: {}, using default endpoints", e);
                return BulkEndpoints::FALLBACK;
            }
        };

        let mut bulk_in = None;
        let mut bulk_out = None;

        if let Some(setting) = config
            .interfaces()
            .find(|interface| interface.number() == ACCESSORY_INTERFACE)
            .and_then(|interface| interface.descriptors().next())
        {
            for endpoint in setting.endpoint_descriptors() {
                if endpoint.transfer_type() != TransferType::Bulk {
                    continue;
                }
                let entry = (endpoint.address(), packet_size(endpoint.max_packet_size()));
                match endpoint.direction() {
                    Direction::In if bulk_in.is_none() => bulk_in = Some(entry),
                    Direction::Out if bulk_out.is_none() => bulk_out = Some(entry),
                    _ => {}
                }
            }
        }

        match (bulk_in, bulk_out) {
            (Some((in_address, size)), Some((out_address, _))) if size > 0 => BulkEndpoints {
                in_address,
                out_address,
                max_packet_size: size,
            },
            _ => {
                warn!(
                    "Interface {} has no bulk endpoint pair, using default endpoints",
                    ACCESSORY_INTERFACE
                );
                BulkEndpoints::FALLBACK
            }
        }
    }

    /// Reset the device, which drops it out of accessory mode
    pub fn reset(&mut self) -> Result<ResetOutcome> {
        let result = self.handle_mut()?.reset();
        let outcome = reset_outcome(result)?;
        debug!("Reset device at {}: {:?}", self.address, outcome);
        Ok(outcome)
    }

    /// Release the claimed interface
    ///
    /// The handle itself closes once the last reference to it is dropped.
    pub fn close(&mut self) {
        let Some(interface) = self.claimed_interface.take() else {
            return;
        };

        match Arc::get_mut(&mut self.handle) {
            Some(handle) => match handle.release_interface(interface) {
                Ok(()) => debug!("Released interface {} on device at {}", interface, self.address),
                Err(e) => debug!(
                    "Could not release interface {} (device may be gone): {}",
                    interface, e
                ),
            },
            None => warn!(
                "Transfers still outstanding, interface {} is released when the handle closes",
                interface
            ),
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_outcome() {
        assert_eq!(reset_outcome(Ok(())).unwrap(), ResetOutcome::Reset);
        assert_eq!(
            reset_outcome(Err(rusb::Error::NotFound)).unwrap(),
            ResetOutcome::AlreadyGone
        );
        assert_eq!(
            reset_outcome(Err(rusb::Error::NoDevice)).unwrap(),
            ResetOutcome::AlreadyGone
        );
        assert!(reset_outcome(Err(rusb::Error::Io)).is_err());
    }

    #[test]
    fn test_control_packet_size() {
        assert_eq!(control_packet_size(2, 64), 64);
        assert_eq!(control_packet_size(1, 8), 8);
        // USB 3.x: 9 means 2^9
        assert_eq!(control_packet_size(3, 9), 512);
    }

    #[test]
    fn test_packet_size_mask() {
        assert_eq!(packet_size(512), 512);
        assert_eq!(packet_size(64), 64);
        // High-bandwidth bits are not part of the size
        assert_eq!(packet_size(0x1400), 0x400);
    }
}
