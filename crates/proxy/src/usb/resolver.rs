//! Topology resolver
//!
//! Maps a bus + port path to one opened device. Device numbers are useless
//! here because the device re-enumerates under a new one after switching
//! into accessory mode; the physical port stays the same.

use crate::usb::session::DeviceSession;
use common::{Error, Result};
use protocol::TopologyAddress;
use rusb::{Context, Device, UsbContext};
use tracing::{debug, info};

/// Index of the first candidate sitting at `address`
///
/// Candidates are (bus number, port path) pairs in enumeration order.
pub fn first_match<'a, I>(address: &TopologyAddress, candidates: I) -> Option<usize>
where
    I: IntoIterator<Item = (u8, &'a [u8])>,
{
    candidates
        .into_iter()
        .position(|(bus, ports)| address.matches(bus, ports))
}

/// Find the device attached at `address`
pub fn find_device<T: UsbContext>(context: &T, address: &TopologyAddress) -> Result<Device<T>> {
    let devices = context.devices()?;

    let mut candidates: Vec<(Device<T>, Vec<u8>)> = devices
        .iter()
        .filter(|device| device.bus_number() == address.bus())
        .filter_map(|device| match device.port_numbers() {
            Ok(ports) => Some((device, ports)),
            Err(e) => {
                debug!(
                    "Skipping device {:03}:{:03}, port path unavailable: {}",
                    device.bus_number(),
                    device.address(),
                    e
                );
                None
            }
        })
        .collect();

    debug!(
        "{} candidate(s) on bus {} for {}",
        candidates.len(),
        address.bus(),
        address
    );

    let index = first_match(
        address,
        candidates
            .iter()
            .map(|(device, ports)| (device.bus_number(), ports.as_slice())),
    )
    .ok_or_else(|| Error::DeviceNotFound(address.to_string()))?;

    let (device, _) = candidates.swap_remove(index);
    Ok(device)
}

/// Find and open the device attached at `address`
///
/// Nothing is claimed yet; the bridge claims the accessory interface when
/// it starts.
pub fn open_session(context: &Context, address: &TopologyAddress) -> Result<DeviceSession> {
    let device = find_device(context, address)?;
    let descriptor = device.device_descriptor()?;

    let handle = device.open().map_err(|e| match e {
        rusb::Error::Access => Error::AccessDenied(address.to_string()),
        source => Error::Open {
            address: address.to_string(),
            source,
        },
    })?;

    info!(
        "Opened device {:04x}:{:04x} at {} (bus {:03} device {:03})",
        descriptor.vendor_id(),
        descriptor.product_id(),
        address,
        device.bus_number(),
        device.address()
    );

    Ok(DeviceSession::new(device, handle, descriptor, address.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_wins() {
        let address: TopologyAddress = "1-2".parse().unwrap();
        let candidates: Vec<(u8, &[u8])> = vec![
            (1, &[3][..]),
            (1, &[2][..]),
            (1, &[2][..]),
        ];
        assert_eq!(first_match(&address, candidates), Some(1));
    }

    #[test]
    fn test_no_match() {
        let address: TopologyAddress = "1-2.1".parse().unwrap();
        let candidates: Vec<(u8, &[u8])> = vec![
            (2, &[2, 1][..]),
            (1, &[2][..]),
            (1, &[2, 1, 4][..]),
        ];
        assert_eq!(first_match(&address, candidates), None);
    }

    #[test]
    fn test_hub_chain_match() {
        let address: TopologyAddress = "3-1.4.2".parse().unwrap();
        let candidates: Vec<(u8, &[u8])> = vec![
            (3, &[1][..]),
            (3, &[1, 4][..]),
            (3, &[1, 4, 2][..]),
        ];
        assert_eq!(first_match(&address, candidates), Some(2));
    }
}
