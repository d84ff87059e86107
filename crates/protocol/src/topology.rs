//! Bus topology addresses
//!
//! A device's address (devnum) changes every time it re-enumerates, which an
//! Android device does right after it is switched into accessory mode. The
//! bus number plus the chain of hub ports leading to the device stays the
//! same, so that is what the proxy is pointed at.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum hub depth allowed by the USB 3.0 specification
pub const MAX_PORT_DEPTH: usize = 7;

/// Bus number plus port path, e.g. `2-1.4`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TopologyAddress {
    bus: u8,
    ports: Vec<u8>,
}

impl TopologyAddress {
    /// Build an address, validating the port path
    pub fn new(bus: u8, ports: &[u8]) -> Result<Self> {
        let invalid = |reason: &str| ProtocolError::InvalidTopology {
            input: format_address(bus, ports),
            reason: reason.to_string(),
        };

        if ports.is_empty() {
            return Err(invalid("port path must not be empty"));
        }
        if ports.len() > MAX_PORT_DEPTH {
            return Err(invalid("port path deeper than 7 levels"));
        }
        if ports.contains(&0) {
            return Err(invalid("port numbers must be between 1 and 255"));
        }

        Ok(Self {
            bus,
            ports: ports.to_vec(),
        })
    }

    pub fn bus(&self) -> u8 {
        self.bus
    }

    pub fn ports(&self) -> &[u8] {
        &self.ports
    }

    /// Check a candidate device's bus number and port path against this address
    ///
    /// Both paths are compared index by index as if zero-padded, up to and
    /// including the terminating zero of the requested path. A candidate
    /// sitting deeper behind the same hub chain therefore does not match.
    pub fn matches(&self, bus: u8, ports: &[u8]) -> bool {
        if bus != self.bus {
            return false;
        }

        (0..=self.ports.len()).all(|i| {
            let wanted = self.ports.get(i).copied().unwrap_or(0);
            let actual = ports.get(i).copied().unwrap_or(0);
            wanted == actual
        })
    }
}

fn format_address(bus: u8, ports: &[u8]) -> String {
    let path: Vec<String> = ports.iter().map(|p| p.to_string()).collect();
    format!("{}-{}", bus, path.join("."))
}

impl fmt::Display for TopologyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_address(self.bus, &self.ports))
    }
}

impl FromStr for TopologyAddress {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| ProtocolError::InvalidTopology {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let (bus, path) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| invalid("expected BUSNUM-PORTNUMS, e.g. 2-1.4"))?;

        let bus: u8 = bus
            .parse()
            .map_err(|_| invalid("bus number must be between 0 and 255"))?;

        let ports = path
            .split('.')
            .map(|p| {
                p.parse::<u8>()
                    .ok()
                    .filter(|n| *n != 0)
                    .ok_or_else(|| invalid("port numbers must be between 1 and 255"))
            })
            .collect::<Result<Vec<u8>>>()?;

        Self::new(bus, &ports).map_err(|_| invalid("port path must have 1 to 7 entries"))
    }
}

impl TryFrom<String> for TopologyAddress {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TopologyAddress> for String {
    fn from(address: TopologyAddress) -> Self {
        address.to_string()
    }
}
