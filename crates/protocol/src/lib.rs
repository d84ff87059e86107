//! Android Open Accessory wire model
//!
//! This crate defines everything aoa-proxy needs to know about the AOA
//! protocol without touching a USB device: vendor request codes, the
//! accessory-mode vendor/product ids, topology addresses, the accessory
//! identification record and HID descriptor/report framing.
//!
//! # Example
//!
//! ```
//! use protocol::{TopologyAddress, is_accessory_mode};
//!
//! let address: TopologyAddress = "2-1.4".parse().unwrap();
//! assert!(address.matches(2, &[1, 4]));
//! assert!(!address.matches(2, &[1, 4, 2]));
//!
//! assert!(is_accessory_mode(0x18d1, 0x2d01));
//! assert!(!is_accessory_mode(0x18d1, 0x4ee7));
//! ```
//!
//! # HID framing
//!
//! ```
//! use protocol::HidDescriptor;
//!
//! let descriptor = HidDescriptor::from_base64_line("BQEJAqEBCQE=\n").unwrap();
//! let chunks: Vec<_> = descriptor.chunks(4).collect();
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[1].offset, 4);
//! ```

pub mod error;
pub mod hid;
pub mod identity;
pub mod requests;
pub mod topology;
pub mod version;

pub use error::{ProtocolError, Result};
pub use hid::{HID_INDEX, HidChunk, HidDescriptor, HidReport, MAX_HID_DESCRIPTOR_LEN};
pub use identity::{IdentificationRecord, IdentityField, MAX_IDENTITY_FIELD_LEN};
pub use requests::{
    ACCESSORY_PRODUCT_IDS, ACCESSORY_VENDOR_ID, AUDIO_MODE_ENABLED, AccessoryProduct, AoaRequest,
    REQUEST_TYPE_VENDOR_IN, REQUEST_TYPE_VENDOR_OUT, is_accessory_mode,
};
pub use topology::{MAX_PORT_DEPTH, TopologyAddress};
pub use version::AoaVersion;
