//! USB subsystem
//!
//! Locates the target device by bus topology and owns the opened handle
//! for the rest of the run.

pub mod resolver;
pub mod session;

pub use resolver::{find_device, first_match, open_session};
pub use session::{ACCESSORY_INTERFACE, DeviceSession, ResetOutcome};
