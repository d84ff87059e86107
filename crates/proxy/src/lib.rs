//! aoa-proxy
//!
//! Switches an Android device into accessory mode and then bridges its
//! accessory bulk endpoints to stdio or a loopback TCP connection, or
//! drives a virtual HID device over control transfers.

pub mod app;
pub mod bridge;
pub mod config;
pub mod hid;
pub mod negotiator;
pub mod usb;

pub use app::Actions;
pub use config::ProxyConfig;
