//! Top-level dispatch: open the device, then announce, forward or drive HID

use crate::bridge::{Bridge, BridgeExit, ExternalChannel, termination_signal};
use crate::config::ProxyConfig;
use crate::hid::{HidChannel, HidOutcome};
use crate::negotiator::{NegotiationOutcome, Negotiator};
use crate::usb::{DeviceSession, ResetOutcome, open_session};
use common::{Error, Result};
use protocol::{AccessoryProduct, TopologyAddress};
use tracing::{info, warn};

/// What the user asked for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Actions {
    pub announce: bool,
    pub forward: bool,
    pub hid: bool,
}

/// The component a run hands the device to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Switch the device into accessory mode; nothing else runs
    Announce,
    Forward,
    Hid,
    /// No component, at most a reset
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub step: Step,
    /// Announce was requested but the device is already an accessory
    pub already_announced: bool,
    /// Reset the device once the step returns
    pub reset: bool,
}

/// Decide what a run does with the device
///
/// Announcing a device that is not yet in accessory mode ends the run: it
/// re-enumerates and has to be opened again, so it is never reset.
/// Otherwise forwarding takes precedence over HID, and the reset follows
/// whatever ran, including nothing.
pub fn plan(actions: Actions, in_accessory_mode: bool, reset_on_exit: bool) -> Plan {
    if actions.announce && !in_accessory_mode {
        return Plan {
            step: Step::Announce,
            already_announced: false,
            reset: false,
        };
    }

    let step = if actions.forward {
        Step::Forward
    } else if actions.hid {
        Step::Hid
    } else {
        Step::Idle
    };
    Plan {
        step,
        already_announced: actions.announce,
        reset: reset_on_exit,
    }
}

/// Forwarding needs the bulk accessory interface, which audio-only
/// variants do not expose
pub fn check_forwardable(product: Option<AccessoryProduct>) -> Result<()> {
    match product {
        Some(product) if !product.has_accessory_interface() => {
            Err(Error::NoAccessoryInterface(product))
        }
        _ => Ok(()),
    }
}

/// Run the requested actions against the device at `address`
pub fn run(config: &ProxyConfig, address: &TopologyAddress, actions: Actions) -> Result<()> {
    let context = rusb::Context::new()?;
    let mut session = open_session(&context, address)?;

    if let Some(product) = session.accessory_product() {
        info!("Device at {} is in accessory mode ({})", address, product);
    }

    let plan = plan(
        actions,
        session.is_accessory_mode(),
        config.usb.reset_on_exit,
    );
    if plan.already_announced {
        info!("Device already in accessory mode");
    }

    match plan.step {
        Step::Announce => return announce(&session, config),
        Step::Forward => forward(&mut session, config)?,
        Step::Hid => hid(&session, config)?,
        Step::Idle => {}
    }

    if plan.reset {
        match session.reset() {
            Ok(ResetOutcome::Reset) => info!("Device reset"),
            Ok(ResetOutcome::AlreadyGone) => info!("Device already gone, nothing to reset"),
            Err(e) => warn!("Failed to reset device: {}", e),
        }
    }

    Ok(())
}

fn announce(session: &DeviceSession, config: &ProxyConfig) -> Result<()> {
    let negotiator = Negotiator::new(
        session.handle(),
        &config.identity,
        config.announce.audio,
        config.usb.control_timeout(),
    );

    match negotiator.negotiate()? {
        NegotiationOutcome::Started {
            version,
            identified,
            audio,
        } => info!(
            "Announced to {} device (identified: {}, audio: {})",
            version, identified, audio
        ),
        NegotiationOutcome::Unsupported(reason) => {
            info!("Device left untouched: {:?}", reason)
        }
    }
    Ok(())
}

fn forward(session: &mut DeviceSession, config: &ProxyConfig) -> Result<()> {
    check_forwardable(session.accessory_product())?;
    let pipe = session.open_bulk_pipe()?;
    let bridge = Bridge::new(pipe, config.bridge.clone());
    let address = session.address().to_string();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let report = runtime.block_on(async {
        let shutdown = termination_signal()?;
        let channel = ExternalChannel::open(config.bridge.connect_port).await?;
        info!("Forwarding between {} and device at {}", channel.describe(), address);

        let (reader, writer) = channel.split();
        bridge.run(reader, writer, shutdown).await
    });

    // A blocking stdin read cannot be cancelled; do not wait on it forever
    drop(bridge);
    runtime.shutdown_timeout(config.bridge.drain_timeout());

    let report = report?;
    if matches!(report.exit, BridgeExit::TransferFailed { .. }) {
        warn!("Forwarding stopped by the device side");
    }
    Ok(())
}

fn hid(session: &DeviceSession, config: &ProxyConfig) -> Result<()> {
    let channel = HidChannel::new(
        session.handle(),
        session.control_max_packet_size(),
        config.hid.settle_delay(),
        config.usb.control_timeout(),
    );

    let stdin = std::io::stdin();
    match channel.run(stdin.lock())? {
        HidOutcome::NoDescriptor => {}
        HidOutcome::DescriptorRejected(reason) => warn!("HID descriptor rejected: {}", reason),
        HidOutcome::Completed { reports_sent } => {
            info!("HID input ended after {} reports", reports_sent)
        }
        HidOutcome::Aborted {
            reports_sent,
            reason,
        } => warn!(
            "HID event loop aborted after {} reports: {}",
            reports_sent, reason
        ),
    }
    Ok(())
}
