//! aoa-proxy
//!
//! Android Open Accessory proxy: announces a host as an accessory to the
//! Android device at a given USB port, then forwards the accessory bulk
//! channel to stdio or a local TCP port, or feeds it HID reports.

use anyhow::{Context, Result};
use clap::Parser;
use common::setup_logging;
use protocol::TopologyAddress;
use proxy::{Actions, ProxyConfig, app, config};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "aoa-proxy")]
#[command(author, version, about = "Android Open Accessory proxy")]
#[command(long_about = "
Talks to an Android device over the Android Open Accessory protocol.

The device is addressed by its physical USB port, because it re-enumerates
under a new device number after switching into accessory mode.

EXAMPLES:
    # Ask the device on bus 2, port 1.4 to enter accessory mode
    aoa-proxy -p 2-1.4 -a

    # Forward the accessory channel to stdio
    aoa-proxy -p 2-1.4 -f

    # Forward to a local TCP service, resetting the device afterwards
    aoa-proxy -p 2-1.4 -f -c 5555 -r

    # Register a HID descriptor and send reports (base64 lines on stdin)
    aoa-proxy -p 2-1.4 -y < reports.txt

CONFIGURATION:
    The proxy looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/aoa-proxy/proxy.toml
    3. /etc/aoa-proxy/proxy.toml
    4. Built-in defaults
")]
struct Args {
    /// Device address as BUSNUM-PORT[.PORT...]
    #[arg(short, long, value_name = "BUS-PORTS")]
    port: Option<TopologyAddress>,

    /// Switch the device into accessory mode
    #[arg(short, long)]
    announce: bool,

    /// Forward the accessory bulk channel
    #[arg(short, long)]
    forward: bool,

    /// Drive a HID device from base64 lines on stdin
    #[arg(short = 'y', long)]
    hid: bool,

    /// Request audio output while announcing (AOAv2)
    #[arg(short = 'A', long)]
    audio: bool,

    #[arg(short, long)]
    manufacturer: Option<String>,

    #[arg(short = 'M', long)]
    model: Option<String>,

    #[arg(short = 'v', long)]
    model_version: Option<String>,

    #[arg(short, long)]
    serial: Option<String>,

    #[arg(short, long)]
    description: Option<String>,

    #[arg(short, long)]
    url: Option<String>,

    /// Hold back input until the device has sent data
    #[arg(short, long)]
    wait: bool,

    /// Forward to localhost:PORT instead of stdio
    #[arg(short, long, value_name = "PORT")]
    connect: Option<u16>,

    /// Reset the device when the run ends (leaves accessory mode); not after announcing
    #[arg(short, long)]
    reset_on_exit: bool,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut ProxyConfig) {
        if let Some(port) = &self.port {
            config.usb.port = Some(port.clone());
        }
        if let Some(level) = &self.log_level {
            config.proxy.log_level = level.clone();
        }

        let identity = &mut config.identity;
        for (value, target) in [
            (&self.manufacturer, &mut identity.manufacturer),
            (&self.model, &mut identity.model),
            (&self.model_version, &mut identity.version),
            (&self.serial, &mut identity.serial),
            (&self.description, &mut identity.description),
            (&self.url, &mut identity.url),
        ] {
            if let Some(value) = value {
                *target = value.clone();
            }
        }

        config.announce.audio |= self.audio;
        config.bridge.wait_for_first_byte |= self.wait;
        config.usb.reset_on_exit |= self.reset_on_exit;
        if self.connect.is_some() {
            config.bridge.connect_port = self.connect;
        }
    }

    fn actions(&self) -> Actions {
        Actions {
            announce: self.announce,
            forward: self.forward,
            hid: self.hid,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = ProxyConfig::default();
        let path = ProxyConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = if let Some(ref path) = args.config {
        config::load_config(path).context("Failed to load configuration")?
    } else {
        ProxyConfig::load_or_default().context("Failed to load configuration")?
    };
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    setup_logging(&config.proxy.log_level).context("Failed to setup logging")?;
    info!("aoa-proxy v{}", env!("CARGO_PKG_VERSION"));

    let address = config.topology()?.clone();
    let actions = args.actions();
    if actions == Actions::default() && !config.usb.reset_on_exit {
        warn!("Nothing to do: pass --announce, --forward, --hid or --reset-on-exit");
    }

    if let Err(e) = app::run(&config, &address, actions) {
        error!("{}", e);
        if e.is_access_denied() {
            eprintln!(
                "Hint: the current user needs write access to the device node. \
                 Add a udev rule such as\n  \
                 SUBSYSTEM==\"usb\", ATTR{{idVendor}}==\"18d1\", MODE=\"0666\"\n\
                 or run as root."
            );
        }
        return Err(e).with_context(|| format!("aoa-proxy failed for device at {}", address));
    }

    Ok(())
}
