//! ugpio - AXI GPIO interrupt test over UIO
//!
//! Configures the GPIO block behind `/dev/uio0`, then prints channel 2
//! (push buttons) every time it raises an interrupt. Runs until SIGINT or
//! SIGTERM; exits with -1 on any failure.
//!
//! Usage:
//!   ugpio [--config ugpio.toml] [--device /dev/uioN] [--ack-pending] [--ocm]

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use axi_gpio::{AckPolicy, AxiGpio, Config, HandshakeLoop, Ocm};
use uio_runtime::{ShutdownSignal, UioDevice};

#[derive(Parser, Debug)]
#[command(name = "ugpio")]
#[command(version)]
#[command(about = "AXI GPIO interrupt handling in user space over UIO")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// UIO device node (overrides the config file)
    #[arg(short, long)]
    device: Option<PathBuf>,

    /// Clear whichever IRQ_STATUS bits are pending instead of the fixed mask
    #[arg(long)]
    ack_pending: bool,

    /// Map the on-chip memory (map 1), clear it and report its sum per interrupt
    #[arg(long)]
    ocm: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    println!("GPIO UIO test.");

    match run(args) {
        Ok(handled) => {
            info!("Stopped after {} interrupts", handled);
        }
        Err(e) => {
            error!("{:#}", e);
            process::exit(-1);
        }
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(device) = &args.device {
        config.device = device.clone();
    }
    if args.ack_pending {
        config.ack.policy = axi_gpio::config::AckMode::Pending;
    }
    if args.ocm {
        config.ocm.enabled = true;
    }

    Ok(config)
}

fn run(args: Args) -> Result<u64> {
    let config = load_config(&args)?;
    let setup = config.gpio_setup()?;
    let policy: AckPolicy = config.ack_policy()?;

    let shutdown = ShutdownSignal::install().context("Failed to install shutdown signal")?;

    let device = UioDevice::open(&config.device)
        .with_context(|| format!("Invalid UIO device file: {}", config.device.display()))?
        .with_shutdown(shutdown);

    let regs = device
        .map(&config.sysfs_root, config.gpio_map)
        .with_context(|| {
            format!("Failed to map GPIO registers of {}", device.path().display())
        })?;
    info!("GPIO registers: map{} ({:#x} bytes)", config.gpio_map, regs.len());

    let ocm = if config.ocm.enabled {
        let region = device
            .map(&config.sysfs_root, config.ocm.map)
            .with_context(|| format!("Failed to map OCM of {}", device.path().display()))?;
        info!("OCM: map{} ({:#x} bytes)", config.ocm.map, region.len());
        Some(Ocm::new(region))
    } else {
        None
    };

    let mut gpio = AxiGpio::new(regs);
    gpio.configure(&setup);
    info!("Interrupts enabled on {:?}, ack {:?}", setup.irq_channels, policy);

    let mut handshake = HandshakeLoop::new(gpio, device)
        .with_policy(policy)
        .with_ocm(ocm);

    handshake.arm().context("Failed to enable the interrupt line")?;

    let handled = handshake
        .run(|event| println!("{event}"))
        .context("Interrupt loop failed")?;

    handshake.quiesce();
    Ok(handled)
}
