//! Driver configuration
//!
//! Loaded from an optional TOML file. Every field has a default matching
//! the reference board (ZedBoard, GPIO at uio0), so an empty file works.
//!
//! ```toml
//! device = "/dev/uio0"
//! sysfs_root = "/sys/class/uio"
//! gpio_map = 0
//!
//! [gpio]
//! tri = 0x0
//! tri2 = 0xF
//! irq_channels = 2
//!
//! [ack]
//! policy = "fixed"   # or "pending"
//! mask = 2
//!
//! [ocm]
//! enabled = false
//! map = 1
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use uio_runtime::DEFAULT_SYSFS_ROOT;

use crate::axi_gpio::{GpioSetup, IrqChannels};
use crate::handler::AckPolicy;
use crate::ocm::OCM_MAP;

/// Default UIO device node
pub const DEFAULT_DEVICE: &str = "/dev/uio0";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{field} = {value:#x} is not a non-empty set of GPIO channels")]
    InvalidChannels { field: &'static str, value: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub device: PathBuf,
    pub sysfs_root: PathBuf,
    pub gpio_map: usize,
    pub gpio: GpioConfig,
    pub ack: AckConfig,
    pub ocm: OcmConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GpioConfig {
    pub tri: u32,
    pub tri2: u32,
    pub irq_channels: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckMode {
    Fixed,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AckConfig {
    pub policy: AckMode,
    pub mask: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OcmConfig {
    pub enabled: bool,
    pub map: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE),
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_ROOT),
            gpio_map: 0,
            gpio: GpioConfig::default(),
            ack: AckConfig::default(),
            ocm: OcmConfig::default(),
        }
    }
}

impl Default for GpioConfig {
    fn default() -> Self {
        let setup = GpioSetup::default();
        Self {
            tri: setup.tri,
            tri2: setup.tri2,
            irq_channels: setup.irq_channels.bits(),
        }
    }
}

impl Default for AckConfig {
    fn default() -> Self {
        Self {
            policy: AckMode::Fixed,
            mask: IrqChannels::CHANNEL_2.bits(),
        }
    }
}

impl Default for OcmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            map: OCM_MAP,
        }
    }
}

impl Config {
    /// Read and validate the TOML file at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse and validate TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.gpio_setup()?;
        config.ack_policy()?;
        Ok(config)
    }

    /// Startup register values
    pub fn gpio_setup(&self) -> Result<GpioSetup, ConfigError> {
        Ok(GpioSetup {
            tri: self.gpio.tri,
            tri2: self.gpio.tri2,
            irq_channels: channels("gpio.irq_channels", self.gpio.irq_channels)?,
        })
    }

    pub fn ack_policy(&self) -> Result<AckPolicy, ConfigError> {
        match self.ack.policy {
            AckMode::Fixed => Ok(AckPolicy::Fixed(channels("ack.mask", self.ack.mask)?)),
            AckMode::Pending => Ok(AckPolicy::Pending),
        }
    }
}

fn channels(field: &'static str, value: u32) -> Result<IrqChannels, ConfigError> {
    match IrqChannels::from_bits(value) {
        Some(channels) if !channels.is_empty() => Ok(channels),
        _ => Err(ConfigError::InvalidChannels { field, value }),
    }
}
