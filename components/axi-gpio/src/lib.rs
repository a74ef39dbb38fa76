//! AXI GPIO Driver - Interrupt-driven GPIO in user space
//!
//! Drives a Xilinx AXI GPIO block in the programmable logic through the
//! generic UIO driver, without a custom kernel module. The device tree node
//! is bound to `uio_pdrv_genirq`:
//!
//! ```text
//! chosen {
//!     bootargs = "console=ttyPS0,115200 earlyprintk uio_pdrv_genirq.of_id=generic-uio";
//! };
//! &axi_gpio_0 {
//!     compatible = "generic-uio";
//!     reg = <0x41200000 0x10000 0xFFFC0000 0x20000>;
//! };
//! ```
//!
//! Map 0 is the GPIO register bank, map 1 (optional) the on-chip memory.
//!
//! # Architecture
//! - [`axi_gpio`]: register map and startup sequence
//! - [`handler`]: wait / acknowledge / re-enable state machine
//! - [`ocm`]: second map used as plain memory
//! - [`config`]: TOML configuration

pub mod axi_gpio;
pub mod config;
pub mod handler;
pub mod ocm;

pub use axi_gpio::{AxiGpio, GpioSetup, IrqChannels};
pub use config::{Config, ConfigError};
pub use handler::{AckPolicy, HandshakeLoop, InterruptEvent, State};
pub use ocm::Ocm;
