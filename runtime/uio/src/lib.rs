//! UIO Runtime - User-space access to devices exported through Linux UIO
//!
//! # Purpose
//! Lets a driver living in an ordinary process own a peripheral that the
//! kernel exposes through the generic UIO framework (`uio_pdrv_genirq`):
//! map its register banks, talk to its registers with volatile accesses and
//! wait on / re-arm its interrupt line.
//!
//! # Integration Points
//! - Depends on: `/dev/uioN` (interrupt channel + mmap), `/sys/class/uio` (map sizes)
//! - Provides to: user-space drivers (see `components/axi-gpio`)
//!
//! # Architecture
//! - [`sysfs`]: resolves the byte size of map N from its sysfs descriptor
//! - [`mmio`]: owning mapping handle and the [`RegisterBank`] access trait
//! - [`channel`]: 4-byte framing of the UIO interrupt count / IRQ control
//! - [`device`]: the `/dev/uioN` handle tying mapping and channel together
//! - [`shutdown`]: signal-driven cancellation of the blocking wait
//!
//! # Testing Strategy
//! - Unit tests: size parsing, region invariants, channel framing
//! - Integration tests: sysfs fixtures on a temp dir, anonymous regions as
//!   simulated register banks, a real file standing in for `/dev/uioN`

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub mod channel;
pub mod device;
pub mod mmio;
pub mod shutdown;
pub mod sysfs;

pub use channel::{read_irq_count, write_irq_control, IrqChannel, NotificationChannel, Wait};
pub use device::UioDevice;
pub use mmio::{map_offset, page_size, MmioRegion, RegisterBank};
pub use shutdown::ShutdownSignal;
pub use sysfs::{map_size_path, parse_region_size, resolve_region_size, DEFAULT_SYSFS_ROOT};

/// IRQ control value that unmasks the interrupt line
pub const IRQ_ENABLE: u32 = 1;

/// Error types for UIO operations
#[derive(Debug, Error)]
pub enum UioError {
    #[error("region size descriptor {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("cannot open UIO device {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot map {size:#x} bytes at offset {offset:#x}: {reason}")]
    Map {
        size: usize,
        offset: u64,
        reason: String,
    },

    #[error("short transfer on notification channel (expected {expected} bytes, got {actual})")]
    Channel { expected: usize, actual: usize },

    #[error("notification channel I/O failed: {0}")]
    ChannelIo(#[source] io::Error),

    #[error("shutdown signal setup failed: {0}")]
    Signal(#[source] io::Error),
}

pub type Result<T> = core::result::Result<T, UioError>;
