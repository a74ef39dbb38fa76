//! UIO device handle
//!
//! `/dev/uioN` serves two roles: it is the notification channel for the
//! device's interrupt line, and mmap(2) on it exposes the device's maps.

use std::fs::{File, OpenOptions};
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::channel::{read_irq_count, write_irq_control, NotificationChannel, Wait};
use crate::mmio::{map_offset, MmioRegion};
use crate::shutdown::{wait_readable, Ready, ShutdownSignal};
use crate::sysfs::{map_size_path, resolve_region_size};
use crate::{Result, UioError, IRQ_ENABLE};

/// An open UIO device node
#[derive(Debug)]
pub struct UioDevice {
    file: File,
    path: PathBuf,
    shutdown: Option<ShutdownSignal>,
}

impl UioDevice {
    /// Open the device node at `path` for reading and writing
    ///
    /// # Errors
    /// Returns [`UioError::Open`] if the node cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| UioError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        info!("Opened UIO device {}", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
            shutdown: None,
        })
    }

    /// Make [`wait`](NotificationChannel::wait) return [`Wait::Shutdown`]
    /// once `signal` fires
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = Some(signal);
        self
    }

    /// Path the device was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Device name as used under `/sys/class/uio` (e.g. `uio0`)
    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
    }

    /// Map `size` bytes of map `map_index`
    pub fn map_region(&self, size: usize, map_index: usize) -> Result<MmioRegion> {
        MmioRegion::map(&self.file, size, map_offset(map_index)?)
    }

    /// Look up the size of map `map_index` under `sysfs_root`, then map it
    pub fn map(&self, sysfs_root: impl AsRef<Path>, map_index: usize) -> Result<MmioRegion> {
        let size = resolve_region_size(map_size_path(sysfs_root, self.name(), map_index))?;
        debug!("{} map{}: {:#x} bytes", self.name(), map_index, size);
        self.map_region(size, map_index)
    }
}

impl NotificationChannel for UioDevice {
    fn wait(&mut self) -> Result<Wait> {
        if let Some(signal) = &self.shutdown {
            let ready =
                wait_readable(self.file.as_fd(), signal.as_fd()).map_err(UioError::ChannelIo)?;

            if ready == Ready::Shutdown {
                let signo = signal.consume()?;
                info!("Received signal {}, shutting down", signo);
                return Ok(Wait::Shutdown);
            }
        }

        read_irq_count(&self.file).map(Wait::Interrupt)
    }

    fn reenable(&mut self) -> Result<()> {
        write_irq_control(&self.file, IRQ_ENABLE)
    }
}
