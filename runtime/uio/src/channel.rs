//! Interrupt notification channel
//!
//! A UIO device node is a byte channel with fixed 4-byte framing:
//! - read: blocks until the line fires, then yields the interrupt count
//! - write: IRQ control, 1 unmasks the line
//!
//! Both transfers are native-endian `u32`s. A transfer of any other length
//! breaks the channel contract and is reported as [`UioError::Channel`].

use std::io::{self, Read, Write};

use log::trace;

use crate::{Result, UioError, IRQ_ENABLE};

/// Size of one channel transfer
pub const FRAME_SIZE: usize = core::mem::size_of::<u32>();

/// Outcome of a blocking wait on the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// The line fired; carries the count reported by the kernel
    Interrupt(u32),

    /// A shutdown was requested while waiting
    Shutdown,
}

/// Blocking interrupt source with a re-arm handshake
pub trait NotificationChannel {
    /// Block until an interrupt is pending (or shutdown is requested)
    fn wait(&mut self) -> Result<Wait>;

    /// Ask the kernel-side multiplexer to unmask the line again
    fn reenable(&mut self) -> Result<()>;
}

/// Read one interrupt count from `reader`
///
/// Exactly one successful read(2) is issued; `EINTR` is retried.
pub fn read_irq_count<R: Read>(mut reader: R) -> Result<u32> {
    let mut frame = [0u8; FRAME_SIZE];

    let n = loop {
        match reader.read(&mut frame) {
            Ok(n) => break n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(UioError::ChannelIo(e)),
        }
    };

    if n != FRAME_SIZE {
        return Err(UioError::Channel {
            expected: FRAME_SIZE,
            actual: n,
        });
    }

    let count = u32::from_ne_bytes(frame);
    trace!("irq count {}", count);
    Ok(count)
}

/// Write one IRQ control word to `writer`
pub fn write_irq_control<W: Write>(mut writer: W, value: u32) -> Result<()> {
    let frame = value.to_ne_bytes();

    let n = loop {
        match writer.write(&frame) {
            Ok(n) => break n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(UioError::ChannelIo(e)),
        }
    };

    if n != FRAME_SIZE {
        return Err(UioError::Channel {
            expected: FRAME_SIZE,
            actual: n,
        });
    }

    trace!("irq control {}", value);
    Ok(())
}

/// Notification channel over any byte stream
///
/// Used to drive the handshake from something other than a device node,
/// e.g. a pipe or an in-memory buffer.
pub struct IrqChannel<T> {
    inner: T,
}

impl<T> IrqChannel<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read + Write> NotificationChannel for IrqChannel<T> {
    fn wait(&mut self) -> Result<Wait> {
        read_irq_count(&mut self.inner).map(Wait::Interrupt)
    }

    fn reenable(&mut self) -> Result<()> {
        write_irq_control(&mut self.inner, IRQ_ENABLE)
    }
}
