//! Shutdown Signal - Cancellation for the blocking interrupt wait
//!
//! The interrupt wait has no timeout. To stop cleanly, termination signals
//! are blocked and routed to a `signalfd`, which is polled alongside the
//! device node; when it becomes readable the wait returns
//! [`Wait::Shutdown`](crate::Wait::Shutdown) instead of an interrupt.
//!
//! The signal mask is per thread: install the signal on the thread that
//! runs the loop, before spawning any other thread.

use std::io;
use std::mem;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::ptr;

use log::debug;

use crate::{Result, UioError};

/// Signals routed to the shutdown descriptor by [`ShutdownSignal::install`]
pub const DEFAULT_SIGNALS: [libc::c_int; 2] = [libc::SIGINT, libc::SIGTERM];

/// Readable descriptor that fires when a termination signal arrives
#[derive(Debug)]
pub struct ShutdownSignal {
    fd: OwnedFd,
}

impl ShutdownSignal {
    /// Route `SIGINT` and `SIGTERM` to a new shutdown descriptor
    pub fn install() -> Result<Self> {
        Self::for_signals(&DEFAULT_SIGNALS)
    }

    /// Route `signals` to a new shutdown descriptor
    ///
    /// The signals are blocked for the calling thread so that their default
    /// action no longer applies; they are only observable through this
    /// descriptor.
    pub fn for_signals(signals: &[libc::c_int]) -> Result<Self> {
        // SAFETY: sigset_t is plain data; it is initialised by sigemptyset
        // before any other use.
        let mut set: libc::sigset_t = unsafe { mem::zeroed() };

        // SAFETY: `set` is a valid, exclusively borrowed sigset_t.
        unsafe {
            libc::sigemptyset(&mut set);
            for &signal in signals {
                if libc::sigaddset(&mut set, signal) != 0 {
                    return Err(UioError::Signal(io::Error::last_os_error()));
                }
            }
        }

        // SAFETY: `set` is initialised; the old mask is not requested.
        let ret = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &set, ptr::null_mut()) };
        if ret != 0 {
            return Err(UioError::Signal(io::Error::from_raw_os_error(ret)));
        }

        // SAFETY: -1 asks for a new descriptor; `set` is initialised.
        let fd = unsafe { libc::signalfd(-1, &set, libc::SFD_CLOEXEC) };
        if fd < 0 {
            return Err(UioError::Signal(io::Error::last_os_error()));
        }

        debug!("Shutdown signals {:?} routed to fd {}", signals, fd);

        // SAFETY: signalfd returned a fresh descriptor that nothing else owns.
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    /// Consume one pending signal, returning its number
    ///
    /// Blocks if no signal is pending.
    pub fn consume(&self) -> Result<libc::c_int> {
        // SAFETY: signalfd_siginfo is plain data.
        let mut info: libc::signalfd_siginfo = unsafe { mem::zeroed() };
        let len = mem::size_of::<libc::signalfd_siginfo>();

        loop {
            // SAFETY: `info` is a writable buffer of `len` bytes.
            let n = unsafe {
                libc::read(
                    self.fd.as_raw_fd(),
                    (&mut info as *mut libc::signalfd_siginfo).cast(),
                    len,
                )
            };

            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(UioError::Signal(err));
            }

            if n as usize != len {
                return Err(UioError::Signal(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "short read on signalfd",
                )));
            }

            return Ok(info.ssi_signo as libc::c_int);
        }
    }
}

impl AsFd for ShutdownSignal {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

/// Which of the polled descriptors became ready first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ready {
    Device,
    Shutdown,
}

/// Block until `device` or `shutdown` is readable
///
/// A pending shutdown wins over a pending interrupt.
pub(crate) fn wait_readable(device: BorrowedFd<'_>, shutdown: BorrowedFd<'_>) -> io::Result<Ready> {
    let mut fds = [
        libc::pollfd {
            fd: device.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        },
        libc::pollfd {
            fd: shutdown.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        },
    ];

    loop {
        // SAFETY: `fds` is a valid array of two pollfd entries.
        let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };

        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }

        if fds[1].revents & libc::POLLIN != 0 {
            return Ok(Ready::Shutdown);
        }

        if fds[0].revents & (libc::POLLIN | libc::POLLERR | libc::POLLHUP) != 0 {
            return Ok(Ready::Device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raised_signal_is_consumed() {
        let signal = ShutdownSignal::for_signals(&[libc::SIGUSR1]).unwrap();

        // SAFETY: SIGUSR1 is blocked for this thread, so raising it only
        // makes it pending on the signalfd.
        assert_eq!(unsafe { libc::raise(libc::SIGUSR1) }, 0);

        assert_eq!(signal.consume().unwrap(), libc::SIGUSR1);
    }

    #[test]
    fn test_shutdown_wins_over_device() {
        let signal = ShutdownSignal::for_signals(&[libc::SIGUSR2]).unwrap();
        let device = tempfile::tempfile().unwrap();

        // SAFETY: see above.
        assert_eq!(unsafe { libc::raise(libc::SIGUSR2) }, 0);

        // Regular files always poll readable.
        let ready = wait_readable(device.as_fd(), signal.as_fd()).unwrap();
        assert_eq!(ready, Ready::Shutdown);
        assert_eq!(signal.consume().unwrap(), libc::SIGUSR2);
    }
}
