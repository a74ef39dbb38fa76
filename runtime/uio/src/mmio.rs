//! MMIO Mapping - Memory-mapped register regions
//!
//! This module maps a UIO map into the process address space and provides
//! the only path to the registers inside it. Every access is a single
//! volatile 32-bit load or store: it reaches the device exactly once, in
//! program order, and is never cached, merged or elided by the compiler.
//!
//! The mapping is owned by [`MmioRegion`]; dropping it unmaps the region.

use std::fs::File;
use std::ptr::{read_volatile, write_volatile};

use log::{debug, trace};
use memmap2::{MmapMut, MmapOptions};

use crate::{Result, UioError};

/// Width of a register access in bytes
const WORD: usize = core::mem::size_of::<u32>();

/// Runtime page size of the host
pub fn page_size() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}

/// Offset to pass to mmap(2) to select UIO map `map_index`
///
/// The UIO core encodes the map number in the page offset: map N lives at
/// `N * page_size`.
///
/// # Errors
/// Returns [`UioError::Map`] if the offset does not fit in the address space.
pub fn map_offset(map_index: usize) -> Result<u64> {
    map_index
        .checked_mul(page_size())
        .map(|offset| offset as u64)
        .ok_or_else(|| UioError::Map {
            size: 0,
            offset: map_index as u64,
            reason: format!("map index {map_index} is out of range"),
        })
}

/// 32-bit register access at byte offsets inside a region
///
/// Implemented by [`MmioRegion`] for real hardware; tests implement it with
/// recording backends.
pub trait RegisterBank {
    /// Read the 32-bit register at `offset`
    fn read32(&self, offset: usize) -> u32;

    /// Write `value` to the 32-bit register at `offset`
    fn write32(&mut self, offset: usize, value: u32);
}

/// An exclusively owned, shared-with-hardware memory mapping
pub struct MmioRegion {
    map: MmapMut,
    offset: u64,
}

impl MmioRegion {
    /// Map `size` bytes of `file` at `offset`, read/write and `MAP_SHARED`
    ///
    /// # Errors
    /// Returns [`UioError::Map`] if `size` is zero or not a multiple of the
    /// page size, if `offset` is not page aligned, or if mmap(2) refuses.
    pub fn map(file: &File, size: usize, offset: u64) -> Result<Self> {
        check_layout(size, offset)?;

        // SAFETY: the mapping is shared with a device, not with another
        // process' view of a regular file; we never hand out references into
        // it, only volatile word accesses.
        let map = unsafe { MmapOptions::new().offset(offset).len(size).map_mut(file) }.map_err(
            |e| UioError::Map {
                size,
                offset,
                reason: e.to_string(),
            },
        )?;

        debug!("Mapped {:#x} bytes at offset {:#x}", size, offset);
        Ok(Self { map, offset })
    }

    /// Anonymous, zero-filled region with the same invariants as [`map`](Self::map)
    ///
    /// Stands in for device memory when no hardware is present.
    pub fn anonymous(size: usize) -> Result<Self> {
        check_layout(size, 0)?;

        let map = MmapMut::map_anon(size).map_err(|e| UioError::Map {
            size,
            offset: 0,
            reason: e.to_string(),
        })?;

        Ok(Self { map, offset: 0 })
    }

    /// Length of the region in bytes
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Always false for a mapped region
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// File offset this region was mapped from
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Write `value` to every 32-bit word of the region
    pub fn fill32(&mut self, value: u32) {
        for offset in (0..self.words() * WORD).step_by(WORD) {
            self.write32(offset, value);
        }
    }

    /// Wrapping sum of every 32-bit word of the region
    pub fn sum32(&self) -> u32 {
        (0..self.words() * WORD)
            .step_by(WORD)
            .fold(0u32, |sum, offset| sum.wrapping_add(self.read32(offset)))
    }

    fn words(&self) -> usize {
        self.len() / WORD
    }

    fn check_access(&self, offset: usize) {
        assert!(
            offset % WORD == 0,
            "unaligned register offset {offset:#x}"
        );
        assert!(
            offset
                .checked_add(WORD)
                .is_some_and(|end| end <= self.len()),
            "register offset {offset:#x} outside region of {:#x} bytes",
            self.len()
        );
    }
}

impl RegisterBank for MmioRegion {
    #[inline]
    fn read32(&self, offset: usize) -> u32 {
        self.check_access(offset);
        // SAFETY: offset is in bounds and aligned, the mapping is page
        // aligned and lives as long as `self`.
        let value = unsafe { read_volatile(self.map.as_ptr().add(offset).cast::<u32>()) };
        trace!("read32({:#x}) = {:#x}", offset, value);
        value
    }

    #[inline]
    fn write32(&mut self, offset: usize, value: u32) {
        self.check_access(offset);
        trace!("write32({:#x}, {:#x})", offset, value);
        // SAFETY: as for `read32`; `&mut self` guarantees exclusive access.
        unsafe { write_volatile(self.map.as_mut_ptr().add(offset).cast::<u32>(), value) }
    }
}

impl core::fmt::Debug for MmioRegion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MmioRegion")
            .field("len", &self.len())
            .field("offset", &self.offset)
            .finish()
    }
}

fn check_layout(size: usize, offset: u64) -> Result<()> {
    let page = page_size();

    if size == 0 || size % page != 0 {
        return Err(UioError::Map {
            size,
            offset,
            reason: format!("size is not a positive multiple of the page size ({page:#x})"),
        });
    }

    if offset % page as u64 != 0 {
        return Err(UioError::Map {
            size,
            offset,
            reason: format!("offset is not page aligned ({page:#x})"),
        });
    }

    Ok(())
}
