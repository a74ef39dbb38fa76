//! On-chip memory exported as the second UIO map of the GPIO node
//!
//! The OCM is plain RAM, not registers, but it is mapped as device memory
//! so it goes through the same volatile accessors.

use log::debug;
use uio_runtime::MmioRegion;

/// UIO map index of the OCM in the default device tree binding
pub const OCM_MAP: usize = 1;

pub struct Ocm {
    region: MmioRegion,
}

impl Ocm {
    /// Take ownership of `region` and zero it
    pub fn new(mut region: MmioRegion) -> Self {
        region.fill32(0);
        debug!("OCM cleared ({:#x} bytes)", region.len());
        Self { region }
    }

    /// Wrapping sum of every word
    pub fn sum(&self) -> u32 {
        self.region.sum32()
    }

    pub fn region_mut(&mut self) -> &mut MmioRegion {
        &mut self.region
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uio_runtime::{page_size, RegisterBank};

    #[test]
    fn test_new_clears_memory() {
        let mut region = MmioRegion::anonymous(page_size()).unwrap();
        region.fill32(0xFFFF_FFFF);

        let ocm = Ocm::new(region);
        assert_eq!(ocm.sum(), 0);
    }

    #[test]
    fn test_sum_tracks_writes() {
        let mut ocm = Ocm::new(MmioRegion::anonymous(page_size()).unwrap());
        ocm.region_mut().write32(0, 40);
        ocm.region_mut().write32(page_size() - 4, 2);
        assert_eq!(ocm.sum(), 42);
    }
}
