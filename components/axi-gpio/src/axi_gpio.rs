//! Xilinx AXI GPIO Hardware Interface
//!
//! Register-level access to the dual-channel AXI GPIO block (PG144) as
//! mapped through UIO. Channel 1 drives the LEDs, channel 2 reads the push
//! buttons and raises the interrupt.

use bitflags::bitflags;
use log::{debug, trace};
use static_assertions::const_assert;
use uio_runtime::RegisterBank;

/// AXI GPIO register offsets
pub const GPIO_DATA: usize = 0x000; // Channel 1 data
pub const GPIO_TRI: usize = 0x004; // Channel 1 direction (1 = input)
pub const GPIO_DATA2: usize = 0x008; // Channel 2 data
pub const GPIO_TRI2: usize = 0x00C; // Channel 2 direction
pub const GPIO_GLOBAL_IRQ: usize = 0x11C; // Global interrupt enable
pub const GPIO_IRQ_STATUS: usize = 0x120; // Per-channel pending, write 1 to clear
pub const GPIO_IRQ_CONTROL: usize = 0x128; // Per-channel interrupt enable

/// Global interrupt enable bit of GPIO_GLOBAL_IRQ
pub const GLOBAL_IRQ_ENABLE: u32 = 1 << 31;

/// Bytes of register space the block decodes
pub const REGISTER_SPAN: usize = GPIO_IRQ_CONTROL + 4;

const_assert!(GPIO_DATA % 4 == 0);
const_assert!(GPIO_TRI % 4 == 0);
const_assert!(GPIO_DATA2 % 4 == 0);
const_assert!(GPIO_TRI2 % 4 == 0);
const_assert!(GPIO_GLOBAL_IRQ % 4 == 0);
const_assert!(GPIO_IRQ_STATUS % 4 == 0);
const_assert!(GPIO_IRQ_CONTROL % 4 == 0);

bitflags! {
    /// Channel bits of GPIO_IRQ_CONTROL and GPIO_IRQ_STATUS
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqChannels: u32 {
        const CHANNEL_1 = 1 << 0;
        const CHANNEL_2 = 1 << 1;
    }
}

/// One-time configuration written before interrupts are awaited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioSetup {
    /// Channel 1 direction bits
    pub tri: u32,
    /// Channel 2 direction bits
    pub tri2: u32,
    /// Channels allowed to raise the interrupt
    pub irq_channels: IrqChannels,
}

impl Default for GpioSetup {
    /// LEDs on channel 1 as outputs, four buttons on channel 2 as inputs
    /// interrupting through channel 2
    fn default() -> Self {
        Self {
            tri: 0x0,
            tri2: 0xF,
            irq_channels: IrqChannels::CHANNEL_2,
        }
    }
}

/// AXI GPIO driver over any register bank
pub struct AxiGpio<B> {
    regs: B,
}

impl<B: RegisterBank> AxiGpio<B> {
    pub fn new(regs: B) -> Self {
        Self { regs }
    }

    /// Program directions, then enable interrupts
    ///
    /// Order: TRI, TRI2, GLOBAL_IRQ, IRQ_CONTROL.
    pub fn configure(&mut self, setup: &GpioSetup) {
        self.regs.write32(GPIO_TRI, setup.tri);
        self.regs.write32(GPIO_TRI2, setup.tri2);

        self.regs.write32(GPIO_GLOBAL_IRQ, GLOBAL_IRQ_ENABLE);
        self.regs.write32(GPIO_IRQ_CONTROL, setup.irq_channels.bits());

        debug!(
            "AXI GPIO configured: tri={:#x} tri2={:#x} irq={:?}",
            setup.tri, setup.tri2, setup.irq_channels
        );
    }

    /// Raw GPIO_IRQ_STATUS
    pub fn irq_status(&self) -> u32 {
        self.regs.read32(GPIO_IRQ_STATUS)
    }

    /// Clear the channels in `mask` (status bits are write-1-to-clear)
    pub fn clear_irq(&mut self, mask: IrqChannels) {
        trace!("Clearing IRQ status {:#x}", mask.bits());
        self.regs.write32(GPIO_IRQ_STATUS, mask.bits());
    }

    /// Channel 1 data
    pub fn data(&self) -> u32 {
        self.regs.read32(GPIO_DATA)
    }

    /// Drive channel 1 outputs
    pub fn set_data(&mut self, value: u32) {
        self.regs.write32(GPIO_DATA, value);
    }

    /// Channel 2 data
    pub fn data2(&self) -> u32 {
        self.regs.read32(GPIO_DATA2)
    }

    /// Stop the block from raising interrupts
    pub fn disable_interrupts(&mut self) {
        self.regs.write32(GPIO_IRQ_CONTROL, 0);
        self.regs.write32(GPIO_GLOBAL_IRQ, 0);
        debug!("AXI GPIO interrupts disabled");
    }

    pub fn registers(&self) -> &B {
        &self.regs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uio_runtime::{page_size, MmioRegion};

    fn gpio() -> AxiGpio<MmioRegion> {
        AxiGpio::new(MmioRegion::anonymous(page_size()).unwrap())
    }

    #[test]
    fn test_register_span_fits_a_page() {
        assert!(REGISTER_SPAN <= page_size());
    }

    #[test]
    fn test_configure_defaults() {
        let mut gpio = gpio();
        gpio.configure(&GpioSetup::default());

        let regs = gpio.registers();
        assert_eq!(regs.read32(GPIO_TRI), 0x0);
        assert_eq!(regs.read32(GPIO_TRI2), 0xF);
        assert_eq!(regs.read32(GPIO_GLOBAL_IRQ), 0x8000_0000);
        assert_eq!(regs.read32(GPIO_IRQ_CONTROL), 2);
    }

    #[test]
    fn test_data_registers() {
        let mut gpio = gpio();
        gpio.set_data(0x55);
        assert_eq!(gpio.data(), 0x55);
        assert_eq!(gpio.data2(), 0);
    }

    #[test]
    fn test_disable_interrupts() {
        let mut gpio = gpio();
        gpio.configure(&GpioSetup::default());
        gpio.disable_interrupts();

        assert_eq!(gpio.registers().read32(GPIO_GLOBAL_IRQ), 0);
        assert_eq!(gpio.registers().read32(GPIO_IRQ_CONTROL), 0);
    }

    #[test]
    fn test_irq_channel_bits() {
        assert_eq!(IrqChannels::CHANNEL_2.bits(), 2);
        assert_eq!(IrqChannels::all().bits(), 3);
        assert_eq!(
            IrqChannels::from_bits_truncate(0xFFFF_FFFE),
            IrqChannels::CHANNEL_2
        );
    }
}
