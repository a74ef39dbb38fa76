//! Interrupt handshake loop
//!
//! Each cycle:
//! 1. **Waiting**: block on the notification channel for an interrupt count
//! 2. **Handling**: acknowledge the GPIO (IRQ_STATUS), read DATA2, sum OCM,
//!    report the event
//! 3. Re-enable the line through the channel, back to **Waiting**
//!
//! The acknowledge always precedes the re-enable. Re-enabling first lets the
//! still-pending status re-trigger immediately; never re-enabling starves
//! the line for good.

use core::fmt;

use log::{debug, trace};
use uio_runtime::{NotificationChannel, RegisterBank, Result, Wait};

use crate::axi_gpio::{AxiGpio, IrqChannels};
use crate::ocm::Ocm;

/// Which IRQ_STATUS bits to clear once the block reports a pending interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPolicy {
    /// Always clear these channels, whatever the status says
    Fixed(IrqChannels),

    /// Clear exactly the bits IRQ_STATUS reports
    Pending,
}

impl AckPolicy {
    fn mask(&self, status: u32) -> IrqChannels {
        match self {
            AckPolicy::Fixed(channels) => *channels,
            AckPolicy::Pending => IrqChannels::from_bits_retain(status),
        }
    }
}

impl Default for AckPolicy {
    /// Buttons on channel 2 are the only interrupt source
    fn default() -> Self {
        AckPolicy::Fixed(IrqChannels::CHANNEL_2)
    }
}

/// Loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Waiting,
    Handling,
}

/// What one handled interrupt observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptEvent {
    /// Count reported by the notification channel
    pub count: u32,
    /// IRQ_STATUS as read before acknowledging
    pub status: u32,
    /// Bits written back to IRQ_STATUS, if any
    pub cleared: Option<IrqChannels>,
    /// Channel 2 data
    pub data2: u32,
    /// Sum of the OCM words, when an OCM is attached
    pub ocm_sum: Option<u32>,
}

impl fmt::Display for InterruptEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPIO_DATA2_OFFSET: {:#x}", self.data2)?;
        if let Some(sum) = self.ocm_sum {
            write!(f, "\nsum = {sum}")?;
        }
        Ok(())
    }
}

/// Waits for, acknowledges and re-arms GPIO interrupts
pub struct HandshakeLoop<B, C> {
    gpio: AxiGpio<B>,
    channel: C,
    ocm: Option<Ocm>,
    policy: AckPolicy,
    state: State,
    handled: u64,
}

impl<B: RegisterBank, C: NotificationChannel> HandshakeLoop<B, C> {
    pub fn new(gpio: AxiGpio<B>, channel: C) -> Self {
        Self {
            gpio,
            channel,
            ocm: None,
            policy: AckPolicy::default(),
            state: State::Waiting,
            handled: 0,
        }
    }

    pub fn with_policy(mut self, policy: AckPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_ocm(mut self, ocm: Option<Ocm>) -> Self {
        self.ocm = ocm;
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Interrupts handled so far
    pub fn handled(&self) -> u64 {
        self.handled
    }

    pub fn gpio(&self) -> &AxiGpio<B> {
        &self.gpio
    }

    /// Unmask the line once before the first wait
    ///
    /// Recovers a line left masked by a previous run that died between an
    /// interrupt and its re-enable. Unmasking an unmasked line is a no-op.
    pub fn arm(&mut self) -> Result<()> {
        self.channel.reenable()
    }

    /// Run one Waiting -> Handling -> Waiting cycle
    ///
    /// Returns `None` if shutdown was requested while waiting.
    pub fn step(&mut self) -> Result<Option<InterruptEvent>> {
        self.cycle(&mut |_: &InterruptEvent| {})
    }

    /// Handle interrupts until shutdown, passing each one to `on_event`
    ///
    /// `on_event` runs after the acknowledge and before the re-enable. Any
    /// error ends the loop; returns the number of interrupts handled.
    pub fn run<F: FnMut(&InterruptEvent)>(&mut self, mut on_event: F) -> Result<u64> {
        while self.cycle(&mut on_event)?.is_some() {}
        Ok(self.handled)
    }

    /// Stop the GPIO block from raising further interrupts
    pub fn quiesce(&mut self) {
        self.gpio.disable_interrupts();
    }

    pub fn into_parts(self) -> (AxiGpio<B>, C) {
        (self.gpio, self.channel)
    }

    fn cycle<F: FnMut(&InterruptEvent)>(
        &mut self,
        on_event: &mut F,
    ) -> Result<Option<InterruptEvent>> {
        let count = match self.channel.wait()? {
            Wait::Interrupt(count) => count,
            Wait::Shutdown => return Ok(None),
        };

        self.state = State::Handling;
        let event = self.handle(count);
        debug!("{:?}", event);
        on_event(&event);

        self.channel.reenable()?;
        self.state = State::Waiting;
        self.handled += 1;

        Ok(Some(event))
    }

    fn handle(&mut self, count: u32) -> InterruptEvent {
        let status = self.gpio.irq_status();

        let cleared = if status != 0 {
            let mask = self.policy.mask(status);
            self.gpio.clear_irq(mask);
            Some(mask)
        } else {
            trace!("IRQ_STATUS already clear");
            None
        };

        let data2 = self.gpio.data2();
        let ocm_sum = self.ocm.as_ref().map(Ocm::sum);

        InterruptEvent {
            count,
            status,
            cleared,
            data2,
            ocm_sum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axi_gpio::{GPIO_DATA2, GPIO_IRQ_STATUS};
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};
    use std::rc::Rc;
    use uio_runtime::UioError;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Op {
        Write(usize, u32),
        Wait,
        Report(u32),
        Reenable,
    }

    type Log = Rc<RefCell<Vec<Op>>>;

    struct Regs {
        values: HashMap<usize, u32>,
        log: Log,
    }

    impl RegisterBank for Regs {
        fn read32(&self, offset: usize) -> u32 {
            self.values.get(&offset).copied().unwrap_or(0)
        }

        fn write32(&mut self, offset: usize, value: u32) {
            self.log.borrow_mut().push(Op::Write(offset, value));
            // Write-1-to-clear
            if offset == GPIO_IRQ_STATUS {
                *self.values.entry(offset).or_default() &= !value;
            } else {
                self.values.insert(offset, value);
            }
        }
    }

    struct Channel {
        waits: VecDeque<Result<Wait>>,
        reenable_fails: bool,
        log: Log,
    }

    impl NotificationChannel for Channel {
        fn wait(&mut self) -> Result<Wait> {
            self.log.borrow_mut().push(Op::Wait);
            self.waits.pop_front().unwrap_or(Ok(Wait::Shutdown))
        }

        fn reenable(&mut self) -> Result<()> {
            self.log.borrow_mut().push(Op::Reenable);
            if self.reenable_fails {
                return Err(UioError::Channel {
                    expected: 4,
                    actual: 0,
                });
            }
            Ok(())
        }
    }

    fn harness(
        status: u32,
        data2: u32,
        waits: Vec<Result<Wait>>,
    ) -> (HandshakeLoop<Regs, Channel>, Log) {
        let log = Log::default();
        let regs = Regs {
            values: HashMap::from([(GPIO_IRQ_STATUS, status), (GPIO_DATA2, data2)]),
            log: log.clone(),
        };
        let channel = Channel {
            waits: waits.into(),
            reenable_fails: false,
            log: log.clone(),
        };
        (HandshakeLoop::new(AxiGpio::new(regs), channel), log)
    }

    #[test]
    fn test_ack_precedes_reenable() {
        let (mut lp, log) = harness(0x2, 0x5, vec![Ok(Wait::Interrupt(1))]);

        let event = lp.step().unwrap().unwrap();
        assert_eq!(event.cleared, Some(IrqChannels::CHANNEL_2));
        assert_eq!(event.data2, 0x5);
        assert_eq!(
            *log.borrow(),
            vec![Op::Wait, Op::Write(GPIO_IRQ_STATUS, 2), Op::Reenable]
        );
    }

    #[test]
    fn test_clear_status_skips_ack() {
        let (mut lp, log) = harness(0, 0, vec![Ok(Wait::Interrupt(1))]);

        let event = lp.step().unwrap().unwrap();
        assert_eq!(event.cleared, None);
        assert_eq!(*log.borrow(), vec![Op::Wait, Op::Reenable]);
    }

    #[test]
    fn test_fixed_policy_ignores_status_bits() {
        let (mut lp, log) = harness(0x1, 0, vec![Ok(Wait::Interrupt(1))]);

        lp.step().unwrap();
        assert!(log.borrow().contains(&Op::Write(GPIO_IRQ_STATUS, 2)));
    }

    #[test]
    fn test_pending_policy_clears_reported_bits() {
        let (lp, log) = harness(0x3, 0, vec![Ok(Wait::Interrupt(1))]);
        let mut lp = lp.with_policy(AckPolicy::Pending);

        let event = lp.step().unwrap().unwrap();
        assert_eq!(event.cleared, Some(IrqChannels::all()));
        assert!(log.borrow().contains(&Op::Write(GPIO_IRQ_STATUS, 3)));
        assert_eq!(lp.gpio().irq_status(), 0);
    }

    #[test]
    fn test_shutdown_returns_none() {
        let (mut lp, log) = harness(0x2, 0, vec![Ok(Wait::Shutdown)]);

        assert_eq!(lp.step().unwrap(), None);
        assert_eq!(lp.state(), State::Waiting);
        assert_eq!(*log.borrow(), vec![Op::Wait]);
    }

    #[test]
    fn test_channel_error_is_fatal() {
        let (mut lp, log) = harness(
            0x2,
            0,
            vec![Err(UioError::Channel {
                expected: 4,
                actual: 2,
            })],
        );

        assert!(matches!(lp.run(|_| {}), Err(UioError::Channel { .. })));
        assert_eq!(lp.handled(), 0);
        assert_eq!(*log.borrow(), vec![Op::Wait]);
    }

    #[test]
    fn test_run_until_shutdown() {
        let (mut lp, log) = harness(
            0x2,
            0x9,
            vec![Ok(Wait::Interrupt(1)), Ok(Wait::Interrupt(2))],
        );

        let mut seen = Vec::new();
        let handled = lp.run(|event| seen.push(event.count)).unwrap();

        assert_eq!(handled, 2);
        assert_eq!(seen, vec![1, 2]);

        // The first ack cleared the status, so the second cycle skips it.
        assert_eq!(
            *log.borrow(),
            vec![
                Op::Wait,
                Op::Write(GPIO_IRQ_STATUS, 2),
                Op::Reenable,
                Op::Wait,
                Op::Reenable,
                Op::Wait,
            ]
        );
    }

    #[test]
    fn test_report_precedes_reenable() {
        let (mut lp, log) = harness(0x2, 0xC, vec![Ok(Wait::Interrupt(1))]);

        let report_log = log.clone();
        lp.run(|event| report_log.borrow_mut().push(Op::Report(event.data2)))
            .unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                Op::Wait,
                Op::Write(GPIO_IRQ_STATUS, 2),
                Op::Report(0xC),
                Op::Reenable,
                Op::Wait,
            ]
        );
    }

    #[test]
    fn test_failed_reenable_still_reports() {
        let (mut lp, log) = harness(0x2, 0xC, vec![Ok(Wait::Interrupt(1))]);
        lp.channel.reenable_fails = true;

        let report_log = log.clone();
        let result = lp.run(|event| report_log.borrow_mut().push(Op::Report(event.data2)));

        assert!(matches!(result, Err(UioError::Channel { .. })));
        assert_eq!(lp.handled(), 0);
        assert_eq!(lp.state(), State::Handling);
        assert_eq!(
            *log.borrow(),
            vec![
                Op::Wait,
                Op::Write(GPIO_IRQ_STATUS, 2),
                Op::Report(0xC),
                Op::Reenable,
            ]
        );
    }

    #[test]
    fn test_event_display() {
        let event = InterruptEvent {
            count: 1,
            status: 2,
            cleared: Some(IrqChannels::CHANNEL_2),
            data2: 0x4,
            ocm_sum: None,
        };
        assert_eq!(event.to_string(), "GPIO_DATA2_OFFSET: 0x4");

        let event = InterruptEvent {
            ocm_sum: Some(0),
            ..event
        };
        assert_eq!(event.to_string(), "GPIO_DATA2_OFFSET: 0x4\nsum = 0");
    }
}
