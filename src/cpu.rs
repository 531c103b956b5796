//! Core collaborators: event masking and peripheral start-up.
//!
//! Register level set-up lives with the board, the meter only sees these
//! traits.

/// Global event (interrupt) masking.
pub trait Interrupts {
    /// Stop the conversion-complete handler from running.
    fn suppress(&mut self);
    /// Allow the handler to run again.
    fn restore(&mut self);
}

/// Events suppressed for the lifetime of the guard.  Holding one is the
/// proof of exclusive access to the sample buffers.
pub struct Suppressed<'a, I: Interrupts + ?Sized> {
    irq: &'a mut I,
}

impl<'a, I: Interrupts + ?Sized> Suppressed<'a, I> {
    pub fn new(irq: &'a mut I) -> Self {
        irq.suppress();
        Suppressed{irq}
    }
}

impl<I: Interrupts + ?Sized> Drop for Suppressed<'_, I> {
    fn drop(&mut self) {
        self.irq.restore();
    }
}

/// Peripheral bring-up, called once from `Meter::start`.
pub trait Board {
    /// Configure and enable the serial transmitter.
    fn init_transmit(&mut self, baud: u32);
    /// Configure the ADC for triggered conversions, enable its completion
    /// event and start the first conversion.
    fn init_acquisition(&mut self);
}

/// PRIMASK based masking for Cortex-M parts.
#[cfg(target_arch = "arm")]
pub struct CortexM;

#[cfg(target_arch = "arm")]
impl Interrupts for CortexM {
    #[inline(always)]
    fn suppress(&mut self) {
        cortex_m::interrupt::disable();
    }
    #[inline(always)]
    fn restore(&mut self) {
        // SAFETY: not used inside a cortex_m::interrupt::free section.
        unsafe {cortex_m::interrupt::enable()};
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct MockIrq {
    pub suppressed: bool,
    pub suppress_count: u32,
    pub restore_count: u32,
}

#[cfg(test)]
impl Interrupts for MockIrq {
    fn suppress(&mut self) {
        self.suppressed = true;
        self.suppress_count += 1;
    }
    fn restore(&mut self) {
        self.suppressed = false;
        self.restore_count += 1;
    }
}

#[test]
fn guard_restores_on_drop() {
    let mut irq = MockIrq::default();
    {
        let _cs = Suppressed::new(&mut irq);
    }
    assert!(!irq.suppressed);
    assert_eq!((irq.suppress_count, irq.restore_count), (1, 1));
}

#[test]
fn guard_restores_on_early_return() {
    fn fails(irq: &mut MockIrq) -> Result<(), ()> {
        let _cs = Suppressed::new(irq);
        let r: Result<(), ()> = Err(());
        r?;
        Ok(())
    }
    let mut irq = MockIrq::default();
    assert!(fails(&mut irq).is_err());
    assert!(!irq.suppressed);
    assert_eq!(irq.restore_count, 1);
}
