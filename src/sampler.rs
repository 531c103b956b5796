//! Sample buffer manager.
//!
//! Written only by the conversion-complete handler, read only by the
//! foreground loop while it holds events suppressed.  Voltage and current
//! are converted alternately, so when the current cursor wraps both
//! buffers hold an aligned batch: voltage[i] and current[i] are adjacent
//! readings.

use crate::adc::{Adc, Channel};
use crate::cpu::{Interrupts, Suppressed};
use crate::vcell::VCell;

/// A completed batch, copied out of the sampler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Batch<const N: usize> {
    pub voltage: [u16; N],
    pub current: [u16; N],
}

pub struct Sampler<const N: usize> {
    voltage: [VCell<u16>; N],
    current: [VCell<u16>; N],
    v_index: VCell<usize>,
    i_index: VCell<usize>,
    ready: VCell<bool>,
}

impl<const N: usize> Default for Sampler<N> {
    fn default() -> Self {Self::new()}
}

impl<const N: usize> Sampler<N> {
    pub const fn new() -> Self {
        const {assert!(N >= 1)};
        Sampler{
            voltage: [const {VCell::new(0)}; N],
            current: [const {VCell::new(0)}; N],
            v_index: VCell::new(0),
            i_index: VCell::new(0),
            ready: VCell::new(false),
        }
    }

    /// Store the conversion that just completed and switch inputs.  Must
    /// run with events suppressed, see `conversion_isr`.
    pub fn on_conversion<A: Adc + ?Sized>(&self, adc: &mut A) {
        let Some(channel) = Channel::from_mux(adc.mux()) else {
            crate::dbgln!("ADC unexpected mux {}", adc.mux());
            adc.set_mux(Channel::Voltage.mux());
            return;
        };
        let value = adc.result();
        match channel {
            Channel::Voltage => {
                let i = self.v_index.read();
                self.voltage[i].write(value);
                self.v_index.write(if i + 1 >= N {0} else {i + 1});
            }
            Channel::Current => {
                let i = self.i_index.read();
                self.current[i].write(value);
                if i + 1 >= N {
                    self.i_index.write(0);
                    self.ready.write(true);
                }
                else {
                    self.i_index.write(i + 1);
                }
            }
        }
        adc.set_mux(channel.other().mux());
    }

    pub fn is_ready(&self) -> bool {self.ready.read()}

    /// Copy out the completed batch, if any.  The guard proves the handler
    /// cannot run while we read.
    pub fn take<I: Interrupts + ?Sized>(&self, _cs: &Suppressed<'_, I>)
                                        -> Option<Batch<N>> {
        if !self.ready.read() {
            return None;
        }
        Some(Batch{
            voltage: core::array::from_fn(|i| self.voltage[i].read()),
            current: core::array::from_fn(|i| self.current[i].read()),
        })
    }

    /// Re-arm for the next batch.  Call before dropping the guard.
    pub fn release<I: Interrupts + ?Sized>(&self, _cs: &Suppressed<'_, I>) {
        self.ready.write(false);
    }

    pub fn cursors(&self) -> (usize, usize) {
        (self.v_index.read(), self.i_index.read())
    }
}

/// Body of the conversion-complete interrupt.  The handler masks events
/// while it updates the cursors, then starts the next conversion on the
/// newly selected input.
pub fn conversion_isr<const N: usize, A, I>(
    sampler: &Sampler<N>, adc: &mut A, irq: &mut I)
where A: Adc + ?Sized, I: Interrupts + ?Sized {
    {
        let _cs = Suppressed::new(irq);
        sampler.on_conversion(adc);
    }
    adc.start();
}

#[cfg(test)]
use crate::adc::{MockAdc, VOLTAGE_MUX, CURRENT_MUX};
#[cfg(test)]
use crate::cpu::MockIrq;

#[cfg(test)]
fn run(sampler: &Sampler<4>, adc: &mut MockAdc, irq: &mut MockIrq,
       events: usize) {
    for _ in 0..events {
        conversion_isr(sampler, adc, irq);
    }
}

#[test]
fn alternates_inputs() {
    let sampler = Sampler::<4>::new();
    let mut adc = MockAdc::new(&[], &[]);
    let mut irq = MockIrq::default();
    run(&sampler, &mut adc, &mut irq, 11);
    // The first conversion was started on voltage by the board.
    for (k, &mux) in adc.history.iter().enumerate() {
        let expect = if k % 2 == 0 {VOLTAGE_MUX} else {CURRENT_MUX};
        assert_eq!(mux, expect, "conversion {k}");
    }
    assert_eq!(adc.history.len(), 12);
    assert_eq!(irq.suppress_count, 11);
    assert_eq!(irq.restore_count, 11);
    assert!(!irq.suppressed);
}

#[test]
fn ready_after_full_batch() {
    let sampler = Sampler::<4>::new();
    let mut adc = MockAdc::new(&[200, 400, 600, 800], &[100, 200, 300, 400]);
    let mut irq = MockIrq::default();
    // Seven events: four voltage, three current.
    run(&sampler, &mut adc, &mut irq, 7);
    assert!(!sampler.is_ready());
    assert_eq!(sampler.cursors(), (0, 3));
    run(&sampler, &mut adc, &mut irq, 1);
    assert!(sampler.is_ready());
    assert_eq!(sampler.cursors(), (0, 0));

    let cs = Suppressed::new(&mut irq);
    let batch = sampler.take(&cs).unwrap();
    assert_eq!(batch.voltage, [200, 400, 600, 800]);
    assert_eq!(batch.current, [100, 200, 300, 400]);
    sampler.release(&cs);
    drop(cs);
    assert!(!sampler.is_ready());
}

#[test]
fn ready_iff_both_cursors_advanced_n_times() {
    let sampler = Sampler::<4>::new();
    let mut adc = MockAdc::new(&[], &[]);
    let mut irq = MockIrq::default();
    for event in 1 ..= 40 {
        run(&sampler, &mut adc, &mut irq, 1);
        let expect = event % 8 == 0;
        assert_eq!(sampler.is_ready(), expect, "event {event}");
        if sampler.is_ready() {
            let cs = Suppressed::new(&mut irq);
            sampler.release(&cs);
        }
    }
}

#[test]
fn take_without_ready_is_none() {
    let sampler = Sampler::<4>::new();
    let mut irq = MockIrq::default();
    let cs = Suppressed::new(&mut irq);
    assert_eq!(sampler.take(&cs), None);
}

#[test]
fn overrun_overwrites_silently() {
    let sampler = Sampler::<2>::new();
    let mut adc = MockAdc::new(&[1, 2, 3, 4], &[5, 6, 7, 8]);
    let mut irq = MockIrq::default();
    for _ in 0..8 {
        conversion_isr(&sampler, &mut adc, &mut irq);
    }
    assert!(sampler.is_ready());
    let cs = Suppressed::new(&mut irq);
    let batch = sampler.take(&cs).unwrap();
    assert_eq!(batch.voltage, [3, 4]);
    assert_eq!(batch.current, [7, 8]);
}

#[test]
fn unknown_mux_reselects_voltage() {
    let sampler = Sampler::<4>::new();
    let mut adc = MockAdc::new(&[9], &[]);
    adc.mux = 3;
    sampler.on_conversion(&mut adc);
    assert_eq!(adc.mux, VOLTAGE_MUX);
    assert_eq!(sampler.cursors(), (0, 0));
    assert!(!sampler.is_ready());
}

#[test]
fn single_sample_batch() {
    let sampler = Sampler::<1>::new();
    let mut adc = MockAdc::new(&[10, 11], &[20, 21]);
    let mut irq = MockIrq::default();
    conversion_isr(&sampler, &mut adc, &mut irq);
    assert!(!sampler.is_ready());
    conversion_isr(&sampler, &mut adc, &mut irq);
    assert!(sampler.is_ready());
    let cs = Suppressed::new(&mut irq);
    assert_eq!(sampler.take(&cs), Some(Batch{voltage: [10], current: [20]}));
}
