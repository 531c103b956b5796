//! Foreground loop.
//!
//! Waits for a completed batch, then with the conversion handler
//! suppressed for the whole consume phase: copy the batch, refine both
//! channels, compute the metrics, send V, I and P to the display, pace the
//! display, and re-arm the sampler.  Conversions that would have landed in
//! that window are simply not taken.

use embedded_hal::delay::DelayNs;
use embedded_hal_nb::serial;

use crate::calibrate::{self, Calibration};
use crate::cpu::{Board, Interrupts, Suppressed};
use crate::frame::{transmit, Parameter};
use crate::metrics::Metrics;
use crate::sampler::{Batch, Sampler};
use crate::waveform::{refine, Refined};
use crate::{dbgln, CPU_CLK, N_SAMPLES};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    /// Display link bit rate.
    pub baud: u32,
    /// Hold-off after each update so the display keeps up.
    pub pace_ms: u32,
    pub voltage: Calibration,
    pub current: Calibration,
}

impl Config {
    pub const fn new() -> Config {
        Config{
            baud: 9600,
            pace_ms: 500,
            voltage: calibrate::VOLTAGE,
            current: calibrate::CURRENT,
        }
    }
    pub const fn baud(&mut self, baud: u32) -> &mut Self {
        self.baud = baud;
        self
    }
    pub const fn pace(&mut self, ms: u32) -> &mut Self {
        self.pace_ms = ms;
        self
    }
    pub const fn calibrate(&mut self, voltage: Calibration,
                           current: Calibration) -> &mut Self {
        self.voltage = voltage;
        self.current = current;
        self
    }
    /// USART baud rate register value for normal speed mode.
    pub const fn ubrr(&self) -> u16 {
        (CPU_CLK / 16 / self.baud - 1) as u16
    }
}

impl Default for Config {
    fn default() -> Self {Self::new()}
}

pub struct Meter<W, D, I> {
    tx: W,
    delay: D,
    irq: I,
    config: Config,
    batches: u32,
}

/// Send one batch worth of readings in display order.
pub fn send<W>(tx: &mut W, m: &Metrics) -> Result<(), W::Error>
where W: serial::Write<u8> + ?Sized {
    transmit(tx, Parameter::Voltage, m.rms_voltage)?;
    transmit(tx, Parameter::Current, m.peak_current)?;
    transmit(tx, Parameter::Power, m.power)?;
    Ok(())
}

/// Refine both channels, compute and send.
pub fn process<W, const N: usize>(tx: &mut W, config: &Config,
                                  batch: &Batch<N>) -> Result<Metrics, W::Error>
where W: serial::Write<u8> + ?Sized {
    let v: Refined = refine(&batch.voltage, &config.voltage);
    let i: Refined = refine(&batch.current, &config.current);
    let m = Metrics::compute(&v, &i);
    send(tx, &m)?;
    Ok(m)
}

impl<W, D, I> Meter<W, D, I>
where W: serial::Write<u8>, D: DelayNs, I: Interrupts {
    pub fn new(tx: W, delay: D, irq: I, config: Config) -> Self {
        Meter{tx, delay, irq, config, batches: 0}
    }

    /// Bring up the display link and the ADC, then let conversions run.
    /// Events stay suppressed until both are up, so the first conversion
    /// is never handled against an idle link.
    pub fn start<B: Board + ?Sized>(&mut self, board: &mut B) {
        dbgln!("Meter start: {} samples/batch, {} baud (UBRR {})",
               N_SAMPLES, self.config.baud, self.config.ubrr());
        board.init_transmit(self.config.baud);
        board.init_acquisition();
        self.irq.restore();
    }

    /// Consume a completed batch if there is one.  The handler stays
    /// suppressed until the readings are sent and the display paced, and
    /// the sampler is re-armed even if the transmit fails.
    pub fn poll<const N: usize>(&mut self, sampler: &Sampler<N>)
                                -> Result<Option<Metrics>, W::Error> {
        const {assert!(N <= N_SAMPLES)};
        if !sampler.is_ready() {
            return Ok(None);
        }
        let Meter{tx, delay, irq, config, batches} = self;
        let cs = Suppressed::new(irq);
        let Some(batch) = sampler.take(&cs) else {return Ok(None)};
        let result = process(tx, config, &batch);
        delay.delay_ms(config.pace_ms);
        sampler.release(&cs);
        drop(cs);
        let m = result?;
        *batches = batches.wrapping_add(1);
        Ok(Some(m))
    }

    /// One pass of the foreground loop.  Transmit errors are logged and
    /// dropped; there is nobody to report them to.
    pub fn step<const N: usize>(&mut self, sampler: &Sampler<N>)
                                -> Option<Metrics> {
        match self.poll(sampler) {
            Ok(Some(m)) => {
                dbgln!("Batch {}: {:.3}V rms {:.3}A peak {:.3}W",
                       self.batches, m.rms_voltage, m.peak_current, m.power);
                Some(m)
            }
            Ok(None) => None,
            Err(e) => {
                dbgln!("Transmit error {e:?}");
                None
            }
        }
    }

    pub fn run<const N: usize>(&mut self, sampler: &Sampler<N>) -> ! {
        loop {
            self.step(sampler);
        }
    }

    /// Batches whose readings all reached the display.
    pub fn batches(&self) -> u32 {self.batches}
    pub fn tx(&self) -> &W {&self.tx}
    pub fn tx_mut(&mut self) -> &mut W {&mut self.tx}
    pub fn config(&self) -> &Config {&self.config}
}

#[cfg(test)]
use crate::adc::MockAdc;
#[cfg(test)]
use crate::cpu::MockIrq;
#[cfg(test)]
use crate::frame::{decode, MockSerial};
#[cfg(test)]
use crate::sampler::conversion_isr;

#[cfg(test)]
#[derive(Default)]
struct MockDelay {
    ns: u64,
}

#[cfg(test)]
impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.ns += ns as u64;
    }
}

#[cfg(test)]
#[derive(Default)]
struct MockBoard {
    calls: std::vec::Vec<(&'static str, u32)>,
}

#[cfg(test)]
impl Board for MockBoard {
    fn init_transmit(&mut self, baud: u32) {self.calls.push(("tx", baud))}
    fn init_acquisition(&mut self) {self.calls.push(("adc", 0))}
}

#[cfg(test)]
const PIN_CONFIG: Config = {
    let mut c = Config::new();
    *c.calibrate(Calibration::pin(5.0), Calibration::pin(5.0))};

#[cfg(test)]
fn meter(tx: MockSerial) -> Meter<MockSerial, MockDelay, MockIrq> {
    Meter::new(tx, MockDelay::default(), MockIrq::default(), PIN_CONFIG)
}

#[cfg(test)]
fn fill(sampler: &Sampler<4>, v: &[u16], i: &[u16]) {
    let mut adc = MockAdc::new(v, i);
    let mut irq = MockIrq::default();
    for _ in 0..8 {
        conversion_isr(sampler, &mut adc, &mut irq);
    }
    assert!(sampler.is_ready());
}

#[test]
fn config_defaults() {
    let c = Config::new();
    assert_eq!(c.baud, 9600);
    assert_eq!(c.pace_ms, 500);
    assert_eq!(c.ubrr(), 103);
    assert_eq!(crate::CONFIG, c);
}

#[test]
fn start_sequence() {
    let mut m = meter(MockSerial::default());
    let mut board = MockBoard::default();
    m.start(&mut board);
    assert_eq!(board.calls.as_slice(), &[("tx", 9600), ("adc", 0)]);
    assert_eq!(m.irq.restore_count, 1);
}

#[test]
fn idle_until_ready() {
    let sampler = Sampler::<4>::new();
    let mut m = meter(MockSerial::default());
    assert_eq!(m.poll(&sampler), Ok(None));
    assert_eq!(m.irq.suppress_count, 0);
    assert!(m.tx().bytes.is_empty());
    assert_eq!(m.delay.ns, 0);
}

#[test]
fn end_to_end_four_samples() {
    let sampler = Sampler::<4>::new();
    fill(&sampler, &[200, 400, 600, 800], &[100, 200, 300, 400]);
    let mut m = meter(MockSerial::default());
    let metrics = m.poll(&sampler).unwrap().unwrap();

    // Refined counts: 200..800 step 100 and 100..400 step 50.
    let lsb = 5.0f64 / 1024.;
    let v: std::vec::Vec<f64> = (0..7).map(|k| (200 + 100 * k) as f64 * lsb).collect();
    let i: std::vec::Vec<f64> = (0..7).map(|k| (100 + 50 * k) as f64 * lsb).collect();
    let rms = |x: &[f64]| (x.iter().map(|a| a * a).sum::<f64>() / 7.).sqrt();
    let power = v.iter().zip(&i).map(|(a, b)| a * b).sum::<f64>() / 7.;
    let expect = [rms(v.as_slice()), rms(i.as_slice()) * 2f64.sqrt(), power];
    let got = [metrics.rms_voltage, metrics.peak_current, metrics.power];
    for (g, e) in got.iter().zip(expect) {
        assert!((*g as f64 - e).abs() < 1e-4, "{got:?} v. {expect:?}");
    }

    // Three readings, in order, each decoding to its metric to within the
    // last displayed digit.
    let bytes = &m.tx().bytes;
    let readings: std::vec::Vec<_> = bytes.chunk_by(|a, b| a >> 6 == b >> 6)
        .map(|f| decode(f).unwrap()).collect();
    assert_eq!(readings.iter().map(|r| r.param).collect::<std::vec::Vec<_>>(),
               Parameter::ALL);
    for (r, e) in readings.iter().zip(expect) {
        let lsb = 10f64.powi(-(r.dp as i32));
        let shown = r.value() as f64;
        assert!(shown <= e + 1e-6 && e - shown < lsb, "{r:?} v. {e}");
    }
    let mut buf = [0; 5];
    let shown: std::vec::Vec<String> = readings.iter().map(|r| {
        let len = crate::decimal::format_reading(&mut buf, r);
        String::from_utf8(buf[..len].to_vec()).unwrap()}).collect();
    assert_eq!(shown, ["2.629", "1.859", "3.457"]);

    assert!(!sampler.is_ready());
    assert_eq!((m.irq.suppress_count, m.irq.restore_count), (1, 1));
    assert_eq!(m.delay.ns, 500_000_000);
    assert_eq!(m.batches(), 1);
}

#[test]
fn all_zero_batch() {
    let sampler = Sampler::<4>::new();
    fill(&sampler, &[0; 4], &[0; 4]);
    let mut m = meter(MockSerial::default());
    assert_eq!(m.poll(&sampler), Ok(Some(Metrics::default())));
    let (v, i, p) = (64u8, 128u8, 192u8);
    assert_eq!(m.tx().bytes.as_slice(),
               &[v + 48, v + 63, i + 48, i + 63, p + 48, p + 63]);
}

#[test]
fn transmit_error_still_rearms() {
    let sampler = Sampler::<4>::new();
    fill(&sampler, &[200, 400, 600, 800], &[100, 200, 300, 400]);
    let mut m = meter(MockSerial::failing_after(3));
    assert_eq!(m.poll(&sampler), Err(serial::ErrorKind::Other));
    assert!(!sampler.is_ready());
    assert!(!m.irq.suppressed);
    assert_eq!(m.tx().bytes.len(), 3);
    assert_eq!(m.batches(), 0);

    // The next batch goes through once the link recovers.
    m.tx_mut().fail_after = None;
    m.tx_mut().bytes.clear();
    fill(&sampler, &[200, 400, 600, 800], &[100, 200, 300, 400]);
    assert!(m.step(&sampler).is_some());
    assert_eq!(m.tx().bytes.len(), 15);
    assert_eq!(m.batches(), 1);
}

#[test]
fn step_swallows_errors() {
    let sampler = Sampler::<4>::new();
    fill(&sampler, &[1; 4], &[2; 4]);
    let mut m = meter(MockSerial::failing_after(0));
    assert_eq!(m.step(&sampler), None);
    assert!(!sampler.is_ready());
}

#[test]
fn production_calibration_batch() {
    // Mid-rail readings are near zero volts and amps on the real front end.
    let sampler = Sampler::<4>::new();
    fill(&sampler, &[522; 4], &[522; 4]);
    let mut m = Meter::new(MockSerial::default(), MockDelay::default(),
                           MockIrq::default(), Config::new());
    let metrics = m.poll(&sampler).unwrap().unwrap();
    assert!(metrics.rms_voltage < 0.05, "{metrics:?}");
    assert!(metrics.peak_current < 0.01, "{metrics:?}");
}

/// Event mask shared with the serial and delay doubles, so each call can
/// record whether the handler was held off at the time.
#[cfg(test)]
struct WatchIrq<'a> {
    masked: std::rc::Rc<core::cell::Cell<bool>>,
    sampler: &'a Sampler<4>,
    ready_at_restore: std::vec::Vec<bool>,
}

#[cfg(test)]
impl Interrupts for WatchIrq<'_> {
    fn suppress(&mut self) {self.masked.set(true)}
    fn restore(&mut self) {
        self.ready_at_restore.push(self.sampler.is_ready());
        self.masked.set(false);
    }
}

#[cfg(test)]
struct WatchSerial {
    masked: std::rc::Rc<core::cell::Cell<bool>>,
    seen: std::vec::Vec<bool>,
}

#[cfg(test)]
impl serial::ErrorType for WatchSerial {
    type Error = serial::ErrorKind;
}

#[cfg(test)]
impl serial::Write<u8> for WatchSerial {
    fn write(&mut self, _: u8) -> nb::Result<(), Self::Error> {
        self.seen.push(self.masked.get());
        Ok(())
    }
    fn flush(&mut self) -> nb::Result<(), Self::Error> {Ok(())}
}

#[cfg(test)]
struct WatchDelay {
    masked: std::rc::Rc<core::cell::Cell<bool>>,
    seen: std::vec::Vec<bool>,
}

#[cfg(test)]
impl DelayNs for WatchDelay {
    fn delay_ns(&mut self, _: u32) {
        self.seen.push(self.masked.get());
    }
}

#[test]
fn consume_phase_is_suppressed() {
    let sampler = Sampler::<4>::new();
    fill(&sampler, &[200, 400, 600, 800], &[100, 200, 300, 400]);
    let masked = std::rc::Rc::new(core::cell::Cell::new(false));
    let mut m = Meter::new(
        WatchSerial{masked: masked.clone(), seen: std::vec::Vec::new()},
        WatchDelay{masked: masked.clone(), seen: std::vec::Vec::new()},
        WatchIrq{masked: masked.clone(), sampler: &sampler,
                 ready_at_restore: std::vec::Vec::new()},
        PIN_CONFIG);
    assert!(m.poll(&sampler).unwrap().is_some());

    // Every byte and the pacing delay ran with the handler held off, and
    // the sampler was re-armed before events came back.
    assert_eq!(m.tx.seen.len(), 15);
    assert!(m.tx.seen.iter().all(|&s| s), "{:?}", m.tx.seen);
    assert!(!m.delay.seen.is_empty());
    assert!(m.delay.seen.iter().all(|&s| s), "{:?}", m.delay.seen);
    assert_eq!(m.irq.ready_at_restore.as_slice(), &[false]);
    assert!(!masked.get());
}
