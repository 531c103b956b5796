//! Host simulation of the meter.
//!
//! Feeds a synthetic mains waveform through a simulated ADC into the real
//! sampler, meter loop and frame encoder, then decodes the serial bytes
//! and prints what the display would show.
//!
//! Usage: meter-sim [batches] [current phase, degrees]

use core::f32::consts::TAU;
use embedded_hal::delay::DelayNs;
use embedded_hal_nb::serial;

use powermeter::adc::{Adc, Channel, FULL_SCALE};
use powermeter::calibrate::Calibration;
use powermeter::cpu::{Board, Interrupts};
use powermeter::decimal::format_reading;
use powermeter::frame::decode;
use powermeter::meter::Meter;
use powermeter::sampler::conversion_isr;
use powermeter::vcell::VCell;
use powermeter::{dbgln, CONFIG, SAMPLER};

/// Mains frequency.
const LINE_HZ: f32 = 50.0;
/// Line voltage at the divider input, RMS.
const LINE_VRMS: f32 = 14.0;
/// Load current, peak.
const LOAD_IPEAK: f32 = 0.8;
/// 16MHz / 128 prescale / 13 ADC clocks per conversion.
const CONVERSION_S: f32 = 13.0 * 128.0 / powermeter::CPU_CLK as f32;

/// Global event mask shared by the handler and the loop.
static MASKED: VCell<bool> = VCell::new(true);
/// Simulated time, seconds.
static NOW: VCell<f32> = VCell::new(0.0);

struct SimIrq;

impl Interrupts for SimIrq {
    fn suppress(&mut self) {MASKED.write(true)}
    fn restore(&mut self) {MASKED.write(false)}
}

struct SimAdc {
    mux: u8,
    result: u16,
    phase: f32,
    enabled: bool,
}

impl SimAdc {
    /// Physical value to ADC counts through the inverse calibration.
    fn counts(cal: &Calibration, x: f32) -> u16 {
        let pin = x / cal.gain + cal.offset;
        let counts = pin * FULL_SCALE as f32 / cal.vref;
        counts.round().clamp(0.0, (FULL_SCALE - 1) as f32) as u16
    }
}

impl Adc for SimAdc {
    fn mux(&self) -> u8 {self.mux}
    fn set_mux(&mut self, mux: u8) {self.mux = mux}
    fn result(&self) -> u16 {self.result}
    fn start(&mut self) {
        let w = TAU * LINE_HZ * NOW.read();
        self.result = match Channel::from_mux(self.mux) {
            Some(Channel::Voltage) => Self::counts(
                &CONFIG.voltage, LINE_VRMS * core::f32::consts::SQRT_2 * w.sin()),
            Some(Channel::Current) => Self::counts(
                &CONFIG.current, LOAD_IPEAK * (w - self.phase).sin()),
            None => 0,
        };
        NOW.write(NOW.read() + CONVERSION_S);
    }
}

struct SimBoard<'a> {
    adc: &'a mut SimAdc,
}

impl Board for SimBoard<'_> {
    fn init_transmit(&mut self, baud: u32) {
        dbgln!("USART up at {baud}");
    }
    fn init_acquisition(&mut self) {
        self.adc.enabled = true;
        self.adc.set_mux(Channel::Voltage.mux());
        self.adc.start();
    }
}

#[derive(Default)]
struct Wire {
    bytes: Vec<u8>,
}

impl serial::ErrorType for Wire {
    type Error = serial::ErrorKind;
}

impl serial::Write<u8> for Wire {
    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        self.bytes.push(word);
        Ok(())
    }
    fn flush(&mut self) -> nb::Result<(), Self::Error> {Ok(())}
}

/// Pacing in simulated time only.  The mains keeps turning while the
/// meter waits.
struct SimDelay;

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        NOW.write(NOW.read() + ns as f32 * 1e-9);
    }
}

fn log_sink(args: core::fmt::Arguments) {
    eprintln!("{args}");
}

fn main() {
    let mut args = std::env::args().skip(1);
    let batches: u32 = args.next().and_then(|a| a.parse().ok()).unwrap_or(5);
    let phase_deg: f32 = args.next().and_then(|a| a.parse().ok()).unwrap_or(0.0);

    powermeter::debug::install(log_sink);

    let mut adc = SimAdc{
        mux: Channel::Voltage.mux(), result: 0,
        phase: phase_deg.to_radians(), enabled: false};
    let mut isr_irq = SimIrq;
    let mut meter = Meter::new(
        Wire::default(), SimDelay, SimIrq, CONFIG);

    meter.start(&mut SimBoard{adc: &mut adc});

    println!("{:>9}{:>9}{:>9}", "V rms", "A peak", "W");
    while meter.batches() < batches {
        if adc.enabled && !MASKED.read() {
            conversion_isr(&SAMPLER, &mut adc, &mut isr_irq);
        }
        if meter.step(&SAMPLER).is_none() {
            continue;
        }
        let bytes = std::mem::take(&mut meter.tx_mut().bytes);
        let mut line = String::new();
        for frames in bytes.chunk_by(|a, b| a >> 6 == b >> 6) {
            let Some(reading) = decode(frames) else {
                line.push_str(&format!(" {frames:02x?}"));
                continue;
            };
            let mut buf = [0; 5];
            let len = format_reading(&mut buf, &reading);
            let shown = std::str::from_utf8(&buf[..len]).unwrap_or("?");
            line.push_str(&format!(" {shown:>7}{}", reading.param.symbol()));
        }
        println!("{line}");
    }
}
