//! Two channel mains power meter core.
//!
//! The ADC alternates between the line voltage divider and the current
//! shunt.  Each batch of readings is interpolated to double its time
//! resolution, reduced to RMS voltage, peak current and mean power, and
//! sent to the four digit display controller one digit per byte.

#![cfg_attr(not(test), no_std)]

pub mod adc;
pub mod calibrate;
pub mod cpu;
pub mod debug;
pub mod decimal;
pub mod frame;
pub mod meter;
pub mod metrics;
pub mod sampler;
pub mod utils;
pub mod vcell;
pub mod waveform;

pub const CPU_CLK: u32 = 16_000_000;

/// Readings per channel per batch.
pub const N_SAMPLES: usize = 108;
/// Points per channel after interpolation.
pub const REFINED_LEN: usize = 2 * N_SAMPLES - 1;

static_assertions::const_assert!(N_SAMPLES >= 2);
static_assertions::const_assert_eq!(REFINED_LEN, 215);

pub const CONFIG: meter::Config = {
    let mut c = meter::Config::new();
    *c.baud(9600).pace(500)};

static_assertions::const_assert!(CONFIG.ubrr() as u32 == CPU_CLK / 16 / 9600 - 1);

/// Shared between the conversion-complete handler and the foreground
/// loop.
pub static SAMPLER: sampler::Sampler<N_SAMPLES> = sampler::Sampler::new();
