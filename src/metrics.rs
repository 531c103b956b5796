//! Metric engine.  Pure functions of the two refined sequences.

use core::f32::consts::SQRT_2;

/// One batch worth of readings.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Metrics {
    /// RMS line voltage.
    pub rms_voltage: f32,
    /// Peak current, taken as RMS × √2 (assumes a sinusoid).
    pub peak_current: f32,
    /// Magnitude of the mean instantaneous power.
    pub power: f32,
}

impl Metrics {
    /// The two sequences are index aligned in time.  Extra points in the
    /// longer one are ignored for power.
    pub fn compute(voltage: &[f32], current: &[f32]) -> Metrics {
        Metrics{
            rms_voltage: rms(voltage),
            peak_current: rms(current) * SQRT_2,
            power: libm::fabsf(mean_product(voltage, current)),
        }
    }
}

/// Quadratic mean.  Zero for an empty sequence.
pub fn rms(x: &[f32]) -> f32 {
    libm::sqrtf(mean_product(x, x))
}

/// Mean of x[i] × y[i].  Zero for an empty sequence.
pub fn mean_product(x: &[f32], y: &[f32]) -> f32 {
    let len = x.len().min(y.len());
    if len == 0 {
        return 0.0;
    }
    let sum: f32 = x.iter().zip(y).map(|(a, b)| a * b).sum();
    sum / len as f32
}

#[cfg(test)]
fn close(a: f32, b: f32) -> bool {(a - b).abs() <= 1e-5 * b.abs().max(1.)}

#[test]
fn all_zero() {
    let z = [0f32; 215];
    assert_eq!(Metrics::compute(&z, &z), Metrics::default());
}

#[test]
fn dc_levels() {
    let v = [2.0f32; 7];
    let i = [-0.5f32; 7];
    let m = Metrics::compute(&v, &i);
    assert!(close(m.rms_voltage, 2.0));
    assert!(close(m.peak_current, 0.5 * SQRT_2));
    // Negative mean power is reported as a magnitude.
    assert!(close(m.power, 1.0));
}

#[test]
fn sinusoid() {
    // Whole cycles of a sine: RMS is amplitude / √2, so the peak estimate
    // recovers the amplitude.  In-phase power is Vrms × Irms.
    const LEN: usize = 200;
    let v: std::vec::Vec<f32> = (0..LEN)
        .map(|k| 325. * (k as f32 * core::f32::consts::TAU / 50.).sin())
        .collect();
    let i: std::vec::Vec<f32> = v.iter().map(|x| x / 100.).collect();
    let m = Metrics::compute(&v, &i);
    assert!((m.rms_voltage - 325. / SQRT_2).abs() < 0.05, "{m:?}");
    assert!((m.peak_current - 3.25).abs() < 1e-3, "{m:?}");
    assert!((m.power - 325. * 3.25 / 2.).abs() < 0.1, "{m:?}");
}

#[test]
fn empty() {
    assert_eq!(Metrics::compute(&[], &[]), Metrics::default());
}
