//! Waveform reconstruction.
//!
//! The ADC alternates inputs, so each channel is sampled at half the
//! conversion rate.  Linear interpolation doubles the time resolution: a
//! batch of N readings becomes 2N−1 calibrated points, readings at even
//! indexes and the calibrated mean of each adjacent pair at odd indexes.

use arrayvec::ArrayVec;

use crate::calibrate::Calibration;

/// Refined sequence for a batch of up to `N_SAMPLES` readings.
pub type Refined = ArrayVec<f32, {crate::REFINED_LEN}>;

/// Refine `samples` into `2 × len − 1` points.  An empty batch refines to
/// an empty sequence.  Panics if the output would exceed `M`.
pub fn refine<const M: usize>(samples: &[u16], cal: &Calibration)
                              -> ArrayVec<f32, M> {
    let mut out = ArrayVec::new();
    let Some((&last, _)) = samples.split_last() else {return out};
    assert!(2 * samples.len() - 1 <= M);
    for pair in samples.windows(2) {
        let (a, b) = (pair[0] as f32, pair[1] as f32);
        out.push(cal.apply(a));
        out.push(cal.apply((a + b) / 2.0));
    }
    out.push(cal.apply(last as f32));
    out
}

#[cfg(test)]
const PIN: Calibration = Calibration::pin(5.0);

#[test]
fn length_and_endpoints() {
    let samples = [200u16, 400, 600, 800];
    let r = refine::<7>(&samples, &PIN);
    assert_eq!(r.len(), 7);
    assert_eq!(r[0], PIN.apply(200.));
    assert_eq!(r[6], PIN.apply(800.));
    assert_eq!(r[1], PIN.apply(300.));
    assert_eq!(r[2], PIN.apply(400.));
    assert_eq!(r[5], PIN.apply(700.));
}

#[test]
fn lengths_across_batch_sizes() {
    let samples: std::vec::Vec<u16> = (0..108).map(|i| i * 9).collect();
    for n in 1 ..= samples.len() {
        let r: Refined = refine(&samples[..n], &PIN);
        assert_eq!(r.len(), 2 * n - 1, "n={n}");
        assert_eq!(r[0], PIN.apply(samples[0] as f32));
        assert_eq!(r[2 * n - 2], PIN.apply(samples[n - 1] as f32));
    }
}

#[test]
fn odd_midpoints() {
    // Mean of odd neighbours is a half count.
    let r = refine::<3>(&[1, 2], &PIN);
    assert_eq!(r[1], PIN.apply(1.5));
}

#[test]
fn single_and_empty() {
    let r = refine::<1>(&[512], &PIN);
    assert_eq!(r.as_slice(), &[2.5]);
    assert!(refine::<1>(&[], &PIN).is_empty());
}
