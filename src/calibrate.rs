use crate::adc::FULL_SCALE;

/// Affine map from ADC counts to a physical unit:
/// `(counts × vref / 1024 − offset) × gain`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibration {
    /// ADC reference voltage.
    pub vref: f32,
    /// Bias of the analog front end, in volts at the pin.
    pub offset: f32,
    /// Volts at the pin to physical unit.
    pub gain: f32,
}

impl Calibration {
    pub const fn new(vref: f32, offset: f32, gain: f32) -> Calibration {
        Calibration{vref, offset, gain}
    }

    /// Plain pin voltage, no bias or gain.
    pub const fn pin(vref: f32) -> Calibration {
        Calibration::new(vref, 0.0, 1.0)
    }

    /// Counts may be fractional: interpolated midpoints are the mean of two
    /// readings.
    #[inline]
    pub fn apply(&self, counts: f32) -> f32 {
        (counts * self.vref / FULL_SCALE as f32 - self.offset) * self.gain
    }
}

/// Line voltage: 2.55V bias, divider ratio 10.15.
pub const VOLTAGE: Calibration = Calibration::new(5.0, 2.55, 10.15);
/// Shunt current: 2.55V bias, 5.62/3 V per A.
pub const CURRENT: Calibration = Calibration::new(5.0, 2.55, 3.0 / 5.62);

#[cfg(test)]
fn close(a: f32, b: f32) -> bool {(a - b).abs() <= 1e-4 * b.abs().max(1.)}

#[test]
fn pin_voltage() {
    let cal = Calibration::pin(5.0);
    assert_eq!(cal.apply(0.), 0.);
    assert_eq!(cal.apply(512.), 2.5);
    assert_eq!(cal.apply(1024.), 5.0);
}

#[test]
fn line_and_shunt() {
    // Mid-rail reads close to zero on both channels.
    assert!(VOLTAGE.apply(522.24).abs() < 1e-3);
    assert!(close(VOLTAGE.apply(1023.), (1023. * 5. / 1024. - 2.55) * 10.15));
    assert!(close(CURRENT.apply(0.), -2.55 / (5.62 / 3.)));
    assert!(close(CURRENT.apply(700.), (700. * 5. / 1024. - 2.55) / (5.62 / 3.)));
}
