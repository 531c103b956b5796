//! Display protocol.
//!
//! Each reading goes out as up to four digit frames, least significant
//! first, then an optional decimal point frame.  One byte per frame:
//!
//! ```text
//!   7 6 | 5 4  | 3 2 1 0
//!   sel | slot | digit 0-9, or 15 for the decimal point
//! ```
//!
//! For the decimal point frame the slot field carries `dp`, the number of
//! fractional digits shown.  The display has four digits, so readings keep
//! four significant digits and saturate at 9999.

use arrayvec::ArrayVec;
use embedded_hal_nb::serial;

use crate::utils::{digit_count, pow10, to_bcd};

pub const SELECTOR_SHIFT: u32 = 6;
pub const SLOT_SHIFT: u32 = 4;
/// Position step between successive digit frames.
pub const SLOT_STEP: u8 = 1 << SLOT_SHIFT;
pub const DIGIT_SLOTS: u8 = 4;
/// Low nibble of the decimal point frame.
pub const DP_CODE: u8 = 15;

/// Readings above this show as 9999.
pub const SATURATE_ABOVE: f32 = 999.0;
pub const SATURATED: u32 = 9999;

static_assertions::const_assert!(
    (3 << SELECTOR_SHIFT | (DIGIT_SLOTS as u32 - 1) << SLOT_SHIFT | 15) <= 0xff);
static_assertions::const_assert!(SATURATED < 10u32.pow(DIGIT_SLOTS as u32));

/// Which reading a frame belongs to; the value is the selector field in
/// place.  Selector 0 is reserved.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parameter {
    Voltage = 1 << SELECTOR_SHIFT,
    Current = 2 << SELECTOR_SHIFT,
    Power   = 3 << SELECTOR_SHIFT,
}

impl Parameter {
    pub const ALL: [Parameter; 3] =
        [Parameter::Voltage, Parameter::Current, Parameter::Power];

    pub const fn from_frame(frame: u8) -> Option<Parameter> {
        match frame >> SELECTOR_SHIFT {
            1 => Some(Parameter::Voltage),
            2 => Some(Parameter::Current),
            3 => Some(Parameter::Power),
            _ => None,
        }
    }
    pub const fn symbol(self) -> char {
        match self {
            Parameter::Voltage => 'V',
            Parameter::Current => 'A',
            Parameter::Power   => 'W',
        }
    }
}

/// All frames of one reading.
pub type Frames = ArrayVec<u8, {DIGIT_SLOTS as usize + 1}>;

#[inline]
const fn frame(param: Parameter, slot: u8, code: u8) -> u8 {
    param as u8 | slot << SLOT_SHIFT | code
}

/// Number of fractional digits to show: whatever is left of four after
/// the whole part.  Below one we show three.
pub fn dp_index(value: f32) -> u8 {
    let whole = libm::floorf(value) as u32;
    if whole == 0 {
        3
    }
    else {
        (DIGIT_SLOTS as u32).saturating_sub(digit_count(whole)) as u8
    }
}

/// Build the frames for one non-negative reading.
pub fn encode(param: Parameter, value: f32) -> Frames {
    let whole = libm::floorf(value) as u32;
    let dp = dp_index(value);
    let scaled = if value > SATURATE_ABOVE {
        SATURATED
    }
    else {
        // Rounding in the multiply can land on 10000 just below a decade.
        (libm::floorf(value * pow10(dp as u32)) as u32).min(SATURATED)
    };

    let mut frames = Frames::new();
    let mut bcd = to_bcd(scaled);
    let mut slot = 0;
    while bcd != 0 {
        frames.push(frame(param, slot, bcd as u8 & 15));
        bcd >>= 4;
        slot += 1;
    }
    // Below one the units digit is never significant.  Show it as 0
    // rather than blank.
    if whole == 0 && (slot == DIGIT_SLOTS - 1 || slot == 0) {
        frames.push(frame(param, DIGIT_SLOTS - 1, 0));
    }
    if dp != 0 {
        frames.push(frame(param, dp, DP_CODE));
    }
    frames
}

/// Encode and send one reading, blocking on each byte.  Returns the number
/// of bytes written.
pub fn transmit<W>(tx: &mut W, param: Parameter, value: f32)
                   -> Result<usize, W::Error>
where W: serial::Write<u8> + ?Sized {
    let frames = encode(param, value);
    for &b in &frames {
        nb::block!(tx.write(b))?;
    }
    Ok(frames.len())
}

/// A reading as the display sees it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reading {
    pub param: Parameter,
    /// The four displayed digits as an integer.
    pub digits: u32,
    /// Fractional digits.
    pub dp: u8,
}

impl Reading {
    pub fn value(&self) -> f32 {
        self.digits as f32 / pow10(self.dp as u32)
    }
}

/// Inverse of `encode` for one reading's frames.  None if the frames are
/// empty, mix selectors, use the reserved selector or carry a code that
/// is neither a digit nor the decimal point.
pub fn decode(frames: &[u8]) -> Option<Reading> {
    let param = Parameter::from_frame(*frames.first()?)?;
    let mut digits = 0;
    let mut dp = 0;
    for &f in frames {
        if Parameter::from_frame(f) != Some(param) {
            return None;
        }
        let slot = f >> SLOT_SHIFT & 3;
        match f & 15 {
            DP_CODE => dp = slot,
            d @ 0..=9 => digits += d as u32 * 10u32.pow(slot as u32),
            _ => return None,
        }
    }
    Some(Reading{param, digits, dp})
}

#[cfg(test)]
const V: u8 = Parameter::Voltage as u8;
#[cfg(test)]
const I: u8 = Parameter::Current as u8;
#[cfg(test)]
const P: u8 = Parameter::Power as u8;

#[test]
fn selector_values() {
    assert_eq!((V, I, P), (64, 128, 192));
    for p in Parameter::ALL {
        assert_eq!(Parameter::from_frame(p as u8 | 0x3f), Some(p));
    }
    assert_eq!(Parameter::from_frame(0x3f), None);
}

#[test]
fn dp_placement() {
    for (value, dp) in [
        (0.0, 3), (0.4, 3), (5.2, 3), (9.99, 3), (42.7, 2), (99.5, 2),
        (100.0, 1), (999.9, 1), (1500.0, 0), (9999.0, 0), (12345.0, 0)] {
        assert_eq!(dp_index(value), dp, "value={value}");
    }
}

#[test]
fn saturates_1500() {
    assert_eq!(encode(Parameter::Voltage, 1500.).as_slice(),
               &[V + 9, V + 16 + 9, V + 32 + 9, V + 48 + 9]);
    // Magnitude saturates, dp still follows the whole part.
    assert_eq!(encode(Parameter::Power, 999.5).as_slice(),
               &[P + 9, P + 16 + 9, P + 32 + 9, P + 48 + 9, P + 16 + 15]);
    assert_eq!(encode(Parameter::Current, 123456.).as_slice(),
               &[I + 9, I + 16 + 9, I + 32 + 9, I + 48 + 9]);
}

#[test]
fn zero_reading() {
    assert_eq!(encode(Parameter::Voltage, 0.).as_slice(),
               &[V + 48, V + 48 + 15]);
}

#[test]
fn leading_zero_below_one() {
    // Three fractional digits, units shown as an explicit 0.
    assert_eq!(encode(Parameter::Current, 0.75).as_slice(),
               &[I, I + 16 + 5, I + 32 + 7, I + 48, I + 48 + 15]);
    // One or two digits: no padding.
    assert_eq!(encode(Parameter::Current, 0.0625).as_slice(),
               &[I + 2, I + 16 + 6, I + 48 + 15]);
}

#[test]
fn whole_readings() {
    assert_eq!(encode(Parameter::Voltage, 5.25).as_slice(),
               &[V, V + 16 + 5, V + 32 + 2, V + 48 + 5, V + 48 + 15]);
    assert_eq!(encode(Parameter::Voltage, 42.75).as_slice(),
               &[V + 5, V + 16 + 7, V + 32 + 2, V + 48 + 4, V + 32 + 15]);
    assert_eq!(encode(Parameter::Power, 1.0).as_slice(),
               &[P, P + 16, P + 32, P + 48 + 1, P + 48 + 15]);
    assert_eq!(encode(Parameter::Power, 250.5).as_slice(),
               &[P + 5, P + 16, P + 32 + 5, P + 48 + 2, P + 16 + 15]);
}

#[test]
fn never_overflows_slots() {
    let mut v = 0.0f32;
    while v < 2000. {
        let frames = encode(Parameter::Power, v);
        assert!(frames.len() <= 5, "value={v}");
        for f in &frames {
            assert_eq!(Parameter::from_frame(*f), Some(Parameter::Power));
        }
        let r = decode(&frames).unwrap();
        assert!(r.digits <= SATURATED);
        v += 0.37;
    }
    // Largest float below a decade.
    let below_ten = f32::from_bits(10f32.to_bits() - 1);
    assert!(encode(Parameter::Voltage, below_ten).len() <= 5);
}

#[test]
fn decode_inverts_encode() {
    for (value, digits, dp) in [
        (0.0, 0, 3), (0.75, 750, 3), (5.25, 5250, 3), (42.75, 4275, 2),
        (250.5, 2505, 1), (1500.0, 9999, 0)] {
        let r = decode(&encode(Parameter::Current, value)).unwrap();
        assert_eq!((r.param, r.digits, r.dp), (Parameter::Current, digits, dp),
                   "value={value}");
    }
    assert!((decode(&encode(Parameter::Voltage, 42.75)).unwrap().value()
             - 42.75).abs() < 1e-4);
}

#[test]
fn decode_rejects() {
    assert_eq!(decode(&[]), None);
    assert_eq!(decode(&[0x05]), None);
    assert_eq!(decode(&[V + 1, I + 16 + 1]), None);
    assert_eq!(decode(&[V + 12]), None);
}

#[cfg(test)]
#[derive(Default)]
pub struct MockSerial {
    pub bytes: std::vec::Vec<u8>,
    /// Fail once this many bytes have been written.
    pub fail_after: Option<usize>,
    /// Report WouldBlock this many times before each byte.
    pub busy: u32,
    busy_left: u32,
}

#[cfg(test)]
impl MockSerial {
    pub fn failing_after(n: usize) -> Self {
        MockSerial{fail_after: Some(n), ..Default::default()}
    }
}

#[cfg(test)]
impl serial::ErrorType for MockSerial {
    type Error = serial::ErrorKind;
}

#[cfg(test)]
impl serial::Write<u8> for MockSerial {
    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        if self.fail_after == Some(self.bytes.len()) {
            return Err(nb::Error::Other(serial::ErrorKind::Other));
        }
        if self.busy_left < self.busy {
            self.busy_left += 1;
            return Err(nb::Error::WouldBlock);
        }
        self.busy_left = 0;
        self.bytes.push(word);
        Ok(())
    }
    fn flush(&mut self) -> nb::Result<(), Self::Error> {Ok(())}
}

#[test]
fn transmit_blocks_until_ready() {
    let mut tx = MockSerial{busy: 3, ..Default::default()};
    assert_eq!(transmit(&mut tx, Parameter::Voltage, 42.75), Ok(5));
    assert_eq!(tx.bytes.as_slice(),
               encode(Parameter::Voltage, 42.75).as_slice());
}

#[test]
fn transmit_propagates_errors() {
    let mut tx = MockSerial::failing_after(2);
    assert_eq!(transmit(&mut tx, Parameter::Voltage, 42.75),
               Err(serial::ErrorKind::Other));
    assert_eq!(tx.bytes.len(), 2);
}
