use crate::frame::Reading;

pub const DIGIT_0: u8 = b'0';
pub const PERIOD: u8 = b'.';
pub const SPACE: u8 = b' ';

// Right justified.
pub fn format_u32(result: &mut [u8], v: u32, dp: usize) {
    // Create the digits backwards.
    let mut v = crate::utils::to_bcd(v);
    let len = result.len();
    for i in 0..len {
        let d;
        if i != 0 && i == dp {
            d = PERIOD
        }
        else {
            d = (v as u8 & 15) + DIGIT_0;
            v >>= 4;
        }
        result[len - 1 - i] = d;
    }

    // Blank leading zeros, but keep the one in front of the point.
    let mut lead = 0;
    while lead + 1 < len && result[lead] == DIGIT_0
        && result[lead + 1] != PERIOD {
        result[lead] = SPACE;
        lead += 1;
    }
}

/// What the display shows for a reading: four digits plus the point when
/// there is one, e.g. "230.1" or "0.750".
pub fn format_reading(result: &mut [u8; 5], reading: &Reading) -> usize {
    let dp = reading.dp as usize;
    let len = if dp == 0 {4} else {5};
    format_u32(&mut result[..len], reading.digits, dp);
    len
}

#[cfg(test)]
fn ff_u32(v: u32, width: usize, dp: usize) -> String {
    let mut result = vec![0u8; width];
    format_u32(&mut result[..], v, dp);
    String::from_utf8(result).unwrap()
}

#[cfg(test)]
fn fr(frames: &[u8]) -> String {
    let mut buf = [0; 5];
    let len = format_reading(&mut buf, &crate::frame::decode(frames).unwrap());
    String::from_utf8(buf[..len].to_vec()).unwrap()
}

#[test]
fn unsigned() {
    assert_eq!(ff_u32(12345, 6, 3) , "12.345");
    assert_eq!(ff_u32(456789, 7, 2), "4567.89");
    assert_eq!(ff_u32(1, 7, 2)     , "   0.01");
    assert_eq!(ff_u32(1234, 8, 2)  , "   12.34");
    assert_eq!(ff_u32(0, 4, 0)     , "   0");
    assert_eq!(ff_u32(0, 1, 0)     , "0");
}

#[test]
fn readings() {
    use crate::frame::{encode, Parameter};
    for (value, shown) in [
        (0.0, "0.000"), (0.75, "0.750"), (0.0625, "0.062"), (5.25, "5.250"),
        (42.75, "42.75"), (250.5, "250.5"), (1500., "9999"), (999.5, "999.9")] {
        assert_eq!(fr(&encode(Parameter::Voltage, value)), shown,
                   "value={value}");
    }
}
