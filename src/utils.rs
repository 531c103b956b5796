
/// Convert the input to 8 digit BCD, least significant digit in the low
/// nibble.  Inputs above 99999999 keep only their last 8 digits.
pub fn to_bcd(mut v: u32) -> u32 {
    if v == 0 {
        return 0;
    }
    // Skip the leading zero nibbles, then double-dabble the rest.
    let mut remain = 32;
    while v & 15 << 28 == 0 {
        v <<= 4;
        remain -= 4;
    }
    let pos = 0x11111111;
    let mut bcd = 0u32;
    for _ in 0..remain {
        let overflow = bcd + 3 * pos & pos * 8;
        bcd = bcd.wrapping_add(bcd + (overflow >> 1) + (overflow >> 2));
        bcd += v >> 31;
        v <<= 1;
    }
    bcd
}

/// Number of decimal digits in v, with zero having none.
pub const fn digit_count(v: u32) -> u32 {
    if v == 0 {0} else {v.ilog10() + 1}
}

/// 10^e as a float, for the small exponents used by the display.
pub const fn pow10(e: u32) -> f32 {
    let mut r = 1.0;
    let mut i = 0;
    while i < e {
        r *= 10.0;
        i += 1;
    }
    r
}

#[test]
fn test_to_bcd() {
    for i in 0..65536 {
        assert_eq!(format!("{i}"), format!("{:x}", to_bcd(i)));
        let j = i * 0x10001;
        assert_eq!(format!("{}", j % 100000000), format!("{:x}", to_bcd(j)));
    }
}

#[test]
fn test_digit_count() {
    for (v, n) in [(0, 0), (1, 1), (9, 1), (10, 2), (999, 3), (1000, 4),
                   (9999, 4), (10000, 5), (u32::MAX, 10)] {
        assert_eq!(digit_count(v), n, "v={v}");
    }
}

#[test]
fn test_pow10() {
    assert_eq!(pow10(0), 1.0);
    assert_eq!(pow10(3), 1000.0);
}
