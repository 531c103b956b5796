
/// ADC input select code for the line voltage divider (ADC0).
pub const VOLTAGE_MUX: u8 = 0;
/// ADC input select code for the current shunt (ADC5, MUX0 | MUX2).
pub const CURRENT_MUX: u8 = 5;

/// Full scale of the 10 bit converter.
pub const FULL_SCALE: u16 = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Voltage,
    Current,
}

impl Channel {
    pub const fn mux(self) -> u8 {
        match self {
            Channel::Voltage => VOLTAGE_MUX,
            Channel::Current => CURRENT_MUX,
        }
    }
    pub const fn from_mux(mux: u8) -> Option<Channel> {
        match mux {
            VOLTAGE_MUX => Some(Channel::Voltage),
            CURRENT_MUX => Some(Channel::Current),
            _ => None,
        }
    }
    /// The input sampled after this one.
    pub const fn other(self) -> Channel {
        match self {
            Channel::Voltage => Channel::Current,
            Channel::Current => Channel::Voltage,
        }
    }
}

/// The converter as seen from the conversion-complete handler.
pub trait Adc {
    /// Currently selected input select code.
    fn mux(&self) -> u8;
    fn set_mux(&mut self, mux: u8);
    /// Result of the conversion that just completed, 0 ..= 1023.
    fn result(&self) -> u16;
    /// Trigger the next conversion.
    fn start(&mut self);
}

/// Scripted converter for tests: each start() latches the next value of
/// the script for whichever input is selected.
#[cfg(test)]
pub struct MockAdc {
    pub mux: u8,
    pub voltage: std::vec::Vec<u16>,
    pub current: std::vec::Vec<u16>,
    pub starts: usize,
    pub history: std::vec::Vec<u8>,
    latched: u16,
}

#[cfg(test)]
impl MockAdc {
    pub fn new(voltage: &[u16], current: &[u16]) -> Self {
        let mut adc = MockAdc{
            mux: VOLTAGE_MUX, voltage: voltage.to_vec(),
            current: current.to_vec(), starts: 0,
            history: std::vec::Vec::new(), latched: 0};
        adc.start();
        adc.starts = 0;
        adc
    }
}

#[cfg(test)]
impl Adc for MockAdc {
    fn mux(&self) -> u8 {self.mux}
    fn set_mux(&mut self, mux: u8) {self.mux = mux}
    fn result(&self) -> u16 {self.latched}
    fn start(&mut self) {
        self.history.push(self.mux);
        let script = match Channel::from_mux(self.mux) {
            Some(Channel::Voltage) => &mut self.voltage,
            Some(Channel::Current) => &mut self.current,
            None => {self.latched = 0; self.starts += 1; return}
        };
        self.latched = if script.is_empty() {0} else {script.remove(0)};
        self.starts += 1;
    }
}

#[test]
fn mux_codes_round_trip() {
    for ch in [Channel::Voltage, Channel::Current] {
        assert_eq!(Channel::from_mux(ch.mux()), Some(ch));
        assert_eq!(ch.other().other(), ch);
    }
    assert_eq!(Channel::from_mux(3), None);
    // Select code is two bits wide on the MUX0/MUX2 pair.
    assert!(VOLTAGE_MUX < 8 && CURRENT_MUX < 8);
}
