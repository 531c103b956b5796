//! Debug logging.
//!
//! The UART belongs to the display, so log lines go to whatever sink the
//! board installs (RTT, a second port, stderr on the host).  With no sink
//! the macros cost one volatile read.

use core::fmt::Arguments;

use crate::vcell::VCell;

pub type Sink = fn(Arguments);

static SINK: VCell<Option<Sink>> = VCell::new(None);

/// Install the log sink.  Call before enabling events.
pub fn install(sink: Sink) {
    SINK.write(Some(sink));
}

pub fn remove() {
    SINK.write(None);
}

#[doc(hidden)]
pub fn write_line(args: Arguments) {
    if let Some(sink) = SINK.read() {
        sink(args);
    }
}

#[cfg(not(feature = "nodebug"))]
#[macro_export]
macro_rules! dbgln {
    ($($tt:tt)*) => ($crate::debug::write_line(format_args!($($tt)*)));
}

#[cfg(feature = "nodebug")]
#[macro_export]
macro_rules! dbgln {
   ($($tt:tt)*) => {if false {let _ = format_args!($($tt)*);}};
}

#[cfg(test)]
pub mod capture {
    use std::sync::Mutex;
    use std::string::String;
    use std::vec::Vec;

    pub static LINES: Mutex<Vec<String>> = Mutex::new(Vec::new());

    pub fn sink(args: core::fmt::Arguments) {
        if let Ok(mut lines) = LINES.lock() {
            lines.push(std::format!("{args}"));
        }
    }
}

#[cfg(not(feature = "nodebug"))]
#[test]
fn sink_receives_lines() {
    install(capture::sink);
    crate::dbgln!("kept {}", 42);
    remove();
    crate::dbgln!("dropped {}", 43);
    let lines = capture::LINES.lock().unwrap();
    assert!(lines.iter().any(|l| l == "kept 42"));
    assert!(!lines.iter().any(|l| l == "dropped 43"));
}
