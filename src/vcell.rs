//! Sample arrays, cursors and the ready flag are written by the conversion
//! handler and read by the foreground loop through these cells.

use core::cell::UnsafeCell;

/// Volatile cell for values shared between the conversion handler and the
/// foreground loop.  Every access is a single volatile read or write.
#[repr(transparent)]
pub struct VCell<T>(UnsafeCell<T>);

// Single core.  Accesses are volatile and multi-field consistency is the
// job of cpu::Suppressed.
unsafe impl<T: Send> Sync for VCell<T> {}

impl<T: Copy> VCell<T> {
    #[inline(always)]
    pub const fn new(v: T) -> Self {Self(UnsafeCell::new(v))}

    #[inline(always)]
    pub fn read(&self) -> T {
        unsafe {core::ptr::read_volatile(self.as_ptr())}
    }

    #[inline(always)]
    pub fn write(&self, v: T) {
        unsafe {
            core::ptr::write_volatile(self.as_ptr(), v);
        }
    }

    #[inline(always)]
    pub fn as_ptr(&self) -> *mut T {
        self.0.get()
    }
}

impl<T: Copy> From<T> for VCell<T> {
    fn from(v: T) -> VCell<T> {VCell::new(v)}
}

#[test]
fn vcell_read_write() {
    let c = VCell::new(3u16);
    assert_eq!(c.read(), 3);
    c.write(1023);
    assert_eq!(c.read(), 1023);
    let b: VCell<bool> = true.into();
    assert!(b.read());
}
