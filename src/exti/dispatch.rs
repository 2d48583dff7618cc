//! Interrupt callbacks of the EXTI lines

use core::cell::RefCell;
use core::ptr;

use critical_section::Mutex;

use super::{ExtiRegisters, Line, Register, LINE_COUNT};

/// Function called from the EXTI interrupt handler for its line
pub type LineCallback = fn(Line);

/// One optional callback per EXTI line
///
/// Lines at or above the capacity `N` have no entry: setting their callback
/// does nothing, and they are never dispatched.
///
/// Only [`Exti::init`](super::Exti::init) of a driver built with
/// [`Exti::with_callbacks`](super::Exti::with_callbacks) writes live entries.
/// [`Exti::deinit`](super::Exti::deinit) leaves the entry in place.
pub struct CallbackTable<const N: usize> {
    entries: Mutex<RefCell<[Option<LineCallback>; N]>>,
}

impl<const N: usize> CallbackTable<N> {
    /// Creates a table without any callbacks.
    pub const fn new() -> Self {
        CallbackTable {
            entries: Mutex::new(RefCell::new([None; N])),
        }
    }

    /// Number of lines the table has room for
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Replaces the callback of `line`.
    pub fn set(&self, line: Line, callback: Option<LineCallback>) {
        critical_section::with(|cs| {
            if let Some(entry) = self.entries.borrow(cs).borrow_mut().get_mut(line.index()) {
                *entry = callback;
            }
        });
    }

    /// Returns the callback of `line`.
    pub fn get(&self, line: Line) -> Option<LineCallback> {
        critical_section::with(|cs| {
            self.entries
                .borrow(cs)
                .borrow()
                .get(line.index())
                .copied()
                .flatten()
        })
    }

    /// Calls the callback of every line set in `lines`, lowest line first.
    ///
    /// Returns the lines whose callback was called. Callbacks run outside of
    /// the table's critical section, so they may reconfigure their own line.
    pub fn dispatch(&self, lines: u32) -> u32 {
        let mut called = 0;
        let mut remaining = lines;

        while remaining != 0 {
            let raw = remaining.trailing_zeros() as u8;
            remaining &= remaining - 1;

            // `raw` is a bit position of a `u32`, so it fits the registers
            let line = Line(raw);
            if let Some(callback) = self.get(line) {
                callback(line);
                called |= line.mask();
            }
        }

        called
    }
}

impl<const N: usize> Default for CallbackTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide callback table, read by [`on_interrupt`]
pub static CALLBACKS: CallbackTable<LINE_COUNT> = CallbackTable::new();

/// Services the pending EXTI lines among `lines`.
///
/// Meant to be called from the interrupt handler that owns `lines`. Clears
/// the pending flag of every line in `lines` that has one, then calls that
/// line's callback from `table`. Returns the lines that were pending.
pub fn handle_interrupt<R, const N: usize>(regs: &R, table: &CallbackTable<N>, lines: u32) -> u32
where
    R: ExtiRegisters + ?Sized,
{
    let pr = regs.ptr(Register::Pr);
    // PR is write-1-to-clear, so it's written as a whole word: a bit-band or
    // read-modify-write access would clear every other pending line as well.
    let pending = unsafe { ptr::read_volatile(pr) } & lines;

    if pending != 0 {
        unsafe { ptr::write_volatile(pr, pending) };
        table.dispatch(pending);
    }

    pending
}

/// [`handle_interrupt`] on the device's EXTI with the [`CALLBACKS`] table.
#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
pub fn on_interrupt(lines: u32) -> u32 {
    // Only PR is accessed, with single word writes that can't disturb the
    // owner of the EXTI peripheral.
    let exti = unsafe { crate::pac::Peripherals::steal() }.EXTI;
    handle_interrupt(&exti, &CALLBACKS, lines)
}
