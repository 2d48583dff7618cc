//! External interrupt/event controller
//!
//! Every EXTI line has one bit in each of the interrupt mask (IMR), event mask
//! (EMR), rising trigger (RTSR) and falling trigger (FTSR) registers.
//! [`Exti::init`] writes all four bits of a line from a [`Config`],
//! [`Exti::deinit`] clears them again.
//!
//! The register bits are written through a [`BitAccess`] method picked at
//! compile time. Neither method is synchronized with interrupt handlers by
//! default: with [`Masked`](crate::bb::Masked) access a handler that changes
//! the same registers between the read and the write of a bit update loses
//! its change. Call `init`/`deinit` with interrupts disabled, or enable the
//! `critical-section-config` feature.
//!
//! Drivers built with [`Exti::with_callbacks`] also record a callback per line
//! in a [`CallbackTable`], which the interrupt handlers dispatch from through
//! [`handle_interrupt`].

mod dispatch;
mod line;

pub use dispatch::{handle_interrupt, CallbackTable, LineCallback, CALLBACKS};
#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
pub use dispatch::on_interrupt;
#[cfg(any(feature = "stm32f3", feature = "stm32f4"))]
pub use line::ConfigurableLine;
pub use line::{ExtiLine, GpioLine, Line};

use core::ptr;

use crate::bb::{BitAccess, DefaultAccess};
use crate::rcc::{ClockControl, Peripheral};

#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
use crate::{pac::EXTI, rcc::{ExtiClock, Rcc}};

/// Number of EXTI lines of the selected family
#[cfg(feature = "stm32f0")]
pub const LINES: u8 = 16;
/// Number of EXTI lines of the selected family
#[cfg(feature = "stm32f3")]
pub const LINES: u8 = 32;
/// Number of EXTI lines of the selected family
#[cfg(feature = "stm32f4")]
pub const LINES: u8 = 23;
/// Number of EXTI lines of the selected family
#[cfg(not(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4")))]
pub const LINES: u8 = 32;

/// Capacity of [`CALLBACKS`]
pub const LINE_COUNT: usize = LINES as usize;

/// EXTI errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The selected family has no line with this number
    InvalidLine(u8),
}

/// The registers of one EXTI line bank, in address order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    /// Interrupt mask
    Imr = 0,
    /// Event mask
    Emr = 1,
    /// Rising trigger selection
    Rtsr = 2,
    /// Falling trigger selection
    Ftsr = 3,
    /// Software interrupt event
    Swier = 4,
    /// Pending (write 1 to clear)
    Pr = 5,
}

/// Access to the registers of an EXTI line bank
///
/// # Safety
///
/// [`ExtiRegisters::ptr`] must return a pointer to a valid, readable and
/// writable 32-bit register for every [`Register`], and the block must not be
/// accessed through other means while a driver owns it.
pub unsafe trait ExtiRegisters {
    /// Returns a pointer to `register`.
    fn ptr(&self, register: Register) -> *mut u32;
}

unsafe impl<T> ExtiRegisters for &T
where
    T: ExtiRegisters + ?Sized,
{
    fn ptr(&self, register: Register) -> *mut u32 {
        (**self).ptr(register)
    }
}

#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
unsafe impl ExtiRegisters for EXTI {
    fn ptr(&self, register: Register) -> *mut u32 {
        // IMR..PR (IMR1..PR1 on STM32F3) are the first six words of the block
        (EXTI::ptr() as *mut u32).wrapping_add(register as usize)
    }
}

/// Whether a line requests an interrupt, an event, both or neither
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Reaction {
    None = 0b00,
    Interrupt = 0b01,
    Event = 0b10,
    InterruptAndEvent = 0b11,
}

impl Reaction {
    /// Combines the interrupt and event requests.
    pub fn from_flags(interrupt: bool, event: bool) -> Self {
        match (interrupt, event) {
            (false, false) => Reaction::None,
            (true, false) => Reaction::Interrupt,
            (false, true) => Reaction::Event,
            (true, true) => Reaction::InterruptAndEvent,
        }
    }

    /// Returns whether an interrupt is requested.
    pub fn interrupt(self) -> bool {
        self as u8 & 0b01 != 0
    }

    /// Returns whether an event is requested.
    pub fn event(self) -> bool {
        self as u8 & 0b10 != 0
    }
}

impl Default for Reaction {
    fn default() -> Self {
        Reaction::None
    }
}

/// Signal edges a line triggers on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Edge {
    None = 0b00,
    Rising = 0b01,
    Falling = 0b10,
    Both = 0b11,
}

impl Edge {
    /// Combines the rising and falling edge selections.
    pub fn from_flags(rising: bool, falling: bool) -> Self {
        match (rising, falling) {
            (false, false) => Edge::None,
            (true, false) => Edge::Rising,
            (false, true) => Edge::Falling,
            (true, true) => Edge::Both,
        }
    }

    /// Returns whether rising edges trigger.
    pub fn rising(self) -> bool {
        self as u8 & 0b01 != 0
    }

    /// Returns whether falling edges trigger.
    pub fn falling(self) -> bool {
        self as u8 & 0b10 != 0
    }
}

impl Default for Edge {
    fn default() -> Self {
        Edge::None
    }
}

/// EXTI line setup
#[derive(Clone, Copy, Debug, Default)]
pub struct Config {
    pub reaction: Reaction,
    pub edge: Edge,
    /// Called from the interrupt handler, if `reaction` requests interrupts.
    /// Only used by drivers built with [`Exti::with_callbacks`].
    pub callback: Option<LineCallback>,
}

impl Config {
    /// Creates a setup without a callback.
    pub fn new(reaction: Reaction, edge: Edge) -> Self {
        Config {
            reaction,
            edge,
            callback: None,
        }
    }

    /// Sets the callback of the line.
    pub fn callback(mut self, callback: LineCallback) -> Self {
        self.callback = Some(callback);
        self
    }
}

/// Where a driver keeps the line callbacks
pub trait CallbackStore {
    /// Records the callback of `line`, `None` removes it.
    fn record(&self, line: Line, callback: Option<LineCallback>);
}

/// Drops the callbacks
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCallbacks;

impl CallbackStore for NoCallbacks {
    fn record(&self, _: Line, _: Option<LineCallback>) {}
}

impl<const N: usize> CallbackStore for &CallbackTable<N> {
    fn record(&self, line: Line, callback: Option<LineCallback>) {
        self.set(line, callback);
    }
}

#[cfg(feature = "critical-section-config")]
fn configure<T>(f: impl FnOnce() -> T) -> T {
    critical_section::with(|_| f())
}

#[cfg(not(feature = "critical-section-config"))]
fn configure<T>(f: impl FnOnce() -> T) -> T {
    f()
}

/// EXTI line configurator
pub struct Exti<R, K, A = DefaultAccess, C = NoCallbacks> {
    regs: R,
    clock: K,
    access: A,
    callbacks: C,
}

impl<R, K, A> Exti<R, K, A, NoCallbacks>
where
    R: ExtiRegisters,
    K: ClockControl,
    A: BitAccess,
{
    /// Creates a configurator that ignores the callbacks of [`Config`].
    pub fn new(regs: R, clock: K, access: A) -> Self {
        Exti {
            regs,
            clock,
            access,
            callbacks: NoCallbacks,
        }
    }

    /// Records the callbacks of [`Config`] in `callbacks` from now on.
    pub fn with_callbacks<C>(self, callbacks: C) -> Exti<R, K, A, C>
    where
        C: CallbackStore,
    {
        Exti {
            regs: self.regs,
            clock: self.clock,
            access: self.access,
            callbacks,
        }
    }
}

impl<R, K, A, C> Exti<R, K, A, C>
where
    R: ExtiRegisters,
    K: ClockControl,
    A: BitAccess,
    C: CallbackStore,
{
    /// Configures `line` according to `config`.
    ///
    /// Interrupt and event masks follow `config.reaction`, trigger selections
    /// follow `config.edge`. The line's callback is recorded when interrupts
    /// are requested, and removed otherwise.
    pub fn init<L>(&mut self, line: L, config: &Config)
    where
        L: Into<Line>,
    {
        let line = line.into();
        let reaction = config.reaction;
        let edge = config.edge;

        self.clock.clock_enable(Peripheral::Exti);

        configure(|| {
            self.write(Register::Imr, line, reaction.interrupt());
            self.write(Register::Emr, line, reaction.event());
            self.write(Register::Rtsr, line, edge.rising());
            self.write(Register::Ftsr, line, edge.falling());
        });

        let callback = if reaction.interrupt() {
            config.callback
        } else {
            None
        };
        self.callbacks.record(line, callback);

        #[cfg(feature = "defmt")]
        defmt::trace!("EXTI{=u8}: {} on {}", line.raw(), reaction, edge);
    }

    /// Restores the default (cleared) state of `line`.
    ///
    /// The line's callback, if any, stays recorded.
    pub fn deinit<L>(&mut self, line: L)
    where
        L: Into<Line>,
    {
        let line = line.into();

        configure(|| {
            self.write(Register::Imr, line, false);
            self.write(Register::Emr, line, false);
            self.write(Register::Rtsr, line, false);
            self.write(Register::Ftsr, line, false);
        });

        #[cfg(feature = "defmt")]
        defmt::trace!("EXTI{=u8}: cleared", line.raw());
    }

    /// Returns the current reaction and edge selection of `line`.
    pub fn config<L>(&self, line: L) -> (Reaction, Edge)
    where
        L: Into<Line>,
    {
        let line = line.into();

        (
            Reaction::from_flags(self.read(Register::Imr, line), self.read(Register::Emr, line)),
            Edge::from_flags(self.read(Register::Rtsr, line), self.read(Register::Ftsr, line)),
        )
    }

    /// Triggers `line` from software.
    pub fn pend<L>(&mut self, line: L)
    where
        L: Into<Line>,
    {
        self.write(Register::Swier, line.into(), true);
    }

    /// Returns whether `line` has a pending trigger.
    pub fn is_pending<L>(&self, line: L) -> bool
    where
        L: Into<Line>,
    {
        self.pending() & line.into().mask() != 0
    }

    /// Returns the pending lines.
    pub fn pending(&self) -> u32 {
        unsafe { ptr::read_volatile(self.regs.ptr(Register::Pr)) }
    }

    /// Clears the pending trigger of `line`.
    pub fn clear_pending<L>(&mut self, line: L)
    where
        L: Into<Line>,
    {
        // Write 1 to clear, any other pending line is written 0 and kept
        unsafe { ptr::write_volatile(self.regs.ptr(Register::Pr), line.into().mask()) }
    }

    /// Releases the registers and the clock collaborator.
    pub fn free(self) -> (R, K) {
        (self.regs, self.clock)
    }

    fn write(&self, register: Register, line: Line, value: bool) {
        // `Line` keeps the bit inside the register, `R` vouches for the pointer
        unsafe {
            self.access
                .write(self.regs.ptr(register), line.raw(), value)
        }
    }

    fn read(&self, register: Register, line: Line) -> bool {
        unsafe { self.access.read(self.regs.ptr(register), line.raw()) }
    }
}

/// Extension trait that constrains the `EXTI` peripheral
#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
pub trait ExtiExt {
    /// Returns the configurator of the family, without line callbacks.
    fn constrain(self, rcc: &Rcc) -> Exti<EXTI, ExtiClock>;
}

#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
impl ExtiExt for EXTI {
    fn constrain(self, rcc: &Rcc) -> Exti<EXTI, ExtiClock> {
        Exti::new(self, rcc.exti_clock(), DefaultAccess::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bb::Masked;
    use crate::mock::{Bank, Clock};
    use core::sync::atomic::{AtomicU32, Ordering};

    static CALLED: AtomicU32 = AtomicU32::new(0);

    fn record(line: Line) {
        CALLED.fetch_or(line.mask(), Ordering::SeqCst);
    }

    fn line(raw: u8) -> Line {
        Line::new(raw).unwrap()
    }

    fn bits(bank: &Bank<6>, raw: u8) -> [bool; 4] {
        let mask = 1 << raw;
        [
            bank.load(Register::Imr as usize) & mask != 0,
            bank.load(Register::Emr as usize) & mask != 0,
            bank.load(Register::Rtsr as usize) & mask != 0,
            bank.load(Register::Ftsr as usize) & mask != 0,
        ]
    }

    #[test]
    fn reaction_and_edge_flags() {
        assert_eq!(Reaction::from_flags(true, true), Reaction::InterruptAndEvent);
        assert!(Reaction::Interrupt.interrupt() && !Reaction::Interrupt.event());
        assert!(!Reaction::Event.interrupt() && Reaction::Event.event());
        assert_eq!(Edge::from_flags(false, true), Edge::Falling);
        assert!(Edge::Both.rising() && Edge::Both.falling());
        assert!(!Edge::None.rising() && !Edge::None.falling());
    }

    #[test]
    fn init_writes_all_four_bits() {
        let bank = Bank::<6>::new();
        let mut clock = Clock::default();
        let mut exti = Exti::new(&bank, &mut clock, Masked);

        exti.init(line(3), &Config::new(Reaction::Interrupt, Edge::Rising));
        assert_eq!(bits(&bank, 3), [true, false, true, false]);

        exti.init(line(3), &Config::new(Reaction::Event, Edge::Falling));
        assert_eq!(bits(&bank, 3), [false, true, false, true]);

        exti.init(line(3), &Config::new(Reaction::None, Edge::Both));
        assert_eq!(bits(&bank, 3), [false, false, true, true]);
        assert_eq!(exti.config(line(3)), (Reaction::None, Edge::Both));
    }

    #[test]
    fn init_requests_the_clock_every_time() {
        let bank = Bank::<6>::new();
        let mut clock = Clock::default();
        {
            let mut exti = Exti::new(&bank, &mut clock, Masked);
            exti.init(line(0), &Config::default());
            exti.init(line(1), &Config::default());
            exti.deinit(line(0));
        }

        assert_eq!(clock.exti, 2);
        assert_eq!(clock.pwr, 0);
    }

    #[test]
    fn deinit_only_touches_its_line() {
        let bank = Bank::<6>::new();
        for register in 0..4 {
            bank.store(register, 0xffff_ffff);
        }
        let mut exti = Exti::new(&bank, (), Masked);

        exti.deinit(line(7));

        for register in 0..4 {
            assert_eq!(bank.load(register), !(1 << 7));
        }
        assert_eq!(exti.config(line(7)), (Reaction::None, Edge::None));
        assert_eq!(
            exti.config(line(8)),
            (Reaction::InterruptAndEvent, Edge::Both)
        );
    }

    #[test]
    fn bit_band_leaves_the_same_state() {
        let masked = Bank::<6>::new();
        let banded = Bank::<6>::new();
        let mut a = Exti::new(&masked, (), Masked);
        let mut b = Exti::new(&banded, (), banded.bit_band());

        let steps = [
            (5, Config::new(Reaction::InterruptAndEvent, Edge::Falling)),
            (0, Config::new(Reaction::Event, Edge::Both)),
            (31, Config::new(Reaction::Interrupt, Edge::Rising)),
            (5, Config::new(Reaction::Interrupt, Edge::None)),
        ];
        for (raw, config) in steps.iter() {
            a.init(line(*raw), config);
            b.init(line(*raw), config);
        }
        a.deinit(line(0));
        b.deinit(line(0));

        for register in 0..4 {
            assert_eq!(masked.load(register), banded.banded(register));
        }
        assert_eq!(a.config(line(31)), b.config(line(31)));
    }

    #[test]
    fn callbacks_follow_the_interrupt_request() {
        let bank = Bank::<6>::new();
        let table = CallbackTable::<32>::new();
        let mut exti = Exti::new(&bank, (), bank.bit_band()).with_callbacks(&table);

        exti.init(
            line(3),
            &Config::new(Reaction::Interrupt, Edge::Rising).callback(record),
        );
        assert!(table.get(line(3)).is_some());
        assert_eq!(table.dispatch(line(3).mask()), line(3).mask());
        assert_ne!(CALLED.load(Ordering::SeqCst) & line(3).mask(), 0);

        exti.init(
            line(3),
            &Config::new(Reaction::None, Edge::Both).callback(record),
        );
        assert!(table.get(line(3)).is_none());
        assert_eq!(bank.banded(Register::Rtsr as usize), line(3).mask());
        assert_eq!(bank.banded(Register::Ftsr as usize), line(3).mask());
    }

    #[test]
    fn deinit_keeps_the_callback() {
        let bank = Bank::<6>::new();
        let table = CallbackTable::<32>::new();
        let mut exti = Exti::new(&bank, (), Masked).with_callbacks(&table);

        exti.init(
            line(9),
            &Config::new(Reaction::InterruptAndEvent, Edge::Falling).callback(record),
        );
        exti.deinit(line(9));

        assert_eq!(bits(&bank, 9), [false; 4]);
        assert!(table.get(line(9)).is_some());
    }

    #[test]
    fn plain_configurator_ignores_callbacks() {
        let bank = Bank::<6>::new();
        let mut exti = Exti::new(&bank, (), Masked);

        exti.init(
            GpioLine::from_raw_line(2).unwrap(),
            &Config::new(Reaction::Interrupt, Edge::Rising).callback(record),
        );

        assert_eq!(bits(&bank, 2), [true, false, true, false]);
        assert!(CALLBACKS.get(line(2)).is_none());
    }

    #[test]
    fn software_trigger_and_pending_flags() {
        let bank = Bank::<6>::new();
        let mut exti = Exti::new(&bank, (), Masked);

        exti.pend(line(4));
        assert_eq!(bank.load(Register::Swier as usize), 1 << 4);

        bank.store(Register::Pr as usize, (1 << 4) | (1 << 1));
        assert!(exti.is_pending(line(4)));
        assert!(!exti.is_pending(line(5)));
        assert_eq!(exti.pending(), (1 << 4) | (1 << 1));

        exti.clear_pending(line(4));
        // Only the cleared line is written as 1
        assert_eq!(bank.load(Register::Pr as usize), 1 << 4);
    }

    #[test]
    #[cfg(feature = "critical-section-config")]
    fn configures_inside_a_critical_section() {
        let bank = Bank::<6>::new();
        let table = CallbackTable::<32>::new();
        let mut exti = Exti::new(&bank, (), Masked).with_callbacks(&table);

        // The table takes its own critical section after the register writes
        exti.init(
            line(11),
            &Config::new(Reaction::Interrupt, Edge::Falling).callback(record),
        );
        assert_eq!(bits(&bank, 11), [true, false, false, true]);
        assert!(table.get(line(11)).is_some());

        exti.deinit(line(11));
        assert_eq!(bits(&bank, 11), [false; 4]);
    }

    #[test]
    fn small_table_skips_lines_it_has_no_room_for() {
        let bank = Bank::<6>::new();
        let table = CallbackTable::<16>::new();
        let mut exti = Exti::new(&bank, (), Masked).with_callbacks(&table);

        exti.init(
            line(20),
            &Config::new(Reaction::Interrupt, Edge::Rising).callback(record),
        );

        assert_eq!(bits(&bank, 20), [true, false, true, false]);
        assert!(table.get(line(20)).is_none());
    }
}
