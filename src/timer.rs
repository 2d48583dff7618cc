//! Timers
//!
//! Counter, compare channel and trigger output setup of the general purpose
//! and advanced control timers. Single control bits go through a
//! [`BitAccess`] method, multi-bit fields are read-modify-written.
//!
//! The status register is `rc_w0`: its flags are cleared by writing a word
//! that is zero at their position and one everywhere else, so flags raised by
//! the hardware in the meantime are kept.

use core::ptr;

use cast::u32;
use void::Void;

use crate::bb::{BitAccess, DefaultAccess};
use crate::rcc::{ClockControl, Peripheral};

#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
use crate::{
    pac::{TIM2, TIM3},
    rcc::Rcc,
};

// CR1
const CR1_CEN: u8 = 0;
const CR1_URS: u32 = 1 << 2;
const CR1_DIR: u8 = 4;
const CR1_ARPE: u32 = 1 << 7;

// CR2
const CR2_MMS_SHIFT: u32 = 4;
const CR2_MMS: u32 = 0b111 << CR2_MMS_SHIFT;

// SMCR
const SMCR_MSM: u8 = 7;

// DIER, SR
const UPDATE: u8 = 0;
const CHANNELS: u32 = 0b1_1110;

// EGR
const EGR_UG: u32 = 1 << 0;

// CCMRx, per channel byte
const CCMR_OCPE: u32 = 1 << 3;
const CCMR_OCM_SHIFT: u32 = 4;

// CCER, per channel nibble
const CCER_CCE: u8 = 0;
const CCER_CCP: u8 = 1;
const CCER_OUTPUTS: u32 = 0x5555;

// BDTR
const BDTR_DTG: u32 = 0xff;
const BDTR_MOE: u8 = 15;

/// Largest dead time [`Timer::set_deadtime`] can encode, in sampling clocks
pub const MAX_DEADTIME: u32 = 1008;

/// Timer errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The prescaler is outside of `1..=65536`
    InvalidPrescaler(u32),
    /// The period is zero
    InvalidPeriod,
    /// The dead time is above [`MAX_DEADTIME`]
    InvalidDeadtime(u32),
}

/// The registers of a timer, in address order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimRegister {
    Cr1 = 0,
    Cr2 = 1,
    Smcr = 2,
    Dier = 3,
    Sr = 4,
    Egr = 5,
    Ccmr1 = 6,
    Ccmr2 = 7,
    Ccer = 8,
    Cnt = 9,
    Psc = 10,
    Arr = 11,
    /// Repetition counter, advanced control timers only
    Rcr = 12,
    Ccr1 = 13,
    Ccr2 = 14,
    Ccr3 = 15,
    Ccr4 = 16,
    /// Break and dead time, advanced control timers only
    Bdtr = 17,
}

/// Access to the registers of a timer
///
/// # Safety
///
/// [`TimRegisters::ptr`] must return a pointer to a valid, readable and
/// writable 32-bit register for every [`TimRegister`].
pub unsafe trait TimRegisters {
    /// Returns a pointer to `register`.
    fn ptr(&self, register: TimRegister) -> *mut u32;

    /// Returns the clock gated peripheral these registers belong to.
    fn peripheral(&self) -> Peripheral;
}

unsafe impl<T> TimRegisters for &T
where
    T: TimRegisters + ?Sized,
{
    fn ptr(&self, register: TimRegister) -> *mut u32 {
        (**self).ptr(register)
    }

    fn peripheral(&self) -> Peripheral {
        (**self).peripheral()
    }
}

macro_rules! timers {
    ($($TIM:ident: $peripheral:ident,)+) => {
        $(
            #[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
            unsafe impl TimRegisters for $TIM {
                fn ptr(&self, register: TimRegister) -> *mut u32 {
                    // CR1..BDTR are the first eighteen words of every block
                    ($TIM::ptr() as *mut u32).wrapping_add(register as usize)
                }

                fn peripheral(&self) -> Peripheral {
                    Peripheral::$peripheral
                }
            }

            #[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
            impl TimerExt for $TIM {
                fn timer(self, rcc: &mut Rcc) -> Timer<$TIM> {
                    Timer::new(self, rcc, DefaultAccess::default())
                }
            }
        )+
    }
}

timers! {
    TIM2: Tim2,
    TIM3: Tim3,
}

/// Extension trait that constrains the `TIMx` peripherals
#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
pub trait TimerExt: Sized {
    fn timer(self, rcc: &mut Rcc) -> Timer<Self>;
}

/// Counting direction and center-aligned modes, as CR1 bits 6:4
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CounterMode {
    /// From 0 up to the period
    Up = 0b000,
    /// From the period down to 0
    Down = 0b001,
    /// Up and down, compare flags set while counting down
    CenterAligned1 = 0b010,
    /// Up and down, compare flags set while counting up
    CenterAligned2 = 0b100,
    /// Up and down, compare flags set both ways
    CenterAligned3 = 0b110,
}

/// Current counting direction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Up,
    Down,
}

/// Dead time and input sampling clock division
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockDivision {
    Div1 = 0b00,
    Div2 = 0b01,
    Div4 = 0b10,
}

/// Counter setup
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CounterConfig {
    /// Counter clock division, `1..=65536`
    pub prescaler: u32,
    /// Counter clocks per period, at least 1
    pub period: u32,
    pub mode: CounterMode,
    pub clock_division: ClockDivision,
    /// Periods per update event minus one, advanced control timers only
    pub repetition: u8,
}

impl CounterConfig {
    /// Up-counting setup without clock division or repetition.
    pub fn new(prescaler: u32, period: u32) -> Self {
        CounterConfig {
            prescaler,
            period,
            mode: CounterMode::Up,
            clock_division: ClockDivision::Div1,
            repetition: 0,
        }
    }
}

/// Compare/capture channels
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    C1 = 0,
    C2 = 1,
    C3 = 2,
    C4 = 3,
}

impl Channel {
    fn index(self) -> u8 {
        self as u8
    }

    fn ccr(self) -> TimRegister {
        match self {
            Channel::C1 => TimRegister::Ccr1,
            Channel::C2 => TimRegister::Ccr2,
            Channel::C3 => TimRegister::Ccr3,
            Channel::C4 => TimRegister::Ccr4,
        }
    }

    /// CCMR register and the position of the channel's byte in it
    fn ccmr(self) -> (TimRegister, u32) {
        match self {
            Channel::C1 => (TimRegister::Ccmr1, 0),
            Channel::C2 => (TimRegister::Ccmr1, 8),
            Channel::C3 => (TimRegister::Ccmr2, 0),
            Channel::C4 => (TimRegister::Ccmr2, 8),
        }
    }

    /// Status and interrupt enable bit of the channel
    fn flag(self) -> u8 {
        1 + self.index()
    }

    fn ccer(self, bit: u8) -> u8 {
        4 * self.index() + bit
    }
}

/// Output compare modes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputMode {
    /// Output frozen, the channel only times
    Timing = 0,
    /// Active on match
    Active = 1,
    /// Inactive on match
    Inactive = 2,
    /// Toggled on match
    Toggle = 3,
    ForcedInactive = 4,
    ForcedActive = 5,
    /// Active while the counter is below the pulse
    Pwm1 = 6,
    /// Active while the counter is above the pulse
    Pwm2 = 7,
}

/// Output channel setup
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputConfig {
    pub mode: OutputMode,
    /// The active level of the output is low
    pub active_low: bool,
}

/// Trigger output (TRGO) sources
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Trigger {
    /// The software update generation (EGR.UG)
    Reset = 0,
    /// The counter enable bit (CR1.CEN)
    Enable = 1,
    /// The update event
    Update = 2,
    /// A channel 1 match
    ComparePulse = 3,
    Oc1Ref = 4,
    Oc2Ref = 5,
    Oc3Ref = 6,
    Oc4Ref = 7,
}

/// Master mode setup
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MasterConfig {
    /// Delays the trigger input so slaves start in sync (SMCR.MSM)
    pub master_mode: bool,
    pub trigger: Trigger,
}

/// Encodes `counts` sampling clocks into the BDTR dead time field.
///
/// Counts that the coarser ranges can't represent exactly are rounded down.
pub fn deadtime_bits(counts: u32) -> Result<u8, Error> {
    let bits = match counts {
        0..=127 => counts,
        128..=255 => 0x80 | (counts / 2 - 64),
        256..=511 => 0xc0 | (counts / 8 - 32),
        512..=MAX_DEADTIME => 0xe0 | (counts / 16 - 32),
        _ => return Err(Error::InvalidDeadtime(counts)),
    };

    Ok(bits as u8)
}

/// Hardware timer
pub struct Timer<R, A = DefaultAccess> {
    regs: R,
    access: A,
}

impl<R, A> Timer<R, A>
where
    R: TimRegisters,
    A: BitAccess,
{
    /// Enables the timer's clock through `clock` and takes the registers.
    pub fn new<K>(regs: R, mut clock: K, access: A) -> Self
    where
        K: ClockControl,
    {
        clock.clock_enable(regs.peripheral());

        Timer { regs, access }
    }

    /// Sets up the counter, which stays stopped.
    ///
    /// The new prescaler and period are loaded right away, without raising
    /// the update flag.
    pub fn init(&mut self, config: &CounterConfig) -> Result<(), Error> {
        if config.prescaler == 0 || config.prescaler > 0x1_0000 {
            return Err(Error::InvalidPrescaler(config.prescaler));
        }
        if config.period == 0 {
            return Err(Error::InvalidPeriod);
        }

        // URS keeps the update flag for overflows only
        let cr1 = (u32(config.mode as u8) << CR1_DIR)
            | (u32(config.clock_division as u8) << 8)
            | CR1_ARPE
            | CR1_URS;
        self.store(TimRegister::Cr1, cr1);
        self.store(TimRegister::Psc, config.prescaler - 1);
        self.store(TimRegister::Arr, config.period - 1);
        if config.repetition != 0 {
            self.store(TimRegister::Rcr, u32(config.repetition));
        }
        self.store(TimRegister::Egr, EGR_UG);

        #[cfg(feature = "defmt")]
        defmt::trace!(
            "{}: prescaler {=u32}, period {=u32}",
            self.regs.peripheral(),
            config.prescaler,
            config.period
        );

        Ok(())
    }

    /// Stops the timer and restores the reset state of its control,
    /// interrupt, channel enable and status registers.
    pub fn deinit(&mut self) {
        self.write(TimRegister::Cr1, CR1_CEN, false);
        self.store(TimRegister::Dier, 0);
        self.store(TimRegister::Ccer, 0);
        self.store(TimRegister::Cr1, 0);
        self.store(TimRegister::Sr, 0);
    }

    /// Starts counting.
    pub fn start(&mut self) {
        self.write(TimRegister::Cr1, CR1_CEN, true);
    }

    /// Stops counting, unless an output channel is still enabled.
    pub fn stop(&mut self) {
        if self.load(TimRegister::Ccer) & CCER_OUTPUTS == 0 {
            self.write(TimRegister::Cr1, CR1_CEN, false);
        }
    }

    /// Returns whether the counter runs.
    pub fn is_running(&self) -> bool {
        self.read(TimRegister::Cr1, CR1_CEN)
    }

    /// Returns the direction the counter currently counts in.
    pub fn direction(&self) -> Direction {
        if self.read(TimRegister::Cr1, CR1_DIR) {
            Direction::Down
        } else {
            Direction::Up
        }
    }

    pub fn counter(&self) -> u32 {
        self.load(TimRegister::Cnt)
    }

    pub fn set_counter(&mut self, value: u32) {
        self.store(TimRegister::Cnt, value);
    }

    /// Enables the update interrupt.
    pub fn listen(&mut self) {
        self.write(TimRegister::Dier, UPDATE, true);
    }

    /// Disables the update interrupt.
    pub fn unlisten(&mut self) {
        self.write(TimRegister::Dier, UPDATE, false);
    }

    /// Returns whether an update event happened since the flag was cleared.
    pub fn is_update_pending(&self) -> bool {
        self.load(TimRegister::Sr) & (1 << UPDATE) != 0
    }

    /// Clears the update flag.
    pub fn clear_update(&mut self) {
        self.clear_status(1 << UPDATE);
    }

    /// Waits for the next update event and clears its flag.
    pub fn wait(&mut self) -> nb::Result<(), Void> {
        if self.is_update_pending() {
            self.clear_update();
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    /// Services the update interrupt.
    ///
    /// Clears the update flag and returns `true` if it was raised while the
    /// interrupt is enabled.
    pub fn handle_update_interrupt(&mut self) -> bool {
        let raised = self.load(TimRegister::Sr) & self.load(TimRegister::Dier) & (1 << UPDATE);
        if raised != 0 {
            self.clear_status(raised);
        }
        raised != 0
    }

    /// Services the compare/capture interrupt.
    ///
    /// Clears the flags of the channels whose interrupt is enabled, and
    /// returns them with channel 1 in bit 0.
    pub fn handle_channel_interrupt(&mut self) -> u8 {
        let raised = self.load(TimRegister::Sr) & self.load(TimRegister::Dier) & CHANNELS;
        if raised != 0 {
            self.clear_status(raised);
        }
        (raised >> 1) as u8
    }

    /// Enables the compare/capture interrupt of `channel`.
    pub fn listen_channel(&mut self, channel: Channel) {
        self.write(TimRegister::Dier, channel.flag(), true);
    }

    /// Disables the compare/capture interrupt of `channel`.
    pub fn unlisten_channel(&mut self, channel: Channel) {
        self.write(TimRegister::Dier, channel.flag(), false);
    }

    /// Returns whether `channel` matched or captured since its flag was
    /// cleared.
    pub fn channel_flag(&self, channel: Channel) -> bool {
        self.load(TimRegister::Sr) & (1 << channel.flag()) != 0
    }

    pub fn clear_channel_flag(&mut self, channel: Channel) {
        self.clear_status(1 << channel.flag());
    }

    /// Enables the output of `channel`.
    pub fn enable_channel(&mut self, channel: Channel) {
        self.write(TimRegister::Ccer, channel.ccer(CCER_CCE), true);
    }

    /// Disables the output of `channel`.
    pub fn disable_channel(&mut self, channel: Channel) {
        self.write(TimRegister::Ccer, channel.ccer(CCER_CCE), false);
    }

    /// Sets the compare value of `channel`.
    pub fn set_pulse(&mut self, channel: Channel, pulse: u32) {
        self.store(channel.ccr(), pulse);
    }

    /// Returns the compare or captured value of `channel`.
    pub fn pulse(&self, channel: Channel) -> u32 {
        self.load(channel.ccr())
    }

    /// Configures `channel` as an output compare channel.
    ///
    /// The compare value is preloaded, a new pulse takes effect on the next
    /// update event.
    pub fn output_init(&mut self, channel: Channel, config: &OutputConfig) {
        let (ccmr, shift) = channel.ccmr();
        let bits = (u32(config.mode as u8) << CCMR_OCM_SHIFT) | CCMR_OCPE;
        self.modify(ccmr, 0xff << shift, bits << shift);

        self.write(TimRegister::Ccer, channel.ccer(CCER_CCP), config.active_low);
    }

    /// Enables the output of `channel` and starts the counter.
    pub fn output_start(&mut self, channel: Channel) {
        self.enable_channel(channel);
        self.start();
    }

    /// Disables the output of `channel`, and stops the counter if it was the
    /// last enabled one.
    pub fn output_stop(&mut self, channel: Channel) {
        self.disable_channel(channel);
        self.stop();
    }

    /// Connects the outputs of an advanced control timer to their pins (MOE).
    pub fn enable_outputs(&mut self) {
        self.write(TimRegister::Bdtr, BDTR_MOE, true);
    }

    pub fn disable_outputs(&mut self) {
        self.write(TimRegister::Bdtr, BDTR_MOE, false);
    }

    /// Sets the dead time of complementary outputs, in sampling clocks.
    pub fn set_deadtime(&mut self, counts: u32) -> Result<(), Error> {
        let bits = deadtime_bits(counts)?;
        self.modify(TimRegister::Bdtr, BDTR_DTG, u32(bits));
        Ok(())
    }

    /// Selects the trigger output and master/slave synchronization.
    pub fn master_config(&mut self, config: &MasterConfig) {
        self.modify(
            TimRegister::Cr2,
            CR2_MMS,
            u32(config.trigger as u8) << CR2_MMS_SHIFT,
        );
        self.write(TimRegister::Smcr, SMCR_MSM, config.master_mode);
    }

    /// Releases the registers
    pub fn free(self) -> R {
        self.regs
    }

    fn clear_status(&mut self, flags: u32) {
        self.store(TimRegister::Sr, !flags);
    }

    fn write(&self, register: TimRegister, bit: u8, value: bool) {
        unsafe { self.access.write(self.regs.ptr(register), bit, value) }
    }

    fn read(&self, register: TimRegister, bit: u8) -> bool {
        unsafe { self.access.read(self.regs.ptr(register), bit) }
    }

    fn load(&self, register: TimRegister) -> u32 {
        unsafe { ptr::read_volatile(self.regs.ptr(register)) }
    }

    fn store(&self, register: TimRegister, value: u32) {
        unsafe { ptr::write_volatile(self.regs.ptr(register), value) }
    }

    fn modify(&self, register: TimRegister, mask: u32, bits: u32) {
        let value = (self.load(register) & !mask) | (bits & mask);
        self.store(register, value);
    }
}
