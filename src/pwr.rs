//! Interface to the Power control (PWR) peripheral
//!
//! Single control bits go through the same [`BitAccess`] method as the EXTI
//! driver. The low-power modes are entered through [`PowerMode`] values
//! returned by [`Pwr::sleep_mode`], [`Pwr::stop_mode`] and
//! [`Pwr::standby_mode`].

use cortex_m::{asm, peripheral::SCB};
#[cfg(any(feature = "stm32f4", not(any(feature = "stm32f0", feature = "stm32f3"))))]
use void::Void;

use crate::bb::{BitAccess, DefaultAccess};
use crate::rcc::{ClockControl, Peripheral};

#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
use crate::{pac::PWR, rcc::Rcc};

// CR
const CR_LPDS: u8 = 0;
const CR_PDDS: u8 = 1;
const CR_DBP: u8 = 8;
#[cfg(any(feature = "stm32f4", not(any(feature = "stm32f0", feature = "stm32f3"))))]
const CR_FPDS: u8 = 9;
#[cfg(any(feature = "stm32f4", not(any(feature = "stm32f0", feature = "stm32f3"))))]
const CR_VOS: u8 = 14;

// CSR
const CSR_EWUP: u8 = 8;
#[cfg(any(feature = "stm32f4", not(any(feature = "stm32f0", feature = "stm32f3"))))]
const CSR_BRE: u8 = 9;

// SCB_SCR
const SCR_SEVONPEND: u32 = 1 << 4;

/// Number of reads of a ready flag before giving up
pub const READY_POLLS: u32 = 0x0001_0000;

/// PWR errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A ready flag did not follow its control bit in time
    Timeout,
}

/// PWR registers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PwrRegister {
    /// Power control register
    Cr = 0,
    /// Power control/status register
    Csr = 1,
}

/// Access to the PWR registers
///
/// # Safety
///
/// [`PwrRegisters::ptr`] must return a pointer to a valid, readable and
/// writable 32-bit register for every [`PwrRegister`].
pub unsafe trait PwrRegisters {
    /// Returns a pointer to `register`.
    fn ptr(&self, register: PwrRegister) -> *mut u32;
}

unsafe impl<T> PwrRegisters for &T
where
    T: PwrRegisters + ?Sized,
{
    fn ptr(&self, register: PwrRegister) -> *mut u32 {
        (**self).ptr(register)
    }
}

#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
unsafe impl PwrRegisters for PWR {
    fn ptr(&self, register: PwrRegister) -> *mut u32 {
        (PWR::ptr() as *mut u32).wrapping_add(register as usize)
    }
}

/// Status flags in CSR
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Flag {
    /// A wakeup event was received
    WakeUp = 0,
    /// The device was in Standby mode
    Standby = 1,
    /// VDD is below the PVD threshold
    PvdOutput = 2,
    #[cfg(any(feature = "stm32f4", not(any(feature = "stm32f0", feature = "stm32f3"))))]
    BackupRegulatorReady = 3,
    #[cfg(any(feature = "stm32f4", not(any(feature = "stm32f0", feature = "stm32f3"))))]
    VoltageScalingReady = 14,
}

/// Write-1-to-clear bits in CR, one per clearable [`Flag`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClearFlag {
    /// Clears [`Flag::WakeUp`] (CWUF)
    WakeUp = 2,
    /// Clears [`Flag::Standby`] (CSBF)
    Standby = 3,
}

/// Wakeup pins that can leave Standby mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeupPin {
    Pin1 = 0,
    #[cfg(not(feature = "stm32f4"))]
    Pin2 = 1,
    #[cfg(not(feature = "stm32f4"))]
    Pin3 = 2,
    #[cfg(any(feature = "stm32f0", not(any(feature = "stm32f3", feature = "stm32f4"))))]
    Pin4 = 3,
    #[cfg(any(feature = "stm32f0", not(any(feature = "stm32f3", feature = "stm32f4"))))]
    Pin5 = 4,
    #[cfg(any(feature = "stm32f0", not(any(feature = "stm32f3", feature = "stm32f4"))))]
    Pin6 = 5,
    #[cfg(any(feature = "stm32f0", not(any(feature = "stm32f3", feature = "stm32f4"))))]
    Pin7 = 6,
    #[cfg(any(feature = "stm32f0", not(any(feature = "stm32f3", feature = "stm32f4"))))]
    Pin8 = 7,
}

/// Main regulator output voltage, selected with CR.VOS
///
/// Only the scales of the STM32F405/407 are offered.
#[cfg(any(feature = "stm32f4", not(any(feature = "stm32f0", feature = "stm32f3"))))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VoltageScale {
    /// Up to 168 MHz
    Scale1,
    /// Up to 144 MHz
    Scale2,
}

/// Regulator state during Stop mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Regulator {
    Main,
    LowPower,
}

/// How the core waits in a low-power mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeOn {
    /// Wait for interrupt (WFI)
    Interrupt,
    /// Wait for event (WFE)
    Event,
}

/// Entry point to the PWR API
pub struct Pwr<R, A = DefaultAccess> {
    regs: R,
    access: A,
}

impl<R, A> Pwr<R, A>
where
    R: PwrRegisters,
    A: BitAccess,
{
    /// Enables the PWR clock through `clock` and takes the registers.
    pub fn new<K>(regs: R, mut clock: K, access: A) -> Self
    where
        K: ClockControl,
    {
        // No reset here, the backup domain must survive driver creation
        clock.clock_enable(Peripheral::Pwr);

        Pwr { regs, access }
    }

    /// Enables or disables write access to the backup domain.
    pub fn backup_access(&mut self, enable: bool) {
        self.write(PwrRegister::Cr, CR_DBP, enable);
    }

    /// Returns whether `flag` is set.
    pub fn flag(&self, flag: Flag) -> bool {
        self.read(PwrRegister::Csr, flag as u8)
    }

    /// Clears a status flag.
    pub fn clear_flag(&mut self, flag: ClearFlag) {
        self.write(PwrRegister::Cr, flag as u8, true);
    }

    /// Lets a rising edge on `pin` wake the device from Standby mode.
    pub fn enable_wakeup_pin(&mut self, pin: WakeupPin) {
        self.write(PwrRegister::Csr, CSR_EWUP + pin as u8, true);
    }

    /// Returns `pin` to its GPIO function.
    pub fn disable_wakeup_pin(&mut self, pin: WakeupPin) {
        self.write(PwrRegister::Csr, CSR_EWUP + pin as u8, false);
    }

    /// Configures Stop mode, to be entered on the next deep sleep.
    pub fn prepare_stop(&mut self, regulator: Regulator) {
        self.write(PwrRegister::Cr, CR_PDDS, false);
        self.write(PwrRegister::Cr, CR_LPDS, regulator == Regulator::LowPower);
    }

    /// Configures Standby mode, to be entered on the next deep sleep.
    ///
    /// A set wakeup flag would wake the device right away, so it's cleared.
    pub fn prepare_standby(&mut self) {
        self.write(PwrRegister::Cr, CR_PDDS, true);
        self.clear_flag(ClearFlag::WakeUp);
    }

    /// Returns a struct that can be used to enter Sleep mode
    pub fn sleep_mode<'r>(&'r mut self, scb: &'r mut SCB, wake_on: WakeOn) -> SleepMode<'r> {
        SleepMode { scb, wake_on }
    }

    /// Returns a struct that can be used to enter Stop mode
    pub fn stop_mode<'r>(
        &'r mut self,
        scb: &'r mut SCB,
        wake_on: WakeOn,
        regulator: Regulator,
    ) -> StopMode<'r, R, A> {
        StopMode {
            pwr: self,
            scb,
            wake_on,
            regulator,
        }
    }

    /// Returns a struct that can be used to enter Standby mode
    pub fn standby_mode<'r>(&'r mut self, scb: &'r mut SCB) -> StandbyMode<'r, R, A> {
        StandbyMode { pwr: self, scb }
    }

    /// Releases the registers
    pub fn free(self) -> R {
        self.regs
    }

    fn write(&self, register: PwrRegister, bit: u8, value: bool) {
        unsafe { self.access.write(self.regs.ptr(register), bit, value) }
    }

    fn read(&self, register: PwrRegister, bit: u8) -> bool {
        unsafe { self.access.read(self.regs.ptr(register), bit) }
    }
}

#[cfg(any(feature = "stm32f4", not(any(feature = "stm32f0", feature = "stm32f3"))))]
impl<R, A> Pwr<R, A>
where
    R: PwrRegisters,
    A: BitAccess,
{
    /// Powers the flash down in Stop mode, or keeps it on.
    pub fn flash_power_down(&mut self, enable: bool) {
        self.write(PwrRegister::Cr, CR_FPDS, enable);
    }

    /// Switches the backup SRAM regulator on or off.
    ///
    /// Waits for the regulator ready flag to follow, backup access must be
    /// enabled first.
    pub fn backup_regulator(&mut self, enable: bool) -> Result<(), Error> {
        self.write(PwrRegister::Csr, CSR_BRE, enable);
        self.wait_for(|pwr| pwr.backup_regulator_ready(enable))
    }

    /// Selects the main regulator output voltage.
    ///
    /// Waits for the voltage scaling ready flag.
    pub fn set_voltage_scale(&mut self, scale: VoltageScale) -> Result<(), Error> {
        self.write(PwrRegister::Cr, CR_VOS, scale == VoltageScale::Scale1);
        self.wait_for(|pwr| {
            if pwr.flag(Flag::VoltageScalingReady) {
                Ok(())
            } else {
                Err(nb::Error::WouldBlock)
            }
        })
    }

    /// Returns the selected main regulator output voltage.
    pub fn voltage_scale(&self) -> VoltageScale {
        if self.read(PwrRegister::Cr, CR_VOS) {
            VoltageScale::Scale1
        } else {
            VoltageScale::Scale2
        }
    }

    fn backup_regulator_ready(&self, enabled: bool) -> nb::Result<(), Void> {
        if self.flag(Flag::BackupRegulatorReady) == enabled {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    fn wait_for(&self, ready: impl Fn(&Self) -> nb::Result<(), Void>) -> Result<(), Error> {
        for _ in 0..READY_POLLS {
            match ready(self) {
                Ok(()) => return Ok(()),
                Err(nb::Error::WouldBlock) => {}
                Err(nb::Error::Other(e)) => void::unreachable(e),
            }
        }

        #[cfg(feature = "defmt")]
        defmt::warn!("PWR: ready flag timeout");

        Err(Error::Timeout)
    }
}

/// Extension trait that constrains the `PWR` peripheral
#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
pub trait PwrExt {
    fn constrain(self, rcc: &mut Rcc) -> Pwr<PWR>;
}

#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
impl PwrExt for PWR {
    fn constrain(self, rcc: &mut Rcc) -> Pwr<PWR> {
        Pwr::new(self, rcc, DefaultAccess::default())
    }
}

/// Keeps the core asleep after the last interrupt handler returns, or not.
pub fn set_sleep_on_exit(scb: &mut SCB, enable: bool) {
    if enable {
        scb.set_sleeponexit();
    } else {
        scb.clear_sleeponexit();
    }
}

/// Makes pending interrupts wake up WFE, even disabled ones.
pub fn set_sev_on_pend(scb: &mut SCB, enable: bool) {
    unsafe {
        scb.scr.modify(|scr| {
            if enable {
                scr | SCR_SEVONPEND
            } else {
                scr & !SCR_SEVONPEND
            }
        });
    }
}

fn wait(wake_on: WakeOn) {
    asm::dsb();
    match wake_on {
        WakeOn::Interrupt => asm::wfi(),
        WakeOn::Event => {
            // Consume a stale event first, so the second WFE really waits
            asm::sev();
            asm::wfe();
            asm::wfe();
        }
    }
}

/// Implemented for all low-power modes
pub trait PowerMode {
    /// Enters the low-power mode
    fn enter(&mut self);
}

/// Sleep mode
///
/// You can get an instance of this struct by calling [`Pwr::sleep_mode`].
///
/// The `PowerMode` implementation blocks until the core wakes up again.
pub struct SleepMode<'r> {
    scb: &'r mut SCB,
    wake_on: WakeOn,
}

impl PowerMode for SleepMode<'_> {
    fn enter(&mut self) {
        self.scb.clear_sleepdeep();
        wait(self.wake_on);
    }
}

/// Stop mode
///
/// You can get an instance of this struct by calling [`Pwr::stop_mode`].
///
/// The `PowerMode` implementation blocks until an EXTI line wakes the device
/// up. The system clock is the HSI afterwards.
pub struct StopMode<'r, R, A> {
    pwr: &'r mut Pwr<R, A>,
    scb: &'r mut SCB,
    wake_on: WakeOn,
    regulator: Regulator,
}

impl<R, A> PowerMode for StopMode<'_, R, A>
where
    R: PwrRegisters,
    A: BitAccess,
{
    fn enter(&mut self) {
        self.pwr.prepare_stop(self.regulator);
        self.scb.set_sleepdeep();

        wait(self.wake_on);

        self.scb.clear_sleepdeep();
    }
}

/// Standby mode
///
/// You can get an instance of this struct by calling [`Pwr::standby_mode`].
///
/// Waking up from Standby mode resets the device, so `enter` doesn't return.
pub struct StandbyMode<'r, R, A> {
    pwr: &'r mut Pwr<R, A>,
    scb: &'r mut SCB,
}

impl<R, A> PowerMode for StandbyMode<'_, R, A>
where
    R: PwrRegisters,
    A: BitAccess,
{
    fn enter(&mut self) {
        self.pwr.prepare_standby();
        self.scb.set_sleepdeep();

        asm::dsb();
        asm::wfi();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bb::Masked;
    use crate::mock::{Bank, Clock};

    const CR: usize = PwrRegister::Cr as usize;
    const CSR: usize = PwrRegister::Csr as usize;

    #[test]
    fn new_enables_the_pwr_clock() {
        let bank = Bank::<2>::new();
        let mut clock = Clock::default();

        let pwr = Pwr::new(&bank, &mut clock, Masked);
        pwr.free();

        assert_eq!(clock.pwr, 1);
        assert_eq!(clock.exti, 0);
        assert_eq!(bank.load(CR), 0);
    }

    #[test]
    fn backup_access_and_wakeup_pins() {
        let bank = Bank::<2>::new();
        let mut pwr = Pwr::new(&bank, (), Masked);

        pwr.backup_access(true);
        pwr.enable_wakeup_pin(WakeupPin::Pin1);
        pwr.enable_wakeup_pin(WakeupPin::Pin3);
        pwr.disable_wakeup_pin(WakeupPin::Pin1);

        assert_eq!(bank.load(CR), 1 << 8);
        assert_eq!(bank.load(CSR), 1 << 10);

        pwr.backup_access(false);
        assert_eq!(bank.load(CR), 0);
    }

    #[test]
    fn flags_and_clear_bits() {
        let bank = Bank::<2>::new();
        let mut pwr = Pwr::new(&bank, (), Masked);
        bank.store(CSR, 0b011);

        assert!(pwr.flag(Flag::WakeUp));
        assert!(pwr.flag(Flag::Standby));
        assert!(!pwr.flag(Flag::PvdOutput));

        pwr.clear_flag(ClearFlag::Standby);
        assert_eq!(bank.load(CR), 1 << 3);
    }

    #[test]
    fn stop_and_standby_preparation() {
        let bank = Bank::<2>::new();
        let mut pwr = Pwr::new(&bank, (), bank.bit_band());

        pwr.prepare_standby();
        assert_eq!(bank.banded(CR), 0b0110);

        pwr.prepare_stop(Regulator::LowPower);
        assert_eq!(bank.banded(CR) & 0b11, 0b01);

        pwr.prepare_stop(Regulator::Main);
        assert_eq!(bank.banded(CR) & 0b11, 0b00);
    }

    #[test]
    fn voltage_scale_waits_for_ready() {
        let bank = Bank::<2>::new();
        let mut pwr = Pwr::new(&bank, (), Masked);

        assert_eq!(pwr.set_voltage_scale(VoltageScale::Scale1), Err(Error::Timeout));
        assert_eq!(pwr.voltage_scale(), VoltageScale::Scale1);

        bank.store(CSR, 1 << 14);
        assert_eq!(pwr.set_voltage_scale(VoltageScale::Scale2), Ok(()));
        assert_eq!(pwr.voltage_scale(), VoltageScale::Scale2);
        assert_eq!(bank.load(CR), 0);
    }

    #[test]
    fn backup_regulator_follows_ready_flag() {
        let bank = Bank::<2>::new();
        let mut pwr = Pwr::new(&bank, (), Masked);
        pwr.flash_power_down(true);
        assert_eq!(bank.load(CR), 1 << 9);

        // BRR still clear
        assert_eq!(pwr.backup_regulator(true), Err(Error::Timeout));
        assert_eq!(bank.load(CSR), 1 << 9);

        bank.store(CSR, (1 << 9) | (1 << 3));
        assert_eq!(pwr.backup_regulator(true), Ok(()));

        // Switching off waits for BRR to drop
        assert_eq!(pwr.backup_regulator(false), Err(Error::Timeout));
        assert_eq!(bank.load(CSR), 1 << 3);
    }
}
