//! Reset and clock control
//!
//! The drivers in this crate only need one thing from the RCC: turning on the
//! bus clock of their peripheral before touching its registers. That request
//! goes through [`ClockControl`], so the drivers also run on top of register
//! banks that have no RCC at all.

#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
use crate::pac::{self, RCC};

/// Peripherals whose clock the drivers of this crate request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Peripheral {
    Exti,
    Pwr,
    Tim2,
    Tim3,
}

/// Peripheral clock gating
pub trait ClockControl {
    /// Enables the bus clock of `peripheral`.
    ///
    /// Must be a no-op for peripherals that are always clocked.
    fn clock_enable(&mut self, peripheral: Peripheral);
}

/// Every peripheral is always clocked
impl ClockControl for () {
    fn clock_enable(&mut self, _: Peripheral) {}
}

impl<K> ClockControl for &mut K
where
    K: ClockControl + ?Sized,
{
    fn clock_enable(&mut self, peripheral: Peripheral) {
        (**self).clock_enable(peripheral);
    }
}

// Enable bits in APB1ENR, same positions on all supported families
#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
const APB1ENR_TIM2EN: u32 = 1 << 0;
#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
const APB1ENR_TIM3EN: u32 = 1 << 1;
#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
const APB1ENR_PWREN: u32 = 1 << 28;

#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
fn enable(rb: &pac::rcc::RegisterBlock, peripheral: Peripheral) {
    let bit = match peripheral {
        // None of the supported families gates the EXTI clock
        Peripheral::Exti => return,
        Peripheral::Pwr => APB1ENR_PWREN,
        Peripheral::Tim2 => APB1ENR_TIM2EN,
        Peripheral::Tim3 => APB1ENR_TIM3EN,
    };

    rb.apb1enr.modify(|r, w| unsafe { w.bits(r.bits() | bit) });
    cortex_m::asm::dsb();
}

/// RCC peripheral
#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
pub struct Rcc {
    pub(crate) rb: RCC,
}

#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
impl Rcc {
    /// Returns the clock collaborator of the EXTI driver.
    pub fn exti_clock(&self) -> ExtiClock {
        ExtiClock { _0: () }
    }

    /// Releases the RCC peripheral
    pub fn free(self) -> RCC {
        self.rb
    }
}

#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
impl ClockControl for Rcc {
    fn clock_enable(&mut self, peripheral: Peripheral) {
        enable(&self.rb, peripheral);
    }
}

/// Clock collaborator for the always clocked EXTI
///
/// It owns no enable register, so it stays valid after [`Rcc::free`]. Gated
/// peripherals get their clock from an owned [`Rcc`].
pub struct ExtiClock {
    _0: (),
}

impl ClockControl for ExtiClock {
    fn clock_enable(&mut self, peripheral: Peripheral) {
        debug_assert_eq!(peripheral, Peripheral::Exti);
    }
}

/// Extension trait that constrains the `RCC` peripheral
#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
pub trait RccExt {
    fn constrain(self) -> Rcc;
}

#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
impl RccExt for RCC {
    fn constrain(self) -> Rcc {
        Rcc { rb: self }
    }
}
