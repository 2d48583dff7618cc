//! Peripheral drivers for STM32F0, STM32F3 and STM32F4 microcontrollers
//!
//! Select the chip family with one of the `stm32f0`, `stm32f3` or `stm32f4`
//! features. Without a family feature only the register-agnostic drivers are
//! built: they work on anything implementing [`exti::ExtiRegisters`],
//! [`pwr::PwrRegisters`] or [`timer::TimRegisters`].
#![cfg_attr(not(test), no_std)]
#![allow(non_camel_case_types)]

#[cfg(any(
    all(feature = "stm32f0", feature = "stm32f3"),
    all(feature = "stm32f0", feature = "stm32f4"),
    all(feature = "stm32f3", feature = "stm32f4"),
))]
compile_error!("Select at most one of the following features: stm32f0, stm32f3, stm32f4");

#[cfg(feature = "stm32f0")]
pub use stm32f0::stm32f0x1 as pac;
#[cfg(feature = "stm32f3")]
pub use stm32f3::stm32f303 as pac;
#[cfg(feature = "stm32f4")]
pub use stm32f4::stm32f407 as pac;

#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
pub use crate::pac as device;

pub mod bb;
pub mod exti;
#[cfg(test)]
mod mock;
pub mod prelude;
pub mod pwr;
pub mod rcc;
pub mod timer;
