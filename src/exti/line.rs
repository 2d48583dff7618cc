//! Types for representing the EXTI input lines.

use core::convert::TryFrom;

use super::{Error, LINES};

/// A validated EXTI line number
///
/// Each line owns one bit position in the interrupt mask, event mask, rising
/// trigger, falling trigger, software trigger and pending registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Line(pub(super) u8);

impl Line {
    /// Returns the line numbered `raw`.
    ///
    /// Fails with [`Error::InvalidLine`] if the selected family has no such
    /// line. With the `unchecked-lines` feature, release builds skip the check
    /// and only keep `raw` inside the register width.
    pub fn new(raw: u8) -> Result<Self, Error> {
        if cfg!(all(feature = "unchecked-lines", not(debug_assertions))) {
            return Ok(Line(raw & 0x1f));
        }

        if raw >= LINES {
            return Err(Error::InvalidLine(raw));
        }
        Ok(Line(raw))
    }

    /// Returns the line numbered `raw` without checking it.
    ///
    /// # Safety
    ///
    /// `raw` must be below [`LINES`]. The drivers compute register and alias
    /// addresses from it.
    pub const unsafe fn new_unchecked(raw: u8) -> Self {
        debug_assert!(raw < LINES);
        Line(raw)
    }

    /// Returns the raw line number.
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Returns the line's bit in the EXTI registers.
    pub const fn mask(self) -> u32 {
        1 << self.0
    }

    pub(crate) fn index(self) -> usize {
        cast::usize(self.0)
    }
}

impl TryFrom<u8> for Line {
    type Error = Error;

    fn try_from(raw: u8) -> Result<Self, Error> {
        Line::new(raw)
    }
}

impl From<Line> for u8 {
    fn from(line: Line) -> u8 {
        line.0
    }
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::GpioLine {}
    #[cfg(any(feature = "stm32f3", feature = "stm32f4"))]
    impl Sealed for super::ConfigurableLine {}
}

/// Trait implemented by all types representing EXTI interrupt lines.
pub trait ExtiLine: Sized + Copy + Into<Line> + sealed::Sealed {
    /// Returns the line object corresponding to a raw EXTI line number.
    ///
    /// If `raw` is not a valid line for type `Self`, `None` is returned.
    fn from_raw_line(raw: u8) -> Option<Self>;

    /// Returns that raw EXTI line number corresponding to `self`.
    fn raw_line(&self) -> u8;
}

/// An EXTI interrupt line sourced by a GPIO.
///
/// The port feeding the line is selected in SYSCFG, outside of this driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GpioLine(u8);

impl ExtiLine for GpioLine {
    fn from_raw_line(line: u8) -> Option<Self> {
        match line {
            0..=15 => Some(GpioLine(line)),
            _ => None,
        }
    }

    fn raw_line(&self) -> u8 {
        self.0
    }
}

impl From<GpioLine> for Line {
    fn from(line: GpioLine) -> Line {
        // GPIO lines exist on every family
        Line(line.0)
    }
}

/// A configurable EXTI line that is not a GPIO-sourced line.
#[cfg(feature = "stm32f3")]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigurableLine {
    Pvd = 16,
    RtcAlarm = 17,
    UsbWakeup = 18,
    RtcTamper_Timestamp_CssLse = 19,
    RtcWakeup = 20,
    Comp1 = 21,
    Comp2 = 22,
    Comp3 = 29,
    Comp4 = 30,
    Comp5 = 31,
}

/// A configurable EXTI line that is not a GPIO-sourced line.
#[cfg(feature = "stm32f4")]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigurableLine {
    Pvd = 16,
    RtcAlarm = 17,
    OtgFsWakeup = 18,
    EthernetWakeup = 19,
    OtgHsWakeup = 20,
    RtcTamper_Timestamp = 21,
    RtcWakeup = 22,
}

#[cfg(any(feature = "stm32f3", feature = "stm32f4"))]
impl ExtiLine for ConfigurableLine {
    fn from_raw_line(line: u8) -> Option<Self> {
        use ConfigurableLine::*;

        Some(match line {
            16 => Pvd,
            17 => RtcAlarm,
            #[cfg(feature = "stm32f3")]
            18 => UsbWakeup,
            #[cfg(feature = "stm32f3")]
            19 => RtcTamper_Timestamp_CssLse,
            #[cfg(feature = "stm32f3")]
            20 => RtcWakeup,
            #[cfg(feature = "stm32f3")]
            21 => Comp1,
            #[cfg(feature = "stm32f3")]
            22 => Comp2,
            // 23..=28 are direct lines (I2C, USART wakeup)
            #[cfg(feature = "stm32f3")]
            29 => Comp3,
            #[cfg(feature = "stm32f3")]
            30 => Comp4,
            #[cfg(feature = "stm32f3")]
            31 => Comp5,
            #[cfg(feature = "stm32f4")]
            18 => OtgFsWakeup,
            #[cfg(feature = "stm32f4")]
            19 => EthernetWakeup,
            #[cfg(feature = "stm32f4")]
            20 => OtgHsWakeup,
            #[cfg(feature = "stm32f4")]
            21 => RtcTamper_Timestamp,
            #[cfg(feature = "stm32f4")]
            22 => RtcWakeup,
            _ => return None,
        })
    }

    fn raw_line(&self) -> u8 {
        *self as u8
    }
}

#[cfg(any(feature = "stm32f3", feature = "stm32f4"))]
impl From<ConfigurableLine> for Line {
    fn from(line: ConfigurableLine) -> Line {
        Line(line as u8)
    }
}
