pub use crate::bb::BitAccess as _;
pub use crate::exti::ExtiLine as _;
pub use crate::pwr::PowerMode as _;
pub use crate::rcc::ClockControl as _;

#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
pub use crate::exti::ExtiExt as _;
#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
pub use crate::pwr::PwrExt as _;
#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
pub use crate::rcc::RccExt as _;
#[cfg(any(feature = "stm32f0", feature = "stm32f3", feature = "stm32f4"))]
pub use crate::timer::TimerExt as _;
