//! Register bank shared by the integration tests

#![allow(dead_code)]

use core::cell::UnsafeCell;
use core::ptr;

use stm32xpd_hal::bb::{BitBand, Region};
use stm32xpd_hal::exti::{ExtiRegisters, Register};

/// IMR, EMR, RTSR and FTSR
pub const CONFIG_REGISTERS: [Register; 4] =
    [Register::Imr, Register::Emr, Register::Rtsr, Register::Ftsr];

/// The six EXTI registers and a simulated bit-band alias of them
pub struct Exti {
    words: UnsafeCell<[u32; 6]>,
    alias: UnsafeCell<[[u32; 32]; 6]>,
}

impl Exti {
    pub fn new() -> Self {
        Exti {
            words: UnsafeCell::new([0; 6]),
            alias: UnsafeCell::new([[0; 32]; 6]),
        }
    }

    /// Starts with the four configuration registers set to `words`.
    pub fn with_config(words: [u32; 4]) -> Self {
        let exti = Exti::new();
        for (register, word) in CONFIG_REGISTERS.iter().zip(words.iter()) {
            unsafe { ptr::write_volatile(exti.ptr(*register), *word) };
        }
        exti
    }

    pub fn bit_band(&self) -> BitBand {
        BitBand::new(Region::new(
            self.words.get() as usize,
            self.alias.get() as usize,
        ))
    }

    /// The configuration registers as stored words
    pub fn config_words(&self) -> [u32; 4] {
        let mut words = [0; 4];
        for (word, register) in words.iter_mut().zip(CONFIG_REGISTERS.iter()) {
            *word = unsafe { ptr::read_volatile(self.ptr(*register)) };
        }
        words
    }

    /// The configuration registers as the alias words describe them
    pub fn banded_config_words(&self) -> [u32; 4] {
        let alias = unsafe { &*self.alias.get() };
        let mut words = [0; 4];
        for (word, register) in words.iter_mut().zip(CONFIG_REGISTERS.iter()) {
            *word = alias[*register as usize]
                .iter()
                .enumerate()
                .fold(0, |value, (bit, set)| value | ((set & 1) << bit));
        }
        words
    }
}

unsafe impl ExtiRegisters for Exti {
    fn ptr(&self, register: Register) -> *mut u32 {
        (self.words.get() as *mut u32).wrapping_add(register as usize)
    }
}
