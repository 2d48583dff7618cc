//! In-memory register banks for host tests

use core::cell::UnsafeCell;
use core::ptr;

use crate::bb::{BitBand, Region};
use crate::exti::{ExtiRegisters, Register};
use crate::pwr::{PwrRegister, PwrRegisters};
use crate::rcc::{ClockControl, Peripheral};
use crate::timer::{TimRegister, TimRegisters};

/// `N` register words followed by a simulated bit-band alias of them
pub struct Bank<const N: usize> {
    words: UnsafeCell<[u32; N]>,
    alias: UnsafeCell<[[u32; 32]; N]>,
}

impl<const N: usize> Bank<N> {
    pub fn new() -> Self {
        Bank {
            words: UnsafeCell::new([0; N]),
            alias: UnsafeCell::new([[0; 32]; N]),
        }
    }

    pub fn word(&self, index: usize) -> *mut u32 {
        assert!(index < N);
        (self.words.get() as *mut u32).wrapping_add(index)
    }

    pub fn load(&self, index: usize) -> u32 {
        unsafe { ptr::read_volatile(self.word(index)) }
    }

    pub fn store(&self, index: usize, value: u32) {
        unsafe { ptr::write_volatile(self.word(index), value) }
    }

    /// Bit-band access mapping this bank's words onto its alias array.
    pub fn bit_band(&self) -> BitBand {
        BitBand::new(Region::new(
            self.words.get() as usize,
            self.alias.get() as usize,
        ))
    }

    pub fn alias_word(&self, index: usize, bit: usize) -> u32 {
        unsafe { (*self.alias.get())[index][bit] }
    }

    /// Register value as the bit-band alias words describe it.
    pub fn banded(&self, index: usize) -> u32 {
        (0..32).fold(0, |value, bit| {
            value | ((self.alias_word(index, bit) & 1) << bit)
        })
    }
}

unsafe impl ExtiRegisters for Bank<6> {
    fn ptr(&self, register: Register) -> *mut u32 {
        self.word(register as usize)
    }
}

unsafe impl PwrRegisters for Bank<2> {
    fn ptr(&self, register: PwrRegister) -> *mut u32 {
        self.word(register as usize)
    }
}

/// A TIM2 register block
unsafe impl TimRegisters for Bank<18> {
    fn ptr(&self, register: TimRegister) -> *mut u32 {
        self.word(register as usize)
    }

    fn peripheral(&self) -> Peripheral {
        Peripheral::Tim2
    }
}

/// Counts clock enable requests
#[derive(Default)]
pub struct Clock {
    pub exti: usize,
    pub pwr: usize,
    pub tim2: usize,
    pub tim3: usize,
}

impl ClockControl for Clock {
    fn clock_enable(&mut self, peripheral: Peripheral) {
        match peripheral {
            Peripheral::Exti => self.exti += 1,
            Peripheral::Pwr => self.pwr += 1,
            Peripheral::Tim2 => self.tim2 += 1,
            Peripheral::Tim3 => self.tim3 += 1,
        }
    }
}
