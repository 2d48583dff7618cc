//! Register bit access
//!
//! "The processor memory map includes two bit-band regions.
//! These occupy the lowest 1MB of the SRAM and Peripheral memory regions respectively.
//! These bit-band regions map each word in an alias region of memory to a bit
//! in a bit-band region of memory."
//!
//! Cortex-M0 parts (STM32F0) have no bit-band regions, so single register bits
//! are changed with a read-modify-write of the whole word there. Both ways are
//! offered behind [`BitAccess`]; every family picks one at compile time as
//! [`DefaultAccess`].

use core::ptr;

/// Size of a bit-band region in bytes
pub const REGION_SIZE: usize = 0x10_0000;

/// Single bit read and write access to 32-bit registers
pub trait BitAccess {
    /// Sets (`value == true`) or clears bit `bit` of `register`.
    ///
    /// # Safety
    ///
    /// `register` must point to a readable and writable 32-bit register that
    /// this access method can reach, and `bit` must be below 32.
    unsafe fn write(&self, register: *mut u32, bit: u8, value: bool);

    /// Returns bit `bit` of `register`.
    ///
    /// # Safety
    ///
    /// Same requirements as for [`BitAccess::write`].
    unsafe fn read(&self, register: *const u32, bit: u8) -> bool;

    /// Sets bit `bit` of `register`.
    ///
    /// # Safety
    ///
    /// Same requirements as for [`BitAccess::write`].
    unsafe fn set(&self, register: *mut u32, bit: u8) {
        self.write(register, bit, true);
    }

    /// Clears bit `bit` of `register`.
    ///
    /// # Safety
    ///
    /// Same requirements as for [`BitAccess::write`].
    unsafe fn clear(&self, register: *mut u32, bit: u8) {
        self.write(register, bit, false);
    }
}

/// Read-modify-write of the whole register word
///
/// Not atomic: an interrupt handler changing the same register between the
/// read and the write loses its update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Masked;

impl BitAccess for Masked {
    unsafe fn write(&self, register: *mut u32, bit: u8, value: bool) {
        debug_assert!(bit < 32);

        let mask = 1 << bit;
        let bits = ptr::read_volatile(register);
        let bits = if value { bits | mask } else { bits & !mask };
        ptr::write_volatile(register, bits);
    }

    unsafe fn read(&self, register: *const u32, bit: u8) -> bool {
        debug_assert!(bit < 32);

        ptr::read_volatile(register) & (1 << bit) != 0
    }
}

/// A bit-band region and its word alias region
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Region {
    base: usize,
    alias: usize,
}

impl Region {
    /// Peripheral bit-band region
    pub const PERIPHERAL: Region = Region::new(0x4000_0000, 0x4200_0000);

    /// SRAM bit-band region
    pub const SRAM: Region = Region::new(0x2000_0000, 0x2200_0000);

    /// Describes a region starting at `base`, aliased from `alias` on.
    pub const fn new(base: usize, alias: usize) -> Self {
        Region { base, alias }
    }

    /// Returns whether `addr` lies in the bit-banded part of the region.
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr - self.base < REGION_SIZE
    }

    /// Returns the address of the alias word of bit `bit` at `addr`.
    pub fn bit_address(&self, addr: usize, bit: u8) -> usize {
        debug_assert!(self.contains(addr));
        debug_assert!(bit < 32);

        // bit_word_addr = bit_band_base + (byte_offset x 32) + (bit_number x 4)
        self.alias + (addr - self.base) * 32 + usize::from(bit) * 4
    }
}

/// One word write per bit through the bit-band alias region
///
/// Every bit change is a single store, so it can't interleave with an
/// interrupt handler touching other bits of the same register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitBand {
    region: Region,
}

impl BitBand {
    /// Bit access through the alias of `region`.
    pub const fn new(region: Region) -> Self {
        BitBand { region }
    }

    /// Returns the region this access method writes through.
    pub fn region(&self) -> Region {
        self.region
    }

    fn alias(&self, register: *const u32, bit: u8) -> *mut u32 {
        self.region.bit_address(register as usize, bit) as *mut u32
    }
}

impl Default for BitBand {
    fn default() -> Self {
        BitBand::new(Region::PERIPHERAL)
    }
}

impl BitAccess for BitBand {
    unsafe fn write(&self, register: *mut u32, bit: u8, value: bool) {
        ptr::write_volatile(self.alias(register, bit), u32::from(value));
    }

    unsafe fn read(&self, register: *const u32, bit: u8) -> bool {
        ptr::read_volatile(self.alias(register, bit)) & 1 != 0
    }
}

/// Bit access method of the selected family
#[cfg(any(
    feature = "stm32f0",
    not(any(feature = "stm32f3", feature = "stm32f4"))
))]
pub type DefaultAccess = Masked;

/// Bit access method of the selected family
#[cfg(any(feature = "stm32f3", feature = "stm32f4"))]
pub type DefaultAccess = BitBand;
