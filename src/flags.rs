/*
    zeta80: a cycle-accurate ZiLOG Z80 microprocessor emulation library.
    Copyright (C) 2019-2024  Rafal Michalski

    For the full copyright notice, see the lib.rs file.
*/
//! Flags register bits definitions and flag mask constructors.
//!
//! All flag modifying instruction classes build their results from the masks
//! defined here; the per-class rules live in the [ops](crate::ops) module.
use bitflags::bitflags;

use crate::bits;

bitflags! {
    /// Z80 Flags register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u8 {
        /// Sign Flag.
        const S  = 0b1000_0000;
        /// Zero Flag.
        const Z  = 0b0100_0000;
        /// Undocumented bit 5 of the Flags.
        const Y  = 0b0010_0000;
        /// Half Carry Flag.
        const H  = 0b0001_0000;
        /// Undocumented bit 3 of the Flags.
        const X  = 0b0000_1000;
        /// Parity/Overflow Flag.
        const PV = 0b0000_0100;
        /// Add/Subtract Flag.
        const N  = 0b0000_0010;
        /// Carry Flag.
        const C  = 0b0000_0001;
        /// An alias of [Flags::PV].
        const P  = Self::PV.bits();
        /// An alias of [Flags::PV].
        const V  = Self::PV.bits();
        /// A mask of both undocumented bits 3 and 5.
        const XY = Self::X.bits() | Self::Y.bits();
        /// A mask of the sign bit and both undocumented bits.
        const SXY = Self::S.bits() | Self::XY.bits();
    }
}

impl Flags {
    /// Returns a value of the Sign Flag.
    #[inline]
    pub fn sf(self) -> bool { self.contains(Flags::S) }
    /// Returns a value of the Zero Flag.
    #[inline]
    pub fn zf(self) -> bool { self.contains(Flags::Z) }
    /// Returns a value of the Half Carry Flag.
    #[inline]
    pub fn hf(self) -> bool { self.contains(Flags::H) }
    /// Returns a value of the Parity/Overflow Flag.
    #[inline]
    pub fn pvf(self) -> bool { self.contains(Flags::PV) }
    /// Returns a value of the Add/Subtract Flag.
    #[inline]
    pub fn nf(self) -> bool { self.contains(Flags::N) }
    /// Returns a value of the Carry Flag.
    #[inline]
    pub fn cf(self) -> bool { self.contains(Flags::C) }

    /// Returns [Flags::S] set from the top-most bit of `res`.
    #[inline]
    pub fn mask_sign(res: u8) -> Self {
        Flags::from_bits_truncate(res & Flags::S.bits())
    }

    /// Returns [Flags::Z] set when `res` equals 0.
    #[inline]
    pub fn mask_zero(res: u8) -> Self {
        if res == 0 { Flags::Z } else { Flags::empty() }
    }

    /// Returns [Flags::C] set from the given condition.
    #[inline]
    pub fn mask_carry(cf: bool) -> Self {
        if cf { Flags::C } else { Flags::empty() }
    }

    /// Returns [Flags::H] set from the given condition.
    #[inline]
    pub fn mask_hf(hf: bool) -> Self {
        if hf { Flags::H } else { Flags::empty() }
    }

    /// Returns [Flags::N] set from the given condition.
    #[inline]
    pub fn mask_nf(nf: bool) -> Self {
        if nf { Flags::N } else { Flags::empty() }
    }

    /// Returns [Flags::PV] set from the given condition.
    #[inline]
    pub fn mask_pvf(pvf: bool) -> Self {
        if pvf { Flags::PV } else { Flags::empty() }
    }

    /// Returns [Flags::PV] set when the number of bits set in `res` is even.
    #[inline]
    pub fn mask_parity(res: u8) -> Self {
        Self::mask_pvf(bits::parity_even(res))
    }

    /// Returns [Flags::X] and [Flags::Y] copied from bits 3 and 5 of `res`.
    #[inline]
    pub fn mask_xy(res: u8) -> Self {
        Flags::from_bits_truncate(res & Flags::XY.bits())
    }

    /// Returns [Flags::S], [Flags::X] and [Flags::Y] copied from bits
    /// 7, 3 and 5 of `res`.
    #[inline]
    pub fn mask_sxy(res: u8) -> Self {
        Flags::from_bits_truncate(res & Flags::SXY.bits())
    }

    /// The common result mask of the logical, rotate and shift group:
    /// S, Z, X, Y and parity from `res`, H and C from the arguments, N reset.
    #[inline]
    pub(crate) fn mask_szp_xy(res: u8, hf: bool, cf: bool) -> Self {
        Self::mask_sxy(res) | Self::mask_zero(res) | Self::mask_parity(res) |
        Self::mask_hf(hf) | Self::mask_carry(cf)
    }

    /// Block transfer and search instructions copy bit 1 of their composed
    /// operand into Y and bit 3 into X.
    #[inline]
    pub(crate) fn mask_block_xy(n: u8) -> Self {
        Flags::from_bits_truncate(n & Flags::X.bits() | (n << 4) & Flags::Y.bits())
    }
}

/// Returns `true` when an 8-bit addition with `carry` crosses the nybble boundary.
#[inline]
pub(crate) fn half_carry_add(a: u8, b: u8, carry: bool) -> bool {
    bits::low_nybble(a) + bits::low_nybble(b) + u8::from(carry) > 0x0F
}

/// Returns `true` when an 8-bit subtraction with `carry` borrows across the nybble boundary.
#[inline]
pub(crate) fn half_borrow_sub(a: u8, b: u8, carry: bool) -> bool {
    bits::low_nybble(a) < bits::low_nybble(b) + u8::from(carry)
}

/// Returns `true` when a 16-bit addition with `carry` carries out of bit 11.
#[inline]
pub(crate) fn half_carry_add16(a: u16, b: u16, carry: bool) -> bool {
    (a & 0x0FFF) + (b & 0x0FFF) + u16::from(carry) > 0x0FFF
}

/// Returns `true` when a 16-bit subtraction with `carry` borrows into bit 12.
#[inline]
pub(crate) fn half_borrow_sub16(a: u16, b: u16, carry: bool) -> bool {
    (a & 0x0FFF) < (b & 0x0FFF) + u16::from(carry)
}
