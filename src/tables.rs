/*
    zeta80: a cycle-accurate ZiLOG Z80 microprocessor emulation library.
    Copyright (C) 2019-2024  Rafal Michalski

    For the full copyright notice, see the lib.rs file.
*/
//! Precomputed flag tables for the 8-bit arithmetic, logical and
//! accumulator rotate groups.
//!
//! The tables are an optional speed-for-memory trade: every entry is
//! produced by the corresponding function in [ops](crate::ops), so both
//! paths are bit-for-bit identical by construction. The engine consults
//! them when constructed with [FlagTables].
use crate::flags::Flags;
use crate::ops::{self, LogicOp};

/// A single precomputed (result, flags) entry.
pub type Entry = (u8, Flags);

const OPERANDS: usize = 256;
const CARRIES: usize = 2;
const LOGIC_OPS: usize = 3;
const ACC_ROTS: usize = 4;

/// An accumulator rotate selector for [FlagTables::acc_rotate].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum AccRot {
    Rlca = 0,
    Rrca = 1,
    Rla  = 2,
    Rra  = 3
}

/// Precomputed results of the two-operand 8-bit groups.
///
/// Indexing: `add`/`sub` by (a, b, carry-in), `logic` by (a, b, op),
/// `acc_rotate` by (op, a, carry-in). The accumulator rotates also depend
/// on the preserved S/Z/P/V bits of the previous flags, which the lookup
/// merges back in.
pub struct FlagTables {
    add: Box<[[[Entry; CARRIES]; OPERANDS]; OPERANDS]>,
    sub: Box<[[[Entry; CARRIES]; OPERANDS]; OPERANDS]>,
    logic: Box<[[[Entry; LOGIC_OPS]; OPERANDS]; OPERANDS]>,
    rot: Box<[[[Entry; CARRIES]; OPERANDS]; ACC_ROTS]>
}

impl FlagTables {
    /// Fills all tables from the non-tabulated path.
    pub fn new() -> Self {
        let mut add = vec![[[(0, Flags::empty()); CARRIES]; OPERANDS]; OPERANDS];
        let mut sub = vec![[[(0, Flags::empty()); CARRIES]; OPERANDS]; OPERANDS];
        let mut logic = vec![[[(0, Flags::empty()); LOGIC_OPS]; OPERANDS]; OPERANDS];
        for a in 0..OPERANDS {
            for b in 0..OPERANDS {
                for c in 0..CARRIES {
                    add[a][b][c] = ops::arith8(a as u8, b as u8, c != 0, false);
                    sub[a][b][c] = ops::arith8(a as u8, b as u8, c != 0, true);
                }
                logic[a][b][0] = ops::logical(a as u8, b as u8, LogicOp::And);
                logic[a][b][1] = ops::logical(a as u8, b as u8, LogicOp::Xor);
                logic[a][b][2] = ops::logical(a as u8, b as u8, LogicOp::Or);
            }
        }
        let mut rot = vec![[[(0, Flags::empty()); CARRIES]; OPERANDS]; ACC_ROTS];
        for a in 0..OPERANDS {
            for c in 0..CARRIES {
                let carry = Flags::mask_carry(c != 0);
                rot[AccRot::Rlca as usize][a][c] = ops::rlca(a as u8, carry);
                rot[AccRot::Rrca as usize][a][c] = ops::rrca(a as u8, carry);
                rot[AccRot::Rla as usize][a][c] = ops::rla(a as u8, carry);
                rot[AccRot::Rra as usize][a][c] = ops::rra(a as u8, carry);
            }
        }
        FlagTables {
            add: boxed_array(add),
            sub: boxed_array(sub),
            logic: boxed_array(logic),
            rot: boxed_array(rot)
        }
    }

    /// Tabulated [ops::arith8] with `subtract` false.
    #[inline]
    pub fn arith_add(&self, a: u8, b: u8, carry: bool) -> Entry {
        self.add[a as usize][b as usize][carry as usize]
    }

    /// Tabulated [ops::arith8] with `subtract` true.
    #[inline]
    pub fn arith_sub(&self, a: u8, b: u8, carry: bool) -> Entry {
        self.sub[a as usize][b as usize][carry as usize]
    }

    /// Tabulated [ops::logical].
    #[inline]
    pub fn logical(&self, a: u8, b: u8, op: LogicOp) -> Entry {
        let index = match op {
            LogicOp::And => 0,
            LogicOp::Xor => 1,
            LogicOp::Or => 2
        };
        self.logic[a as usize][b as usize][index]
    }

    /// Tabulated accumulator rotate; `flags` contributes the carry-in and
    /// the preserved S, Z and P/V bits.
    #[inline]
    pub fn acc_rotate(&self, op: AccRot, a: u8, flags: Flags) -> Entry {
        let (res, f) = self.rot[op as usize][a as usize][flags.cf() as usize];
        (res, f | (flags & (Flags::S | Flags::Z | Flags::PV)))
    }
}

impl Default for FlagTables {
    fn default() -> Self {
        Self::new()
    }
}

fn boxed_array<T, const N: usize>(vec: Vec<T>) -> Box<[T; N]> {
    match vec.into_boxed_slice().try_into() {
        Ok(array) => array,
        Err(_) => unreachable!("table size mismatch")
    }
}
