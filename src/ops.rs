/*
    zeta80: a cycle-accurate ZiLOG Z80 microprocessor emulation library.
    Copyright (C) 2019-2024  Rafal Michalski

    For the full copyright notice, see the lib.rs file.
*/
//! Arithmetic, logic, bit and block operations of the flag engine.
//!
//! Every function here is pure: it maps operands (and, where the silicon
//! demands it, the previous Flags) to a result and a complete new Flags
//! value. All flag involved instructions build their Flags through these
//! functions; the microcode never composes flag bits on its own.
use crate::bits;
use crate::flags::{self, Flags};

const SIGN_BIT: u8 = 0b1000_0000;

/// A logical operation selector for [logical].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Xor,
    Or
}

/// 8-bit add or subtract with carry/borrow in, computed in 9 bits.
///
/// Z, S, X, Y from the result, C from bit 8, H from the nybble boundary,
/// P/V from signed overflow, N from `subtract`.
#[inline]
pub fn arith8(a: u8, b: u8, carry_in: bool, subtract: bool) -> (u8, Flags) {
    let wide = if subtract {
        (a as u16).wrapping_sub(b as u16).wrapping_sub(u16::from(carry_in))
    }
    else {
        a as u16 + b as u16 + u16::from(carry_in)
    };
    let res = wide as u8;
    let cf = wide & 0x100 != 0;
    let hf = if subtract {
        flags::half_borrow_sub(a, b, carry_in)
    }
    else {
        flags::half_carry_add(a, b, carry_in)
    };
    // signed overflow: operands of one sign, result of the other
    let vf = (a ^ if subtract { b } else { !b }) & (a ^ res) & SIGN_BIT != 0;
    let flags = Flags::mask_sxy(res) | Flags::mask_zero(res) |
                Flags::mask_carry(cf) | Flags::mask_hf(hf) |
                Flags::mask_pvf(vf) | Flags::mask_nf(subtract);
    (res, flags)
}

/// `ADD A, b`
#[inline]
pub fn add(a: u8, b: u8) -> (u8, Flags) {
    arith8(a, b, false, false)
}

/// `ADC A, b`
#[inline]
pub fn adc(a: u8, b: u8, carry: bool) -> (u8, Flags) {
    arith8(a, b, carry, false)
}

/// `SUB b`
#[inline]
pub fn sub(a: u8, b: u8) -> (u8, Flags) {
    arith8(a, b, false, true)
}

/// `SBC A, b`
#[inline]
pub fn sbc(a: u8, b: u8, carry: bool) -> (u8, Flags) {
    arith8(a, b, carry, true)
}

/// `CP b` - like [sub] but the accumulator is left alone and the
/// undocumented X and Y bits come from the operand, not the result.
#[inline]
pub fn cp(a: u8, b: u8) -> Flags {
    let (_, flags) = sub(a, b);
    flags - Flags::XY | Flags::mask_xy(b)
}

/// `NEG`
#[inline]
pub fn neg(a: u8) -> (u8, Flags) {
    sub(0, a)
}

/// `INC r` - carry is preserved from `flags`.
#[inline]
pub fn inc(val: u8, flags: Flags) -> (u8, Flags) {
    let res = val.wrapping_add(1);
    let f = Flags::mask_sxy(res) | Flags::mask_zero(res) |
            Flags::mask_hf(flags::half_carry_add(val, 1, false)) |
            Flags::mask_pvf(val == 0x7F) |
            (flags & Flags::C);
    (res, f)
}

/// `DEC r` - carry is preserved from `flags`.
#[inline]
pub fn dec(val: u8, flags: Flags) -> (u8, Flags) {
    let res = val.wrapping_sub(1);
    let f = Flags::mask_sxy(res) | Flags::mask_zero(res) |
            Flags::mask_hf(flags::half_borrow_sub(val, 1, false)) |
            Flags::mask_pvf(val == 0x80) |
            Flags::N | (flags & Flags::C);
    (res, f)
}

/// `ADD HL, rr` - S, Z and P/V are preserved from `flags`; H from bit 11,
/// X and Y from the high byte of the result.
#[inline]
pub fn add16(a: u16, b: u16, flags: Flags) -> (u16, Flags) {
    let (res, cf) = a.overflowing_add(b);
    let f = (flags & (Flags::S | Flags::Z | Flags::PV)) |
            Flags::mask_xy(bits::high_byte(res)) |
            Flags::mask_hf(flags::half_carry_add16(a, b, false)) |
            Flags::mask_carry(cf);
    (res, f)
}

/// 16-bit add or subtract with carry, all flags set from the wide result.
#[inline]
fn arith16(a: u16, b: u16, carry_in: bool, subtract: bool) -> (u16, Flags) {
    let wide = if subtract {
        (a as u32).wrapping_sub(b as u32).wrapping_sub(u32::from(carry_in))
    }
    else {
        a as u32 + b as u32 + u32::from(carry_in)
    };
    let res = wide as u16;
    let cf = wide & 0x1_0000 != 0;
    let hf = if subtract {
        flags::half_borrow_sub16(a, b, carry_in)
    }
    else {
        flags::half_carry_add16(a, b, carry_in)
    };
    let vf = (a ^ if subtract { b } else { !b }) & (a ^ res) & 0x8000 != 0;
    let f = Flags::mask_sxy(bits::high_byte(res)) |
            (if res == 0 { Flags::Z } else { Flags::empty() }) |
            Flags::mask_carry(cf) | Flags::mask_hf(hf) |
            Flags::mask_pvf(vf) | Flags::mask_nf(subtract);
    (res, f)
}

/// `ADC HL, rr`
#[inline]
pub fn adc16(a: u16, b: u16, carry: bool) -> (u16, Flags) {
    arith16(a, b, carry, false)
}

/// `SBC HL, rr`
#[inline]
pub fn sbc16(a: u16, b: u16, carry: bool) -> (u16, Flags) {
    arith16(a, b, carry, true)
}

/// `AND`, `XOR` and `OR`: Z, S, X, Y and parity from the result, C and N
/// reset, H set only by AND.
#[inline]
pub fn logical(a: u8, b: u8, op: LogicOp) -> (u8, Flags) {
    let (res, hf) = match op {
        LogicOp::And => (a & b, true),
        LogicOp::Xor => (a ^ b, false),
        LogicOp::Or  => (a | b, false)
    };
    (res, Flags::mask_szp_xy(res, hf, false))
}

/// `RLCA` - S, Z and P/V are preserved from `flags`.
#[inline]
pub fn rlca(acc: u8, flags: Flags) -> (u8, Flags) {
    let res = acc.rotate_left(1);
    (res, acc_rotate_flags(res, res & 1 != 0, flags))
}

/// `RRCA` - S, Z and P/V are preserved from `flags`.
#[inline]
pub fn rrca(acc: u8, flags: Flags) -> (u8, Flags) {
    let res = acc.rotate_right(1);
    (res, acc_rotate_flags(res, acc & 1 != 0, flags))
}

/// `RLA` - S, Z and P/V are preserved from `flags`.
#[inline]
pub fn rla(acc: u8, flags: Flags) -> (u8, Flags) {
    let res = (acc << 1) | u8::from(flags.cf());
    (res, acc_rotate_flags(res, acc & SIGN_BIT != 0, flags))
}

/// `RRA` - S, Z and P/V are preserved from `flags`.
#[inline]
pub fn rra(acc: u8, flags: Flags) -> (u8, Flags) {
    let res = (acc >> 1) | (u8::from(flags.cf()) << 7);
    (res, acc_rotate_flags(res, acc & 1 != 0, flags))
}

#[inline]
fn acc_rotate_flags(res: u8, cf: bool, flags: Flags) -> Flags {
    (flags & (Flags::S | Flags::Z | Flags::PV)) |
    Flags::mask_xy(res) | Flags::mask_carry(cf)
}

/// `RLC r`
#[inline]
pub fn rlc(val: u8) -> (u8, Flags) {
    let res = val.rotate_left(1);
    (res, Flags::mask_szp_xy(res, false, res & 1 != 0))
}

/// `RRC r`
#[inline]
pub fn rrc(val: u8) -> (u8, Flags) {
    let res = val.rotate_right(1);
    (res, Flags::mask_szp_xy(res, false, val & 1 != 0))
}

/// `RL r`
#[inline]
pub fn rl(val: u8, carry: bool) -> (u8, Flags) {
    let res = (val << 1) | u8::from(carry);
    (res, Flags::mask_szp_xy(res, false, val & SIGN_BIT != 0))
}

/// `RR r`
#[inline]
pub fn rr(val: u8, carry: bool) -> (u8, Flags) {
    let res = (val >> 1) | (u8::from(carry) << 7);
    (res, Flags::mask_szp_xy(res, false, val & 1 != 0))
}

/// `SLA r`
#[inline]
pub fn sla(val: u8) -> (u8, Flags) {
    let res = val << 1;
    (res, Flags::mask_szp_xy(res, false, val & SIGN_BIT != 0))
}

/// `SRA r`
#[inline]
pub fn sra(val: u8) -> (u8, Flags) {
    let res = ((val as i8) >> 1) as u8;
    (res, Flags::mask_szp_xy(res, false, val & 1 != 0))
}

/// `SLL r` - undocumented, shifts left filling bit 0 with 1.
#[inline]
pub fn sll(val: u8) -> (u8, Flags) {
    let res = (val << 1) | 1;
    (res, Flags::mask_szp_xy(res, false, val & SIGN_BIT != 0))
}

/// `SRL r`
#[inline]
pub fn srl(val: u8) -> (u8, Flags) {
    let res = val >> 1;
    (res, Flags::mask_szp_xy(res, false, val & 1 != 0))
}

/// `RLD` - returns `(accumulator, memory byte, flags)`. Carry is preserved.
#[inline]
pub fn rld(acc: u8, mem: u8, flags: Flags) -> (u8, u8, Flags) {
    let res_acc = (acc & 0xF0) | bits::high_nybble(mem);
    let res_mem = (mem << 4) | bits::low_nybble(acc);
    (res_acc, res_mem, Flags::mask_szp_xy(res_acc, false, flags.cf()))
}

/// `RRD` - returns `(accumulator, memory byte, flags)`. Carry is preserved.
#[inline]
pub fn rrd(acc: u8, mem: u8, flags: Flags) -> (u8, u8, Flags) {
    let res_acc = (acc & 0xF0) | bits::low_nybble(mem);
    let res_mem = bits::merge_nybbles(bits::low_nybble(acc), bits::high_nybble(mem));
    (res_acc, res_mem, Flags::mask_szp_xy(res_acc, false, flags.cf()))
}

/// `CPL` - S, Z, P/V and C are preserved, H and N set, X/Y from the result.
#[inline]
pub fn cpl(acc: u8, flags: Flags) -> (u8, Flags) {
    let res = !acc;
    let f = (flags & (Flags::S | Flags::Z | Flags::PV | Flags::C)) |
            Flags::mask_xy(res) | Flags::H | Flags::N;
    (res, f)
}

/// `SCF` - sets carry; H and N reset; X/Y from the accumulator.
#[inline]
pub fn scf(acc: u8, flags: Flags) -> Flags {
    (flags & (Flags::S | Flags::Z | Flags::PV)) |
    Flags::mask_xy(acc) | Flags::C
}

/// `CCF` - inverts carry, the old carry becomes H; N reset; X/Y from the
/// accumulator.
#[inline]
pub fn ccf(acc: u8, flags: Flags) -> Flags {
    let cf = flags.cf();
    (flags & (Flags::S | Flags::Z | Flags::PV)) |
    Flags::mask_xy(acc) | Flags::mask_hf(cf) | Flags::mask_carry(!cf)
}

/// `DAA` - decimal adjust after an addition or a subtraction, selected by
/// the N flag; the adjustment and the resulting C and H follow the
/// canonical nybble table.
#[inline]
pub fn daa(acc: u8, flags: Flags) -> (u8, Flags) {
    let nf = flags.nf();
    let mut diff = 0u8;
    let mut cf = flags.cf();
    if flags.hf() || bits::low_nybble(acc) > 9 {
        diff |= 0x06;
    }
    if cf || acc > 0x99 {
        diff |= 0x60;
        cf = true;
    }
    let res = if nf { acc.wrapping_sub(diff) } else { acc.wrapping_add(diff) };
    let hf = if nf {
        flags.hf() && bits::low_nybble(acc) < 6
    }
    else {
        bits::low_nybble(acc) > 9
    };
    (res, Flags::mask_szp_xy(res, hf, cf) | Flags::mask_nf(nf))
}

/// `BIT n, r` - Z, P/V from the complement of the tested bit, S only for
/// bit 7 set, H set, N reset, C preserved, X/Y from the tested register.
#[inline]
pub fn bit(n: u32, val: u8, flags: Flags) -> Flags {
    debug_assert!(n <= 7);
    let res = val & (1 << n);
    bit_flags(res) | Flags::mask_xy(val) | (flags & Flags::C)
}

/// `BIT n, (HL|IX+d|IY+d)` - like [bit] but the X and Y bits leak from the
/// high byte of the internal WZ latch.
#[inline]
pub fn bit_wz(n: u32, val: u8, wz_high: u8, flags: Flags) -> Flags {
    debug_assert!(n <= 7);
    let res = val & (1 << n);
    bit_flags(res) | Flags::mask_xy(wz_high) | (flags & Flags::C)
}

#[inline]
fn bit_flags(res: u8) -> Flags {
    Flags::mask_sign(res) | Flags::H |
    (if res == 0 { Flags::Z | Flags::P } else { Flags::empty() })
}

/// `LD A,I` and `LD A,R` - S, Z, X, Y from the loaded value, P/V from IFF2,
/// H and N reset, C preserved.
#[inline]
pub fn ld_a_ir(val: u8, iff2: bool, flags: Flags) -> Flags {
    Flags::mask_sxy(val) | Flags::mask_zero(val) |
    Flags::mask_pvf(iff2) | (flags & Flags::C)
}

/// `IN r, (C)` - S, Z, X, Y and parity from the input byte, H and N reset,
/// C preserved.
#[inline]
pub fn in_flags(val: u8, flags: Flags) -> Flags {
    Flags::mask_szp_xy(val, false, flags.cf())
}

/// `LDI/LDD/LDIR/LDDR` - X and Y from the transferred byte plus the
/// accumulator, P/V set while BC is non-zero, H and N reset, the rest
/// preserved.
#[inline]
pub fn block_transfer(acc: u8, val: u8, bc_nonzero: bool, flags: Flags) -> Flags {
    let n = val.wrapping_add(acc);
    (flags & (Flags::S | Flags::Z | Flags::C)) |
    Flags::mask_block_xy(n) | Flags::mask_pvf(bc_nonzero)
}

/// `CPI/CPD/CPIR/CPDR` - a comparison that keeps C, sets P/V while BC is
/// non-zero and leaks X/Y from `A - (HL) - H` where H is the half borrow of
/// the comparison.
#[inline]
pub fn block_compare(acc: u8, val: u8, bc_nonzero: bool, flags: Flags) -> Flags {
    let res = acc.wrapping_sub(val);
    let hf = flags::half_borrow_sub(acc, val, false);
    let n = res.wrapping_sub(u8::from(hf));
    Flags::mask_sign(res) | Flags::mask_zero(res) |
    Flags::mask_hf(hf) | Flags::mask_block_xy(n) |
    Flags::mask_pvf(bc_nonzero) | Flags::N | (flags & Flags::C)
}

/// `INI/IND/OUTI/OUTD` and the repeating forms.
///
/// S, Z, X, Y mirror B after the decrement, N copies bit 7 of the
/// transferred byte, H and C are set when the transferred byte plus the
/// adjusted counter register overflows, P/V is the parity of that sum
/// (mod 8) xored with B.
#[inline]
pub fn block_io(io: u8, b: u8, adj: u8) -> Flags {
    let (k, hcf) = io.overflowing_add(adj);
    Flags::mask_sxy(b) | Flags::mask_zero(b) |
    Flags::mask_nf(io & SIGN_BIT != 0) |
    (if hcf { Flags::H | Flags::C } else { Flags::empty() }) |
    Flags::mask_parity(k & 7 ^ b)
}
