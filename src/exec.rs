/*
    zeta80: a cycle-accurate ZiLOG Z80 microprocessor emulation library.
    Copyright (C) 2019-2024  Rafal Michalski

    For the full copyright notice, see the lib.rs file.
*/
//! The microcode: one function per folded instruction behavior.
//!
//! Every function receives the processor and the decoded package and
//! returns an [ExecutionResult]. The engine has already emitted the
//! leading fetch and operand-read machine cycles and advanced PC past the
//! instruction; the microcode emits the remaining cycles through the
//! timed access helpers and reports the new Flags, if any.
//!
//! Timing comments name the remaining cycles the way the hardware
//! documentation does, e.g. `hl:3` for a 3 T-state access at HL.
use crate::bits;
use crate::decode::{restart_address, AluOp, Operand, Rot};
use crate::engine::Processor;
use crate::error::EngineError;
use crate::instructions::{ExecutionResult, InstructionPackage};
use crate::mcycle::MCycle;
use crate::ops::{self, LogicOp};
use crate::registers::{InterruptMode, Reg8, Reg16};
use crate::tables::AccRot;

type ExecResult = Result<ExecutionResult, EngineError>;

#[inline]
fn done() -> ExecResult {
    Ok(ExecutionResult::default())
}

#[inline]
fn done_flags(flags: crate::flags::Flags) -> ExecResult {
    Ok(ExecutionResult { flags: Some(flags), ..ExecutionResult::default() })
}

#[inline]
fn internal(cpu: &mut Processor, tstates: u8) {
    cpu.cycle(MCycle::Internal(tstates));
}

/// Reads the value of an 8-bit source operand; memory operands emit their
/// read cycle, the indexed effective address comes from WZ.
fn load8(cpu: &mut Processor, pkg: &InstructionPackage<'_>, operand: Operand)
    -> Result<u8, EngineError>
{
    Ok(match operand {
        Operand::Reg(reg) => cpu.regs.get8(reg),
        Operand::IndHL => {
            let hl = cpu.regs.hl();
            cpu.read_mem(hl)?
        }
        Operand::IndBC => {
            let bc = cpu.regs.bc();
            cpu.read_mem(bc)?
        }
        Operand::IndDE => {
            let de = cpu.regs.de();
            cpu.read_mem(de)?
        }
        Operand::Indexed => {
            let ea = cpu.regs.wz();
            cpu.read_mem(ea)?
        }
        Operand::Imm8 => pkg.args.imm8(),
        _ => unreachable!("not an 8-bit source operand")
    })
}

/// Writes the value of an 8-bit destination operand; memory operands emit
/// their write cycle.
fn store8(cpu: &mut Processor, val: u8, operand: Operand) -> Result<(), EngineError> {
    match operand {
        Operand::Reg(reg) => cpu.regs.set8(reg, val),
        Operand::IndHL => {
            let hl = cpu.regs.hl();
            cpu.write_mem(hl, val)?;
        }
        Operand::IndBC => {
            let bc = cpu.regs.bc();
            cpu.write_mem(bc, val)?;
        }
        Operand::IndDE => {
            let de = cpu.regs.de();
            cpu.write_mem(de, val)?;
        }
        Operand::Indexed => {
            let ea = cpu.regs.wz();
            cpu.write_mem(ea, val)?;
        }
        _ => unreachable!("not an 8-bit destination operand")
    }
    Ok(())
}

#[inline]
fn is_memory(operand: Operand) -> bool {
    matches!(operand, Operand::IndHL | Operand::Indexed)
}

#[inline]
fn pair_of(operand: Operand) -> Reg16 {
    match operand {
        Operand::Pair(pair) => pair,
        _ => unreachable!("not a register pair operand")
    }
}

#[inline]
fn condition_met(cpu: &Processor, pkg: &InstructionPackage<'_>) -> bool {
    pkg.instruction.condition.map_or(true, |cond| cond.is_satisfied(cpu.regs.flags()))
}

pub(crate) fn nop(_cpu: &mut Processor, _pkg: &InstructionPackage<'_>) -> ExecResult {
    done()
}

// ---- 8-bit and 16-bit loads ----

pub(crate) fn ld8(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let val = load8(cpu, pkg, pkg.instruction.src)?;
    store8(cpu, val, pkg.instruction.dst)?;
    done()
}

/// LD A,(BC) | LD A,(DE) | LD A,(nn) - WZ becomes the address + 1.
pub(crate) fn ld_a_mem(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let addr = match pkg.instruction.src {
        Operand::IndBC => cpu.regs.bc(),
        Operand::IndDE => cpu.regs.de(),
        _ => pkg.args.imm16()
    };
    // addr:3
    let val = cpu.read_mem(addr)?;
    cpu.regs.set_a(val);
    cpu.regs.set_wz(addr.wrapping_add(1));
    done()
}

/// LD (BC),A | LD (DE),A | LD (nn),A - WZ low becomes the address + 1,
/// WZ high the accumulator.
pub(crate) fn ld_mem_a(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let addr = match pkg.instruction.dst {
        Operand::IndBC => cpu.regs.bc(),
        Operand::IndDE => cpu.regs.de(),
        _ => pkg.args.imm16()
    };
    let acc = cpu.regs.a();
    // addr:3
    cpu.write_mem(addr, acc)?;
    cpu.regs.set_wz(bits::word(acc, bits::low_byte(addr.wrapping_add(1))));
    done()
}

pub(crate) fn ld_a_i(cpu: &mut Processor, _pkg: &InstructionPackage<'_>) -> ExecResult {
    let val = cpu.regs.i();
    cpu.regs.set_a(val);
    done_flags(ops::ld_a_ir(val, cpu.iff2, cpu.regs.flags()))
}

pub(crate) fn ld_a_r(cpu: &mut Processor, _pkg: &InstructionPackage<'_>) -> ExecResult {
    let val = cpu.regs.r();
    cpu.regs.set_a(val);
    done_flags(ops::ld_a_ir(val, cpu.iff2, cpu.regs.flags()))
}

pub(crate) fn ld_i_a(cpu: &mut Processor, _pkg: &InstructionPackage<'_>) -> ExecResult {
    let acc = cpu.regs.a();
    cpu.regs.set_i(acc);
    done()
}

pub(crate) fn ld_r_a(cpu: &mut Processor, _pkg: &InstructionPackage<'_>) -> ExecResult {
    let acc = cpu.regs.a();
    cpu.regs.set_r(acc);
    done()
}

pub(crate) fn ld_rr_nn(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let pair = pair_of(pkg.instruction.dst);
    cpu.regs.set16(pair, pkg.args.imm16());
    done()
}

/// LD rr,(nn) - WZ becomes nn + 1.
pub(crate) fn ld_rr_direct(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let addr = pkg.args.imm16();
    // nn:3, nn+1:3
    let val = cpu.read_mem_word(addr)?;
    let pair = pair_of(pkg.instruction.dst);
    cpu.regs.set16(pair, val);
    cpu.regs.set_wz(addr.wrapping_add(1));
    done()
}

/// LD (nn),rr - WZ becomes nn + 1.
pub(crate) fn ld_direct_rr(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let addr = pkg.args.imm16();
    let val = cpu.regs.get16(pair_of(pkg.instruction.src));
    // nn:3, nn+1:3
    cpu.write_mem_word(addr, val)?;
    cpu.regs.set_wz(addr.wrapping_add(1));
    done()
}

pub(crate) fn ld_sp_rr(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let val = cpu.regs.get16(pair_of(pkg.instruction.src));
    cpu.regs.set_sp(val);
    done()
}

// ---- exchanges, the stack ----

pub(crate) fn ex_af_af(cpu: &mut Processor, _pkg: &InstructionPackage<'_>) -> ExecResult {
    cpu.regs.exchange_af();
    done()
}

pub(crate) fn exx(cpu: &mut Processor, _pkg: &InstructionPackage<'_>) -> ExecResult {
    cpu.regs.exchange_bc_de_hl();
    done()
}

pub(crate) fn ex_de_hl(cpu: &mut Processor, _pkg: &InstructionPackage<'_>) -> ExecResult {
    cpu.regs.exchange_de_hl();
    done()
}

/// EX (SP),HL|IX|IY - WZ becomes the new register value.
pub(crate) fn ex_sp_hl(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let sp = cpu.regs.sp();
    // sp:3, sp+1:3
    let stacked = cpu.read_mem_word(sp)?;
    internal(cpu, 1);
    let pair = pair_of(pkg.instruction.dst);
    let val = cpu.regs.get16(pair);
    let (hi, lo) = bits::split_word(val);
    // sp+1:3, sp:3, sp:1 x 2
    cpu.write_mem(sp.wrapping_add(1), hi)?;
    cpu.write_mem(sp, lo)?;
    internal(cpu, 2);
    cpu.regs.set16(pair, stacked);
    cpu.regs.set_wz(stacked);
    done()
}

pub(crate) fn push_rr(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let val = cpu.regs.get16(pair_of(pkg.instruction.src));
    // sp-1:3, sp-2:3
    cpu.push_word(val)?;
    done()
}

pub(crate) fn pop_rr(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    // sp:3, sp+1:3
    let val = cpu.pop_word()?;
    let pair = pair_of(pkg.instruction.dst);
    cpu.regs.set16(pair, val);
    done()
}

// ---- 8-bit arithmetic and logic ----

pub(crate) fn alu_acc(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let acc = cpu.regs.a();
    let val = load8(cpu, pkg, pkg.instruction.src)?;
    let carry = cpu.regs.flags().cf();
    let (res, flags) = match AluOp::from_code(pkg.instruction.opcode) {
        AluOp::Add => cpu.alu_add(acc, val, false),
        AluOp::Adc => cpu.alu_add(acc, val, carry),
        AluOp::Sub => cpu.alu_sub(acc, val, false),
        AluOp::Sbc => cpu.alu_sub(acc, val, carry),
        AluOp::And => cpu.alu_logical(acc, val, LogicOp::And),
        AluOp::Xor => cpu.alu_logical(acc, val, LogicOp::Xor),
        AluOp::Or => cpu.alu_logical(acc, val, LogicOp::Or),
        AluOp::Cp => {
            // the accumulator is left alone
            return done_flags(ops::cp(acc, val));
        }
    };
    cpu.regs.set_a(res);
    done_flags(flags)
}

pub(crate) fn inc8(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let dst = pkg.instruction.dst;
    let val = load8(cpu, pkg, dst)?;
    if is_memory(dst) {
        internal(cpu, 1);
    }
    let (res, flags) = ops::inc(val, cpu.regs.flags());
    store8(cpu, res, dst)?;
    done_flags(flags)
}

pub(crate) fn dec8(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let dst = pkg.instruction.dst;
    let val = load8(cpu, pkg, dst)?;
    if is_memory(dst) {
        internal(cpu, 1);
    }
    let (res, flags) = ops::dec(val, cpu.regs.flags());
    store8(cpu, res, dst)?;
    done_flags(flags)
}

pub(crate) fn neg_acc(cpu: &mut Processor, _pkg: &InstructionPackage<'_>) -> ExecResult {
    let (res, flags) = ops::neg(cpu.regs.a());
    cpu.regs.set_a(res);
    done_flags(flags)
}

pub(crate) fn daa_acc(cpu: &mut Processor, _pkg: &InstructionPackage<'_>) -> ExecResult {
    let (res, flags) = ops::daa(cpu.regs.a(), cpu.regs.flags());
    cpu.regs.set_a(res);
    done_flags(flags)
}

pub(crate) fn cpl_acc(cpu: &mut Processor, _pkg: &InstructionPackage<'_>) -> ExecResult {
    let (res, flags) = ops::cpl(cpu.regs.a(), cpu.regs.flags());
    cpu.regs.set_a(res);
    done_flags(flags)
}

pub(crate) fn scf_op(cpu: &mut Processor, _pkg: &InstructionPackage<'_>) -> ExecResult {
    done_flags(ops::scf(cpu.regs.a(), cpu.regs.flags()))
}

pub(crate) fn ccf_op(cpu: &mut Processor, _pkg: &InstructionPackage<'_>) -> ExecResult {
    done_flags(ops::ccf(cpu.regs.a(), cpu.regs.flags()))
}

// ---- 16-bit arithmetic ----

/// ADD HL|IX|IY,rr - WZ becomes the pre-add value + 1.
pub(crate) fn add_hl(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let dst = pair_of(pkg.instruction.dst);
    let a = cpu.regs.get16(dst);
    let b = cpu.regs.get16(pair_of(pkg.instruction.src));
    let (res, flags) = ops::add16(a, b, cpu.regs.flags());
    cpu.regs.set16(dst, res);
    cpu.regs.set_wz(a.wrapping_add(1));
    done_flags(flags)
}

pub(crate) fn adc_hl(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let hl = cpu.regs.hl();
    let b = cpu.regs.get16(pair_of(pkg.instruction.src));
    let (res, flags) = ops::adc16(hl, b, cpu.regs.flags().cf());
    cpu.regs.set_hl(res);
    cpu.regs.set_wz(hl.wrapping_add(1));
    done_flags(flags)
}

pub(crate) fn sbc_hl(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let hl = cpu.regs.hl();
    let b = cpu.regs.get16(pair_of(pkg.instruction.src));
    let (res, flags) = ops::sbc16(hl, b, cpu.regs.flags().cf());
    cpu.regs.set_hl(res);
    cpu.regs.set_wz(hl.wrapping_add(1));
    done_flags(flags)
}

pub(crate) fn inc_rr(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let pair = pair_of(pkg.instruction.dst);
    let val = cpu.regs.get16(pair).wrapping_add(1);
    cpu.regs.set16(pair, val);
    done()
}

pub(crate) fn dec_rr(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let pair = pair_of(pkg.instruction.dst);
    let val = cpu.regs.get16(pair).wrapping_sub(1);
    cpu.regs.set16(pair, val);
    done()
}

// ---- rotates, shifts and bit operations ----

pub(crate) fn acc_rotate(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let op = match (pkg.instruction.opcode >> 3) & 3 {
        0 => AccRot::Rlca,
        1 => AccRot::Rrca,
        2 => AccRot::Rla,
        _ => AccRot::Rra
    };
    let (res, flags) = cpu.alu_acc_rotate(op, cpu.regs.a(), cpu.regs.flags());
    cpu.regs.set_a(res);
    done_flags(flags)
}

pub(crate) fn rotate_shift(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let dst = pkg.instruction.dst;
    let val = load8(cpu, pkg, dst)?;
    if is_memory(dst) {
        internal(cpu, 1);
    }
    let (res, flags) = Rot::from_code(pkg.instruction.opcode).apply(val, cpu.regs.flags());
    store8(cpu, res, dst)?;
    copy_result(cpu, pkg, res);
    done_flags(flags)
}

pub(crate) fn bit_test(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let src = pkg.instruction.src;
    let bit = u32::from(pkg.instruction.bit.unwrap_or(0));
    let val = load8(cpu, pkg, src)?;
    let flags = cpu.regs.flags();
    if is_memory(src) {
        internal(cpu, 1);
        // the undocumented X/Y bits leak from the internal WZ latch
        done_flags(ops::bit_wz(bit, val, bits::high_byte(cpu.regs.wz()), flags))
    }
    else {
        done_flags(ops::bit(bit, val, flags))
    }
}

pub(crate) fn bit_reset(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let dst = pkg.instruction.dst;
    let bit = u32::from(pkg.instruction.bit.unwrap_or(0));
    let val = load8(cpu, pkg, dst)?;
    if is_memory(dst) {
        internal(cpu, 1);
    }
    let res = bits::bit_reset(val, bit);
    store8(cpu, res, dst)?;
    copy_result(cpu, pkg, res);
    done()
}

pub(crate) fn bit_set(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let dst = pkg.instruction.dst;
    let bit = u32::from(pkg.instruction.bit.unwrap_or(0));
    let val = load8(cpu, pkg, dst)?;
    if is_memory(dst) {
        internal(cpu, 1);
    }
    let res = bits::bit_set(val, bit);
    store8(cpu, res, dst)?;
    copy_result(cpu, pkg, res);
    done()
}

/// The undocumented DDCB/FDCB forms also copy the memory result into the
/// register encoded in the low three bits of the opcode.
fn copy_result(cpu: &mut Processor, pkg: &InstructionPackage<'_>, res: u8) {
    if pkg.instruction.copies_result {
        if let Some(reg) = crate::registers::Registers::register_by_opcode(pkg.instruction.opcode) {
            cpu.regs.set8(reg, res);
        }
    }
}

/// RLD - WZ becomes HL + 1.
pub(crate) fn rld_op(cpu: &mut Processor, _pkg: &InstructionPackage<'_>) -> ExecResult {
    let hl = cpu.regs.hl();
    // hl:3, hl:1 x 4, hl(write):3
    let mem = cpu.read_mem(hl)?;
    internal(cpu, 4);
    let (acc, mem, flags) = ops::rld(cpu.regs.a(), mem, cpu.regs.flags());
    cpu.write_mem(hl, mem)?;
    cpu.regs.set_a(acc);
    cpu.regs.set_wz(hl.wrapping_add(1));
    done_flags(flags)
}

/// RRD - WZ becomes HL + 1.
pub(crate) fn rrd_op(cpu: &mut Processor, _pkg: &InstructionPackage<'_>) -> ExecResult {
    let hl = cpu.regs.hl();
    let mem = cpu.read_mem(hl)?;
    internal(cpu, 4);
    let (acc, mem, flags) = ops::rrd(cpu.regs.a(), mem, cpu.regs.flags());
    cpu.write_mem(hl, mem)?;
    cpu.regs.set_a(acc);
    cpu.regs.set_wz(hl.wrapping_add(1));
    done_flags(flags)
}

// ---- jumps, calls and returns ----

/// JP nn and JP cc,nn - WZ becomes nn whether the branch is taken or not.
pub(crate) fn jp_direct(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let target = pkg.args.imm16();
    cpu.regs.set_wz(target);
    if condition_met(cpu, pkg) {
        cpu.override_pc(target);
    }
    done()
}

/// JP (HL)|(IX)|(IY) - no WZ update.
pub(crate) fn jp_hl(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let target = cpu.regs.get16(pair_of(pkg.instruction.src));
    cpu.override_pc(target);
    done()
}

pub(crate) fn jr_disp(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    if condition_met(cpu, pkg) {
        // pc+1:1 x 5
        internal(cpu, 5);
        let target = bits::displace(cpu.regs.pc(), pkg.args.disp());
        cpu.jump(target);
    }
    done()
}

pub(crate) fn djnz(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let b = cpu.regs.get8(Reg8::B).wrapping_sub(1);
    cpu.regs.set8(Reg8::B, b);
    if b != 0 {
        // pc+1:1 x 5
        internal(cpu, 5);
        let target = bits::displace(cpu.regs.pc(), pkg.args.disp());
        cpu.jump(target);
    }
    done()
}

/// CALL nn and CALL cc,nn - WZ becomes nn whether taken or not.
pub(crate) fn call_direct(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let target = pkg.args.imm16();
    cpu.regs.set_wz(target);
    if condition_met(cpu, pkg) {
        // pc+2:1, sp-1:3, sp-2:3
        internal(cpu, 1);
        let ret = cpu.regs.pc();
        cpu.push_word(ret)?;
        cpu.override_pc(target);
    }
    done()
}

pub(crate) fn ret(cpu: &mut Processor, _pkg: &InstructionPackage<'_>) -> ExecResult {
    // sp:3, sp+1:3
    let addr = cpu.pop_word()?;
    cpu.jump(addr);
    done()
}

pub(crate) fn ret_cond(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    if condition_met(cpu, pkg) {
        let addr = cpu.pop_word()?;
        cpu.jump(addr);
    }
    done()
}

/// RETN and RETI both restore IFF1 from IFF2 for the NMI exit semantics.
pub(crate) fn retn(cpu: &mut Processor, _pkg: &InstructionPackage<'_>) -> ExecResult {
    cpu.restore_iff1();
    let addr = cpu.pop_word()?;
    cpu.jump(addr);
    done()
}

pub(crate) fn rst(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    // sp-1:3, sp-2:3
    let ret = cpu.regs.pc();
    cpu.push_word(ret)?;
    cpu.jump(restart_address(pkg.instruction.opcode));
    done()
}

// ---- input/output ----

/// IN A,(n) - WZ becomes (A << 8 | n) + 1; no flags are affected.
pub(crate) fn in_a_imm(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let acc = cpu.regs.a();
    let port = pkg.args.imm8();
    cpu.regs.set_wz(bits::word(acc, port).wrapping_add(1));
    let val = cpu.port_read(acc, port);
    cpu.regs.set_a(val);
    done()
}

/// IN r,(C) and the flag-only IN (C) - WZ becomes BC + 1.
pub(crate) fn in_reg_c(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let bc = cpu.regs.bc();
    cpu.regs.set_wz(bc.wrapping_add(1));
    let val = cpu.port_read(bits::high_byte(bc), bits::low_byte(bc));
    if let Operand::Reg(reg) = pkg.instruction.dst {
        cpu.regs.set8(reg, val);
    }
    done_flags(ops::in_flags(val, cpu.regs.flags()))
}

/// OUT (n),A - WZ low becomes n + 1, WZ high the accumulator.
pub(crate) fn out_imm_a(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let acc = cpu.regs.a();
    let port = pkg.args.imm8();
    cpu.regs.set_wz(bits::word(acc, port.wrapping_add(1)));
    cpu.port_write(acc, port, acc);
    done()
}

/// OUT (C),r and the undocumented OUT (C),0 - WZ becomes BC + 1.
pub(crate) fn out_c_reg(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let bc = cpu.regs.bc();
    cpu.regs.set_wz(bc.wrapping_add(1));
    let val = match pkg.instruction.src {
        Operand::Reg(reg) => cpu.regs.get8(reg),
        _ => 0
    };
    cpu.port_write(bits::high_byte(bc), bits::low_byte(bc), val);
    done()
}

// ---- block transfer, search and I/O ----

/// LDI/LDD/LDIR/LDDR - bit 3 of the opcode selects the direction, the
/// repeating forms report `repeat` while BC has not reached zero.
pub(crate) fn block_load(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let decrease = pkg.instruction.opcode & 0b1000 != 0;
    let hl = cpu.regs.hl();
    let de = cpu.regs.de();
    // hl:3, de:3, de:1 x 2
    let val = cpu.read_mem(hl)?;
    cpu.write_mem(de, val)?;
    internal(cpu, 2);
    let step = if decrease { 0xFFFFu16 } else { 1 };
    cpu.regs.set_hl(hl.wrapping_add(step));
    cpu.regs.set_de(de.wrapping_add(step));
    let bc = cpu.regs.bc().wrapping_sub(1);
    cpu.regs.set_bc(bc);
    let flags = ops::block_transfer(cpu.regs.a(), val, bc != 0, cpu.regs.flags());
    if pkg.instruction.looping && bc != 0 {
        // de:1 x 5
        internal(cpu, 5);
        cpu.regs.set_wz(pkg.address.wrapping_add(1));
        return Ok(ExecutionResult { flags: Some(flags), repeat: true, ..ExecutionResult::default() });
    }
    done_flags(flags)
}

/// CPI/CPD/CPIR/CPDR - the repeating forms stop on BC reaching zero or on
/// a match.
pub(crate) fn block_compare(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let decrease = pkg.instruction.opcode & 0b1000 != 0;
    let hl = cpu.regs.hl();
    // hl:3, hl:1 x 5
    let val = cpu.read_mem(hl)?;
    internal(cpu, 5);
    let step = if decrease { 0xFFFFu16 } else { 1 };
    cpu.regs.set_hl(hl.wrapping_add(step));
    let bc = cpu.regs.bc().wrapping_sub(1);
    cpu.regs.set_bc(bc);
    let flags = ops::block_compare(cpu.regs.a(), val, bc != 0, cpu.regs.flags());
    cpu.regs.set_wz(cpu.regs.wz().wrapping_add(step));
    if pkg.instruction.looping && bc != 0 && !flags.zf() {
        // hl:1 x 5
        internal(cpu, 5);
        cpu.regs.set_wz(pkg.address.wrapping_add(1));
        return Ok(ExecutionResult { flags: Some(flags), repeat: true, ..ExecutionResult::default() });
    }
    done_flags(flags)
}

/// INI/IND/INIR/INDR - B is the loop counter.
pub(crate) fn block_in(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let decrease = pkg.instruction.opcode & 0b1000 != 0;
    let b = cpu.regs.get8(Reg8::B);
    let c = cpu.regs.get8(Reg8::C);
    let step = if decrease { 0xFFFFu16 } else { 1 };
    cpu.regs.set_wz(bits::word(b, c).wrapping_add(step));
    // io:4, hl:3
    let val = cpu.port_read(b, c);
    let hl = cpu.regs.hl();
    cpu.write_mem(hl, val)?;
    cpu.regs.set_hl(hl.wrapping_add(step));
    let b = b.wrapping_sub(1);
    cpu.regs.set8(Reg8::B, b);
    let adjusted = if decrease { c.wrapping_sub(1) } else { c.wrapping_add(1) };
    let flags = ops::block_io(val, b, adjusted);
    if pkg.instruction.looping && b != 0 {
        internal(cpu, 5);
        cpu.regs.set_wz(pkg.address.wrapping_add(1));
        return Ok(ExecutionResult { flags: Some(flags), repeat: true, ..ExecutionResult::default() });
    }
    done_flags(flags)
}

/// OUTI/OUTD/OTIR/OTDR - B decrements before it rides the address bus.
pub(crate) fn block_out(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let decrease = pkg.instruction.opcode & 0b1000 != 0;
    let hl = cpu.regs.hl();
    // hl:3, io:4
    let val = cpu.read_mem(hl)?;
    let b = cpu.regs.get8(Reg8::B).wrapping_sub(1);
    cpu.regs.set8(Reg8::B, b);
    let c = cpu.regs.get8(Reg8::C);
    cpu.port_write(b, c, val);
    let step = if decrease { 0xFFFFu16 } else { 1 };
    let hl = hl.wrapping_add(step);
    cpu.regs.set_hl(hl);
    cpu.regs.set_wz(bits::word(b, c).wrapping_add(step));
    let flags = ops::block_io(val, b, bits::low_byte(hl));
    if pkg.instruction.looping && b != 0 {
        internal(cpu, 5);
        cpu.regs.set_wz(pkg.address.wrapping_add(1));
        return Ok(ExecutionResult { flags: Some(flags), repeat: true, ..ExecutionResult::default() });
    }
    done_flags(flags)
}

// ---- interrupt control, HALT ----

pub(crate) fn di_op(cpu: &mut Processor, _pkg: &InstructionPackage<'_>) -> ExecResult {
    cpu.disable_interrupts();
    done()
}

/// EI defers the re-enable until after the next instruction.
pub(crate) fn ei_op(cpu: &mut Processor, _pkg: &InstructionPackage<'_>) -> ExecResult {
    cpu.enable_interrupts();
    done()
}

pub(crate) fn im_mode(cpu: &mut Processor, pkg: &InstructionPackage<'_>) -> ExecResult {
    let im = match (pkg.instruction.opcode >> 3) & 3 {
        0 | 1 => InterruptMode::Mode0,
        2 => InterruptMode::Mode1,
        _ => InterruptMode::Mode2
    };
    cpu.im = im;
    done()
}

/// HALT - the engine keeps synthesizing NOP fetches until an interrupt;
/// PC already points past the instruction.
pub(crate) fn halt_op(cpu: &mut Processor, _pkg: &InstructionPackage<'_>) -> ExecResult {
    cpu.enter_halt();
    done()
}
