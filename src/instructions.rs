/*
    zeta80: a cycle-accurate ZiLOG Z80 microprocessor emulation library.
    Copyright (C) 2019-2024  Rafal Michalski

    For the full copyright notice, see the lib.rs file.
*/
//! Instruction descriptors, the dispatch tables for every prefix scheme
//! and the decoder.
//!
//! The unprefixed, CB and ED tables are built row by row; the DD and FD
//! tables are derived from the unprefixed table by the index register
//! substitution rules, and the DDCB/FDCB tables from the CB table. Each
//! descriptor carries the documented machine-cycle sequence; the leading
//! `lead` cycles (prefix and opcode fetches, operand reads and the
//! unconditional internals adjacent to them) are emitted by the engine,
//! the rest by the microcode.
use std::sync::Arc;

use crate::decode::{Arity, Condition, DecodedArgs, Operand, PrefixTag, Rot};
use crate::engine::Processor;
use crate::error::EngineError;
use crate::exec;
use crate::flags::Flags;
use crate::mcycle::{CycleSeq, MCycle};
use crate::registers::{Reg8, Reg16, Registers};

/// A microcode entry point.
pub type Microcode = fn(&mut Processor, &InstructionPackage<'_>) -> Result<ExecutionResult, EngineError>;

/// An immutable description of one decoded instruction form.
#[derive(Debug, Clone)]
pub struct Instruction {
    /// The base mnemonic.
    pub mnemonic: &'static str,
    /// The final opcode byte (the displacement excluded).
    pub opcode: u8,
    /// The prefix scheme this instruction was decoded from.
    pub prefix: PrefixTag,
    /// Total instruction length in bytes, prefixes and operands included.
    pub size: u8,
    /// The operand bytes following the opcode.
    pub arity: Arity,
    /// The destination operand.
    pub dst: Operand,
    /// The source operand.
    pub src: Operand,
    /// The bit index of the BIT/RES/SET groups.
    pub bit: Option<u8>,
    /// The branching condition of the conditional forms.
    pub condition: Option<Condition>,
    /// The base machine-cycle sequence.
    pub cycles: CycleSeq,
    /// The machine-cycle sequence of the taken/repeating path.
    pub cycles_taken: Option<CycleSeq>,
    /// How many leading entries of `cycles` the engine emits itself.
    pub lead: u8,
    /// A repeating block instruction.
    pub looping: bool,
    /// An undocumented DDCB/FDCB form that also copies the memory result
    /// into the register encoded in the low three bits of the opcode.
    pub copies_result: bool,
    /// The microcode implementing this instruction.
    pub exec: Microcode
}

/// One instruction bound to its decoded operand bytes and fetch address.
/// Lives only for a single iteration of the engine.
#[derive(Debug, Clone, Copy)]
pub struct InstructionPackage<'a> {
    pub instruction: &'a Instruction,
    pub args: DecodedArgs,
    /// PC at which the first byte of the instruction was fetched.
    pub address: u16
}

/// What a microcode hands back to the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// The replacement Flags register value, if the instruction writes it.
    pub flags: Option<Flags>,
    /// Host requested wait cycles inserted while this instruction executed.
    pub wait_states_added: u16,
    /// A looping block instruction that must re-execute at the same address.
    pub repeat: bool
}

/// The outcome of decoding the prefetch buffer.
#[derive(Debug)]
pub enum Decoded<'a> {
    /// A complete instruction.
    Package(InstructionPackage<'a>),
    /// A DD/FD prefix followed by another prefix: the first byte acts as a
    /// NOP and must be skipped.
    PrefixNop,
    /// The prefetch buffer ended in the middle of an instruction.
    Underrun
}

const F: MCycle = MCycle::Fetch;
const R: MCycle = MCycle::MemRead;
const W: MCycle = MCycle::MemWrite;
const PR: MCycle = MCycle::PortRead;
const PW: MCycle = MCycle::PortWrite;
const I1: MCycle = MCycle::Internal(1);
const I2: MCycle = MCycle::Internal(2);
const I3: MCycle = MCycle::Internal(3);
const I4: MCycle = MCycle::Internal(4);
const I5: MCycle = MCycle::Internal(5);

fn seq(cycles: &[MCycle]) -> CycleSeq {
    cycles.iter().copied().collect()
}

impl Instruction {
    fn new(mnemonic: &'static str, cycles: &[MCycle], lead: u8, exec: Microcode) -> Self {
        Instruction {
            mnemonic,
            opcode: 0,
            prefix: PrefixTag::None,
            size: 1,
            arity: Arity::None,
            dst: Operand::None,
            src: Operand::None,
            bit: None,
            condition: None,
            cycles: seq(cycles),
            cycles_taken: None,
            lead,
            looping: false,
            copies_result: false,
            exec
        }
    }

    fn arity(mut self, arity: Arity) -> Self { self.arity = arity; self }
    fn dst(mut self, dst: Operand) -> Self { self.dst = dst; self }
    fn src(mut self, src: Operand) -> Self { self.src = src; self }
    fn bit(mut self, bit: u8) -> Self { self.bit = Some(bit); self }
    fn cond(mut self, cond: Condition) -> Self { self.condition = Some(cond); self }
    fn taken(mut self, cycles: &[MCycle]) -> Self { self.cycles_taken = Some(seq(cycles)); self }
    fn looping(mut self) -> Self { self.looping = true; self }

    /// The operand that addresses memory, if the instruction has one.
    pub(crate) fn memory_operand(&self) -> Option<Operand> {
        [self.dst, self.src].into_iter().find(|op| {
            matches!(op, Operand::IndHL | Operand::Indexed)
        })
    }

    /// The T-state total of the base machine-cycle sequence.
    pub fn tstates(&self) -> u32 {
        crate::mcycle::total_tstates(&self.cycles)
    }

    /// The T-state total of the taken/repeating sequence, if different.
    pub fn tstates_taken(&self) -> Option<u32> {
        self.cycles_taken.as_deref().map(crate::mcycle::total_tstates)
    }
}

/// The complete opcode map: one table per prefix scheme.
pub struct InstructionSet {
    main: Box<[Instruction]>,
    cb: Box<[Instruction]>,
    ed: Box<[Instruction]>,
    dd: Box<[Instruction]>,
    fd: Box<[Instruction]>,
    ddcb: Box<[Instruction]>,
    fdcb: Box<[Instruction]>
}

impl InstructionSet {
    /// Builds the whole opcode map.
    pub fn new() -> Arc<InstructionSet> {
        let main = build_main();
        let cb = build_cb();
        let ed = build_ed();
        let dd = derive_index_table(&main, PrefixTag::Dd);
        let fd = derive_index_table(&main, PrefixTag::Fd);
        let ddcb = derive_index_bits_table(&cb, PrefixTag::DdCb);
        let fdcb = derive_index_bits_table(&cb, PrefixTag::FdCb);
        Arc::new(InstructionSet {
            main: main.into_boxed_slice(),
            cb: cb.into_boxed_slice(),
            ed: ed.into_boxed_slice(),
            dd: dd.into_boxed_slice(),
            fd: fd.into_boxed_slice(),
            ddcb: ddcb.into_boxed_slice(),
            fdcb: fdcb.into_boxed_slice()
        })
    }

    /// Returns the dispatch table of one prefix scheme.
    pub fn table(&self, prefix: PrefixTag) -> &[Instruction] {
        match prefix {
            PrefixTag::None => &self.main,
            PrefixTag::Cb => &self.cb,
            PrefixTag::Ed => &self.ed,
            PrefixTag::Dd => &self.dd,
            PrefixTag::Fd => &self.fd,
            PrefixTag::DdCb => &self.ddcb,
            PrefixTag::FdCb => &self.fdcb
        }
    }

    /// Decodes the speculatively prefetched bytes at `pc`.
    ///
    /// `bytes` holds up to 4 bytes starting at the program counter. The
    /// actual number of bytes consumed equals the size of the decoded
    /// instruction.
    pub fn decode<'a>(&'a self, bytes: &[u8], pc: u16) -> Decoded<'a> {
        let b0 = match bytes.first() {
            Some(&b0) => b0,
            None => return Decoded::Underrun
        };
        match b0 {
            0xCB => match bytes.get(1) {
                Some(&op) => self.package(&self.cb[op as usize], bytes, 2, pc),
                None => Decoded::Underrun
            },
            0xED => match bytes.get(1) {
                Some(&op) => self.package(&self.ed[op as usize], bytes, 2, pc),
                None => Decoded::Underrun
            },
            0xDD | 0xFD => {
                let b1 = match bytes.get(1) {
                    Some(&b1) => b1,
                    None => return Decoded::Underrun
                };
                match b1 {
                    // a prefix chain: the first prefix byte decays to a NOP
                    0xDD | 0xFD | 0xED => Decoded::PrefixNop,
                    0xCB => match (bytes.get(2), bytes.get(3)) {
                        (Some(&disp), Some(&op)) => {
                            let table = if b0 == 0xDD { &self.ddcb } else { &self.fdcb };
                            Decoded::Package(InstructionPackage {
                                instruction: &table[op as usize],
                                args: DecodedArgs::Disp(disp as i8),
                                address: pc
                            })
                        }
                        _ => Decoded::Underrun
                    },
                    _ => {
                        let table = if b0 == 0xDD { &self.dd } else { &self.fd };
                        self.package(&table[b1 as usize], bytes, 2, pc)
                    }
                }
            }
            _ => self.package(&self.main[b0 as usize], bytes, 1, pc)
        }
    }

    fn package<'a>(&self, instruction: &'a Instruction, bytes: &[u8], at: usize, pc: u16)
        -> Decoded<'a>
    {
        let args = match instruction.arity {
            Arity::None => DecodedArgs::None,
            Arity::Byte => match bytes.get(at) {
                Some(&n) => DecodedArgs::Byte(n),
                None => return Decoded::Underrun
            },
            Arity::Disp => match bytes.get(at) {
                Some(&d) => DecodedArgs::Disp(d as i8),
                None => return Decoded::Underrun
            },
            Arity::Word => match (bytes.get(at), bytes.get(at + 1)) {
                (Some(&lo), Some(&hi)) => DecodedArgs::Word(u16::from_le_bytes([lo, hi])),
                _ => return Decoded::Underrun
            },
            Arity::DispByte => match (bytes.get(at), bytes.get(at + 1)) {
                (Some(&d), Some(&n)) => DecodedArgs::DispByte(d as i8, n),
                _ => return Decoded::Underrun
            }
        };
        Decoded::Package(InstructionPackage { instruction, args, address: pc })
    }
}

fn finish(table: &mut [Instruction], prefix: PrefixTag) {
    let prefix_bytes = prefix.prefix_bytes();
    for (code, instr) in table.iter_mut().enumerate() {
        instr.opcode = code as u8;
        instr.prefix = prefix;
        instr.size = 1 + prefix_bytes + instr.arity.operand_bytes();
    }
}

fn build_main() -> Vec<Instruction> {
    use Operand::{Reg, Pair, IndHL, IndBC, IndDE, Imm8, Imm16, Direct, PortImm};
    let mut t: Vec<Instruction> = (0..256).map(|_| {
        Instruction::new("NOP", &[F], 1, exec::nop)
    }).collect();

    // the register selected by bits 5..=3 or 2..=0, None meaning (HL)
    let reg = |bits: u8| Registers::register_by_opcode(bits);
    let reg_op = |r: Option<Reg8>| r.map(Reg).unwrap_or(IndHL);

    // 0x00 NOP stays as initialised
    // LD rr,nn / ADD HL,rr / INC rr / DEC rr rows
    for (n, rr) in [Reg16::BC, Reg16::DE, Reg16::HL, Reg16::SP].into_iter().enumerate() {
        let base = (n as u8) << 4;
        t[usize::from(base | 0x01)] = Instruction::new("LD", &[F, R, R], 3, exec::ld_rr_nn)
            .arity(Arity::Word).dst(Pair(rr)).src(Imm16);
        t[usize::from(base | 0x09)] = Instruction::new("ADD", &[F, I4, I3], 3, exec::add_hl)
            .dst(Pair(Reg16::HL)).src(Pair(rr));
        t[usize::from(base | 0x03)] = Instruction::new("INC", &[F, I2], 2, exec::inc_rr)
            .dst(Pair(rr));
        t[usize::from(base | 0x0B)] = Instruction::new("DEC", &[F, I2], 2, exec::dec_rr)
            .dst(Pair(rr));
    }
    // INC r / DEC r / LD r,n rows
    for bits3 in 0..8u8 {
        let dst = reg_op(reg(bits3));
        let (inc_cycles, dec_cycles, ld_cycles, lead_rmw, lead_ld):
            (&[MCycle], &[MCycle], &[MCycle], u8, u8) = if dst == IndHL {
            (&[F, R, I1, W], &[F, R, I1, W], &[F, R, W], 1, 2)
        }
        else {
            (&[F], &[F], &[F, R], 1, 2)
        };
        t[usize::from(bits3 << 3 | 0x04)] =
            Instruction::new("INC", inc_cycles, lead_rmw, exec::inc8).dst(dst);
        t[usize::from(bits3 << 3 | 0x05)] =
            Instruction::new("DEC", dec_cycles, lead_rmw, exec::dec8).dst(dst);
        t[usize::from(bits3 << 3 | 0x06)] =
            Instruction::new("LD", ld_cycles, lead_ld, exec::ld8)
                .arity(Arity::Byte).dst(dst).src(Imm8);
    }
    // the accumulator rotates and the flag ops
    t[0x07] = Instruction::new("RLCA", &[F], 1, exec::acc_rotate);
    t[0x0F] = Instruction::new("RRCA", &[F], 1, exec::acc_rotate);
    t[0x17] = Instruction::new("RLA", &[F], 1, exec::acc_rotate);
    t[0x1F] = Instruction::new("RRA", &[F], 1, exec::acc_rotate);
    t[0x27] = Instruction::new("DAA", &[F], 1, exec::daa_acc);
    t[0x2F] = Instruction::new("CPL", &[F], 1, exec::cpl_acc);
    t[0x37] = Instruction::new("SCF", &[F], 1, exec::scf_op);
    t[0x3F] = Instruction::new("CCF", &[F], 1, exec::ccf_op);
    // the accumulator loads through (BC), (DE) and (nn)
    t[0x02] = Instruction::new("LD", &[F, W], 1, exec::ld_mem_a).dst(IndBC).src(Reg(Reg8::A));
    t[0x12] = Instruction::new("LD", &[F, W], 1, exec::ld_mem_a).dst(IndDE).src(Reg(Reg8::A));
    t[0x32] = Instruction::new("LD", &[F, R, R, W], 3, exec::ld_mem_a)
        .arity(Arity::Word).dst(Direct).src(Reg(Reg8::A));
    t[0x0A] = Instruction::new("LD", &[F, R], 1, exec::ld_a_mem).dst(Reg(Reg8::A)).src(IndBC);
    t[0x1A] = Instruction::new("LD", &[F, R], 1, exec::ld_a_mem).dst(Reg(Reg8::A)).src(IndDE);
    t[0x3A] = Instruction::new("LD", &[F, R, R, R], 3, exec::ld_a_mem)
        .arity(Arity::Word).dst(Reg(Reg8::A)).src(Direct);
    // HL through (nn)
    t[0x22] = Instruction::new("LD", &[F, R, R, W, W], 3, exec::ld_direct_rr)
        .arity(Arity::Word).dst(Direct).src(Pair(Reg16::HL));
    t[0x2A] = Instruction::new("LD", &[F, R, R, R, R], 3, exec::ld_rr_direct)
        .arity(Arity::Word).dst(Pair(Reg16::HL)).src(Direct);
    // exchanges
    t[0x08] = Instruction::new("EX", &[F], 1, exec::ex_af_af);
    t[0xD9] = Instruction::new("EXX", &[F], 1, exec::exx);
    t[0xEB] = Instruction::new("EX", &[F], 1, exec::ex_de_hl);
    t[0xE3] = Instruction::new("EX", &[F, R, R, I1, W, W, I2], 1, exec::ex_sp_hl)
        .dst(Pair(Reg16::HL));
    // relative jumps
    t[0x10] = Instruction::new("DJNZ", &[F, I1, R], 3, exec::djnz)
        .arity(Arity::Disp).taken(&[F, I1, R, I5]);
    t[0x18] = Instruction::new("JR", &[F, R, I5], 2, exec::jr_disp).arity(Arity::Disp);
    for code in [0x20u8, 0x28, 0x30, 0x38] {
        t[usize::from(code)] = Instruction::new("JR", &[F, R], 2, exec::jr_disp)
            .arity(Arity::Disp).taken(&[F, R, I5])
            .cond(Condition::from_jr_code(code));
    }
    // LD r,r' block, 0x76 being HALT
    for code in 0x40..=0x7Fu8 {
        let dst = reg(code >> 3);
        let src = reg(code);
        t[usize::from(code)] = match (dst, src) {
            (None, None) => Instruction::new("HALT", &[F], 1, exec::halt_op),
            (Some(dst), None) =>
                Instruction::new("LD", &[F, R], 1, exec::ld8).dst(Reg(dst)).src(IndHL),
            (None, Some(src)) =>
                Instruction::new("LD", &[F, W], 1, exec::ld8).dst(IndHL).src(Reg(src)),
            (Some(dst), Some(src)) =>
                Instruction::new("LD", &[F], 1, exec::ld8).dst(Reg(dst)).src(Reg(src))
        };
    }
    // the 8-bit arithmetic and logic block
    for code in 0x80..=0xBFu8 {
        let (cycles, src): (&[MCycle], Operand) = match reg(code) {
            Some(r) => (&[F], Reg(r)),
            None => (&[F, R], IndHL)
        };
        t[usize::from(code)] = Instruction::new(alu_mnemonic(code), cycles, 1, exec::alu_acc)
            .src(src);
    }
    // ALU A,n
    for bits3 in 0..8u8 {
        let code = 0xC6 | bits3 << 3;
        t[usize::from(code)] = Instruction::new(alu_mnemonic(code), &[F, R], 2, exec::alu_acc)
            .arity(Arity::Byte).src(Imm8);
    }
    // conditional and unconditional returns, jumps and calls
    for bits3 in 0..8u8 {
        let cond = Condition::from_code(bits3 << 3);
        t[usize::from(0xC0 | bits3 << 3)] =
            Instruction::new("RET", &[F, I1], 2, exec::ret_cond)
                .taken(&[F, I1, R, R]).cond(cond);
        t[usize::from(0xC2 | bits3 << 3)] =
            Instruction::new("JP", &[F, R, R], 3, exec::jp_direct)
                .arity(Arity::Word).cond(cond);
        t[usize::from(0xC4 | bits3 << 3)] =
            Instruction::new("CALL", &[F, R, R], 3, exec::call_direct)
                .arity(Arity::Word).taken(&[F, R, R, I1, W, W]).cond(cond);
        t[usize::from(0xC7 | bits3 << 3)] =
            Instruction::new("RST", &[F, I1, W, W], 2, exec::rst);
    }
    t[0xC3] = Instruction::new("JP", &[F, R, R], 3, exec::jp_direct).arity(Arity::Word);
    t[0xC9] = Instruction::new("RET", &[F, R, R], 1, exec::ret);
    t[0xCD] = Instruction::new("CALL", &[F, R, R, I1, W, W], 3, exec::call_direct)
        .arity(Arity::Word);
    t[0xE9] = Instruction::new("JP", &[F], 1, exec::jp_hl).src(Pair(Reg16::HL));
    // the stack
    for (n, rr) in [Reg16::BC, Reg16::DE, Reg16::HL, Reg16::AF].into_iter().enumerate() {
        let base = (n as u8) << 4;
        t[usize::from(0xC5 | base)] = Instruction::new("PUSH", &[F, I1, W, W], 2, exec::push_rr)
            .src(Pair(rr));
        t[usize::from(0xC1 | base)] = Instruction::new("POP", &[F, R, R], 1, exec::pop_rr)
            .dst(Pair(rr));
    }
    t[0xF9] = Instruction::new("LD", &[F, I2], 2, exec::ld_sp_rr)
        .dst(Pair(Reg16::SP)).src(Pair(Reg16::HL));
    // I/O through an immediate port
    t[0xD3] = Instruction::new("OUT", &[F, R, PW], 2, exec::out_imm_a)
        .arity(Arity::Byte).dst(PortImm).src(Reg(Reg8::A));
    t[0xDB] = Instruction::new("IN", &[F, R, PR], 2, exec::in_a_imm)
        .arity(Arity::Byte).dst(Reg(Reg8::A)).src(PortImm);
    // interrupt control
    t[0xF3] = Instruction::new("DI", &[F], 1, exec::di_op);
    t[0xFB] = Instruction::new("EI", &[F], 1, exec::ei_op);

    finish(&mut t, PrefixTag::None);
    t
}

fn alu_mnemonic(code: u8) -> &'static str {
    use crate::decode::AluOp;
    match AluOp::from_code(code) {
        AluOp::Add => "ADD",
        AluOp::Adc => "ADC",
        AluOp::Sub => "SUB",
        AluOp::Sbc => "SBC",
        AluOp::And => "AND",
        AluOp::Xor => "XOR",
        AluOp::Or => "OR",
        AluOp::Cp => "CP"
    }
}

fn rot_mnemonic(code: u8) -> &'static str {
    match Rot::from_code(code) {
        Rot::Rlc => "RLC",
        Rot::Rrc => "RRC",
        Rot::Rl => "RL",
        Rot::Rr => "RR",
        Rot::Sla => "SLA",
        Rot::Sra => "SRA",
        Rot::Sll => "SLL",
        Rot::Srl => "SRL"
    }
}

fn build_cb() -> Vec<Instruction> {
    use Operand::*;
    let mut t = Vec::with_capacity(256);
    for code in 0..=255u8 {
        let target = Registers::register_by_opcode(code).map(Reg).unwrap_or(IndHL);
        let bitnum = (code >> 3) & 7;
        let instr = match code >> 6 {
            0b00 => {
                let (cycles, lead): (&[MCycle], u8) = if target == IndHL {
                    (&[F, F, R, I1, W], 2)
                }
                else {
                    (&[F, F], 2)
                };
                Instruction::new(rot_mnemonic(code), cycles, lead, exec::rotate_shift)
                    .dst(target)
            }
            0b01 => {
                let (cycles, lead): (&[MCycle], u8) = if target == IndHL {
                    (&[F, F, R, I1], 2)
                }
                else {
                    (&[F, F], 2)
                };
                Instruction::new("BIT", cycles, lead, exec::bit_test)
                    .src(target).bit(bitnum)
            }
            group => {
                let (cycles, lead): (&[MCycle], u8) = if target == IndHL {
                    (&[F, F, R, I1, W], 2)
                }
                else {
                    (&[F, F], 2)
                };
                let (mnemonic, exec): (&'static str, Microcode) = if group == 0b10 {
                    ("RES", exec::bit_reset)
                }
                else {
                    ("SET", exec::bit_set)
                };
                Instruction::new(mnemonic, cycles, lead, exec).dst(target).bit(bitnum)
            }
        };
        t.push(instr);
    }
    finish(&mut t, PrefixTag::Cb);
    t
}

fn build_ed() -> Vec<Instruction> {
    use Operand::*;
    // every undefined ED encoding is an "ED NOP" of two bytes
    let mut t: Vec<Instruction> = (0..256).map(|_| {
        Instruction::new("NOP*", &[F, F], 2, exec::nop)
    }).collect();

    for bits3 in 0..8u8 {
        // IN r,(C) and OUT (C),r; ED 70/71 are the undocumented
        // flag-only input and the zero output
        let reg = Registers::register_by_opcode(bits3);
        let in_dst = reg.map(Reg).unwrap_or(Operand::None);
        let out_src = reg.map(Reg).unwrap_or(Operand::None);
        t[usize::from(0x40 | bits3 << 3)] =
            Instruction::new("IN", &[F, F, PR], 2, exec::in_reg_c).dst(in_dst).src(PortC);
        t[usize::from(0x41 | bits3 << 3)] =
            Instruction::new("OUT", &[F, F, PW], 2, exec::out_c_reg).dst(PortC).src(out_src);
    }
    for (n, rr) in [Reg16::BC, Reg16::DE, Reg16::HL, Reg16::SP].into_iter().enumerate() {
        let base = (n as u8) << 4;
        t[usize::from(0x42 | base)] = Instruction::new("SBC", &[F, F, I4, I3], 4, exec::sbc_hl)
            .dst(Pair(Reg16::HL)).src(Pair(rr));
        t[usize::from(0x4A | base)] = Instruction::new("ADC", &[F, F, I4, I3], 4, exec::adc_hl)
            .dst(Pair(Reg16::HL)).src(Pair(rr));
        t[usize::from(0x43 | base)] = Instruction::new("LD", &[F, F, R, R, W, W], 4, exec::ld_direct_rr)
            .arity(Arity::Word).dst(Direct).src(Pair(rr));
        t[usize::from(0x4B | base)] = Instruction::new("LD", &[F, F, R, R, R, R], 4, exec::ld_rr_direct)
            .arity(Arity::Word).dst(Pair(rr)).src(Direct);
    }
    // NEG and RETN repeat through the whole column; ED 4D is RETI
    for bits3 in 0..8u8 {
        t[usize::from(0x44 | bits3 << 3)] = Instruction::new("NEG", &[F, F], 2, exec::neg_acc);
        t[usize::from(0x45 | bits3 << 3)] = Instruction::new("RETN", &[F, F, R, R], 2, exec::retn);
    }
    t[0x4D] = Instruction::new("RETI", &[F, F, R, R], 2, exec::retn);
    // IM 0/1/2 including the undocumented duplicates
    for code in [0x46u8, 0x4E, 0x56, 0x5E, 0x66, 0x6E, 0x76, 0x7E] {
        t[usize::from(code)] = Instruction::new("IM", &[F, F], 2, exec::im_mode);
    }
    t[0x47] = Instruction::new("LD", &[F, F, I1], 3, exec::ld_i_a);
    t[0x4F] = Instruction::new("LD", &[F, F, I1], 3, exec::ld_r_a);
    t[0x57] = Instruction::new("LD", &[F, F, I1], 3, exec::ld_a_i);
    t[0x5F] = Instruction::new("LD", &[F, F, I1], 3, exec::ld_a_r);
    t[0x67] = Instruction::new("RRD", &[F, F, R, I4, W], 2, exec::rrd_op);
    t[0x6F] = Instruction::new("RLD", &[F, F, R, I4, W], 2, exec::rld_op);
    // the block groups
    t[0xA0] = Instruction::new("LDI", &[F, F, R, W, I2], 2, exec::block_load);
    t[0xA8] = Instruction::new("LDD", &[F, F, R, W, I2], 2, exec::block_load);
    t[0xB0] = Instruction::new("LDIR", &[F, F, R, W, I2], 2, exec::block_load)
        .taken(&[F, F, R, W, I2, I5]).looping();
    t[0xB8] = Instruction::new("LDDR", &[F, F, R, W, I2], 2, exec::block_load)
        .taken(&[F, F, R, W, I2, I5]).looping();
    t[0xA1] = Instruction::new("CPI", &[F, F, R, I5], 2, exec::block_compare);
    t[0xA9] = Instruction::new("CPD", &[F, F, R, I5], 2, exec::block_compare);
    t[0xB1] = Instruction::new("CPIR", &[F, F, R, I5], 2, exec::block_compare)
        .taken(&[F, F, R, I5, I5]).looping();
    t[0xB9] = Instruction::new("CPDR", &[F, F, R, I5], 2, exec::block_compare)
        .taken(&[F, F, R, I5, I5]).looping();
    t[0xA2] = Instruction::new("INI", &[F, F, I1, PR, W], 3, exec::block_in);
    t[0xAA] = Instruction::new("IND", &[F, F, I1, PR, W], 3, exec::block_in);
    t[0xB2] = Instruction::new("INIR", &[F, F, I1, PR, W], 3, exec::block_in)
        .taken(&[F, F, I1, PR, W, I5]).looping();
    t[0xBA] = Instruction::new("INDR", &[F, F, I1, PR, W], 3, exec::block_in)
        .taken(&[F, F, I1, PR, W, I5]).looping();
    t[0xA3] = Instruction::new("OUTI", &[F, F, I1, R, PW], 3, exec::block_out);
    t[0xAB] = Instruction::new("OUTD", &[F, F, I1, R, PW], 3, exec::block_out);
    t[0xB3] = Instruction::new("OTIR", &[F, F, I1, R, PW], 3, exec::block_out)
        .taken(&[F, F, I1, R, PW, I5]).looping();
    t[0xBB] = Instruction::new("OTDR", &[F, F, I1, R, PW], 3, exec::block_out)
        .taken(&[F, F, I1, R, PW, I5]).looping();

    finish(&mut t, PrefixTag::Ed);
    t
}

/// Derives the DD or FD table from the unprefixed one.
///
/// Instructions addressing (HL) gain a displacement operand and become
/// (IX+d)/(IY+d), keeping H and L intact; everywhere else H, L and HL are
/// substituted with the index register and its halves. `EX DE,HL` and the
/// exchanges carry no register operands and are naturally unaffected.
fn derive_index_table(main: &[Instruction], prefix: PrefixTag) -> Vec<Instruction> {
    let pair = prefix.index_reg().unwrap();
    let (high, low) = match pair {
        Reg16::IX => (Reg8::IXH, Reg8::IXL),
        _ => (Reg8::IYH, Reg8::IYL)
    };
    let mut t: Vec<Instruction> = main.iter().map(|base| {
        let mut instr = base.clone();
        let head_len = usize::from(base.lead);
        if base.memory_operand() == Some(Operand::IndHL) {
            // the displacement resolution costs 5 internal T-states,
            // except for LD (IX+d),n which overlaps it with the operand
            // read and only needs 2
            let resolve = if base.arity == Arity::Byte { I2 } else { I5 };
            instr.arity = match base.arity {
                Arity::None => Arity::Disp,
                Arity::Byte => Arity::DispByte,
                arity => arity
            };
            instr.cycles = rebuild_indexed(&base.cycles, head_len, resolve);
            if let Some(taken) = base.cycles_taken.as_ref() {
                instr.cycles_taken = Some(rebuild_indexed(taken, head_len, resolve));
            }
            // prefix fetch + displacement read + the resolution internal
            instr.lead = base.lead + 3;
            instr.dst = sub_indexed(base.dst);
            instr.src = sub_indexed(base.src);
        }
        else {
            let mut cycles = seq(&[F]);
            cycles.extend(base.cycles.iter().copied());
            instr.cycles = cycles;
            if let Some(taken) = base.cycles_taken.as_ref() {
                let mut cycles = seq(&[F]);
                cycles.extend(taken.iter().copied());
                instr.cycles_taken = Some(cycles);
            }
            instr.lead = base.lead + 1;
            instr.dst = sub_halves(base.dst, pair, high, low);
            instr.src = sub_halves(base.src, pair, high, low);
        }
        instr
    }).collect();
    finish(&mut t, prefix);
    t
}

fn sub_indexed(op: Operand) -> Operand {
    match op {
        Operand::IndHL => Operand::Indexed,
        other => other
    }
}

fn sub_halves(op: Operand, pair: Reg16, high: Reg8, low: Reg8) -> Operand {
    match op {
        Operand::Reg(Reg8::H) => Operand::Reg(high),
        Operand::Reg(Reg8::L) => Operand::Reg(low),
        Operand::Pair(Reg16::HL) => Operand::Pair(pair),
        other => other
    }
}

/// Prepends the prefix fetch and weaves the displacement read and its
/// resolution internal into the head of an indexed cycle sequence.
fn rebuild_indexed(cycles: &[MCycle], head_len: usize, resolve: MCycle) -> CycleSeq {
    let mut out = CycleSeq::new();
    out.push(F);             // the prefix fetch
    out.push(cycles[0]);     // the opcode fetch
    out.push(R);             // the displacement byte
    out.extend(cycles[1..head_len].iter().copied());
    out.push(resolve);
    out.extend(cycles[head_len..].iter().copied());
    out
}

/// Derives the DDCB or FDCB table from the CB one: every operation targets
/// the indexed memory byte; the register column variants additionally copy
/// the result back into that register.
fn derive_index_bits_table(cb: &[Instruction], prefix: PrefixTag) -> Vec<Instruction> {
    let mut t: Vec<Instruction> = cb.iter().map(|base| {
        let mut instr = base.clone();
        instr.arity = Arity::Disp;
        let is_bit_test = base.src != Operand::None && base.dst == Operand::None;
        if is_bit_test {
            instr.src = Operand::Indexed;
            instr.cycles = seq(&[F, F, R, R, I2, R, I1]);
        }
        else {
            instr.dst = Operand::Indexed;
            instr.copies_result = base.dst != Operand::IndHL;
            instr.cycles = seq(&[F, F, R, R, I2, R, I1, W]);
        }
        instr.lead = 5;
        instr
    }).collect();
    finish(&mut t, prefix);
    t
}
