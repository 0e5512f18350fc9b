/*
    zeta80: a cycle-accurate ZiLOG Z80 microprocessor emulation library.
    Copyright (C) 2019-2024  Rafal Michalski

    For the full copyright notice, see the lib.rs file.
*/
//! Op-code bit field parsing: prefixes, conditions, operand descriptions
//! and the enums the dispatch tables are built from.
use core::fmt;

use crate::flags::Flags;
use crate::ops;
use crate::registers::{Reg8, Reg16};

/// The prefix scheme an instruction was decoded from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PrefixTag {
    None,
    Cb,
    Ed,
    Dd,
    Fd,
    DdCb,
    FdCb
}

impl PrefixTag {
    /// The index register selected by this prefix, if any.
    #[inline]
    pub fn index_reg(self) -> Option<Reg16> {
        match self {
            PrefixTag::Dd | PrefixTag::DdCb => Some(Reg16::IX),
            PrefixTag::Fd | PrefixTag::FdCb => Some(Reg16::IY),
            _ => None
        }
    }

    /// How many prefix bytes precede the opcode byte.
    #[inline]
    pub fn prefix_bytes(self) -> u8 {
        match self {
            PrefixTag::None => 0,
            PrefixTag::Cb | PrefixTag::Ed | PrefixTag::Dd | PrefixTag::Fd => 1,
            PrefixTag::DdCb | PrefixTag::FdCb => 2
        }
    }
}

macro_rules! masked_code_enum {
    ($(#[$meta:meta])* $vis:vis $name:ident & $mask:expr => {$($n:ident = $e:literal;)*}) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        $vis enum $name {
            $($n = $e,)*
        }

        impl $name {
            /// Extracts the variant from its bits in an opcode.
            #[inline]
            $vis fn from_code(code: u8) -> Self {
                match code & $mask {
                    $($e => $name::$n,)*
                    _ => unreachable!()
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(match self {
                    $($name::$n => stringify!($n),)*
                })
            }
        }
    };
}

masked_code_enum! {
    /// Branching conditions encoded in bits 3..=5 of the conditional
    /// jump, call and return opcodes.
    pub Condition & 0b00_111_000 => {
        NZ = 0b00_000_000;
        Z  = 0b00_001_000;
        NC = 0b00_010_000;
        C  = 0b00_011_000;
        PO = 0b00_100_000;
        PE = 0b00_101_000;
        P  = 0b00_110_000;
        M  = 0b00_111_000;
    }
}

impl Condition {
    /// `JR cc` encodes only the NZ, Z, NC, C subset.
    #[inline]
    pub fn from_jr_code(code: u8) -> Self {
        Condition::from_code(code & 0b00_011_000)
    }

    /// Evaluates the condition against the Flags register.
    #[inline]
    pub fn is_satisfied(self, flags: Flags) -> bool {
        match self {
            Condition::NZ => !flags.zf(),
            Condition::Z  => flags.zf(),
            Condition::NC => !flags.cf(),
            Condition::C  => flags.cf(),
            Condition::PO => !flags.pvf(),
            Condition::PE => flags.pvf(),
            Condition::P  => !flags.sf(),
            Condition::M  => flags.sf()
        }
    }
}

masked_code_enum! {
    /// The 8-bit accumulator operation encoded in bits 3..=5 of the
    /// arithmetic group opcodes.
    pub(crate) AluOp & 0b00_111_000 => {
        Add = 0b00_000_000;
        Adc = 0b00_001_000;
        Sub = 0b00_010_000;
        Sbc = 0b00_011_000;
        And = 0b00_100_000;
        Xor = 0b00_101_000;
        Or  = 0b00_110_000;
        Cp  = 0b00_111_000;
    }
}

masked_code_enum! {
    /// The rotate or shift operation encoded in bits 3..=5 of the CB
    /// prefixed opcodes.
    pub(crate) Rot & 0b00_111_000 => {
        Rlc = 0b00_000_000;
        Rrc = 0b00_001_000;
        Rl  = 0b00_010_000;
        Rr  = 0b00_011_000;
        Sla = 0b00_100_000;
        Sra = 0b00_101_000;
        Sll = 0b00_110_000;
        Srl = 0b00_111_000;
    }
}

impl Rot {
    /// Applies the selected operation, taking the carry-in from `flags`.
    #[inline]
    pub(crate) fn apply(self, val: u8, flags: Flags) -> (u8, Flags) {
        match self {
            Rot::Rlc => ops::rlc(val),
            Rot::Rrc => ops::rrc(val),
            Rot::Rl  => ops::rl(val, flags.cf()),
            Rot::Rr  => ops::rr(val, flags.cf()),
            Rot::Sla => ops::sla(val),
            Rot::Sra => ops::sra(val),
            Rot::Sll => ops::sll(val),
            Rot::Srl => ops::srl(val)
        }
    }
}

/// Parses a `RST p` opcode into its absolute target address.
#[inline]
pub(crate) fn restart_address(code: u8) -> u16 {
    (code & 0b00_111_000) as u16
}

/// What an instruction reads or writes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operand {
    None,
    /// An 8-bit register, including the undocumented index halves.
    Reg(Reg8),
    /// A 16-bit register pair.
    Pair(Reg16),
    /// The byte at (HL).
    IndHL,
    /// The byte at (BC).
    IndBC,
    /// The byte at (DE).
    IndDE,
    /// The byte at IX+d or IY+d; the effective address is latched in WZ.
    Indexed,
    /// An immediate byte from the instruction stream.
    Imm8,
    /// An immediate little-endian word from the instruction stream.
    Imm16,
    /// The memory at a direct 16-bit address from the instruction stream.
    Direct,
    /// The I/O port named by an immediate byte.
    PortImm,
    /// The I/O port selected by BC.
    PortC
}

/// The operand bytes an instruction carries after its opcode.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Arity {
    /// No operand bytes.
    None,
    /// One immediate byte.
    Byte,
    /// A little-endian immediate word, low byte first.
    Word,
    /// One signed displacement byte.
    Disp,
    /// A signed displacement byte followed by an immediate byte.
    DispByte
}

impl Arity {
    /// The number of operand bytes in the instruction stream.
    #[inline]
    pub fn operand_bytes(self) -> u8 {
        match self {
            Arity::None => 0,
            Arity::Byte | Arity::Disp => 1,
            Arity::Word | Arity::DispByte => 2
        }
    }
}

/// Decoded operand bytes of one instruction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DecodedArgs {
    None,
    Byte(u8),
    Word(u16),
    Disp(i8),
    DispByte(i8, u8)
}

impl DecodedArgs {
    /// The immediate byte argument.
    #[inline]
    pub fn imm8(self) -> u8 {
        match self {
            DecodedArgs::Byte(n) | DecodedArgs::DispByte(_, n) => n,
            _ => unreachable!("an immediate byte was not decoded")
        }
    }

    /// The immediate word argument.
    #[inline]
    pub fn imm16(self) -> u16 {
        match self {
            DecodedArgs::Word(nn) => nn,
            _ => unreachable!("an immediate word was not decoded")
        }
    }

    /// The signed displacement argument.
    #[inline]
    pub fn disp(self) -> i8 {
        match self {
            DecodedArgs::Disp(d) | DecodedArgs::DispByte(d, _) => d,
            _ => unreachable!("a displacement was not decoded")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditions_parse_and_evaluate() {
        assert_eq!(Condition::from_code(0xC0), Condition::NZ); // RET NZ
        assert_eq!(Condition::from_code(0xC8), Condition::Z);
        assert_eq!(Condition::from_code(0xD0), Condition::NC);
        assert_eq!(Condition::from_code(0xD8), Condition::C);
        assert_eq!(Condition::from_code(0xE0), Condition::PO);
        assert_eq!(Condition::from_code(0xE8), Condition::PE);
        assert_eq!(Condition::from_code(0xF0), Condition::P);
        assert_eq!(Condition::from_code(0xF8), Condition::M);
        assert_eq!(Condition::from_jr_code(0x20), Condition::NZ); // JR NZ
        assert_eq!(Condition::from_jr_code(0x38), Condition::C);  // JR C

        assert!(Condition::NZ.is_satisfied(Flags::empty()));
        assert!(Condition::Z.is_satisfied(Flags::Z));
        assert!(Condition::NC.is_satisfied(Flags::empty()));
        assert!(Condition::C.is_satisfied(Flags::C));
        assert!(Condition::PO.is_satisfied(Flags::empty()));
        assert!(Condition::PE.is_satisfied(Flags::PV));
        assert!(Condition::P.is_satisfied(Flags::empty()));
        assert!(Condition::M.is_satisfied(Flags::S));
        assert!(!Condition::Z.is_satisfied(Flags::S | Flags::C));
    }

    #[test]
    fn alu_and_rot_parse() {
        assert_eq!(AluOp::from_code(0x80), AluOp::Add); // ADD A,B
        assert_eq!(AluOp::from_code(0x96), AluOp::Sub); // SUB (HL)
        assert_eq!(AluOp::from_code(0xBF), AluOp::Cp);  // CP A
        assert_eq!(Rot::from_code(0x06), Rot::Rlc);     // RLC (HL)
        assert_eq!(Rot::from_code(0x3F), Rot::Srl);     // SRL A
        assert_eq!(Rot::from_code(0x36), Rot::Sll);
    }

    #[test]
    fn restart_addresses() {
        assert_eq!(restart_address(0xC7), 0x00);
        assert_eq!(restart_address(0xCF), 0x08);
        assert_eq!(restart_address(0xD7), 0x10);
        assert_eq!(restart_address(0xDF), 0x18);
        assert_eq!(restart_address(0xE7), 0x20);
        assert_eq!(restart_address(0xEF), 0x28);
        assert_eq!(restart_address(0xF7), 0x30);
        assert_eq!(restart_address(0xFF), 0x38);
    }

    #[test]
    fn prefix_tags() {
        assert_eq!(PrefixTag::None.prefix_bytes(), 0);
        assert_eq!(PrefixTag::Ed.prefix_bytes(), 1);
        assert_eq!(PrefixTag::DdCb.prefix_bytes(), 2);
        assert_eq!(PrefixTag::Dd.index_reg(), Some(Reg16::IX));
        assert_eq!(PrefixTag::FdCb.index_reg(), Some(Reg16::IY));
        assert_eq!(PrefixTag::Cb.index_reg(), None);
    }

    #[test]
    fn arity_operand_bytes() {
        assert_eq!(Arity::None.operand_bytes(), 0);
        assert_eq!(Arity::Byte.operand_bytes(), 1);
        assert_eq!(Arity::Word.operand_bytes(), 2);
        assert_eq!(Arity::Disp.operand_bytes(), 1);
        assert_eq!(Arity::DispByte.operand_bytes(), 2);
    }

    #[test]
    fn rot_apply_matches_ops() {
        assert_eq!(Rot::Rlc.apply(0x81, Flags::empty()), ops::rlc(0x81));
        assert_eq!(Rot::Rl.apply(0x81, Flags::C), ops::rl(0x81, true));
        assert_eq!(Rot::Rr.apply(0x81, Flags::empty()), ops::rr(0x81, false));
        assert_eq!(Rot::Srl.apply(0x81, Flags::C), ops::srl(0x81));
    }
}
