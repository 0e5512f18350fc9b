/*
    zeta80: a cycle-accurate ZiLOG Z80 microprocessor emulation library.
    Copyright (C) 2019-2024  Rafal Michalski

    zeta80 is free software: you can redistribute it and/or modify it under
    the terms of the GNU Lesser General Public License (LGPL) as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    zeta80 is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Lesser General Public License for more details.

    You should have received a copy of the GNU Lesser General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.

    Author contact information: see Cargo.toml file, section [package.authors].
*/
/*! # zeta80

`zeta80` emulates the Zilog Z80 CPU at machine-cycle accuracy: the full
opcode map with all four prefix schemes (CB, DD, ED, FD, DDCB, FDCB), the
undocumented X/Y flag bits and index register halves, the internal
WZ/MEMPTR latch, exact T-state counts with host inserted wait cycles, and
the IM 0/1/2 and NMI interrupt machinery.

The building blocks:

* [Processor] - the register file, the interrupt controller and the
  instruction-cycle engine.
* [MemoryBank] / [Segment] - a segment mapped 64 KiB address space with a
  timed facet (driven by the engine) and an untimed one (for hosts and
  tests).
* [PortBank] - 256 I/O addresses bound to host callbacks.
* [Clock](clock::Clock) - the tick source; as-fast-as-possible,
  fixed-pattern deterministic, or real-time paced implementations.
* [Signals] - relaxed atomic latches for INT, NMI, wait cycles, stop and
  suspend, shared with other threads.

## Example

```
use zeta80::{ExecutionState, Processor, Segment};

let mut cpu = Processor::new();
cpu.bind_memory([Segment::ram(0, 0x100)]);
// LD A,5; ADD A,3; HALT
cpu.memory_mut().write_bytes(0, &[0x3E, 0x05, 0xC6, 0x03, 0x76]).unwrap();
cpu.set_end_on_halt(true);
cpu.start().unwrap();
cpu.run_until_stopped().unwrap();

assert_eq!(cpu.registers().a(), 8);
assert_eq!(cpu.state(), ExecutionState::Stopped);
// LD A,n is 7 T-states, ADD A,n is 7, HALT is 4
assert_eq!(cpu.tstates(), 18);
```
*/
pub mod bits;
pub mod clock;
pub mod decode;
pub mod engine;
pub mod error;
mod exec;
pub mod flags;
pub mod instructions;
pub mod mcycle;
pub mod memory;
pub mod ops;
pub mod ports;
pub mod registers;
pub mod tables;

pub use clock::{Clock, FastClock, PatternClock, RealTimeClock, DEFAULT_CLOCK_HZ};
pub use decode::{Arity, Condition, DecodedArgs, Operand, PrefixTag};
pub use engine::{ExecutionState, Hooks, InterruptDataFn, Processor, Signals,
                 IM1_RESTART, NMI_RESTART};
pub use error::{EngineError, MemoryError};
pub use flags::Flags;
pub use instructions::{Decoded, ExecutionResult, Instruction, InstructionPackage,
                       InstructionSet, Microcode};
pub use mcycle::MCycle;
pub use memory::{MemoryBank, Segment};
pub use ports::{Port, PortBank, OPEN_BUS};
pub use registers::{InterruptMode, Reg16, Reg8, Registers, DEFAULT_STACK_TOP};
pub use tables::FlagTables;

/// Selected Z80 opcodes, convenient for hosts feeding interrupt data or
/// assembling test programs.
pub mod opconsts {
    /// Bit operations prefix.
    pub const CB_PREFIX: u8 = 0xCB;
    /// IX index prefix.
    pub const DD_PREFIX: u8 = 0xDD;
    /// Extended opcode prefix.
    pub const ED_PREFIX: u8 = 0xED;
    /// IY index prefix.
    pub const FD_PREFIX: u8 = 0xFD;
    /// No operation.
    pub const NOP_OPCODE: u8 = 0x00;
    /// Halt execution.
    pub const HALT_OPCODE: u8 = 0x76;
    /// Disable interrupts.
    pub const DI_OPCODE: u8 = 0xF3;
    /// Enable interrupts.
    pub const EI_OPCODE: u8 = 0xFB;
    /// Return from subroutine.
    pub const RET_OPCODE: u8 = 0xC9;
    /// Call a subroutine.
    pub const CALL_OPCODE: u8 = 0xCD;
    /// Branch to an absolute address.
    pub const JP_OPCODE: u8 = 0xC3;
    /// Call the system subroutine at `0x38` - what a device in interrupt
    /// mode 0 classically places on the bus.
    pub const RST_38H_OPCODE: u8 = 0xFF;
}
