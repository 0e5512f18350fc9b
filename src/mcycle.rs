/*
    zeta80: a cycle-accurate ZiLOG Z80 microprocessor emulation library.
    Copyright (C) 2019-2024  Rafal Michalski

    For the full copyright notice, see the lib.rs file.
*/
//! The machine-cycle model: cycle kinds, their T-state counts and the slot
//! at which host requested wait states are inserted.
//!
//! ```text
//! opcode fetch   T1 T2 [wait] T3 T4      address=PC, data=opcode, refresh=IR
//! memory read    T1 T2 [wait] T3         address, data, release
//! memory write   T1 T2 [wait] T3         address+data, wait, release
//! port read      T1 T2 TW [wait] T3      one wait state inserted by the CPU
//! port write     T1 T2 TW [wait] T3      symmetric
//! internal       T1 .. Tn                no bus activity
//! ```
//!
//! The engine walks each cycle tick by tick on the [Clock](crate::clock::Clock)
//! and consumes the pending wait counter at the designated slot.
use arrayvec::ArrayVec;

/// A machine cycle of one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MCycle {
    /// An M1 cycle: opcode fetch with the refresh phase.
    Fetch,
    /// A memory read cycle.
    MemRead,
    /// A memory write cycle.
    MemWrite,
    /// A port read cycle, including the automatic internal wait state.
    PortRead,
    /// A port write cycle, symmetric to [MCycle::PortRead].
    PortWrite,
    /// An internal operation of the given length.
    Internal(u8)
}

/// T-states of the non-maskable interrupt acknowledge cycle.
pub const NMI_ACK_TS: u8 = 5;
/// T-states of the mode 0 interrupt acknowledge cycle.
pub const IM0_ACK_TS: u8 = 6;
/// T-states of the mode 1 and mode 2 interrupt acknowledge cycle.
pub const IM12_ACK_TS: u8 = 7;

impl MCycle {
    /// The T-state count of this cycle.
    #[inline]
    pub const fn tstates(self) -> u8 {
        match self {
            MCycle::Fetch => 4,
            MCycle::MemRead | MCycle::MemWrite => 3,
            MCycle::PortRead | MCycle::PortWrite => 4,
            MCycle::Internal(n) => n
        }
    }

    /// The T-states ticked before and after the wait insertion slot.
    ///
    /// Reads take waits after the data phase, writes after the first two
    /// T-states, ports after their automatic wait state. Internal cycles
    /// have no slot.
    #[inline]
    pub(crate) const fn wait_slot(self) -> (u8, u8) {
        match self {
            MCycle::Fetch => (2, 2),
            MCycle::MemRead | MCycle::MemWrite => (2, 1),
            MCycle::PortRead | MCycle::PortWrite => (3, 1),
            MCycle::Internal(n) => (n, 0)
        }
    }
}

/// The machine-cycle sequence of an instruction descriptor.
pub type CycleSeq = ArrayVec<MCycle, 8>;

/// Sums the T-states of a machine-cycle sequence.
pub fn total_tstates(cycles: &[MCycle]) -> u32 {
    cycles.iter().map(|c| u32::from(c.tstates())).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tstate_counts_match_the_silicon() {
        assert_eq!(MCycle::Fetch.tstates(), 4);
        assert_eq!(MCycle::MemRead.tstates(), 3);
        assert_eq!(MCycle::MemWrite.tstates(), 3);
        assert_eq!(MCycle::PortRead.tstates(), 4);
        assert_eq!(MCycle::PortWrite.tstates(), 4);
        assert_eq!(MCycle::Internal(5).tstates(), 5);
        assert_eq!(NMI_ACK_TS, 5);
        assert_eq!(IM0_ACK_TS, 6);
        assert_eq!(IM12_ACK_TS, 7);
    }

    #[test]
    fn wait_slots_split_the_cycle() {
        for cycle in [MCycle::Fetch, MCycle::MemRead, MCycle::MemWrite,
                      MCycle::PortRead, MCycle::PortWrite, MCycle::Internal(7)] {
            let (before, after) = cycle.wait_slot();
            assert_eq!(before + after, cycle.tstates());
        }
    }

    #[test]
    fn sequences_sum() {
        // CALL nn taken: 4 + 3 + 3 + 1 + 3 + 3
        let cycles = [MCycle::Fetch, MCycle::MemRead, MCycle::MemRead,
                      MCycle::Internal(1), MCycle::MemWrite, MCycle::MemWrite];
        assert_eq!(total_tstates(&cycles), 17);
    }
}
