/*
    zeta80: a cycle-accurate ZiLOG Z80 microprocessor emulation library.
    Copyright (C) 2019-2024  Rafal Michalski

    For the full copyright notice, see the lib.rs file.
*/
//! The instruction-cycle engine: fetch, decode, execute, interrupt
//! acknowledge, HALT handling and the host facing control surface.
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering::Relaxed};

#[allow(unused_imports)]
use log::{debug, error, trace, warn};

use crate::bits;
use crate::clock::{Clock, FastClock};
use crate::decode::Operand;
use crate::error::{EngineError, MemoryError};
use crate::flags::Flags;
use crate::instructions::{Decoded, ExecutionResult, InstructionPackage, InstructionSet};
use crate::mcycle::{MCycle, IM0_ACK_TS, IM12_ACK_TS, NMI_ACK_TS};
use crate::memory::{MemoryBank, Segment};
use crate::ops;
use crate::ops::LogicOp;
use crate::ports::PortBank;
use crate::registers::{InterruptMode, Registers};
use crate::tables::{AccRot, FlagTables};

/// An address of the NMI routine.
pub const NMI_RESTART: u16 = 0x66;
/// An address of the mode 1 interrupt routine.
pub const IM1_RESTART: u16 = 0x38;

/// The engine state machine: `Stopped -> Running <-> Halted`, any state
/// may transition to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Stopped,
    Running,
    Halted
}

/// Latches written by other threads and read by the engine at machine
/// cycle boundaries. All accesses use relaxed ordering: each latch has a
/// single producer and the engine is the only consumer.
#[derive(Debug, Default)]
pub struct Signals {
    running: AtomicBool,
    suspended: AtomicBool,
    int: AtomicBool,
    nmi: AtomicBool,
    wait_states: AtomicU16
}

impl Signals {
    /// Asserts the maskable interrupt line. Level triggered: the line
    /// stays active until [Signals::clear_int].
    pub fn raise_int(&self) {
        self.int.store(true, Relaxed);
    }

    /// Deasserts the maskable interrupt line.
    pub fn clear_int(&self) {
        self.int.store(false, Relaxed);
    }

    /// Latches a non-maskable interrupt. Edge triggered: consumed by the
    /// engine once.
    pub fn raise_nmi(&self) {
        self.nmi.store(true, Relaxed);
    }

    /// Requests the engine to stretch the next access by `n` wait cycles.
    pub fn add_wait_states(&self, n: u16) {
        self.wait_states.fetch_add(n, Relaxed);
    }

    /// Requests a cooperative stop; the engine honors it at the next
    /// instruction boundary.
    pub fn request_stop(&self) {
        self.running.store(false, Relaxed);
    }

    /// Parks the engine at the next instruction boundary.
    pub fn suspend(&self) {
        self.suspended.store(true, Relaxed);
    }

    /// Lets a suspended engine continue.
    pub fn resume(&self) {
        self.suspended.store(false, Relaxed);
    }

    /// Returns `true` while the engine is parked.
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Relaxed)
    }
}

/// Host registered debug hooks. Zero cost when unset.
#[derive(Default)]
pub struct Hooks {
    pub before_execute: Option<Box<dyn FnMut(&InstructionPackage<'_>) + Send>>,
    pub after_execute: Option<Box<dyn FnMut(&InstructionPackage<'_>, &ExecutionResult) + Send>>,
    /// Called with the address of the instruction that halted the CPU.
    pub on_halt: Option<Box<dyn FnMut(u16) + Send>>,
    pub on_stop: Option<Box<dyn FnMut() + Send>>,
    pub on_breakpoint: Option<Box<dyn FnMut(&InstructionPackage<'_>) + Send>>,
    pub before_insert_wait_cycles: Option<Box<dyn FnMut(u16) + Send>>
}

/// A callback supplying the byte an interrupting device places on the
/// data bus. Required for the interrupt modes 0 and 2.
pub type InterruptDataFn = Box<dyn FnMut() -> u8 + Send>;

/// The Z80 processor: the register file, the interrupt controller, the
/// memory and port banks, the clock and the instruction-cycle engine
/// driving them.
pub struct Processor {
    pub(crate) regs: Registers,
    pub(crate) iff1: bool,
    pub(crate) iff2: bool,
    pub(crate) im: InterruptMode,
    state: ExecutionState,
    ei_pending: bool,
    pc_overridden: bool,
    waits_inserted: u16,
    end_on_halt: bool,
    memory: MemoryBank,
    ports: PortBank,
    clock: Box<dyn Clock>,
    iset: Arc<InstructionSet>,
    tables: Option<FlagTables>,
    signals: Arc<Signals>,
    hooks: Hooks,
    breakpoints: HashSet<u16>,
    int_data: Option<InterruptDataFn>,
    bp_resume: Option<u16>
}

impl Default for Processor {
    fn default() -> Self {
        Processor::new()
    }
}

impl Processor {
    /// Creates a processor driven by a [FastClock].
    pub fn new() -> Self {
        Processor::with_clock(FastClock::default())
    }

    /// Creates a processor driven by the given clock.
    pub fn with_clock<C: Clock + 'static>(clock: C) -> Self {
        Processor {
            regs: Registers::default(),
            iff1: false,
            iff2: false,
            im: InterruptMode::Mode0,
            state: ExecutionState::Stopped,
            ei_pending: false,
            pc_overridden: false,
            waits_inserted: 0,
            end_on_halt: false,
            memory: MemoryBank::new(),
            ports: PortBank::new(),
            clock: Box::new(clock),
            iset: InstructionSet::new(),
            tables: None,
            signals: Arc::new(Signals::default()),
            hooks: Hooks::default(),
            breakpoints: HashSet::new(),
            int_data: None,
            bp_resume: None
        }
    }

    /// Switches the 8-bit arithmetic, logic and accumulator rotate groups
    /// to the precomputed flag tables.
    pub fn enable_flag_tables(&mut self) {
        if self.tables.is_none() {
            self.tables = Some(FlagTables::new());
        }
    }

    #[inline]
    pub fn registers(&self) -> &Registers { &self.regs }
    #[inline]
    pub fn registers_mut(&mut self) -> &mut Registers { &mut self.regs }
    #[inline]
    pub fn memory(&self) -> &MemoryBank { &self.memory }
    #[inline]
    pub fn memory_mut(&mut self) -> &mut MemoryBank { &mut self.memory }
    #[inline]
    pub fn ports_mut(&mut self) -> &mut PortBank { &mut self.ports }
    #[inline]
    pub fn hooks_mut(&mut self) -> &mut Hooks { &mut self.hooks }
    #[inline]
    pub fn state(&self) -> ExecutionState { self.state }
    #[inline]
    pub fn instruction_set(&self) -> &Arc<InstructionSet> { &self.iset }

    /// The monotonic T-state counter of the clock.
    #[inline]
    pub fn tstates(&self) -> u64 {
        self.clock.tstates()
    }

    /// Whether the last executed instruction explicitly set PC (a jump,
    /// call, return, restart or a block-loop rewind).
    #[inline]
    pub fn pc_overridden(&self) -> bool {
        self.pc_overridden
    }

    /// The latches shared with other threads.
    pub fn signals(&self) -> Arc<Signals> {
        Arc::clone(&self.signals)
    }

    /// Values of the interrupt flip-flops `(IFF1, IFF2)`.
    pub fn iffs(&self) -> (bool, bool) {
        (self.iff1, self.iff2)
    }

    pub fn set_iffs(&mut self, iff1: bool, iff2: bool) {
        self.iff1 = iff1;
        self.iff2 = iff2;
    }

    pub fn interrupt_mode(&self) -> InterruptMode {
        self.im
    }

    pub fn set_interrupt_mode(&mut self, im: InterruptMode) {
        self.im = im;
    }

    /// Installs the interrupt data callback used by IM 0 and IM 2.
    pub fn set_interrupt_data<F>(&mut self, f: F)
        where F: FnMut() -> u8 + Send + 'static
    {
        self.int_data = Some(Box::new(f));
    }

    /// When set, entering the HALT state stops the engine instead of
    /// burning NOP cycles.
    pub fn set_end_on_halt(&mut self, end_on_halt: bool) {
        self.end_on_halt = end_on_halt;
    }

    pub fn add_breakpoint(&mut self, addr: u16) {
        self.breakpoints.insert(addr);
    }

    pub fn remove_breakpoint(&mut self, addr: u16) {
        self.breakpoints.remove(&addr);
    }

    /// Binds the memory bank to a map of segments.
    pub fn bind_memory<I: IntoIterator<Item=Segment>>(&mut self, segments: I) {
        self.memory.bind(segments);
    }

    /// Clears writable memory, zeroes the registers and the interrupt
    /// controller; with `restart` the engine goes straight back to
    /// [ExecutionState::Running], otherwise it is left stopped.
    pub fn reset(&mut self, restart: bool) {
        self.memory.clear_all_writable();
        self.regs.clear();
        self.iff1 = false;
        self.iff2 = false;
        self.im = InterruptMode::Mode0;
        self.ei_pending = false;
        self.pc_overridden = false;
        self.bp_resume = None;
        debug!("processor reset");
        if restart && self.memory.is_bound() {
            self.state = ExecutionState::Running;
            self.signals.running.store(true, Relaxed);
        }
        else {
            self.state = ExecutionState::Stopped;
        }
    }

    /// Enters the Running state.
    ///
    /// Fails with [MemoryError::NotInitialised] if the memory bank was
    /// never bound.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if !self.memory.is_bound() {
            return Err(MemoryError::NotInitialised.into());
        }
        self.signals.running.store(true, Relaxed);
        self.signals.suspended.store(false, Relaxed);
        self.clock.restart();
        self.state = ExecutionState::Running;
        debug!("engine started at pc {:04x}", self.regs.pc());
        Ok(())
    }

    /// Stops the engine immediately.
    pub fn stop(&mut self) {
        self.signals.running.store(false, Relaxed);
        self.enter_stop();
    }

    /// Parks the engine at the next instruction boundary.
    pub fn suspend(&self) {
        self.signals.suspend();
    }

    /// Lets a suspended engine continue.
    pub fn resume(&self) {
        self.signals.resume();
    }

    /// Runs the engine until it stops: by [Signals::request_stop], by
    /// `end_on_halt`, by a decode underrun or by an error.
    pub fn run_until_stopped(&mut self) -> Result<(), EngineError> {
        while self.state != ExecutionState::Stopped {
            if self.signals.is_suspended() {
                std::thread::yield_now();
                continue;
            }
            if let Err(e) = self.step() {
                error!("engine stopped on: {}", e);
                self.enter_stop();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Executes one iteration of the instruction-cycle engine: a single
    /// instruction (or a halt NOP), followed by the interrupt checks.
    pub fn step(&mut self) -> Result<(), EngineError> {
        if self.state == ExecutionState::Stopped {
            return Ok(());
        }
        if !self.signals.running.load(Relaxed) {
            self.enter_stop();
            return Ok(());
        }
        self.waits_inserted = 0;
        self.ei_pending = false;

        if self.state == ExecutionState::Halted {
            if self.end_on_halt {
                self.enter_stop();
                return Ok(());
            }
            // a synthesized NOP keeps the clock and the refresh counter
            // running while halted
            self.cycle(MCycle::Fetch);
            self.regs.inc_r();
        }
        else if !self.fetch_decode_execute()? {
            return Ok(());
        }

        // the short-circuit keeps the NMI latch intact while an EI defers it
        if !self.ei_pending && self.signals.nmi.swap(false, Relaxed) {
            self.acknowledge_nmi()?;
        }
        if self.signals.int.load(Relaxed) && self.iff1 && !self.ei_pending {
            self.acknowledge_int()?;
        }
        Ok(())
    }

    /// Returns Ok(false) when the iteration ended early: on a decode
    /// underrun or a breakpoint suspension.
    fn fetch_decode_execute(&mut self) -> Result<bool, EngineError> {
        let iset = Arc::clone(&self.iset);
        let mut pc = self.regs.pc();
        let pkg = loop {
            let bytes = self.memory.read_bytes(pc, 4)?;
            match iset.decode(&bytes, pc) {
                Decoded::Package(pkg) => break pkg,
                Decoded::PrefixNop => {
                    // the wasted prefix costs a full opcode fetch
                    self.cycle(MCycle::Fetch);
                    self.regs.inc_r();
                    pc = pc.wrapping_add(1);
                    self.regs.set_pc(pc);
                }
                Decoded::Underrun => {
                    warn!("decode underrun at {:04x}", pc);
                    self.enter_stop();
                    return Ok(false);
                }
            }
        };

        if self.breakpoints.contains(&pkg.address) && self.bp_resume != Some(pkg.address) {
            trace!("breakpoint at {:04x}", pkg.address);
            if let Some(hook) = self.hooks.on_breakpoint.as_mut() {
                hook(&pkg);
            }
            if self.signals.is_suspended() {
                self.bp_resume = Some(pkg.address);
                return Ok(false);
            }
        }
        self.bp_resume = None;

        let instr = pkg.instruction;
        for &cycle in &instr.cycles[..usize::from(instr.lead)] {
            self.cycle(cycle);
            if cycle == MCycle::Fetch {
                self.regs.inc_r();
            }
        }
        self.regs.set_pc(pkg.address.wrapping_add(instr.size.into()));
        // WZ carries the indexed effective address; otherwise it starts
        // each instruction cleared unless the microcode writes it
        if instr.memory_operand() == Some(Operand::Indexed) {
            let base = self.regs.get16(instr.prefix.index_reg().unwrap());
            self.regs.set_wz(bits::displace(base, pkg.args.disp()));
        }
        else {
            self.regs.set_wz(0);
        }
        self.pc_overridden = false;

        if let Some(hook) = self.hooks.before_execute.as_mut() {
            hook(&pkg);
        }
        let mut result = (instr.exec)(self, &pkg)?;
        if let Some(flags) = result.flags {
            self.regs.set_flags(flags);
        }
        if result.repeat {
            // a looping block instruction re-executes at its own address,
            // paying the full fetch timing every iteration
            self.regs.set_pc(pkg.address);
        }
        result.wait_states_added = self.waits_inserted;
        if let Some(hook) = self.hooks.after_execute.as_mut() {
            hook(&pkg, &result);
        }
        if self.state == ExecutionState::Halted {
            if let Some(hook) = self.hooks.on_halt.as_mut() {
                hook(pkg.address);
            }
        }
        Ok(true)
    }

    fn acknowledge_nmi(&mut self) -> Result<(), EngineError> {
        trace!("NMI acknowledged at {:04x}", self.regs.pc());
        self.state = ExecutionState::Running;
        self.iff1 = false; // IFF2 retains the pre-NMI state
        self.regs.inc_r();
        self.tick_n(NMI_ACK_TS);
        let pc = self.regs.pc();
        self.push_word(pc)?;
        self.regs.set_pc(NMI_RESTART);
        self.regs.set_wz(NMI_RESTART);
        Ok(())
    }

    fn acknowledge_int(&mut self) -> Result<(), EngineError> {
        trace!("INT acknowledged at {:04x} in {:?}", self.regs.pc(), self.im);
        self.state = ExecutionState::Running;
        self.iff1 = false;
        self.iff2 = false;
        match self.im {
            InterruptMode::Mode0 => self.interrupt_mode0(),
            InterruptMode::Mode1 => {
                self.regs.inc_r();
                self.tick_n(IM12_ACK_TS);
                let pc = self.regs.pc();
                self.push_word(pc)?;
                self.regs.set_pc(IM1_RESTART);
                self.regs.set_wz(IM1_RESTART);
                Ok(())
            }
            InterruptMode::Mode2 => {
                let mut data = self.take_interrupt_data()?;
                self.regs.inc_r();
                self.tick_n(IM12_ACK_TS);
                let vector_low = data();
                self.int_data = Some(data);
                let pc = self.regs.pc();
                self.push_word(pc)?;
                let vector_addr = bits::word(self.regs.i(), vector_low);
                let routine = self.read_mem_word(vector_addr)?;
                self.regs.set_pc(routine);
                self.regs.set_wz(routine);
                Ok(())
            }
        }
    }

    /// Mode 0: the interrupting device supplies an instruction on the
    /// data bus; it executes with PC preserved, an explicit PC write by
    /// the injected instruction (CALL, JP, RST) takes effect.
    fn interrupt_mode0(&mut self) -> Result<(), EngineError> {
        let iset = Arc::clone(&self.iset);
        let mut data = self.take_interrupt_data()?;
        let mut bytes = vec![data()];
        let pc = self.regs.pc();
        self.regs.inc_r();
        self.tick_n(IM0_ACK_TS);
        loop {
            match iset.decode(&bytes, pc) {
                Decoded::Package(pkg) => {
                    self.int_data = Some(data);
                    let instr = pkg.instruction;
                    // the acknowledge cycle replaced the opcode fetch
                    for &cycle in instr.cycles[..usize::from(instr.lead)].iter().skip(1) {
                        self.cycle(cycle);
                        if cycle == MCycle::Fetch {
                            self.regs.inc_r();
                        }
                    }
                    self.regs.set_wz(0);
                    self.pc_overridden = false;
                    let result = (instr.exec)(self, &pkg)?;
                    if let Some(flags) = result.flags {
                        self.regs.set_flags(flags);
                    }
                    return Ok(());
                }
                Decoded::PrefixNop => {
                    bytes.remove(0);
                    self.cycle(MCycle::Fetch);
                    self.regs.inc_r();
                    if bytes.is_empty() {
                        bytes.push(data());
                    }
                }
                Decoded::Underrun => {
                    if bytes.len() >= 4 {
                        // cannot happen: 4 bytes always decode
                        self.int_data = Some(data);
                        return Ok(());
                    }
                    bytes.push(data());
                }
            }
        }
    }

    fn take_interrupt_data(&mut self) -> Result<InterruptDataFn, EngineError> {
        match self.int_data.take() {
            Some(data) => Ok(data),
            None => {
                error!("interrupt accepted in {:?} with no data callback", self.im);
                Err(EngineError::InterruptMisconfiguration(self.im))
            }
        }
    }

    fn enter_stop(&mut self) {
        if self.state != ExecutionState::Stopped {
            debug!("engine stopped at pc {:04x} after {} T-states",
                   self.regs.pc(), self.clock.tstates());
            self.state = ExecutionState::Stopped;
            if let Some(hook) = self.hooks.on_stop.as_mut() {
                hook();
            }
        }
    }

    // ---- the timed bus: machine cycles around the untimed banks ----

    /// Walks one machine cycle on the clock, inserting host requested
    /// wait cycles at the designated slot.
    pub(crate) fn cycle(&mut self, cycle: MCycle) {
        let (before, after) = cycle.wait_slot();
        self.tick_n(before);
        if !matches!(cycle, MCycle::Internal(_)) {
            self.insert_pending_waits();
        }
        self.tick_n(after);
    }

    fn tick_n(&mut self, n: u8) {
        for _ in 0..n {
            self.clock.wait_for_next_tick();
        }
    }

    fn insert_pending_waits(&mut self) {
        let waits = self.signals.wait_states.swap(0, Relaxed);
        if waits > 0 {
            if let Some(hook) = self.hooks.before_insert_wait_cycles.as_mut() {
                hook(waits);
            }
            for _ in 0..waits {
                self.clock.wait_for_next_tick();
            }
            self.waits_inserted += waits;
        }
    }

    /// A timed memory read: one memory-read machine cycle.
    pub(crate) fn read_mem(&mut self, addr: u16) -> Result<u8, EngineError> {
        self.cycle(MCycle::MemRead);
        Ok(self.memory.read_byte(addr)?)
    }

    /// A timed memory write: one memory-write machine cycle.
    pub(crate) fn write_mem(&mut self, addr: u16, val: u8) -> Result<(), EngineError> {
        self.cycle(MCycle::MemWrite);
        self.memory.write_byte(addr, val)?;
        Ok(())
    }

    /// A timed little-endian word read: two memory-read machine cycles.
    pub(crate) fn read_mem_word(&mut self, addr: u16) -> Result<u16, EngineError> {
        let lo = self.read_mem(addr)?;
        let hi = self.read_mem(addr.wrapping_add(1))?;
        Ok(bits::word(hi, lo))
    }

    /// A timed little-endian word write: two memory-write machine cycles,
    /// the low byte first.
    pub(crate) fn write_mem_word(&mut self, addr: u16, val: u16) -> Result<(), EngineError> {
        let (hi, lo) = bits::split_word(val);
        self.write_mem(addr, lo)?;
        self.write_mem(addr.wrapping_add(1), hi)
    }

    /// A timed port read; `hi` rides the high half of the address bus.
    pub(crate) fn port_read(&mut self, hi: u8, lo: u8) -> u8 {
        self.cycle(MCycle::PortRead);
        let data = self.ports.read(lo);
        trace!("in {:02x}{:02x} -> {:02x}", hi, lo, data);
        data
    }

    /// A timed port write; `hi` rides the high half of the address bus.
    pub(crate) fn port_write(&mut self, hi: u8, lo: u8, data: u8) {
        self.cycle(MCycle::PortWrite);
        trace!("out {:02x}{:02x} <- {:02x}", hi, lo, data);
        self.ports.write(lo, data);
    }

    /// Pushes a word on the machine stack: SP decrements twice, the high
    /// byte is written first.
    pub(crate) fn push_word(&mut self, val: u16) -> Result<(), EngineError> {
        let (hi, lo) = bits::split_word(val);
        let sp = self.regs.sp().wrapping_sub(1);
        self.write_mem(sp, hi)?;
        let sp = sp.wrapping_sub(1);
        self.write_mem(sp, lo)?;
        self.regs.set_sp(sp);
        Ok(())
    }

    /// Pops a word off the machine stack: the low byte first, SP
    /// increments twice.
    pub(crate) fn pop_word(&mut self) -> Result<u16, EngineError> {
        let sp = self.regs.sp();
        let lo = self.read_mem(sp)?;
        let hi = self.read_mem(sp.wrapping_add(1))?;
        self.regs.set_sp(sp.wrapping_add(2));
        Ok(bits::word(hi, lo))
    }

    /// Overrides the program counter; the engine then skips its automatic
    /// advance bookkeeping for this instruction.
    pub(crate) fn override_pc(&mut self, addr: u16) {
        self.regs.set_pc(addr);
        self.pc_overridden = true;
    }

    /// A taken branch: the target lands in both PC and WZ.
    pub(crate) fn jump(&mut self, addr: u16) {
        self.regs.set_wz(addr);
        self.override_pc(addr);
    }

    pub(crate) fn enable_interrupts(&mut self) {
        self.iff1 = true;
        self.iff2 = true;
        // the re-enable takes effect after the next instruction
        self.ei_pending = true;
    }

    pub(crate) fn disable_interrupts(&mut self) {
        self.iff1 = false;
        self.iff2 = false;
    }

    pub(crate) fn restore_iff1(&mut self) {
        self.iff1 = self.iff2;
    }

    pub(crate) fn enter_halt(&mut self) {
        trace!("halted at {:04x}", self.regs.pc());
        self.state = ExecutionState::Halted;
    }

    // ---- table aware ALU dispatch ----

    pub(crate) fn alu_add(&self, a: u8, b: u8, carry: bool) -> (u8, Flags) {
        match self.tables.as_ref() {
            Some(tables) => tables.arith_add(a, b, carry),
            None => ops::arith8(a, b, carry, false)
        }
    }

    pub(crate) fn alu_sub(&self, a: u8, b: u8, carry: bool) -> (u8, Flags) {
        match self.tables.as_ref() {
            Some(tables) => tables.arith_sub(a, b, carry),
            None => ops::arith8(a, b, carry, true)
        }
    }

    pub(crate) fn alu_logical(&self, a: u8, b: u8, op: LogicOp) -> (u8, Flags) {
        match self.tables.as_ref() {
            Some(tables) => tables.logical(a, b, op),
            None => ops::logical(a, b, op)
        }
    }

    pub(crate) fn alu_acc_rotate(&self, op: AccRot, a: u8, flags: Flags) -> (u8, Flags) {
        match self.tables.as_ref() {
            Some(tables) => tables.acc_rotate(op, a, flags),
            None => match op {
                AccRot::Rlca => ops::rlca(a, flags),
                AccRot::Rrca => ops::rrca(a, flags),
                AccRot::Rla => ops::rla(a, flags),
                AccRot::Rra => ops::rra(a, flags)
            }
        }
    }
}
