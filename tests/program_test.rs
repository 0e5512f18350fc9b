//! Runs small machine code programs and checks registers, flags, memory
//! and the interrupt machinery.
use std::sync::{Arc, Mutex};

use zeta80::*;

fn cpu_with(program: &[u8]) -> Processor {
    let mut cpu = Processor::new();
    cpu.bind_memory([Segment::ram(0, 0x10000)]);
    cpu.memory_mut().write_bytes(0, program).unwrap();
    cpu.set_end_on_halt(true);
    cpu.start().unwrap();
    cpu
}

fn steps(cpu: &mut Processor, n: usize) {
    for _ in 0..n {
        cpu.step().unwrap();
    }
}

#[test]
fn reset_state() {
    let cpu = Processor::new();
    let regs = cpu.registers();
    assert_eq!(regs.sp(), 0xFFFF);
    assert_eq!(regs.pc(), 0);
    assert_eq!(regs.af(), 0);
    assert_eq!(regs.bc(), 0);
    assert_eq!(regs.de(), 0);
    assert_eq!(regs.hl(), 0);
    assert_eq!(regs.ix(), 0);
    assert_eq!(regs.iy(), 0);
    assert_eq!(cpu.iffs(), (false, false));
    assert_eq!(cpu.interrupt_mode(), InterruptMode::Mode0);
    assert_eq!(cpu.state(), ExecutionState::Stopped);
}

#[test]
fn reset_clears_registers_and_memory() {
    let mut cpu = cpu_with(&[0x3E, 0x05, 0x76]);
    cpu.run_until_stopped().unwrap();
    assert_eq!(cpu.registers().a(), 5);
    cpu.reset(false);
    assert_eq!(cpu.registers().a(), 0);
    assert_eq!(cpu.registers().pc(), 0);
    assert_eq!(cpu.registers().sp(), 0xFFFF);
    assert_eq!(cpu.memory().read_byte(0), Ok(0));
    assert_eq!(cpu.state(), ExecutionState::Stopped);
    cpu.reset(true);
    assert_eq!(cpu.state(), ExecutionState::Running);
}

#[test]
fn ld_add_nop_program() {
    // LD A,5; ADD A,3; NOP
    let mut cpu = cpu_with(&[0x3E, 0x05, 0xC6, 0x03, 0x00]);
    steps(&mut cpu, 3);
    assert_eq!(cpu.registers().a(), 8);
    let flags = cpu.registers().flags();
    assert!(!flags.sf() && !flags.zf() && !flags.hf() && !flags.pvf());
    assert!(!flags.nf() && !flags.cf());
    // the undocumented X bit mirrors bit 3 of the result 08h
    assert_eq!(flags, Flags::X);
    assert_eq!(cpu.registers().pc(), 5);
}

#[test]
fn add_overflow_program() {
    // LD A,7Fh; ADD A,A
    let mut cpu = cpu_with(&[0x3E, 0x7F, 0x87]);
    steps(&mut cpu, 2);
    assert_eq!(cpu.registers().a(), 0xFE);
    let flags = cpu.registers().flags();
    assert!(flags.sf() && !flags.zf() && flags.hf() && flags.pvf());
    assert!(!flags.nf() && !flags.cf());
    assert_eq!(flags, Flags::S | Flags::H | Flags::PV | Flags::XY);
}

#[test]
fn outi_twice_program() {
    // LD C,2; LD A,41h; OUTI; OUTI
    let written = Arc::new(Mutex::new(Vec::new()));
    let mut cpu = cpu_with(&[0x0E, 0x02, 0x3E, 0x41, 0xED, 0xA3, 0xED, 0xA3]);
    {
        let written = written.clone();
        cpu.ports_mut().bind_write(2, move |_, data| written.lock().unwrap().push(data));
    }
    steps(&mut cpu, 3);
    assert_eq!(cpu.registers().get8(Reg8::B), 0xFF);
    assert_eq!(cpu.registers().hl(), 1);
    steps(&mut cpu, 1);
    assert_eq!(cpu.registers().get8(Reg8::B), 0xFE);
    assert_eq!(cpu.registers().hl(), 2);
    // OUTI sent the bytes at HL=0 and HL=1
    assert_eq!(*written.lock().unwrap(), vec![0x0E, 0x02]);
}

#[test]
fn neg_program() {
    // NEG with A=1
    let mut cpu = cpu_with(&[0xED, 0x44]);
    cpu.registers_mut().set_a(0x01);
    steps(&mut cpu, 1);
    assert_eq!(cpu.registers().a(), 0xFF);
    let flags = cpu.registers().flags();
    assert!(flags.sf() && !flags.zf() && flags.hf() && !flags.pvf());
    assert!(flags.nf() && flags.cf());
}

#[test]
fn rlc_indexed_program() {
    // RLC (IX+2) with IX=1000h and 81h at 1002h
    let mut cpu = cpu_with(&[0xDD, 0xCB, 0x02, 0x06]);
    cpu.registers_mut().set_ix(0x1000);
    cpu.memory_mut().write_byte(0x1002, 0x81).unwrap();
    steps(&mut cpu, 1);
    assert_eq!(cpu.memory().read_byte(0x1002), Ok(0x03));
    let flags = cpu.registers().flags();
    assert!(flags.cf() && flags.pvf());
    assert!(!flags.zf() && !flags.sf());
    assert_eq!(cpu.registers().pc(), 4);
    // the effective address was latched in WZ
    assert_eq!(cpu.registers().wz(), 0x1002);
}

#[test]
fn rlc_indexed_copies_to_register() {
    // the undocumented RLC (IX+1) -> B form
    let mut cpu = cpu_with(&[0xDD, 0xCB, 0x01, 0x00]);
    cpu.registers_mut().set_ix(0x2000);
    cpu.memory_mut().write_byte(0x2001, 0x80).unwrap();
    steps(&mut cpu, 1);
    assert_eq!(cpu.memory().read_byte(0x2001), Ok(0x01));
    assert_eq!(cpu.registers().get8(Reg8::B), 0x01);
    assert!(cpu.registers().flags().cf());
}

#[test]
fn push_pop_round_trip() {
    for (push, pop, reg) in [(0xC5u8, 0xC1u8, Reg16::BC), (0xD5, 0xD1, Reg16::DE),
                             (0xE5, 0xE1, Reg16::HL)] {
        let mut cpu = cpu_with(&[push, pop]);
        cpu.registers_mut().set16(reg, 0xA55A);
        let sp = cpu.registers().sp();
        steps(&mut cpu, 2);
        assert_eq!(cpu.registers().get16(reg), 0xA55A);
        assert_eq!(cpu.registers().sp(), sp);
    }
    // PUSH IX; POP IY moves a value between the index registers
    let mut cpu = cpu_with(&[0xDD, 0xE5, 0xFD, 0xE1]);
    cpu.registers_mut().set_ix(0xBEEF);
    steps(&mut cpu, 2);
    assert_eq!(cpu.registers().iy(), 0xBEEF);
    // PUSH AF stores the live flags
    let mut cpu = cpu_with(&[0xF5, 0xC1]);
    cpu.registers_mut().set_af(0x12D7);
    steps(&mut cpu, 2);
    assert_eq!(cpu.registers().bc(), 0x12D7);
}

#[test]
fn exchange_twice_is_identity() {
    // EXX; EXX and EX AF,AF'; EX AF,AF'
    let mut cpu = cpu_with(&[0xD9, 0xD9, 0x08, 0x08]);
    cpu.registers_mut().set_af(0x1122);
    cpu.registers_mut().set_bc(0x3344);
    cpu.registers_mut().set_de(0x5566);
    cpu.registers_mut().set_hl(0x7788);
    steps(&mut cpu, 4);
    assert_eq!(cpu.registers().af(), 0x1122);
    assert_eq!(cpu.registers().bc(), 0x3344);
    assert_eq!(cpu.registers().de(), 0x5566);
    assert_eq!(cpu.registers().hl(), 0x7788);
}

#[test]
fn ldi_then_ldd_is_identity_for_bc_one() {
    let mut cpu = cpu_with(&[0xED, 0xA0, 0xED, 0xA8]);
    cpu.memory_mut().write_byte(0x1000, 0x42).unwrap();
    cpu.memory_mut().write_byte(0x2000, 0x99).unwrap();
    cpu.registers_mut().set_hl(0x1000);
    cpu.registers_mut().set_de(0x2000);
    cpu.registers_mut().set_bc(1);
    steps(&mut cpu, 1);
    assert_eq!(cpu.memory().read_byte(0x2000), Ok(0x42));
    assert_eq!(cpu.registers().bc(), 0);
    assert!(!cpu.registers().flags().pvf());
    // reverse with LDD from the incremented addresses
    cpu.registers_mut().set_hl(0x1001);
    cpu.registers_mut().set_de(0x2001);
    cpu.registers_mut().set_bc(1);
    cpu.memory_mut().write_byte(0x1001, 0x55).unwrap();
    steps(&mut cpu, 1);
    assert_eq!(cpu.memory().read_byte(0x2001), Ok(0x55));
    assert_eq!(cpu.registers().hl(), 0x1000);
    assert_eq!(cpu.registers().de(), 0x2000);
}

#[test]
fn ldir_copies_a_block() {
    // LDIR with BC=4
    let mut cpu = cpu_with(&[0xED, 0xB0, 0x76]);
    cpu.memory_mut().write_bytes(0x1000, &[1, 2, 3, 4]).unwrap();
    cpu.registers_mut().set_hl(0x1000);
    cpu.registers_mut().set_de(0x2000);
    cpu.registers_mut().set_bc(4);
    cpu.run_until_stopped().unwrap();
    assert_eq!(cpu.memory().read_bytes(0x2000, 4).unwrap(), &[1, 2, 3, 4]);
    assert_eq!(cpu.registers().bc(), 0);
    assert_eq!(cpu.registers().hl(), 0x1004);
    assert_eq!(cpu.registers().de(), 0x2004);
    assert!(!cpu.registers().flags().pvf());
    assert_eq!(cpu.registers().pc(), 3);
}

#[test]
fn cpir_finds_a_match() {
    // CPIR looking for 3 in 1,2,3,4
    let mut cpu = cpu_with(&[0xED, 0xB1, 0x76]);
    cpu.memory_mut().write_bytes(0x1000, &[1, 2, 3, 4]).unwrap();
    cpu.registers_mut().set_a(3);
    cpu.registers_mut().set_hl(0x1000);
    cpu.registers_mut().set_bc(4);
    cpu.run_until_stopped().unwrap();
    assert_eq!(cpu.registers().hl(), 0x1003);
    assert_eq!(cpu.registers().bc(), 1);
    let flags = cpu.registers().flags();
    assert!(flags.zf() && flags.pvf() && flags.nf());
}

#[test]
fn inc_dec_boundaries() {
    // INC A wrapping FFh -> 0
    let mut cpu = cpu_with(&[0x3C]);
    cpu.registers_mut().set_a(0xFF);
    steps(&mut cpu, 1);
    assert_eq!(cpu.registers().a(), 0);
    let flags = cpu.registers().flags();
    assert!(flags.zf() && flags.hf() && !flags.nf());
    // DEC A wrapping 0 -> FFh
    let mut cpu = cpu_with(&[0x3D]);
    steps(&mut cpu, 1);
    assert_eq!(cpu.registers().a(), 0xFF);
    let flags = cpu.registers().flags();
    assert!(flags.sf() && flags.hf() && flags.nf() && !flags.zf());
}

#[test]
fn rotating_zero_keeps_zero() {
    // RLC A via the CB prefix
    let mut cpu = cpu_with(&[0xCB, 0x07]);
    steps(&mut cpu, 1);
    assert_eq!(cpu.registers().a(), 0);
    assert!(cpu.registers().flags().zf());
    assert!(!cpu.registers().flags().cf());
}

#[test]
fn rom_write_is_dropped() {
    let mut cpu = Processor::new();
    // LD (1000h),A in RAM, the target in ROM
    cpu.bind_memory([Segment::ram(0, 0x1000), Segment::rom(0x1000, &[0x5A])]);
    cpu.memory_mut().write_bytes(0, &[0x3E, 0xFF, 0x32, 0x00, 0x10, 0x76]).unwrap();
    cpu.set_end_on_halt(true);
    cpu.start().unwrap();
    cpu.run_until_stopped().unwrap();
    assert_eq!(cpu.memory().read_byte(0x1000), Ok(0x5A));
}

#[test]
fn conditional_jumps_and_calls() {
    // LD A,1; OR A; JP Z,dead; CALL 0x20; HALT ... at 0x20: RET
    let mut cpu = cpu_with(&[
        0x3E, 0x01,             // 0000 LD A,1
        0xB7,                   // 0002 OR A
        0xCA, 0x40, 0x00,       // 0003 JP Z,0040
        0xCD, 0x20, 0x00,       // 0006 CALL 0020
        0x76                    // 0009 HALT
    ]);
    cpu.memory_mut().write_byte(0x20, 0xC9).unwrap();
    cpu.memory_mut().write_byte(0x40, 0x76).unwrap();
    cpu.run_until_stopped().unwrap();
    assert_eq!(cpu.registers().pc(), 0x0A);
    assert_eq!(cpu.registers().sp(), 0xFFFF);
}

#[test]
fn djnz_counts_down() {
    // LD B,5; loop: INC A; DJNZ loop; HALT
    let mut cpu = cpu_with(&[0x06, 0x05, 0x3C, 0x10, 0xFD, 0x76]);
    cpu.run_until_stopped().unwrap();
    assert_eq!(cpu.registers().a(), 5);
    assert_eq!(cpu.registers().get8(Reg8::B), 0);
}

#[test]
fn daa_adjusts_bcd_addition() {
    // LD A,15h; ADD A,27h; DAA => 42h
    let mut cpu = cpu_with(&[0x3E, 0x15, 0xC6, 0x27, 0x27]);
    steps(&mut cpu, 3);
    assert_eq!(cpu.registers().a(), 0x42);
    assert!(!cpu.registers().flags().cf());
}

#[test]
fn indexed_loads_and_halves() {
    // LD IX,1234h; LD IXH,56h; LD A,IXL
    let mut cpu = cpu_with(&[0xDD, 0x21, 0x34, 0x12, 0xDD, 0x26, 0x56, 0xDD, 0x7D]);
    steps(&mut cpu, 3);
    assert_eq!(cpu.registers().ix(), 0x5634);
    assert_eq!(cpu.registers().a(), 0x34);
}

#[test]
fn ld_h_indexed_keeps_h() {
    // LD H,(IX+1) loads the true H register
    let mut cpu = cpu_with(&[0xDD, 0x66, 0x01]);
    cpu.registers_mut().set_ix(0x1000);
    cpu.memory_mut().write_byte(0x1001, 0x77).unwrap();
    steps(&mut cpu, 1);
    assert_eq!(cpu.registers().get8(Reg8::H), 0x77);
    assert_eq!(cpu.registers().ix(), 0x1000);
}

#[test]
fn prefix_chain_collapses() {
    // DD DD FD 00: the first two prefixes decay to NOPs, FD prefixes NOP
    let mut cpu = cpu_with(&[0xDD, 0xDD, 0xFD, 0x00]);
    steps(&mut cpu, 1);
    assert_eq!(cpu.registers().pc(), 4);
    // undefined ED opcodes are two-byte NOPs
    let mut cpu = cpu_with(&[0xED, 0x00]);
    steps(&mut cpu, 1);
    assert_eq!(cpu.registers().pc(), 2);
}

#[test]
fn halt_waits_for_interrupt() {
    let mut cpu = cpu_with(&[0x76]);
    cpu.set_end_on_halt(false);
    cpu.set_iffs(true, true);
    cpu.set_interrupt_mode(InterruptMode::Mode1);
    steps(&mut cpu, 1);
    assert_eq!(cpu.state(), ExecutionState::Halted);
    let halted_pc = cpu.registers().pc();
    assert_eq!(halted_pc, 1);
    // halted steps keep the clock and R running
    let r = cpu.registers().r();
    let t0 = cpu.tstates();
    steps(&mut cpu, 2);
    assert_eq!(cpu.tstates() - t0, 8);
    assert_eq!(cpu.registers().r(), r.wrapping_add(2));
    // the interrupt resumes execution past the HALT
    cpu.signals().raise_int();
    steps(&mut cpu, 1);
    assert_eq!(cpu.state(), ExecutionState::Running);
    assert_eq!(cpu.registers().pc(), IM1_RESTART);
    // the pushed return address points past the HALT instruction
    let ret = cpu.memory().read_word(cpu.registers().sp()).unwrap();
    assert_eq!(ret, halted_pc);
    assert_eq!(cpu.iffs(), (false, false));
}

#[test]
fn nmi_preserves_iff2() {
    let mut cpu = cpu_with(&[0x00, 0x00]);
    cpu.set_iffs(true, true);
    cpu.signals().raise_nmi();
    steps(&mut cpu, 1);
    assert_eq!(cpu.registers().pc(), NMI_RESTART);
    assert_eq!(cpu.iffs(), (false, true));
    assert_eq!(cpu.registers().sp(), 0xFFFD);
    assert_eq!(cpu.memory().read_word(0xFFFD), Ok(1));
}

#[test]
fn retn_restores_iff1() {
    // NMI into 0x66 where RETN returns
    let mut cpu = cpu_with(&[0x00, 0x76]);
    cpu.memory_mut().write_bytes(0x66, &[0xED, 0x45]).unwrap();
    cpu.set_iffs(true, true);
    cpu.signals().raise_nmi();
    steps(&mut cpu, 1);
    assert_eq!(cpu.iffs(), (false, true));
    steps(&mut cpu, 1); // RETN
    assert_eq!(cpu.iffs(), (true, true));
    assert_eq!(cpu.registers().pc(), 1);
}

#[test]
fn ei_defers_interrupt_acceptance() {
    // EI; NOP with the INT line active from the start
    let mut cpu = cpu_with(&[0xFB, 0x00]);
    cpu.set_interrupt_mode(InterruptMode::Mode1);
    cpu.signals().raise_int();
    steps(&mut cpu, 1); // EI: the interrupt must not be accepted yet
    assert_eq!(cpu.registers().pc(), 1);
    assert_eq!(cpu.iffs(), (true, true));
    steps(&mut cpu, 1); // NOP, then the acknowledge
    assert_eq!(cpu.registers().pc(), IM1_RESTART);
}

#[test]
fn di_masks_interrupts() {
    let mut cpu = cpu_with(&[0xF3, 0x00, 0x00]);
    cpu.set_interrupt_mode(InterruptMode::Mode1);
    cpu.set_iffs(true, true);
    cpu.signals().raise_int();
    steps(&mut cpu, 3);
    assert_eq!(cpu.registers().pc(), 3);
}

#[test]
fn interrupt_mode2_vectors_through_the_table() {
    let mut cpu = cpu_with(&[0x00]);
    cpu.set_interrupt_mode(InterruptMode::Mode2);
    cpu.set_iffs(true, true);
    cpu.registers_mut().set_i(0x20);
    cpu.memory_mut().write_word(0x2010, 0x4000).unwrap();
    cpu.set_interrupt_data(|| 0x10);
    cpu.signals().raise_int();
    steps(&mut cpu, 1);
    assert_eq!(cpu.registers().pc(), 0x4000);
    assert_eq!(cpu.registers().wz(), 0x4000);
    assert_eq!(cpu.memory().read_word(cpu.registers().sp()), Ok(1));
}

#[test]
fn interrupt_mode0_executes_the_supplied_instruction() {
    let mut cpu = cpu_with(&[0x00]);
    cpu.set_interrupt_mode(InterruptMode::Mode0);
    cpu.set_iffs(true, true);
    cpu.set_interrupt_data(|| opconsts::RST_38H_OPCODE);
    cpu.signals().raise_int();
    steps(&mut cpu, 1);
    assert_eq!(cpu.registers().pc(), 0x38);
    assert_eq!(cpu.memory().read_word(cpu.registers().sp()), Ok(1));
}

#[test]
fn interrupt_without_data_callback_fails() {
    let mut cpu = cpu_with(&[0x00]);
    cpu.set_interrupt_mode(InterruptMode::Mode2);
    cpu.set_iffs(true, true);
    cpu.signals().raise_int();
    assert_eq!(cpu.step(),
               Err(EngineError::InterruptMisconfiguration(InterruptMode::Mode2)));
}

#[test]
fn refresh_counter_keeps_bit_seven() {
    // LD A,80h; LD R,A; NOP; NOP
    let mut cpu = cpu_with(&[0x3E, 0x80, 0xED, 0x4F, 0x00, 0x00]);
    steps(&mut cpu, 2);
    assert_eq!(cpu.registers().r(), 0x80);
    steps(&mut cpu, 2);
    assert_eq!(cpu.registers().r(), 0x82);
    // LD A,R reflects R and IFF2 in the flags
    let mut cpu = cpu_with(&[0xED, 0x5F]);
    cpu.set_iffs(true, true);
    steps(&mut cpu, 1);
    // the two opcode fetches incremented R before the load
    assert_eq!(cpu.registers().a(), 2);
    assert!(cpu.registers().flags().pvf());
}

#[test]
fn flag_tables_match_direct_execution() {
    let program = [
        0x3E, 0x7F,             // LD A,7Fh
        0xC6, 0x01,             // ADD A,1
        0xCE, 0x10,             // ADC A,10h
        0xD6, 0x05,             // SUB 5
        0xE6, 0x3C,             // AND 3Ch
        0xEE, 0xFF,             // XOR FFh
        0xF6, 0x81,             // OR 81h
        0x07,                   // RLCA
        0x1F,                   // RRA
        0x76                    // HALT
    ];
    let mut plain = cpu_with(&program);
    plain.run_until_stopped().unwrap();
    let mut tabled = cpu_with(&program);
    tabled.enable_flag_tables();
    tabled.run_until_stopped().unwrap();
    assert_eq!(plain.registers().af(), tabled.registers().af());
}

#[test]
fn breakpoint_hook_fires_and_suspends() {
    let hits = Arc::new(Mutex::new(Vec::new()));
    let mut cpu = cpu_with(&[0x00, 0x00, 0x76]);
    cpu.add_breakpoint(1);
    let signals = cpu.signals();
    {
        let hits = hits.clone();
        let signals = signals.clone();
        cpu.hooks_mut().on_breakpoint = Some(Box::new(move |pkg| {
            hits.lock().unwrap().push(pkg.address);
            signals.suspend();
        }));
    }
    cpu.step().unwrap(); // NOP at 0
    cpu.step().unwrap(); // breakpoint at 1 parks the engine
    assert_eq!(cpu.registers().pc(), 1);
    assert_eq!(*hits.lock().unwrap(), vec![1]);
    assert_eq!(cpu.state(), ExecutionState::Running);
    // resumed execution proceeds across the breakpoint
    signals.resume();
    cpu.run_until_stopped().unwrap();
    assert_eq!(cpu.registers().pc(), 3);
    assert_eq!(*hits.lock().unwrap(), vec![1]);
}

#[test]
fn execution_hooks_observe_instructions() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut cpu = cpu_with(&[0x3E, 0x05, 0x76]);
    {
        let trace = trace.clone();
        cpu.hooks_mut().before_execute = Some(Box::new(move |pkg| {
            trace.lock().unwrap().push((pkg.address, pkg.instruction.mnemonic));
        }));
    }
    let halted = Arc::new(Mutex::new(None));
    {
        let halted = halted.clone();
        cpu.hooks_mut().on_halt = Some(Box::new(move |addr| {
            *halted.lock().unwrap() = Some(addr);
        }));
    }
    let stopped = Arc::new(Mutex::new(false));
    {
        let stopped = stopped.clone();
        cpu.hooks_mut().on_stop = Some(Box::new(move || {
            *stopped.lock().unwrap() = true;
        }));
    }
    cpu.run_until_stopped().unwrap();
    assert_eq!(*trace.lock().unwrap(), vec![(0, "LD"), (2, "HALT")]);
    assert_eq!(*halted.lock().unwrap(), Some(2));
    assert!(*stopped.lock().unwrap());
}

#[test]
fn stop_latch_is_honored() {
    let mut cpu = cpu_with(&[0x00; 16]);
    let signals = cpu.signals();
    cpu.step().unwrap();
    signals.request_stop();
    cpu.step().unwrap();
    assert_eq!(cpu.state(), ExecutionState::Stopped);
    assert_eq!(cpu.registers().pc(), 1);
}

#[test]
fn start_requires_bound_memory() {
    let mut cpu = Processor::new();
    assert_eq!(cpu.start(), Err(EngineError::Memory(MemoryError::NotInitialised)));
}

#[test]
fn decode_underrun_stops_the_engine() {
    // a CALL opcode in the last byte of the address space
    let mut cpu = Processor::new();
    cpu.bind_memory([Segment::ram(0xFF00, 0x100)]);
    cpu.memory_mut().write_byte(0xFFFF, 0xCD).unwrap();
    cpu.registers_mut().set_pc(0xFFFF);
    cpu.start().unwrap();
    cpu.step().unwrap();
    assert_eq!(cpu.state(), ExecutionState::Stopped);
}

#[test]
fn ex_sp_hl_swaps_with_the_stack() {
    let mut cpu = cpu_with(&[0xE3]);
    cpu.registers_mut().set_sp(0x8000);
    cpu.registers_mut().set_hl(0x1234);
    cpu.memory_mut().write_word(0x8000, 0xABCD).unwrap();
    steps(&mut cpu, 1);
    assert_eq!(cpu.registers().hl(), 0xABCD);
    assert_eq!(cpu.memory().read_word(0x8000), Ok(0x1234));
    assert_eq!(cpu.registers().wz(), 0xABCD);
}

#[test]
fn bit_on_memory_leaks_wz_into_xy() {
    // BIT 7,(IX+2) with a WZ high byte carrying bits 3 and 5
    let mut cpu = cpu_with(&[0xDD, 0xCB, 0x02, 0x7E]);
    cpu.registers_mut().set_ix(0x2826);
    cpu.memory_mut().write_byte(0x2828, 0x80).unwrap();
    steps(&mut cpu, 1);
    let flags = cpu.registers().flags();
    // WZ = 2828h, its high byte 28h has both bit 3 and bit 5 set
    assert!(flags.sf() && flags.hf() && !flags.zf());
    assert_eq!(flags & Flags::XY, Flags::XY);
}

#[test]
fn in_a_reads_the_port() {
    let mut cpu = cpu_with(&[0xDB, 0x7F]);
    cpu.ports_mut().bind_read(0x7F, |_| 0x5A);
    steps(&mut cpu, 1);
    assert_eq!(cpu.registers().a(), 0x5A);
    // a disconnected port reads as open bus
    let mut cpu = cpu_with(&[0xDB, 0x10]);
    steps(&mut cpu, 1);
    assert_eq!(cpu.registers().a(), 0xFF);
}

#[test]
fn in_r_c_sets_flags() {
    let mut cpu = cpu_with(&[0xED, 0x78]); // IN A,(C)
    cpu.registers_mut().set_bc(0x1140);
    cpu.ports_mut().bind_read(0x40, |_| 0x00);
    steps(&mut cpu, 1);
    assert_eq!(cpu.registers().a(), 0);
    let flags = cpu.registers().flags();
    assert!(flags.zf() && flags.pvf() && !flags.nf() && !flags.hf());
    assert_eq!(cpu.registers().wz(), 0x1141);
}
