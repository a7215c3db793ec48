//! Cross-module scenarios: a full instruction stream run to `STOP1`,
//! exercised through the public driver and snapshot APIs rather than the
//! raw cycle engine.

use risc240::driver::{self, Breakpoints};
use risc240::memory::Memory;
use risc240::microcode::MicroState;
use risc240::snapshot;
use risc240::state::ArchState;

fn run_to_halt(st: &mut ArchState, mem: &mut Memory) {
    let breakpoints = Breakpoints::new();
    driver::run(st, mem, &breakpoints, None).unwrap();
}

#[test]
fn addi_adds_an_immediate_word_fetched_from_the_instruction_stream() {
    // ADDI R2, R0, <imm>: rd=2, rs1=0, opcode7 = ADDI's identifier.
    let addi_opcode7 = MicroState::Addi.opcode7() as u16;
    let addi_ir = (addi_opcode7 << 9) | (2 << 6); // rs1 = R0
    let stop_ir = (MicroState::Stop.opcode7() as u16) << 9;

    let mut mem = Memory::new(false);
    mem.preload(0x0000, addi_ir);
    mem.preload(0x0002, 0x000A); // immediate operand
    mem.preload(0x0004, stop_ir);

    let mut st = ArchState::reset();
    run_to_halt(&mut st, &mut mem);

    assert_eq!(st.reg(2), 0x000A);
    assert!(!st.z);
    assert!(!st.n);
    assert_eq!(st.ustate, MicroState::Stop1);
}

#[test]
fn sw_then_lw_preserves_the_stored_value_across_a_full_run() {
    let sw_opcode7 = MicroState::Sw.opcode7() as u16;
    let lw_opcode7 = MicroState::Lw.opcode7() as u16;
    let stop_ir = (MicroState::Stop.opcode7() as u16) << 9;

    let mut mem = Memory::new(false);
    mem.preload(0x0000, (sw_opcode7 << 9) | 3); // SW R3, <imm>(R0): rs2 = R3
    mem.preload(0x0002, 0x0100); // displacement
    mem.preload(0x0004, (lw_opcode7 << 9) | (4 << 6)); // LW R4, <imm>(R0): rd = R4
    mem.preload(0x0006, 0x0100);
    mem.preload(0x0008, stop_ir);

    let mut st = ArchState::reset();
    st.set_reg(3, 0x1234);
    run_to_halt(&mut st, &mut mem);

    assert_eq!(st.reg(4), 0x1234);
    assert!(mem.is_defined(0x0100));
    assert_eq!(mem.read(0x0100), 0x1234);
}

#[test]
fn save_then_load_then_check_against_the_same_file_finds_no_differences() {
    let mut mem = Memory::new(false);
    mem.preload(0x0000, (MicroState::Stop.opcode7() as u16) << 9);
    let mut st = ArchState::reset();
    run_to_halt(&mut st, &mut mem);

    let text = snapshot::save(&st, &mem, &[0x0002]);
    let snap = snapshot::parse(&text).unwrap();

    let mut loaded_st = ArchState::reset();
    let mut loaded_mem = Memory::new(false);
    let mut breakpoints = Vec::new();
    snapshot::load(&snap, &mut loaded_st, &mut loaded_mem, &mut breakpoints);

    let diffs = snapshot::check(&snap, &loaded_st, &loaded_mem);
    assert!(diffs.is_empty(), "unexpected diffs: {diffs:?}");
    assert_eq!(breakpoints, vec![0x0002]);
}

#[test]
fn running_an_undefined_opcode_reports_a_fatal_error_instead_of_halting() {
    let mut mem = Memory::new(false);
    mem.preload(0x0000, 0b000_0001u16 << 9); // unassigned opcode7
    let mut st = ArchState::reset();
    let breakpoints = Breakpoints::new();
    let err = driver::run(&mut st, &mut mem, &breakpoints, None).unwrap_err();
    assert!(matches!(err, risc240::error::SimError::UndefinedInstruction(_)));
}

#[test]
fn running_from_a_loaded_snapshot_reaches_stop1_at_the_same_cycle() {
    let mut mem = Memory::new(false);
    mem.preload(0x0000, 0x0000); // ADD R0,R0,R0 (no-op)
    mem.preload(0x0002, (MicroState::Stop.opcode7() as u16) << 9);

    let mut st = ArchState::reset();
    run_to_halt(&mut st, &mut mem);
    let cycles_direct = st.cycle;

    let text = snapshot::save(&ArchState::reset(), &mem, &[]);
    let snap = snapshot::parse(&text).unwrap();
    let mut replay_st = ArchState::reset();
    let mut replay_mem = Memory::new(false);
    let mut breakpoints = Vec::new();
    snapshot::load(&snap, &mut replay_st, &mut replay_mem, &mut breakpoints);
    run_to_halt(&mut replay_st, &mut replay_mem);

    assert_eq!(replay_st.cycle, cycles_direct);
    assert_eq!(replay_st.ustate, MicroState::Stop1);
}
