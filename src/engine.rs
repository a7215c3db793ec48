//! The cycle engine: one call to [`cycle`] advances the machine by exactly
//! one clock tick, in the fixed step order the datapath imposes.

use crate::alu;
use crate::bits::slice;
use crate::error::SimError;
use crate::memory::Memory;
use crate::microcode::{self, ControlWord, Dest, Flag, MicroState, NextState, Src};
use crate::state::ArchState;

/// `IR[8:6]`: the destination register field, shared by R-type and
/// I-type instructions.
fn rd(ir: u16) -> u8 {
    slice(ir as u32, 8, 6) as u8
}

/// `IR[5:3]`: the first source register field.
fn rs1(ir: u16) -> u8 {
    slice(ir as u32, 5, 3) as u8
}

/// `IR[2:0]`: the second source register field, valid only for R-type.
fn rs2(ir: u16) -> u8 {
    slice(ir as u32, 2, 0) as u8
}

/// Advances the machine by one clock cycle: fetch the control word for the
/// current microstate, read operands, evaluate the ALU, touch memory,
/// write back, then resolve and latch the next microstate.
///
/// Returns `Err(SimError::UndefinedInstruction)` when `DECODE` cannot map
/// the fetched opcode to a microstate; the caller is responsible for
/// surfacing this as a fatal, process-ending condition.
pub fn cycle(st: &mut ArchState, mem: &mut Memory) -> Result<(), SimError> {
    let cw: ControlWord = microcode::control_word(st.ustate);

    let rd_idx = rd(st.ir);
    let rs1_idx = rs1(st.ir);
    let rs2_idx = rs2(st.ir);

    // srcA is always rs1 when it reads the register file; srcB reads rs2
    // for R-type ALU ops and the immediate-sourced MDR/SP paths otherwise.
    let a = match cw.src_a {
        Src::Reg => st.reg(rs1_idx),
        Src::Pc => st.pc,
        Src::Mdr => st.mdr,
        Src::Sp => st.sp,
        Src::DontCare => 0,
    };
    let b = match cw.src_b {
        Src::Reg => st.reg(rs2_idx),
        Src::Pc => st.pc,
        Src::Mdr => st.mdr,
        Src::Sp => st.sp,
        Src::DontCare => 0,
    };

    let result = alu::eval(cw.alu_op, a, b);

    if cw.mem_read {
        st.mdr = mem.read(st.mar);
    }
    if cw.mem_write {
        mem.write(st.mar, st.mdr);
    }

    match cw.dest {
        Dest::Pc => st.set_pc(result.result),
        Dest::Mar => st.mar = result.result,
        Dest::Mdr => st.mdr = result.result,
        Dest::Ir => st.ir = result.result,
        Dest::Sp => st.sp = result.result,
        Dest::Reg => st.set_reg(rd_idx, result.result),
        Dest::None => {}
    }

    // The reference datapath re-latches MDR from a just-completed memory
    // read only after the ALU writeback above has had a chance to consume
    // the previous MDR value (e.g. SW's store-data stage).
    if cw.mem_read {
        st.mdr = mem.read(st.mar);
    }

    if cw.load_cc {
        st.z = result.z;
        st.n = result.n;
        st.c = result.c;
        st.v = result.v;
    }

    st.ustate = resolve_next(cw.next, st)?;
    st.cycle += 1;
    Ok(())
}

/// Resolves a [`NextState`] against the live machine: `ComputeFromOpcode`
/// decodes the freshly-fetched instruction's top bits, `ComputeFromFlag`
/// branches on the condition code named by the control word.
fn resolve_next(next: NextState, st: &ArchState) -> Result<MicroState, SimError> {
    match next {
        NextState::Fixed(s) => Ok(s),
        NextState::ComputeFromOpcode => {
            let opcode7 = slice(st.ir as u32, 15, 9) as u8;
            MicroState::from_opcode7(opcode7).ok_or(SimError::UndefinedInstruction(st.pc))
        }
        NextState::ComputeFromFlag { flag, taken, not_taken } => {
            let condition = match flag {
                Flag::Z => st.z,
                Flag::N => st.n,
                Flag::C => st.c,
                Flag::V => st.v,
                Flag::NOrZ => st.n || st.z,
            };
            Ok(if condition { taken } else { not_taken })
        }
    }
}
