//! Step/run driver and breakpoint bookkeeping, sitting one layer above the
//! raw cycle engine.

use std::collections::BTreeSet;

use crate::engine::cycle;
use crate::error::SimError;
use crate::memory::Memory;
use crate::microcode::MicroState;
use crate::state::ArchState;

/// A set of instruction-boundary breakpoints, addressed by PC.
#[derive(Debug, Default, Clone)]
pub struct Breakpoints {
    addrs: BTreeSet<u16>,
}

impl Breakpoints {
    pub fn new() -> Self {
        Breakpoints { addrs: BTreeSet::new() }
    }

    pub fn set(&mut self, addr: u16) {
        self.addrs.insert(addr);
    }

    pub fn clear(&mut self, addr: u16) {
        self.addrs.remove(&addr);
    }

    pub fn contains(&self, addr: u16) -> bool {
        self.addrs.contains(&addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.addrs.iter().copied()
    }
}

/// Why a `run` loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Breakpoint,
    Halted,
    InstructionLimitReached,
}

/// Advances exactly one clock cycle. A thin re-export wrapper so callers
/// that only need microstep granularity don't have to reach into
/// [`crate::engine`] directly. Fails with `SimError::UndefinedInstruction`
/// when `DECODE` cannot resolve the fetched opcode; this is process-fatal
/// at the call site.
pub fn microstep(st: &mut ArchState, mem: &mut Memory) -> Result<(), SimError> {
    cycle(st, mem)
}

/// Advances one full instruction: one cycle, then repeat until the
/// microstate lands back in `FETCH` (normal completion) or `STOP1`
/// (halted), matching the reference's do-while-style instruction step.
pub fn instruction_step(st: &mut ArchState, mem: &mut Memory) -> Result<(), SimError> {
    cycle(st, mem)?;
    while !matches!(st.ustate, MicroState::Fetch | MicroState::Stop1) {
        cycle(st, mem)?;
    }
    Ok(())
}

/// Runs whole instructions until a breakpoint is hit, the machine halts
/// (`STOP1`), or `max_instructions` have executed — whichever comes first.
/// `max_instructions = None` means unbounded.
pub fn run(
    st: &mut ArchState,
    mem: &mut Memory,
    breakpoints: &Breakpoints,
    max_instructions: Option<u64>,
) -> Result<StopReason, SimError> {
    let mut executed: u64 = 0;
    loop {
        instruction_step(st, mem)?;
        if st.ustate == MicroState::Stop1 {
            return Ok(StopReason::Halted);
        }
        executed += 1;
        if breakpoints.contains(st.pc) {
            return Ok(StopReason::Breakpoint);
        }
        if let Some(limit) = max_instructions {
            if executed >= limit {
                return Ok(StopReason::InstructionLimitReached);
            }
        }
    }
}
