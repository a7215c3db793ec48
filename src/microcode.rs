//! The microcode table: a static, immutable mapping from microstate to
//! control word, with conditional next-states resolved at lookup time
//! rather than mutated into the table in place.

use crate::alu::AluOp;

/// One microstate of the control FSM. Each variant corresponds to exactly
/// one entry in [`TABLE`] and one 7-bit identifier used by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MicroState {
    Fetch,
    Fetch1,
    Fetch2,
    Decode,
    Stop,
    Stop1,

    Add,
    And,
    Mv,
    Not,
    Or,
    Sll,
    Slt,
    Slt1,
    Sra,
    Srl,
    Sub,
    Xor,

    Addi,
    Addi1,
    Addi2,
    Lw,
    Lw1,
    Lw2,
    Lw3,
    Lw4,
    Slli,
    Slli1,
    Slli2,
    Slti,
    Slti1,
    Slti2,
    Slti3,
    Srai,
    Srai1,
    Srai2,
    Srli,
    Srli1,
    Srli2,

    Sw,
    Sw1,
    Sw2,
    Sw3,
    Sw4,

    Bra,
    Bra1,
    Bra2,
    Brc,
    Brc1,
    Brc2,
    Brc3,
    Brn,
    Brn1,
    Brn2,
    Brn3,
    Brnz,
    Brnz1,
    Brnz2,
    Brnz3,
    Brv,
    Brv1,
    Brv2,
    Brv3,
    Brz,
    Brz1,
    Brz2,
    Brz3,
}

impl MicroState {
    /// The printable name used by `get_state`, snapshot files, and memory
    /// disassembly — matches the reference listing's microstate names.
    pub const fn name(self) -> &'static str {
        use MicroState::*;
        match self {
            Fetch => "FETCH",
            Fetch1 => "FETCH1",
            Fetch2 => "FETCH2",
            Decode => "DECODE",
            Stop => "STOP",
            Stop1 => "STOP1",
            Add => "ADD",
            And => "AND",
            Mv => "MV",
            Not => "NOT",
            Or => "OR",
            Sll => "SLL",
            Slt => "SLT",
            Slt1 => "SLT1",
            Sra => "SRA",
            Srl => "SRL",
            Sub => "SUB",
            Xor => "XOR",
            Addi => "ADDI",
            Addi1 => "ADDI1",
            Addi2 => "ADDI2",
            Lw => "LW",
            Lw1 => "LW1",
            Lw2 => "LW2",
            Lw3 => "LW3",
            Lw4 => "LW4",
            Slli => "SLLI",
            Slli1 => "SLLI1",
            Slli2 => "SLLI2",
            Slti => "SLTI",
            Slti1 => "SLTI1",
            Slti2 => "SLTI2",
            Slti3 => "SLTI3",
            Srai => "SRAI",
            Srai1 => "SRAI1",
            Srai2 => "SRAI2",
            Srli => "SRLI",
            Srli1 => "SRLI1",
            Srli2 => "SRLI2",
            Sw => "SW",
            Sw1 => "SW1",
            Sw2 => "SW2",
            Sw3 => "SW3",
            Sw4 => "SW4",
            Bra => "BRA",
            Bra1 => "BRA1",
            Bra2 => "BRA2",
            Brc => "BRC",
            Brc1 => "BRC1",
            Brc2 => "BRC2",
            Brc3 => "BRC3",
            Brn => "BRN",
            Brn1 => "BRN1",
            Brn2 => "BRN2",
            Brn3 => "BRN3",
            Brnz => "BRNZ",
            Brnz1 => "BRNZ1",
            Brnz2 => "BRNZ2",
            Brnz3 => "BRNZ3",
            Brv => "BRV",
            Brv1 => "BRV1",
            Brv2 => "BRV2",
            Brv3 => "BRV3",
            Brz => "BRZ",
            Brz1 => "BRZ1",
            Brz2 => "BRZ2",
            Brz3 => "BRZ3",
        }
    }

    /// The 7-bit microstate identifier (3 high bits, 4 low bits) used by
    /// the opcode decoder, reproduced verbatim from the reference listing.
    pub const fn opcode7(self) -> u8 {
        use MicroState::*;
        match self {
            Fetch => 0b000_1001,
            Fetch1 => 0b000_1010,
            Fetch2 => 0b000_1011,
            Decode => 0b000_0111,
            Stop => 0b111_1111,
            Stop1 => 0b100_0001,

            Add => 0b000_0000,
            And => 0b100_1000,
            Mv => 0b001_0000,
            Not => 0b100_0000,
            Or => 0b101_0000,
            Sll => 0b110_0000,
            Slt => 0b010_1000,
            Slt1 => 0b010_1101,
            Sra => 0b111_1000,
            Srl => 0b111_0000,
            Sub => 0b000_1000,
            Xor => 0b101_1000,

            Addi => 0b001_1000,
            Addi1 => 0b001_1001,
            Addi2 => 0b001_1010,
            Lw => 0b001_0100,
            Lw1 => 0b001_0101,
            Lw2 => 0b001_0110,
            Lw3 => 0b001_0111,
            Lw4 => 0b001_1011,
            Slli => 0b110_0001,
            Slli1 => 0b110_0010,
            Slli2 => 0b110_0011,
            Slti => 0b010_1001,
            Slti1 => 0b010_1010,
            Slti2 => 0b010_1011,
            Slti3 => 0b010_1100,
            Srai => 0b111_1001,
            Srai1 => 0b111_1010,
            Srai2 => 0b111_1011,
            Srli => 0b111_0001,
            Srli1 => 0b111_0010,
            Srli2 => 0b111_0011,

            Sw => 0b001_1100,
            Sw1 => 0b001_1101,
            Sw2 => 0b001_1110,
            Sw3 => 0b001_1111,
            Sw4 => 0b010_0000,

            Bra => 0b111_1100,
            Bra1 => 0b111_1101,
            Bra2 => 0b111_1110,
            Brc => 0b101_0100,
            Brc1 => 0b101_0101,
            Brc2 => 0b101_0110,
            Brc3 => 0b101_0111,
            Brn => 0b100_1100,
            Brn1 => 0b100_1101,
            Brn2 => 0b100_1110,
            Brn3 => 0b100_1111,
            Brnz => 0b110_1100,
            Brnz1 => 0b110_1101,
            Brnz2 => 0b110_1110,
            Brnz3 => 0b110_1111,
            Brv => 0b101_1100,
            Brv1 => 0b101_1101,
            Brv2 => 0b101_1110,
            Brv3 => 0b101_1111,
            Brz => 0b110_0100,
            Brz1 => 0b110_0101,
            Brz2 => 0b110_0110,
            Brz3 => 0b110_0111,
        }
    }

    /// Reverse lookup used by the `DECODE` state and by memory
    /// disassembly: which microstate, if any, owns this 7-bit identifier.
    pub fn from_opcode7(opcode: u8) -> Option<MicroState> {
        ALL.iter().copied().find(|s| s.opcode7() == opcode)
    }
}

/// Every microstate, in table order. Used for enumeration and for the
/// opcode reverse lookup.
pub const ALL: [MicroState; 67] = {
    use MicroState::*;
    [
        Fetch, Fetch1, Fetch2, Decode, Stop, Stop1, Add, And, Mv, Not, Or, Sll, Slt, Slt1, Sra,
        Srl, Sub, Xor, Addi, Addi1, Addi2, Lw, Lw1, Lw2, Lw3, Lw4, Slli, Slli1, Slli2, Slti,
        Slti1, Slti2, Slti3, Srai, Srai1, Srai2, Srli, Srli1, Srli2, Sw, Sw1, Sw2, Sw3, Sw4, Bra,
        Bra1, Bra2, Brc, Brc1, Brc2, Brc3, Brn, Brn1, Brn2, Brn3, Brnz, Brnz1, Brnz2, Brnz3, Brv,
        Brv1, Brv2, Brv3, Brz, Brz1, Brz2, Brz3,
    ]
};

/// A datapath source operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Src {
    Pc,
    Mdr,
    Sp,
    Reg,
    DontCare,
}

/// A write-back destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dest {
    Pc,
    Mar,
    Mdr,
    Ir,
    Sp,
    Reg,
    None,
}

/// One of the four condition-code flags, used by [`NextState::ComputeFromFlag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Z,
    N,
    C,
    V,
    NOrZ,
}

/// How to resolve the next microstate. Replaces the reference
/// implementation's in-place-mutated table cell with a tagged variant
/// resolved at lookup time (§9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState {
    Fixed(MicroState),
    ComputeFromOpcode,
    ComputeFromFlag { flag: Flag, taken: MicroState, not_taken: MicroState },
}

/// The control word driven by one microstate.
#[derive(Debug, Clone, Copy)]
pub struct ControlWord {
    pub alu_op: AluOp,
    pub src_a: Src,
    pub src_b: Src,
    pub dest: Dest,
    pub load_cc: bool,
    pub mem_read: bool,
    pub mem_write: bool,
    pub next: NextState,
}

macro_rules! cw {
    ($alu:expr, $a:expr, $b:expr, $dest:expr, $cc:expr, $rd:expr, $wr:expr, $next:expr) => {
        ControlWord {
            alu_op: $alu,
            src_a: $a,
            src_b: $b,
            dest: $dest,
            load_cc: $cc,
            mem_read: $rd,
            mem_write: $wr,
            next: $next,
        }
    };
}

/// Looks up the control word for `state`, fully resolved except for
/// `ComputeFromOpcode`/`ComputeFromFlag`, which the cycle engine resolves
/// against live IR/flag values via [`resolve_next`].
pub fn control_word(state: MicroState) -> ControlWord {
    use AluOp::*;
    use Dest::*;
    use Flag::*;
    use MicroState::*;
    use NextState::*;
    use Src::*;

    match state {
        Fetch => cw!(A, Pc, DontCare, Mar, false, false, false, Fixed(Fetch1)),
        Fetch1 => cw!(APlus2, Pc, DontCare, Pc, false, true, false, Fixed(Fetch2)),
        Fetch2 => cw!(A, Mdr, DontCare, Ir, false, false, false, Fixed(Decode)),
        Decode => cw!(DontCare, DontCare, DontCare, None, false, false, false, ComputeFromOpcode),
        Stop => cw!(DontCare, DontCare, DontCare, None, false, false, false, Fixed(Stop1)),
        Stop1 => cw!(DontCare, DontCare, DontCare, None, false, false, false, Fixed(Stop1)),

        Add => cw!(APlusB, Reg, Reg, Reg, true, false, false, Fixed(Fetch)),
        And => cw!(AAndB, Reg, Reg, Reg, true, false, false, Fixed(Fetch)),
        Mv => cw!(A, Reg, DontCare, Reg, false, false, false, Fixed(Fetch)),
        Not => cw!(NotA, Reg, DontCare, Reg, true, false, false, Fixed(Fetch)),
        Or => cw!(AOrB, Reg, Reg, Reg, true, false, false, Fixed(Fetch)),
        Sll => cw!(Shl, Reg, Reg, Reg, true, false, false, Fixed(Fetch)),
        Slt => cw!(AMinusB, Reg, Reg, None, true, false, false, Fixed(Slt1)),
        Slt1 => cw!(LtSigned, Reg, Reg, Reg, false, false, false, Fixed(Fetch)),
        Sra => cw!(Ashr, Reg, Reg, Reg, true, false, false, Fixed(Fetch)),
        Srl => cw!(Lshr, Reg, Reg, Reg, true, false, false, Fixed(Fetch)),
        Sub => cw!(AMinusB, Reg, Reg, Reg, true, false, false, Fixed(Fetch)),
        Xor => cw!(AXorB, Reg, Reg, Reg, true, false, false, Fixed(Fetch)),

        Addi => cw!(A, Pc, DontCare, Mar, false, false, false, Fixed(Addi1)),
        Addi1 => cw!(APlus2, Pc, DontCare, Pc, false, true, false, Fixed(Addi2)),
        Addi2 => cw!(APlusB, Reg, Mdr, Reg, true, false, false, Fixed(Fetch)),

        Lw => cw!(A, Pc, DontCare, Mar, false, false, false, Fixed(Lw1)),
        Lw1 => cw!(APlus2, Pc, DontCare, Pc, false, true, false, Fixed(Lw2)),
        Lw2 => cw!(APlusB, Reg, Mdr, Mar, false, false, false, Fixed(Lw3)),
        Lw3 => cw!(DontCare, DontCare, DontCare, None, false, true, false, Fixed(Lw4)),
        Lw4 => cw!(A, Mdr, DontCare, Reg, true, false, false, Fixed(Fetch)),

        Slli => cw!(A, Pc, DontCare, Mar, false, false, false, Fixed(Slli1)),
        Slli1 => cw!(APlus2, Pc, DontCare, Pc, false, true, false, Fixed(Slli2)),
        Slli2 => cw!(Shl, Reg, Mdr, Reg, true, false, false, Fixed(Fetch)),

        Slti => cw!(A, Pc, DontCare, Mar, false, false, false, Fixed(Slti1)),
        Slti1 => cw!(APlus2, Pc, DontCare, Pc, false, true, false, Fixed(Slti2)),
        Slti2 => cw!(AMinusB, Reg, Mdr, None, true, false, false, Fixed(Slti3)),
        Slti3 => cw!(LtSigned, Reg, Mdr, Reg, false, false, false, Fixed(Fetch)),

        Srai => cw!(A, Pc, DontCare, Mar, false, false, false, Fixed(Srai1)),
        Srai1 => cw!(APlus2, Pc, DontCare, Pc, false, true, false, Fixed(Srai2)),
        Srai2 => cw!(Ashr, Reg, Mdr, Reg, true, false, false, Fixed(Fetch)),

        Srli => cw!(A, Pc, DontCare, Mar, false, false, false, Fixed(Srli1)),
        Srli1 => cw!(APlus2, Pc, DontCare, Pc, false, true, false, Fixed(Srli2)),
        Srli2 => cw!(Lshr, Reg, Mdr, Reg, true, false, false, Fixed(Fetch)),

        Sw => cw!(A, Pc, DontCare, Mar, false, false, false, Fixed(Sw1)),
        Sw1 => cw!(APlus2, Pc, DontCare, Pc, false, true, false, Fixed(Sw2)),
        Sw2 => cw!(APlusB, Reg, Mdr, Mar, false, false, false, Fixed(Sw3)),
        Sw3 => cw!(B, DontCare, Reg, Mdr, true, false, false, Fixed(Sw4)),
        Sw4 => cw!(DontCare, DontCare, DontCare, None, false, false, true, Fixed(Fetch)),

        Bra => cw!(A, Pc, DontCare, Mar, false, false, false, Fixed(Bra1)),
        Bra1 => cw!(DontCare, DontCare, DontCare, None, false, true, false, Fixed(Bra2)),
        Bra2 => cw!(A, Mdr, DontCare, Pc, false, false, false, Fixed(Fetch)),

        Brc => cw!(
            A,
            Pc,
            DontCare,
            Mar,
            false,
            false,
            false,
            ComputeFromFlag { flag: C, taken: Brc2, not_taken: Brc1 }
        ),
        Brc1 => cw!(APlus2, Pc, DontCare, Pc, false, false, false, Fixed(Fetch)),
        Brc2 => cw!(DontCare, DontCare, DontCare, None, false, true, false, Fixed(Brc3)),
        Brc3 => cw!(A, Mdr, DontCare, Pc, false, false, false, Fixed(Fetch)),

        Brn => cw!(
            A,
            Pc,
            DontCare,
            Mar,
            false,
            false,
            false,
            ComputeFromFlag { flag: N, taken: Brn2, not_taken: Brn1 }
        ),
        Brn1 => cw!(APlus2, Pc, DontCare, Pc, false, false, false, Fixed(Fetch)),
        Brn2 => cw!(DontCare, DontCare, DontCare, None, false, true, false, Fixed(Brn3)),
        Brn3 => cw!(A, Mdr, DontCare, Pc, false, false, false, Fixed(Fetch)),

        Brnz => cw!(
            A,
            Pc,
            DontCare,
            Mar,
            false,
            false,
            false,
            ComputeFromFlag { flag: NOrZ, taken: Brnz2, not_taken: Brnz1 }
        ),
        Brnz1 => cw!(APlus2, Pc, DontCare, Pc, false, false, false, Fixed(Fetch)),
        Brnz2 => cw!(DontCare, DontCare, DontCare, None, false, true, false, Fixed(Brnz3)),
        Brnz3 => cw!(A, Mdr, DontCare, Pc, false, false, false, Fixed(Fetch)),

        Brv => cw!(
            A,
            Pc,
            DontCare,
            Mar,
            false,
            false,
            false,
            ComputeFromFlag { flag: V, taken: Brv2, not_taken: Brv1 }
        ),
        Brv1 => cw!(APlus2, Pc, DontCare, Pc, false, false, false, Fixed(Fetch)),
        Brv2 => cw!(DontCare, DontCare, DontCare, None, false, true, false, Fixed(Brv3)),
        Brv3 => cw!(A, Mdr, DontCare, Pc, false, false, false, Fixed(Fetch)),

        Brz => cw!(
            A,
            Pc,
            DontCare,
            Mar,
            false,
            false,
            false,
            ComputeFromFlag { flag: Z, taken: Brz2, not_taken: Brz1 }
        ),
        Brz1 => cw!(APlus2, Pc, DontCare, Pc, false, false, false, Fixed(Fetch)),
        Brz2 => cw!(DontCare, DontCare, DontCare, None, false, true, false, Fixed(Brz3)),
        Brz3 => cw!(A, Mdr, DontCare, Pc, false, false, false, Fixed(Fetch)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_state_list() -> Vec<MicroState> {
        ALL.to_vec()
    }

    #[test]
    fn every_opcode7_identifier_is_unique() {
        let states = full_state_list();
        for (i, a) in states.iter().enumerate() {
            for b in &states[i + 1..] {
                assert_ne!(a.opcode7(), b.opcode7(), "{:?} and {:?} collide", a, b);
            }
        }
    }

    #[test]
    fn from_opcode7_round_trips() {
        for state in full_state_list() {
            assert_eq!(MicroState::from_opcode7(state.opcode7()), Some(state));
        }
    }

    #[test]
    fn fixed_next_states_are_reachable_states() {
        for state in full_state_list() {
            if let NextState::Fixed(next) = control_word(state).next {
                assert!(full_state_list().contains(&next));
            }
        }
    }

    #[test]
    fn name_matches_reference_listing_spelling() {
        assert_eq!(MicroState::Fetch.name(), "FETCH");
        assert_eq!(MicroState::Slti3.name(), "SLTI3");
        assert_eq!(MicroState::Brnz2.name(), "BRNZ2");
    }
}
