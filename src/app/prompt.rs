//! Interactive command dispatch: one call to [`dispatch`] per typed line.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use risc240::bits::{hex4, word_align};
use risc240::driver::{self, Breakpoints, StopReason};
use risc240::error::{CommandError, SimError};
use risc240::memory::Memory;
use risc240::microcode::MicroState;
use risc240::snapshot;
use risc240::state::ArchState;

use crate::cli::Cadence;

/// Commands recognized at the prompt, in the order the reference
/// implementation's tab completion lists them.
pub const COMMAND_NAMES: [&str; 15] = [
    "labels", "lsbrk", "quit", "exit", "help", "run", "reset", "step", "save", "ustep", "clear",
    "load", "check", "break", "mem[",
];

const NAMED_REGS: [&str; 5] = ["PC", "SP", "IR", "MAR", "MDR"];
const FLAGS: [&str; 4] = ["Z", "N", "C", "V"];

/// The mutable session state one REPL drives.
pub struct Session {
    pub state: ArchState,
    pub mem: Memory,
    pub breakpoints: Breakpoints,
    pub labels: BTreeMap<String, u16>,
    pub cadence: Cadence,
}

impl Session {
    pub fn new(mem: Memory, cadence: Cadence) -> Self {
        Session {
            state: ArchState::reset(),
            mem,
            breakpoints: Breakpoints::new(),
            labels: BTreeMap::new(),
            cadence,
        }
    }

    fn resolve_breakpoint_target(&self, arg: &str) -> Result<u16, CommandError> {
        if let Some(hex) = arg.strip_prefix('$') {
            u16::from_str_radix(hex, 16)
                .map_err(|_| CommandError::BadArgument(format!("not a hex address: {arg}")))
        } else {
            // Bare tokens are always label lookups, never attempted as hex,
            // even when they happen to look like one.
            self.labels
                .get(&arg.to_uppercase())
                .copied()
                .ok_or_else(|| SimError::UnknownLabel(arg.to_string()).into())
        }
    }
}

/// Result of dispatching one command: text to print, plus whether the
/// session should end.
pub struct Outcome {
    pub output: Vec<String>,
    pub quit: bool,
}

fn ok(output: Vec<String>) -> Result<Outcome, CommandError> {
    Ok(Outcome { output, quit: false })
}

/// True for errors that must end the whole process rather than just being
/// printed and leaving the prompt running: an undefined instruction is the
/// only runtime condition in §7 that is process-fatal.
pub fn is_fatal(err: &CommandError) -> bool {
    matches!(err, CommandError::Sim(SimError::UndefinedInstruction(_)))
}

/// Parses and executes one typed line against `session`.
pub fn dispatch(line: &str, session: &mut Session) -> Result<Outcome, CommandError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ok(vec![]);
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();

    match cmd {
        "quit" | "exit" => Ok(Outcome { output: vec![], quit: true }),
        "help" => ok(vec![help_text()]),
        "reset" => {
            session.state = ArchState::reset();
            ok(vec!["Machine reset.".to_string()])
        }
        "step" => {
            driver::instruction_step(&mut session.state, &mut session.mem)?;
            ok(vec![state_line(session)])
        }
        "ustep" => {
            driver::microstep(&mut session.state, &mut session.mem)?;
            ok(vec![state_line(session)])
        }
        "run" => dispatch_run(rest, session),
        "break" => {
            if rest.is_empty() {
                return Err(CommandError::BadArgument("break requires a target".to_string()));
            }
            let addr = session.resolve_breakpoint_target(rest)?;
            session.breakpoints.set(addr);
            ok(vec![format!("Breakpoint set at {}.", hex4(addr))])
        }
        "clear" => {
            if rest.is_empty() {
                return Err(CommandError::BadArgument("clear requires a target".to_string()));
            }
            if rest == "*" {
                session.breakpoints = Breakpoints::new();
                return ok(vec!["All breakpoints cleared.".to_string()]);
            }
            let addr = session.resolve_breakpoint_target(rest)?;
            session.breakpoints.clear(addr);
            ok(vec![format!("Breakpoint cleared at {}.", hex4(addr))])
        }
        "lsbrk" => {
            let lines = session
                .breakpoints
                .iter()
                .map(|addr| format!("{}", hex4(addr)))
                .collect();
            ok(lines)
        }
        "labels" => {
            let lines = session
                .labels
                .iter()
                .map(|(name, addr)| format!("{name} = {}", hex4(*addr)))
                .collect();
            ok(lines)
        }
        "load" => {
            let text = fs::read_to_string(Path::new(rest)).map_err(|e| SimError::Io {
                path: rest.to_string(),
                source: e,
            })?;
            let snap = snapshot::parse(&text)?;
            let mut bps = session.breakpoints.iter().collect::<Vec<_>>();
            snapshot::load(&snap, &mut session.state, &mut session.mem, &mut bps);
            session.breakpoints = Breakpoints::new();
            for addr in bps {
                session.breakpoints.set(addr);
            }
            ok(vec![format!("Loaded {rest}.")])
        }
        "save" => {
            let breakpoints: Vec<u16> = session.breakpoints.iter().collect();
            let text = snapshot::save(&session.state, &session.mem, &breakpoints);
            fs::write(rest, text)
                .map_err(|e| SimError::Io { path: rest.to_string(), source: e })?;
            ok(vec![format!("Saved {rest}.")])
        }
        "check" => {
            let text = fs::read_to_string(Path::new(rest)).map_err(|e| SimError::Io {
                path: rest.to_string(),
                source: e,
            })?;
            let snap = snapshot::parse(&text)?;
            let diffs = snapshot::check(&snap, &session.state, &session.mem);
            if diffs.is_empty() {
                ok(vec!["No differences found.".to_string()])
            } else {
                ok(diffs.into_iter().map(|d| d.0).collect())
            }
        }
        _ if trimmed == "*?" => ok(vec![state_line(session)]),
        _ if trimmed.eq_ignore_ascii_case("r*?") => ok(register_file_lines(session)),
        _ if cmd.starts_with("mem[") => dispatch_mem(trimmed, session),
        _ if is_register_assignment(trimmed) => dispatch_reg(trimmed, session),
        _ if is_named_register(trimmed) => dispatch_named(trimmed, session),
        _ => Err(CommandError::Unrecognized(trimmed.to_string())),
    }
}

fn is_register_assignment(line: &str) -> bool {
    line.len() >= 2 && line.as_bytes()[0] == b'R' && line.as_bytes()[1].is_ascii_digit()
}

fn dispatch_reg(line: &str, session: &mut Session) -> Result<Outcome, CommandError> {
    let rest = &line[1..]; // drop 'R'
    let digit_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let index: u8 = rest[..digit_end]
        .parse()
        .map_err(|_| CommandError::BadArgument(format!("bad register in {line:?}")))?;
    if index > 7 {
        return Err(CommandError::BadArgument(format!("no such register R{index}")));
    }
    let tail = rest[digit_end..].trim();
    if let Some(value_str) = tail.strip_prefix('=') {
        let value = u16::from_str_radix(value_str.trim(), 16)
            .map_err(|_| CommandError::BadArgument(format!("bad hex value {value_str:?}")))?;
        session.state.set_reg(index, value);
        ok(vec![format!("R{index} = {}", hex4(session.state.reg(index)))])
    } else {
        ok(vec![format!("R{index} = {}", hex4(session.state.reg(index)))])
    }
}

/// Splits a named-register/flag token at its first `=` or `?`, e.g.
/// `"PC=0010"` -> `("PC", "=0010")`, `"Z?"` -> `("Z", "?")`.
fn split_name(line: &str) -> (&str, &str) {
    let idx = line.find(['=', '?']).unwrap_or(line.len());
    (&line[..idx], &line[idx..])
}

fn is_named_register(line: &str) -> bool {
    let (name, _) = split_name(line);
    if name.is_empty() {
        return false;
    }
    let upper = name.to_ascii_uppercase();
    NAMED_REGS.contains(&upper.as_str()) || FLAGS.contains(&upper.as_str())
}

fn set_named_register(st: &mut ArchState, name: &str, value: u16) {
    match name {
        "PC" => st.set_pc(value),
        "SP" => st.sp = value,
        "IR" => st.ir = value,
        "MAR" => st.mar = value,
        "MDR" => st.mdr = value,
        _ => unreachable!("not a named register: {name}"),
    }
}

fn get_named_register(st: &ArchState, name: &str) -> u16 {
    match name {
        "PC" => st.pc,
        "SP" => st.sp,
        "IR" => st.ir,
        "MAR" => st.mar,
        "MDR" => st.mdr,
        _ => unreachable!("not a named register: {name}"),
    }
}

fn set_flag(st: &mut ArchState, name: &str, value: bool) {
    match name {
        "Z" => st.z = value,
        "N" => st.n = value,
        "C" => st.c = value,
        "V" => st.v = value,
        _ => unreachable!("not a flag: {name}"),
    }
}

fn get_flag(st: &ArchState, name: &str) -> bool {
    match name {
        "Z" => st.z,
        "N" => st.n,
        "C" => st.c,
        "V" => st.v,
        _ => unreachable!("not a flag: {name}"),
    }
}

fn dispatch_named(line: &str, session: &mut Session) -> Result<Outcome, CommandError> {
    let (name, tail) = split_name(line);
    let upper = name.to_ascii_uppercase();
    let is_flag = FLAGS.contains(&upper.as_str());

    if let Some(value_str) = tail.strip_prefix('=') {
        if is_flag {
            let bit = match value_str.trim() {
                "0" => false,
                "1" => true,
                other => {
                    return Err(CommandError::BadArgument(format!(
                        "flag {upper} must be 0 or 1, got {other:?}"
                    )));
                }
            };
            set_flag(&mut session.state, &upper, bit);
            return ok(vec![format!("{upper} = {}", u8::from(bit))]);
        }
        let value = u16::from_str_radix(value_str.trim(), 16)
            .map_err(|_| CommandError::BadArgument(format!("bad hex value {value_str:?}")))?;
        set_named_register(&mut session.state, &upper, value);
        return ok(vec![format!("{upper} = {}", hex4(get_named_register(&session.state, &upper)))]);
    }

    if is_flag {
        ok(vec![format!("{upper} = {}", u8::from(get_flag(&session.state, &upper)))])
    } else {
        ok(vec![format!("{upper} = {}", hex4(get_named_register(&session.state, &upper)))])
    }
}

fn register_file_lines(session: &Session) -> Vec<String> {
    session
        .state
        .reg_file()
        .iter()
        .enumerate()
        .map(|(i, v)| format!("R{i} = {}", hex4(*v)))
        .collect()
}

fn parse_hex_addr(s: &str) -> Result<u16, CommandError> {
    u16::from_str_radix(s.trim(), 16).map_err(|_| CommandError::BadArgument(format!("bad address {s:?}")))
}

fn dispatch_mem(line: &str, session: &mut Session) -> Result<Outcome, CommandError> {
    let open = line
        .find('[')
        .ok_or_else(|| CommandError::BadArgument(format!("malformed memory command: {line:?}")))?;
    let close = line[open..]
        .find(']')
        .map(|i| open + i)
        .ok_or_else(|| CommandError::BadArgument(format!("unterminated mem[: {line:?}")))?;
    let inner = &line[open + 1..close];
    let tail = line[close + 1..].trim();

    if let Some((lo_str, hi_str)) = inner.split_once(':') {
        let lo = word_align(parse_hex_addr(lo_str)?);
        let hi = word_align(parse_hex_addr(hi_str)?);
        if hi < lo {
            return Err(CommandError::BadArgument(format!("mem[{lo_str}:{hi_str}]: hi < lo")));
        }
        let mut lines = Vec::new();
        let mut addr = lo;
        loop {
            lines.push(format!("Mem[{}] = {}", hex4(addr), hex4(session.mem.read(addr))));
            if addr >= hi {
                break;
            }
            addr = addr.wrapping_add(2);
        }
        return ok(lines);
    }

    let addr = word_align(parse_hex_addr(inner)?);
    if let Some(value_str) = tail.strip_prefix('=') {
        let value = u16::from_str_radix(value_str.trim(), 16)
            .map_err(|_| CommandError::BadArgument(format!("bad hex value {value_str:?}")))?;
        session.mem.write(addr, value);
        ok(vec![format!("Mem[{}] = {}", hex4(addr), hex4(session.mem.read(addr)))])
    } else {
        ok(vec![format!("Mem[{}] = {}", hex4(addr), hex4(session.mem.read(addr)))])
    }
}

/// Parses `run`'s trailing `[n][q|i|u]` argument. `n` and the cadence
/// letter may be space-separated (`"10 q"`) or run together (`"10q"`);
/// either may be omitted.
fn parse_run_args(rest: &str) -> Result<(Option<u64>, Option<Cadence>), CommandError> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Ok((None, None));
    }

    let mut tokens = rest.split_whitespace();
    let first = tokens.next().unwrap();
    let second = tokens.next();
    if let Some(extra) = tokens.next() {
        return Err(CommandError::BadArgument(format!("unexpected run argument {extra:?}")));
    }

    let (count_tok, cadence_tok): (Option<&str>, Option<&str>) = match second {
        Some(c) => (Some(first), Some(c)),
        None => {
            if matches!(first, "q" | "i" | "u") {
                (None, Some(first))
            } else if let Some(digits) = first.strip_suffix(['q', 'i', 'u']) {
                (Some(digits), Some(&first[digits.len()..]))
            } else {
                (Some(first), None)
            }
        }
    };

    let count = match count_tok {
        Some(tok) => Some(
            tok.parse::<u64>()
                .map_err(|_| CommandError::BadArgument(format!("bad instruction count {tok:?}")))?,
        ),
        None => None,
    };
    let cadence = match cadence_tok {
        Some("q") => Some(Cadence::Quiet),
        Some("i") => Some(Cadence::Instruction),
        Some("u") => Some(Cadence::Micro),
        Some(other) => return Err(CommandError::BadArgument(format!("bad run cadence {other:?}"))),
        None => None,
    };
    Ok((count, cadence))
}

fn run_with_cadence(
    session: &mut Session,
    max_instructions: Option<u64>,
    cadence: Cadence,
    output: &mut Vec<String>,
) -> Result<StopReason, CommandError> {
    let mut executed: u64 = 0;
    loop {
        driver::microstep(&mut session.state, &mut session.mem)?;
        if cadence == Cadence::Micro {
            output.push(state_line(session));
        }
        while !matches!(session.state.ustate, MicroState::Fetch | MicroState::Stop1) {
            driver::microstep(&mut session.state, &mut session.mem)?;
            if cadence == Cadence::Micro {
                output.push(state_line(session));
            }
        }
        if session.state.ustate == MicroState::Stop1 {
            return Ok(StopReason::Halted);
        }
        executed += 1;
        if cadence == Cadence::Instruction {
            output.push(state_line(session));
        }
        if session.breakpoints.contains(session.state.pc) {
            return Ok(StopReason::Breakpoint);
        }
        if let Some(limit) = max_instructions {
            if executed >= limit {
                return Ok(StopReason::InstructionLimitReached);
            }
        }
    }
}

fn dispatch_run(rest: &str, session: &mut Session) -> Result<Outcome, CommandError> {
    let (count, cadence_override) = parse_run_args(rest)?;
    let cadence = cadence_override.unwrap_or(session.cadence);
    let mut output = Vec::new();
    let reason = run_with_cadence(session, count, cadence, &mut output)?;
    let message = match reason {
        StopReason::Breakpoint => "Stopped at breakpoint.".to_string(),
        StopReason::Halted => "Machine halted.".to_string(),
        StopReason::InstructionLimitReached => "Instruction limit reached.".to_string(),
    };
    output.push(message);
    ok(output)
}

/// One line in the `Cycle STATE PC IR ZNCV MAR MDR R0..R7` column format.
fn state_line(session: &Session) -> String {
    let st = &session.state;
    let mut line = format!(
        "{:04} {:<6} {} {} {} {} {}",
        st.cycle,
        st.ustate.name(),
        hex4(st.pc),
        hex4(st.ir),
        st.flags_digits(),
        hex4(st.mar),
        hex4(st.mdr),
    );
    for r in st.reg_file() {
        line.push(' ');
        line.push_str(&risc240::bits::hex4_lower(r));
    }
    line
}

fn help_text() -> String {
    [
        "quit, exit       - leave the simulator",
        "help             - show this text",
        "reset            - reset architectural state (memory unchanged)",
        "step             - run one instruction",
        "ustep            - run one microcycle",
        "run [n][q|i|u]   - run up to n instructions, with an optional cadence override",
        "break <t>        - set a breakpoint at a label or $hex address",
        "clear <t>        - clear a breakpoint; clear * clears all",
        "lsbrk            - list breakpoints",
        "labels           - list known labels",
        "load <file>      - load a snapshot",
        "save <file>      - save a snapshot",
        "check <file>     - diff current state against a snapshot",
        "Rn               - show register n",
        "Rn=hex           - set register n",
        "R*?              - show the whole register file",
        "*?               - show full machine state",
        "PC/SP/IR/MAR/MDR - named architectural registers, settable with =hex",
        "Z/N/C/V          - flags, settable with =0 or =1",
        "mem[addr]        - show a memory cell",
        "mem[addr]=hex    - set a memory cell",
        "mem[lo:hi]       - show a memory range, word-aligned and inclusive",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(Memory::new(false), Cadence::Quiet)
    }

    #[test]
    fn quit_and_exit_both_end_the_session() {
        let mut s = session();
        assert!(dispatch("quit", &mut s).unwrap().quit);
        assert!(dispatch("exit", &mut s).unwrap().quit);
    }

    #[test]
    fn set_and_get_register() {
        let mut s = session();
        dispatch("R3=00FF", &mut s).unwrap();
        let out = dispatch("R3", &mut s).unwrap();
        assert_eq!(out.output, vec!["R3 = 00FF".to_string()]);
    }

    #[test]
    fn register_zero_write_is_silently_ignored() {
        let mut s = session();
        dispatch("R0=BEEF", &mut s).unwrap();
        let out = dispatch("R0", &mut s).unwrap();
        assert_eq!(out.output, vec!["R0 = 0000".to_string()]);
    }

    #[test]
    fn set_and_get_memory_cell() {
        let mut s = session();
        dispatch("mem[0010]=ABCD", &mut s).unwrap();
        let out = dispatch("mem[0010]", &mut s).unwrap();
        assert_eq!(out.output, vec!["Mem[0010] = ABCD".to_string()]);
    }

    #[test]
    fn mem_range_query_prints_every_word_aligned_cell_inclusive() {
        let mut s = session();
        dispatch("mem[0010]=0001", &mut s).unwrap();
        dispatch("mem[0012]=0002", &mut s).unwrap();
        let out = dispatch("mem[0010:0012]", &mut s).unwrap();
        assert_eq!(
            out.output,
            vec!["Mem[0010] = 0001".to_string(), "Mem[0012] = 0002".to_string()]
        );
    }

    #[test]
    fn mem_range_with_hi_below_lo_is_rejected() {
        let mut s = session();
        let err = dispatch("mem[0020:0010]", &mut s).unwrap_err();
        assert!(matches!(err, CommandError::BadArgument(_)));
    }

    #[test]
    fn named_register_set_and_query() {
        let mut s = session();
        dispatch("PC=0100", &mut s).unwrap();
        let out = dispatch("PC?", &mut s).unwrap();
        assert_eq!(out.output, vec!["PC = 0100".to_string()]);
    }

    #[test]
    fn named_register_set_word_aligns_pc() {
        let mut s = session();
        dispatch("PC=0101", &mut s).unwrap();
        assert_eq!(s.state.pc, 0x0100);
    }

    #[test]
    fn flag_set_and_query() {
        let mut s = session();
        dispatch("Z=1", &mut s).unwrap();
        let out = dispatch("Z?", &mut s).unwrap();
        assert_eq!(out.output, vec!["Z = 1".to_string()]);
    }

    #[test]
    fn flag_set_rejects_non_bit_value() {
        let mut s = session();
        let err = dispatch("N=2", &mut s).unwrap_err();
        assert!(matches!(err, CommandError::BadArgument(_)));
    }

    #[test]
    fn star_query_prints_full_state_line() {
        let mut s = session();
        let out = dispatch("*?", &mut s).unwrap();
        assert_eq!(out.output.len(), 1);
        assert!(out.output[0].starts_with("0000 FETCH"));
    }

    #[test]
    fn register_star_query_prints_all_eight_registers() {
        let mut s = session();
        dispatch("R3=00FF", &mut s).unwrap();
        let out = dispatch("R*?", &mut s).unwrap();
        assert_eq!(out.output.len(), 8);
        assert_eq!(out.output[3], "R3 = 00FF".to_string());
    }

    #[test]
    fn clear_star_clears_every_breakpoint() {
        let mut s = session();
        dispatch("break $0010", &mut s).unwrap();
        dispatch("break $0020", &mut s).unwrap();
        dispatch("clear *", &mut s).unwrap();
        assert!(s.breakpoints.iter().next().is_none());
    }

    #[test]
    fn break_on_bare_token_is_always_a_label_lookup() {
        let mut s = session();
        s.labels.insert("LOOP".to_string(), 0x0020);
        let out = dispatch("break LOOP", &mut s).unwrap();
        assert_eq!(out.output, vec!["Breakpoint set at 0020.".to_string()]);
        assert!(s.breakpoints.contains(0x0020));
    }

    #[test]
    fn break_on_bare_token_never_falls_back_to_hex() {
        let mut s = session();
        // "0010" looks like hex but must be treated as an (unknown) label.
        let err = dispatch("break 0010", &mut s).unwrap_err();
        assert!(matches!(err, CommandError::Sim(SimError::UnknownLabel(_))));
    }

    #[test]
    fn dollar_prefix_forces_hex_address() {
        let mut s = session();
        let out = dispatch("break $0010", &mut s).unwrap();
        assert_eq!(out.output, vec!["Breakpoint set at 0010.".to_string()]);
    }

    #[test]
    fn unrecognized_command_is_an_error() {
        let mut s = session();
        let err = dispatch("frobnicate", &mut s).unwrap_err();
        assert!(matches!(err, CommandError::Unrecognized(_)));
    }

    #[test]
    fn empty_line_is_a_no_op() {
        let mut s = session();
        let out = dispatch("   ", &mut s).unwrap();
        assert!(out.output.is_empty());
        assert!(!out.quit);
    }

    #[test]
    fn run_with_instruction_count_stops_after_n_instructions() {
        let mut s = session();
        for addr in (0..20).step_by(2) {
            s.mem.write(addr, 0x0000); // ADD R0,R0,R0
        }
        let out = dispatch("run 3", &mut s).unwrap();
        assert_eq!(s.state.pc, 0x0006);
        assert!(out.output.last().unwrap().contains("Instruction limit"));
    }

    #[test]
    fn run_cadence_letter_without_count_is_accepted() {
        let mut s = session();
        s.mem.write(0x0000, (MicroState::Stop.opcode7() as u16) << 9);
        let out = dispatch("run q", &mut s).unwrap();
        // Quiet cadence: only the final status line, no per-step lines.
        assert_eq!(out.output.len(), 1);
        assert!(out.output[0].contains("halted"));
    }

    #[test]
    fn run_reports_a_fatal_error_on_an_undefined_opcode() {
        let mut s = session();
        s.mem.write(0x0000, 0b000_0001u16 << 9); // unassigned opcode7
        let err = dispatch("run", &mut s).unwrap_err();
        assert!(is_fatal(&err));
    }
}
