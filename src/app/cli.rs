//! Command-line flags for the `risc240` binary.

use std::path::PathBuf;

use clap::Parser;

/// RISC240 instruction-set simulator.
#[derive(Debug, Parser)]
#[command(name = "risc240", about = "Cycle-accurate RISC240 simulator", disable_version_flag = true)]
pub struct Cli {
    /// Listing file to load. Reads from stdin instead when `-i` is given.
    pub listing: Option<PathBuf>,

    /// Optional sim-script file, read line-by-line as if typed at the
    /// prompt, echoed to the transcript unless `-g` is active.
    pub sim_script: Option<PathBuf>,

    /// Print the simulator version and exit.
    #[arg(short = 'v', long = "version")]
    pub version: bool,

    /// Run to completion immediately instead of entering the prompt.
    #[arg(short = 'r', long = "run")]
    pub run: bool,

    /// Boot memory to all zeros instead of randomized garbage.
    #[arg(short = 'n', long = "norandom")]
    pub no_random: bool,

    /// Save a transcript of the session to this file.
    #[arg(short = 't', long = "transcript")]
    pub transcript: Option<PathBuf>,

    /// Suppress per-cycle and per-instruction state printing.
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Reference snapshot: run to completion, check against it, then exit.
    #[arg(short = 'g', long = "grade")]
    pub golden: Option<PathBuf>,

    /// Read the listing from standard input instead of a file. Requires
    /// `-r` or `-g`.
    #[arg(short = 'i')]
    pub stdin: bool,
}

/// Validates the flag combinations the reference CLI enforces at startup.
pub fn validate(cli: &Cli) -> Result<(), String> {
    if cli.stdin && !cli.run && cli.golden.is_none() {
        return Err("Must use -r or -g flag when reading the listing from stdin!".to_string());
    }
    Ok(())
}

/// The step-printing cadence implied by the flags: `-g` and `-q` both force
/// quiet, and their absence is the default per-instruction cadence. Per-run
/// cadence overrides (`run [n][q|i|u]`) are layered on top of this default
/// at the prompt, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Quiet,
    Instruction,
    Micro,
}

impl Cli {
    pub fn cadence(&self) -> Cadence {
        if self.quiet || self.golden.is_some() {
            Cadence::Quiet
        } else {
            Cadence::Instruction
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Cli {
        Cli {
            listing: None,
            sim_script: None,
            version: false,
            run: false,
            no_random: false,
            transcript: None,
            quiet: false,
            golden: None,
            stdin: false,
        }
    }

    #[test]
    fn stdin_without_run_or_golden_is_rejected() {
        let cli = Cli { stdin: true, ..base() };
        assert!(validate(&cli).is_err());
    }

    #[test]
    fn stdin_with_run_is_accepted() {
        let cli = Cli { stdin: true, run: true, ..base() };
        assert!(validate(&cli).is_ok());
    }

    #[test]
    fn golden_and_quiet_both_force_quiet_cadence() {
        let cli = Cli { golden: Some("ref.snap".into()), ..base() };
        assert_eq!(cli.cadence(), Cadence::Quiet);
        let cli = Cli { quiet: true, ..base() };
        assert_eq!(cli.cadence(), Cadence::Quiet);
    }
}
