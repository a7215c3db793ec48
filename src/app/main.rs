//! `risc240`: load a listing, then either drive it interactively or run it
//! to completion per the command-line flags.

mod cli;
mod prompt;
mod transcript;

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use clap::Parser;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};

use cli::Cli;
use prompt::{Outcome, Session, COMMAND_NAMES};
use risc240::listing;
use risc240::memory::Memory;
use risc240::snapshot;

struct CommandCompleter;

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let prefix = &line[..pos];
        let matches = COMMAND_NAMES
            .iter()
            .filter(|name| name.starts_with(prefix))
            .map(|name| Pair { display: name.to_string(), replacement: name.to_string() })
            .collect();
        Ok((0, matches))
    }
}

impl Hinter for CommandCompleter {
    type Hint = String;
}
impl Highlighter for CommandCompleter {}
impl Validator for CommandCompleter {}
impl Helper for CommandCompleter {}

fn load_listing_text(path: Option<&Path>, from_stdin: bool) -> io::Result<String> {
    if from_stdin || path.is_none() {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        fs::read_to_string(path.expect("checked above"))
    }
}

fn build_session(cli: &Cli) -> Result<Session, String> {
    let raw = load_listing_text(cli.listing.as_deref(), cli.stdin).map_err(|e| e.to_string())?;
    let body = listing::strip_header(&raw);
    let parsed = listing::parse(body).map_err(|e| e.to_string())?;

    let mut mem = Memory::new(!cli.no_random);
    for (addr, value) in &parsed.words {
        mem.preload(*addr, *value);
    }

    let mut session = Session::new(mem, cli.cadence());
    session.labels = parsed.labels;
    Ok(session)
}

fn print_outcome(out: &Outcome, log: &mut transcript::Transcript) {
    for line in &out.output {
        println!("{line}");
        log.record(line.clone());
    }
}

/// Runs to completion (or until a breakpoint or an undefined instruction)
/// via the `run` command, reporting a fatal error as a nonzero exit code
/// instead of letting it propagate past this boundary.
fn run_to_completion(session: &mut Session, log: &mut transcript::Transcript) -> i32 {
    match prompt::dispatch("run", session) {
        Ok(out) => {
            print_outcome(&out, log);
            0
        }
        Err(e) => {
            log::error!("{e}");
            eprintln!("{e}");
            1
        }
    }
}

fn grade(session: &Session, golden: &Path) -> i32 {
    let text = match fs::read_to_string(golden) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error reading {}: {e}", golden.display());
            return 1;
        }
    };
    let snap = match snapshot::parse(&text) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error parsing {}: {e}", golden.display());
            return 1;
        }
    };
    let diffs = snapshot::check(&snap, &session.state, &session.mem);
    if diffs.is_empty() {
        println!("No differences found.");
        0
    } else {
        for d in &diffs {
            println!("{}", d.0);
        }
        1
    }
}

fn run_golden(session: &mut Session, golden: &Path, log: &mut transcript::Transcript) -> i32 {
    let code = run_to_completion(session, log);
    if code != 0 {
        return code;
    }
    grade(session, golden)
}

/// Executes a sim-script file line-by-line as if typed at the prompt.
/// Returns `Some(code)` when the script ends the session early (an
/// explicit `quit` or a fatal error); `None` when the whole file ran
/// without ending the session, so the caller should proceed to whatever
/// mode (`-g`, `-r`, interactive) the remaining flags select.
fn run_sim_script(
    session: &mut Session,
    path: &Path,
    log: &mut transcript::Transcript,
    echo: bool,
) -> Option<i32> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error reading {}: {e}", path.display());
            return Some(1);
        }
    };
    for line in text.lines() {
        if echo {
            log.record(format!("> {line}"));
        }
        match prompt::dispatch(line, session) {
            Ok(out) => {
                print_outcome(&out, log);
                if out.quit {
                    return Some(0);
                }
            }
            Err(e) => {
                log::error!("{e}");
                eprintln!("{e}");
                if prompt::is_fatal(&e) {
                    return Some(1);
                }
            }
        }
    }
    None
}

fn run_interactive(session: &mut Session, log: &mut transcript::Transcript) -> i32 {
    let mut rl: Editor<CommandCompleter, rustyline::history::DefaultHistory> =
        Editor::new().expect("terminal line editor failed to initialize");
    rl.set_helper(Some(CommandCompleter));

    loop {
        match rl.readline("risc240> ") {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                match prompt::dispatch(&line, session) {
                    Ok(out) => {
                        let quit = out.quit;
                        print_outcome(&out, log);
                        if quit {
                            return 0;
                        }
                    }
                    Err(e) => {
                        eprintln!("{e}");
                        if prompt::is_fatal(&e) {
                            return 1;
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("\nUnexpected input, did you forget to quit?");
                return 0;
            }
            Err(ReadlineError::Eof) => return 0,
            Err(e) => {
                eprintln!("readline error: {e}");
                return 1;
            }
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if cli.version {
        println!("risc240 {}", env!("CARGO_PKG_VERSION"));
        std::process::exit(0);
    }

    if let Err(message) = cli::validate(&cli) {
        eprintln!("{message}");
        std::process::exit(1);
    }

    let mut session = match build_session(&cli) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let mut log = transcript::Transcript::new();

    let early = cli
        .sim_script
        .as_deref()
        .and_then(|script| run_sim_script(&mut session, script, &mut log, cli.golden.is_none()));

    let exit_code = if let Some(code) = early {
        code
    } else if let Some(golden) = cli.golden.clone() {
        if cli.sim_script.is_some() {
            grade(&session, &golden)
        } else {
            run_golden(&mut session, &golden, &mut log)
        }
    } else if cli.run {
        run_to_completion(&mut session, &mut log)
    } else if cli.sim_script.is_some() {
        0
    } else {
        run_interactive(&mut session, &mut log)
    };

    if let Some(path) = &cli.transcript {
        if let Err(e) = log.save(path) {
            eprintln!("error writing transcript {}: {e}", path.display());
        }
    }

    std::process::exit(exit_code);
}
