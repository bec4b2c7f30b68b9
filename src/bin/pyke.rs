//! The `pyke` CLI: parses the ordered argument tokens, resolves aliases
//! from the loaded [`Config`], and drives the action driver against a
//! phase graph.
//!
//! Grounded on `pyke.py`'s `main()`. This crate has no embedded scripting
//! runtime to load an arbitrary make file (see `-m` below), so `-m` selects
//! one of the small example graphs in [`pyke::demos`] by name instead of an
//! arbitrary user script; an embedding binary that links this crate as a
//! library can build and drive any graph it likes via [`pyke::phase::Graph`]
//! directly.

use std::process::ExitCode;

use pyke::config::Config;
use pyke::demos;
use pyke::options::grammar::parse_value;
use pyke::phase::{Graph, PhaseId};
use pyke::reporter::{ColorTier, Reporter};
use pyke::value::OptionOp;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const USAGE: &str = "\
pyke: a programmable, multi-phase build orchestrator for C/C++ projects

USAGE:
    pyke [-v|-h] [-m <graph>] [-c <path>] [-p <phase>] [-o <k>[:<v>]]... [action]...

FLAGS:
    -v, --version          print version and exit
    -h, --help             print this message and exit
    -m, --module <graph>   select the demo graph to drive: \"single_exe\" or \"exe_with_archive\"
    -c, --cache-dir <path> override the cache/output directory (gen_anchor) on the active phase
    -p, --phase <name>     select the active phase by name
    -o, --override <k[:v]> push (or, with no value, pop) an override on the active phase

Bare words are actions run in order against the active phase (e.g. \"build\", \"clean\").

EXAMPLES:
    pyke build
    pyke -o kind:debug -o verbosity:2 clean build
    pyke -m exe_with_archive -p demo build
    pyke build run
    pyke -p demo report
";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    run(args)
}

fn run(args: Vec<String>) -> ExitCode {
    if let Some(first) = args.first() {
        if first == "-v" || first == "--version" {
            println!("pyke {VERSION}");
            return ExitCode::SUCCESS;
        }
        if first == "-h" || first == "--help" {
            print!("{USAGE}");
            return ExitCode::SUCCESS;
        }
    }

    let mut config = Config::new();
    if let Err(e) = config.load_default() {
        eprintln!("warning: embedded default config: {e}");
    }
    if let Err(e) = config.load_from_home() {
        eprintln!("warning: loading ~/.config/pyke/pyke-config.json: {e}");
    }

    let mut idx = 0;
    let mut module_name = "single_exe".to_string();
    if idx < args.len() {
        if let Some(rest) = parse_flag(&args[idx], "-m", "--module") {
            module_name = match rest {
                Some(name) => name,
                None => {
                    idx += 1;
                    args.get(idx).cloned().unwrap_or_default()
                }
            };
            idx += 1;
        }
    }

    if let Some(make_dir) = std::env::current_dir().ok() {
        if let Err(e) = config.load_from_makefile_dir(&make_dir) {
            eprintln!("warning: loading ./pyke-config.json: {e}");
        }
    }

    let (mut graph, root) = match build_module(&module_name) {
        Some(g) => g,
        None => {
            eprintln!("pyke: no such module \"{module_name}\" (expected \"single_exe\" or \"exe_with_archive\")");
            return ExitCode::from(1);
        }
    };

    let mut active_phase = root;
    let tier = ColorTier::detect(&std::io::stdout());
    let mut any_failed = false;

    let mut raw_remaining: Vec<String> = args[idx..].to_vec();
    if raw_remaining.is_empty() && !config.default_arguments.is_empty() {
        raw_remaining = config.default_arguments.clone();
    } else if raw_remaining.is_empty() && !config.default_action.is_empty() {
        raw_remaining = vec![config.default_action.clone()];
    }

    // Every raw token (flag or bare word alike) is first run through
    // argument-alias expansion, e.g. "-r" -> ["-o", "kind:release"], giving
    // one flat token stream to walk with a single cursor.
    let tokens: Vec<String> = raw_remaining.iter().flat_map(|t| config.expand_argument_alias(t)).collect();

    let mut i = 0;
    while i < tokens.len() {
        let arg = &tokens[i];
        if let Some(rest) = parse_flag(arg, "-p", "--phase") {
            let phase_name = match rest {
                Some(name) => name,
                None => {
                    i += 1;
                    match tokens.get(i) {
                        Some(n) => n.clone(),
                        None => {
                            eprintln!("pyke: -p requires a phase name");
                            return ExitCode::from(1);
                        }
                    }
                }
            };
            match graph.find_by_name(&phase_name) {
                Some(id) => active_phase = id,
                None => {
                    eprintln!("pyke: no phase named {phase_name:?}");
                    return ExitCode::from(1);
                }
            }
        } else if let Some(rest) = parse_flag(arg, "-c", "--cache-dir") {
            let path = match rest {
                Some(p) => p,
                None => {
                    i += 1;
                    match tokens.get(i) {
                        Some(p) => p.clone(),
                        None => {
                            eprintln!("pyke: -c requires a path");
                            return ExitCode::from(1);
                        }
                    }
                }
            };
            graph.push_overrides(active_phase, &[("gen_anchor".to_string(), OptionOp::Replace, pyke::value::Value::Str(path))]);
        } else if let Some(rest) = parse_flag(arg, "-o", "--override") {
            let override_str = match rest {
                Some(o) => o,
                None => {
                    i += 1;
                    match tokens.get(i) {
                        Some(o) => o.clone(),
                        None => {
                            eprintln!("pyke: -o requires a key[:value]");
                            return ExitCode::from(1);
                        }
                    }
                }
            };
            if let Err(code) = apply_override(&graph, active_phase, &override_str) {
                return code;
            }
        } else {
            for action in config.expand_action_alias(arg) {
                let reporter = Reporter::new(tier, graph.phase(active_phase).options().opt_int("verbosity").unwrap_or(0));
                let full_name = graph.phase(active_phase).name();
                let phase_type = graph.phase(active_phase).behavior_name();
                reporter.report_action_phase_start(&action, &phase_type, &full_name);
                let result = graph.do_action(active_phase, &action);
                for step in &result.results {
                    reporter.report_step_start(&step.step_name, &[step.step_input.as_str()], &[step.step_output.as_str()]);
                    reporter.report_step_end(&step.shell_cmd, step.succeeded(), step.code.name(), step.info.as_deref());
                }
                reporter.report_action_phase_end(result.succeeded());
                if !result.succeeded() {
                    any_failed = true;
                }
            }
        }
        i += 1;
    }

    if any_failed {
        ExitCode::from(255)
    } else {
        ExitCode::SUCCESS
    }
}

fn build_module(name: &str) -> Option<(Graph, PhaseId)> {
    match name {
        "single_exe" => Some(demos::single_exe("demo", "demo")),
        "exe_with_archive" => Some(demos::exe_with_archive("demo", "support", "support", "demo")),
        _ => None,
    }
}

/// Returns `Some(Some(value))` when `arg` is `-xvalue`/`--long=value` (or a
/// bare `-x`/`--long` with the value pending on the next token, `Some(None)`),
/// or `None` if `arg` doesn't match either flag spelling at all.
fn parse_flag(arg: &str, short: &str, long: &str) -> Option<Option<String>> {
    if arg == short || arg == long {
        return Some(None);
    }
    if let Some(rest) = arg.strip_prefix(short) {
        if !rest.is_empty() {
            return Some(Some(rest.to_string()));
        }
    }
    None
}

fn apply_override(graph: &Graph, active_phase: PhaseId, override_str: &str) -> Result<(), ExitCode> {
    let (key, value) = match override_str.split_once(':') {
        Some(parts) => parts,
        None => (override_str, ""),
    };
    if value.is_empty() {
        graph.pop_overrides(active_phase, &[key.to_string()]);
        return Ok(());
    }
    match parse_value(value) {
        Ok(v) => {
            graph.push_overrides(active_phase, &[(key.to_string(), OptionOp::Replace, v)]);
            Ok(())
        }
        Err(e) => {
            eprintln!("pyke: invalid override value {value:?}: {e}");
            Err(ExitCode::from(1))
        }
    }
}

