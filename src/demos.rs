//! Small example phase graphs for the `pyke` binary.
//!
//! This crate has no dynamic scripting runtime to load a user's make file
//! (see §4.9's note on that scope), so the binary needs *some* graph to
//! drive. These builders stand in for a loaded make file until one is
//! wired up by an embedding program: call [`single_exe`] or
//! [`exe_with_archive`] to get a ready-to-drive [`Graph`], or build your
//! own with [`crate::phases`] and [`crate::phase::Graph`] directly.

use crate::phase::{Graph, Phase, PhaseId};
use crate::phases::{archive_defaults, compile_and_link_to_exe_defaults, compile_defaults, ArchiveBehavior, CompileBehavior, CompileAndLinkToExeBehavior};
use crate::value::{OptionOp, Value};

/// One phase: compiles every `*.c`/`*.cpp` under `src/` and links them
/// directly into `exe_basename`.
pub fn single_exe(name: &str, exe_basename: &str) -> (Graph, PhaseId) {
    let mut graph = Graph::new();
    let opts = compile_and_link_to_exe_defaults(name, "release", exe_basename);
    let id = graph.add_phase(Phase::new(opts, Box::new(CompileAndLinkToExeBehavior)));
    (graph, id)
}

/// Three phases: a `Compile` phase for a support library's sources, an
/// `Archive` phase that bundles its objects, and a `CompileAndLinkToExe`
/// phase for the main sources that depends on the archive and links
/// against it via auto-derived `-L`/`-l`.
pub fn exe_with_archive(name: &str, lib_name: &str, archive_basename: &str, exe_basename: &str) -> (Graph, PhaseId) {
    let mut graph = Graph::new();

    let mut lib_opts = compile_defaults(lib_name, "release");
    lib_opts.push("src_dir", OptionOp::Replace, Value::Str(format!("src/{lib_name}")));
    let compile_id = graph.add_phase(Phase::new(lib_opts, Box::new(CompileBehavior)));

    let archive_opts = archive_defaults(&format!("{lib_name}_archive"), "release", archive_basename);
    let archive_id = graph.add_phase(Phase::new(archive_opts, Box::new(ArchiveBehavior)));
    graph.add_dependency(archive_id, compile_id).expect("fresh graph, no cycle possible");

    let exe_opts = compile_and_link_to_exe_defaults(name, "release", exe_basename);
    let exe_id = graph.add_phase(Phase::new(exe_opts, Box::new(CompileAndLinkToExeBehavior)));
    graph.add_dependency(exe_id, archive_id).expect("fresh graph, no cycle possible");

    (graph, exe_id)
}
