//! A programmable, multi-phase build orchestrator for C/C++-family
//! projects.
//!
//! A build is authored as a directed acyclic graph of *phases* —
//! declarative nodes that consume input artifacts and produce output
//! artifacts. The engine resolves the graph, interpolates each phase's
//! layered configuration, computes incremental file operations, and
//! dispatches shell-level toolchain invocations (compile, archive, link,
//! softlink) in dependency order, skipping work that's already up to date.
//!
//! # Architecture
//!
//! ```text
//! options      - layered, typed, interpolated per-phase configuration
//! phase        - the dependency graph, action dispatch, override propagation
//! plan         - the file-operation manifest a phase publishes for its action
//! step         - freshness testing and shell dispatch for one file operation
//! toolkit      - gcc/clang command-line construction
//! phases       - the concrete C-family phases and the external-repo fetcher
//! reporter     - ANSI-colored, verbosity-gated progress output
//! config       - layered pyke-config.json loading
//! preflight    - host toolchain presence checks
//! demos        - small example phase graphs for the `pyke` binary
//! ```
//!
//! # Example
//!
//! ```rust
//! use pyke::phase::{Graph, Phase};
//! use pyke::phases::{compile_and_link_to_exe_defaults, CompileAndLinkToExeBehavior};
//!
//! let opts = compile_and_link_to_exe_defaults("demo", "release", "demo");
//! let mut graph = Graph::new();
//! let id = graph.add_phase(Phase::new(opts, Box::new(CompileAndLinkToExeBehavior)));
//! let result = graph.do_action(id, "clean");
//! assert!(result.succeeded());
//! ```

pub mod config;
pub mod demos;
pub mod errors;
pub mod options;
pub mod phase;
pub mod phases;
pub mod plan;
pub mod preflight;
pub mod reporter;
pub mod step;
pub mod toolkit;
pub mod value;

pub use errors::{Error, Result};
pub use options::Options;
pub use phase::{Graph, Phase, PhaseBehavior, PhaseId};
pub use plan::{FileData, FileKind, FileOperation, OpKind, Plan};
pub use step::{ActionResult, ResultCode, StepResult};
pub use value::{OptionOp, Value};
