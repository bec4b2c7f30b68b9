//! The `Archive` phase: bundles its dependencies' published objects (plus
//! any prebuilt objects it declares directly) into a static library with
//! `ar cr`. Compiles nothing of its own — see
//! [`crate::phases::compound::CompileAndArchiveBehavior`] for the
//! single-phase compile-and-archive variant.
//!
//! Grounded on `ArchivePhase.compute_file_operations`/`do_action_build`.

use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::options::Options;
use crate::phase::{PhaseBehavior, PhaseId};
use crate::plan::{FileData, FileKind, FileOperation, OpKind, Plan};
use crate::step::{run_shell_step, ResultCode, StepResult};
use crate::value::Value;

use super::common;

#[derive(Debug, Clone, Default)]
pub struct ArchiveBehavior;

/// Builds a fresh `Archive` phase's default options. `archive_basename`
/// names the library (`lib<archive_basename>.a` on POSIX); `kind` selects
/// the debug/release flag table.
pub fn archive_defaults(name: &str, kind: &str, archive_basename: &str) -> Options {
    let mut opts = common::c_family_defaults(name, kind);
    opts.set_default("archive_basename", Value::Str(archive_basename.to_string()));
    opts
}

pub(super) fn archive_path(options: &Options) -> Result<PathBuf> {
    let anchor = options.opt_str("archive_anchor")?;
    let basename = options.opt_str("archive_basename")?;
    Ok(PathBuf::from(format!("{anchor}/lib{basename}.a")))
}

/// Shared by this phase and the `CompileAndArchive` compound phase: emits
/// the mkdir + `ar cr` steps and the `archive` file operation for a fixed
/// set of `objects`.
pub(super) fn archive_objects(
    id: PhaseId,
    options: &Options,
    objects: Vec<FileData>,
    plan: &mut Plan,
    results: &mut Vec<StepResult>,
) -> Result<()> {
    let archive = archive_path(options)?;
    let archive_dir = archive.parent().unwrap_or(Path::new(".")).to_path_buf();
    let simulate = options.opt_bool("simulate").unwrap_or(false);

    plan.push(FileOperation {
        inputs: vec![],
        outputs: vec![FileData::generated(archive_dir.clone(), FileKind::Dir, id)],
        op: OpKind::CreateDirectory,
    });
    results.push(run_shell_step(
        "creating",
        &[] as &[&Path],
        &[&archive_dir],
        &format!("mkdir -p {}", archive_dir.display()),
        simulate,
    ));

    let object_paths: Vec<&Path> = objects.iter().map(|o| o.path.as_path()).collect();
    let objs_cmd = object_paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(" ");
    let shell_cmd = format!("ar cr {} {objs_cmd}", archive.display());
    results.push(run_shell_step("archiving", &object_paths, &[&archive], &shell_cmd, simulate));

    plan.push(FileOperation {
        inputs: objects,
        outputs: vec![FileData::generated(archive, FileKind::Archive, id)],
        op: OpKind::Archive,
    });
    Ok(())
}

impl PhaseBehavior for ArchiveBehavior {
    fn perform(&self, id: PhaseId, action: &str, options: &Options, dep_plans: &[&Plan]) -> Result<(Plan, Vec<StepResult>)> {
        let mut plan = Plan::new();
        match action {
            "build" => {
                let objects = common::gather_object_inputs(options, dep_plans)?;
                let mut results = Vec::new();
                archive_objects(id, options, objects, &mut plan, &mut results)?;
                Ok((plan, results))
            }
            "clean" => {
                let archive = archive_path(options)?;
                Ok((plan, vec![common::delete_file_step("deleting", &archive)]))
            }
            _ => Ok((plan, vec![StepResult::new("archive", "", "", "").with_code(ResultCode::NoAction, None)])),
        }
    }

    fn clone_behavior(&self) -> Box<dyn PhaseBehavior> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::{Graph, Phase};
    use crate::phases::compile::{compile_defaults, CompileBehavior};
    use tempfile::TempDir;

    #[test]
    fn archives_dependency_objects() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.c"), "int a(){return 1;}").unwrap();
        std::fs::write(dir.path().join("src/b.c"), "int b(){return 2;}").unwrap();

        let mut compile_opts = compile_defaults("objs", "release");
        compile_opts.push("project_anchor", crate::value::OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        compile_opts.push("gen_anchor", crate::value::OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        compile_opts.push("sources", crate::value::OptionOp::Replace, Value::List(vec![Value::Str("a.c".into()), Value::Str("b.c".into())]));
        compile_opts.push("simulate", crate::value::OptionOp::Replace, Value::Bool(true));

        let mut archive_opts = archive_defaults("libde", "release", "de");
        archive_opts.push("project_anchor", crate::value::OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        archive_opts.push("gen_anchor", crate::value::OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        archive_opts.push("simulate", crate::value::OptionOp::Replace, Value::Bool(true));

        let mut graph = Graph::new();
        let compile_id = graph.add_phase(Phase::new(compile_opts, Box::new(CompileBehavior)));
        let archive_id = graph.add_phase(Phase::new(archive_opts, Box::new(ArchiveBehavior)));
        graph.add_dependency(archive_id, compile_id).unwrap();

        let result = graph.do_action(archive_id, "build");
        assert!(result.succeeded());
        let plan = graph.phase(archive_id).plan();
        assert_eq!(plan.as_ref().unwrap().outputs_of_kind(FileKind::Archive).len(), 1);
    }
}
