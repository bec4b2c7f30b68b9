//! The `LinkToExe` phase: links an executable from its dependencies'
//! published objects (plus any prebuilt objects it declares directly),
//! auto-discovering `lib_dirs`/`libs`/`rpath` from dependency archive/
//! shared-object outputs. Compiles nothing of its own — see
//! [`crate::phases::compound::CompileAndLinkToExeBehavior`] for the
//! single-phase variant.
//!
//! Grounded on `LinkToExePhase.compute_file_operations`/
//! `patch_options_post_files`/`do_action_build`.

use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::options::Options;
use crate::phase::{PhaseBehavior, PhaseId};
use crate::plan::{FileData, FileKind, FileOperation, OpKind, Plan};
use crate::step::{run_executable_step, run_shell_step, ResultCode, StepResult};
use crate::toolkit;
use crate::value::Value;

use super::common;

#[derive(Debug, Clone, Default)]
pub struct LinkToExeBehavior;

/// Builds a fresh `LinkToExe` phase's default options. `exe_basename` names
/// the produced executable.
pub fn link_to_exe_defaults(name: &str, kind: &str, exe_basename: &str) -> Options {
    let mut opts = common::c_family_defaults(name, kind);
    opts.set_default("exe_basename", Value::Str(exe_basename.to_string()));
    opts
}

pub(super) fn exe_path(options: &Options) -> Result<PathBuf> {
    let anchor = options.opt_str("exe_anchor")?;
    let basename = options.opt_str("exe_basename")?;
    Ok(PathBuf::from(format!("{anchor}/{basename}")))
}

fn opt_str_list(options: &Options, key: &str) -> Result<Vec<String>> {
    Ok(options.opt_list(key)?.into_iter().map(|v| v.to_string()).collect())
}

/// Discovers `lib_dirs`/`libs`/`rpath` among `dep_plans`' archive/shared
/// object outputs and merges them with whatever the phase already declares,
/// matching `patch_options_post_files`.
fn resolve_link_lists(options: &Options, dep_plans: &[&Plan]) -> Result<(Vec<String>, Vec<String>, Vec<String>, Vec<String>)> {
    let (disc_lib_dirs, disc_libs, disc_rpath) = common::discover_libs(dep_plans);

    let mut lib_dirs = opt_str_list(options, "lib_dirs")?;
    for d in disc_lib_dirs {
        if !lib_dirs.contains(&d) {
            lib_dirs.push(d);
        }
    }
    let mut static_libs = opt_str_list(options, "libs")?;
    let mut shared_libs = opt_str_list(options, "shared_libs")?;
    for (name, kind) in &disc_libs {
        match *kind {
            "archive" if !static_libs.contains(name) => static_libs.push(name.clone()),
            "shared_object" if !shared_libs.contains(name) => shared_libs.push(name.clone()),
            _ => {}
        }
    }
    let mut rpath = opt_str_list(options, "rpath")?;
    if !options.opt_bool("build_for_deployment").unwrap_or(false) {
        for r in disc_rpath {
            if !rpath.contains(&r) {
                rpath.push(r);
            }
        }
    }
    Ok((lib_dirs, static_libs, shared_libs, rpath))
}

/// Shared by this phase and the `CompileAndLinkToExe` compound phase: emits
/// the mkdir + link steps and the `executable` file operation for a fixed
/// set of `objects`.
pub(super) fn link_objects(
    id: PhaseId,
    options: &Options,
    objects: Vec<FileData>,
    dep_plans: &[&Plan],
    plan: &mut Plan,
    results: &mut Vec<StepResult>,
) -> Result<()> {
    let (lib_dirs, static_libs, shared_libs, rpath) = resolve_link_lists(options, dep_plans)?;

    let exe = exe_path(options)?;
    let exe_dir = exe.parent().unwrap_or(Path::new(".")).to_path_buf();
    let simulate = options.opt_bool("simulate").unwrap_or(false);

    plan.push(FileOperation {
        inputs: vec![],
        outputs: vec![FileData::generated(exe_dir.clone(), FileKind::Dir, id)],
        op: OpKind::CreateDirectory,
    });
    results.push(run_shell_step(
        "creating",
        &[] as &[&Path],
        &[&exe_dir],
        &format!("mkdir -p {}", exe_dir.display()),
        simulate,
    ));

    let prefix = toolkit::build_command_prefix(options, false)?;
    let link = toolkit::link_args_with(options, &lib_dirs, &static_libs, &shared_libs)?;
    let pthread = if link.posix_threads { " -pthread" } else { "" };
    let rpath_flags = rpath.iter().map(|r| format!("-Wl,-rpath,{r} ")).collect::<String>();

    let object_paths: Vec<&Path> = objects.iter().map(|o| o.path.as_path()).collect();
    let objs_cmd = object_paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(" ");
    let shell_cmd = format!(
        "{prefix}-o {} {objs_cmd} {}{}{}{}{rpath_flags}{pthread}",
        exe.display(),
        link.lib_dirs,
        link.static_libs,
        link.shared_libs,
        link.pkg_libs_bits,
    );
    results.push(run_shell_step("linking", &object_paths, &[&exe], &shell_cmd, simulate));

    plan.push(FileOperation {
        inputs: objects,
        outputs: vec![FileData::generated(exe, FileKind::Executable, id)],
        op: OpKind::Link,
    });
    Ok(())
}

impl PhaseBehavior for LinkToExeBehavior {
    fn perform(&self, id: PhaseId, action: &str, options: &Options, dep_plans: &[&Plan]) -> Result<(Plan, Vec<StepResult>)> {
        let mut plan = Plan::new();
        match action {
            "build" => {
                let objects = common::gather_object_inputs(options, dep_plans)?;
                let mut results = Vec::new();
                link_objects(id, options, objects, dep_plans, &mut plan, &mut results)?;
                Ok((plan, results))
            }
            "clean" => {
                let exe = exe_path(options)?;
                Ok((plan, vec![common::delete_file_step("deleting", &exe)]))
            }
            "run" => {
                let exe = exe_path(options)?;
                let simulate = options.opt_bool("simulate").unwrap_or(false);
                Ok((plan, vec![run_executable_step("running", &exe, &[], simulate)]))
            }
            _ => Ok((plan, vec![StepResult::new("link_to_exe", "", "", "").with_code(ResultCode::NoAction, None)])),
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
    use tempfile::TempDir;

    #[test]
    fn links_executable_from_compile_and_dependency_archive() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.c"), "int main(){return 0;}").unwrap();
        std::fs::write(dir.path().join("src/util.c"), "int util(){return 1;}").unwrap();

        let mut util_compile_opts = super::super::compile::compile_defaults("util_objs", "release");
        util_compile_opts.push("project_anchor", crate::value::OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        util_compile_opts.push("gen_anchor", crate::value::OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        util_compile_opts.push("sources", crate::value::OptionOp::Replace, Value::List(vec![Value::Str("util.c".into())]));
        util_compile_opts.push("simulate", crate::value::OptionOp::Replace, Value::Bool(true));

        let mut archive_opts = super::super::archive::archive_defaults("libutil", "release", "util");
        archive_opts.push("project_anchor", crate::value::OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        archive_opts.push("gen_anchor", crate::value::OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        archive_opts.push("simulate", crate::value::OptionOp::Replace, Value::Bool(true));

        let mut main_compile_opts = super::super::compile::compile_defaults("main_objs", "release");
        main_compile_opts.push("project_anchor", crate::value::OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        main_compile_opts.push("gen_anchor", crate::value::OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        main_compile_opts.push("sources", crate::value::OptionOp::Replace, Value::List(vec![Value::Str("main.c".into())]));
        main_compile_opts.push("simulate", crate::value::OptionOp::Replace, Value::Bool(true));

        let mut exe_opts = link_to_exe_defaults("app", "release", "app");
        exe_opts.push("project_anchor", crate::value::OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        exe_opts.push("gen_anchor", crate::value::OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        exe_opts.push("simulate", crate::value::OptionOp::Replace, Value::Bool(true));

        let mut graph = Graph::new();
        let util_compile_id = graph.add_phase(Phase::new(util_compile_opts, Box::new(super::super::compile::CompileBehavior)));
        let archive_id = graph.add_phase(Phase::new(archive_opts, Box::new(super::super::archive::ArchiveBehavior)));
        let main_compile_id = graph.add_phase(Phase::new(main_compile_opts, Box::new(super::super::compile::CompileBehavior)));
        let exe_id = graph.add_phase(Phase::new(exe_opts, Box::new(LinkToExeBehavior)));
        graph.add_dependency(archive_id, util_compile_id).unwrap();
        graph.add_dependency(exe_id, archive_id).unwrap();
        graph.add_dependency(exe_id, main_compile_id).unwrap();

        let result = graph.do_action(exe_id, "build");
        assert!(result.succeeded());
        let plan = graph.phase(exe_id).plan();
        let outputs = plan.as_ref().unwrap().outputs_of_kind(FileKind::Executable);
        assert_eq!(outputs.len(), 1);
    }
}
