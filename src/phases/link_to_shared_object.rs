//! The `LinkToSharedObject` phase: links its dependencies' objects into a
//! shared library, optionally publishing versioned SONAME/linker-name
//! softlinks alongside the real file.
//!
//! Grounded on `LinkToSharedObjectPhase.patch_options`/`compute_file_operations`/
//! `do_action_build`. `patch_options` (the "fixups run before file
//! operations" hook) is what [`Graph::prepare`](crate::phase::Graph) now
//! models generally as [`PhaseBehavior::prepare`].

use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::options::Options;
use crate::phase::{Graph, PhaseBehavior, PhaseId};
use crate::plan::{FileData, FileKind, FileOperation, OpKind, Plan};
use crate::step::{run_shell_step, run_softlink_step, ResultCode, StepResult};
use crate::toolkit;
use crate::value::{OptionOp, Value};

use super::common;

#[derive(Debug, Clone, Default)]
pub struct LinkToSharedObjectBehavior;

/// Builds a fresh `LinkToSharedObject` phase's default options.
/// `shared_object_basename` names the library (`lib<basename>.so`). Set
/// `so_version` and `generate_versioned_sonames=true` for a versioned
/// real name (`lib<basename>.so.<version>`) plus SONAME/linker-name
/// softlinks.
pub fn link_to_shared_object_defaults(name: &str, kind: &str, shared_object_basename: &str) -> Options {
    let mut opts = common::c_family_defaults(name, kind);
    opts.set_default("shared_object_basename", Value::Str(shared_object_basename.to_string()));
    opts.set_default("so_version", Value::Str("1.0.0".into()));
    opts.set_default("generate_versioned_sonames", Value::Bool(false));
    opts
}

fn real_name(options: &Options) -> Result<String> {
    let basename = options.opt_str("shared_object_basename")?;
    if options.opt_bool("generate_versioned_sonames").unwrap_or(false) {
        let version = options.opt_str("so_version")?;
        Ok(format!("lib{basename}.so.{version}"))
    } else {
        Ok(format!("lib{basename}.so"))
    }
}

fn soname(options: &Options) -> Result<String> {
    let basename = options.opt_str("shared_object_basename")?;
    let version = options.opt_str("so_version")?;
    let major = version.split('.').next().unwrap_or(&version);
    Ok(format!("lib{basename}.so.{major}"))
}

fn linker_name(options: &Options) -> Result<String> {
    let basename = options.opt_str("shared_object_basename")?;
    Ok(format!("lib{basename}.so"))
}

pub(super) fn shared_object_path(options: &Options) -> Result<PathBuf> {
    let anchor = options.opt_str("shared_object_anchor")?;
    Ok(PathBuf::from(format!("{anchor}/{}", real_name(options)?)))
}

/// Shared by this phase and the `CompileAndLinkToSharedObject` compound
/// phase: emits the mkdir + link steps, the optional versioned-soname
/// softlinks, and the `shared_object` file operation for a fixed set of
/// `objects`.
pub(super) fn link_shared_object(
    id: PhaseId,
    options: &Options,
    objects: Vec<FileData>,
    plan: &mut Plan,
    results: &mut Vec<StepResult>,
) -> Result<()> {
    let so_path = shared_object_path(options)?;
    let so_dir = so_path.parent().unwrap_or(Path::new(".")).to_path_buf();
    let simulate = options.opt_bool("simulate").unwrap_or(false);
    let versioned = options.opt_bool("generate_versioned_sonames").unwrap_or(false);

    plan.push(FileOperation {
        inputs: vec![],
        outputs: vec![FileData::generated(so_dir.clone(), FileKind::Dir, id)],
        op: OpKind::CreateDirectory,
    });
    results.push(run_shell_step(
        "creating",
        &[] as &[&Path],
        &[&so_dir],
        &format!("mkdir -p {}", so_dir.display()),
        simulate,
    ));

    let prefix = toolkit::build_command_prefix(options, false)?;
    let link = toolkit::link_args(options)?;
    let pthread = if link.posix_threads { " -pthread" } else { "" };
    let object_paths: Vec<&Path> = objects.iter().map(|o| o.path.as_path()).collect();
    let objs_cmd = object_paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(" ");
    let soname_flag = if versioned { format!("-Wl,-soname,{} ", soname(options)?) } else { String::new() };
    let shell_cmd = format!(
        "{prefix}-shared {soname_flag}-o {} {objs_cmd} {}{}{}{}{pthread}",
        so_path.display(),
        link.lib_dirs,
        link.static_libs,
        link.shared_libs,
        link.pkg_libs_bits,
    );
    results.push(run_shell_step("linking", &object_paths, &[&so_path], &shell_cmd, simulate));

    plan.push(FileOperation {
        inputs: objects,
        outputs: vec![FileData::generated(so_path.clone(), FileKind::SharedObject, id)],
        op: OpKind::LinkToSharedObject,
    });

    if versioned {
        let anchor = options.opt_str("shared_object_anchor")?;
        let soname_path = PathBuf::from(format!("{anchor}/{}", soname(options)?));
        let linker_path = PathBuf::from(format!("{anchor}/{}", linker_name(options)?));

        results.push(run_softlink_step("soname", &soname_path, &so_path, simulate));
        plan.push(FileOperation {
            inputs: vec![FileData::generated(so_path.clone(), FileKind::SharedObject, id)],
            outputs: vec![FileData::generated(soname_path.clone(), FileKind::SoftLink, id)],
            op: OpKind::SoftLink,
        });

        results.push(run_softlink_step("linker_name", &linker_path, &soname_path, simulate));
        plan.push(FileOperation {
            inputs: vec![FileData::generated(soname_path, FileKind::SoftLink, id)],
            outputs: vec![FileData::generated(linker_path, FileKind::SoftLink, id)],
            op: OpKind::SoftLink,
        });
    }
    Ok(())
}

impl PhaseBehavior for LinkToSharedObjectBehavior {
    fn prepare(&self, graph: &Graph, id: PhaseId) {
        let overrides = [("relocatable_code".to_string(), OptionOp::Replace, Value::Bool(true))];
        for dep in graph.dependencies(id) {
            graph.push_overrides(dep, &overrides);
        }
    }

    fn perform(&self, id: PhaseId, action: &str, options: &Options, dep_plans: &[&Plan]) -> Result<(Plan, Vec<StepResult>)> {
        let mut plan = Plan::new();
        match action {
            "build" => {
                let objects = common::gather_object_inputs(options, dep_plans)?;
                let mut results = Vec::new();
                link_shared_object(id, options, objects, &mut plan, &mut results)?;
                Ok((plan, results))
            }
            "clean" => {
                let so_path = shared_object_path(options)?;
                let mut results = vec![common::delete_file_step("deleting", &so_path)];
                if options.opt_bool("generate_versioned_sonames").unwrap_or(false) {
                    let anchor = options.opt_str("shared_object_anchor")?;
                    results.push(common::delete_file_step("deleting", Path::new(&format!("{anchor}/{}", soname(options)?))));
                    results.push(common::delete_file_step("deleting", Path::new(&format!("{anchor}/{}", linker_name(options)?))));
                }
                Ok((plan, results))
            }
            _ => Ok((plan, vec![StepResult::new("link_to_shared_object", "", "", "").with_code(ResultCode::NoAction, None)])),
        }
    }

    fn clone_behavior(&self) -> Box<dyn PhaseBehavior> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::Phase;
    use tempfile::TempDir;

    #[test]
    fn relocatable_code_propagates_to_dependency_before_it_compiles() {
        let dir = TempDir::new().unwrap();

        let mut archive_opts = super::super::archive::archive_defaults("obj", "release", "obj");
        archive_opts.push("project_anchor", OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        archive_opts.push("gen_anchor", OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        archive_opts.push("simulate", OptionOp::Replace, Value::Bool(true));

        let mut so_opts = link_to_shared_object_defaults("libfoo", "release", "foo");
        so_opts.push("project_anchor", OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        so_opts.push("gen_anchor", OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        so_opts.push("simulate", OptionOp::Replace, Value::Bool(true));

        let mut graph = Graph::new();
        let archive_id = graph.add_phase(Phase::new(archive_opts, Box::new(super::super::archive::ArchiveBehavior)));
        let so_id = graph.add_phase(Phase::new(so_opts, Box::new(LinkToSharedObjectBehavior)));
        graph.add_dependency(so_id, archive_id).unwrap();

        let result = graph.do_action(so_id, "build");
        assert!(result.succeeded());
        assert_eq!(graph.phase(archive_id).options().get("relocatable_code").unwrap(), Value::Bool(true));
        let plan = graph.phase(so_id).plan();
        assert_eq!(plan.as_ref().unwrap().outputs_of_kind(FileKind::SharedObject).len(), 1);
    }

    #[test]
    fn versioned_sonames_emit_two_softlinks() {
        let dir = TempDir::new().unwrap();
        let mut so_opts = link_to_shared_object_defaults("libfoo", "release", "foo");
        so_opts.push("project_anchor", OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        so_opts.push("gen_anchor", OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        so_opts.push("generate_versioned_sonames", OptionOp::Replace, Value::Bool(true));
        so_opts.push("so_version", OptionOp::Replace, Value::Str("2.1.0".into()));
        so_opts.push("simulate", OptionOp::Replace, Value::Bool(true));

        let mut graph = Graph::new();
        let so_id = graph.add_phase(Phase::new(so_opts, Box::new(LinkToSharedObjectBehavior)));
        let result = graph.do_action(so_id, "build");
        assert!(result.succeeded());
        let plan = graph.phase(so_id).plan();
        assert_eq!(plan.as_ref().unwrap().outputs_of_kind(FileKind::SoftLink).len(), 2);
    }
}
