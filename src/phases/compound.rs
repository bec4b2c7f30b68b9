//! The three single-phase "compile and combine" phases: each compiles its
//! own declared sources, merges in whatever its dependencies publish, and
//! archives/links in the same phase instead of splitting compile out into
//! a separate dependency.
//!
//! Grounded on `compile_and_archive.py`, `compile_and_link_to_exe.py`,
//! `compile_and_link_to_so.py`. Each reuses this crate's standalone
//! `Archive`/`LinkToExe`/`LinkToSharedObject` step-building helpers rather
//! than duplicating them, matching how the originals share
//! `CFamilyBuildPhase`'s step builders with their standalone counterparts.

use crate::errors::Result;
use crate::options::Options;
use crate::phase::{Graph, PhaseBehavior, PhaseId};
use crate::plan::{FileData, FileKind, Plan};
use crate::step::{run_executable_step, ResultCode, StepResult};
use crate::value::{OptionOp, Value};

use super::archive::{self, archive_defaults};
use super::common;
use super::link_to_exe::{self, link_to_exe_defaults};
use super::link_to_shared_object::{self, link_to_shared_object_defaults};

#[derive(Debug, Clone, Default)]
pub struct CompileAndArchiveBehavior;

pub fn compile_and_archive_defaults(name: &str, kind: &str, archive_basename: &str) -> Options {
    archive_defaults(name, kind, archive_basename)
}

impl PhaseBehavior for CompileAndArchiveBehavior {
    fn perform(&self, id: PhaseId, action: &str, options: &Options, dep_plans: &[&Plan]) -> Result<(Plan, Vec<StepResult>)> {
        let mut plan = Plan::new();
        match action {
            "build" => {
                let (mut results, own_objects) = common::compile_sources(options, id, &mut plan)?;
                let mut objects: Vec<FileData> = own_objects.into_iter().map(|p| FileData::generated(p, FileKind::Object, id)).collect();
                objects.extend(common::gather_object_inputs(options, dep_plans)?);
                archive::archive_objects(id, options, objects, &mut plan, &mut results)?;
                Ok((plan, results))
            }
            "clean" => {
                let mut results = common::clean_sources(options)?;
                results.push(common::delete_file_step("deleting", &archive::archive_path(options)?));
                Ok((plan, results))
            }
            _ => Ok((plan, vec![StepResult::new("compile_and_archive", "", "", "").with_code(ResultCode::NoAction, None)])),
        }
    }

    fn clone_behavior(&self) -> Box<dyn PhaseBehavior> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompileAndLinkToExeBehavior;

pub fn compile_and_link_to_exe_defaults(name: &str, kind: &str, exe_basename: &str) -> Options {
    link_to_exe_defaults(name, kind, exe_basename)
}

impl PhaseBehavior for CompileAndLinkToExeBehavior {
    fn perform(&self, id: PhaseId, action: &str, options: &Options, dep_plans: &[&Plan]) -> Result<(Plan, Vec<StepResult>)> {
        let mut plan = Plan::new();
        match action {
            "build" => {
                let (mut results, own_objects) = common::compile_sources(options, id, &mut plan)?;
                let mut objects: Vec<FileData> = own_objects.into_iter().map(|p| FileData::generated(p, FileKind::Object, id)).collect();
                objects.extend(common::gather_object_inputs(options, dep_plans)?);
                link_to_exe::link_objects(id, options, objects, dep_plans, &mut plan, &mut results)?;
                Ok((plan, results))
            }
            "clean" => {
                let mut results = common::clean_sources(options)?;
                results.push(common::delete_file_step("deleting", &link_to_exe::exe_path(options)?));
                Ok((plan, results))
            }
            "run" => {
                let exe = link_to_exe::exe_path(options)?;
                let simulate = options.opt_bool("simulate").unwrap_or(false);
                Ok((plan, vec![run_executable_step("running", &exe, &[], simulate)]))
            }
            _ => Ok((plan, vec![StepResult::new("compile_and_link_to_exe", "", "", "").with_code(ResultCode::NoAction, None)])),
        }
    }

    fn clone_behavior(&self) -> Box<dyn PhaseBehavior> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompileAndLinkToSharedObjectBehavior;

pub fn compile_and_link_to_shared_object_defaults(name: &str, kind: &str, shared_object_basename: &str) -> Options {
    let mut opts = link_to_shared_object_defaults(name, kind, shared_object_basename);
    opts.set_default("relocatable_code", Value::Bool(true));
    opts
}

impl PhaseBehavior for CompileAndLinkToSharedObjectBehavior {
    fn prepare(&self, graph: &Graph, id: PhaseId) {
        let overrides = [("relocatable_code".to_string(), OptionOp::Replace, Value::Bool(true))];
        graph.push_overrides(id, &overrides);
        for dep in graph.dependencies(id) {
            graph.push_overrides(dep, &overrides);
        }
    }

    fn perform(&self, id: PhaseId, action: &str, options: &Options, dep_plans: &[&Plan]) -> Result<(Plan, Vec<StepResult>)> {
        let mut plan = Plan::new();
        match action {
            "build" => {
                let (mut results, own_objects) = common::compile_sources(options, id, &mut plan)?;
                let mut objects: Vec<FileData> = own_objects.into_iter().map(|p| FileData::generated(p, FileKind::Object, id)).collect();
                objects.extend(common::gather_object_inputs(options, dep_plans)?);
                link_to_shared_object::link_shared_object(id, options, objects, &mut plan, &mut results)?;
                Ok((plan, results))
            }
            "clean" => {
                let mut results = common::clean_sources(options)?;
                results.push(common::delete_file_step("deleting", &link_to_shared_object::shared_object_path(options)?));
                Ok((plan, results))
            }
            _ => Ok((plan, vec![StepResult::new("compile_and_link_to_shared_object", "", "", "").with_code(ResultCode::NoAction, None)])),
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
    use crate::plan::FileKind;
    use tempfile::TempDir;

    #[test]
    fn compile_and_archive_builds_one_archive_from_own_sources() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.c"), "int a(){return 1;}").unwrap();
        std::fs::write(dir.path().join("src/b.c"), "int b(){return 2;}").unwrap();

        let mut opts = compile_and_archive_defaults("libde", "release", "de");
        opts.push("project_anchor", OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        opts.push("gen_anchor", OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        opts.push("sources", OptionOp::Replace, Value::List(vec![Value::Str("a.c".into()), Value::Str("b.c".into())]));
        opts.push("simulate", OptionOp::Replace, Value::Bool(true));

        let mut graph = Graph::new();
        let id = graph.add_phase(Phase::new(opts, Box::new(CompileAndArchiveBehavior)));
        let result = graph.do_action(id, "build");
        assert!(result.succeeded());
        let plan = graph.phase(id).plan();
        assert_eq!(plan.as_ref().unwrap().outputs_of_kind(FileKind::Archive).len(), 1);
    }

    #[test]
    fn compile_and_link_to_shared_object_makes_its_own_sources_relocatable() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.c"), "int a(){return 1;}").unwrap();

        let mut opts = compile_and_link_to_shared_object_defaults("libfoo", "release", "foo");
        opts.push("project_anchor", OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        opts.push("gen_anchor", OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        opts.push("sources", OptionOp::Replace, Value::List(vec![Value::Str("a.c".into())]));
        opts.push("simulate", OptionOp::Replace, Value::Bool(true));

        let mut graph = Graph::new();
        let id = graph.add_phase(Phase::new(opts, Box::new(CompileAndLinkToSharedObjectBehavior)));
        let result = graph.do_action(id, "build");
        assert!(result.succeeded());
        assert_eq!(graph.phase(id).options().get("relocatable_code").unwrap(), Value::Bool(true));
        let plan = graph.phase(id).plan();
        assert_eq!(plan.as_ref().unwrap().outputs_of_kind(FileKind::SharedObject).len(), 1);
    }
}
