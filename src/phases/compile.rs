//! The `Compile` phase: compiles declared sources to objects and nothing
//! more, for the cases where a graph wants object files as a standalone
//! dependency rather than bundled into `Archive`/`LinkToExe`.
//!
//! Grounded on `CompilePhase`, a thin `CFamilyBuildPhase` subclass whose
//! `compute_file_operations`/`do_action_build` cover only the object step.

use crate::errors::Result;
use crate::options::Options;
use crate::phase::{PhaseBehavior, PhaseId};
use crate::plan::Plan;
use crate::step::{ResultCode, StepResult};

use super::common;

#[derive(Debug, Clone, Default)]
pub struct CompileBehavior;

/// Builds a fresh `Compile` phase's default options.
pub fn compile_defaults(name: &str, kind: &str) -> Options {
    common::c_family_defaults(name, kind)
}

impl PhaseBehavior for CompileBehavior {
    fn perform(&self, id: PhaseId, action: &str, options: &Options, _dep_plans: &[&Plan]) -> Result<(Plan, Vec<StepResult>)> {
        let mut plan = Plan::new();
        match action {
            "build" => {
                let (results, _objects) = common::compile_sources(options, id, &mut plan)?;
                Ok((plan, results))
            }
            "clean" => Ok((plan, common::clean_sources(options)?)),
            _ => Ok((plan, vec![StepResult::new("compile", "", "", "").with_code(ResultCode::NoAction, None)])),
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
    use crate::plan::FileKind;
    use crate::value::{OptionOp, Value};
    use tempfile::TempDir;

    #[test]
    fn compiles_each_declared_source_to_an_object() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.c"), "int a(){return 1;}").unwrap();
        std::fs::write(dir.path().join("src/b.c"), "int b(){return 2;}").unwrap();

        let mut opts = compile_defaults("objs", "release");
        opts.push("project_anchor", OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        opts.push("gen_anchor", OptionOp::Replace, Value::Str(dir.path().display().to_string()));
        opts.push("sources", OptionOp::Replace, Value::List(vec![Value::Str("a.c".into()), Value::Str("b.c".into())]));
        opts.push("simulate", OptionOp::Replace, Value::Bool(true));

        let mut graph = Graph::new();
        let id = graph.add_phase(Phase::new(opts, Box::new(CompileBehavior)));
        let result = graph.do_action(id, "build");
        assert!(result.succeeded());
        let plan = graph.phase(id).plan();
        assert_eq!(plan.as_ref().unwrap().outputs_of_kind(FileKind::Object).len(), 2);
    }
}
