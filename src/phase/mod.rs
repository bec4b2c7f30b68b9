//! The phase graph: the DAG of build phases, dependency admission, dynamic
//! option-override propagation, and the depth-first, ordinal-memoized
//! action dispatcher.
//!
//! Grounded on the base `Phase` class: each phase owns its own [`Options`],
//! performs its dependencies' action before its own (depth-first), and
//! remembers its result for the current action ordinal so a phase shared by
//! two dependents only runs once per `do_action` call.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;

use crate::errors::{Error, Result};
use crate::options::Options;
use crate::plan::Plan;
use crate::step::{ActionResult, ResultCode, StepResult};
use crate::value::{OptionOp, Value};

/// An opaque handle to a phase owned by a [`Graph`]. Stable for the
/// lifetime of the graph; indices are never reused after removal because
/// phases are never removed once added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhaseId(pub(crate) usize);

/// The work a concrete phase kind (compile, archive, link, report, ...)
/// does for one action. Implementors compute a [`Plan`] from their own
/// options and their dependencies' plans, then report one [`StepResult`]
/// per operation they actually perform (including skipped/up-to-date ones).
///
/// An action name a behavior does not recognize should fall through to
/// [`NoopBehavior`]-style handling: a single `NO_ACTION` step, not an error.
pub trait PhaseBehavior: std::fmt::Debug {
    /// Runs before dependencies are asked to act, with the whole graph
    /// available — the hook a phase like `LinkToSharedObject` uses to push
    /// `relocatable_code=true` onto its dependency subtree ahead of time.
    /// Most phases have nothing to do here.
    fn prepare(&self, _graph: &Graph, _id: PhaseId) {}

    /// `id` is the phase's own id, passed through so a behavior can stamp
    /// its generated [`crate::plan::FileData`] with the right
    /// `generating_phase`. Never called for the `report` action: every
    /// phase's `do_action_report` is identical in the source, so
    /// `Graph::do_action_inner` handles `report` itself, generically,
    /// ahead of dispatching to a behavior at all.
    fn perform(&self, id: PhaseId, action: &str, options: &Options, dep_plans: &[&Plan]) -> Result<(Plan, Vec<StepResult>)>;

    fn clone_behavior(&self) -> Box<dyn PhaseBehavior>;
}

/// The fallback behavior for phases that only aggregate dependencies (or
/// for any phase when asked to perform an action it doesn't implement):
/// `report` prints nothing here (the reporter subsystem owns presentation)
/// and every other action is a no-op success.
#[derive(Debug, Clone, Default)]
pub struct NoopBehavior;

impl PhaseBehavior for NoopBehavior {
    fn perform(&self, _id: PhaseId, action: &str, _options: &Options, _dep_plans: &[&Plan]) -> Result<(Plan, Vec<StepResult>)> {
        let step = StepResult::new("noop", "", "", "").with_code(ResultCode::NoAction, None);
        let _ = action;
        Ok((Plan::new(), vec![step]))
    }

    fn clone_behavior(&self) -> Box<dyn PhaseBehavior> {
        Box::new(self.clone())
    }
}

/// One node in the graph: its options, its dependency edges, its behavior,
/// and the memoized state from the most recent `do_action` pass.
pub struct Phase {
    options: RefCell<Options>,
    deps: RefCell<Vec<PhaseId>>,
    behavior: Box<dyn PhaseBehavior>,
    last_ordinal: Cell<i64>,
    last_result: RefCell<Option<ActionResult>>,
    plan: RefCell<Option<Plan>>,
}

impl Phase {
    pub fn new(options: Options, behavior: Box<dyn PhaseBehavior>) -> Self {
        Phase {
            options: RefCell::new(options),
            deps: RefCell::new(Vec::new()),
            behavior,
            last_ordinal: Cell::new(-1),
            last_result: RefCell::new(None),
            plan: RefCell::new(None),
        }
    }

    pub fn name(&self) -> String {
        self.options.borrow().opt_str("name").unwrap_or_else(|_| "unnamed".into())
    }

    pub fn options(&self) -> std::cell::Ref<'_, Options> {
        self.options.borrow()
    }

    pub fn plan(&self) -> std::cell::Ref<'_, Option<Plan>> {
        self.plan.borrow()
    }

    /// The behavior's type name (e.g. `"ArchiveBehavior"`), for reporting.
    /// Relies on every behavior being a unit/tuple struct whose `Debug`
    /// output is just its type name, true of every behavior in this crate.
    pub fn behavior_name(&self) -> String {
        let full = format!("{:?}", self.behavior);
        full.split(['(', ' ', '{']).next().unwrap_or(&full).to_string()
    }
}

/// Establishes a phase's baseline options, matching the defaults every
/// phase inherits before its own constructor layers more on top.
pub fn default_phase_options(name: impl Into<String>) -> Options {
    let mut opts = Options::new();
    opts.set_default("name", Value::Str(name.into()));
    opts.set_default("verbosity", Value::Int(0));
    opts.set_default("simulate", Value::Bool(false));
    opts
}

/// Owns every phase in a build by arena index and provides dependency
/// admission, override propagation, and action dispatch over the whole
/// graph.
#[derive(Default)]
pub struct Graph {
    phases: Vec<Phase>,
    ordinal_counter: Cell<i64>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    pub fn add_phase(&mut self, phase: Phase) -> PhaseId {
        self.phases.push(phase);
        PhaseId(self.phases.len() - 1)
    }

    pub fn phase(&self, id: PhaseId) -> &Phase {
        &self.phases[id.0]
    }

    pub fn find_by_name(&self, name: &str) -> Option<PhaseId> {
        self.phases.iter().position(|p| p.name() == name).map(PhaseId)
    }

    /// Whether `from`'s dependency subtree already reaches `target`,
    /// directly or transitively.
    fn reaches(&self, from: PhaseId, target: PhaseId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            stack.extend(self.phases[id.0].deps.borrow().iter().copied());
        }
        false
    }

    /// Adds `new` as a dependency of `target`. Rejects the edge if `new`
    /// already (transitively) depends on `target`, which would close a
    /// cycle.
    pub fn add_dependency(&self, target: PhaseId, new: PhaseId) -> Result<()> {
        if target == new || self.reaches(new, target) {
            return Err(Error::CircularDependency {
                from: self.phases[new.0].name(),
                to: self.phases[target.0].name(),
            });
        }
        self.phases[target.0].deps.borrow_mut().push(new);
        Ok(())
    }

    pub fn dependencies(&self, id: PhaseId) -> Vec<PhaseId> {
        self.phases[id.0].deps.borrow().clone()
    }

    /// Applies `overrides` to `id`, then to every dependency (in
    /// declaration order), matching the "self, then each dep" propagation
    /// order.
    pub fn push_overrides(&self, id: PhaseId, overrides: &[(String, OptionOp, Value)]) {
        {
            let mut opts = self.phases[id.0].options.borrow_mut();
            for (key, op, value) in overrides {
                opts.push(key.clone(), *op, value.clone());
            }
        }
        for dep in self.phases[id.0].deps.borrow().iter() {
            self.push_overrides(*dep, overrides);
        }
    }

    /// Removes the most recently pushed override for each of `keys`,
    /// walking dependencies in reverse order before popping `id` itself —
    /// the mirror image of [`Graph::push_overrides`].
    pub fn pop_overrides(&self, id: PhaseId, keys: &[String]) {
        for dep in self.phases[id.0].deps.borrow().iter().rev() {
            self.pop_overrides(*dep, keys);
        }
        let mut opts = self.phases[id.0].options.borrow_mut();
        for key in keys {
            opts.pop(key);
        }
    }

    /// Performs `action` on `root` and every phase it (transitively)
    /// depends on, depth-first. Shared dependencies run at most once per
    /// call, memoized by a fresh ordinal.
    pub fn do_action(&self, root: PhaseId, action: &str) -> ActionResult {
        let ordinal = self.ordinal_counter.get() + 1;
        self.ordinal_counter.set(ordinal);
        self.do_action_inner(root, action, ordinal)
    }

    fn do_action_inner(&self, id: PhaseId, action: &str, ordinal: i64) -> ActionResult {
        let phase = &self.phases[id.0];
        if phase.last_ordinal.get() == ordinal {
            return phase
                .last_result
                .borrow()
                .clone()
                .unwrap_or_else(|| ActionResult::single(action, StepResult::new(phase.name(), "", "", "").with_code(ResultCode::AlreadyUpToDate, None)));
        }
        phase.last_ordinal.set(ordinal);

        phase.behavior.prepare(self, id);

        let deps = phase.deps.borrow().clone();
        let mut dep_plans = Vec::with_capacity(deps.len());
        let mut dep_failed = false;
        for dep_id in &deps {
            let res = self.do_action_inner(*dep_id, action, ordinal);
            if !res.succeeded() {
                dep_failed = true;
            }
            dep_plans.push(self.phases[dep_id.0].plan.borrow().clone().unwrap_or_default());
        }

        let result = if dep_failed {
            ActionResult::single(
                action,
                StepResult::new(phase.name(), "", "", "")
                    .with_code(ResultCode::DependencyError, Some(format!("a dependency of {} failed", phase.name()))),
            )
        } else if action == "report" {
            let options = phase.options.borrow();
            let report = options.report();
            ActionResult::single(
                action,
                StepResult::new(phase.name(), "", "", "").with_code(ResultCode::Succeeded, Some(report)),
            )
        } else {
            let options = phase.options.borrow();
            let dep_plan_refs: Vec<&Plan> = dep_plans.iter().collect();
            match phase.behavior.perform(id, action, &options, &dep_plan_refs) {
                Ok((plan, steps)) => {
                    *phase.plan.borrow_mut() = Some(plan);
                    ActionResult::new(action, steps)
                }
                Err(e) => ActionResult::single(
                    action,
                    StepResult::new(phase.name(), "", "", "").with_code(ResultCode::InvalidOption, Some(e.to_string())),
                ),
            }
        };

        *phase.last_result.borrow_mut() = Some(result.clone());
        result
    }

    /// Builds a detached prototype phase: the same behavior and a deep
    /// clone of `id`'s current options (see [`Options::clone_for_prototype`]),
    /// but no dependency edges and no memoized action state. The caller
    /// decides whether/where to re-attach it with [`Graph::add_phase`] and
    /// [`Graph::add_dependency`].
    pub fn clone_as(&self, id: PhaseId, overrides: &[(String, OptionOp, Value)]) -> Phase {
        let mut options = self.phases[id.0].options.borrow().clone_for_prototype();
        for (key, op, value) in overrides {
            options.push(key.clone(), *op, value.clone());
        }
        Phase::new(options, self.phases[id.0].behavior.clone_behavior())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str) -> Phase {
        Phase::new(default_phase_options(name), Box::new(NoopBehavior))
    }

    #[test]
    fn direct_self_dependency_is_rejected() {
        let mut graph = Graph::new();
        let a = graph.add_phase(leaf("a"));
        assert!(graph.add_dependency(a, a).is_err());
    }

    #[test]
    fn transitive_cycle_is_rejected() {
        let mut graph = Graph::new();
        let a = graph.add_phase(leaf("a"));
        let b = graph.add_phase(leaf("b"));
        let c = graph.add_phase(leaf("c"));
        graph.add_dependency(a, b).unwrap();
        graph.add_dependency(b, c).unwrap();
        assert!(graph.add_dependency(c, a).is_err());
    }

    #[test]
    fn diamond_dependency_is_allowed() {
        let mut graph = Graph::new();
        let top = graph.add_phase(leaf("top"));
        let left = graph.add_phase(leaf("left"));
        let right = graph.add_phase(leaf("right"));
        let shared = graph.add_phase(leaf("shared"));
        graph.add_dependency(top, left).unwrap();
        graph.add_dependency(top, right).unwrap();
        graph.add_dependency(left, shared).unwrap();
        assert!(graph.add_dependency(right, shared).is_ok());
    }

    #[test]
    fn shared_dependency_runs_once_per_action() {
        let mut graph = Graph::new();
        let top = graph.add_phase(leaf("top"));
        let left = graph.add_phase(leaf("left"));
        let right = graph.add_phase(leaf("right"));
        let shared = graph.add_phase(leaf("shared"));
        graph.add_dependency(top, left).unwrap();
        graph.add_dependency(top, right).unwrap();
        graph.add_dependency(left, shared).unwrap();
        graph.add_dependency(right, shared).unwrap();

        let result = graph.do_action(top, "build");
        assert!(result.succeeded());
        assert_eq!(graph.phase(shared).last_ordinal.get(), graph.phase(top).last_ordinal.get());
    }

    #[test]
    fn push_then_pop_overrides_restores_value() {
        let mut graph = Graph::new();
        let dep = graph.add_phase(leaf("dep"));
        let top = graph.add_phase(leaf("top"));
        graph.add_dependency(top, dep).unwrap();

        let before = graph.phase(dep).options().get("verbosity").unwrap();
        graph.push_overrides(top, &[("verbosity".into(), OptionOp::Replace, Value::Int(2))]);
        assert_eq!(graph.phase(dep).options().get("verbosity").unwrap(), Value::Int(2));
        graph.pop_overrides(top, &["verbosity".into()]);
        assert_eq!(graph.phase(dep).options().get("verbosity").unwrap(), before);
    }

    #[test]
    fn clone_as_detaches_from_dependencies() {
        let mut graph = Graph::new();
        let dep = graph.add_phase(leaf("dep"));
        let top = graph.add_phase(leaf("top"));
        graph.add_dependency(top, dep).unwrap();

        let clone = graph.clone_as(top, &[("name".into(), OptionOp::Replace, Value::Str("top_clone".into()))]);
        assert_eq!(clone.name(), "top_clone");
        assert!(clone.deps.borrow().is_empty());
    }

    #[test]
    fn report_action_is_handled_generically_without_a_behavior_arm() {
        let mut graph = Graph::new();
        let leaf_id = graph.add_phase(leaf("reportable"));
        let result = graph.do_action(leaf_id, "report");
        assert!(result.succeeded());
        let info = result.results[0].info.as_deref().unwrap_or("");
        assert!(info.contains("name:"));
        assert!(info.contains("-> reportable"));
    }

    #[test]
    fn dependency_failure_short_circuits_as_dependency_error() {
        #[derive(Debug, Clone)]
        struct AlwaysFails;
        impl PhaseBehavior for AlwaysFails {
            fn perform(&self, _id: PhaseId, _action: &str, _options: &Options, _dep_plans: &[&Plan]) -> Result<(Plan, Vec<StepResult>)> {
                Ok((Plan::new(), vec![StepResult::new("fail", "", "", "").with_code(ResultCode::CommandFailed, Some("boom".into()))]))
            }
            fn clone_behavior(&self) -> Box<dyn PhaseBehavior> {
                Box::new(self.clone())
            }
        }

        let mut graph = Graph::new();
        let dep = graph.add_phase(Phase::new(default_phase_options("dep"), Box::new(AlwaysFails)));
        let top = graph.add_phase(leaf("top"));
        graph.add_dependency(top, dep).unwrap();

        let result = graph.do_action(top, "build");
        assert!(!result.succeeded());
        assert_eq!(result.results[0].code, ResultCode::DependencyError);
    }
}
