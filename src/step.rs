//! The step-level execution engine: freshness testing and shell dispatch for
//! one file operation, plus the result codes that [`crate::phase::Graph`]
//! aggregates into an action's overall outcome.
//!
//! [`ResultCode`] is data describing the outcome of completed build work; it
//! is distinct from [`crate::errors::Error`], which describes a failure to
//! even construct or resolve a value.

use std::path::Path;
use std::process::Command;
use std::time::SystemTime;

#[cfg(unix)]
use std::os::unix::fs::symlink as fs_symlink;

/// Encoded result of one step of an action. Values `>= 0` are successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum ResultCode {
    NoAction = 0,
    Succeeded = 1,
    AlreadyUpToDate = 2,
    MissingInput = -1,
    CommandFailed = -2,
    DependencyError = -3,
    InvalidOption = -4,
}

impl ResultCode {
    pub fn is_success(self) -> bool {
        (self as i8) >= 0
    }

    pub fn name(self) -> &'static str {
        match self {
            ResultCode::NoAction => "no_action",
            ResultCode::Succeeded => "succeeded",
            ResultCode::AlreadyUpToDate => "already_up_to_date",
            ResultCode::MissingInput => "missing_input",
            ResultCode::CommandFailed => "command_failed",
            ResultCode::DependencyError => "dependency_error",
            ResultCode::InvalidOption => "invalid_option",
        }
    }
}

/// The result of one executed step: what ran, on what, and how it came out.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub step_name: String,
    pub step_input: String,
    pub step_output: String,
    pub shell_cmd: String,
    pub code: ResultCode,
    pub info: Option<String>,
}

impl StepResult {
    pub fn new(step_name: impl Into<String>, step_input: impl Into<String>, step_output: impl Into<String>, shell_cmd: impl Into<String>) -> Self {
        StepResult {
            step_name: step_name.into(),
            step_input: step_input.into(),
            step_output: step_output.into(),
            shell_cmd: shell_cmd.into(),
            code: ResultCode::NoAction,
            info: None,
        }
    }

    pub fn with_code(mut self, code: ResultCode, info: Option<String>) -> Self {
        self.code = code;
        self.info = info;
        self
    }

    pub fn succeeded(&self) -> bool {
        self.code.is_success()
    }
}

/// The aggregate result of one phase's action: every step it ran, rolled up
/// to a single pass/fail.
#[derive(Debug, Clone)]
pub struct ActionResult {
    pub action: String,
    pub results: Vec<StepResult>,
}

impl ActionResult {
    pub fn new(action: impl Into<String>, results: Vec<StepResult>) -> Self {
        ActionResult { action: action.into(), results }
    }

    pub fn single(action: impl Into<String>, result: StepResult) -> Self {
        ActionResult { action: action.into(), results: vec![result] }
    }

    pub fn succeeded(&self) -> bool {
        self.results.iter().all(StepResult::succeeded)
    }
}

/// Returns the latest modification time among `paths`, or `None` if any are
/// missing (callers treat a missing path as "infinitely fresh input needed").
fn latest_mtime(paths: &[impl AsRef<Path>]) -> Option<SystemTime> {
    let mut latest = None;
    for p in paths {
        let meta = std::fs::metadata(p).ok()?;
        let mtime = meta.modified().ok()?;
        latest = Some(match latest {
            Some(prev) if prev >= mtime => prev,
            _ => mtime,
        });
    }
    latest
}

/// Whether every output is newer than every input, i.e. the operation need
/// not be redone. An output that does not exist is never up to date.
pub fn is_up_to_date(inputs: &[impl AsRef<Path>], outputs: &[impl AsRef<Path>]) -> bool {
    if outputs.is_empty() {
        return false;
    }
    let Some(earliest_output) = outputs
        .iter()
        .map(|p| std::fs::metadata(p).ok().and_then(|m| m.modified().ok()))
        .collect::<Option<Vec<_>>>()
        .and_then(|times| times.into_iter().min())
    else {
        return false;
    };
    match latest_mtime(inputs) {
        None if inputs.is_empty() => true,
        None => false,
        Some(latest_input) => latest_input <= earliest_output,
    }
}

/// Whether every input path actually exists.
pub fn inputs_exist(inputs: &[impl AsRef<Path>]) -> bool {
    inputs.iter().all(|p| p.as_ref().exists())
}

/// Runs one shell step: checks freshness and input existence first, then
/// invokes `shell_cmd` via the platform shell unless `simulate` is set. A
/// simulated run skips the input-existence check too, since its own
/// upstream steps never actually wrote the files it would otherwise expect.
pub fn run_shell_step(
    step_name: &str,
    inputs: &[impl AsRef<Path>],
    outputs: &[impl AsRef<Path>],
    shell_cmd: &str,
    simulate: bool,
) -> StepResult {
    let input_desc = inputs.iter().map(|p| p.as_ref().display().to_string()).collect::<Vec<_>>().join(" ");
    let output_desc = outputs.iter().map(|p| p.as_ref().display().to_string()).collect::<Vec<_>>().join(" ");
    let base = StepResult::new(step_name, input_desc, output_desc, shell_cmd);

    if !simulate && !inputs_exist(inputs) {
        return base.with_code(ResultCode::MissingInput, Some(format!("missing input(s) for {step_name}")));
    }
    if is_up_to_date(inputs, outputs) {
        return base.with_code(ResultCode::AlreadyUpToDate, None);
    }
    if simulate {
        return base.with_code(ResultCode::Succeeded, None);
    }

    let invocation = if cfg!(target_os = "windows") {
        Command::new("cmd").arg("/C").arg(shell_cmd).output()
    } else {
        Command::new("sh").arg("-c").arg(shell_cmd).output()
    };

    match invocation {
        Ok(output) if output.status.success() => base.with_code(ResultCode::Succeeded, None),
        Ok(output) => base.with_code(
            ResultCode::CommandFailed,
            Some(String::from_utf8_lossy(&output.stderr).into_owned()),
        ),
        Err(e) => base.with_code(ResultCode::CommandFailed, Some(e.to_string())),
    }
}

/// Whether `link` already exists as a symlink resolving to `target`.
pub fn softlink_up_to_date(link: &Path, target: &Path) -> bool {
    match std::fs::read_link(link) {
        Ok(resolved) => resolved == target || link.canonicalize().ok().as_deref() == Some(target),
        Err(_) => false,
    }
}

/// Creates (or replaces) `link` as a symlink to `target`. Up-to-date iff the
/// link already resolves to `target`; the generic `softlink` freshness test
/// from the spec, distinct from the mtime-based tests above.
pub fn run_softlink_step(step_name: &str, link: &Path, target: &Path, simulate: bool) -> StepResult {
    let shell_cmd = format!("ln -sf {} {}", target.display(), link.display());
    let base = StepResult::new(step_name, target.display().to_string(), link.display().to_string(), shell_cmd.clone());

    if !simulate && !target.exists() {
        return base.with_code(ResultCode::MissingInput, Some(format!("missing link target for {step_name}")));
    }
    if softlink_up_to_date(link, target) {
        return base.with_code(ResultCode::AlreadyUpToDate, None);
    }
    if simulate {
        return base.with_code(ResultCode::Succeeded, None);
    }

    #[cfg(unix)]
    {
        if link.exists() || link.symlink_metadata().is_ok() {
            let _ = std::fs::remove_file(link);
        }
        match fs_symlink(target, link) {
            Ok(()) => base.with_code(ResultCode::Succeeded, None),
            Err(e) => base.with_code(ResultCode::CommandFailed, Some(e.to_string())),
        }
    }
    #[cfg(not(unix))]
    {
        base.with_code(ResultCode::CommandFailed, Some("softlinks are not supported on this platform".into()))
    }
}

/// Runs a previously built executable directly (no shell involved,
/// matching `do_step_run_executable`'s `subprocess.run([path, *args])`),
/// forwarding `extra_args` and inheriting the child's stdio. There is no
/// freshness test: `run` always re-executes the target.
pub fn run_executable_step(step_name: &str, exe: &Path, extra_args: &[String], simulate: bool) -> StepResult {
    let shell_cmd = format!("{} {}", exe.display(), extra_args.join(" ")).trim_end().to_string();
    let base = StepResult::new(step_name, exe.display().to_string(), "", shell_cmd.clone());

    if !simulate && !exe.exists() {
        return base.with_code(ResultCode::MissingInput, Some(format!("executable not found: {}", exe.display())));
    }
    if simulate {
        return base.with_code(ResultCode::Succeeded, None);
    }

    match Command::new(exe).args(extra_args).status() {
        Ok(status) if status.success() => base.with_code(ResultCode::Succeeded, None),
        Ok(status) => base.with_code(ResultCode::CommandFailed, Some(format!("exited with {status}"))),
        Err(e) => base.with_code(ResultCode::CommandFailed, Some(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread::sleep;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn result_code_success_is_nonnegative() {
        assert!(ResultCode::Succeeded.is_success());
        assert!(ResultCode::AlreadyUpToDate.is_success());
        assert!(ResultCode::NoAction.is_success());
        assert!(!ResultCode::MissingInput.is_success());
        assert!(!ResultCode::CommandFailed.is_success());
        assert!(!ResultCode::DependencyError.is_success());
        assert!(!ResultCode::InvalidOption.is_success());
    }

    #[test]
    fn missing_output_is_never_up_to_date() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("a.c");
        fs::write(&input, "int main(){}").unwrap();
        let output = dir.path().join("a.o");
        assert!(!is_up_to_date(&[input], &[output]));
    }

    #[test]
    fn newer_input_than_output_is_not_up_to_date() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("a.o");
        fs::write(&output, "obj").unwrap();
        sleep(Duration::from_millis(20));
        let input = dir.path().join("a.c");
        fs::write(&input, "newer").unwrap();
        assert!(!is_up_to_date(&[input], &[output]));
    }

    #[test]
    fn older_input_than_output_is_up_to_date() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("a.c");
        fs::write(&input, "int main(){}").unwrap();
        sleep(Duration::from_millis(20));
        let output = dir.path().join("a.o");
        fs::write(&output, "obj").unwrap();
        assert!(is_up_to_date(&[input], &[output]));
    }

    #[test]
    fn missing_input_short_circuits_to_missing_input_code() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("missing.c");
        let output = dir.path().join("a.o");
        let result = run_shell_step("compile", &[input], &[output], "true", false);
        assert_eq!(result.code, ResultCode::MissingInput);
    }

    #[test]
    fn simulate_skips_execution_but_reports_success() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("a.c");
        fs::write(&input, "int main(){}").unwrap();
        let output = dir.path().join("a.o");
        let result = run_shell_step("compile", &[input], &[output], "exit 1", true);
        assert_eq!(result.code, ResultCode::Succeeded);
        assert!(!output.exists());
    }

    #[test]
    fn simulate_tolerates_inputs_a_prior_simulated_step_never_wrote() {
        let dir = TempDir::new().unwrap();
        let never_written_object = dir.path().join("a.o");
        let archive = dir.path().join("lib.a");
        let result = run_shell_step("archiving", &[never_written_object], &[archive], "exit 1", true);
        assert_eq!(result.code, ResultCode::Succeeded);
    }

    #[test]
    fn shell_failure_is_reported_as_command_failed() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("a.c");
        fs::write(&input, "int main(){}").unwrap();
        let output = dir.path().join("a.o");
        let result = run_shell_step("compile", &[input], &[output], "exit 3", false);
        assert_eq!(result.code, ResultCode::CommandFailed);
    }

    #[cfg(unix)]
    #[test]
    fn softlink_created_when_missing_then_up_to_date_on_rerun() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("libfoo.so.1.0");
        fs::write(&target, "so").unwrap();
        let link = dir.path().join("libfoo.so.1");

        let first = run_softlink_step("soname", &link, &target, false);
        assert_eq!(first.code, ResultCode::Succeeded);
        assert!(softlink_up_to_date(&link, &target));

        let second = run_softlink_step("soname", &link, &target, false);
        assert_eq!(second.code, ResultCode::AlreadyUpToDate);
    }

    #[cfg(unix)]
    #[test]
    fn softlink_missing_target_is_missing_input() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("absent.so");
        let link = dir.path().join("link.so");
        let result = run_softlink_step("soname", &link, &target, false);
        assert_eq!(result.code, ResultCode::MissingInput);
    }

    #[test]
    fn run_executable_step_missing_binary_is_missing_input() {
        let dir = TempDir::new().unwrap();
        let exe = dir.path().join("nonexistent");
        let result = run_executable_step("running", &exe, &[], false);
        assert_eq!(result.code, ResultCode::MissingInput);
    }

    #[test]
    fn run_executable_step_simulated_never_touches_the_filesystem() {
        let dir = TempDir::new().unwrap();
        let exe = dir.path().join("demo");
        let result = run_executable_step("running", &exe, &[], true);
        assert_eq!(result.code, ResultCode::Succeeded);
    }

    #[cfg(unix)]
    #[test]
    fn run_executable_step_runs_a_real_binary() {
        let result = run_executable_step("running", Path::new("/bin/true"), &[], false);
        assert_eq!(result.code, ResultCode::Succeeded);
    }
}
