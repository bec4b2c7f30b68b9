//! The `ExternalRepo` phase: fetches a versioned tarball release of a
//! remote repository, unpacks it into a version-qualified directory, and
//! exposes it to the rest of the graph through a stable unversioned
//! softlink. Unlike the C-family phases this one performs its own shell
//! work directly (download, unpack) rather than composing `step.rs`'s
//! generic mtime-based freshness test, since its freshness rules are their
//! own shape (does the archive exist at all? is the unpack directory
//! non-empty? does the link already point at the current version?).
//!
//! Grounded on `ExternalRepoPhase`.

use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

use crate::errors::Result;
use crate::options::Options;
use crate::phase::{PhaseBehavior, PhaseId};
use crate::plan::{FileData, FileKind, FileOperation, OpKind, Plan};
use crate::step::{run_shell_step, run_softlink_step, ResultCode, StepResult};
use crate::value::Value;

#[derive(Debug, Clone, Default)]
pub struct ExternalRepoBehavior;

/// Builds a fresh `ExternalRepo` phase's default options. `repo_name` is
/// the `owner/repo` slug used to build the GitHub tarball URL;
/// `repo_version` is the tag/ref to fetch.
pub fn external_repo_defaults(name: &str, package_name: &str, repo_name: &str, repo_version: &str) -> Options {
    let mut opts = crate::phase::default_phase_options(name);
    opts.set_default("package_name", Value::Str(package_name.to_string()));
    opts.set_default("repo_name", Value::Str(repo_name.to_string()));
    opts.set_default("repo_version", Value::Str(repo_version.to_string()));
    opts.set_default("service", Value::Str("github".into()));
    opts.set_default("external_repos_anchor", Value::Str("external".into()));
    opts.set_default(
        "target_hard_dir",
        Value::Str("{external_repos_anchor}/{package_name}-{repo_version}".into()),
    );
    opts.set_default("target_link_dir", Value::Str("{external_repos_anchor}/{package_name}".into()));
    opts.set_default(
        "compressed_path",
        Value::Str("{external_repos_anchor}/{package_name}-{repo_version}.tar.gz".into()),
    );
    opts
}

fn repo_url(options: &Options) -> Result<String> {
    let service = options.opt_str("service")?;
    let repo_name = options.opt_str("repo_name")?;
    let repo_version = options.opt_str("repo_version")?;
    Ok(match service.as_str() {
        "github" => format!("https://api.github.com/repos/{repo_name}/tarball/{repo_version}"),
        other => format!("https://{other}/{repo_name}/archive/{repo_version}.tar.gz"),
    })
}

fn download_package_step(options: &Options, compressed_path: &Path) -> Result<StepResult> {
    let url = repo_url(options)?;
    let service = options.opt_str("service")?;
    let simulate = options.opt_bool("simulate").unwrap_or(false);
    let shell_cmd = if service == "github" {
        format!(
            r#"curl -L -H "Accept: application/vnd.github+json" {url} --output {}"#,
            compressed_path.display()
        )
    } else {
        format!("curl -L {url} --output {}", compressed_path.display())
    };
    Ok(run_shell_step(
        "download",
        &[] as &[&Path],
        &[compressed_path],
        &shell_cmd,
        simulate,
    ))
}

/// Removes a stale `target_link_dir` left pointing at a previous version.
/// A no-op (already-up-to-date) if the link is absent, or already resolves
/// to `target_hard_dir`.
fn unlink_stale_step(link_dir: &Path, hard_dir: &Path, simulate: bool) -> StepResult {
    let shell_cmd = format!("unlink {}", link_dir.display());
    let base = StepResult::new("unlink", "", link_dir.display().to_string(), shell_cmd.clone());
    let stale = link_dir.exists() && std::fs::canonicalize(link_dir).ok().as_deref() != Some(hard_dir);
    if !stale {
        return base.with_code(ResultCode::AlreadyUpToDate, None);
    }
    if simulate {
        return base.with_code(ResultCode::Succeeded, None);
    }
    match std::fs::remove_file(link_dir).or_else(|_| std::fs::remove_dir(link_dir)) {
        Ok(()) => base.with_code(ResultCode::Succeeded, None),
        Err(e) => base.with_code(ResultCode::CommandFailed, Some(e.to_string())),
    }
}

/// Extracts `compressed_path` (a gzipped tarball) into `target_hard_dir`,
/// dropping each entry's first path component the way `tar --strip-
/// components=1` does. A no-op if `target_hard_dir` already exists and is
/// non-empty.
fn unpack_package_step(compressed_path: &Path, target_hard_dir: &Path, simulate: bool) -> StepResult {
    let shell_cmd = format!(
        "tar -xf {} -C {} --strip-components=1",
        compressed_path.display(),
        target_hard_dir.display()
    );
    let base = StepResult::new("unpack", compressed_path.display().to_string(), target_hard_dir.display().to_string(), shell_cmd);

    if !simulate && !compressed_path.exists() {
        return base.with_code(ResultCode::MissingInput, Some(format!("missing {}", compressed_path.display())));
    }
    let already_unpacked = target_hard_dir.is_dir()
        && std::fs::read_dir(target_hard_dir).map(|mut d| d.next().is_some()).unwrap_or(false);
    if already_unpacked {
        return base.with_code(ResultCode::AlreadyUpToDate, None);
    }
    if simulate {
        return base.with_code(ResultCode::Succeeded, None);
    }

    match extract_stripped(compressed_path, target_hard_dir) {
        Ok(()) => base.with_code(ResultCode::Succeeded, None),
        Err(e) => base.with_code(ResultCode::CommandFailed, Some(e.to_string())),
    }
}

fn extract_stripped(compressed_path: &Path, target_hard_dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(target_hard_dir)?;
    let file = File::open(compressed_path)?;
    let decoder = GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let mut components = path.components();
        components.next();
        let stripped: PathBuf = components.collect();
        if stripped.as_os_str().is_empty() {
            continue;
        }
        entry.unpack(target_hard_dir.join(stripped))?;
    }
    Ok(())
}

impl PhaseBehavior for ExternalRepoBehavior {
    fn perform(&self, id: PhaseId, action: &str, options: &Options, _dep_plans: &[&Plan]) -> Result<(Plan, Vec<StepResult>)> {
        let mut plan = Plan::new();
        match action {
            "sync" => {
                let anchor = PathBuf::from(options.opt_str("external_repos_anchor")?);
                let compressed_path = PathBuf::from(options.opt_str("compressed_path")?);
                let hard_dir = PathBuf::from(options.opt_str("target_hard_dir")?);
                let link_dir = PathBuf::from(options.opt_str("target_link_dir")?);
                let simulate = options.opt_bool("simulate").unwrap_or(false);

                let mut results = Vec::new();
                plan.push(FileOperation {
                    inputs: vec![],
                    outputs: vec![FileData::generated(anchor.clone(), FileKind::Dir, id)],
                    op: OpKind::CreateDirectory,
                });
                results.push(run_shell_step("creating", &[] as &[&Path], &[&anchor], &format!("mkdir -p {}", anchor.display()), simulate));

                results.push(download_package_step(options, &compressed_path)?);

                plan.push(FileOperation {
                    inputs: vec![],
                    outputs: vec![FileData::generated(hard_dir.clone(), FileKind::Dir, id)],
                    op: OpKind::CreateDirectory,
                });
                results.push(run_shell_step("creating", &[] as &[&Path], &[&hard_dir], &format!("mkdir -p {}", hard_dir.display()), simulate));

                results.push(unlink_stale_step(&link_dir, &hard_dir, simulate));
                results.push(unpack_package_step(&compressed_path, &hard_dir, simulate));
                plan.push(FileOperation {
                    inputs: vec![FileData::generated(compressed_path, FileKind::Other, id)],
                    outputs: vec![FileData::generated(hard_dir.clone(), FileKind::Dir, id)],
                    op: OpKind::Generate,
                });

                results.push(run_softlink_step("softlink", &link_dir, &hard_dir, simulate));
                plan.push(FileOperation {
                    inputs: vec![FileData::generated(hard_dir, FileKind::Dir, id)],
                    outputs: vec![FileData::generated(link_dir, FileKind::SoftLink, id)],
                    op: OpKind::SoftLink,
                });

                Ok((plan, results))
            }
            "clean" => Ok((plan, vec![StepResult::new("external_repo", "", "", "").with_code(ResultCode::NoAction, None)])),
            _ => Ok((plan, vec![StepResult::new("external_repo", "", "", "").with_code(ResultCode::NoAction, None)])),
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
    use crate::value::OptionOp;
    use tempfile::TempDir;

    #[test]
    fn sync_downloads_unpacks_and_links() {
        let dir = TempDir::new().unwrap();
        let mut opts = external_repo_defaults("dep", "widget", "acme/widget", "v1.0.0");
        opts.push(
            "external_repos_anchor",
            OptionOp::Replace,
            Value::Str(dir.path().join("external").display().to_string()),
        );
        opts.push("simulate", OptionOp::Replace, Value::Bool(true));

        let mut graph = Graph::new();
        let id = graph.add_phase(Phase::new(opts, Box::new(ExternalRepoBehavior)));
        let result = graph.do_action(id, "sync");
        assert!(result.succeeded());
        let plan = graph.phase(id).plan();
        assert_eq!(plan.as_ref().unwrap().outputs_of_kind(FileKind::SoftLink).len(), 1);
    }

    #[test]
    fn unlink_stale_is_up_to_date_when_link_already_matches() {
        let dir = TempDir::new().unwrap();
        let hard = dir.path().join("widget-1.0.0");
        std::fs::create_dir_all(&hard).unwrap();
        let link = dir.path().join("widget");
        #[cfg(unix)]
        std::os::unix::fs::symlink(&hard, &link).unwrap();
        #[cfg(unix)]
        {
            let result = unlink_stale_step(&link, &hard, false);
            assert_eq!(result.code, ResultCode::AlreadyUpToDate);
        }
    }
}
