//! Shared option defaults and step-building helpers for the C-family build
//! phases (`Compile`, `Archive`, `LinkToExe`, `LinkToSharedObject`, and the
//! three combination phases built out of them).
//!
//! Grounded on `CFamilyBuildPhase.__init__`'s default option table: rather
//! than replicate its nested `'{{tool_args_{toolkit}}_{kind}_debug_level}'`
//! interpolation trick verbatim, [`apply_kind`] resolves toolkit/kind to a
//! concrete debug level/optimization/flag set directly in Rust at
//! construction time. The options engine itself (`src/options/`) still
//! supports that style of multi-level interpolation generally; this is a
//! narrower, idiomatic stand-in for one source file's particular use of it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::options::Options;
use crate::phase::{default_phase_options, PhaseId};
use crate::plan::{FileData, FileKind, FileOperation, OpKind, Plan};
use crate::step::{run_shell_step, StepResult};
use crate::toolkit;
use crate::value::Value;

/// The baseline options every C-family build phase starts from.
pub fn c_family_defaults(name: &str, kind: &str) -> Options {
    let mut opts = default_phase_options(name);
    opts.set_default("toolkit", Value::Str("gnu".into()));
    opts.set_default("language", Value::Str("c++".into()));
    opts.set_default("language_version", Value::Str("23".into()));
    opts.set_default("kind", Value::Str(kind.to_string()));
    opts.set_default(
        "gnuclang_warnings",
        Value::List(vec![Value::Str("all".into()), Value::Str("extra".into()), Value::Str("error".into())]),
    );
    opts.set_default("pkg_config", Value::List(vec![]));
    opts.set_default("posix_threads", Value::Bool(false));
    opts.set_default("definitions", Value::List(vec![]));
    opts.set_default("additional_flags", Value::List(vec![]));
    opts.set_default("relocatable_code", Value::Bool(false));
    opts.set_default("incremental_build", Value::Bool(true));
    opts.set_default("simulate", Value::Bool(false));

    opts.set_default("project_anchor", Value::Str(".".into()));
    opts.set_default("gen_anchor", Value::Str(".".into()));
    opts.set_default("build_dir", Value::Str("build".into()));
    opts.set_default("build_detail", Value::Str("{kind}.{toolkit}".into()));
    opts.set_default("obj_dir", Value::Str("int".into()));
    opts.set_default("exe_dir", Value::Str("bin".into()));
    opts.set_default("lib_dir", Value::Str("lib".into()));
    opts.set_default("obj_anchor", Value::Str("{gen_anchor}/{build_dir}/{build_detail}/{obj_dir}".into()));
    opts.set_default("exe_anchor", Value::Str("{gen_anchor}/{build_dir}/{build_detail}/{exe_dir}".into()));
    opts.set_default("archive_anchor", Value::Str("{gen_anchor}/{build_dir}/{build_detail}/{lib_dir}".into()));
    opts.set_default("shared_object_anchor", Value::Str("{gen_anchor}/{build_dir}/{build_detail}/{lib_dir}".into()));

    opts.set_default("src_dir", Value::Str("src".into()));
    opts.set_default("src_anchor", Value::Str("{project_anchor}/{src_dir}".into()));
    opts.set_default("include_dirs", Value::List(vec![Value::Str("include".into())]));
    opts.set_default("sources", Value::List(vec![]));
    opts.set_default("prebuilt_objects", Value::List(vec![]));

    opts.set_default("lib_dirs", Value::List(vec![]));
    opts.set_default("libs", Value::List(vec![]));
    opts.set_default("shared_libs", Value::List(vec![]));
    opts.set_default("rpath", Value::List(vec![]));
    opts.set_default("build_for_deployment", Value::Bool(false));

    apply_kind(&mut opts, "gnu", kind);
    opts
}

/// Sets `debug_level`/`optimization`/`kind_flags` per the toolkit/kind cell,
/// matching `gnuclang_debug_*`/`gnuclang_release_*` in the source defaults.
pub fn apply_kind(opts: &mut Options, toolkit: &str, kind: &str) {
    let (debug_level, optimization, flags): (&str, &str, &[&str]) = match (toolkit, kind) {
        (_, "debug") => ("2", "g", &["-fno-inline", "-fno-lto", "-DDEBUG"]),
        _ => ("0", "2", &["-DNDEBUG"]),
    };
    opts.set_default("debug_level", Value::Str(debug_level.into()));
    opts.set_default("optimization", Value::Str(optimization.into()));
    opts.set_default(
        "kind_flags",
        Value::List(flags.iter().map(|f| Value::Str((*f).to_string())).collect()),
    );
}

fn opt_str_list(options: &Options, key: &str) -> Result<Vec<String>> {
    Ok(options.opt_list(key)?.into_iter().map(|v| v.to_string()).collect())
}

/// Resolves the `{src_anchor}/{source}` and `{obj_anchor}/{basename}.o` pair
/// for one declared source.
fn src_and_obj_paths(options: &Options, source: &str) -> Result<(PathBuf, PathBuf)> {
    let src_anchor = options.opt_str("src_anchor")?;
    let obj_anchor = options.opt_str("obj_anchor")?;
    let basename = Path::new(source).file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| source.to_string());
    Ok((
        PathBuf::from(format!("{src_anchor}/{source}")),
        PathBuf::from(format!("{obj_anchor}/{basename}.o")),
    ))
}

/// Walks each of `include_dirs` (resolved against `project_anchor`) for
/// header files, so a compile step's declared inputs include the headers it
/// transitively pulls in, per the freshness-test contract in §4.4. This is a
/// directory sweep, not a real preprocessor include graph.
fn discover_headers(options: &Options) -> Result<Vec<PathBuf>> {
    let project_anchor = options.opt_str("project_anchor")?;
    let inc_dirs = opt_str_list(options, "include_dirs")?;
    let mut headers = Vec::new();
    for inc in inc_dirs {
        let dir = PathBuf::from(format!("{project_anchor}/{inc}"));
        if !dir.is_dir() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&dir).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() {
                let is_header = entry
                    .path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| matches!(e, "h" | "hpp" | "hh" | "hxx" | "inl"))
                    .unwrap_or(false);
                if is_header {
                    headers.push(entry.path().to_path_buf());
                }
            }
        }
    }
    Ok(headers)
}

/// Emits one `create directory` + one `compile` operation per declared
/// source, running each as a step. Returns the step results and the object
/// paths produced, for a caller (`Archive`/`LinkToExe`/a combination phase)
/// to consume directly without a separate `Compile` dependency.
pub fn compile_sources(options: &Options, phase_id: PhaseId, plan: &mut Plan) -> Result<(Vec<StepResult>, Vec<PathBuf>)> {
    let sources = opt_str_list(options, "sources")?;
    let headers = discover_headers(options)?;
    let prefix = toolkit::build_command_prefix(options, true)?;
    let args = toolkit::compile_args(options)?;
    let simulate = options.opt_bool("simulate").unwrap_or(false);

    let mut results = Vec::new();
    let mut objects = Vec::new();

    for source in sources {
        let (src_path, obj_path) = src_and_obj_paths(options, &source)?;
        let obj_dir = obj_path.parent().unwrap_or(Path::new(".")).to_path_buf();

        plan.push(FileOperation {
            inputs: vec![],
            outputs: vec![FileData::generated(obj_dir.clone(), FileKind::Dir, phase_id)],
            op: OpKind::CreateDirectory,
        });
        results.push(run_shell_step(
            "creating",
            &[] as &[&Path],
            &[&obj_dir],
            &format!("mkdir -p {}", obj_dir.display()),
            simulate,
        ));

        let mut inputs = vec![src_path.clone()];
        inputs.extend(headers.iter().cloned());
        let pthread = if args.posix_threads { " -pthread" } else { "" };
        let shell_cmd = format!(
            "{prefix}{}{} -o {} {}{pthread}",
            args.inc_dirs,
            args.pkg_inc_bits,
            obj_path.display(),
            src_path.display(),
        );
        results.push(run_shell_step("compiling", &inputs, &[&obj_path], &shell_cmd, simulate));

        let mut op_inputs = vec![FileData::external(src_path, FileKind::Source)];
        op_inputs.extend(headers.iter().map(|h| FileData::external(h.clone(), FileKind::Header)));
        plan.push(FileOperation {
            inputs: op_inputs,
            outputs: vec![FileData::generated(obj_path.clone(), FileKind::Object, phase_id)],
            op: OpKind::Compile,
        });
        objects.push(obj_path);
    }

    Ok((results, objects))
}

/// Cleans every object the phase's `sources` option would produce.
pub fn clean_sources(options: &Options) -> Result<Vec<StepResult>> {
    let sources = opt_str_list(options, "sources")?;
    let mut results = Vec::new();
    for source in sources {
        let (_, obj_path) = src_and_obj_paths(options, &source)?;
        results.push(delete_file_step("deleting", &obj_path));
    }
    Ok(results)
}

pub fn delete_file_step(step_name: &str, path: &Path) -> StepResult {
    let shell_cmd = format!("rm -f {}", path.display());
    if !path.exists() {
        return StepResult::new(step_name, "", path.display().to_string(), shell_cmd)
            .with_code(crate::step::ResultCode::AlreadyUpToDate, None);
    }
    match std::fs::remove_file(path) {
        Ok(()) => StepResult::new(step_name, "", path.display().to_string(), shell_cmd).with_code(crate::step::ResultCode::Succeeded, None),
        Err(e) => StepResult::new(step_name, "", path.display().to_string(), shell_cmd)
            .with_code(crate::step::ResultCode::CommandFailed, Some(e.to_string())),
    }
}

/// Collects every `object`-kind output published by `dep_plans`, plus any
/// `prebuilt_objects` the phase declares directly — the sole mechanism by
/// which archive/link phases discover what to combine.
pub fn gather_object_inputs(options: &Options, dep_plans: &[&Plan]) -> Result<Vec<FileData>> {
    let mut objs: Vec<FileData> = dep_plans
        .iter()
        .flat_map(|p| p.outputs_of_kind(FileKind::Object))
        .cloned()
        .collect();
    for prebuilt in opt_str_list(options, "prebuilt_objects")? {
        objs.push(FileData::external(prebuilt, FileKind::Object));
    }
    Ok(objs)
}

/// Unique parent directories of every `archive`/`shared_object` output
/// discovered directly among `dep_plans`, and a name→kind map derived from
/// their basenames (strips `lib`/extension), used to auto-fill `lib_dirs`
/// and `libs` the way `LinkToExe.patch_options_post_files` does.
pub fn discover_libs(dep_plans: &[&Plan]) -> (Vec<String>, BTreeMap<String, &'static str>, Vec<String>) {
    let mut lib_dirs = Vec::new();
    let mut libs = BTreeMap::new();
    let mut rpath = Vec::new();

    for plan in dep_plans {
        for archive in plan.outputs_of_kind(FileKind::Archive) {
            push_unique(&mut lib_dirs, parent_string(&archive.path));
            libs.insert(lib_basename(&archive.path, ".a"), "archive");
        }
        for so in plan.outputs_of_kind(FileKind::SharedObject) {
            push_unique(&mut lib_dirs, parent_string(&so.path));
            libs.insert(lib_basename(&so.path, ".so"), "shared_object");
            push_unique(&mut rpath, parent_string(&so.path));
        }
    }
    (lib_dirs, libs, rpath)
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn parent_string(path: &Path) -> String {
    path.parent().map(|p| p.display().to_string()).unwrap_or_default()
}

fn lib_basename(path: &Path, suffix: &str) -> String {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    name.strip_prefix("lib").unwrap_or(&name).trim_end_matches(suffix).to_string()
}
