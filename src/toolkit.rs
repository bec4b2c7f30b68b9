//! Toolkit/language dispatch: turns a phase's options into the command-line
//! fragments its build steps shell out with.
//!
//! Grounded on `CFamilyBuildPhase`'s `make_build_command_prefix` and
//! `make_compile_arguments`/`make_link_arguments`: the same GNU/Clang/MSVC
//! branch table, the same warning/debug/optimization flag assembly.

use crate::errors::{Error, Result};
use crate::options::Options;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toolkit {
    Gnu,
    Clang,
    VisualStudio,
}

impl Toolkit {
    pub fn parse(s: &str) -> Result<Toolkit> {
        match s {
            "gnu" => Ok(Toolkit::Gnu),
            "clang" => Ok(Toolkit::Clang),
            "visualstudio" => Ok(Toolkit::VisualStudio),
            other => Err(Error::UnsupportedToolkit(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    C,
    Cxx,
}

impl Language {
    pub fn parse(s: &str) -> Result<Language> {
        match s.to_lowercase().as_str() {
            "c" => Ok(Language::C),
            "c++" | "cxx" | "cpp" => Ok(Language::Cxx),
            other => Err(Error::UnsupportedLanguage(other.to_string())),
        }
    }
}

/// The command-line fragments needed for each translation unit's compile
/// step: include paths (own + pkg-config), and whether to link `-pthread`.
pub struct CompileArgs {
    pub inc_dirs: String,
    pub pkg_inc_bits: String,
    pub posix_threads: bool,
}

/// The command-line fragments needed for a link step: library search paths,
/// static and shared library references, and `-pthread`.
pub struct LinkArgs {
    pub lib_dirs: String,
    pub static_libs: String,
    pub shared_libs: String,
    pub pkg_libs_bits: String,
    pub posix_threads: bool,
}

fn pkg_config_cmd(flag: &str, packages: &[String]) -> String {
    if packages.is_empty() {
        String::new()
    } else {
        format!("$(pkg-config {flag} {})", packages.join(" "))
    }
}

fn opt_str_list(options: &Options, key: &str) -> Result<Vec<String>> {
    Ok(options
        .opt_list(key)?
        .into_iter()
        .map(|v| v.to_string())
        .collect())
}

/// Builds the shared prefix for a compile/link command line: the compiler
/// invocation itself, warnings, debug level, optimization, kind flags, user
/// definitions, and any additional raw flags. `compile_only` adds `-c`.
pub fn build_command_prefix(options: &Options, compile_only: bool) -> Result<String> {
    let toolkit = Toolkit::parse(&options.opt_str("toolkit")?)?;
    let language = Language::parse(&options.opt_str("language")?)?;
    let version = options.opt_str("language_version")?;

    let (compiler, std_flag) = match (toolkit, language) {
        (Toolkit::Gnu, Language::Cxx) => ("g++", format!("-std=c++{version}")),
        (Toolkit::Gnu, Language::C) => ("gcc", format!("-std=c{version}")),
        (Toolkit::Clang, Language::Cxx) => ("clang++", format!("-std=c++{version}")),
        (Toolkit::Clang, Language::C) => ("clang", format!("-std=c{version}")),
        (Toolkit::VisualStudio, _) => {
            return Err(Error::UnsupportedToolkit("visualstudio command generation is not yet implemented".into()));
        }
    };

    let compile_flag = if compile_only { "-c " } else { "" };
    let warnings = opt_str_list(options, "gnuclang_warnings")?
        .iter()
        .map(|w| format!("-W{w} "))
        .collect::<String>();
    let debug_level = options.opt_str("debug_level")?;
    let optimization = options.opt_str("optimization")?;
    let kind_flags = opt_str_list(options, "kind_flags")?.join(" ");
    let definitions = opt_str_list(options, "definitions")?
        .iter()
        .map(|d| format!("-D{d} "))
        .collect::<String>();
    let additional_flags = opt_str_list(options, "additional_flags")?.concat();
    let pic = if options.opt_bool("relocatable_code").unwrap_or(false) { "-fPIC " } else { "" };

    Ok(format!(
        "{compiler} {std_flag} {warnings}{compile_flag}-g{debug_level} -O{optimization} {kind_flags}{definitions}{pic}{additional_flags} "
    ))
}

/// Builds the include-path and pkg-config fragments for a compile step.
pub fn compile_args(options: &Options) -> Result<CompileArgs> {
    let inc_dirs_opt = opt_str_list(options, "include_dirs")?;
    let project_anchor = options.opt_str("project_anchor")?;
    let pkg_configs = opt_str_list(options, "pkg_config")?;

    let inc_dirs = inc_dirs_opt
        .iter()
        .map(|inc| format!("-I{project_anchor}/{inc} "))
        .collect::<String>()
        + &pkg_config_cmd("--cflags-only-I", &pkg_configs);

    Ok(CompileArgs {
        inc_dirs,
        pkg_inc_bits: pkg_config_cmd("--cflags-only-other", &pkg_configs),
        posix_threads: options.opt_bool("posix_threads").unwrap_or(false),
    })
}

/// Builds the library-path, static/shared-library, and pkg-config
/// fragments for a link step, purely from the phase's own options.
pub fn link_args(options: &Options) -> Result<LinkArgs> {
    let lib_dirs_opt = opt_str_list(options, "lib_dirs")?;
    let static_libs_opt = opt_str_list(options, "libs")?;
    let shared_libs_opt = opt_str_list(options, "shared_libs")?;
    link_args_with(options, &lib_dirs_opt, &static_libs_opt, &shared_libs_opt)
}

/// Builds link-step fragments from explicit `lib_dirs`/`static_libs`/
/// `shared_libs` lists rather than reading them straight off the phase's own
/// options. A link phase uses this to merge its own declared entries with
/// what it discovered among its dependencies' published archive/shared
/// object outputs (see [`crate::phases::link_to_exe`]).
pub fn link_args_with(
    options: &Options,
    lib_dirs_opt: &[String],
    static_libs_opt: &[String],
    shared_libs_opt: &[String],
) -> Result<LinkArgs> {
    let pkg_configs = opt_str_list(options, "pkg_config")?;

    let lib_dirs = lib_dirs_opt.iter().map(|d| format!("-L{d} ")).collect::<String>()
        + &pkg_config_cmd("--libs-only-L", &pkg_configs);

    let mut static_libs = static_libs_opt.iter().map(|l| format!("-l{l} ")).collect::<String>()
        + &pkg_config_cmd("--libs-only-l", &pkg_configs);
    if !static_libs.is_empty() {
        static_libs = format!("-Wl,-Bstatic {static_libs}");
    }

    let mut shared_libs = shared_libs_opt.iter().map(|l| format!("-l{l} ")).collect::<String>();
    if !shared_libs.is_empty() {
        shared_libs = format!("-Wl,-Bdynamic {shared_libs} -Wl,-rpath,$ORIGIN -Wl,-z,origin");
    }

    Ok(LinkArgs {
        lib_dirs,
        static_libs,
        shared_libs,
        pkg_libs_bits: pkg_config_cmd("--libs-only-other", &pkg_configs),
        posix_threads: options.opt_bool("posix_threads").unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn base_options() -> Options {
        let mut opts = Options::new();
        opts.set_default("toolkit", Value::Str("gnu".into()));
        opts.set_default("language", Value::Str("c++".into()));
        opts.set_default("language_version", Value::Str("20".into()));
        opts.set_default("gnuclang_warnings", Value::List(vec![Value::Str("all".into())]));
        opts.set_default("debug_level", Value::Str("2".into()));
        opts.set_default("optimization", Value::Str("g".into()));
        opts.set_default("kind_flags", Value::List(vec![]));
        opts.set_default("definitions", Value::List(vec![]));
        opts.set_default("additional_flags", Value::List(vec![]));
        opts.set_default("include_dirs", Value::List(vec![Value::Str("include".into())]));
        opts.set_default("project_anchor", Value::Str(".".into()));
        opts.set_default("pkg_config", Value::List(vec![]));
        opts.set_default("posix_threads", Value::Bool(false));
        opts.set_default("lib_dirs", Value::List(vec![]));
        opts.set_default("libs", Value::List(vec![]));
        opts.set_default("shared_libs", Value::List(vec![]));
        opts
    }

    #[test]
    fn gnu_cxx_prefix_uses_g_plus_plus() {
        let opts = base_options();
        let prefix = build_command_prefix(&opts, true).unwrap();
        assert!(prefix.starts_with("g++ -std=c++20"));
        assert!(prefix.contains("-c"));
        assert!(prefix.contains("-Wall"));
    }

    #[test]
    fn clang_c_prefix_selects_clang_binary() {
        let mut opts = base_options();
        opts.push("toolkit", crate::value::OptionOp::Replace, Value::Str("clang".into()));
        opts.push("language", crate::value::OptionOp::Replace, Value::Str("c".into()));
        let prefix = build_command_prefix(&opts, false).unwrap();
        assert!(prefix.starts_with("clang -std=c20"));
    }

    #[test]
    fn unsupported_toolkit_is_an_error() {
        let mut opts = base_options();
        opts.push("toolkit", crate::value::OptionOp::Replace, Value::Str("borland".into()));
        assert!(build_command_prefix(&opts, false).is_err());
    }

    #[test]
    fn shared_libs_add_rpath_origin() {
        let mut opts = base_options();
        opts.push("shared_libs", crate::value::OptionOp::Append, Value::Str("foo".into()));
        let args = link_args(&opts).unwrap();
        assert!(args.shared_libs.contains("-rpath,$ORIGIN"));
    }

    #[test]
    fn no_shared_libs_means_no_rpath_flag() {
        let opts = base_options();
        let args = link_args(&opts).unwrap();
        assert!(args.shared_libs.is_empty());
    }

    #[test]
    fn relocatable_code_adds_fpic() {
        let mut opts = base_options();
        opts.push("relocatable_code", crate::value::OptionOp::Replace, Value::Bool(true));
        let prefix = build_command_prefix(&opts, true).unwrap();
        assert!(prefix.contains("-fPIC"));
    }
}
