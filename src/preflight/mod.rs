//! Preflight checks for build validation.
//!
//! Validates that the host system has the toolchain binaries a build will
//! need before planning even starts. This turns a compile failure three
//! phases deep into an upfront, readable error.
//!
//! # Example
//!
//! ```rust
//! use pyke::preflight::{command_exists, check_required_tools};
//!
//! if !command_exists("cc") {
//!     println!("no C compiler found on PATH");
//! }
//!
//! let tools = &[("ar", "binutils"), ("pkg-config", "pkg-config")];
//! if let Err(e) = check_required_tools(tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use anyhow::{bail, Result};

/// Check if a command exists on the host system by searching `PATH`.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Toolchain binaries a C-family build graph commonly needs.
///
/// Each tuple is (command_name, package_name). `cc`/`gcc`/`clang` are
/// checked individually rather than assuming one toolkit; a phase only
/// needs the compiler it actually declares via its `toolkit` option.
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("ar", "binutils"),
    ("pkg-config", "pkg-config"),
    ("curl", "curl"),
];

/// Toolkit-specific compiler binaries, checked separately from
/// [`REQUIRED_TOOLS`] since a host only needs the one it's building with.
pub const TOOLKIT_COMPILERS: &[(&str, &[&str])] = &[
    ("gnu", &["gcc", "g++"]),
    ("clang", &["clang", "clang++"]),
];

/// Check that specific tools are available.
///
/// # Arguments
///
/// * `tools` - Slice of (command, package) tuples
///
/// # Returns
///
/// * `Ok(())` if all tools are found
/// * `Err` with list of missing tools and their packages
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let mut missing = Vec::new();

    for (tool, package) in tools {
        if !command_exists(tool) {
            missing.push((*tool, *package));
        }
    }

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} (install: {})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required host tools:\n{}", msg);
    }

    Ok(())
}

/// Check that the compiler binaries for `toolkit` (`"gnu"` or `"clang"`)
/// are present.
pub fn check_toolkit(toolkit: &str) -> Result<()> {
    let Some((_, binaries)) = TOOLKIT_COMPILERS.iter().find(|(name, _)| *name == toolkit) else {
        bail!("unknown toolkit \"{toolkit}\"");
    };
    let missing: Vec<&str> = binaries.iter().copied().filter(|b| !command_exists(b)).collect();
    if !missing.is_empty() {
        bail!("Missing {toolkit} compiler binaries: {}", missing.join(", "));
    }
    Ok(())
}

/// Check that all standard host tools are available.
///
/// This checks all tools in [`REQUIRED_TOOLS`].
pub fn check_host_tools() -> Result<()> {
    check_required_tools(REQUIRED_TOOLS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_exists() {
        assert!(command_exists("ls"));
        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn test_check_required_tools_success() {
        let tools = &[("ls", "coreutils"), ("cat", "coreutils")];
        assert!(check_required_tools(tools).is_ok());
    }

    #[test]
    fn test_check_required_tools_failure() {
        let tools = &[("nonexistent_command_xyz", "fake-package")];
        assert!(check_required_tools(tools).is_err());
    }

    #[test]
    fn test_check_toolkit_rejects_unknown_name() {
        assert!(check_toolkit("visualstudio").is_err());
    }
}
