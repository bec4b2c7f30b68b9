//! Layered JSON configuration (`pyke-config.json`): argument/action aliases
//! and default invocation arguments, loaded before CLI dispatch.
//!
//! Grounded on `Configurator` in `config.py`. The original is a class with
//! mutable class-level state, accumulated across however many
//! `load_from_*`/`load_config_file` calls a process makes; this keeps the
//! same accumulate-into-self shape as a plain struct instead, since Rust has
//! no equivalent of freely mutable class attributes. The on-disk shape is
//! deserialized through a typed `RawConfig`, the way `pipeline/config.rs`
//! deserializes stage config through `S01BootToml`, rather than walked by
//! hand as untyped `serde_json::Value`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::{Error, Result};

/// The embedded default configuration, compiled into the binary. Empty by
/// default; a distributor can ship a non-empty one by editing this file.
pub const DEFAULT_CONFIG: &str = "{}";

/// Accumulated configuration state, built by loading JSON documents in
/// order: embedded default, user home, make-file directory.
#[derive(Debug, Default, Clone)]
pub struct Config {
    pub loaded_configs: Vec<PathBuf>,
    pub argument_aliases: BTreeMap<String, Vec<String>>,
    pub action_aliases: BTreeMap<String, Vec<String>>,
    pub default_action: String,
    pub default_arguments: Vec<String>,
    pub cache_makefile_module: bool,
}

/// The on-disk shape of one `pyke-config.json` document.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    include: Option<StringOrList>,
    #[serde(default)]
    argument_aliases: BTreeMap<String, StringOrList>,
    #[serde(default)]
    action_aliases: BTreeMap<String, StringOrList>,
    default_action: Option<String>,
    #[serde(default)]
    default_arguments: Vec<String>,
    cache_makefile_module: Option<bool>,
}

/// Several config keys accept either a bare string or a list of strings
/// (`"include": "base.json"` vs `"include": ["a.json", "b.json"]`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    fn into_vec(self) -> Vec<String> {
        match self {
            StringOrList::One(s) => vec![s],
            StringOrList::Many(v) => v,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }

    /// Loads the embedded default configuration.
    pub fn load_default(&mut self) -> Result<()> {
        self.process_config(None, DEFAULT_CONFIG)
    }

    /// Loads `~/.config/pyke/pyke-config.json`, if it exists.
    pub fn load_from_home(&mut self) -> Result<()> {
        let Some(home) = dirs::home_dir() else { return Ok(()) };
        let file = home.join(".config").join("pyke").join("pyke-config.json");
        self.load_config_file(&file)
    }

    /// Loads `<make_dir>/pyke-config.json`, if it exists.
    pub fn load_from_makefile_dir(&mut self, make_dir: &Path) -> Result<()> {
        self.load_config_file(&make_dir.join("pyke-config.json"))
    }

    /// Loads one config file, skipping it silently if already loaded or
    /// absent. Propagates [`Error::MalformedConfig`] if its shape is wrong.
    pub fn load_config_file(&mut self, file: &Path) -> Result<()> {
        if self.loaded_configs.iter().any(|p| p == file) {
            return Ok(());
        }
        if !file.exists() {
            return Ok(());
        }
        self.loaded_configs.push(file.to_path_buf());

        let text = std::fs::read_to_string(file).map_err(|e| Error::MalformedConfig {
            path: file.display().to_string(),
            detail: e.to_string(),
        })?;
        self.process_config(Some(file), &text)
    }

    fn process_config(&mut self, path: Option<&Path>, text: &str) -> Result<()> {
        let malformed = |detail: String| Error::MalformedConfig {
            path: path.map(|p| p.display().to_string()).unwrap_or_default(),
            detail,
        };

        let raw: RawConfig = serde_json::from_str(text).map_err(|e| malformed(e.to_string()))?;

        if let Some(includes) = raw.include {
            for inc in includes.into_vec() {
                let inc_path = if let Some(base) = path.and_then(Path::parent) {
                    if Path::new(&inc).is_absolute() {
                        PathBuf::from(inc)
                    } else {
                        base.join(inc)
                    }
                } else {
                    PathBuf::from(inc)
                };
                self.load_config_file(&inc_path)?;
            }
        }

        for (alias, values) in raw.argument_aliases {
            self.argument_aliases.insert(alias, values.into_vec());
        }
        for (alias, values) in raw.action_aliases {
            self.action_aliases.insert(alias, values.into_vec());
        }
        if let Some(default_action) = raw.default_action {
            self.default_action = default_action;
        }
        self.default_arguments.extend(raw.default_arguments);
        if let Some(cache) = raw.cache_makefile_module {
            self.cache_makefile_module = cache;
        }

        Ok(())
    }

    /// Expands `token` through [`Config::argument_aliases`] recursively,
    /// guarding against a self-referential alias by tracking visited names.
    pub fn expand_argument_alias(&self, token: &str) -> Vec<String> {
        let mut visited = std::collections::HashSet::new();
        self.expand_alias(&self.argument_aliases, token, &mut visited)
    }

    /// Expands `token` through [`Config::action_aliases`] recursively.
    pub fn expand_action_alias(&self, token: &str) -> Vec<String> {
        let mut visited = std::collections::HashSet::new();
        self.expand_alias(&self.action_aliases, token, &mut visited)
    }

    fn expand_alias(
        &self,
        aliases: &BTreeMap<String, Vec<String>>,
        token: &str,
        visited: &mut std::collections::HashSet<String>,
    ) -> Vec<String> {
        let Some(expansion) = aliases.get(token) else {
            return vec![token.to_string()];
        };
        if !visited.insert(token.to_string()) {
            return vec![token.to_string()];
        }
        expansion.iter().flat_map(|t| self.expand_alias(aliases, t, visited)).collect()
    }

    /// Renders the currently loaded configuration, for `-h`/diagnostic
    /// output.
    pub fn report(&self) -> String {
        let mut report = String::from("Loaded configuration files:\n");
        for file in &self.loaded_configs {
            report.push_str(&format!("    {}\n", file.display()));
        }
        report.push_str("Argument aliases:\n");
        for (k, v) in &self.argument_aliases {
            report.push_str(&format!("    {k}:\n"));
            for i in v {
                report.push_str(&format!("        {i}\n"));
            }
        }
        report.push_str("Action aliases:\n");
        for (k, v) in &self.action_aliases {
            report.push_str(&format!("    {k}:\n"));
            for i in v {
                report.push_str(&format!("        {i}\n"));
            }
        }
        report.push_str(&format!("Default action: {}\nDefault arguments:\n", self.default_action));
        for arg in &self.default_arguments {
            report.push_str(&format!("    {arg}\n"));
        }
        report.push_str(&format!("Caching makefile modules: {}\n", self.cache_makefile_module));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn loads_argument_aliases_from_a_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("pyke-config.json");
        std::fs::write(&file, r#"{"argument_aliases": {"-r": ["-o", "kind:release"]}}"#).unwrap();

        let mut config = Config::new();
        config.load_config_file(&file).unwrap();
        assert_eq!(config.argument_aliases.get("-r").unwrap(), &vec!["-o".to_string(), "kind:release".to_string()]);
    }

    #[test]
    fn non_object_config_is_malformed() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("pyke-config.json");
        std::fs::write(&file, "[1, 2, 3]").unwrap();

        let mut config = Config::new();
        assert!(config.load_config_file(&file).is_err());
    }

    #[test]
    fn unknown_top_level_key_is_malformed() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("pyke-config.json");
        std::fs::write(&file, r#"{"not_a_real_key": true}"#).unwrap();

        let mut config = Config::new();
        assert!(config.load_config_file(&file).is_err());
    }

    #[test]
    fn include_is_resolved_relative_to_including_file_and_loaded_once() {
        let dir = TempDir::new().unwrap();
        let included = dir.path().join("base.json");
        std::fs::write(&included, r#"{"default_action": "build"}"#).unwrap();
        let main = dir.path().join("pyke-config.json");
        std::fs::write(&main, r#"{"include": ["base.json", "base.json"]}"#).unwrap();

        let mut config = Config::new();
        config.load_config_file(&main).unwrap();
        assert_eq!(config.default_action, "build");
        assert_eq!(config.loaded_configs.len(), 2);
    }

    #[test]
    fn bare_string_include_is_accepted_alongside_list_form() {
        let dir = TempDir::new().unwrap();
        let included = dir.path().join("base.json");
        std::fs::write(&included, r#"{"cache_makefile_module": true}"#).unwrap();
        let main = dir.path().join("pyke-config.json");
        std::fs::write(&main, r#"{"include": "base.json"}"#).unwrap();

        let mut config = Config::new();
        config.load_config_file(&main).unwrap();
        assert!(config.cache_makefile_module);
    }

    #[test]
    fn argument_alias_expansion_is_recursive_and_guards_self_reference() {
        let mut config = Config::new();
        config.argument_aliases.insert("-r".to_string(), vec!["-o".to_string(), "kind:release".to_string()]);
        config.argument_aliases.insert("-rr".to_string(), vec!["-r".to_string()]);
        config.argument_aliases.insert("loop".to_string(), vec!["loop".to_string()]);

        assert_eq!(config.expand_argument_alias("-rr"), vec!["-o".to_string(), "kind:release".to_string()]);
        assert_eq!(config.expand_argument_alias("loop"), vec!["loop".to_string()]);
    }

    #[test]
    fn loading_the_same_file_twice_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("pyke-config.json");
        std::fs::write(&file, r#"{"default_arguments": ["build"]}"#).unwrap();

        let mut config = Config::new();
        config.load_config_file(&file).unwrap();
        config.load_config_file(&file).unwrap();
        assert_eq!(config.default_arguments, vec!["build".to_string()]);
    }
}
