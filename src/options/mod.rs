//! The options store: layered, typed, interpolated per-phase configuration.

pub mod grammar;

use std::collections::{BTreeMap, HashSet};

use crate::errors::{Error, Result};
use crate::value::{apply_op, OptionOp, Value, ValueKey};

/// One override entry in an option's history: the value pushed, and the
/// operator used to fold it onto whatever came before.
#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    op: OptionOp,
}

/// A single named option: its full override history, bottom entry always
/// `REPLACE`.
#[derive(Debug, Clone)]
struct StoredOption {
    entries: Vec<Entry>,
}

impl StoredOption {
    fn new(value: Value) -> Self {
        StoredOption {
            entries: vec![Entry { value, op: OptionOp::Replace }],
        }
    }
}

/// Layered configuration for one phase. Keys map to a stack of
/// `(value, operator)` overrides; [`Options::get`] interpolates and folds
/// the stack into a single resolved [`Value`].
#[derive(Debug, Clone, Default)]
pub struct Options {
    opts: BTreeMap<String, StoredOption>,
}

impl Options {
    pub fn new() -> Self {
        Options::default()
    }

    /// Pushes a default (`REPLACE`) value for `key` if the key does not yet
    /// exist, or pushes a plain `REPLACE` override if it does. Phase
    /// constructors use this to establish their baseline option set.
    pub fn set_default(&mut self, key: impl Into<String>, value: Value) {
        self.push(key, OptionOp::Replace, value);
    }

    /// Pushes an override entry for `key`, creating the option (with this
    /// as its sole `REPLACE` entry) if it doesn't exist yet.
    pub fn push(&mut self, key: impl Into<String>, op: OptionOp, value: Value) {
        let key = key.into();
        match self.opts.get_mut(&key) {
            Some(opt) => opt.entries.push(Entry { value, op }),
            None => {
                self.opts.insert(key, StoredOption::new(value));
            }
        }
    }

    /// Pops the most recent override for `key`. A no-op if the key is
    /// absent or only has its original default left.
    pub fn pop(&mut self, key: &str) {
        if let Some(opt) = self.opts.get_mut(key) {
            if opt.entries.len() > 1 {
                opt.entries.pop();
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.opts.keys().map(String::as_str)
    }

    /// Renders every key's override stack alongside its resolved value, one
    /// block per key, matching `do_action_report`'s listing: each prior
    /// override shown un-interpolated with its operator, then the final
    /// interpolated value on its own line.
    pub fn report(&self) -> String {
        let mut out = String::new();
        for (key, opt) in &self.opts {
            out.push_str(key);
            out.push_str(":\n");
            for entry in &opt.entries {
                out.push_str(&format!("  {} {}\n", entry.op.symbol(), entry.value));
            }
            let resolved = self.get(key).unwrap_or_else(|_| Value::Str(format!("!{key}!")));
            out.push_str(&format!("  -> {resolved}\n"));
        }
        out
    }

    pub fn contains(&self, key: &str) -> bool {
        self.opts.contains_key(key)
    }

    /// Resolves `key` to its fully interpolated, folded value. Returns
    /// `Value::Str("!key!")` if the key has never been set, matching the
    /// documented undefined-key sentinel.
    pub fn get(&self, key: &str) -> Result<Value> {
        let mut visiting = HashSet::new();
        self.get_with_visiting(key, &mut visiting)
    }

    fn get_with_visiting(&self, key: &str, visiting: &mut HashSet<String>) -> Result<Value> {
        let Some(opt) = self.opts.get(key) else {
            return Ok(Value::Str(format!("!{key}!")));
        };

        let mut computed = self.interpolate(&opt.entries[0].value, visiting)?;
        for entry in &opt.entries[1..] {
            let rhs = self.interpolate(&entry.value, visiting)?;
            computed = apply_op(computed, rhs, entry.op)?;
        }
        Ok(computed)
    }

    fn interpolate(&self, value: &Value, visiting: &mut HashSet<String>) -> Result<Value> {
        Ok(match value {
            Value::Str(s) => self.interpolate_str(s, visiting)?,
            Value::List(items) => Value::List(self.interpolate_each(items, visiting)?),
            Value::Tuple(items) => Value::Tuple(self.interpolate_each(items, visiting)?),
            Value::Set(set) => {
                let mut out = crate::value::ValueSet::new();
                for key in set.iter() {
                    let v = self.interpolate(&key.to_value(), visiting)?;
                    out.insert(ValueKey::from_value(&v)?);
                }
                Value::Set(out)
            }
            Value::Map(map) => {
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    let rk = self.interpolate(&k.to_value(), visiting)?;
                    let rv = self.interpolate(v, visiting)?;
                    out.insert(ValueKey::from_value(&rk)?, rv);
                }
                Value::Map(out)
            }
            other => other.clone(),
        })
    }

    fn interpolate_each(&self, items: &[Value], visiting: &mut HashSet<String>) -> Result<Vec<Value>> {
        items.iter().map(|v| self.interpolate(v, visiting)).collect()
    }

    /// Replaces every `{subkey}` occurrence in `s`. If the entire string is
    /// exactly one `{subkey}` reference, the substituted value's type is
    /// preserved rather than stringified.
    fn interpolate_str(&self, s: &str, visiting: &mut HashSet<String>) -> Result<Value> {
        let Some((start, end, subkey)) = find_interp_ref(s) else {
            return Ok(Value::Str(s.to_string()));
        };

        if !visiting.insert(subkey.clone()) {
            return Err(Error::InvalidOptionValue(format!(
                "interpolation cycle detected at {{{subkey}}}"
            )));
        }
        let resolved = self.get_with_visiting(&subkey, visiting);
        visiting.remove(&subkey);
        let resolved = resolved?;

        if start == 0 && end == s.len() {
            return Ok(resolved);
        }

        let mut spliced = String::with_capacity(s.len());
        spliced.push_str(&s[..start]);
        spliced.push_str(&resolved.to_string());
        spliced.push_str(&s[end..]);
        self.interpolate_str(&spliced, visiting)
    }

    pub fn clone_for_prototype(&self) -> Options {
        self.clone()
    }

    // --- typed accessors ---

    pub fn opt_bool(&self, key: &str) -> Result<bool> {
        match self.get(key)? {
            Value::Bool(b) => Ok(b),
            other => Err(Error::InvalidOptionKey(format!("{key} is not a bool ({other})"))),
        }
    }

    pub fn opt_int(&self, key: &str) -> Result<i64> {
        match self.get(key)? {
            Value::Int(i) => Ok(i),
            other => Err(Error::InvalidOptionKey(format!("{key} is not an int ({other})"))),
        }
    }

    pub fn opt_float(&self, key: &str) -> Result<f64> {
        match self.get(key)? {
            Value::Float(f) => Ok(f),
            other => Err(Error::InvalidOptionKey(format!("{key} is not a float ({other})"))),
        }
    }

    pub fn opt_str(&self, key: &str) -> Result<String> {
        match self.get(key)? {
            Value::Str(s) => Ok(s),
            other => Err(Error::InvalidOptionKey(format!("{key} is not a string ({other})"))),
        }
    }

    pub fn opt_list(&self, key: &str) -> Result<Vec<Value>> {
        match self.get(key)? {
            Value::List(items) => Ok(items),
            other => Err(Error::InvalidOptionKey(format!("{key} is not a list ({other})"))),
        }
    }

    pub fn opt_tuple(&self, key: &str) -> Result<Vec<Value>> {
        match self.get(key)? {
            Value::Tuple(items) => Ok(items),
            other => Err(Error::InvalidOptionKey(format!("{key} is not a tuple ({other})"))),
        }
    }

    pub fn opt_set(&self, key: &str) -> Result<crate::value::ValueSet> {
        match self.get(key)? {
            Value::Set(set) => Ok(set),
            other => Err(Error::InvalidOptionKey(format!("{key} is not a set ({other})"))),
        }
    }

    pub fn opt_dict(&self, key: &str) -> Result<BTreeMap<ValueKey, Value>> {
        match self.get(key)? {
            Value::Map(map) => Ok(map),
            other => Err(Error::InvalidOptionKey(format!("{key} is not a map ({other})"))),
        }
    }
}

/// Finds the first `{subkey}` reference in `s`, returning its byte span and
/// the subkey name.
fn find_interp_ref(s: &str) -> Option<(usize, usize, String)> {
    let start = s.find('{')?;
    let rest = &s[start + 1..];
    let end_rel = rest.find('}')?;
    let subkey = &rest[..end_rel];
    if subkey.is_empty() || !subkey.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    Some((start, start + 2 + end_rel, subkey.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_undefined_key_returns_sentinel() {
        let opts = Options::new();
        assert_eq!(opts.get("missing").unwrap(), Value::Str("!missing!".into()));
    }

    #[test]
    fn replace_then_add_folds_left_to_right() {
        let mut opts = Options::new();
        opts.set_default("count", Value::Int(1));
        opts.push("count", OptionOp::Add, Value::Int(2));
        assert_eq!(opts.get("count").unwrap(), Value::Int(3));
    }

    #[test]
    fn push_pop_restores_previous_value() {
        let mut opts = Options::new();
        opts.set_default("kind", Value::Str("release".into()));
        let before = opts.get("kind").unwrap();
        opts.push("kind", OptionOp::Replace, Value::Str("debug".into()));
        assert_eq!(opts.get("kind").unwrap(), Value::Str("debug".into()));
        opts.pop("kind");
        assert_eq!(opts.get("kind").unwrap(), before);
    }

    #[test]
    fn interpolation_preserves_type_for_whole_string_reference() {
        let mut opts = Options::new();
        opts.set_default("count", Value::Int(5));
        opts.set_default("alias", Value::Str("{count}".into()));
        assert_eq!(opts.get("alias").unwrap(), Value::Int(5));
    }

    #[test]
    fn interpolation_stringifies_partial_reference() {
        let mut opts = Options::new();
        opts.set_default("name", Value::Str("demo".into()));
        opts.set_default("path", Value::Str("build/{name}/bin".into()));
        assert_eq!(opts.get("path").unwrap(), Value::Str("build/demo/bin".into()));
    }

    #[test]
    fn interpolation_descends_into_list_elements() {
        let mut opts = Options::new();
        opts.set_default("n", Value::Int(3));
        opts.set_default(
            "list_of_int",
            Value::List(vec![Value::Str("{n}".into())]),
        );
        assert_eq!(
            opts.get("list_of_int").unwrap(),
            Value::List(vec![Value::Int(3)])
        );
    }

    #[test]
    fn interpolation_cycle_is_detected() {
        let mut opts = Options::new();
        opts.set_default("a", Value::Str("{b}".into()));
        opts.set_default("b", Value::Str("{a}".into()));
        assert!(opts.get("a").is_err());
    }

    #[test]
    fn interpolation_is_a_fixpoint_when_acyclic() {
        let mut opts = Options::new();
        opts.set_default("leaf", Value::Int(42));
        opts.set_default("mid", Value::Str("{leaf}".into()));
        opts.set_default("top", Value::Str("{mid}".into()));
        let first = opts.get("top").unwrap();
        let second = opts.get("top").unwrap();
        assert_eq!(first, second);
        assert_eq!(first, Value::Int(42));
    }

    #[test]
    fn typed_accessor_mismatch_is_an_error() {
        let mut opts = Options::new();
        opts.set_default("name", Value::Str("demo".into()));
        assert!(opts.opt_int("name").is_err());
    }

    #[test]
    fn clone_diverges_independently() {
        let mut proto = Options::new();
        proto.set_default("sources", Value::List(vec![Value::Str("a.c".into())]));
        let cloned = proto.clone_for_prototype();
        proto.push(
            "sources",
            OptionOp::Append,
            Value::Str("b.c".into()),
        );
        assert_eq!(
            cloned.get("sources").unwrap(),
            Value::List(vec![Value::Str("a.c".into())])
        );
        assert_eq!(
            proto.get("sources").unwrap(),
            Value::List(vec![Value::Str("a.c".into()), Value::Str("b.c".into())])
        );
    }
}
