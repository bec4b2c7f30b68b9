//! Typed error taxonomy for the options, grammar, and phase-graph layers.
//!
//! These are distinct from the step-level [`crate::step::ResultCode`]: a
//! `ResultCode` describes the outcome of a completed unit of *build* work,
//! while [`Error`] describes a failure to construct or resolve a value at
//! all (a malformed override, a cyclic dependency, an unreadable config).
//! Application call sites wrap these in `anyhow::Context` to attach the
//! specific path or key involved.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("operator {op:?} is not valid for a value of this type: {detail}")]
    InvalidOptionOperation { op: String, detail: String },

    #[error("could not parse option value: {0}")]
    InvalidOptionValue(String),

    #[error("option {0:?} is not defined for this phase")]
    InvalidOptionKey(String),

    #[error("adding dependency would create a cycle: {from:?} already reaches {to:?}")]
    CircularDependency { from: String, to: String },

    #[error("malformed config file {path:?}: {detail}")]
    MalformedConfig { path: String, detail: String },

    #[error("unsupported toolkit: {0:?}")]
    UnsupportedToolkit(String),

    #[error("unsupported language: {0:?}")]
    UnsupportedLanguage(String),

    #[error("no phase named {0:?}")]
    PhaseNotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
