//! Error taxonomy for loading and compiling resource definitions.
//!
//! - [`InputError`]: a source document could not be located or read.
//! - [`SchemaError`]: a document is malformed, or no version matches the
//!   selection criterion. Fatal for the resource.
//! - [`ConsistencyError`]: two resources of one batch disagree on a value
//!   they must share. Fatal for the whole batch.
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid glob pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("glob pattern matched no files: {0}")]
    NoMatch(String),

    #[error("failed to expand glob entry: {0}")]
    Glob(#[from] glob::GlobError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("malformed document {source_name} at {path}: {message}")]
    Malformed {
        source_name: String,
        path: String,
        message: String,
    },

    #[error("no CustomResourceDefinition found in {0}")]
    NoDefinition(String),

    #[error("could not find {} in CRD of kind {kind}", describe_wanted(.desired))]
    NoMatchingVersion {
        kind: String,
        desired: Option<String>,
    },

    #[error("version {version} of kind {kind} declares no openAPIV3Schema")]
    MissingSchema { kind: String, version: String },
}

fn describe_wanted(desired: &Option<String>) -> String {
    match desired {
        Some(version) => format!("storage version {version:?}"),
        None => "a storage version".to_string(),
    }
}

/// The value two resources of one batch disagree on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyField {
    Group,
    Version,
}

impl fmt::Display for ConsistencyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyField::Group => f.write_str("group"),
            ConsistencyField::Version => f.write_str("version"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("not all CRDs have the same {field}: {first_kind} has {first_value:?}, {second_kind} has {second_value:?}")]
    Mismatch {
        field: ConsistencyField,
        /// Kind that established the expected value.
        first_kind: String,
        first_value: String,
        second_kind: String,
        second_value: String,
    },

    /// A kind or list kind is declared by more than one CRD of the batch.
    #[error("type name {kind} is declared by more than one CRD")]
    DuplicateKind { kind: String },

    /// Two kinds that differ only by case would render to the same file.
    #[error("kinds {first_kind} and {second_kind} map to the same module {module}")]
    ModuleClash { first_kind: String, second_kind: String, module: String },
}

#[derive(Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
}
