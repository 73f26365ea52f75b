// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fatal errors and recoverable warnings.
//!
//! A [`CompileError`] aborts the whole compile and no partial output is returned. A [`Warning`]
//! is recorded on the [`CompileContext`](crate::CompileContext), logged through `tracing`, and
//! the compiler continues with a safe default.

extern crate alloc;

use alloc::string::{String, ToString};

use thiserror::Error;

/// Errors that abort a compile.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The input document is not valid JSON for the expected shape.
    #[error("invalid specification: {0}")]
    InvalidSpec(String),
    /// A transform is missing a field it cannot work without.
    #[error("`{transform}` transform requires `{field}`")]
    MissingField {
        /// Transform kind, e.g. `lookup`.
        transform: &'static str,
        /// The absent property.
        field: &'static str,
    },
    /// A node kind that has no clone semantics was asked to clone.
    #[error("cannot clone {kind} node")]
    Uncloneable {
        /// Debug label of the node kind.
        kind: &'static str,
    },
}

impl From<serde_json::Error> for CompileError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidSpec(err.to_string())
    }
}

/// Recoverable defects found while building or optimizing the data flow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Warning {
    /// A transform entry could not be understood and was skipped.
    #[error("ignoring malformed transform #{index}: {reason}")]
    MalformedTransform {
        /// Position in the view's transform array.
        index: usize,
        /// Why it was rejected.
        reason: String,
    },
    /// A field definition used a type name that is not known.
    #[error("unknown field type `{found}` for field `{field}`, using `{fallback}`")]
    UnknownFieldType {
        /// Field being encoded.
        field: String,
        /// The type string found in the spec.
        found: String,
        /// Type used instead.
        fallback: &'static str,
    },
    /// A field was requested to be parsed as two different types on one path.
    #[error("field `{field}` is already parsed as `{existing}`, ignoring parse as `{requested}`")]
    ConflictingParse {
        /// The field.
        field: String,
        /// Parse that was requested and skipped.
        requested: String,
        /// Parse already applied upstream.
        existing: String,
    },
    /// A parse type string is not recognized.
    #[error("unrecognized parse `{parse}` for field `{field}`")]
    UnrecognizedParse {
        /// The field.
        field: String,
        /// The unknown parse string.
        parse: String,
    },
    /// A predicate or lookup refers to a selection parameter no view declares.
    #[error("cannot find a selection named `{param}`")]
    UnresolvedSelection {
        /// Parameter name.
        param: String,
    },
    /// A time unit name is not recognized.
    #[error("unknown time unit `{unit}`")]
    UnknownTimeUnit {
        /// The unit string.
        unit: String,
    },
    /// A lookup without `from.fields` needs an `as` name for the whole record.
    #[error("lookup of `{lookup}` has no `fields`, so `as` must name the record")]
    LookupNeedsAs {
        /// The lookup field.
        lookup: String,
    },
    /// A child was attached twice to the same parent.
    #[error("attempt to add the same child twice")]
    DuplicateChild,
    /// Parent/child links are inconsistent.
    #[error("inconsistent data flow links: {detail}")]
    InconsistentTree {
        /// What the link check found.
        detail: String,
    },
    /// The optimizer stopped at its iteration cap before reaching a fixpoint.
    #[error("maximum optimization runs ({runs}) reached")]
    OptimizerCapReached {
        /// The cap that was hit.
        runs: usize,
    },
}
