//! Error types for the iteration-tree engine.
//!
//! This module defines all error types used throughout the crate,
//! organized by the layer that produces them: tree queries and grafts,
//! transformation construction and verification, canonical string parsing,
//! and the external legality oracle.

use thiserror::Error;
use std::fmt;

/// Top-level error type for the engine.
#[derive(Error, Debug)]
pub enum LoopTreeError {
    /// Error raised by a tree query or graft
    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    /// Error raised while building, verifying or applying a transformation
    #[error("Transformation error: {0}")]
    Transform(#[from] TransformError),

    /// Error while parsing a canonical schedule string
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Error raised by a schedule operation
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// The external oracle failed
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),
}

/// Error raised by iteration tree queries, grafts and validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// No iterator with this name exists
    #[error("unknown iterator `{0}`")]
    UnknownIterator(String),

    /// No computation with this name exists
    #[error("unknown computation `{0}`")]
    UnknownComputation(String),

    /// The computation is not nested deep enough for the requested level
    #[error("computation `{comp}` has no enclosing iterator at level {level}")]
    LevelOutOfRange {
        /// Computation used as the anchor
        comp: String,
        /// Requested level
        level: usize,
    },

    /// A graft or build would introduce a second node or statement with this name
    #[error("name `{0}` already exists in the tree")]
    DuplicateName(String),

    /// A structural invariant does not hold
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

/// Error during transformation construction, verification or mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct TransformError {
    /// The error message
    pub message: String,
    /// The kind of transformation error
    pub kind: TransformErrorKind,
    /// The transformation that failed
    pub transform: String,
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.message, self.transform)
    }
}

/// Why a transformation was refused or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformErrorKind {
    /// Wrong arity or invalid constructor argument; never retried
    MalformedParameters,
    /// Structurally illegal request; the caller discards the candidate
    CannotApply,
    /// The tree mutation failed after verification passed
    Internal,
}

impl TransformError {
    /// Create a malformed-parameters error.
    pub fn malformed(transform: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: TransformErrorKind::MalformedParameters,
            transform: transform.to_string(),
        }
    }

    /// Create a precondition-violation error.
    pub fn cannot_apply(transform: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: TransformErrorKind::CannotApply,
            transform: transform.to_string(),
        }
    }

    /// Create an internal error (a defect, not a user error).
    pub fn internal(transform: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: TransformErrorKind::Internal,
            transform: transform.to_string(),
        }
    }

    /// Whether a search procedure may simply discard the candidate and continue.
    pub fn is_recoverable(&self) -> bool {
        self.kind == TransformErrorKind::CannotApply
    }
}

/// Error while parsing a canonical schedule string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// The error message
    pub message: String,
    /// Byte offset into the input
    pub offset: usize,
    /// The kind of parse error
    pub kind: ParseErrorKind,
    /// Expected tokens (if applicable)
    pub expected: Vec<String>,
    /// What was found
    pub found: Option<String>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.message, self.offset)?;
        if !self.expected.is_empty() {
            write!(f, " (expected: {})", self.expected.join(", "))?;
        }
        if let Some(ref found) = self.found {
            write!(f, " (found: {})", found)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Character that cannot start any token
    UnexpectedChar,
    /// Unexpected token
    UnexpectedToken,
    /// Expected a specific token
    ExpectedToken,
    /// Token tag is not a known transformation
    UnknownTransformation,
    /// Integer literal out of range
    InvalidNumber,
    /// Unterminated quoted name
    UnterminatedString,
    /// Arguments do not fit the transformation kind
    InvalidArguments,
    /// Unexpected end of input
    UnexpectedEof,
}

impl ParseError {
    /// Create a parse error at the given offset.
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
            kind,
            expected: Vec::new(),
            found: None,
        }
    }

    /// Add an expected token description.
    pub fn expecting(mut self, expected: impl Into<String>) -> Self {
        self.expected.push(expected.into());
        self
    }

    /// Record what was found instead.
    pub fn with_found(mut self, found: impl Into<String>) -> Self {
        self.found = Some(found.into());
        self
    }
}

/// Error raised by schedule operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The canonical string could not be parsed
    #[error("{0}")]
    Parse(#[from] ParseError),

    /// A transformation could not be rebuilt or applied
    #[error("{0}")]
    Transform(#[from] TransformError),
}

/// Failure of the external legality/execution oracle.
///
/// Never interpreted as an illegal schedule.
#[derive(Error, Debug)]
pub enum OracleError {
    /// The oracle call errored or returned no usable output
    #[error("execution crashed for schedule `{schedule}`: {cause}")]
    ExecutionCrashed {
        /// Canonical string of the offending schedule
        schedule: String,
        /// Underlying failure reported by the oracle
        cause: anyhow::Error,
    },
}

/// Result type using LoopTreeError.
pub type LoopTreeResult<T> = Result<T, LoopTreeError>;
