//! Dynamic error values and source locations.
//!
//! Errors in the runtime are immutable values: once constructed they are
//! never mutated in place. A frame that catches an error without a location
//! attaches its own location by rebuilding the value via
//! [`DynamicError::with_location`], so an error never loses its origin while
//! it bubbles through the trampoline.

use std::fmt;
use thiserror::Error;

/// Source position of a compiled construct: stylesheet module id plus line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub module: u32,
    pub line: u32,
}

impl Location {
    pub const UNKNOWN: Location = Location { module: 0, line: 0 };

    pub fn new(module: u32, line: u32) -> Self {
        Location { module, line }
    }

    pub fn is_known(&self) -> bool {
        *self != Location::UNKNOWN
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module {} line {}", self.module, self.line)
    }
}

/// Broad classification of a dynamic failure. The kind decides how the
/// failure interacts with the host's recovery policy: only `Recoverable`
/// errors may be repaired and ignored; `Termination` bypasses recovery
/// entirely and unwinds to the run boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Policy-dependent: the host may repair the value and continue.
    Recoverable,
    /// Always aborts the current evaluation.
    Fatal,
    /// Circular definition detected via the bindery's busy flags.
    Circularity,
    /// Explicit terminate request; never caught by ordinary recovery.
    Termination,
}

/// A dynamic error with an attached error code and (once known) a source
/// location.
#[derive(Error, Debug, Clone, PartialEq)]
pub struct DynamicError {
    pub code: String,
    pub message: String,
    pub location: Option<Location>,
    pub kind: ErrorKind,
}

impl fmt::Display for DynamicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(f, "[{}] {} ({})", self.code, self.message, loc),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

impl DynamicError {
    pub fn new(
        kind: ErrorKind,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        DynamicError {
            code: code.into(),
            message: message.into(),
            location: None,
            kind,
        }
    }

    pub fn fatal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, code, message)
    }

    pub fn recoverable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Recoverable, code, message)
    }

    pub fn circularity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Circularity, codes::CIRCULAR_DEFINITION, message)
    }

    pub fn terminated(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Termination, code, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, codes::TYPE_MISMATCH, message)
    }

    /// Attaches a location if the error does not already carry one.
    pub fn with_location(mut self, location: Location) -> Self {
        if self.location.is_none() && location.is_known() {
            self.location = Some(location);
        }
        self
    }

    /// Re-classifies a recoverable error as fatal, keeping code and origin.
    /// Used when the host policy declines to recover.
    pub fn escalated(mut self) -> Self {
        if self.kind == ErrorKind::Recoverable {
            self.kind = ErrorKind::Fatal;
        }
        self
    }

    pub fn is_termination(&self) -> bool {
        self.kind == ErrorKind::Termination
    }

    pub fn is_circularity(&self) -> bool {
        self.kind == ErrorKind::Circularity
    }
}

/// Error codes used by the execution core. The W3C code style is kept so a
/// driver can map failures onto host-language diagnostics.
pub mod codes {
    /// Circular definition of a global variable or parameter.
    pub const CIRCULAR_DEFINITION: &str = "XTDE0640";
    /// A required stylesheet parameter was not supplied.
    pub const REQUIRED_GLOBAL_PARAM: &str = "XTDE0050";
    /// A supplied or default value does not match the required type.
    pub const PARAM_TYPE_MISMATCH: &str = "XTTE0570";
    /// A required template parameter was not supplied at the call site.
    pub const REQUIRED_LOCAL_PARAM: &str = "XTDE0700";
    /// apply-imports evaluated with no current template.
    pub const NO_CURRENT_TEMPLATE: &str = "XTDE0560";
    /// The context item is absent where one is required.
    pub const ABSENT_CONTEXT_ITEM: &str = "XPDY0002";
    /// Generic type mismatch during evaluation.
    pub const TYPE_MISMATCH: &str = "XPTY0004";
    /// Invalid computed attribute name.
    pub const BAD_ATTRIBUTE_NAME: &str = "XTDE0850";
    /// Invalid comment content (`--` or trailing `-`).
    pub const BAD_COMMENT_CONTENT: &str = "XTDE0940";
    /// Invalid processing-instruction target name.
    pub const BAD_PI_NAME: &str = "XTDE0890";
    /// Invalid processing-instruction content (`?>`).
    pub const BAD_PI_CONTENT: &str = "XTDE0900";
    /// xsl:message with terminate="yes".
    pub const TERMINATED: &str = "XTMM9000";
    /// Effective boolean value is undefined for the sequence.
    pub const NO_BOOLEAN_VALUE: &str = "FORG0006";
}
