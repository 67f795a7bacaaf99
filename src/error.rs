//! Centralised error hierarchy for the **Ember interpreter**.
//!
//! All subsystems (scanner, parser, resolver, runtime, CLI) must convert their
//! internal failure modes into one of the variants defined here.  This enables a
//! uniform `Result<T>` alias throughout the crate and ergonomic inter‑operation
//! with `anyhow`, while still preserving rich diagnostic detail.
//!
//! The module **does not** print diagnostics itself.

use std::io;
use thiserror::Error;

use log::info;

/// Classifies a runtime failure so callers (tests, embedders, the REPL) can
/// react to the category without parsing the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    /// Operator applied to operand(s) of the wrong kind.
    Type,

    /// Call-site argument count does not match the callee's arity.
    Arity,

    /// Attempt to call a value that is neither a function nor a class.
    NotCallable,

    /// Read of / assignment to a name absent from every reachable frame.
    UndefinedVariable,

    /// Read of a missing field, method, or superclass method.
    UndefinedProperty,

    /// `class X < E` where `E` did not evaluate to a class.
    InvalidSuperclass,
}

/// Canonical error type used throughout the interpreter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EmberError {
    /// Lexical (scanner) error with source line information.
    #[error("[line {line}] Error: {message}")]
    Lex {
        /// Human‑readable description.
        message: String,

        /// 1‑based line where the error occurred.
        line: usize,
    },

    /// Syntactic (parser) error.
    #[error("[line {line}] Error: {message}")]
    Parse { message: String, line: usize },

    /// Static‑analysis or resolution failure (e.g. early‑binding errors).
    #[error("[line {line}] Error: {message}")]
    Resolve { message: String, line: usize },

    /// Runtime evaluation error, tagged with its category and the line of the
    /// offending source token.
    #[error("{message}\n[line {line}]")]
    Runtime {
        kind: RuntimeErrorKind,
        message: String,
        line: usize,
    },

    /// Wrapper around `std::io::Error` (transparent).  Enables `?` on I/O ops.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// UTF‑8 decoding failure when ingesting external text.
    #[error(transparent)]
    Utf8(#[from] std::str::Utf8Error),
}

impl EmberError {
    /// Helper constructor for the **scanner**.
    pub fn lex<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Lex error: line={}, msg={}", line, message);

        EmberError::Lex { message, line }
    }

    /// Helper constructor for the **parser**.
    pub fn parse<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Parse error: line={}, msg={}", line, message);

        EmberError::Parse { message, line }
    }

    /// Helper constructor for the **resolver**.
    pub fn resolve<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Resolve error: line={}, msg={}", line, message);

        EmberError::Resolve { message, line }
    }

    /// Helper constructor for the **evaluator**.
    pub fn runtime<S: Into<String>>(kind: RuntimeErrorKind, line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!(
            "Creating Runtime error: kind={:?}, line={}, msg={}",
            kind, line, message
        );

        EmberError::Runtime {
            kind,
            message,
            line,
        }
    }

    /// The runtime category of this error, if it is a runtime error.
    pub fn runtime_kind(&self) -> Option<RuntimeErrorKind> {
        match self {
            EmberError::Runtime { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Crate‑wide `Result` alias.
pub type Result<T> = std::result::Result<T, EmberError>;
