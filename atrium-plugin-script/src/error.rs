//! Error type for lexing, parsing, and evaluation.

/// Errors produced by the script engine.
///
/// Everything an untrusted program can do wrong funnels into this enum; the
/// host maps it into its own taxonomy at the compile and render boundaries.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    #[error("parse error at line {line}: {message}")]
    Parse { line: u32, message: String },

    #[error("runtime error: {message}")]
    Runtime { message: String },

    /// A `throw` statement reached the top of the stack.
    #[error("uncaught throw: {message}")]
    Thrown { message: String },

    /// The program consumed its entire step budget.
    #[error("execution budget exhausted after {budget} steps")]
    FuelExhausted { budget: u64 },

    #[error("maximum call depth {max_depth} exceeded")]
    DepthExceeded { max_depth: usize },
}

impl ScriptError {
    pub(crate) fn runtime(message: impl Into<String>) -> Self {
        ScriptError::Runtime {
            message: message.into(),
        }
    }
}
