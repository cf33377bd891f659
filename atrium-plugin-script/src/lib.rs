//! Sealed scripting engine for Atrium plugins.
//!
//! Plugin components arrive as source text in a small JavaScript-like
//! subset. This crate lexes, parses, and evaluates that text with a
//! tree-walking interpreter designed around one property: **the root
//! environment starts empty**. There is no global object, no prototype
//! chain, and no host ambient state; the only names a program can see are
//! the ones the embedder explicitly defines before running it.
//!
//! Guarantees:
//! - Name resolution is lexical and bottoms out at the sealed root; an
//!   uninjected name is a runtime error, never an implicit global.
//! - Execution is fuel-metered per statement and expression, so unbounded
//!   loops fail with [`ScriptError::FuelExhausted`] instead of hanging.
//! - Call depth is capped, so unbounded recursion fails with
//!   [`ScriptError::DepthExceeded`] instead of overflowing the stack.
//! - Every failure mode is a typed [`ScriptError`]; evaluation never panics
//!   on untrusted input.
//!
//! Language subset: `function` declarations and expressions, arrow
//! functions, `let`/`const`/`var` (all mutable), `if`/`else`, `while`,
//! `for`, `return`/`break`/`continue`/`throw`, one optional
//! `export default`, and the usual expression forms over numbers, strings,
//! booleans, null, lists, and maps. `new XxxError(msg)` builds an
//! error-shaped map; other constructors are rejected. There is no `this`,
//! no `try`/`catch`, and no template literals.

pub mod ast;
mod builtins;
mod env;
mod error;
mod interp;
mod parser;
mod token;
mod value;

pub use env::Env;
pub use error::ScriptError;
pub use interp::Interpreter;
pub use parser::parse;
pub use value::{NativeFn, NativeFunction, ScriptFunction, Value};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, ScriptError>;
