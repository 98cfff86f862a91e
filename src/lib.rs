//! HiveSpeak - a small Lisp for cells that talk
//!
//! This crate provides the lexer, parser and tree-walking evaluator for
//! HiveSpeak. Programs mix ordinary functional constructs with a handful of
//! primitives modeling independent cells that exchange messages and can be
//! merged and compressed into content-hashed consensus packets.
//!
//! ```text
//! (def (make-adder n) (fn [x] (+ x n)))
//! (def add5 (make-adder 5))
//! (add5 10)                                 ; 15
//!
//! (loop [i 0 acc 0]
//!   (if (< i 5) (recur (+ i 1) (+ acc i)) acc))   ; 10
//!
//! (def a (cell {:x 1}))
//! (def b (cell {:x 1}))
//! (compress (merge [a b]))                  ; {:ok <packet ...>}
//! ```
//!
//! ## Truthiness
//!
//! `N`, `F`, `0`, `0.0`, `""`, `[]` and `{}` are falsy. Everything else,
//! including negative numbers and whitespace strings, is truthy.
//!
//! ## Modules
//!
//! - `lexer`: source text to located tokens
//! - `parser`: tokens to AST nodes
//! - `ast`: AST node model
//! - `value`: runtime values and their display format
//! - `quote`: conversion between AST nodes and runtime data
//! - `evaluator`: environments, special forms, hive primitives and modules
//! - `builtinops`: the registry of builtin functions and special forms

use std::fmt;

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod quote;
pub mod value;

pub use evaluator::{EvalConfig, Interpreter, default_environment};
pub use parser::{parse, parse_source};
pub use value::Value;

/// Maximum parsing depth to prevent stack overflow on deeply nested input
pub const MAX_PARSE_DEPTH: usize = 256;

/// Default maximum evaluation depth, see [`EvalConfig`]
pub const MAX_EVAL_DEPTH: usize = 256;

/// A position in source text. Lines and columns are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Loc {
    pub line: usize,
    pub col: usize,
}

impl Loc {
    pub fn new(line: usize, col: usize) -> Self {
        Loc { line, col }
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {}, col {}", self.line, self.col)
    }
}

/// Renders an optional location as an error suffix.
struct At<'a>(&'a Option<Loc>);

impl fmt::Display for At<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            Some(loc) => write!(f, " at {loc}"),
            None => Ok(()),
        }
    }
}

/// Categorizes the different kinds of syntax errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SyntaxErrorKind {
    /// A character that cannot start any token
    UnexpectedCharacter,
    /// End of input inside a string literal
    UnterminatedString,
    /// Numeric literal that does not fit the runtime number types
    InvalidNumber,
    /// A token where no expression can start (stray closing delimiter, EOF)
    UnexpectedToken,
    /// End of input before a closing delimiter
    Unclosed,
    /// Map literal with a key that has no value
    OddMapLiteral,
    /// Expression nesting exceeded [`MAX_PARSE_DEPTH`]
    TooDeeplyNested,
}

/// A malformed token stream at a location.
#[derive(Debug, PartialEq, Clone)]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub message: String,
    pub line: usize,
    pub col: usize,
}

impl SyntaxError {
    pub fn new(kind: SyntaxErrorKind, message: impl Into<String>, loc: Loc) -> Self {
        SyntaxError {
            kind,
            message: message.into(),
            line: loc.line,
            col: loc.col,
        }
    }

    pub fn loc(&self) -> Loc {
        Loc::new(self.line, self.col)
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "SyntaxError: {} at line {}, col {}",
            self.message, self.line, self.col
        )
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Syntax(SyntaxError),

    #[error("Undefined symbol: {name}{}", At(.loc))]
    UndefinedSymbol { name: String, loc: Option<Loc> },

    #[error("Not callable: {value}{}", At(.loc))]
    NotCallable { value: String, loc: Option<Loc> },

    #[error("{name} is not a module")]
    NotAModule { name: String },

    #[error("{name} not found in module {module}")]
    MissingModuleName { name: String, module: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("EvaluationError: {0}")]
    EvalError(String),

    #[error("ArityError: {name} expected {expected} arguments, got {got}")]
    ArityError {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("recur outside of loop")]
    RecurOutsideLoop,

    #[error("Evaluation depth limit exceeded (max: {max})")]
    DepthExceeded { max: usize },

    #[error("Uncaught throw: {0}")]
    Thrown(Value),
}

impl Error {
    /// Create an ArityError for a builtin or special form
    pub fn arity_error(name: &str, expected: impl fmt::Display, got: usize) -> Self {
        Error::ArityError {
            name: name.to_owned(),
            expected: expected.to_string(),
            got,
        }
    }

    pub(crate) fn undefined(name: &str, loc: Option<Loc>) -> Self {
        Error::UndefinedSymbol {
            name: name.to_owned(),
            loc,
        }
    }
}

impl From<SyntaxError> for Error {
    fn from(err: SyntaxError) -> Self {
        Error::Syntax(err)
    }
}
