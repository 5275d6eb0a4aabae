//! Error types for every stage of the pipeline. Each stage has its own enum so
//! callers can tell a reader failure from a compiler failure from a machine
//! failure; [Error] unites them at the crate surface.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("language error: {0}")]
    Language(#[from] LanguageError),

    #[error("error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("interop error: {0}")]
    Interop(#[from] InteropError),
}

/// Failures raised while turning characters into expressions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected ')'")]
    UnexpectedCloseParen,

    #[error("unexpected '}}'")]
    UnexpectedCloseBrace,

    #[error("string not terminated")]
    UnterminatedString,

    #[error("unquote outside of a backquote")]
    UnquoteOutsideBackquote,

    #[error("',@' must appear inside a backquoted list")]
    SpliceOutsideList,

    #[error("unknown package '{0}'")]
    UnknownPackage(String),

    #[error("map literal needs an even number of forms")]
    UnevenMapLiteral,

    #[error("malformed dotted list")]
    MalformedDottedList,
}

/// Failures raised while turning expressions into instructions.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("malformed {form}: expected {expected}")]
    WrongForm {
        form: &'static str,
        expected: &'static str,
    },

    #[error("cannot set! '{0}', target must be a symbol")]
    InvalidSetTarget(String),

    #[error("invalid parameter list '{0}'")]
    InvalidParamList(String),

    #[error("unresolved jump label '{0}'")]
    UnresolvedLabel(String),

    #[error("macro '{name}' failed to expand: {source}")]
    MacroExpansion {
        name: String,
        #[source]
        source: Box<Error>,
    },
}

/// Failures raised by the environment or the running machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LanguageError {
    #[error("invalid variable coordinates {frame}:{slot}")]
    InvalidVarPos { frame: usize, slot: usize },

    #[error("stack underflow")]
    StackUnderflow,

    #[error("ran off the end of the instruction stream in {0}")]
    RunawayInstructions(String),

    #[error("invalid jump target {0}")]
    BadJumpTarget(i64),

    #[error("invalid code handle {0}")]
    BadCodeHandle(usize),

    #[error("cannot call '{0}', not a closure")]
    NotAClosure(String),

    #[error("wrong argument count, expected {expected}, got {got}")]
    WrongArgCount { expected: usize, got: usize },

    #[error("expected at least {expected} arguments, got {got}")]
    TooFewArgs { expected: usize, got: usize },

    #[error("return without a saved address")]
    ReturnWithoutAddress,

    #[error("unknown primitive '{0}'")]
    UnknownPrimitive(String),

    #[error("expected {expected}, got '{got}'")]
    TypeMismatch {
        expected: &'static str,
        got: String,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },
}

/// An error raised explicitly from user code via `(error …)`.
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct RuntimeError(pub String);

/// Failures raised by the host-object primitives.
#[derive(Error, Debug, Clone)]
pub enum InteropError {
    #[error("value '{0}' is not a native object")]
    NotAnObject(String),
}

impl Error {
    /// Short category tag used by the shell when reporting failures.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Parse(_) => "parse",
            Error::Compile(_) => "compile",
            Error::Language(_) => "language",
            Error::Runtime(_) => "runtime",
            Error::Interop(_) => "interop",
        }
    }
}
