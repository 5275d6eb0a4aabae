//! A small lisp implemented as a compile-then-execute engine. Source text is
//! read into s-expressions, compiled into a linear bytecode, and run by a
//! stack machine that shares its value representation with the compiler.
//!
//! The pipeline is: [reader::Reader] → [Val] → [compiler::compile] →
//! a [code::CodeHandle] into the code arena plus a [value::Closure] →
//! [vm::Machine]. Macros run on the machine during compilation, so the
//! compiler and machine are mutually recursive through the shared
//! [context::Context].
//!
//! ```no_run
//! use quill::{Context, Logger};
//!
//! let ctx = Context::new(true, Logger::silent()).unwrap();
//! for result in ctx.compile_and_execute("(+ 1 2)").unwrap() {
//!     println!("{}", result.output);
//! }
//! ```

pub mod code;
pub mod compiler;
pub mod context;
pub mod env;
pub mod error;
pub mod log;
pub mod package;
pub mod primitives;
pub mod reader;
pub mod repl;
pub mod symbol;
pub mod value;
pub mod vm;

pub use context::{Context, Execution};
pub use error::{Error, Result};
pub use log::Logger;
pub use value::Val;
