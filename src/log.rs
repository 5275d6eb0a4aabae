//! Logging capability shared by the parser, compiler and machine. The three
//! flags gate what gets reported; the sink decides where it goes. The shell
//! flips the flags at runtime through a shared [crate::context::Context], so
//! they are cells rather than plain bools.

use std::cell::Cell;
use std::fmt::Arguments;

pub struct Logger {
    /// Report every expression the reader produces.
    pub parsing: Cell<bool>,
    /// Report the disassembly of every compiled code block.
    pub instructions: Cell<bool>,
    /// Report the machine state before each instruction.
    pub stack: Cell<bool>,
    sink: Box<dyn Fn(Arguments<'_>)>,
}

impl Logger {
    pub fn new(sink: Box<dyn Fn(Arguments<'_>)>) -> Self {
        Logger {
            parsing: Cell::new(false),
            instructions: Cell::new(false),
            stack: Cell::new(false),
            sink,
        }
    }

    /// A logger that writes to standard error.
    pub fn to_stderr() -> Self {
        Logger::new(Box::new(|args| eprintln!("{}", args)))
    }

    /// A logger that drops everything.
    pub fn silent() -> Self {
        Logger::new(Box::new(|_| {}))
    }

    pub fn log(&self, args: Arguments<'_>) {
        (self.sink)(args)
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("parsing", &self.parsing.get())
            .field("instructions", &self.instructions.get())
            .field("stack", &self.stack.get())
            .finish()
    }
}
