//! The context owns everything with a lifetime: the package registry, the
//! code arena, the primitive registry, the reader buffer and the logger. The
//! compiler and the machine both borrow it, which is how macro expansion can
//! run compiled code in the middle of a compilation.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::code::CodeArena;
use crate::compiler;
use crate::error::Result;
use crate::log::Logger;
use crate::package::{Package, Packages};
use crate::primitives::Registry;
use crate::reader::{Reader, RESERVED};
use crate::symbol::Symbol;
use crate::value::{Closure, Val};
use crate::vm::Machine;

/// The bundled standard library, fed through the ordinary pipeline when the
/// context is created with `load_std_libs`.
const BOOTSTRAP: &str = include_str!("../bootstrap/core.lisp");

/// The reserved form names, interned once in the global package so the
/// compiler can compare heads by reference.
pub struct Specials {
    pub quote: Rc<Symbol>,
    pub begin: Rc<Symbol>,
    pub set: Rc<Symbol>,
    pub if_: Rc<Symbol>,
    pub if_star: Rc<Symbol>,
    pub while_: Rc<Symbol>,
    pub lambda: Rc<Symbol>,
    pub defmacro: Rc<Symbol>,
}

impl Specials {
    fn new(pkgs: &Packages) -> Specials {
        let global = pkgs.global();
        for name in RESERVED {
            Package::intern(&global, name);
        }
        Specials {
            quote: Package::intern(&global, "quote"),
            begin: Package::intern(&global, "begin"),
            set: Package::intern(&global, "set!"),
            if_: Package::intern(&global, "if"),
            if_star: Package::intern(&global, "if*"),
            while_: Package::intern(&global, "while"),
            lambda: Package::intern(&global, "lambda"),
            defmacro: Package::intern(&global, "defmacro"),
        }
    }
}

/// One expression's trip through the pipeline.
#[derive(Debug)]
pub struct Execution {
    pub input: Val,
    pub closure: Rc<Closure>,
    pub output: Val,
    pub elapsed: Duration,
}

pub struct Context {
    pub packages: Packages,
    pub code: CodeArena,
    pub primitives: Registry,
    pub logger: Logger,
    pub specials: Specials,
    parser: RefCell<Reader>,
    gensyms: Cell<u64>,
}

impl Context {
    /// Builds the well-known packages, registers the primitives in `core`,
    /// binds their first-class wrappers, and optionally loads the bundled
    /// standard library.
    pub fn new(load_std_libs: bool, logger: Logger) -> Result<Context> {
        let packages = Packages::new();
        let specials = Specials::new(&packages);
        let ctx = Context {
            code: CodeArena::new(),
            primitives: Registry::with_defaults(),
            parser: RefCell::new(Reader::new()),
            gensyms: Cell::new(0),
            packages,
            logger,
            specials,
        };
        ctx.bootstrap(load_std_libs)?;
        Ok(ctx)
    }

    /// Appends `src` to the reader buffer, then compiles and executes every
    /// complete expression in it. The first failure aborts the rest of the
    /// buffer but leaves earlier side effects in place.
    pub fn compile_and_execute(&self, src: &str) -> Result<Vec<Execution>> {
        self.parser.borrow_mut().add_string(src);

        let mut results = Vec::new();
        loop {
            let parsed = self
                .parser
                .borrow_mut()
                .parse_next(&self.packages, &self.logger)?;
            let Some(input) = parsed else {
                break;
            };

            let unit = compiler::compile(self, &input)?;
            if self.logger.instructions.get() {
                for handle in &unit.handles {
                    if let Ok(block) = self.code.get(*handle) {
                        self.logger.log(format_args!("{}", block.disassemble()));
                    }
                }
            }

            let started = Instant::now();
            let output = Machine::new(self).execute(&unit.closure, &[])?;
            results.push(Execution {
                input,
                closure: unit.closure,
                output,
                elapsed: started.elapsed(),
            });
        }
        Ok(results)
    }

    /// True when the reader holds an incomplete expression, i.e. the shell
    /// should show a continuation prompt.
    pub fn has_pending_input(&self) -> bool {
        self.parser.borrow().has_buffered_input()
    }

    /// A fresh symbol no reader can ever produce; it is never interned.
    pub fn gensym(&self) -> Rc<Symbol> {
        let n = self.gensyms.get() + 1;
        self.gensyms.set(n);
        Symbol::new(&format!("G#{}", n), &self.packages.current())
    }

    /// Everything startup runs through the pipeline happens with `core` as
    /// the current package, so the names land there and are visible to every
    /// importer.
    fn bootstrap(&self, load_std_libs: bool) -> Result<()> {
        for prim in self.primitives.iter() {
            Package::intern(&self.packages.core(), prim.name);
        }

        let previous = self.packages.current();
        self.packages.set_current(self.packages.core());
        let result: Result<()> = (|| {
            self.compile_and_execute(&self.wrapper_source())?;
            if load_std_libs {
                self.compile_and_execute(BOOTSTRAP)?;
            }
            Ok(())
        })();
        self.packages.set_current(previous);
        result
    }

    /// Source for the first-class wrapper of every primitive:
    /// `(set! core:name (lambda (p0 …) (name p0 …)))`. The inner call
    /// compiles straight to `CALL_PRIMOP`.
    fn wrapper_source(&self) -> String {
        let mut src = String::new();
        for prim in self.primitives.iter() {
            let params = (0..prim.wrapper_params)
                .map(|i| format!("p{}", i))
                .collect::<Vec<_>>()
                .join(" ");
            src.push_str(&format!(
                "(set! core:{name} (lambda ({params}) ({name} {params})))\n",
                name = prim.name,
                params = params,
            ));
        }
        src
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(ctx: &Context, src: &str) -> Val {
        let results = ctx.compile_and_execute(src).unwrap();
        results.last().expect("expected a result").output.clone()
    }

    #[test]
    fn primitives_have_first_class_wrappers() {
        let ctx = Context::new(false, Logger::silent()).unwrap();
        let plus = run(&ctx, "+");
        assert!(matches!(plus, Val::Closure(_)));
        assert_eq!(run(&ctx, "(apply + (list 1 2))"), Val::I64(3));
        assert_eq!(run(&ctx, "(map not (list #t ()))").to_string(), "(#f #t)");
    }

    #[test]
    fn std_library_defines_derived_forms() {
        let ctx = Context::new(true, Logger::silent()).unwrap();
        assert_eq!(run(&ctx, "(let ((a 2) (b 3)) (* a b))"), Val::I64(6));
        assert_eq!(run(&ctx, "(when #t 1 2)"), Val::I64(2));
        assert_eq!(run(&ctx, "(unless #t 1 2)"), Val::Nil);
        assert_eq!(run(&ctx, "(second (list 4 5 6))"), Val::I64(5));
        assert_eq!(
            run(&ctx, "(filter number? (list 1 \"x\" 2))").to_string(),
            "(1 2)"
        );
        assert_eq!(
            run(&ctx, "(fold + 0 (list 1 2 3 4))"),
            Val::I64(10)
        );
        assert_eq!(
            run(&ctx, "(begin (define (twice x) (* 2 x)) (twice 21))"),
            Val::I64(42)
        );
        assert_eq!(run(&ctx, "(begin (define answer 42) answer)"), Val::I64(42));
    }

    #[test]
    fn executions_report_input_and_timing() {
        let ctx = Context::new(false, Logger::silent()).unwrap();
        let results = ctx.compile_and_execute("(+ 1 2) (+ 3 4)").unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].input.to_string(), "(+ 1 2)");
        assert_eq!(results[0].output, Val::I64(3));
        assert_eq!(results[1].output, Val::I64(7));
        assert!(results[0].closure.code.index() >= 1);
    }

    #[test]
    fn incomplete_input_is_held_for_later() {
        let ctx = Context::new(false, Logger::silent()).unwrap();
        assert!(ctx.compile_and_execute("(+ 1").unwrap().is_empty());
        assert!(ctx.has_pending_input());
        let results = ctx.compile_and_execute(" 2)").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].output, Val::I64(3));
        assert!(!ctx.has_pending_input());
    }

    #[test]
    fn errors_abort_the_current_expression() {
        let ctx = Context::new(false, Logger::silent()).unwrap();
        // The first expression takes effect, the second fails.
        let err = ctx
            .compile_and_execute("(set! x 10) (first 5)")
            .unwrap_err();
        assert_eq!(err.kind(), "language");
        assert_eq!(run(&ctx, "x"), Val::I64(10));
    }

    #[test]
    fn gensyms_are_unique() {
        let ctx = Context::new(false, Logger::silent()).unwrap();
        let a = ctx.gensym();
        let b = ctx.gensym();
        assert!(!Rc::ptr_eq(&a, &b));
        assert_ne!(a.name(), b.name());
    }
}
