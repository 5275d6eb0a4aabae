//! The built-in functions registered in the `core` package. The registry maps
//! a name to a host function plus the arities it accepts; the compiler emits
//! `CALL_PRIMOP` for a call that matches, and the context also binds a wrapper
//! closure for every primitive so they work as first-class values.

pub mod list;
pub mod map;
pub mod num;
pub mod pkg;
pub mod string;
pub mod sys;
pub mod vec;

use std::rc::Rc;

use fxhash::FxHashMap;

use crate::context::Context;
use crate::error::{Error, LanguageError, Result};
use crate::symbol::Symbol;
use crate::value::{Closure, MapRepr, Val};

pub type PrimFn = fn(&Context, &[Val]) -> Result<Val>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Range(usize, usize),
}

impl Arity {
    pub fn accepts(&self, argc: usize) -> bool {
        match *self {
            Arity::Exact(n) => argc == n,
            Arity::AtLeast(n) => argc >= n,
            Arity::Range(lo, hi) => argc >= lo && argc <= hi,
        }
    }
}

pub struct Primitive {
    pub name: &'static str,
    pub arity: Arity,
    /// How many parameters the generated first-class wrapper takes.
    pub wrapper_params: usize,
    pub func: PrimFn,
}

pub struct Registry {
    map: FxHashMap<&'static str, Primitive>,
}

impl Registry {
    pub fn with_defaults() -> Registry {
        use Arity::{AtLeast, Exact, Range};

        let mut reg = Registry {
            map: FxHashMap::default(),
        };
        let mut add = |name: &'static str, arity: Arity, wrapper_params: usize, func: PrimFn| {
            reg.map.insert(
                name,
                Primitive {
                    name,
                    arity,
                    wrapper_params,
                    func,
                },
            );
        };

        // numeric
        add("+", AtLeast(0), 2, num::add);
        add("-", AtLeast(1), 2, num::sub);
        add("*", AtLeast(0), 2, num::mul);
        add("/", AtLeast(1), 2, num::div);
        add("mod", Exact(2), 2, num::modulo);
        add("=", AtLeast(2), 2, num::num_eq);
        add("!=", Exact(2), 2, num::num_ne);
        add("<", AtLeast(2), 2, num::lt);
        add("<=", AtLeast(2), 2, num::le);
        add(">", AtLeast(2), 2, num::gt);
        add(">=", AtLeast(2), 2, num::ge);
        add("abs", Exact(1), 1, num::abs);
        add("min", AtLeast(1), 2, num::min);
        add("max", AtLeast(1), 2, num::max);

        // lists
        add("cons", Exact(2), 2, list::cons);
        add("first", Exact(1), 1, list::first);
        add("rest", Exact(1), 1, list::rest);
        add("set-first!", Exact(2), 2, list::set_first);
        add("set-rest!", Exact(2), 2, list::set_rest);
        add("list", AtLeast(0), 2, list::list);
        add("append", AtLeast(0), 2, list::append);
        add("length", Exact(1), 1, list::length);
        add("reverse", Exact(1), 1, list::reverse);
        add("nth", Exact(2), 2, list::nth);
        add("map", Exact(2), 2, list::map);
        add("apply", Exact(2), 2, list::apply);

        // vectors
        add("vector", AtLeast(0), 2, vec::vector);
        add("make-vector", Range(1, 2), 1, vec::make_vector);
        add("vector-get", Exact(2), 2, vec::get);
        add("vector-set!", Exact(3), 3, vec::set);
        add("vector-length", Exact(1), 1, vec::length);
        add("vector-push!", Exact(2), 2, vec::push);

        // maps
        add("make-map", AtLeast(0), 2, map::make_map);
        add("map-get", Range(2, 3), 2, map::get);
        add("map-set", Exact(3), 3, map::set);
        add("map-remove", Exact(2), 2, map::remove);
        add("map-length", Exact(1), 1, map::length);
        add("map-keys", Exact(1), 1, map::keys);
        add("map-values", Exact(1), 1, map::values);
        add("map-has?", Exact(2), 2, map::has);

        // strings
        add("string-length", Exact(1), 1, string::length);
        add("string-append", AtLeast(0), 2, string::append);
        add("substring", Range(2, 3), 3, string::substring);
        add("number->string", Exact(1), 1, string::number_to_string);
        add("string->number", Exact(1), 1, string::string_to_number);
        add("to-string", Exact(1), 1, string::to_string);
        add("symbol->string", Exact(1), 1, string::symbol_to_string);
        add("string->symbol", Exact(1), 1, string::string_to_symbol);

        // predicates and logic
        add("not", Exact(1), 1, sys::not);
        add("null?", Exact(1), 1, sys::is_null);
        add("cons?", Exact(1), 1, sys::is_cons);
        add("list?", Exact(1), 1, sys::is_list);
        add("number?", Exact(1), 1, sys::is_number);
        add("string?", Exact(1), 1, sys::is_string);
        add("symbol?", Exact(1), 1, sys::is_symbol);
        add("bool?", Exact(1), 1, sys::is_bool);
        add("closure?", Exact(1), 1, sys::is_closure);
        add("vector?", Exact(1), 1, sys::is_vector);
        add("map?", Exact(1), 1, sys::is_map);
        add("eq?", Exact(2), 2, sys::identical);
        add("equal?", Exact(2), 2, sys::equal);

        // meta
        add("eval", Exact(1), 1, sys::eval);
        add("macroexpand-1", Exact(1), 1, sys::macroexpand_1);
        add("macroexpand", Exact(1), 1, sys::macroexpand);
        add("error", AtLeast(1), 1, sys::error);
        add("trace", AtLeast(1), 1, sys::trace);
        add("gensym", Exact(0), 0, sys::gensym);
        add("print", AtLeast(0), 1, sys::print);
        add("println", AtLeast(0), 1, sys::println);

        // packages
        add("package-set", Exact(1), 1, pkg::set);
        add("package-get", Exact(0), 0, pkg::get);
        add("package-import", AtLeast(1), 1, pkg::import);
        add("package-export", AtLeast(1), 1, pkg::export);
        add("intern", Exact(1), 1, pkg::intern);

        // host objects
        add("native-box", Exact(1), 1, sys::native_box);
        add("native-type", Exact(1), 1, sys::native_type);
        add("native-string", Exact(1), 1, sys::native_string);

        reg
    }

    pub fn get(&self, name: &str) -> Option<&Primitive> {
        self.map.get(name)
    }

    /// The compiler's query: a primitive by name whose arity accepts `argc`.
    pub fn lookup(&self, name: &str, argc: usize) -> Option<&Primitive> {
        self.map.get(name).filter(|p| p.arity.accepts(argc))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Primitive> {
        self.map.values()
    }
}

pub(crate) fn mismatch(expected: &'static str, got: &Val) -> Error {
    LanguageError::TypeMismatch {
        expected,
        got: got.to_string(),
    }
    .into()
}

pub(crate) fn string_arg(args: &[Val], i: usize) -> Result<Rc<str>> {
    match &args[i] {
        Val::Str(s) => Ok(s.clone()),
        other => Err(mismatch("a string", other)),
    }
}

pub(crate) fn symbol_arg(args: &[Val], i: usize) -> Result<Rc<Symbol>> {
    match &args[i] {
        Val::Symbol(s) => Ok(s.clone()),
        other => Err(mismatch("a symbol", other)),
    }
}

pub(crate) fn closure_arg(args: &[Val], i: usize) -> Result<Rc<Closure>> {
    args[i]
        .as_closure()
        .cloned()
        .ok_or_else(|| mismatch("a closure", &args[i]))
}

pub(crate) fn int_arg(args: &[Val], i: usize) -> Result<i64> {
    match &args[i] {
        Val::I32(n) => Ok(*n as i64),
        Val::I64(n) => Ok(*n),
        Val::U32(n) => Ok(*n as i64),
        Val::U64(n) => Ok(*n as i64),
        other => Err(mismatch("an integer", other)),
    }
}

pub(crate) fn list_arg(args: &[Val], i: usize) -> Result<Vec<Val>> {
    args[i]
        .proper_list()
        .ok_or_else(|| mismatch("a proper list", &args[i]))
}

pub(crate) fn vector_arg(args: &[Val], i: usize) -> Result<Rc<std::cell::RefCell<Vec<Val>>>> {
    match &args[i] {
        Val::Vector(v) => Ok(v.clone()),
        other => Err(mismatch("a vector", other)),
    }
}

pub(crate) fn map_arg(args: &[Val], i: usize) -> Result<Rc<MapRepr>> {
    match &args[i] {
        Val::Map(m) => Ok(m.clone()),
        other => Err(mismatch("a map", other)),
    }
}
