//! Predicates, logic, the meta operations (`eval`, `macroexpand`, `error`)
//! and the opaque host-object surface.

use std::rc::Rc;

use itertools::Itertools;

use crate::compiler;
use crate::context::Context;
use crate::error::{InteropError, Result, RuntimeError};
use crate::value::{NativeObject, Val};
use crate::vm::Machine;

/// Strings print raw in messages, everything else uses its printed form.
fn stringify(v: &Val) -> String {
    match v {
        Val::Str(s) => s.to_string(),
        other => other.to_string(),
    }
}

fn join(args: &[Val]) -> String {
    args.iter().map(stringify).join(" ")
}

/// (not v)
pub fn not(_ctx: &Context, args: &[Val]) -> Result<Val> {
    Ok(Val::Bool(!args[0].cast_bool()))
}

/// (null? v)
pub fn is_null(_ctx: &Context, args: &[Val]) -> Result<Val> {
    Ok(Val::Bool(args[0].is_nil()))
}

/// (cons? v)
pub fn is_cons(_ctx: &Context, args: &[Val]) -> Result<Val> {
    Ok(Val::Bool(args[0].is_cons()))
}

/// (list? v) — nil or a proper list.
pub fn is_list(_ctx: &Context, args: &[Val]) -> Result<Val> {
    Ok(Val::Bool(args[0].proper_list().is_some()))
}

/// (number? v)
pub fn is_number(_ctx: &Context, args: &[Val]) -> Result<Val> {
    Ok(Val::Bool(args[0].is_number()))
}

/// (string? v)
pub fn is_string(_ctx: &Context, args: &[Val]) -> Result<Val> {
    Ok(Val::Bool(matches!(args[0], Val::Str(_))))
}

/// (symbol? v)
pub fn is_symbol(_ctx: &Context, args: &[Val]) -> Result<Val> {
    Ok(Val::Bool(matches!(args[0], Val::Symbol(_))))
}

/// (bool? v)
pub fn is_bool(_ctx: &Context, args: &[Val]) -> Result<Val> {
    Ok(Val::Bool(matches!(args[0], Val::Bool(_))))
}

/// (closure? v)
pub fn is_closure(_ctx: &Context, args: &[Val]) -> Result<Val> {
    Ok(Val::Bool(matches!(args[0], Val::Closure(_))))
}

/// (vector? v)
pub fn is_vector(_ctx: &Context, args: &[Val]) -> Result<Val> {
    Ok(Val::Bool(matches!(args[0], Val::Vector(_))))
}

/// (map? v)
pub fn is_map(_ctx: &Context, args: &[Val]) -> Result<Val> {
    Ok(Val::Bool(matches!(args[0], Val::Map(_))))
}

/// (eq? a b) — the language's ordinary equality: identity for aggregates.
pub fn identical(_ctx: &Context, args: &[Val]) -> Result<Val> {
    Ok(Val::Bool(args[0] == args[1]))
}

/// (equal? a b) — element-wise over cons chains and vectors.
pub fn equal(_ctx: &Context, args: &[Val]) -> Result<Val> {
    Ok(Val::Bool(args[0].structural_eq(&args[1])))
}

/// (eval expr) — compiles and runs the expression in this context.
pub fn eval(ctx: &Context, args: &[Val]) -> Result<Val> {
    let unit = compiler::compile(ctx, &args[0])?;
    Machine::new(ctx).execute(&unit.closure, &[])
}

/// (macroexpand-1 form)
pub fn macroexpand_1(ctx: &Context, args: &[Val]) -> Result<Val> {
    let (expanded, _) = compiler::macroexpand_1(ctx, &args[0])?;
    Ok(expanded)
}

/// (macroexpand form)
pub fn macroexpand(ctx: &Context, args: &[Val]) -> Result<Val> {
    compiler::macroexpand_full(ctx, &args[0])
}

/// (error …) — raises a runtime error with the printed arguments.
pub fn error(_ctx: &Context, args: &[Val]) -> Result<Val> {
    Err(RuntimeError(join(args)).into())
}

/// (trace …) — writes the printed arguments to the log sink.
pub fn trace(ctx: &Context, args: &[Val]) -> Result<Val> {
    ctx.logger.log(format_args!("{}", join(args)));
    Ok(Val::Nil)
}

/// (gensym) — a fresh, uninterned symbol.
pub fn gensym(ctx: &Context, _args: &[Val]) -> Result<Val> {
    Ok(Val::Symbol(ctx.gensym()))
}

/// (print …)
pub fn print(_ctx: &Context, args: &[Val]) -> Result<Val> {
    std::io::Write::write_all(&mut std::io::stdout(), join(args).as_bytes()).ok();
    Ok(Val::Nil)
}

/// (println …)
pub fn println(_ctx: &Context, args: &[Val]) -> Result<Val> {
    let mut line = join(args);
    line.push('\n');
    std::io::Write::write_all(&mut std::io::stdout(), line.as_bytes()).ok();
    Ok(Val::Nil)
}

/// The one host-object type shipped with the engine: a boxed value. It
/// exists so the opaque interop surface has something to operate on.
struct Boxed(Val);

impl NativeObject for Boxed {
    fn type_name(&self) -> &str {
        self.0.type_name()
    }

    fn describe(&self) -> String {
        self.0.to_string()
    }
}

/// (native-box v) — wraps a value in an opaque host object.
pub fn native_box(_ctx: &Context, args: &[Val]) -> Result<Val> {
    Ok(Val::Native(Rc::new(Boxed(args[0].clone()))))
}

/// (native-type obj)
pub fn native_type(_ctx: &Context, args: &[Val]) -> Result<Val> {
    match &args[0] {
        Val::Native(n) => Ok(Val::string(n.type_name().to_string())),
        other => Err(InteropError::NotAnObject(other.to_string()).into()),
    }
}

/// (native-string obj)
pub fn native_string(_ctx: &Context, args: &[Val]) -> Result<Val> {
    match &args[0] {
        Val::Native(n) => Ok(Val::string(n.describe())),
        other => Err(InteropError::NotAnObject(other.to_string()).into()),
    }
}
