//! List primitives. Cons cells are mutable; `append` and `reverse` build
//! fresh chains and never share structure with their inputs except through
//! the elements themselves.

use crate::context::Context;
use crate::error::{LanguageError, Result};
use crate::primitives::{closure_arg, int_arg, list_arg, mismatch};
use crate::value::Val;
use crate::vm::Machine;

/// (cons a b)
pub fn cons(_ctx: &Context, args: &[Val]) -> Result<Val> {
    Ok(Val::cons(args[0].clone(), args[1].clone()))
}

/// (first pair)
pub fn first(_ctx: &Context, args: &[Val]) -> Result<Val> {
    args[0]
        .first()
        .ok_or_else(|| mismatch("a cons", &args[0]))
}

/// (rest pair)
pub fn rest(_ctx: &Context, args: &[Val]) -> Result<Val> {
    args[0]
        .rest()
        .ok_or_else(|| mismatch("a cons", &args[0]))
}

/// (set-first! pair value) — returns the mutated pair.
pub fn set_first(_ctx: &Context, args: &[Val]) -> Result<Val> {
    match &args[0] {
        Val::Cons(cell) => {
            cell.borrow_mut().first = args[1].clone();
            Ok(args[0].clone())
        }
        other => Err(mismatch("a cons", other)),
    }
}

/// (set-rest! pair value) — returns the mutated pair.
pub fn set_rest(_ctx: &Context, args: &[Val]) -> Result<Val> {
    match &args[0] {
        Val::Cons(cell) => {
            cell.borrow_mut().rest = args[1].clone();
            Ok(args[0].clone())
        }
        other => Err(mismatch("a cons", other)),
    }
}

/// (list …)
pub fn list(_ctx: &Context, args: &[Val]) -> Result<Val> {
    Ok(Val::list_from(args.to_vec()))
}

/// (append …) — every argument but the last must be a proper list; the last
/// becomes the tail of the result.
pub fn append(_ctx: &Context, args: &[Val]) -> Result<Val> {
    let Some((last, init)) = args.split_last() else {
        return Ok(Val::Nil);
    };

    let mut items = Vec::new();
    for arg in init {
        items.extend(
            arg.proper_list()
                .ok_or_else(|| mismatch("a proper list", arg))?,
        );
    }
    Ok(Val::list_with_tail(items, last.clone()))
}

/// (length list) — only defined for proper lists.
pub fn length(_ctx: &Context, args: &[Val]) -> Result<Val> {
    match args[0].list_length() {
        Some(len) => Ok(Val::I64(len as i64)),
        None => Err(mismatch("a proper list", &args[0])),
    }
}

/// (reverse list)
pub fn reverse(_ctx: &Context, args: &[Val]) -> Result<Val> {
    let mut items = list_arg(args, 0)?;
    items.reverse();
    Ok(Val::list_from(items))
}

/// (nth list i)
pub fn nth(_ctx: &Context, args: &[Val]) -> Result<Val> {
    let items = list_arg(args, 0)?;
    let index = int_arg(args, 1)?;
    if index < 0 || index as usize >= items.len() {
        return Err(LanguageError::IndexOutOfRange {
            index,
            len: items.len(),
        }
        .into());
    }
    Ok(items[index as usize].clone())
}

/// (map f list) — calls the closure once per element, left to right.
pub fn map(ctx: &Context, args: &[Val]) -> Result<Val> {
    let func = closure_arg(args, 0)?;
    let items = list_arg(args, 1)?;

    let machine = Machine::new(ctx);
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(machine.execute(&func, &[item])?);
    }
    Ok(Val::list_from(out))
}

/// (apply f args)
pub fn apply(ctx: &Context, args: &[Val]) -> Result<Val> {
    let func = closure_arg(args, 0)?;
    let call_args = list_arg(args, 1)?;
    Machine::new(ctx).execute(&func, &call_args)
}
