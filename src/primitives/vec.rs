//! Vector primitives: mutable indexed sequences.

use std::cell::RefCell;
use std::rc::Rc;

use crate::context::Context;
use crate::error::{LanguageError, Result};
use crate::primitives::{int_arg, vector_arg};
use crate::value::Val;

/// (vector …)
pub fn vector(_ctx: &Context, args: &[Val]) -> Result<Val> {
    Ok(Val::Vector(Rc::new(RefCell::new(args.to_vec()))))
}

/// (make-vector n) or (make-vector n fill)
pub fn make_vector(_ctx: &Context, args: &[Val]) -> Result<Val> {
    let n = int_arg(args, 0)?.max(0) as usize;
    let fill = args.get(1).cloned().unwrap_or(Val::Nil);
    Ok(Val::Vector(Rc::new(RefCell::new(vec![fill; n]))))
}

fn checked_index(index: i64, len: usize) -> Result<usize> {
    if index < 0 || index as usize >= len {
        Err(LanguageError::IndexOutOfRange { index, len }.into())
    } else {
        Ok(index as usize)
    }
}

/// (vector-get v i)
pub fn get(_ctx: &Context, args: &[Val]) -> Result<Val> {
    let vec = vector_arg(args, 0)?;
    let vec = vec.borrow();
    let i = checked_index(int_arg(args, 1)?, vec.len())?;
    Ok(vec[i].clone())
}

/// (vector-set! v i value) — returns the stored value.
pub fn set(_ctx: &Context, args: &[Val]) -> Result<Val> {
    let vec = vector_arg(args, 0)?;
    let mut vec = vec.borrow_mut();
    let i = checked_index(int_arg(args, 1)?, vec.len())?;
    vec[i] = args[2].clone();
    Ok(args[2].clone())
}

/// (vector-length v)
pub fn length(_ctx: &Context, args: &[Val]) -> Result<Val> {
    let vec = vector_arg(args, 0)?;
    let len = vec.borrow().len();
    Ok(Val::I64(len as i64))
}

/// (vector-push! v value) — appends and returns the vector.
pub fn push(_ctx: &Context, args: &[Val]) -> Result<Val> {
    let vec = vector_arg(args, 0)?;
    vec.borrow_mut().push(args[1].clone());
    Ok(args[0].clone())
}
