//! Numeric primitives. When every operand is an integer the result stays an
//! integer; one float operand promotes the whole operation to floating point.
//! Integer arithmetic wraps rather than trapping.

use std::cmp::Ordering;

use crate::context::Context;
use crate::error::{LanguageError, Result};
use crate::primitives::mismatch;
use crate::value::Val;

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

fn num(v: &Val) -> Result<Num> {
    match v {
        Val::I32(n) => Ok(Num::Int(*n as i64)),
        Val::I64(n) => Ok(Num::Int(*n)),
        Val::U32(n) => Ok(Num::Int(*n as i64)),
        Val::U64(n) => Ok(Num::Int(*n as i64)),
        Val::F32(n) => Ok(Num::Float(*n as f64)),
        Val::F64(n) => Ok(Num::Float(*n)),
        other => Err(mismatch("a number", other)),
    }
}

fn as_f64(n: Num) -> f64 {
    match n {
        Num::Int(i) => i as f64,
        Num::Float(f) => f,
    }
}

fn to_val(n: Num) -> Val {
    match n {
        Num::Int(i) => Val::I64(i),
        Num::Float(f) => Val::F64(f),
    }
}

fn fold(
    args: &[Val],
    mut acc: Num,
    int_op: fn(i64, i64) -> Result<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Val> {
    for arg in args {
        let n = num(arg)?;
        acc = match (acc, n) {
            (Num::Int(a), Num::Int(b)) => Num::Int(int_op(a, b)?),
            (a, b) => Num::Float(float_op(as_f64(a), as_f64(b))),
        };
    }
    Ok(to_val(acc))
}

/// (+ …)
pub fn add(_ctx: &Context, args: &[Val]) -> Result<Val> {
    fold(args, Num::Int(0), |a, b| Ok(a.wrapping_add(b)), |a, b| a + b)
}

/// (- x …) — a single argument negates.
pub fn sub(_ctx: &Context, args: &[Val]) -> Result<Val> {
    let first = num(&args[0])?;
    if args.len() == 1 {
        return fold(&args[..1], Num::Int(0), |a, b| Ok(a.wrapping_sub(b)), |a, b| a - b);
    }
    fold(&args[1..], first, |a, b| Ok(a.wrapping_sub(b)), |a, b| a - b)
}

/// (* …)
pub fn mul(_ctx: &Context, args: &[Val]) -> Result<Val> {
    fold(args, Num::Int(1), |a, b| Ok(a.wrapping_mul(b)), |a, b| a * b)
}

fn int_div(a: i64, b: i64) -> Result<i64> {
    if b == 0 {
        return Err(LanguageError::DivisionByZero.into());
    }
    Ok(a.wrapping_div(b))
}

/// (/ x …) — a single argument takes the reciprocal.
pub fn div(_ctx: &Context, args: &[Val]) -> Result<Val> {
    let first = num(&args[0])?;
    if args.len() == 1 {
        return fold(&args[..1], Num::Int(1), int_div, |a, b| a / b);
    }
    fold(&args[1..], first, int_div, |a, b| a / b)
}

/// (mod a b)
pub fn modulo(_ctx: &Context, args: &[Val]) -> Result<Val> {
    match (num(&args[0])?, num(&args[1])?) {
        (Num::Int(a), Num::Int(b)) => {
            if b == 0 {
                Err(LanguageError::DivisionByZero.into())
            } else {
                Ok(Val::I64(a.wrapping_rem(b)))
            }
        }
        (a, b) => Ok(Val::F64(as_f64(a) % as_f64(b))),
    }
}

/// Chains the comparison across every adjacent pair. A NaN anywhere makes
/// the whole chain false.
fn pairwise(args: &[Val], ok: fn(Ordering) -> bool) -> Result<Val> {
    for window in args.windows(2) {
        let ord = match (num(&window[0])?, num(&window[1])?) {
            (Num::Int(a), Num::Int(b)) => a.cmp(&b),
            (a, b) => match as_f64(a).partial_cmp(&as_f64(b)) {
                Some(ord) => ord,
                None => return Ok(Val::Bool(false)),
            },
        };
        if !ok(ord) {
            return Ok(Val::Bool(false));
        }
    }
    Ok(Val::Bool(true))
}

/// (= a b …)
pub fn num_eq(_ctx: &Context, args: &[Val]) -> Result<Val> {
    pairwise(args, |o| o == Ordering::Equal)
}

/// (!= a b)
pub fn num_ne(ctx: &Context, args: &[Val]) -> Result<Val> {
    let eq = num_eq(ctx, args)?;
    Ok(Val::Bool(!eq.cast_bool()))
}

/// (< a b …)
pub fn lt(_ctx: &Context, args: &[Val]) -> Result<Val> {
    pairwise(args, |o| o == Ordering::Less)
}

/// (<= a b …)
pub fn le(_ctx: &Context, args: &[Val]) -> Result<Val> {
    pairwise(args, |o| o != Ordering::Greater)
}

/// (> a b …)
pub fn gt(_ctx: &Context, args: &[Val]) -> Result<Val> {
    pairwise(args, |o| o == Ordering::Greater)
}

/// (>= a b …)
pub fn ge(_ctx: &Context, args: &[Val]) -> Result<Val> {
    pairwise(args, |o| o != Ordering::Less)
}

/// (abs n)
pub fn abs(_ctx: &Context, args: &[Val]) -> Result<Val> {
    Ok(match num(&args[0])? {
        Num::Int(n) => Val::I64(n.wrapping_abs()),
        Num::Float(f) => Val::F64(f.abs()),
    })
}

fn extremum(args: &[Val], keep_left: fn(Ordering) -> bool) -> Result<Val> {
    let mut best = num(&args[0])?;
    for arg in &args[1..] {
        let n = num(arg)?;
        let ord = match (best, n) {
            (Num::Int(a), Num::Int(b)) => a.cmp(&b),
            (a, b) => as_f64(a)
                .partial_cmp(&as_f64(b))
                .unwrap_or(Ordering::Equal),
        };
        if !keep_left(ord) {
            best = n;
        }
    }
    Ok(to_val(best))
}

/// (min a …)
pub fn min(_ctx: &Context, args: &[Val]) -> Result<Val> {
    extremum(args, |o| o != Ordering::Greater)
}

/// (max a …)
pub fn max(_ctx: &Context, args: &[Val]) -> Result<Val> {
    extremum(args, |o| o != Ordering::Less)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::log::Logger;

    fn eval(src: &str) -> Val {
        let ctx = Context::new(false, Logger::silent()).unwrap();
        ctx.compile_and_execute(src).unwrap().pop().unwrap().output
    }

    #[test]
    fn integer_arithmetic_stays_integer() {
        assert_eq!(eval("(+ 1 2 3)"), Val::I64(6));
        assert_eq!(eval("(/ 9 2)"), Val::I64(4));
        assert_eq!(eval("(mod 9 2)"), Val::I64(1));
        assert_eq!(eval("(abs -4)"), Val::I64(4));
    }

    #[test]
    fn any_float_promotes() {
        assert_eq!(eval("(+ 1 2.0)"), Val::F64(3.0));
        assert_eq!(eval("(/ 9 2.0)"), Val::F64(4.5));
        assert_eq!(eval("(abs -1.5)"), Val::F64(1.5));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let ctx = Context::new(false, Logger::silent()).unwrap();
        assert!(ctx.compile_and_execute("(/ 1 0)").is_err());
        assert!(ctx.compile_and_execute("(mod 1 0)").is_err());
    }

    #[test]
    fn comparisons_chain() {
        assert_eq!(eval("(< 1 2 3)"), Val::Bool(true));
        assert_eq!(eval("(<= 1 1 2)"), Val::Bool(true));
        assert_eq!(eval("(> 3 2 2)"), Val::Bool(false));
        assert_eq!(eval("(= 1 1 1)"), Val::Bool(true));
        assert_eq!(eval("(!= 1 2)"), Val::Bool(true));
    }

    #[test]
    fn extrema() {
        assert_eq!(eval("(min 3 1 2)"), Val::I64(1));
        assert_eq!(eval("(max 3 1 2)"), Val::I64(3));
        assert_eq!(eval("(max 1 2.5)"), Val::F64(2.5));
    }
}
