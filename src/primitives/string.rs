//! String primitives. Strings are immutable; indices count characters, not
//! bytes.

use crate::context::Context;
use crate::error::{LanguageError, Result};
use crate::primitives::{int_arg, string_arg};
use crate::value::Val;

/// (string-length s)
pub fn length(_ctx: &Context, args: &[Val]) -> Result<Val> {
    let s = string_arg(args, 0)?;
    Ok(Val::I64(s.chars().count() as i64))
}

/// (string-append …)
pub fn append(_ctx: &Context, args: &[Val]) -> Result<Val> {
    let mut out = String::new();
    for (i, _) in args.iter().enumerate() {
        out.push_str(&string_arg(args, i)?);
    }
    Ok(Val::string(out))
}

/// (substring s start) or (substring s start len)
pub fn substring(_ctx: &Context, args: &[Val]) -> Result<Val> {
    let s = string_arg(args, 0)?;
    let chars: Vec<char> = s.chars().collect();
    let start = int_arg(args, 1)?;
    if start < 0 || start as usize > chars.len() {
        return Err(LanguageError::IndexOutOfRange {
            index: start,
            len: chars.len(),
        }
        .into());
    }
    let start = start as usize;
    let len = match args.get(2) {
        Some(_) => int_arg(args, 2)?.max(0) as usize,
        None => chars.len() - start,
    };
    let end = (start + len).min(chars.len());
    Ok(Val::string(chars[start..end].iter().collect::<String>()))
}

/// (number->string n)
pub fn number_to_string(_ctx: &Context, args: &[Val]) -> Result<Val> {
    if !args[0].is_number() {
        return Err(crate::primitives::mismatch("a number", &args[0]));
    }
    Ok(Val::string(args[0].to_string()))
}

/// (string->number s) — nil when the text does not parse.
pub fn string_to_number(_ctx: &Context, args: &[Val]) -> Result<Val> {
    let s = string_arg(args, 0)?;
    let trimmed = s.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Ok(Val::I64(n));
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return Ok(Val::F64(f));
    }
    Ok(Val::Nil)
}

/// (to-string v) — the printed form of any value.
pub fn to_string(_ctx: &Context, args: &[Val]) -> Result<Val> {
    Ok(Val::string(args[0].to_string()))
}

/// (symbol->string sym)
pub fn symbol_to_string(_ctx: &Context, args: &[Val]) -> Result<Val> {
    let sym = crate::primitives::symbol_arg(args, 0)?;
    Ok(Val::string(sym.name().to_string()))
}

/// (string->symbol s) — resolved through the current package like source
/// text would be.
pub fn string_to_symbol(ctx: &Context, args: &[Val]) -> Result<Val> {
    let s = string_arg(args, 0)?;
    let current = ctx.packages.current();
    Ok(Val::Symbol(crate::package::Package::resolve_or_intern(
        &current, &s,
    )))
}
