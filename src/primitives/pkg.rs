//! Package primitives: switching the current package, importing, exporting
//! and interning at runtime.

use crate::context::Context;
use crate::error::Result;
use crate::package::Package;
use crate::primitives::{mismatch, symbol_arg};
use crate::value::Val;

fn package_name(v: &Val) -> Result<String> {
    match v {
        Val::Str(s) => Ok(s.to_string()),
        Val::Symbol(s) => Ok(s.name().to_string()),
        other => Err(mismatch("a package name", other)),
    }
}

/// (package-set name) — switches the current package, creating it on first
/// use; nil switches back to the unnamed global package.
pub fn set(ctx: &Context, args: &[Val]) -> Result<Val> {
    if args[0].is_nil() {
        ctx.packages.set_current(ctx.packages.global());
        return Ok(Val::Nil);
    }
    let name = package_name(&args[0])?;
    let pkg = ctx.packages.get_or_create(&name);
    ctx.packages.set_current(pkg);
    Ok(Val::string(name))
}

/// (package-get) — the current package's name, nil for the global package.
pub fn get(ctx: &Context, _args: &[Val]) -> Result<Val> {
    let current = ctx.packages.current();
    let name = current.borrow().name().map(|n| n.to_string());
    Ok(match name {
        Some(name) => Val::string(name),
        None => Val::Nil,
    })
}

/// (package-import name …) — adds imports to the current package.
pub fn import(ctx: &Context, args: &[Val]) -> Result<Val> {
    let current = ctx.packages.current();
    for arg in args {
        let name = package_name(arg)?;
        let pkg = ctx.packages.get_or_create(&name);
        Package::add_import(&current, pkg);
    }
    Ok(Val::Nil)
}

/// (package-export sym …) — marks symbols as visible to importers.
pub fn export(_ctx: &Context, args: &[Val]) -> Result<Val> {
    for (i, _) in args.iter().enumerate() {
        symbol_arg(args, i)?.set_exported(true);
    }
    Ok(Val::Nil)
}

/// (intern name) — this package's own symbol for the name.
pub fn intern(ctx: &Context, args: &[Val]) -> Result<Val> {
    let name = package_name(&args[0])?;
    let current = ctx.packages.current();
    Ok(Val::Symbol(Package::intern(&current, &name)))
}
