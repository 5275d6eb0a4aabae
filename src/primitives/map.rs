//! Map primitives. Maps are immutable: `map-set` and `map-remove` return new
//! maps and leave the original untouched.

use std::rc::Rc;

use crate::context::Context;
use crate::error::{LanguageError, Result};
use crate::primitives::map_arg;
use crate::value::{MapRepr, Val};

/// (make-map k v …) — alternating keys and values.
pub fn make_map(_ctx: &Context, args: &[Val]) -> Result<Val> {
    if args.len() % 2 != 0 {
        return Err(LanguageError::WrongArgCount {
            expected: args.len() + 1,
            got: args.len(),
        }
        .into());
    }
    let mut map = MapRepr::default();
    for pair in args.chunks(2) {
        map.insert(pair[0].clone(), pair[1].clone());
    }
    Ok(Val::Map(Rc::new(map)))
}

/// (map-get m k) or (map-get m k default)
pub fn get(_ctx: &Context, args: &[Val]) -> Result<Val> {
    let map = map_arg(args, 0)?;
    match map.get(&args[1]) {
        Some(v) => Ok(v.clone()),
        None => Ok(args.get(2).cloned().unwrap_or(Val::Nil)),
    }
}

/// (map-set m k v) — a new map with the entry added.
pub fn set(_ctx: &Context, args: &[Val]) -> Result<Val> {
    let map = map_arg(args, 0)?;
    Ok(Val::Map(Rc::new(
        map.update(args[1].clone(), args[2].clone()),
    )))
}

/// (map-remove m k) — a new map without the key.
pub fn remove(_ctx: &Context, args: &[Val]) -> Result<Val> {
    let map = map_arg(args, 0)?;
    Ok(Val::Map(Rc::new(map.without(&args[1]))))
}

/// (map-length m)
pub fn length(_ctx: &Context, args: &[Val]) -> Result<Val> {
    let map = map_arg(args, 0)?;
    Ok(Val::I64(map.len() as i64))
}

/// (map-keys m)
pub fn keys(_ctx: &Context, args: &[Val]) -> Result<Val> {
    let map = map_arg(args, 0)?;
    Ok(Val::list_from(map.keys().cloned().collect::<Vec<_>>()))
}

/// (map-values m)
pub fn values(_ctx: &Context, args: &[Val]) -> Result<Val> {
    let map = map_arg(args, 0)?;
    Ok(Val::list_from(map.values().cloned().collect::<Vec<_>>()))
}

/// (map-has? m k)
pub fn has(_ctx: &Context, args: &[Val]) -> Result<Val> {
    let map = map_arg(args, 0)?;
    Ok(Val::Bool(map.contains_key(&args[1])))
}
