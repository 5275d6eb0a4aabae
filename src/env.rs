//! Lexical environments: fixed-width frames of parallel `symbols`/`values`
//! arrays chained through parent pointers. The symbols are compile-time
//! metadata (the compiler resolves names to coordinates; debug output prints
//! them); runtime access always goes through a [VarPos].

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::LanguageError;
use crate::symbol::Symbol;
use crate::value::Val;

pub type EnvRef = Rc<RefCell<Env>>;

#[derive(Debug)]
pub struct Env {
    symbols: Vec<Rc<Symbol>>,
    values: Vec<Val>,
    parent: Option<EnvRef>,
}

/// Coordinates of a lexical variable: `frame` parents up, then `slot` across.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarPos {
    pub frame: usize,
    pub slot: usize,
}

impl Env {
    /// A new frame with one nil-initialized slot per symbol.
    pub fn new(symbols: Vec<Rc<Symbol>>, parent: Option<EnvRef>) -> EnvRef {
        let values = vec![Val::Nil; symbols.len()];
        Rc::new(RefCell::new(Env {
            symbols,
            values,
            parent,
        }))
    }

    pub fn parent(&self) -> Option<EnvRef> {
        self.parent.clone()
    }
}

fn frame_at(env: &EnvRef, frame: usize, slot: usize) -> Result<EnvRef, LanguageError> {
    let mut cursor = env.clone();
    for _ in 0..frame {
        let parent = cursor.borrow().parent();
        match parent {
            Some(p) => cursor = p,
            None => return Err(LanguageError::InvalidVarPos { frame, slot }),
        }
    }
    Ok(cursor)
}

/// Finds the coordinates of `sym` by walking the frame chain outward.
pub fn lookup(env: &Option<EnvRef>, sym: &Rc<Symbol>) -> Option<VarPos> {
    let mut cursor = env.clone();
    let mut frame = 0;

    while let Some(e) = cursor {
        let e = e.borrow();
        for (slot, s) in e.symbols.iter().enumerate() {
            if Rc::ptr_eq(s, sym) {
                return Some(VarPos { frame, slot });
            }
        }
        cursor = e.parent();
        frame += 1;
    }
    None
}

pub fn get_value(env: &EnvRef, pos: VarPos) -> Result<Val, LanguageError> {
    let frame = frame_at(env, pos.frame, pos.slot)?;
    let frame = frame.borrow();
    frame
        .values
        .get(pos.slot)
        .cloned()
        .ok_or(LanguageError::InvalidVarPos {
            frame: pos.frame,
            slot: pos.slot,
        })
}

pub fn set_value(env: &EnvRef, pos: VarPos, val: Val) -> Result<(), LanguageError> {
    let frame = frame_at(env, pos.frame, pos.slot)?;
    let mut frame = frame.borrow_mut();
    match frame.values.get_mut(pos.slot) {
        Some(slot) => {
            *slot = val;
            Ok(())
        }
        None => Err(LanguageError::InvalidVarPos {
            frame: pos.frame,
            slot: pos.slot,
        }),
    }
}

/// The symbol recorded at `pos`, for debug output and sanity checks.
pub fn symbol_at(env: &EnvRef, pos: VarPos) -> Result<Rc<Symbol>, LanguageError> {
    let frame = frame_at(env, pos.frame, pos.slot)?;
    let frame = frame.borrow();
    frame
        .symbols
        .get(pos.slot)
        .cloned()
        .ok_or(LanguageError::InvalidVarPos {
            frame: pos.frame,
            slot: pos.slot,
        })
}
