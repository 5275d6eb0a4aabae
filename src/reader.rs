//! The reader turns characters into expressions. It owns an append-only
//! character buffer with a single savepoint: [Reader::parse_next] either
//! returns one complete expression, or restores the buffer and reports EOF so
//! the caller can feed it more text. Quote, backquote and unquote are
//! rewritten into plain list forms here, before the compiler ever sees them.

use std::rc::Rc;

use crate::error::ParseError;
use crate::log::Logger;
use crate::package::{Package, Packages};
use crate::symbol::Symbol;
use crate::value::{MapRepr, Val};

/// Names that always intern in the global package, no matter what the
/// current package is.
pub const RESERVED: [&str; 9] = [
    "quote", "begin", "set!", "if", "if*", "while", "lambda", "defmacro", ".",
];

/// The unquote markers. They only exist between reading and backquote
/// expansion.
const UNQUOTE: &str = ",";
const UNQUOTE_SPLICING: &str = ",@";

enum Fail {
    /// The buffer ran out mid-expression; more input may complete it.
    Incomplete,
    Error(ParseError),
}

impl From<ParseError> for Fail {
    fn from(e: ParseError) -> Fail {
        Fail::Error(e)
    }
}

type Scan<T> = Result<T, Fail>;

pub struct Reader {
    chars: Vec<char>,
    pos: usize,
    save: usize,
}

impl Reader {
    pub fn new() -> Reader {
        Reader {
            chars: Vec::new(),
            pos: 0,
            save: 0,
        }
    }

    /// Appends more source text to the buffer.
    pub fn add_string(&mut self, src: &str) {
        self.chars.extend(src.chars());
    }

    /// True when unconsumed, non-blank input remains, i.e. the last parse
    /// stopped on an incomplete expression.
    pub fn has_buffered_input(&self) -> bool {
        let mut i = self.pos;
        while i < self.chars.len() {
            let c = self.chars[i];
            if c == ';' {
                while i < self.chars.len() && self.chars[i] != '\n' {
                    i += 1;
                }
            } else if c.is_whitespace() {
                i += 1;
            } else {
                return true;
            }
        }
        false
    }

    /// Parses one expression. `Ok(None)` is the EOF sentinel: the buffer has
    /// no complete expression left and has been restored to the savepoint.
    pub fn parse_next(
        &mut self,
        pkgs: &Packages,
        logger: &Logger,
    ) -> Result<Option<Val>, ParseError> {
        self.skip_blank();
        self.save = self.pos;

        if self.peek().is_none() {
            return Ok(None);
        }

        match self.read_expr(pkgs, 0) {
            Ok(expr) => {
                if logger.parsing.get() {
                    logger.log(format_args!("parsed: {}", expr));
                }
                Ok(Some(expr))
            }
            Err(Fail::Incomplete) => {
                self.pos = self.save;
                Ok(None)
            }
            Err(Fail::Error(e)) => {
                // Discard whatever follows the failure so the next call
                // starts clean instead of tripping over the same text.
                self.pos = self.chars.len();
                self.save = self.pos;
                Err(e)
            }
        }
    }

    /// Drains every complete expression currently in the buffer.
    pub fn parse_all(&mut self, pkgs: &Packages, logger: &Logger) -> Result<Vec<Val>, ParseError> {
        let mut out = Vec::new();
        while let Some(expr) = self.parse_next(pkgs, logger)? {
            out.push(expr);
        }
        Ok(out)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    /// Skips whitespace and `;` line comments.
    fn skip_blank(&mut self) {
        while let Some(c) = self.peek() {
            if c == ';' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else if c.is_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn read_expr(&mut self, pkgs: &Packages, depth: usize) -> Scan<Val> {
        self.skip_blank();
        match self.peek() {
            None => Err(Fail::Incomplete),
            Some('(') => {
                self.bump();
                self.read_list(pkgs, depth)
            }
            Some('{') => {
                self.bump();
                self.read_map(pkgs, depth)
            }
            Some(')') => Err(ParseError::UnexpectedCloseParen.into()),
            Some('}') => Err(ParseError::UnexpectedCloseBrace.into()),
            Some('"') => {
                self.bump();
                self.read_string()
            }
            Some('\'') => {
                self.bump();
                let expr = self.read_expr(pkgs, depth)?;
                Ok(quote_form(pkgs, expr))
            }
            Some('`') => {
                self.bump();
                let expr = self.read_expr(pkgs, depth + 1)?;
                expand_backquote(pkgs, &expr).map_err(Fail::Error)
            }
            Some(',') => {
                self.bump();
                if depth == 0 {
                    return Err(ParseError::UnquoteOutsideBackquote.into());
                }
                let marker = if self.peek() == Some('@') {
                    self.bump();
                    UNQUOTE_SPLICING
                } else {
                    UNQUOTE
                };
                let expr = self.read_expr(pkgs, depth - 1)?;
                let marker = Package::intern(&pkgs.global(), marker);
                Ok(Val::list_from(vec![Val::Symbol(marker), expr]))
            }
            Some(_) => self.read_atom(pkgs).map_err(Fail::Error),
        }
    }

    fn read_list(&mut self, pkgs: &Packages, depth: usize) -> Scan<Val> {
        let dot = Package::intern(&pkgs.global(), ".");
        let mut items = Vec::new();

        loop {
            self.skip_blank();
            match self.peek() {
                None => return Err(Fail::Incomplete),
                Some(')') => {
                    self.bump();
                    return Ok(Val::list_from(items));
                }
                Some(_) => {
                    let expr = self.read_expr(pkgs, depth)?;
                    if is_symbol(&expr, &dot) {
                        if items.is_empty() {
                            return Err(ParseError::MalformedDottedList.into());
                        }
                        let tail = self.read_expr(pkgs, depth)?;
                        self.skip_blank();
                        return match self.peek() {
                            None => Err(Fail::Incomplete),
                            Some(')') => {
                                self.bump();
                                Ok(Val::list_with_tail(items, tail))
                            }
                            Some(_) => Err(ParseError::MalformedDottedList.into()),
                        };
                    }
                    items.push(expr);
                }
            }
        }
    }

    fn read_map(&mut self, pkgs: &Packages, depth: usize) -> Scan<Val> {
        let mut items: Vec<Val> = Vec::new();

        loop {
            self.skip_blank();
            match self.peek() {
                None => return Err(Fail::Incomplete),
                Some('}') => {
                    self.bump();
                    if items.len() % 2 != 0 {
                        return Err(ParseError::UnevenMapLiteral.into());
                    }
                    let mut map = MapRepr::default();
                    for pair in items.chunks(2) {
                        map.insert(pair[0].clone(), pair[1].clone());
                    }
                    return Ok(Val::Map(Rc::new(map)));
                }
                Some(_) => items.push(self.read_expr(pkgs, depth)?),
            }
        }
    }

    fn read_string(&mut self) -> Scan<Val> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(ParseError::UnterminatedString.into()),
                Some('"') => return Ok(Val::string(out)),
                Some('\\') => match self.bump() {
                    None => return Err(ParseError::UnterminatedString.into()),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(c) => out.push(c),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn read_atom(&mut self, pkgs: &Packages) -> Result<Val, ParseError> {
        let mut token = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '(' | ')' | '{' | '}' | '"' | ';' | '\'' | '`' | ',')
            {
                break;
            }
            token.push(c);
            self.pos += 1;
        }

        if token == "#t" || token == "#T" {
            return Ok(Val::Bool(true));
        }
        if token.starts_with('#') {
            return Ok(Val::Bool(false));
        }

        let first = token.chars().next().unwrap_or(' ');
        if first == '+' || first == '-' || first.is_ascii_digit() {
            if let Ok(n) = token.parse::<i64>() {
                return Ok(Val::I64(n));
            }
            if token.chars().any(|c| c.is_ascii_digit()) {
                if let Ok(f) = token.parse::<f64>() {
                    return Ok(Val::F64(f));
                }
            }
        }

        self.intern_symbol(pkgs, &token)
    }

    fn intern_symbol(&self, pkgs: &Packages, name: &str) -> Result<Val, ParseError> {
        if let Some(idx) = name.find(':') {
            let (pkg_name, sym_name) = (&name[..idx], &name[idx + 1..]);
            let pkg = pkgs
                .get(pkg_name)
                .ok_or_else(|| ParseError::UnknownPackage(pkg_name.to_string()))?;
            return Ok(Val::Symbol(Package::intern(&pkg, sym_name)));
        }

        if RESERVED.contains(&name) {
            return Ok(Val::Symbol(Package::intern(&pkgs.global(), name)));
        }

        Ok(Val::Symbol(Package::resolve_or_intern(
            &pkgs.current(),
            name,
        )))
    }
}

impl Default for Reader {
    fn default() -> Self {
        Reader::new()
    }
}

fn is_symbol(v: &Val, sym: &Rc<Symbol>) -> bool {
    matches!(v, Val::Symbol(s) if Rc::ptr_eq(s, sym))
}

fn quote_form(pkgs: &Packages, expr: Val) -> Val {
    let quote = Package::intern(&pkgs.global(), "quote");
    Val::list_from(vec![Val::Symbol(quote), expr])
}

/// When `v` is a two-element list `(marker e)`, returns `e`.
fn marker_payload(v: &Val, marker: &Rc<Symbol>) -> Option<Val> {
    let (items, tail) = v.to_list()?;
    if tail.is_none() && items.len() == 2 && is_symbol(&items[0], marker) {
        Some(items[1].clone())
    } else {
        None
    }
}

/// Rewrites a backquoted datum into `quote` / `list` / `append` calls:
/// `` `x `` at an atom becomes `(quote x)`; a backquoted list becomes
/// `(append …)` with one operand per element, where `(, e)` contributes
/// `(list e)`, `(,@ e)` contributes `e`, and anything else recurses. A
/// peephole pass collapses an `append` whose operands are all `list` calls.
fn expand_backquote(pkgs: &Packages, v: &Val) -> Result<Val, ParseError> {
    let unquote = Package::intern(&pkgs.global(), UNQUOTE);
    let splicing = Package::intern(&pkgs.global(), UNQUOTE_SPLICING);

    if let Some(e) = marker_payload(v, &unquote) {
        return Ok(e);
    }
    if marker_payload(v, &splicing).is_some() {
        return Err(ParseError::SpliceOutsideList);
    }
    if !v.is_cons() {
        return Ok(quote_form(pkgs, v.clone()));
    }

    let list_sym = Package::intern(&pkgs.core(), "list");
    let append_sym = Package::intern(&pkgs.core(), "append");

    let (items, tail) = v.to_list().unwrap();
    let mut parts = Vec::new();

    for item in &items {
        if let Some(e) = marker_payload(item, &unquote) {
            parts.push(Val::list_from(vec![Val::Symbol(list_sym.clone()), e]));
        } else if let Some(e) = marker_payload(item, &splicing) {
            parts.push(e);
        } else {
            let quoted = expand_backquote(pkgs, item)?;
            parts.push(Val::list_from(vec![Val::Symbol(list_sym.clone()), quoted]));
        }
    }

    if let Some(tail) = tail {
        if let Some(e) = marker_payload(&tail, &unquote) {
            parts.push(e);
        } else {
            parts.push(quote_form(pkgs, tail));
        }
    }

    // Peephole: (append (list a) (list b c)) is just (list a b c).
    let all_lists = parts.iter().all(|p| {
        p.first()
            .map(|head| is_symbol(&head, &list_sym))
            .unwrap_or(false)
            && p.proper_list().is_some()
    });
    if all_lists {
        let mut merged = vec![Val::Symbol(list_sym)];
        for part in &parts {
            merged.extend(part.proper_list().unwrap().into_iter().skip(1));
        }
        return Ok(Val::list_from(merged));
    }

    let mut form = vec![Val::Symbol(append_sym)];
    form.extend(parts);
    Ok(Val::list_from(form))
}
