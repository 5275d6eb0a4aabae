//! Interned identifiers. A symbol belongs to the package that interned it and
//! is compared by reference: two mentions of the same name in the same package
//! are the same `Rc<Symbol>`. The back-reference to the home package is weak
//! so that package → symbol → package cycles do not leak.

use std::cell::Cell;
use std::fmt::{self, Display, Formatter};
use std::rc::{Rc, Weak};

use crate::package::{Package, PackageRef};

pub struct Symbol {
    name: String,
    home: Weak<std::cell::RefCell<Package>>,
    exported: Cell<bool>,
}

impl Symbol {
    pub(crate) fn new(name: &str, home: &PackageRef) -> Rc<Symbol> {
        Rc::new(Symbol {
            name: name.to_string(),
            home: Rc::downgrade(home),
            exported: Cell::new(true),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The package this symbol was interned in, if it is still alive.
    pub fn home(&self) -> Option<PackageRef> {
        self.home.upgrade()
    }

    pub fn is_exported(&self) -> bool {
        self.exported.get()
    }

    pub fn set_exported(&self, exported: bool) {
        self.exported.set(exported)
    }

    /// True when the home package is the keywords package (the one whose name
    /// is the empty string).
    pub fn is_keyword(&self) -> bool {
        self.home()
            .map(|p| p.borrow().name() == Some(""))
            .unwrap_or(false)
    }

    /// Qualified name, `package:name`, or the bare name for symbols interned
    /// in the unnamed global package.
    pub fn full_name(&self) -> String {
        match self.home() {
            Some(p) => match p.borrow().name() {
                Some(pkg) => format!("{}:{}", pkg, self.name),
                None => self.name.clone(),
            },
            None => self.name.clone(),
        }
    }
}

/// The short printed form: just the name, with a leading `:` for keywords.
impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_keyword() {
            write!(f, ":{}", self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.full_name())
    }
}
