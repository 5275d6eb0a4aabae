//! Packages are the namespaces of the language: each one owns an interning
//! table, value bindings, a macro table and an ordered import list. The
//! registry owns the three well-known packages (`core`, the unnamed global
//! package, and the keywords package) plus any user packages created at
//! runtime.

use std::cell::RefCell;
use std::rc::Rc;

use fxhash::FxHashMap;

use crate::symbol::Symbol;
use crate::value::{MacroDef, Val};

pub type PackageRef = Rc<RefCell<Package>>;

pub struct Package {
    /// `None` for the unnamed global package, `Some("")` for keywords.
    name: Option<String>,
    symbols: FxHashMap<String, Rc<Symbol>>,
    bindings: FxHashMap<String, Val>,
    macros: FxHashMap<String, Rc<MacroDef>>,
    imports: Vec<PackageRef>,
}

impl Package {
    fn new(name: Option<&str>) -> PackageRef {
        Rc::new(RefCell::new(Package {
            name: name.map(|s| s.to_string()),
            symbols: FxHashMap::default(),
            bindings: FxHashMap::default(),
            macros: FxHashMap::default(),
            imports: Vec::new(),
        }))
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Finds or creates this package's own symbol for `name`. Never consults
    /// imports; this is what qualified references use.
    pub fn intern(this: &PackageRef, name: &str) -> Rc<Symbol> {
        if let Some(sym) = this.borrow().symbols.get(name) {
            return sym.clone();
        }
        let sym = Symbol::new(name, this);
        this.borrow_mut()
            .symbols
            .insert(name.to_string(), sym.clone());
        sym
    }

    /// Looks the name up shallowly, then through the imports (where only
    /// exported symbols are visible).
    pub fn find(&self, name: &str) -> Option<Rc<Symbol>> {
        if let Some(sym) = self.symbols.get(name) {
            return Some(sym.clone());
        }
        for import in &self.imports {
            if let Some(sym) = import.borrow().symbols.get(name) {
                if sym.is_exported() {
                    return Some(sym.clone());
                }
            }
        }
        None
    }

    /// The parser's rule for unqualified names: reuse a visible symbol if one
    /// exists, intern a fresh one here otherwise.
    pub fn resolve_or_intern(this: &PackageRef, name: &str) -> Rc<Symbol> {
        if let Some(sym) = this.borrow().find(name) {
            return sym;
        }
        Package::intern(this, name)
    }

    /// The value bound to `name`, searching this package then its imports.
    pub fn binding(&self, name: &str) -> Option<Val> {
        if let Some(val) = self.bindings.get(name) {
            return Some(val.clone());
        }
        for import in &self.imports {
            let import = import.borrow();
            if let Some(sym) = import.symbols.get(name) {
                if sym.is_exported() {
                    if let Some(val) = import.bindings.get(name) {
                        return Some(val.clone());
                    }
                }
            }
        }
        None
    }

    pub fn set_binding(&mut self, name: &str, val: Val) {
        self.bindings.insert(name.to_string(), val);
    }

    pub fn remove_binding(&mut self, name: &str) {
        self.bindings.remove(name);
    }

    /// Macro lookup is shallow: a macro lives in its symbol's home package.
    pub fn macro_def(&self, name: &str) -> Option<Rc<MacroDef>> {
        self.macros.get(name).cloned()
    }

    pub fn set_macro(&mut self, name: &str, def: Rc<MacroDef>) {
        self.macros.insert(name.to_string(), def);
    }

    pub fn add_import(this: &PackageRef, import: PackageRef) {
        if Rc::ptr_eq(this, &import) {
            return;
        }
        let mut pkg = this.borrow_mut();
        if !pkg.imports.iter().any(|p| Rc::ptr_eq(p, &import)) {
            pkg.imports.push(import);
        }
    }
}

impl std::fmt::Debug for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Package({:?})", self.name)
    }
}

/// The per-context registry of packages and the current-package pointer.
pub struct Packages {
    named: RefCell<FxHashMap<String, PackageRef>>,
    global: PackageRef,
    core: PackageRef,
    keywords: PackageRef,
    current: RefCell<PackageRef>,
}

pub const CORE_PACKAGE: &str = "core";
pub const KEYWORDS_PACKAGE: &str = "";

impl Packages {
    pub fn new() -> Packages {
        let global = Package::new(None);
        let core = Package::new(Some(CORE_PACKAGE));
        let keywords = Package::new(Some(KEYWORDS_PACKAGE));
        Package::add_import(&global, core.clone());

        let mut named = FxHashMap::default();
        named.insert(CORE_PACKAGE.to_string(), core.clone());
        named.insert(KEYWORDS_PACKAGE.to_string(), keywords.clone());

        Packages {
            named: RefCell::new(named),
            current: RefCell::new(global.clone()),
            global,
            core,
            keywords,
        }
    }

    pub fn global(&self) -> PackageRef {
        self.global.clone()
    }

    pub fn core(&self) -> PackageRef {
        self.core.clone()
    }

    pub fn keywords(&self) -> PackageRef {
        self.keywords.clone()
    }

    pub fn current(&self) -> PackageRef {
        self.current.borrow().clone()
    }

    pub fn set_current(&self, pkg: PackageRef) {
        *self.current.borrow_mut() = pkg;
    }

    pub fn get(&self, name: &str) -> Option<PackageRef> {
        self.named.borrow().get(name).cloned()
    }

    /// Finds a package by name, creating it (with an automatic import of
    /// `core`) on first use.
    pub fn get_or_create(&self, name: &str) -> PackageRef {
        if let Some(pkg) = self.get(name) {
            return pkg;
        }
        let pkg = Package::new(Some(name));
        Package::add_import(&pkg, self.core.clone());
        self.named.borrow_mut().insert(name.to_string(), pkg.clone());
        pkg
    }
}

impl Default for Packages {
    fn default() -> Self {
        Packages::new()
    }
}
