//! Lexical scopes and temporal-dead-zone collection
//!
//! Before compiling eval code the runtime gathers every binding that is
//! declared but not yet initialized in the enclosing scope chain. The compiler
//! needs this set to emit "used before initialization" checks.

use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashSet;
use indexmap::{IndexMap, IndexSet};

/// Ordered set of binding names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableEnvironment {
    names: IndexSet<Rc<str>>,
}

impl VariableEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the name was already present
    pub fn insert(
        &mut self,
        name: Rc<str>,
    ) -> bool {
        self.names.insert(name)
    }

    pub fn contains(
        &self,
        name: &str,
    ) -> bool {
        self.names.contains(name)
    }

    /// Shared handle to a stored name
    pub fn get(
        &self,
        name: &str,
    ) -> Option<&Rc<str>> {
        self.names.get(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.iter().map(|name| &**name)
    }
}

/// Declaration form of a lexical binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Let,
    Const,
    Class,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingState {
    pub kind: BindingKind,
    pub initialized: bool,
}

/// Source of the TDZ set handed to the eval compiler
pub trait Scope {
    fn collect_variables_under_tdz(
        &self,
        out: &mut VariableEnvironment,
    );
}

/// Global-level scope with no lexical bindings
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyScope;

impl Scope for EmptyScope {
    fn collect_variables_under_tdz(
        &self,
        _out: &mut VariableEnvironment,
    ) {
    }
}

/// One frame of a lexical scope chain
#[derive(Debug, Default)]
pub struct LexicalScope {
    bindings: RefCell<IndexMap<Rc<str>, BindingState>>,
    parent: Option<Rc<LexicalScope>>,
}

impl LexicalScope {
    /// Create an outermost frame
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Create a frame nested in `self`
    pub fn child(self: &Rc<Self>) -> Rc<Self> {
        Rc::new(Self {
            bindings: RefCell::new(IndexMap::new()),
            parent: Some(Rc::clone(self)),
        })
    }

    pub fn parent(&self) -> Option<&Rc<LexicalScope>> {
        self.parent.as_ref()
    }

    /// Declare an uninitialized binding in this frame
    ///
    /// Redeclaring a name resets it to uninitialized.
    pub fn declare(
        &self,
        name: &str,
        kind: BindingKind,
    ) {
        self.bindings.borrow_mut().insert(
            Rc::from(name),
            BindingState {
                kind,
                initialized: false,
            },
        );
    }

    /// Mark a binding of this frame as initialized
    ///
    /// Returns `false` if the frame does not declare `name`.
    pub fn initialize(
        &self,
        name: &str,
    ) -> bool {
        match self.bindings.borrow_mut().get_mut(name) {
            Some(state) => {
                state.initialized = true;
                true
            }
            None => false,
        }
    }

    pub fn binding(
        &self,
        name: &str,
    ) -> Option<BindingState> {
        self.bindings.borrow().get(name).copied()
    }
}

impl Scope for LexicalScope {
    fn collect_variables_under_tdz(
        &self,
        out: &mut VariableEnvironment,
    ) {
        // Names already resolved by an inner frame shadow outer ones
        let mut seen: HashSet<Rc<str>> = HashSet::new();
        let mut frame = Some(self);
        while let Some(current) = frame {
            for (name, state) in current.bindings.borrow().iter() {
                if !seen.insert(Rc::clone(name)) {
                    continue;
                }
                if !state.initialized {
                    out.insert(Rc::clone(name));
                }
            }
            frame = current.parent.as_deref();
        }
    }
}
