//! Lexical environments.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use pagelet_transpile::ast::Name;

use crate::value::Value;

/// Shared handle to a scope; closures keep their defining scope alive.
pub type ScopeRef = Rc<Scope>;

struct Binding {
    /// `None` while a `let`/`const` is in its temporal dead zone
    value: Option<Value>,
    mutable: bool,
}

/// One lexical environment: a block, a function body or the global scope.
pub struct Scope {
    bindings: RefCell<HashMap<Name, Binding>>,
    parent: Option<ScopeRef>,
    /// `this` of a non-arrow function scope
    this: Option<Value>,
}

/// Result of resolving an identifier.
pub enum Lookup {
    Found(Value),
    Uninitialized,
    Missing,
}

/// Why an assignment to a name failed.
#[derive(Debug, PartialEq, Eq)]
pub enum AssignError {
    Missing,
    Constant,
    Uninitialized,
}

impl Scope {
    /// The global scope. `this` is `undefined` at the top level.
    pub fn root() -> ScopeRef {
        Rc::new(Self {
            bindings: RefCell::new(HashMap::new()),
            parent: None,
            this: Some(Value::Undefined),
        })
    }

    /// A block scope nested in `parent`.
    pub fn child(parent: &ScopeRef) -> ScopeRef {
        Rc::new(Self {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(parent.clone()),
            this: None,
        })
    }

    /// A function scope. Arrows pass `None` so `this` resolves lexically.
    pub fn function(parent: &ScopeRef, this: Option<Value>) -> ScopeRef {
        Rc::new(Self {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(parent.clone()),
            this,
        })
    }

    /// Create or replace a binding in this scope.
    pub fn declare(&self, name: Name, value: Option<Value>, mutable: bool) {
        self.bindings.borrow_mut().insert(name, Binding { value, mutable });
    }

    /// Hoist a `var`: create it as `undefined` unless it already exists.
    pub fn declare_var(&self, name: &Name) {
        self.bindings
            .borrow_mut()
            .entry(name.clone())
            .or_insert(Binding { value: Some(Value::Undefined), mutable: true });
    }

    /// Resolve `name` through the scope chain.
    pub fn lookup(&self, name: &str) -> Lookup {
        let mut scope = self;
        loop {
            if let Some(binding) = scope.bindings.borrow().get(name) {
                return match &binding.value {
                    Some(value) => Lookup::Found(value.clone()),
                    None => Lookup::Uninitialized,
                };
            }
            match &scope.parent {
                Some(parent) => scope = parent.as_ref(),
                None => return Lookup::Missing,
            }
        }
    }

    /// Assign to an existing binding somewhere up the chain.
    pub fn assign(&self, name: &str, value: Value) -> Result<(), AssignError> {
        let mut scope = self;
        loop {
            if let Some(binding) = scope.bindings.borrow_mut().get_mut(name) {
                if binding.value.is_none() {
                    return Err(AssignError::Uninitialized);
                }
                if !binding.mutable {
                    return Err(AssignError::Constant);
                }
                binding.value = Some(value);
                return Ok(());
            }
            match &scope.parent {
                Some(parent) => scope = parent.as_ref(),
                None => return Err(AssignError::Missing),
            }
        }
    }

    /// The `this` of the nearest non-arrow function.
    pub fn this(&self) -> Value {
        let mut scope = self;
        loop {
            if let Some(this) = &scope.this {
                return this.clone();
            }
            match &scope.parent {
                Some(parent) => scope = parent.as_ref(),
                None => return Value::Undefined,
            }
        }
    }

    /// Current value of a binding declared directly in this scope.
    pub fn own(&self, name: &str) -> Option<(Value, bool)> {
        self.bindings
            .borrow()
            .get(name)
            .and_then(|b| b.value.clone().map(|v| (v, b.mutable)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_parents() {
        let root = Scope::root();
        root.declare(Rc::from("a"), Some(Value::Number(1.0)), true);
        let inner = Scope::child(&root);
        assert!(matches!(inner.lookup("a"), Lookup::Found(Value::Number(n)) if n == 1.0));
        assert!(matches!(inner.lookup("b"), Lookup::Missing));
    }

    #[test]
    fn const_and_tdz() {
        let root = Scope::root();
        root.declare(Rc::from("c"), Some(Value::Null), false);
        root.declare(Rc::from("t"), None, true);
        assert_eq!(root.assign("c", Value::Undefined), Err(AssignError::Constant));
        assert_eq!(root.assign("t", Value::Undefined), Err(AssignError::Uninitialized));
        assert_eq!(root.assign("zz", Value::Undefined), Err(AssignError::Missing));
        assert!(matches!(root.lookup("t"), Lookup::Uninitialized));
    }

    #[test]
    fn arrows_see_enclosing_this() {
        let root = Scope::root();
        let func = Scope::function(&root, Some(Value::Bool(true)));
        let arrow = Scope::function(&func, None);
        assert!(matches!(arrow.this(), Value::Bool(true)));
    }
}
