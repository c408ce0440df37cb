//! Binding Environment: loop variables visible during macro expansion
use crate::value::Value;
use indexmap::IndexMap;

/// A chain of scopes; lookups walk from the innermost scope outwards
#[derive(Debug, Default)]
pub struct Scope<'p> {
    parent: Option<&'p Scope<'p>>,
    bindings: IndexMap<String, Value>,
}

impl<'p> Scope<'p> {
    pub fn root() -> Self {
        Self::default()
    }

    /// New innermost scope; its bindings shadow the parent's
    pub fn child<'a>(&'a self) -> Scope<'a> {
        Scope {
            parent: Some(self),
            bindings: Default::default(),
        }
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.bindings.get(name) {
            Some(value) => Some(value),
            None => self.parent.and_then(|parent| parent.get(name)),
        }
    }

    /// Whether no scope in the chain binds anything
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty() && self.parent.map_or(true, Scope::is_empty)
    }
}
