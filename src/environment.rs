use crate::error::{EmberError, RuntimeErrorKind};
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A single level of variable storage.
///
/// The `enclosing` link is fixed at construction and never reassigned; a
/// frame is kept alive by whichever closures, bound methods, or interpreter
/// contexts still reference it, not by the block that created it.
#[derive(Debug, Clone)]
pub struct Environment {
    values: HashMap<String, Value>,
    pub enclosing: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    /// The top-level (global) frame: no parent.
    pub fn new() -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: None,
        }
    }

    /// A frame nested inside `enclosing`.
    pub fn with_enclosing(enclosing: Rc<RefCell<Environment>>) -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    /// Insert or overwrite a binding in *this* frame.  Redefinition is
    /// permitted; it is what makes shadowing and rebinding builtins work.
    pub fn define(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    /// Look `name` up in this frame, then outward through the chain.
    pub fn get(&self, name: &str, line: usize) -> Result<Value, EmberError> {
        if let Some(value) = self.values.get(name) {
            Ok(value.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(name, line)
        } else {
            Err(EmberError::runtime(
                RuntimeErrorKind::UndefinedVariable,
                line,
                format!("Undefined variable '{}'.", name),
            ))
        }
    }

    /// Overwrite an *existing* binding, searching outward through the chain.
    /// Assignment never implicitly declares.
    pub fn assign(&mut self, name: &str, value: Value, line: usize) -> Result<(), EmberError> {
        if self.values.contains_key(name) {
            self.values.insert(name.to_string(), value);
            Ok(())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(name, value, line)
        } else {
            Err(EmberError::runtime(
                RuntimeErrorKind::UndefinedVariable,
                line,
                format!("Undefined variable '{}'.", name),
            ))
        }
    }

    /// Read `name` in the frame exactly `distance` parent links away.
    ///
    /// The resolver guarantees the binding exists there; `None` therefore
    /// signals an interpreter invariant breach, not a user error.
    pub fn get_at(&self, distance: usize, name: &str) -> Option<Value> {
        if distance == 0 {
            self.values.get(name).cloned()
        } else {
            self.enclosing
                .as_ref()?
                .borrow()
                .get_at(distance - 1, name)
        }
    }

    /// Write `name` in the frame exactly `distance` parent links away.
    /// Returns `false` if the binding is absent there (see [`Environment::get_at`]).
    pub fn assign_at(&mut self, distance: usize, name: &str, value: Value) -> bool {
        if distance == 0 {
            match self.values.get_mut(name) {
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => false,
            }
        } else {
            match &self.enclosing {
                Some(enclosing) => enclosing.borrow_mut().assign_at(distance - 1, name, value),
                None => false,
            }
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
