use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::error::{EmberError, RuntimeErrorKind};
use crate::function::EmberFunction;
use crate::interpreter::{EResult, Interpreter};
use crate::token::Token;
use crate::value::Value;

/// A class: a name, an optional shared superclass, and a table of unbound
/// methods.  The superclass chain is acyclic by construction (a class may
/// not name itself, enforced by the resolver).
pub struct EmberClass {
    pub name: String,
    superclass: Option<Rc<EmberClass>>,
    methods: HashMap<String, Rc<EmberFunction>>,
}

impl EmberClass {
    pub fn new(
        name: String,
        superclass: Option<Rc<EmberClass>>,
        methods: HashMap<String, Rc<EmberFunction>>,
    ) -> Self {
        Self {
            name,
            superclass,
            methods,
        }
    }

    /// Single-inheritance method resolution: own table first, then the
    /// superclass chain.
    pub fn find_method(&self, name: &str) -> Option<Rc<EmberFunction>> {
        if let Some(method) = self.methods.get(name) {
            return Some(method.clone());
        }

        if let Some(superclass) = &self.superclass {
            return superclass.find_method(name);
        }

        None
    }

    /// A class's call arity is its initializer's, or 0 without one.
    pub fn arity(&self) -> usize {
        self.find_method("init").map_or(0, |init| init.arity())
    }

    /// Calling a class allocates an instance, runs a bound `init` if one
    /// exists (its result is discarded), and yields the instance.
    pub fn instantiate(
        class: &Rc<EmberClass>,
        interpreter: &mut Interpreter,
        arguments: &[Value],
    ) -> EResult<Value> {
        debug!("Instantiating class '{}'", class.name);

        let instance = Rc::new(RefCell::new(EmberInstance::new(class.clone())));

        if let Some(initializer) = class.find_method("init") {
            initializer
                .bind(instance.clone())
                .call(interpreter, arguments)?;
        }

        Ok(Value::Instance(instance))
    }
}

impl fmt::Debug for EmberClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<class {}>", self.name)
    }
}

/// An instance: a shared class reference plus its own field map, created
/// empty and populated lazily on first assignment.
pub struct EmberInstance {
    class: Rc<EmberClass>,
    fields: HashMap<String, Value>,
}

impl EmberInstance {
    pub fn new(class: Rc<EmberClass>) -> Self {
        Self {
            class,
            fields: HashMap::new(),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class.name
    }

    /// Property read: fields shadow methods; a found method comes back bound
    /// to this instance.  Reads never create anything.
    pub fn get(instance: &Rc<RefCell<EmberInstance>>, name: &Token) -> Result<Value, EmberError> {
        if let Some(value) = instance.borrow().fields.get(&name.lexeme) {
            return Ok(value.clone());
        }

        let method = instance.borrow().class.find_method(&name.lexeme);
        if let Some(method) = method {
            return Ok(Value::Function(Rc::new(method.bind(instance.clone()))));
        }

        Err(EmberError::runtime(
            RuntimeErrorKind::UndefinedProperty,
            name.line,
            format!("Undefined property '{}'.", name.lexeme),
        ))
    }

    /// Property write: unconditional insert/overwrite.  Fields need no prior
    /// declaration and are not validated against the class.
    pub fn set(&mut self, name: &Token, value: Value) {
        self.fields.insert(name.lexeme.clone(), value);
    }
}

impl fmt::Debug for EmberInstance {
    // keeps Debug output finite: fields may reference this instance
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} instance", self.class.name)
    }
}
