use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::class::EmberInstance;
use crate::environment::Environment;
use crate::error::{EmberError, RuntimeErrorKind};
use crate::interpreter::{EResult, Interpreter, Unwind};
use crate::stmt::FunctionDecl;
use crate::value::Value;

/// A user-defined function or method.
///
/// Pairs a shared declaration with the frame that was current when the
/// declaration executed (its closure).  The `is_initializer` flag makes
/// `init` methods yield `this` no matter how the body exits.
pub struct EmberFunction {
    declaration: Rc<FunctionDecl>,
    closure: Rc<RefCell<Environment>>,
    is_initializer: bool,
}

impl EmberFunction {
    pub fn new(
        declaration: Rc<FunctionDecl>,
        closure: Rc<RefCell<Environment>>,
        is_initializer: bool,
    ) -> Self {
        Self {
            declaration,
            closure,
            is_initializer,
        }
    }

    pub fn name(&self) -> &str {
        &self.declaration.name.lexeme
    }

    pub fn arity(&self) -> usize {
        self.declaration.params.len()
    }

    /// Invoke the function: a fresh frame parented at the closure, parameters
    /// bound positionally, then the body.  Falling off the end yields `null`;
    /// a `return` unwind yields its value.  Initializers always yield `this`,
    /// discarding any explicit return value.
    pub fn call(&self, interpreter: &mut Interpreter, arguments: &[Value]) -> EResult<Value> {
        debug!("Calling function '{}'", self.name());

        let environment = Rc::new(RefCell::new(Environment::with_enclosing(
            self.closure.clone(),
        )));

        for (param, argument) in self.declaration.params.iter().zip(arguments.iter()) {
            environment
                .borrow_mut()
                .define(&param.lexeme, argument.clone());
        }

        match interpreter.execute_block(&self.declaration.body, environment) {
            Ok(()) => {
                if self.is_initializer {
                    self.this_binding()
                } else {
                    Ok(Value::Null)
                }
            }

            Err(Unwind::Return(value)) => {
                if self.is_initializer {
                    self.this_binding()
                } else {
                    Ok(value)
                }
            }

            Err(failure) => Err(failure),
        }
    }

    /// Re-close the function over a frame that defines `this` = `instance`.
    /// Produces a fresh value each time; bound methods carry no identity.
    pub fn bind(&self, instance: Rc<RefCell<EmberInstance>>) -> EmberFunction {
        let mut environment = Environment::with_enclosing(self.closure.clone());
        environment.define("this", Value::Instance(instance));

        EmberFunction {
            declaration: self.declaration.clone(),
            closure: Rc::new(RefCell::new(environment)),
            is_initializer: self.is_initializer,
        }
    }

    /// `this` lives at distance 0 in an initializer's closure (the frame
    /// created by `bind`).
    fn this_binding(&self) -> EResult<Value> {
        self.closure.borrow().get_at(0, "this").ok_or_else(|| {
            Unwind::Failure(EmberError::runtime(
                RuntimeErrorKind::UndefinedVariable,
                self.declaration.name.line,
                "Undefined variable 'this'.",
            ))
        })
    }
}

impl fmt::Debug for EmberFunction {
    // keeps Debug output finite: the closure chain may be cyclic
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.name())
    }
}
