use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, info};

use crate::class::{EmberClass, EmberInstance};
use crate::environment::Environment;
use crate::error::{EmberError, RuntimeErrorKind};
use crate::expr::{Expr, ExprId, LiteralValue};
use crate::function::EmberFunction;
use crate::stmt::{FunctionDecl, Stmt};
use crate::token::{Token, TokenType};
use crate::value::Value;

/// Why evaluation of the current statement stopped early.
///
/// `Return` is the non-local transfer of a `return` statement: it unwinds to
/// the nearest enclosing function call and is invisible beyond it.  It is
/// deliberately *not* an error type; only `Failure` ever reaches diagnostics.
#[derive(Debug)]
pub enum Unwind {
    /// A runtime failure propagating to the top-level statement boundary.
    Failure(EmberError),

    /// `return`, carrying its (possibly `null`) value.
    Return(Value),
}

impl From<EmberError> for Unwind {
    fn from(error: EmberError) -> Self {
        Unwind::Failure(error)
    }
}

/// Convenient alias for evaluation results.
pub type EResult<T> = Result<T, Unwind>;

/// The evaluation engine: owns the global frame, tracks the current frame,
/// and consults the resolver-built scope-distance table for every annotated
/// variable reference.
#[derive(Debug)]
pub struct Interpreter {
    pub globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    locals: HashMap<ExprId, usize>,
}

impl Interpreter {
    /// Creates a new Interpreter and defines native functions such as `clock`.
    pub fn new() -> Self {
        info!("Initializing Interpreter");

        let globals = Rc::new(RefCell::new(Environment::new()));

        debug!("Defining native function 'clock'");

        globals.borrow_mut().define(
            "clock",
            Value::NativeFunction {
                name: "clock".to_string(),
                arity: 0,
                func: |_args: &[Value]| {
                    let millis = chrono::Utc::now().timestamp_millis();
                    Ok(Value::Number(millis as f64 / 1000.0))
                },
            },
        );

        Self {
            environment: globals.clone(),
            globals,
            locals: HashMap::new(),
        }
    }

    /// Record that the node `id` resolves `depth` frames out.  Called by the
    /// resolver only; the table is read-only once evaluation starts.
    pub fn note_local(&mut self, id: ExprId, depth: usize) {
        self.locals.insert(id, depth);
    }

    /// Interprets a list of statements (a "program").
    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<(), EmberError> {
        debug!("Interpreting {} statements", statements.len());

        for stmt in statements {
            match self.execute(stmt) {
                Ok(()) => {}

                Err(Unwind::Failure(error)) => return Err(error),

                Err(Unwind::Return(_)) => {
                    // the resolver rejects top-level `return`; nothing to
                    // unwind into, so stop quietly
                    return Ok(());
                }
            }
        }

        info!("Interpretation completed successfully");
        Ok(())
    }

    /// Executes a single statement.
    pub fn execute(&mut self, stmt: &Stmt) -> EResult<()> {
        match stmt {
            Stmt::Expression(expr) => {
                let _ = self.evaluate(expr)?;
                Ok(())
            }

            Stmt::Print(expr) => {
                let value = self.evaluate(expr)?;
                println!("{}", value);
                Ok(())
            }

            Stmt::Var { name, initializer } => {
                debug!("Defining variable '{}'", name.lexeme);

                let value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Null,
                };

                self.environment.borrow_mut().define(&name.lexeme, value);
                Ok(())
            }

            Stmt::Block(statements) => {
                let inner = Rc::new(RefCell::new(Environment::with_enclosing(
                    self.environment.clone(),
                )));

                self.execute_block(statements, inner)
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_stmt) = else_branch {
                    self.execute(else_stmt)
                } else {
                    Ok(())
                }
            }

            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    self.execute(body)?;
                }
                Ok(())
            }

            Stmt::For {
                initializer,
                condition,
                increment,
                body,
            } => {
                // the loop header gets its own frame, like a block
                let loop_env = Rc::new(RefCell::new(Environment::with_enclosing(
                    self.environment.clone(),
                )));

                let previous = std::mem::replace(&mut self.environment, loop_env);
                let result = self.run_for(initializer, condition, increment, body);
                self.environment = previous;

                result
            }

            Stmt::Function(declaration) => {
                debug!("Defining function '{}'", declaration.name.lexeme);

                let function = EmberFunction::new(
                    declaration.clone(),
                    self.environment.clone(),
                    false,
                );

                self.environment
                    .borrow_mut()
                    .define(&declaration.name.lexeme, Value::Function(Rc::new(function)));

                Ok(())
            }

            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Null,
                };

                debug!("Returning value: {}", value);
                Err(Unwind::Return(value))
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.execute_class(name, superclass.as_ref(), methods),
        }
    }

    /// Executes `statements` with `environment` as the current frame,
    /// restoring the previous frame afterwards even when unwinding.
    pub fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: Rc<RefCell<Environment>>,
    ) -> EResult<()> {
        let previous = std::mem::replace(&mut self.environment, environment);

        let mut result = Ok(());
        for stmt in statements {
            result = self.execute(stmt);
            if result.is_err() {
                break;
            }
        }

        self.environment = previous;
        result
    }

    fn run_for(
        &mut self,
        initializer: &Option<Box<Stmt>>,
        condition: &Option<Expr>,
        increment: &Option<Expr>,
        body: &Stmt,
    ) -> EResult<()> {
        if let Some(init) = initializer {
            self.execute(init)?;
        }

        loop {
            let keep_going = match condition {
                Some(cond) => self.evaluate(cond)?.is_truthy(),
                None => true,
            };

            if !keep_going {
                break;
            }

            self.execute(body)?;

            if let Some(incr) = increment {
                self.evaluate(incr)?;
            }
        }

        Ok(())
    }

    fn execute_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<FunctionDecl>],
    ) -> EResult<()> {
        debug!("Declaring class '{}'", name.lexeme);

        let superclass_value: Option<Rc<EmberClass>> = match superclass {
            Some(expr) => match self.evaluate(expr)? {
                Value::Class(class) => Some(class),

                _ => {
                    return Err(EmberError::runtime(
                        RuntimeErrorKind::InvalidSuperclass,
                        expr.line(),
                        "Superclass must be a class.",
                    )
                    .into());
                }
            },

            None => None,
        };

        self.environment.borrow_mut().define(&name.lexeme, Value::Null);

        // methods close over a frame binding `super`, present only when there
        // is a superclass
        let method_env = match &superclass_value {
            Some(class) => {
                let env = Rc::new(RefCell::new(Environment::with_enclosing(
                    self.environment.clone(),
                )));
                env.borrow_mut()
                    .define("super", Value::Class(class.clone()));
                env
            }

            None => self.environment.clone(),
        };

        let mut method_map: HashMap<String, Rc<EmberFunction>> = HashMap::new();
        for method in methods {
            let is_initializer = method.name.lexeme == "init";
            let function = EmberFunction::new(method.clone(), method_env.clone(), is_initializer);
            method_map.insert(method.name.lexeme.clone(), Rc::new(function));
        }

        let class = EmberClass::new(name.lexeme.clone(), superclass_value, method_map);

        self.environment
            .borrow_mut()
            .assign(&name.lexeme, Value::Class(Rc::new(class)), name.line)?;

        Ok(())
    }

    /// Evaluates an expression and returns a Value.
    pub fn evaluate(&mut self, expr: &Expr) -> EResult<Value> {
        match expr {
            Expr::Literal(literal) => Ok(Self::evaluate_literal(literal)),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary { operator, right } => self.evaluate_unary(operator, right),

            Expr::Binary {
                left,
                operator,
                right,
            } => self.evaluate_binary(left, operator, right),

            Expr::Logical {
                left,
                operator,
                right,
            } => self.evaluate_logical(left, operator, right),

            Expr::Variable { id, name } => self.look_up_variable(name, *id),

            Expr::Assign { id, name, value } => {
                let value = self.evaluate(value)?;
                self.assign_variable(name, *id, value.clone())?;
                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee_val = self.evaluate(callee)?;

                let mut arg_values = Vec::with_capacity(arguments.len());
                for arg in arguments {
                    arg_values.push(self.evaluate(arg)?);
                }

                self.invoke_callable(&callee_val, paren, &arg_values)
            }

            Expr::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => {
                    EmberInstance::get(&instance, name).map_err(Unwind::Failure)
                }

                _ => Err(EmberError::runtime(
                    RuntimeErrorKind::Type,
                    name.line,
                    "Only instances have properties.",
                )
                .into()),
            },

            Expr::Set {
                object,
                name,
                value,
            } => match self.evaluate(object)? {
                Value::Instance(instance) => {
                    let value = self.evaluate(value)?;
                    instance.borrow_mut().set(name, value.clone());
                    Ok(value)
                }

                _ => Err(EmberError::runtime(
                    RuntimeErrorKind::Type,
                    name.line,
                    "Only instances have fields.",
                )
                .into()),
            },

            Expr::This { id, keyword } => self.look_up_variable(keyword, *id),

            Expr::Super {
                id,
                keyword,
                method,
            } => self.evaluate_super(*id, keyword, method),
        }
    }

    fn evaluate_literal(literal: &LiteralValue) -> Value {
        match literal {
            LiteralValue::Number(n) => Value::Number(*n),
            LiteralValue::Str(s) => Value::String(s.clone()),
            LiteralValue::True => Value::Bool(true),
            LiteralValue::False => Value::Bool(false),
            LiteralValue::Null => Value::Null,
        }
    }

    /// Evaluates a unary expression.
    fn evaluate_unary(&mut self, operator: &Token, right: &Expr) -> EResult<Value> {
        let right_val = self.evaluate(right)?;

        match operator.token_type {
            TokenType::MINUS => match right_val {
                Value::Number(n) => Ok(Value::Number(-n)),

                _ => Err(EmberError::runtime(
                    RuntimeErrorKind::Type,
                    operator.line,
                    "Operand must be a number",
                )
                .into()),
            },

            TokenType::BANG => Ok(Value::Bool(!right_val.is_truthy())),

            _ => Err(EmberError::runtime(
                RuntimeErrorKind::Type,
                operator.line,
                "Invalid unary operator",
            )
            .into()),
        }
    }

    /// Evaluates a binary (non-logical) expression.  Both operands are
    /// evaluated before the operator is applied.
    fn evaluate_binary(&mut self, left: &Expr, operator: &Token, right: &Expr) -> EResult<Value> {
        let left_val = self.evaluate(left)?;
        let right_val = self.evaluate(right)?;

        let numbers_error = || {
            Unwind::Failure(EmberError::runtime(
                RuntimeErrorKind::Type,
                operator.line,
                "Operands must be numbers.",
            ))
        };

        match operator.token_type {
            TokenType::PLUS => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
                _ => Err(EmberError::runtime(
                    RuntimeErrorKind::Type,
                    operator.line,
                    "Operands must be two numbers or two strings.",
                )
                .into()),
            },

            TokenType::MINUS => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a - b)),
                _ => Err(numbers_error()),
            },

            TokenType::STAR => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a * b)),
                _ => Err(numbers_error()),
            },

            // IEEE-754 semantics: x / 0 is an infinity, not an error
            TokenType::SLASH => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a / b)),
                _ => Err(numbers_error()),
            },

            TokenType::EQUAL_EQUAL => Ok(Value::Bool(left_val == right_val)),

            TokenType::BANG_EQUAL => Ok(Value::Bool(left_val != right_val)),

            TokenType::GREATER => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a > b)),
                _ => Err(numbers_error()),
            },

            TokenType::GREATER_EQUAL => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a >= b)),
                _ => Err(numbers_error()),
            },

            TokenType::LESS => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a < b)),
                _ => Err(numbers_error()),
            },

            TokenType::LESS_EQUAL => match (left_val, right_val) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a <= b)),
                _ => Err(numbers_error()),
            },

            _ => Err(EmberError::runtime(
                RuntimeErrorKind::Type,
                operator.line,
                "Invalid binary operator",
            )
            .into()),
        }
    }

    /// `&&` / `||`: short-circuit, yielding the last evaluated operand's raw
    /// value (no coercion to boolean).
    fn evaluate_logical(&mut self, left: &Expr, operator: &Token, right: &Expr) -> EResult<Value> {
        let left_val = self.evaluate(left)?;

        if operator.token_type == TokenType::OR {
            if left_val.is_truthy() {
                return Ok(left_val);
            }
        } else if !left_val.is_truthy() {
            return Ok(left_val);
        }

        self.evaluate(right)
    }

    /// `super.method`: the superclass sits at the recorded distance, `this`
    /// one frame nearer.  Lookup starts at the *superclass*, bypassing the
    /// instance's dynamic class, which is what makes `super` static relative
    /// to the override chain.
    fn evaluate_super(&mut self, id: ExprId, keyword: &Token, method: &Token) -> EResult<Value> {
        let distance = match self.locals.get(&id) {
            Some(&distance) => distance,
            None => {
                return Err(self.undefined_variable(keyword));
            }
        };

        let superclass = match self.environment.borrow().get_at(distance, "super") {
            Some(Value::Class(class)) => class,
            _ => return Err(self.undefined_variable(keyword)),
        };

        let object = match self.environment.borrow().get_at(distance - 1, "this") {
            Some(Value::Instance(instance)) => instance,
            _ => return Err(self.undefined_variable(keyword)),
        };

        match superclass.find_method(&method.lexeme) {
            Some(found) => Ok(Value::Function(Rc::new(found.bind(object)))),

            None => Err(EmberError::runtime(
                RuntimeErrorKind::UndefinedProperty,
                method.line,
                format!("Undefined property '{}'.", method.lexeme),
            )
            .into()),
        }
    }

    /// Reads a variable/this reference: at its recorded distance if the
    /// resolver noted one, otherwise straight from the global frame.
    fn look_up_variable(&self, name: &Token, id: ExprId) -> EResult<Value> {
        debug!("Looking up variable '{}'", name.lexeme);

        match self.locals.get(&id) {
            Some(&distance) => self
                .environment
                .borrow()
                .get_at(distance, &name.lexeme)
                .ok_or_else(|| self.undefined_variable(name)),

            None => self
                .globals
                .borrow()
                .get(&name.lexeme, name.line)
                .map_err(Unwind::Failure),
        }
    }

    /// Writes a variable: at its recorded distance if the resolver noted one,
    /// otherwise searching outward from the current frame.
    fn assign_variable(&mut self, name: &Token, id: ExprId, value: Value) -> EResult<()> {
        match self.locals.get(&id) {
            Some(&distance) => {
                if self
                    .environment
                    .borrow_mut()
                    .assign_at(distance, &name.lexeme, value)
                {
                    Ok(())
                } else {
                    Err(self.undefined_variable(name))
                }
            }

            None => self
                .environment
                .borrow_mut()
                .assign(&name.lexeme, value, name.line)
                .map_err(Unwind::Failure),
        }
    }

    fn undefined_variable(&self, name: &Token) -> Unwind {
        Unwind::Failure(EmberError::runtime(
            RuntimeErrorKind::UndefinedVariable,
            name.line,
            format!("Undefined variable '{}'.", name.lexeme),
        ))
    }

    /// Invokes a callable value: native function, user function, or class.
    /// The arity check happens here, before any variant-specific work.
    fn invoke_callable(
        &mut self,
        callee_val: &Value,
        paren_token: &Token,
        arg_values: &[Value],
    ) -> EResult<Value> {
        let arity = match callee_val {
            Value::NativeFunction { arity, .. } => *arity,
            Value::Function(function) => function.arity(),
            Value::Class(class) => class.arity(),

            _ => {
                return Err(EmberError::runtime(
                    RuntimeErrorKind::NotCallable,
                    paren_token.line,
                    "Can only call functions and classes.",
                )
                .into());
            }
        };

        if arg_values.len() != arity {
            return Err(EmberError::runtime(
                RuntimeErrorKind::Arity,
                paren_token.line,
                format!(
                    "Expected {} arguments but got {}.",
                    arity,
                    arg_values.len()
                ),
            )
            .into());
        }

        match callee_val {
            Value::NativeFunction { name, func, .. } => {
                debug!("Calling native function '{}'", name);

                func(arg_values)
                    .map_err(|msg| {
                        EmberError::runtime(RuntimeErrorKind::Type, paren_token.line, msg).into()
                    })
            }

            Value::Function(function) => function.call(self, arg_values),

            Value::Class(class) => EmberClass::instantiate(class, self, arg_values),

            _ => unreachable!("arity dispatch rejected non-callables"),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
