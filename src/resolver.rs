//! Static resolver pass for the **Ember** interpreter.
//!
//! This resolver does three things in one AST walk:
//! 1. Build lexical scopes (stack of `HashMap<String,bool>` tracking declared/defined).
//! 2. Report static errors (redeclaration, forward‑read in initializer, invalid
//!    `return`, `this`/`super` misuse, self-inheritance).
//! 3. Tell the interpreter, for *each* variable occurrence, whether it's a local
//!    (and at what depth) or a global—so the interpreter never falls back to
//!    dynamic lookup that would see a later shadowing local.
//!
//! All errors found by the pass are accumulated and reported together; if any
//! occurred, the program must not be evaluated at all (fail-closed).

use crate::error::EmberError;
use crate::expr::{Expr, ExprId};
use crate::interpreter::Interpreter;
use crate::stmt::{FunctionDecl, Stmt};
use crate::token::Token;
use log::{debug, info};
use std::collections::HashMap;
use std::rc::Rc;

/// Are we inside a user function, and which flavor?  Used to validate `return`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
    Initializer,
    Method,
}

/// Are we inside a class body, and does it have a superclass?
/// Used to validate `this` and `super`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

/// Resolver: tracks scopes, enforces static rules, and *records* binding
/// distances (locals vs. globals) by calling back into the interpreter.
pub struct Resolver<'interp> {
    interpreter: &'interp mut Interpreter,
    scopes: Vec<HashMap<String, bool>>, // false=declared, true=defined
    current_function: FunctionType,
    current_class: ClassType,
    errors: Vec<EmberError>,
}

impl<'interp> Resolver<'interp> {
    /// Create a new resolver bound to the given interpreter.
    pub fn new(interpreter: &'interp mut Interpreter) -> Self {
        info!("Resolver instantiated");
        Resolver {
            interpreter,
            scopes: Vec::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
            errors: Vec::new(),
        }
    }

    /// Walk all top‑level statements.  On success the interpreter holds a
    /// complete distance table; on failure *every* error found is returned and
    /// nothing may be evaluated.
    pub fn resolve(mut self, statements: &[Stmt]) -> Result<(), Vec<EmberError>> {
        info!(
            "Beginning resolve pass over {} statement(s)",
            statements.len()
        );

        for stmt in statements {
            self.resolve_stmt(stmt);
        }

        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }

    fn error<S: Into<String>>(&mut self, line: usize, msg: S) {
        self.errors.push(EmberError::resolve(line, msg));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statement resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        debug!("Resolving stmt: {:?}", stmt);
        match stmt {
            Stmt::Block(statements) => {
                // ① Push a new anonymous scope for `{ … }`
                self.begin_scope();
                for s in statements {
                    self.resolve_stmt(s);
                }
                self.end_scope();
            }

            Stmt::Var { name, initializer } => {
                // ② var declaration: declare → resolve initializer → define
                self.declare(name);
                if let Some(expr) = initializer {
                    self.resolve_expr(expr);
                }
                self.define(name);
            }

            Stmt::Function(declaration) => {
                // ③ function declaration: name is visible *inside* its own body
                self.declare(&declaration.name);
                self.define(&declaration.name);
                self.resolve_function(declaration, FunctionType::Function);
            }

            Stmt::Expression(expr) | Stmt::Print(expr) => {
                // ④ just resolve the inner expression
                self.resolve_expr(expr);
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                // ⑤ if
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(eb) = else_branch.as_deref() {
                    self.resolve_stmt(eb);
                }
            }

            Stmt::While { condition, body } => {
                // ⑥ while
                self.resolve_expr(condition);
                self.resolve_stmt(body);
            }

            Stmt::For {
                initializer,
                condition,
                increment,
                body,
            } => {
                // ⑦ for—outer loop‐scope for initializer, then inner for body
                self.begin_scope();
                if let Some(init) = initializer {
                    self.resolve_stmt(init);
                }
                if let Some(cond) = condition {
                    self.resolve_expr(cond);
                }
                if let Some(inc) = increment {
                    self.resolve_expr(inc);
                }

                // body may shadow loop variables
                self.begin_scope();
                self.resolve_stmt(body);
                self.end_scope();

                self.end_scope();
            }

            Stmt::Return { keyword, value } => {
                // ⑧ return only allowed inside a function
                if self.current_function == FunctionType::None {
                    self.error(keyword.line, "'return' used outside of function");
                }
                if let Some(expr) = value {
                    self.resolve_expr(expr);
                }
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.resolve_class(name, superclass.as_ref(), methods),
        }
    }

    /// Class bodies nest scopes as `[super?] → this → (per-method params)`.
    /// The superclass expression itself resolves in the *enclosing* scope.
    fn resolve_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<FunctionDecl>],
    ) {
        let enclosing_class = self.current_class;
        self.current_class = ClassType::Class;

        self.declare(name);
        self.define(name);

        if let Some(sc) = superclass {
            if let Expr::Variable {
                name: super_name, ..
            } = sc
            {
                if super_name.lexeme == name.lexeme {
                    self.error(super_name.line, "A class cannot inherit from itself");
                }
            }

            self.resolve_expr(sc);

            self.current_class = ClassType::Subclass;

            self.begin_scope();
            if let Some(scope) = self.scopes.last_mut() {
                scope.insert("super".to_string(), true);
            }
        }

        self.begin_scope();
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert("this".to_string(), true);
        }

        for method in methods {
            let declaration_type = if method.name.lexeme == "init" {
                FunctionType::Initializer
            } else {
                FunctionType::Method
            };

            self.resolve_function(method, declaration_type);
        }

        self.end_scope();

        if superclass.is_some() {
            self.end_scope();
        }

        self.current_class = enclosing_class;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expression resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_expr(&mut self, expr: &Expr) {
        debug!("Resolving expr: {:?}", expr);
        match expr {
            Expr::Literal(_) => {}

            Expr::Grouping(inner) => {
                self.resolve_expr(inner);
            }

            Expr::Unary { right, .. } => {
                self.resolve_expr(right);
            }

            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }

            Expr::Variable { id, name } => {
                // Cannot read in own initializer
                if let Some(scope) = self.scopes.last() {
                    if scope.get(&name.lexeme) == Some(&false) {
                        self.error(
                            name.line,
                            "Cannot read local variable in its own initializer",
                        );
                    }
                }
                // ✅ Bind either local *or* global
                self.resolve_local(*id, name);
            }

            Expr::Assign { id, name, value } => {
                // First resolve RHS, then bind LHS
                self.resolve_expr(value);
                self.resolve_local(*id, name);
            }

            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee);
                for arg in arguments {
                    self.resolve_expr(arg);
                }
            }

            Expr::Get { object, .. } => self.resolve_expr(object),

            Expr::Set { object, value, .. } => {
                self.resolve_expr(object);
                self.resolve_expr(value);
            }

            Expr::This { id, keyword } => {
                if self.current_class == ClassType::None {
                    self.error(keyword.line, "Cannot use 'this' outside of a class");
                    return;
                }

                self.resolve_local(*id, keyword);
            }

            Expr::Super { id, keyword, .. } => {
                match self.current_class {
                    ClassType::None => {
                        self.error(keyword.line, "Cannot use 'super' outside of a class");
                        return;
                    }

                    ClassType::Class => {
                        self.error(
                            keyword.line,
                            "Cannot use 'super' in a class with no superclass",
                        );
                        return;
                    }

                    ClassType::Subclass => {}
                }

                self.resolve_local(*id, keyword);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Function helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Enter a fresh scope for a function's parameters + body.
    fn resolve_function(&mut self, declaration: &FunctionDecl, ftype: FunctionType) {
        let enclosing = self.current_function;
        self.current_function = ftype;

        self.begin_scope();
        for param in &declaration.params {
            self.declare(param);
            self.define(param);
        }
        for stmt in &declaration.body {
            self.resolve_stmt(stmt);
        }
        self.end_scope();

        self.current_function = enclosing;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scope management
    // ─────────────────────────────────────────────────────────────────────────

    #[inline]
    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    #[inline]
    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            if scope.contains_key(&name.lexeme) {
                self.errors.push(EmberError::resolve(
                    name.line,
                    "Variable already declared in this scope",
                ));
                return;
            }
            scope.insert(name.lexeme.clone(), false);
        }
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), true);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Binding‑distance helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Record this variable occurrence as either:
    ///  - a local at depth `d`, or
    ///  - a global if not found in *any* scope (nothing recorded; the
    ///    interpreter then reads through the global frame at runtime).
    fn resolve_local(&mut self, id: ExprId, name: &Token) {
        // 1. check innermost → outermost
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(&name.lexeme) {
                debug!("Resolved '{}' at depth {}", name.lexeme, depth);
                self.interpreter.note_local(id, depth);
                return;
            }
        }

        // 2. not found in any local scope ⇒ global
        debug!("Resolved '{}' as global", name.lexeme);
    }
}
