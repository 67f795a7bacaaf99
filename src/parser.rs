/*!
Recursive‑descent parser for Ember.

Grammar (EBNF — condensed)
--------------------------

```
program        → declaration* EOF ;
declaration    → classDecl | funDecl | varDecl | statement ;
classDecl      → "class" IDENT ( "<" IDENT )? "{" method* "}" ;
method         → IDENT "(" parameters? ")" block ;
funDecl        → "function" IDENT "(" parameters? ")" block ;
varDecl        → "var" IDENT ( "=" expression )? ";" ;
statement      → exprStmt | printStmt | whileStmt | forStmt
               | ifStmt | block | returnStmt ;
exprStmt       → expression ";" ;
printStmt      → "print" expression ";" ;
whileStmt      → "while" "(" expression ")" statement ;
forStmt        → "for" "(" ( varDecl | exprStmt | ";" )
                 expression? ";" expression? ")" statement ;
ifStmt         → "if" "(" expression ")" statement ( "else" statement )? ;
block          → "{" declaration* "}" ;
parameters     → IDENT ( "," IDENT )* ;
expression     → assignment ;
assignment     → ( call "." )? IDENT "=" assignment | logic_or ;
logic_or       → logic_and ( "||" logic_and )* ;
logic_and      → equality  ( "&&" equality )* ;
equality       → comparison ( ( "!=" | "==" ) comparison )* ;
comparison     → term ( ( ">" | ">=" | "<" | "<=" ) term )* ;
term           → factor ( ( "-" | "+" ) factor )* ;
factor         → unary ( ( "/" | "*" ) unary )* ;
unary          → ( "!" | "-" ) unary | call ;
call           → primary ( "(" arguments? ")" | "." IDENT )* ;
arguments      → expression ( "," expression )* ;
primary        → NUMBER | STRING | "true" | "false" | "null" | "this"
               | "super" "." IDENT | IDENT | "(" expression ")" ;
```

Each token is consumed once, so parsing is Θ(n) over the token stream.
Error recovery discards tokens up to the next statement boundary
(`synchronize`), letting one parse pass report several errors' worth of
structure without cascading.

The parser is also the authority for node identity: every `Variable`,
`Assign`, `This`, and `Super` node receives a fresh [`ExprId`] from a
monotonic counter.  The REPL seeds the counter of each line's parser with
[`Parser::next_id`] of the previous one so ids stay unique for as long as
closures from earlier lines are alive.
*/

use std::rc::Rc;

use crate::error::{EmberError, Result};
use crate::expr::{Expr, ExprId, LiteralValue};
use crate::stmt::{FunctionDecl, Stmt};
use crate::token::{Token, TokenType};

use log::{debug, info};

/// Top‑level parser over an immutable slice of tokens.
pub struct Parser<'a> {
    tokens: &'a [Token],
    current: usize,
    next_id: ExprId,
}

impl<'a> Parser<'a> {
    /// Construct a new parser with node ids starting at 0.
    pub fn new(tokens: &'a [Token]) -> Self {
        Self::with_first_id(tokens, 0)
    }

    /// Construct a parser whose first node id is `first_id`.
    ///
    /// Used by the REPL to keep ids unique across successive lines.
    pub fn with_first_id(tokens: &'a [Token], first_id: ExprId) -> Self {
        info!(
            "Parser created with {} tokens (ids from {})",
            tokens.len(),
            first_id
        );

        Self {
            tokens,
            current: 0,
            next_id: first_id,
        }
    }

    /// The id the next parsed node would receive.
    pub fn next_id(&self) -> ExprId {
        self.next_id
    }

    #[inline]
    fn node_id(&mut self) -> ExprId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // ───────────────────────── public API ─────────────────────────

    /// Parse an entire program and return its statement list.
    pub fn parse(&mut self) -> Result<Vec<Stmt>> {
        info!("Beginning parse phase");

        let mut statements: Vec<Stmt> = Vec::new();

        while !self.is_at_end() {
            statements.push(self.declaration()?);
        }

        Ok(statements)
    }

    // ──────────────────────── declaration rules ───────────────────

    fn declaration(&mut self) -> Result<Stmt> {
        debug!("Entering declaration");

        let result = if self.matches(TokenType::CLASS) {
            self.class_declaration()
        } else if self.matches(TokenType::FUNCTION) {
            self.function("function")
        } else if self.matches(TokenType::VAR) {
            self.var_declaration()
        } else {
            self.statement()
        };

        if result.is_err() {
            self.synchronize();
        }

        result
    }

    fn class_declaration(&mut self) -> Result<Stmt> {
        let name: Token = self
            .consume(TokenType::IDENTIFIER, "Expected class name")?
            .clone();

        let superclass: Option<Expr> = if self.matches(TokenType::LESS) {
            let super_name = self
                .consume(TokenType::IDENTIFIER, "Expected superclass name")?
                .clone();

            Some(Expr::Variable {
                id: self.node_id(),
                name: super_name,
            })
        } else {
            None
        };

        self.consume(TokenType::LEFT_BRACE, "Expected '{' before class body")?;

        let mut methods: Vec<Rc<FunctionDecl>> = Vec::new();

        while !self.check(TokenType::RIGHT_BRACE) && !self.is_at_end() {
            methods.push(self.function_decl("method")?);
        }

        self.consume(TokenType::RIGHT_BRACE, "Expected '}' after class body")?;

        Ok(Stmt::Class {
            name,
            superclass,
            methods,
        })
    }

    fn function(&mut self, kind: &str) -> Result<Stmt> {
        Ok(Stmt::Function(self.function_decl(kind)?))
    }

    /// Parse `IDENT "(" parameters? ")" block`, the shared shape of
    /// function declarations and class methods.
    fn function_decl(&mut self, kind: &str) -> Result<Rc<FunctionDecl>> {
        let name: Token = self
            .consume(TokenType::IDENTIFIER, &format!("Expected {} name", kind))?
            .clone();

        self.consume(
            TokenType::LEFT_PAREN,
            &format!("Expected '(' after {} name", kind),
        )?;

        let mut params: Vec<Token> = Vec::new();

        if !self.check(TokenType::RIGHT_PAREN) {
            loop {
                if params.len() >= 255 {
                    return Err(EmberError::parse(
                        name.line,
                        "Cannot have more than 255 parameters",
                    ));
                }

                params.push(
                    self.consume(TokenType::IDENTIFIER, "Expected parameter name")?
                        .clone(),
                );

                if !self.matches(TokenType::COMMA) {
                    break;
                }
            }
        }

        self.consume(TokenType::RIGHT_PAREN, "Expected ')' after parameters")?;

        self.consume(
            TokenType::LEFT_BRACE,
            &format!("Expected '{{' before {} body", kind),
        )?;
        let body = self.block()?;

        Ok(Rc::new(FunctionDecl { name, params, body }))
    }

    fn var_declaration(&mut self) -> Result<Stmt> {
        let name: Token = self
            .consume(TokenType::IDENTIFIER, "Expected variable name")?
            .clone();

        let initializer: Option<Expr> = if self.matches(TokenType::EQUAL) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(
            TokenType::SEMICOLON,
            "Expected ';' after variable declaration",
        )?;
        Ok(Stmt::Var { name, initializer })
    }

    // ───────────────────────── statement rules ────────────────────
    fn statement(&mut self) -> Result<Stmt> {
        if self.matches(TokenType::FOR) {
            self.for_statement()
        } else if self.matches(TokenType::IF) {
            self.if_statement()
        } else if self.matches(TokenType::WHILE) {
            self.while_statement()
        } else if self.matches(TokenType::RETURN) {
            self.return_statement()
        } else if self.matches(TokenType::LEFT_BRACE) {
            Ok(Stmt::Block(self.block()?))
        } else if self.matches(TokenType::PRINT) {
            self.print_statement()
        } else {
            self.expression_statement()
        }
    }

    fn for_statement(&mut self) -> Result<Stmt> {
        self.consume(TokenType::LEFT_PAREN, "Expected '(' after 'for'")?;
        let initializer = if self.matches(TokenType::SEMICOLON) {
            None
        } else if self.matches(TokenType::VAR) {
            Some(Box::new(self.var_declaration()?))
        } else {
            Some(Box::new(self.expression_statement()?))
        };
        let condition = if !self.check(TokenType::SEMICOLON) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::SEMICOLON, "Expected ';' after loop condition")?;
        let increment = if !self.check(TokenType::RIGHT_PAREN) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::RIGHT_PAREN, "Expected ')' after for clauses")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            initializer,
            condition,
            increment,
            body,
        })
    }

    fn print_statement(&mut self) -> Result<Stmt> {
        let value: Expr = self.expression()?;

        self.consume(TokenType::SEMICOLON, "Expected ';' after value")?;

        Ok(Stmt::Print(value))
    }

    fn expression_statement(&mut self) -> Result<Stmt> {
        let expr: Expr = self.expression()?;
        self.consume(TokenType::SEMICOLON, "Expected ';' after expression")?;
        Ok(Stmt::Expression(expr))
    }

    fn if_statement(&mut self) -> Result<Stmt> {
        self.consume(TokenType::LEFT_PAREN, "Expected '(' after 'if'")?;
        let condition: Expr = self.expression()?;
        self.consume(TokenType::RIGHT_PAREN, "Expected ')' after condition")?;

        let then_branch: Box<Stmt> = Box::new(self.statement()?);
        let else_branch: Option<Box<Stmt>> = if self.matches(TokenType::ELSE) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> Result<Stmt> {
        self.consume(TokenType::LEFT_PAREN, "Expected '(' after 'while'")?;
        let condition: Expr = self.expression()?;
        self.consume(TokenType::RIGHT_PAREN, "Expected ')' after condition")?;
        let body: Box<Stmt> = Box::new(self.statement()?);

        Ok(Stmt::While { condition, body })
    }

    fn return_statement(&mut self) -> Result<Stmt> {
        let keyword: Token = self.previous().clone();
        let value: Option<Expr> = if !self.check(TokenType::SEMICOLON) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(TokenType::SEMICOLON, "Expected ';' after return value")?;
        Ok(Stmt::Return { keyword, value })
    }

    fn block(&mut self) -> Result<Vec<Stmt>> {
        let mut statements: Vec<Stmt> = Vec::new();

        while !self.check(TokenType::RIGHT_BRACE) && !self.is_at_end() {
            statements.push(self.declaration()?);
        }

        self.consume(TokenType::RIGHT_BRACE, "Expected '}' after block")?;
        Ok(statements)
    }

    // ─────────────────────── expression rules ─────────────────────
    fn expression(&mut self) -> Result<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr> {
        let expr: Expr = self.logical_or()?;

        if self.matches(TokenType::EQUAL) {
            let equals: Token = self.previous().clone();
            let value: Expr = self.assignment()?;

            match expr {
                Expr::Variable { name, .. } => {
                    return Ok(Expr::Assign {
                        id: self.node_id(),
                        name,
                        value: Box::new(value),
                    });
                }

                Expr::Get { object, name } => {
                    return Ok(Expr::Set {
                        object,
                        name,
                        value: Box::new(value),
                    });
                }

                _ => {
                    return Err(EmberError::parse(equals.line, "Invalid assignment target"));
                }
            }
        }

        Ok(expr)
    }

    fn logical_or(&mut self) -> Result<Expr> {
        let mut expr: Expr = self.logical_and()?;

        while self.matches(TokenType::OR) {
            let operator: Token = self.previous().clone();
            let right: Expr = self.logical_and()?;

            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn logical_and(&mut self) -> Result<Expr> {
        let mut expr: Expr = self.equality()?;

        while self.matches(TokenType::AND) {
            let operator: Token = self.previous().clone();
            let right: Expr = self.equality()?;

            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr> {
        let mut expr: Expr = self.comparison()?;

        while self.matches(TokenType::BANG_EQUAL) || self.matches(TokenType::EQUAL_EQUAL) {
            let operator: Token = self.previous().clone();
            let right: Expr = self.comparison()?;

            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr> {
        let mut expr = self.term()?;

        while self.matches(TokenType::GREATER)
            || self.matches(TokenType::GREATER_EQUAL)
            || self.matches(TokenType::LESS)
            || self.matches(TokenType::LESS_EQUAL)
        {
            let operator: Token = self.previous().clone();
            let right: Expr = self.term()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut expr: Expr = self.factor()?;

        while self.matches(TokenType::MINUS) || self.matches(TokenType::PLUS) {
            let operator: Token = self.previous().clone();
            let right: Expr = self.factor()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr> {
        let mut expr: Expr = self.unary()?;

        while self.matches(TokenType::STAR) || self.matches(TokenType::SLASH) {
            let operator: Token = self.previous().clone();
            let right: Expr = self.unary()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.matches(TokenType::BANG) || self.matches(TokenType::MINUS) {
            let operator: Token = self.previous().clone();
            let right: Expr = self.unary()?;
            return Ok(Expr::Unary {
                operator,
                right: Box::new(right),
            });
        }

        self.call()
    }

    fn call(&mut self) -> Result<Expr> {
        let mut expr: Expr = self.primary()?;

        loop {
            if self.matches(TokenType::LEFT_PAREN) {
                expr = self.finish_call(expr)?;
            } else if self.matches(TokenType::DOT) {
                let name: Token = self
                    .consume(TokenType::IDENTIFIER, "Expected property name after '.'")?
                    .clone();

                expr = Expr::Get {
                    object: Box::new(expr),
                    name,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr> {
        let mut arguments: Vec<Expr> = Vec::new();
        if !self.check(TokenType::RIGHT_PAREN) {
            loop {
                if arguments.len() >= 255 {
                    return Err(EmberError::parse(
                        self.peek().line,
                        "Cannot have more than 255 arguments",
                    ));
                }

                arguments.push(self.expression()?);

                if !self.matches(TokenType::COMMA) {
                    break;
                }
            }
        }

        let paren: Token = self
            .consume(TokenType::RIGHT_PAREN, "Expected ')' after arguments")?
            .clone();

        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            arguments,
        })
    }

    fn primary(&mut self) -> Result<Expr> {
        if self.matches(TokenType::FALSE) {
            return Ok(Expr::Literal(LiteralValue::False));
        }
        if self.matches(TokenType::TRUE) {
            return Ok(Expr::Literal(LiteralValue::True));
        }
        if self.matches(TokenType::NULL) {
            return Ok(Expr::Literal(LiteralValue::Null));
        }

        if self.matches(TokenType::NUMBER(0.0)) {
            if let TokenType::NUMBER(n) = self.previous().token_type {
                return Ok(Expr::Literal(LiteralValue::Number(n)));
            }
        }

        if let TokenType::STRING(ref s) = self.peek().token_type {
            let s = s.clone();
            self.advance();
            return Ok(Expr::Literal(LiteralValue::Str(s)));
        }

        if self.matches(TokenType::SUPER) {
            let keyword: Token = self.previous().clone();
            self.consume(TokenType::DOT, "Expected '.' after 'super'")?;
            let method: Token = self
                .consume(TokenType::IDENTIFIER, "Expected superclass method name")?
                .clone();

            return Ok(Expr::Super {
                id: self.node_id(),
                keyword,
                method,
            });
        }

        if self.matches(TokenType::THIS) {
            return Ok(Expr::This {
                id: self.node_id(),
                keyword: self.previous().clone(),
            });
        }

        if self.matches(TokenType::IDENTIFIER) {
            return Ok(Expr::Variable {
                id: self.node_id(),
                name: self.previous().clone(),
            });
        }

        if self.matches(TokenType::LEFT_PAREN) {
            let expr: Expr = self.expression()?;

            self.consume(TokenType::RIGHT_PAREN, "Expected ')' after expression")?;

            return Ok(Expr::Grouping(Box::new(expr)));
        }

        Err(EmberError::parse(self.peek().line, "Expected expression"))
    }

    // ────────────────────── utility helpers ───────────────────────

    #[inline(always)]
    fn matches(&mut self, ttype: TokenType) -> bool {
        if self.check(ttype) {
            self.advance();

            return true;
        }

        false
    }

    #[inline(always)]
    fn consume(&mut self, ttype: TokenType, message: &str) -> Result<&'a Token> {
        if self.check(ttype) {
            return Ok(self.advance());
        }

        Err(EmberError::parse(self.peek().line, message))
    }

    #[inline(always)]
    fn check(&self, ttype: TokenType) -> bool {
        if self.is_at_end() {
            return false;
        }

        self.peek().token_type == ttype
    }

    #[inline(always)]
    fn advance(&mut self) -> &'a Token {
        if !self.is_at_end() {
            self.current += 1;
        }

        self.previous()
    }

    #[inline(always)]
    fn is_at_end(&self) -> bool {
        matches!(self.peek().token_type, TokenType::EOF)
    }

    #[inline(always)]
    fn peek(&self) -> &'a Token {
        &self.tokens[self.current]
    }

    #[inline(always)]
    fn previous(&self) -> &'a Token {
        &self.tokens[self.current - 1]
    }

    /// Discards tokens until it thinks it is at a statement boundary.
    fn synchronize(&mut self) {
        self.advance(); // skip the token that caused the error

        while !self.is_at_end() {
            if matches!(self.previous().token_type, TokenType::SEMICOLON) {
                return;
            }

            match self.peek().token_type {
                TokenType::CLASS
                | TokenType::FUNCTION
                | TokenType::VAR
                | TokenType::FOR
                | TokenType::IF
                | TokenType::WHILE
                | TokenType::PRINT
                | TokenType::RETURN => return,
                _ => {}
            }

            self.advance();
        }
    }
}
