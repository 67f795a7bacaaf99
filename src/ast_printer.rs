use crate::expr::{Expr, LiteralValue};
use crate::stmt::Stmt;

/// Converts expressions and statements to a parenthesised prefix form
/// (no heap allocations except `String` joins for output).
pub struct AstPrinter;

impl AstPrinter {
    pub fn print(expr: &Expr) -> String {
        match expr {
            // ── literals ────────────────────────────────────────────────
            Expr::Literal(lit) => match lit {
                LiteralValue::True => "true".into(),

                LiteralValue::False => "false".into(),

                LiteralValue::Null => "null".into(),

                LiteralValue::Str(s) => s.clone(),

                LiteralValue::Number(n) => {
                    if n.fract() == 0.0 {
                        // 3.0 → 3.0
                        format!("{:.1}", n)
                    } else {
                        n.to_string()
                    }
                }
            },

            // ── grouping ────────────────────────────────────────────────
            Expr::Grouping(inner) => format!("(group {})", Self::print(inner)),

            // ── unary operator ──────────────────────────────────────────
            Expr::Unary { operator, right } => {
                format!("({} {})", operator.lexeme, Self::print(right))
            }

            // ── binary / logical operators ─────────────────────────────
            Expr::Binary {
                left,
                operator,
                right,
            }
            | Expr::Logical {
                left,
                operator,
                right,
            } => format!(
                "({} {} {})",
                operator.lexeme,
                Self::print(left),
                Self::print(right)
            ),

            // ── variables / assignment ─────────────────────────────────
            Expr::Variable { name, .. } => name.lexeme.clone(),

            Expr::Assign { name, value, .. } => {
                format!("(= {} {})", name.lexeme, Self::print(value))
            }

            // ── calls and property access ──────────────────────────────
            Expr::Call {
                callee, arguments, ..
            } => {
                let mut s = format!("(call {}", Self::print(callee));
                for arg in arguments {
                    s.push(' ');
                    s.push_str(&Self::print(arg));
                }
                s.push(')');
                s
            }

            Expr::Get { object, name } => format!("(. {} {})", Self::print(object), name.lexeme),

            Expr::Set {
                object,
                name,
                value,
            } => format!(
                "(.= {} {} {})",
                Self::print(object),
                name.lexeme,
                Self::print(value)
            ),

            Expr::This { .. } => "this".into(),

            Expr::Super { method, .. } => format!("(super {})", method.lexeme),
        }
    }

    pub fn print_stmt(stmt: &Stmt) -> String {
        match stmt {
            Stmt::Expression(expr) => format!("(expr {})", Self::print(expr)),

            Stmt::Print(expr) => format!("(print {})", Self::print(expr)),

            Stmt::Var { name, initializer } => match initializer {
                Some(init) => format!("(var {} {})", name.lexeme, Self::print(init)),
                None => format!("(var {})", name.lexeme),
            },

            Stmt::Block(statements) => {
                let mut s = String::from("(block");
                for stmt in statements {
                    s.push(' ');
                    s.push_str(&Self::print_stmt(stmt));
                }
                s.push(')');
                s
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => match else_branch {
                Some(eb) => format!(
                    "(if {} {} {})",
                    Self::print(condition),
                    Self::print_stmt(then_branch),
                    Self::print_stmt(eb)
                ),
                None => format!(
                    "(if {} {})",
                    Self::print(condition),
                    Self::print_stmt(then_branch)
                ),
            },

            Stmt::While { condition, body } => format!(
                "(while {} {})",
                Self::print(condition),
                Self::print_stmt(body)
            ),

            Stmt::For { body, .. } => format!("(for {})", Self::print_stmt(body)),

            Stmt::Function(declaration) => {
                let mut s = format!("(function {} (", declaration.name.lexeme);
                for (i, param) in declaration.params.iter().enumerate() {
                    if i > 0 {
                        s.push(' ');
                    }
                    s.push_str(&param.lexeme);
                }
                s.push(')');
                for stmt in &declaration.body {
                    s.push(' ');
                    s.push_str(&Self::print_stmt(stmt));
                }
                s.push(')');
                s
            }

            Stmt::Return { value, .. } => match value {
                Some(expr) => format!("(return {})", Self::print(expr)),
                None => "(return)".into(),
            },

            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                let mut s = format!("(class {}", name.lexeme);
                if let Some(sc) = superclass {
                    s.push_str(&format!(" < {}", Self::print(sc)));
                }
                for method in methods {
                    s.push(' ');
                    s.push_str(&Self::print_stmt(&Stmt::Function(method.clone())));
                }
                s.push(')');
                s
            }
        }
    }
}
