use log::info;
use serde::Serialize;
use std::fmt;
use std::mem;

/// The different kinds of tokens recognized by the Ember scanner.
///
/// Variants without data represent single‑character or keyword tokens.
/// `STRING(String)` and `NUMBER(f64)` carry their literal values.
/// `IDENTIFIER` is used for user‑defined names.
/// `EOF` marks the end of input.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Serialize)]
pub enum TokenType {
    /// '('
    LEFT_PAREN,

    /// ')'
    RIGHT_PAREN,

    /// '{'
    LEFT_BRACE,

    /// '}'
    RIGHT_BRACE,

    /// ','
    COMMA,

    /// '.'
    DOT,

    /// '-'
    MINUS,

    /// '+'
    PLUS,

    /// ';'
    SEMICOLON,

    /// ':'
    COLON,

    /// '/'
    SLASH,

    /// '*'
    STAR,

    /// '!'
    BANG,

    /// '!='
    BANG_EQUAL,

    /// '='
    EQUAL,

    /// '=='
    EQUAL_EQUAL,

    /// '>'
    GREATER,

    /// '>='
    GREATER_EQUAL,

    /// '<'
    LESS,

    /// '<='
    LESS_EQUAL,

    /// '&&'
    AND,

    /// '||'
    OR,

    /// '&'
    BITWISE_AND,

    /// '|'
    BITWISE_OR,

    /// A user‑defined identifier
    IDENTIFIER,

    /// A string literal (contents without quotes)
    STRING(String),

    /// A numeric literal
    #[serde(rename = "NUMBER")]
    NUMBER(f64),

    /// 'class'
    CLASS,

    /// 'else'
    ELSE,

    /// 'false'
    FALSE,

    /// 'function'
    FUNCTION,

    /// 'for'
    FOR,

    /// 'if'
    IF,

    /// 'null'
    NULL,

    /// 'print'
    PRINT,

    /// 'return'
    RETURN,

    /// 'super'
    SUPER,

    /// 'this'
    THIS,

    /// 'true'
    TRUE,

    /// 'var'
    VAR,

    /// 'while'
    WHILE,

    /// End‑of‑file marker
    EOF,
}

impl PartialEq for TokenType {
    /// Two TokenTypes are equal if they share the same variant
    /// (ignoring any inner data). Uses `mem::discriminant` to compare.
    fn eq(&self, other: &Self) -> bool {
        mem::discriminant(self) == mem::discriminant(other)
    }
}

/// A scanned token, including its type, the original lexeme,
/// and the line number where it was found.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Token {
    /// The category of this token.
    pub token_type: TokenType,

    /// The exact substring from the source that produced this token.
    pub lexeme: String,

    /// 1‑based line number in the source.
    pub line: usize,
}

impl Token {
    /// Create a new Token with the given type, lexeme, and line.
    /// Also logs its creation at INFO level.
    pub fn new(token_type: TokenType, lexeme: &str, line: usize) -> Self {
        info!(
            "Creating new token: type={:?}, lexeme={}, line={}",
            token_type, lexeme, line
        );

        Self {
            token_type,
            lexeme: lexeme.to_string(),
            line,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ── 1. decide literal string ────────────────────────────────────────
        let literal_str: String = match &self.token_type {
            TokenType::STRING(s) => s.clone(),
            TokenType::NUMBER(n) => {
                // 3 → "3.0", 3.14 → "3.14"  (uses a tiny stack buffer)
                if n.fract() == 0.0 {
                    let mut buf: itoa::Buffer = itoa::Buffer::new();
                    format!("{}.0", buf.format(*n as i64))
                } else {
                    n.to_string()
                }
            }
            _ => "null".to_string(),
        };

        // ── 2. variant name without payloads ───────────────────────────────
        let variant: &'static str = match self.token_type {
            TokenType::STRING(_) => "STRING",
            TokenType::NUMBER(_) => "NUMBER",
            TokenType::LEFT_PAREN => "LEFT_PAREN",
            TokenType::RIGHT_PAREN => "RIGHT_PAREN",
            TokenType::LEFT_BRACE => "LEFT_BRACE",
            TokenType::RIGHT_BRACE => "RIGHT_BRACE",
            TokenType::COMMA => "COMMA",
            TokenType::DOT => "DOT",
            TokenType::MINUS => "MINUS",
            TokenType::PLUS => "PLUS",
            TokenType::SEMICOLON => "SEMICOLON",
            TokenType::COLON => "COLON",
            TokenType::SLASH => "SLASH",
            TokenType::STAR => "STAR",
            TokenType::BANG => "BANG",
            TokenType::BANG_EQUAL => "BANG_EQUAL",
            TokenType::EQUAL => "EQUAL",
            TokenType::EQUAL_EQUAL => "EQUAL_EQUAL",
            TokenType::GREATER => "GREATER",
            TokenType::GREATER_EQUAL => "GREATER_EQUAL",
            TokenType::LESS => "LESS",
            TokenType::LESS_EQUAL => "LESS_EQUAL",
            TokenType::AND => "AND",
            TokenType::OR => "OR",
            TokenType::BITWISE_AND => "BITWISE_AND",
            TokenType::BITWISE_OR => "BITWISE_OR",
            TokenType::IDENTIFIER => "IDENTIFIER",
            TokenType::CLASS => "CLASS",
            TokenType::ELSE => "ELSE",
            TokenType::FALSE => "FALSE",
            TokenType::FUNCTION => "FUNCTION",
            TokenType::FOR => "FOR",
            TokenType::IF => "IF",
            TokenType::NULL => "NULL",
            TokenType::PRINT => "PRINT",
            TokenType::RETURN => "RETURN",
            TokenType::SUPER => "SUPER",
            TokenType::THIS => "THIS",
            TokenType::TRUE => "TRUE",
            TokenType::VAR => "VAR",
            TokenType::WHILE => "WHILE",
            TokenType::EOF => "EOF",
        };

        write!(f, "{} {} {}", variant, self.lexeme, literal_str)
    }
}
