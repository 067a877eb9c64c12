//! Evaluator for the backend's structured query language.
//!
//! ```text
//! expr       := disjunct ("or" disjunct)*
//! disjunct   := term ("and" term)*
//! term       := "(" expr ")" | column OP literal
//! OP         := "=" | "<>" | "<" | "<=" | ">" | ">="
//! literal    := "quoted \"text\"" | number | true | false
//! ```
//!
//! Cells are compared as numbers when both sides are numeric and as text
//! otherwise. A missing cell reads as empty text.

use crate::coerce::coerce_number;
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Text(String),
    Number(f64),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Compare(String, Op, Literal),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Op(Op),
    Quoted(String),
    Word(String),
}

/// Parses a query. An empty (or blank) query parses to `None`.
pub fn parse(query: &str) -> Result<Option<Expr>, String> {
    let tokens = tokenize(query)?;
    if tokens.is_empty() {
        return Ok(None);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    match parser.peek() {
        None => Ok(Some(expr)),
        Some(token) => Err(format!("unexpected {:?} after expression", token)),
    }
}

fn tokenize(query: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = query.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Op(Op::Eq));
            }
            '<' | '>' => {
                chars.next();
                let op = match (c, chars.peek().copied()) {
                    ('<', Some('>')) => Some(Op::Ne),
                    ('<', Some('=')) => Some(Op::Lte),
                    ('>', Some('=')) => Some(Op::Gte),
                    _ => None,
                };
                match op {
                    Some(op) => {
                        chars.next();
                        tokens.push(Token::Op(op));
                    }
                    None if c == '<' => tokens.push(Token::Op(Op::Lt)),
                    None => tokens.push(Token::Op(Op::Gt)),
                }
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some(escaped) => text.push(escaped),
                            None => return Err("dangling escape".to_string()),
                        },
                        Some('"') => break,
                        Some(other) => text.push(other),
                        None => return Err("unterminated string".to_string()),
                    }
                }
                tokens.push(Token::Quoted(text));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || "()<>=\"".contains(c) {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(Token::Word(word)) if word.eq_ignore_ascii_case(keyword) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let mut parts = vec![self.disjunct()?];
        while self.keyword("or") {
            parts.push(self.disjunct()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Expr::Or(parts)
        })
    }

    fn disjunct(&mut self) -> Result<Expr, String> {
        let mut parts = vec![self.term()?];
        while self.keyword("and") {
            parts.push(self.term()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Expr::And(parts)
        })
    }

    fn term(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Open) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    other => Err(format!("expected ')' but found {:?}", other)),
                }
            }
            Some(Token::Word(column)) => {
                let op = match self.next() {
                    Some(Token::Op(op)) => op,
                    other => {
                        return Err(format!(
                            "expected operator after {} but found {:?}",
                            column, other
                        ))
                    }
                };
                let literal = match self.next() {
                    Some(Token::Quoted(text)) => Literal::Text(text),
                    Some(Token::Word(word)) => word_literal(&word)?,
                    other => {
                        return Err(format!(
                            "expected value after {} but found {:?}",
                            column, other
                        ))
                    }
                };
                Ok(Expr::Compare(column, op, literal))
            }
            other => Err(format!("expected comparison but found {:?}", other)),
        }
    }
}

fn word_literal(word: &str) -> Result<Literal, String> {
    match word {
        "true" => Ok(Literal::Bool(true)),
        "false" => Ok(Literal::Bool(false)),
        _ => word
            .parse::<f64>()
            .map(Literal::Number)
            .map_err(|_| format!("invalid value {}", word)),
    }
}

impl Expr {
    /// Evaluates against a row's cells, keyed by column name.
    pub fn eval(&self, cells: &BTreeMap<String, String>) -> bool {
        match self {
            Expr::And(parts) => parts.iter().all(|part| part.eval(cells)),
            Expr::Or(parts) => parts.iter().any(|part| part.eval(cells)),
            Expr::Compare(column, op, literal) => {
                let cell = cells.get(column).map(String::as_str).unwrap_or("");
                let ordering = match literal {
                    Literal::Number(expected) => match coerce_number(cell) {
                        Some(actual) => actual.partial_cmp(expected),
                        None => return *op == Op::Ne,
                    },
                    Literal::Text(expected) => Some(cell.cmp(expected.as_str())),
                    Literal::Bool(expected) => {
                        let expected = if *expected { "true" } else { "false" };
                        Some(cell.to_ascii_lowercase().as_str().cmp(expected))
                    }
                };
                match ordering {
                    Some(ordering) => accepts(*op, ordering),
                    None => false,
                }
            }
        }
    }
}

fn accepts(op: Op, ordering: Ordering) -> bool {
    match op {
        Op::Eq => ordering == Ordering::Equal,
        Op::Ne => ordering != Ordering::Equal,
        Op::Lt => ordering == Ordering::Less,
        Op::Lte => ordering != Ordering::Greater,
        Op::Gt => ordering == Ordering::Greater,
        Op::Gte => ordering != Ordering::Less,
    }
}

/// Orders two cells the way the backend sorts a column.
pub fn compare_cells(a: Option<&String>, b: Option<&String>) -> Ordering {
    let a = a.map(String::as_str).unwrap_or("");
    let b = b.map(String::as_str).unwrap_or("");
    match (coerce_number(a), coerce_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}
