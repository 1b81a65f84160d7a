use serde_json::{Number, Value};

use super::lexer::{Spanned, Token};
use super::DependencyRegistry;

/// Expression AST. Dependencies are already resolved to parameter slots.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal; `None` is `undefined`.
    Literal(Option<Value>),
    Array(Vec<Expr>),
    Dependency(usize),
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    Not(Box<Expr>),
    Negate(Box<Expr>),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    StrictEq,
    StrictNe,
    LooseEq,
    LooseNe,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

pub(super) struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    registry: &'a mut DependencyRegistry,
}

impl<'a> Parser<'a> {
    pub(super) fn new(tokens: &'a [Spanned], registry: &'a mut DependencyRegistry) -> Self {
        Parser {
            tokens,
            pos: 0,
            registry,
        }
    }

    fn cur(&self) -> &Spanned {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.cur().token
    }

    fn advance(&mut self) -> Token {
        let t = self.cur().token.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn err(&self, msg: impl Into<String>) -> ParseError {
        ParseError {
            offset: self.cur().offset,
            message: msg.into(),
        }
    }

    fn expect(&mut self, expected: Token, label: &str) -> Result<(), ParseError> {
        if self.peek() == &expected {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected '{}', got {:?}", label, self.peek())))
        }
    }

    /// Parse a complete expression; trailing tokens are an error.
    pub(super) fn parse(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_or()?;
        if self.peek() != &Token::Eof {
            return Err(self.err(format!("unexpected {:?}", self.peek())));
        }
        Ok(expr)
    }

    // -- Precedence levels ---------------------------------------

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.peek() == &Token::Or {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_equality()?;
        while self.peek() == &Token::And {
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Token::StrictEq => CompareOp::StrictEq,
                Token::StrictNe => CompareOp::StrictNe,
                Token::LooseEq => CompareOp::LooseEq,
                Token::LooseNe => CompareOp::LooseNe,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Lt => CompareOp::Lt,
                Token::Lte => CompareOp::Lte,
                Token::Gt => CompareOp::Gt,
                Token::Gte => CompareOp::Gte,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Token::Not => {
                self.advance();
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            Token::Minus => {
                self.advance();
                Ok(Expr::Negate(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let Token::Ident(name) = self.advance() else {
                        return Err(self.err("expected property name after '.'"));
                    };
                    if self.peek() == &Token::LParen {
                        self.advance();
                        let args = self.parse_arguments()?;
                        expr = Expr::Call {
                            object: Box::new(expr),
                            method: name,
                            args,
                        };
                    } else {
                        expr = Expr::Member {
                            object: Box::new(expr),
                            property: name,
                        };
                    }
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_or()?;
                    self.expect(Token::RBracket, "]")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.peek() == &Token::RParen {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            match self.advance() {
                Token::Comma => continue,
                Token::RParen => return Ok(args),
                other => return Err(self.err(format!("expected ',' or ')', got {:?}", other))),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek().clone() {
            Token::Path(path) => {
                self.advance();
                Ok(Expr::Dependency(self.registry.register(&path)))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Some(Value::String(s))))
            }
            Token::Num(n) => {
                self.advance();
                Ok(Expr::Literal(Some(number(n))))
            }
            Token::Ident(word) => {
                self.advance();
                Ok(match word.as_str() {
                    "true" => Expr::Literal(Some(Value::Bool(true))),
                    "false" => Expr::Literal(Some(Value::Bool(false))),
                    "null" => Expr::Literal(Some(Value::Null)),
                    "undefined" => Expr::Literal(None),
                    // A bare name reads the current node's child.
                    _ => Expr::Dependency(self.registry.register(&word)),
                })
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_or()?;
                self.expect(Token::RParen, ")")?;
                Ok(inner)
            }
            Token::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if self.peek() == &Token::RBracket {
                    self.advance();
                    return Ok(Expr::Array(items));
                }
                loop {
                    items.push(self.parse_or()?);
                    match self.advance() {
                        Token::Comma => continue,
                        Token::RBracket => return Ok(Expr::Array(items)),
                        other => {
                            return Err(self.err(format!("expected ',' or ']', got {:?}", other)))
                        }
                    }
                }
            }
            other => Err(self.err(format!("expected expression, got {:?}", other))),
        }
    }
}

/// Build a JSON number, keeping integral values as integers.
pub(crate) fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}
