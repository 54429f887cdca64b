//! Recursive-descent parser producing the script AST.

use std::rc::Rc;

use num_bigint::BigInt;

use super::ParseError;
use super::lexer::{Lexer, Spanned, Token};

/// Nesting limit for expressions. Counts parentheses, literals, unary
/// operators and every link of an operator or member chain, so it bounds
/// both the descent here and the depth of the tree the evaluator walks.
const MAX_DEPTH: usize = 64;

#[derive(Debug)]
pub(crate) enum Stmt {
    Expr(Expr),
    Throw(Expr),
    Declare(Rc<str>, Option<Expr>),
    Empty,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Negate,
    Plus,
    TypeOf,
    Void,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    StrictEq,
    StrictNe,
    LooseEq,
    LooseNe,
    Lt,
    Gt,
    Le,
    Ge,
    InstanceOf,
    In,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LogicalOp {
    And,
    Or,
}

#[derive(Debug)]
pub(crate) enum PropName {
    Static(Rc<str>),
    Computed(Expr),
}

#[derive(Debug)]
pub(crate) enum Expr {
    Number(f64),
    BigInt(Rc<BigInt>),
    String(Rc<str>),
    Bool(bool),
    Null,
    This,
    Ident(Rc<str>),
    Array(Vec<Expr>),
    Object(Vec<(PropName, Expr)>),
    Member(Box<Expr>, Rc<str>),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    New(Box<Expr>, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Assign(Box<Expr>, Box<Expr>),
}

pub(crate) fn parse(source: &str) -> Result<Vec<Stmt>, ParseError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        tokens,
        position: 0,
        depth: 0,
    };
    let mut program = Vec::new();
    while !parser.at(&Token::Eof) {
        program.push(parser.statement()?);
    }
    Ok(program)
}

struct Parser {
    tokens: Vec<Spanned>,
    position: usize,
    depth: usize,
}

impl Parser {
    fn current(&self) -> &Spanned {
        // The token stream always ends with Eof and the parser never moves past it.
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn at(&self, token: &Token) -> bool {
        &self.current().token == token
    }

    fn at_punct(&self, punct: &str) -> bool {
        matches!(&self.current().token, Token::Punct(p) if *p == punct)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(&self.current().token, Token::Ident(name) if &**name == keyword)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().token.clone();
        if token != Token::Eof {
            self.position += 1;
        }
        token
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.at_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self) -> ParseError {
        let spanned = self.current();
        let description = match &spanned.token {
            Token::Eof => "end of input".to_string(),
            Token::Punct(p) => format!("token '{p}'"),
            Token::Ident(name) => format!("identifier '{name}'"),
            Token::String(_) => "string".to_string(),
            Token::Number(_) | Token::BigInt(_) => "number".to_string(),
        };
        ParseError::new(format!("Unexpected {description}"), spanned.line, spanned.column)
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), ParseError> {
        if self.eat_punct(punct) { Ok(()) } else { Err(self.unexpected()) }
    }

    fn identifier(&mut self) -> Result<Rc<str>, ParseError> {
        match &self.current().token {
            Token::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn end_statement(&mut self) -> Result<(), ParseError> {
        if self.eat_punct(";") || self.at(&Token::Eof) || self.at_punct("}") {
            return Ok(());
        }
        // Automatic semicolon insertion across line breaks.
        let previous_line = self.tokens[self.position.saturating_sub(1)].line;
        if self.current().line > previous_line {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        if self.eat_punct(";") {
            return Ok(Stmt::Empty);
        }
        if self.eat_keyword("throw") {
            let argument = self.expression()?;
            self.end_statement()?;
            return Ok(Stmt::Throw(argument));
        }
        if self.eat_keyword("let") || self.eat_keyword("const") || self.eat_keyword("var") {
            let name = self.identifier()?;
            let initializer = if self.eat_punct("=") {
                Some(self.expression()?)
            } else {
                None
            };
            self.end_statement()?;
            return Ok(Stmt::Declare(name, initializer));
        }
        let expression = self.expression()?;
        self.end_statement()?;
        Ok(Stmt::Expr(expression))
    }

    fn nest(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            let spanned = self.current();
            return Err(ParseError::new(
                "Expression nested too deeply",
                spanned.line,
                spanned.column,
            ));
        }
        Ok(())
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        self.nest()?;
        let expression = self.assignment()?;
        self.depth = base;
        Ok(expression)
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let target = self.conditional()?;
        if !self.at_punct("=") {
            return Ok(target);
        }
        if !matches!(target, Expr::Ident(_) | Expr::Member(..) | Expr::Index(..)) {
            let spanned = self.current();
            return Err(ParseError::new(
                "Invalid left-hand side in assignment",
                spanned.line,
                spanned.column,
            ));
        }
        self.advance();
        let value = self.expression()?;
        Ok(Expr::Assign(Box::new(target), Box::new(value)))
    }

    fn conditional(&mut self) -> Result<Expr, ParseError> {
        let test = self.logical_or()?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.expression()?;
        self.expect_punct(":")?;
        let alternate = self.expression()?;
        Ok(Expr::Conditional(Box::new(test), Box::new(consequent), Box::new(alternate)))
    }

    fn logical_or(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut left = self.logical_and()?;
        while self.eat_punct("||") {
            self.nest()?;
            let right = self.logical_and()?;
            left = Expr::Logical(LogicalOp::Or, Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut left = self.equality()?;
        while self.eat_punct("&&") {
            self.nest()?;
            let right = self.equality()?;
            left = Expr::Logical(LogicalOp::And, Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut left = self.relational()?;
        loop {
            let op = match &self.current().token {
                Token::Punct("===") => BinaryOp::StrictEq,
                Token::Punct("!==") => BinaryOp::StrictNe,
                Token::Punct("==") => BinaryOp::LooseEq,
                Token::Punct("!=") => BinaryOp::LooseNe,
                _ => break,
            };
            self.advance();
            self.nest()?;
            let right = self.relational()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn relational(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut left = self.additive()?;
        loop {
            let op = match &self.current().token {
                Token::Punct("<") => BinaryOp::Lt,
                Token::Punct(">") => BinaryOp::Gt,
                Token::Punct("<=") => BinaryOp::Le,
                Token::Punct(">=") => BinaryOp::Ge,
                Token::Ident(name) if &**name == "instanceof" => BinaryOp::InstanceOf,
                Token::Ident(name) if &**name == "in" => BinaryOp::In,
                _ => break,
            };
            self.advance();
            self.nest()?;
            let right = self.additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut left = self.multiplicative()?;
        loop {
            let op = match &self.current().token {
                Token::Punct("+") => BinaryOp::Add,
                Token::Punct("-") => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.nest()?;
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut left = self.unary()?;
        loop {
            let op = match &self.current().token {
                Token::Punct("*") => BinaryOp::Mul,
                Token::Punct("/") => BinaryOp::Div,
                Token::Punct("%") => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            self.nest()?;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match &self.current().token {
            Token::Punct("!") => UnaryOp::Not,
            Token::Punct("-") => UnaryOp::Negate,
            Token::Punct("+") => UnaryOp::Plus,
            Token::Ident(name) if &**name == "typeof" => UnaryOp::TypeOf,
            Token::Ident(name) if &**name == "void" => UnaryOp::Void,
            _ => return self.postfix(),
        };
        self.advance();
        let base = self.depth;
        self.nest()?;
        let operand = self.unary()?;
        self.depth = base;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut arguments = Vec::new();
        while !self.at_punct(")") {
            arguments.push(self.expression()?);
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(arguments)
    }

    fn member_suffix(&mut self, object: Expr) -> Result<Option<Expr>, ParseError> {
        if self.eat_punct(".") {
            let name = self.identifier()?;
            return Ok(Some(Expr::Member(Box::new(object), name)));
        }
        if self.eat_punct("[") {
            let index = self.expression()?;
            self.expect_punct("]")?;
            return Ok(Some(Expr::Index(Box::new(object), Box::new(index))));
        }
        Ok(None)
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut expression = if self.eat_keyword("new") {
            let mut callee = self.primary()?;
            loop {
                if self.at_punct(".") || self.at_punct("[") {
                    self.nest()?;
                    callee = self.member_suffix(callee)?.ok_or_else(|| self.unexpected())?;
                } else {
                    break;
                }
            }
            let arguments = if self.eat_punct("(") {
                self.arguments()?
            } else {
                Vec::new()
            };
            Expr::New(Box::new(callee), arguments)
        } else {
            self.primary()?
        };

        loop {
            if self.eat_punct("(") {
                self.nest()?;
                let arguments = self.arguments()?;
                expression = Expr::Call(Box::new(expression), arguments);
            } else if self.at_punct(".") || self.at_punct("[") {
                self.nest()?;
                expression = self
                    .member_suffix(expression)?
                    .ok_or_else(|| self.unexpected())?;
            } else {
                self.depth = base;
                return Ok(expression);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.current().token.clone();
        match token {
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Token::BigInt(b) => {
                self.advance();
                Ok(Expr::BigInt(b))
            }
            Token::String(s) => {
                self.advance();
                Ok(Expr::String(s))
            }
            Token::Ident(name) => {
                self.advance();
                Ok(match &*name {
                    "true" => Expr::Bool(true),
                    "false" => Expr::Bool(false),
                    "null" => Expr::Null,
                    "this" => Expr::This,
                    _ => Expr::Ident(name),
                })
            }
            Token::Punct("(") => {
                self.advance();
                let expression = self.expression()?;
                self.expect_punct(")")?;
                Ok(expression)
            }
            Token::Punct("[") => {
                self.advance();
                let mut elements = Vec::new();
                while !self.at_punct("]") {
                    elements.push(self.expression()?);
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct("]")?;
                Ok(Expr::Array(elements))
            }
            Token::Punct("{") => {
                self.advance();
                self.object_literal()
            }
            _ => Err(self.unexpected()),
        }
    }

    fn object_literal(&mut self) -> Result<Expr, ParseError> {
        let mut properties = Vec::new();
        while !self.at_punct("}") {
            let token = self.current().token.clone();
            let (name, shorthand) = match token {
                Token::Ident(name) => {
                    self.advance();
                    (PropName::Static(name.clone()), Some(name))
                }
                Token::String(s) => {
                    self.advance();
                    (PropName::Static(s), None)
                }
                Token::Number(n) => {
                    self.advance();
                    (PropName::Static(Rc::from(crate::builtins::number_to_string(n))), None)
                }
                Token::Punct("[") => {
                    self.advance();
                    let key = self.expression()?;
                    self.expect_punct("]")?;
                    (PropName::Computed(key), None)
                }
                _ => return Err(self.unexpected()),
            };

            let value = if self.eat_punct(":") {
                self.expression()?
            } else {
                match shorthand {
                    Some(name) => Expr::Ident(name),
                    None => return Err(self.unexpected()),
                }
            };
            properties.push((name, value));

            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct("}")?;
        Ok(Expr::Object(properties))
    }
}
