//! Recursive descent parser for the atom selection language.

use crate::select::ast::*;
use crate::select::error::SelectionError;
use crate::select::token::*;

pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    input: String,
}

impl Parser {
    pub fn new(tokens: Vec<SpannedToken>, input: String) -> Self {
        Self {
            tokens,
            pos: 0,
            input,
        }
    }

    pub fn parse(mut self) -> Result<Expr, SelectionError> {
        let expr = self.parse_or()?;
        if !self.at_eof() {
            return Err(self.err_here(format!("unexpected token {:?}", self.current().token)));
        }
        Ok(expr)
    }

    fn current(&self) -> &SpannedToken {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn at_eof(&self) -> bool {
        self.current().token == Token::Eof
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn err_here(&self, msg: impl Into<String>) -> SelectionError {
        let (start, end) = self.current().span;
        SelectionError::new(msg)
            .with_span(start, end)
            .with_input(self.input.clone())
    }

    fn expect(&mut self, expected: &Token) -> Result<(), SelectionError> {
        if std::mem::discriminant(&self.current().token) == std::mem::discriminant(expected) {
            self.advance();
            Ok(())
        } else {
            Err(self.err_here(format!(
                "expected {:?}, found {:?}",
                expected,
                self.current().token
            )))
        }
    }

    // or_expr = and_expr ("or" and_expr)*
    fn parse_or(&mut self) -> Result<Expr, SelectionError> {
        let mut left = self.parse_and()?;
        while self.current().token == Token::Or {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // and_expr = not_expr ("and" not_expr)*
    fn parse_and(&mut self) -> Result<Expr, SelectionError> {
        let mut left = self.parse_not()?;
        while self.current().token == Token::And {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // not_expr = "not" not_expr | atom_expr
    fn parse_not(&mut self) -> Result<Expr, SelectionError> {
        if self.current().token == Token::Not {
            self.advance();
            Ok(Expr::Not(Box::new(self.parse_not()?)))
        } else {
            self.parse_atom()
        }
    }

    // atom_expr = "(" or_expr ")" | within_expr | keyword_expr | convenience
    fn parse_atom(&mut self) -> Result<Expr, SelectionError> {
        let convenience = |kw| Ok(Expr::Convenience(kw));
        match &self.current().token {
            Token::LParen => {
                self.advance();
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::Within => self.parse_within(),
            Token::Name | Token::Resname | Token::Segid | Token::Type => self.parse_string_kw(),
            Token::Mass | Token::Charge => self.parse_numeric_kw(),
            Token::Resid | Token::Index => self.parse_range_kw(),
            Token::Protein => {
                self.advance();
                convenience(ConvenienceKeyword::Protein)
            }
            Token::Water => {
                self.advance();
                convenience(ConvenienceKeyword::Water)
            }
            Token::Backbone => {
                self.advance();
                convenience(ConvenienceKeyword::Backbone)
            }
            Token::Sidechain => {
                self.advance();
                convenience(ConvenienceKeyword::Sidechain)
            }
            Token::Hydrogen => {
                self.advance();
                convenience(ConvenienceKeyword::Hydrogen)
            }
            Token::All => {
                self.advance();
                convenience(ConvenienceKeyword::All)
            }
            Token::None_ => {
                self.advance();
                convenience(ConvenienceKeyword::None)
            }
            other => Err(self.err_here(format!("expected a selection expression, found {other:?}"))),
        }
    }

    // within NUMBER of atom_expr
    fn parse_within(&mut self) -> Result<Expr, SelectionError> {
        self.advance();
        let distance = match self.current().token {
            Token::Float(value) => {
                self.advance();
                value
            }
            Token::Integer(value) => {
                self.advance();
                value as f64
            }
            _ => return Err(self.err_here("expected a distance after 'within'")),
        };
        self.expect(&Token::Of)?;
        let inner = self.parse_atom()?;
        Ok(Expr::Within {
            distance,
            inner: Box::new(inner),
        })
    }

    fn parse_string_kw(&mut self) -> Result<Expr, SelectionError> {
        let field = match self.current().token {
            Token::Name => StringField::Name,
            Token::Resname => StringField::Resname,
            Token::Segid => StringField::Segid,
            Token::Type => StringField::Type,
            _ => unreachable!(),
        };
        self.advance();
        match &self.current().token {
            Token::Ident(word) => {
                let pattern = StringPattern::from_word(word.clone());
                self.advance();
                Ok(Expr::NameMatch { field, pattern })
            }
            _ => Err(self.err_here("expected an identifier after keyword")),
        }
    }

    // numeric_kw cmp_op NUMBER
    fn parse_numeric_kw(&mut self) -> Result<Expr, SelectionError> {
        let field = match self.current().token {
            Token::Mass => NumericField::Mass,
            Token::Charge => NumericField::Charge,
            _ => unreachable!(),
        };
        self.advance();
        let op = self.parse_cmp_op()?;

        let negative = if self.current().token == Token::Dash {
            self.advance();
            true
        } else {
            false
        };
        let value = match self.current().token {
            Token::Float(value) => {
                self.advance();
                value
            }
            Token::Integer(value) => {
                self.advance();
                value as f64
            }
            _ => return Err(self.err_here("expected a number after the comparison operator")),
        };
        let value = if negative { -value } else { value };
        Ok(Expr::NumericCmp { field, op, value })
    }

    fn parse_cmp_op(&mut self) -> Result<CmpOp, SelectionError> {
        let op = match self.current().token {
            Token::Gt => CmpOp::Gt,
            Token::Lt => CmpOp::Lt,
            Token::Ge => CmpOp::Ge,
            Token::Le => CmpOp::Le,
            Token::Eq => CmpOp::Eq,
            Token::Ne => CmpOp::Ne,
            _ => {
                return Err(
                    self.err_here("expected a comparison operator (>, <, >=, <=, ==, !=)")
                )
            }
        };
        self.advance();
        Ok(op)
    }

    // range_kw range_arg
    fn parse_range_kw(&mut self) -> Result<Expr, SelectionError> {
        let field = match self.current().token {
            Token::Resid => RangeField::Resid,
            Token::Index => RangeField::Index,
            _ => unreachable!(),
        };
        self.advance();
        let ranges = self.parse_range_arg()?;
        Ok(Expr::RangeSelect { field, ranges })
    }

    // range_arg = INT ("-" | ":") INT | INT ("," INT)* | INT
    fn parse_range_arg(&mut self) -> Result<Vec<RangeSpec>, SelectionError> {
        let mut specs = Vec::new();
        let first = self.expect_int()?;

        if matches!(self.current().token, Token::Dash | Token::Colon) {
            self.advance();
            let second = self.expect_int()?;
            specs.push(RangeSpec::Range(first, second));
        } else if self.current().token == Token::Comma {
            specs.push(RangeSpec::Single(first));
            while self.current().token == Token::Comma {
                self.advance();
                specs.push(RangeSpec::Single(self.expect_int()?));
            }
        } else {
            specs.push(RangeSpec::Single(first));
        }
        Ok(specs)
    }

    fn expect_int(&mut self) -> Result<i64, SelectionError> {
        match self.current().token {
            Token::Integer(value) => {
                self.advance();
                Ok(value)
            }
            _ => Err(self.err_here("expected an integer")),
        }
    }
}

/// Parse a selection expression string into an AST.
pub fn parse_selection(input: &str) -> Result<Expr, SelectionError> {
    let tokens = Lexer::new(input).tokenize()?;
    Parser::new(tokens, input.to_string()).parse()
}
