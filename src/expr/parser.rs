//! Recursive-descent parser for the filter expression grammar.
//!
//! Precedence, loosest first: `or`, `and`, `not`, comparison, additive,
//! multiplicative, unary minus, primary. Comparisons do not chain.

use serde_json::Value;

use crate::error::{JaError, Result};
use crate::expr::tokens::{tokenize, Token, TokenWithPos};
use crate::expr::{ArithOp, Builtin, CompareOp, Expr};
use crate::value::Path;

pub fn parse(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        input,
        tokens,
        idx: 0,
    };
    let expr = parser.parse_or()?;
    if let Some(extra) = parser.peek() {
        return Err(JaError::expression(
            "unexpected trailing input",
            extra.pos,
            input,
        ));
    }
    Ok(expr)
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<TokenWithPos>,
    idx: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&TokenWithPos> {
        self.tokens.get(self.idx)
    }

    fn advance(&mut self) -> Option<TokenWithPos> {
        let token = self.tokens.get(self.idx).cloned();
        if token.is_some() {
            self.idx += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek().map(|t| &t.token) == Some(token) {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<()> {
        if self.eat(&token) {
            return Ok(());
        }
        let pos = self.peek().map(|t| t.pos).unwrap_or(self.input.len());
        Err(JaError::expression(format!("expected {what}"), pos, self.input))
    }

    fn error_here(&self, message: impl Into<String>) -> JaError {
        let pos = self.peek().map(|t| t.pos).unwrap_or(self.input.len());
        JaError::expression(message, pos, self.input)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_not()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat(&Token::Not) {
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Expr> {
        let lhs = self.parse_add()?;
        let op = match self.peek().map(|t| &t.token) {
            Some(Token::Eq) => CompareOp::Eq,
            Some(Token::NotEq) => CompareOp::NotEq,
            Some(Token::Lt) => CompareOp::Lt,
            Some(Token::LtEq) => CompareOp::LtEq,
            Some(Token::Gt) => CompareOp::Gt,
            Some(Token::GtEq) => CompareOp::GtEq,
            _ => return Ok(lhs),
        };
        self.idx += 1;
        let rhs = self.parse_add()?;
        Ok(Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_add(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek().map(|t| &t.token) {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => return Ok(lhs),
            };
            self.idx += 1;
            let rhs = self.parse_mul()?;
            lhs = Expr::Arith {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_mul(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek().map(|t| &t.token) {
                Some(Token::Star) => ArithOp::Mul,
                Some(Token::Slash) => ArithOp::Div,
                Some(Token::Percent) => ArithOp::Rem,
                _ => return Ok(lhs),
            };
            self.idx += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Arith {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Minus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = match self.advance() {
            Some(t) => t,
            None => {
                return Err(JaError::expression(
                    "unexpected end of expression",
                    self.input.len(),
                    self.input,
                ))
            }
        };

        match token.token {
            Token::Number(text) => parse_number_literal(&text, token.pos, self.input),
            Token::StringLit(s) => Ok(Expr::Literal(Value::String(s))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::LeftParen => {
                let inner = self.parse_or()?;
                self.expect(Token::RightParen, "')'")?;
                Ok(inner)
            }
            Token::Ident(first) => {
                if self.peek().map(|t| &t.token) == Some(&Token::LeftParen) {
                    return self.parse_call(&first, token.pos);
                }
                self.parse_path_tail(first)
            }
            other => Err(JaError::expression(
                format!("unexpected token {other:?}"),
                token.pos,
                self.input,
            )),
        }
    }

    fn parse_path_tail(&mut self, first: String) -> Result<Expr> {
        let mut segments = vec![first];
        while self.eat(&Token::Period) {
            match self.advance() {
                Some(TokenWithPos {
                    token: Token::Ident(segment),
                    ..
                }) => segments.push(segment),
                _ => return Err(self.error_here("expected path segment after '.'")),
            }
        }
        Ok(Expr::Path(Path::parse(&segments.join("."))))
    }

    fn parse_call(&mut self, name: &str, pos: usize) -> Result<Expr> {
        let func = Builtin::from_name(name)
            .ok_or_else(|| JaError::expression(format!("unknown function '{name}'"), pos, self.input))?;
        self.expect(Token::LeftParen, "'('")?;

        let mut args = Vec::new();
        if !self.eat(&Token::RightParen) {
            loop {
                args.push(self.parse_or()?);
                if self.eat(&Token::Comma) {
                    continue;
                }
                self.expect(Token::RightParen, "')'")?;
                break;
            }
        }

        let (min, max) = func.arity();
        if args.len() < min || max.map_or(false, |m| args.len() > m) {
            return Err(JaError::expression(
                format!("{name} takes {} argument(s), got {}", func.arity_text(), args.len()),
                pos,
                self.input,
            ));
        }
        Ok(Expr::Call { func, args })
    }
}

fn parse_number_literal(text: &str, pos: usize, input: &str) -> Result<Expr> {
    if !text.contains('.') && !text.contains('e') && !text.contains('E') {
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Expr::Literal(Value::from(i)));
        }
    }
    let f: f64 = text
        .parse()
        .map_err(|_| JaError::expression(format!("invalid number '{text}'"), pos, input))?;
    Ok(Expr::Literal(Value::from(f)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_and_over_or() {
        let expr = parse("a or b and c").unwrap();
        match expr {
            Expr::Or(lhs, rhs) => {
                assert!(matches!(*lhs, Expr::Path(_)));
                assert!(matches!(*rhs, Expr::And(_, _)));
            }
            other => panic!("expected Or at top, got {other:?}"),
        }
    }

    #[test]
    fn test_arithmetic_precedence() {
        let expr = parse("1 + 2 * 3").unwrap();
        match expr {
            Expr::Arith {
                op: ArithOp::Add,
                rhs,
                ..
            } => assert!(matches!(*rhs, Expr::Arith { op: ArithOp::Mul, .. })),
            other => panic!("expected Add at top, got {other:?}"),
        }
    }

    #[test]
    fn test_dotted_path() {
        let expr = parse("user.profile.city == 'Oslo'").unwrap();
        match expr {
            Expr::Compare { lhs, .. } => match *lhs {
                Expr::Path(p) => assert_eq!(p.raw(), "user.profile.city"),
                other => panic!("expected path, got {other:?}"),
            },
            other => panic!("expected compare, got {other:?}"),
        }
    }

    #[test]
    fn test_function_arity_checked() {
        assert!(parse("lower(a)").is_ok());
        assert!(parse("lower(a, b)").is_err());
        assert!(parse("coalesce(a, b, c)").is_ok());
        assert!(parse("nosuchfn(a)").is_err());
    }

    #[test]
    fn test_trailing_input_rejected() {
        let err = parse("a == 1 b").unwrap_err();
        assert!(err.to_string().contains("trailing"));
    }

    #[test]
    fn test_caret_position_on_parse_error() {
        let err = parse("a == ==").unwrap_err();
        let diagnostic = err.render_diagnostic();
        assert!(diagnostic.contains('^'));
    }
}
