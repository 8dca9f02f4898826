//! Tokenizer for the filter expression sub-language.

use crate::error::{JaError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Bare identifier or path segment.
    Ident(String),
    /// Numeric literal, kept as text until the parser shapes it.
    Number(String),
    /// Single- or double-quoted string with escapes resolved.
    StringLit(String),
    /// 'and'
    And,
    /// 'or'
    Or,
    /// 'not'
    Not,
    /// 'true'
    True,
    /// 'false'
    False,
    /// 'null'
    Null,
    /// '=='
    Eq,
    /// '!='
    NotEq,
    /// '<'
    Lt,
    /// '<='
    LtEq,
    /// '>'
    Gt,
    /// '>='
    GtEq,
    /// '+'
    Plus,
    /// '-'
    Minus,
    /// '*'
    Star,
    /// '/'
    Slash,
    /// '%'
    Percent,
    /// '('
    LeftParen,
    /// ')'
    RightParen,
    /// ','
    Comma,
    /// '.'
    Period,
}

/// A token plus the byte offset it starts at, for caret diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenWithPos {
    pub token: Token,
    pub pos: usize,
}

struct Cursor<'a> {
    input: &'a str,
    idx: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<char> {
        self.input[self.idx..].chars().next()
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.idx += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.next_char();
            true
        } else {
            false
        }
    }
}

pub fn tokenize(input: &str) -> Result<Vec<TokenWithPos>> {
    let mut cursor = Cursor { input, idx: 0 };
    let mut tokens = Vec::new();

    while let Some(c) = cursor.peek() {
        let start = cursor.idx;
        if c.is_whitespace() {
            cursor.next_char();
            continue;
        }

        let token = match c {
            '(' => {
                cursor.next_char();
                Token::LeftParen
            }
            ')' => {
                cursor.next_char();
                Token::RightParen
            }
            ',' => {
                cursor.next_char();
                Token::Comma
            }
            '.' => {
                cursor.next_char();
                Token::Period
            }
            '+' => {
                cursor.next_char();
                Token::Plus
            }
            '-' => {
                cursor.next_char();
                Token::Minus
            }
            '*' => {
                cursor.next_char();
                Token::Star
            }
            '/' => {
                cursor.next_char();
                Token::Slash
            }
            '%' => {
                cursor.next_char();
                Token::Percent
            }
            '=' => {
                cursor.next_char();
                if cursor.eat('=') {
                    Token::Eq
                } else {
                    return Err(JaError::expression(
                        "single '=' is not an operator; use '=='",
                        start,
                        input,
                    ));
                }
            }
            '!' => {
                cursor.next_char();
                if cursor.eat('=') {
                    Token::NotEq
                } else {
                    return Err(JaError::expression("expected '!='", start, input));
                }
            }
            '<' => {
                cursor.next_char();
                if cursor.eat('=') {
                    Token::LtEq
                } else {
                    Token::Lt
                }
            }
            '>' => {
                cursor.next_char();
                if cursor.eat('=') {
                    Token::GtEq
                } else {
                    Token::Gt
                }
            }
            '\'' | '"' => {
                let quote = c;
                cursor.next_char();
                Token::StringLit(read_string(&mut cursor, quote, start, input)?)
            }
            c if c.is_ascii_digit() => Token::Number(read_number(&mut cursor)),
            c if c.is_alphabetic() || c == '_' => {
                let word = read_word(&mut cursor);
                match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(word),
                }
            }
            other => {
                return Err(JaError::expression(
                    format!("unexpected character '{other}'"),
                    start,
                    input,
                ))
            }
        };

        tokens.push(TokenWithPos { token, pos: start });
    }

    Ok(tokens)
}

fn read_word(cursor: &mut Cursor) -> String {
    let start = cursor.idx;
    while let Some(c) = cursor.peek() {
        if c.is_alphanumeric() || c == '_' || c == '[' || c == ']' {
            cursor.next_char();
        } else {
            break;
        }
    }
    cursor.input[start..cursor.idx].to_string()
}

fn read_number(cursor: &mut Cursor) -> String {
    let start = cursor.idx;
    while matches!(cursor.peek(), Some(c) if c.is_ascii_digit()) {
        cursor.next_char();
    }
    // Fraction only when the dot is followed by a digit, so `a.1` stays a path.
    if cursor.peek() == Some('.') {
        let after_dot = cursor.input[cursor.idx + 1..].chars().next();
        if matches!(after_dot, Some(c) if c.is_ascii_digit()) {
            cursor.next_char();
            while matches!(cursor.peek(), Some(c) if c.is_ascii_digit()) {
                cursor.next_char();
            }
        }
    }
    if matches!(cursor.peek(), Some('e' | 'E')) {
        let mut lookahead = cursor.input[cursor.idx + 1..].chars();
        let mut exp_len = 1;
        if matches!(lookahead.clone().next(), Some('+' | '-')) {
            lookahead.next();
            exp_len += 1;
        }
        if matches!(lookahead.next(), Some(c) if c.is_ascii_digit()) {
            for _ in 0..exp_len {
                cursor.next_char();
            }
            while matches!(cursor.peek(), Some(c) if c.is_ascii_digit()) {
                cursor.next_char();
            }
        }
    }
    cursor.input[start..cursor.idx].to_string()
}

fn read_string(cursor: &mut Cursor, quote: char, start: usize, input: &str) -> Result<String> {
    let mut out = String::new();
    loop {
        match cursor.next_char() {
            None => {
                return Err(JaError::expression("unterminated string literal", start, input));
            }
            Some(c) if c == quote => return Ok(out),
            Some('\\') => match cursor.next_char() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some('\'') => out.push('\''),
                Some('"') => out.push('"'),
                Some(other) => {
                    return Err(JaError::expression(
                        format!("unknown escape '\\{other}'"),
                        cursor.idx - other.len_utf8(),
                        input,
                    ))
                }
                None => {
                    return Err(JaError::expression("unterminated string literal", start, input));
                }
            },
            Some(c) => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn test_operators_and_keywords() {
        assert_eq!(
            kinds("a >= 2 and not b"),
            vec![
                Token::Ident("a".into()),
                Token::GtEq,
                Token::Number("2".into()),
                Token::And,
                Token::Not,
                Token::Ident("b".into()),
            ]
        );
    }

    #[test]
    fn test_number_vs_path_dot() {
        assert_eq!(
            kinds("1.5 a.b"),
            vec![
                Token::Number("1.5".into()),
                Token::Ident("a".into()),
                Token::Period,
                Token::Ident("b".into()),
            ]
        );
    }

    #[test]
    fn test_string_escapes_both_quotes() {
        assert_eq!(
            kinds(r#"'it\'s' "a\nb""#),
            vec![
                Token::StringLit("it's".into()),
                Token::StringLit("a\nb".into()),
            ]
        );
    }

    #[test]
    fn test_single_equals_is_an_error() {
        let err = tokenize("a = 1").unwrap_err();
        assert!(err.to_string().contains("'=='"));
    }

    #[test]
    fn test_position_recorded() {
        let tokens = tokenize("ab  ==").unwrap();
        assert_eq!(tokens[1].pos, 4);
    }
}
