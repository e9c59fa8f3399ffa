//! Tokenizer for the supported SQL subset

use super::errors::{SqlError, SqlResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identifier or keyword; keywords are matched case-insensitively
    Ident(String),
    /// Backtick-quoted identifier, never a keyword
    QuotedIdent(String),
    Integer(String),
    Float(String),
    String(String),
    BindVar(String),
    ListArg(String),
    Comma,
    Dot,
    LParen,
    RParen,
    Star,
    Plus,
    Minus,
    Slash,
    Percent,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Semicolon,
    Eof,
}

/// Token with its byte offset in the source text
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

pub fn tokenize(sql: &str) -> SqlResult<Vec<Spanned>> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let token = match c {
            b',' => {
                i += 1;
                Token::Comma
            }
            b'.' if !bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {
                i += 1;
                Token::Dot
            }
            b'(' => {
                i += 1;
                Token::LParen
            }
            b')' => {
                i += 1;
                Token::RParen
            }
            b'*' => {
                i += 1;
                Token::Star
            }
            b'+' => {
                i += 1;
                Token::Plus
            }
            b'-' => {
                i += 1;
                Token::Minus
            }
            b'/' => {
                i += 1;
                Token::Slash
            }
            b'%' => {
                i += 1;
                Token::Percent
            }
            b';' => {
                i += 1;
                Token::Semicolon
            }
            b'=' => {
                i += 1;
                Token::Eq
            }
            b'!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    Token::NotEq
                } else {
                    return Err(SqlError::new(start, "unexpected character '!'"));
                }
            }
            b'<' => match bytes.get(i + 1) {
                Some(b'=') => {
                    i += 2;
                    Token::LtEq
                }
                Some(b'>') => {
                    i += 2;
                    Token::NotEq
                }
                _ => {
                    i += 1;
                    Token::Lt
                }
            },
            b'>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    Token::GtEq
                } else {
                    i += 1;
                    Token::Gt
                }
            }
            b':' => {
                let list = bytes.get(i + 1) == Some(&b':');
                i += if list { 2 } else { 1 };
                let name_start = i;
                while i < bytes.len() && is_ident_byte(bytes[i]) {
                    i += 1;
                }
                if name_start == i {
                    return Err(SqlError::new(start, "bind variable name expected"));
                }
                let name = sql[name_start..i].to_string();
                if list {
                    Token::ListArg(name)
                } else {
                    Token::BindVar(name)
                }
            }
            b'\'' | b'"' => {
                let (value, next) = read_string(sql, i, c)?;
                i = next;
                Token::String(value)
            }
            b'`' => {
                let end = sql[i + 1..]
                    .find('`')
                    .ok_or_else(|| SqlError::new(start, "unterminated quoted identifier"))?;
                let name = sql[i + 1..i + 1 + end].to_string();
                i += end + 2;
                Token::QuotedIdent(name)
            }
            c if c.is_ascii_digit() || c == b'.' => {
                let mut is_float = false;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    if bytes[i] == b'.' {
                        if is_float {
                            return Err(SqlError::new(start, "malformed number"));
                        }
                        is_float = true;
                    }
                    i += 1;
                }
                if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                    is_float = true;
                    i += 1;
                    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
                        i += 1;
                    }
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text = sql[start..i].to_string();
                if is_float {
                    Token::Float(text)
                } else {
                    Token::Integer(text)
                }
            }
            c if is_ident_start(c) => {
                while i < bytes.len() && is_ident_byte(bytes[i]) {
                    i += 1;
                }
                Token::Ident(sql[start..i].to_string())
            }
            _ => {
                let ch = sql[start..].chars().next().unwrap_or('?');
                return Err(SqlError::new(start, format!("unexpected character '{}'", ch)));
            }
        };

        tokens.push(Spanned {
            token,
            position: start,
        });
    }

    tokens.push(Spanned {
        token: Token::Eof,
        position: sql.len(),
    });
    Ok(tokens)
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c >= 0x80
}

fn is_ident_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c >= 0x80
}

/// Reads a quoted string starting at `start`, returning the unescaped
/// contents and the offset just past the closing quote.
fn read_string(sql: &str, start: usize, quote: u8) -> SqlResult<(String, usize)> {
    let bytes = sql.as_bytes();
    let mut out = Vec::new();
    let mut i = start + 1;

    while i < bytes.len() {
        let c = bytes[i];
        if c == quote {
            // A doubled quote is an escaped quote
            if bytes.get(i + 1) == Some(&quote) {
                out.push(quote);
                i += 2;
                continue;
            }
            let value = String::from_utf8(out)
                .map_err(|_| SqlError::new(start, "invalid utf-8 in string literal"))?;
            return Ok((value, i + 1));
        }
        if c == b'\\' {
            let escaped = bytes
                .get(i + 1)
                .ok_or_else(|| SqlError::new(start, "unterminated string"))?;
            out.push(match escaped {
                b'n' => b'\n',
                b't' => b'\t',
                b'r' => b'\r',
                b'0' => 0,
                other => *other,
            });
            i += 2;
            continue;
        }
        out.push(c);
        i += 1;
    }

    Err(SqlError::new(start, "unterminated string"))
}
