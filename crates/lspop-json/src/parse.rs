//! Recursive-descent JSON decoder.
//!
//! The grammar is deliberately lenient in one place: an unknown string escape (`\q`) yields the
//! escaped character itself instead of an error. Everything structural is strict.

use crate::error::SyntaxError;
use crate::value::{Map, Value};

/// Maximum array/object nesting accepted by [`parse`].
pub const MAX_DEPTH: usize = 512;

/// Parse one JSON value starting at byte offset `start`.
///
/// Leading whitespace is skipped. On success returns the value and the byte offset immediately
/// after it (trailing whitespace is *not* consumed), so callers can keep reading from there.
pub fn parse(text: &str, start: usize) -> Result<(Value, usize), SyntaxError> {
    if start > text.len() {
        return Err(SyntaxError::UnexpectedEnd {
            position: text.len(),
        });
    }

    let mut parser = Parser {
        text,
        bytes: text.as_bytes(),
        pos: start,
        depth: 0,
    };
    let value = parser.parse_value()?;
    Ok((value, parser.pos))
}

/// Parse a complete JSON document: one value, optionally surrounded by whitespace.
pub fn from_str(text: &str) -> Result<Value, SyntaxError> {
    let (value, next) = parse(text, 0)?;

    let rest = next
        + text.as_bytes()[next..]
            .iter()
            .take_while(|b| is_whitespace(**b))
            .count();
    if rest < text.len() {
        return Err(SyntaxError::TrailingCharacters { position: rest });
    }

    Ok(value)
}

/// Like [`from_str`] for raw bytes, such as a framed message body.
pub fn from_slice(bytes: &[u8]) -> Result<Value, SyntaxError> {
    let text = std::str::from_utf8(bytes).map_err(|err| SyntaxError::InvalidUtf8 {
        position: err.valid_up_to(),
    })?;
    from_str(text)
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

struct Parser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(is_whitespace) {
            self.pos += 1;
        }
    }

    fn char_at(&self, pos: usize) -> char {
        self.text
            .get(pos..)
            .and_then(|rest| rest.chars().next())
            .unwrap_or(char::REPLACEMENT_CHARACTER)
    }

    fn unexpected(&self, expected: &'static str) -> SyntaxError {
        if self.pos >= self.bytes.len() {
            return SyntaxError::UnexpectedEnd { position: self.pos };
        }
        SyntaxError::UnexpectedChar {
            expected,
            found: self.char_at(self.pos),
            position: self.pos,
        }
    }

    fn enter_container(&mut self) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(SyntaxError::TooDeep {
                limit: MAX_DEPTH,
                position: self.pos,
            });
        }
        // consume the opening delimiter
        self.pos += 1;
        Ok(())
    }

    fn parse_value(&mut self) -> Result<Value, SyntaxError> {
        self.skip_whitespace();
        match self.peek() {
            None => Err(SyntaxError::UnexpectedEnd { position: self.pos }),
            Some(b'{') => self.parse_object(),
            Some(b'[') => self.parse_array(),
            Some(b'"') => self.parse_string().map(Value::String),
            Some(b'-' | b'0'..=b'9') => self.parse_number(),
            Some(_) => self.parse_literal(),
        }
    }

    fn parse_object(&mut self) -> Result<Value, SyntaxError> {
        self.enter_container()?;
        let mut map = Map::new();

        self.skip_whitespace();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            self.depth -= 1;
            return Ok(Value::Object(map));
        }

        loop {
            self.skip_whitespace();
            if self.peek() != Some(b'"') {
                return Err(self.unexpected("string key"));
            }
            let key = self.parse_string()?;

            self.skip_whitespace();
            if self.peek() != Some(b':') {
                return Err(self.unexpected("':' after object key"));
            }
            self.pos += 1;

            let value = self.parse_value()?;
            map.insert(key, value);

            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.unexpected("',' or '}'")),
            }
        }

        self.depth -= 1;
        Ok(Value::Object(map))
    }

    fn parse_array(&mut self) -> Result<Value, SyntaxError> {
        self.enter_container()?;
        let mut items = Vec::new();

        self.skip_whitespace();
        if self.peek() == Some(b']') {
            self.pos += 1;
            self.depth -= 1;
            return Ok(Value::Array(items));
        }

        loop {
            items.push(self.parse_value()?);

            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.unexpected("',' or ']'")),
            }
        }

        self.depth -= 1;
        Ok(Value::Array(items))
    }

    fn parse_string(&mut self) -> Result<String, SyntaxError> {
        let open = self.pos;
        self.pos += 1;

        let mut out = String::new();
        // Start of the current run of unescaped text. Only ever split at ASCII bytes, so the
        // slices below stay on char boundaries.
        let mut segment = self.pos;

        loop {
            let Some(b) = self.peek() else {
                return Err(SyntaxError::UnterminatedString { position: open });
            };

            match b {
                b'"' => {
                    out.push_str(&self.text[segment..self.pos]);
                    self.pos += 1;
                    return Ok(out);
                }
                b'\\' => {
                    out.push_str(&self.text[segment..self.pos]);
                    self.pos += 1;

                    let Some(escaped) = self.text.get(self.pos..).and_then(|s| s.chars().next())
                    else {
                        return Err(SyntaxError::UnterminatedString { position: open });
                    };
                    self.pos += escaped.len_utf8();

                    match escaped {
                        'b' => out.push('\u{8}'),
                        'f' => out.push('\u{c}'),
                        'n' => out.push('\n'),
                        'r' => out.push('\r'),
                        't' => out.push('\t'),
                        'u' => out.push(self.parse_unicode_escape().unwrap_or('u')),
                        // `\"`, `\\`, `\/` and anything unknown: the character itself.
                        other => out.push(other),
                    }
                    segment = self.pos;
                }
                _ => self.pos += 1,
            }
        }
    }

    /// Decode the `XXXX` of a `\uXXXX` escape (the `\u` is already consumed).
    ///
    /// Returns `None` without consuming anything when four hex digits do not follow.
    fn parse_unicode_escape(&mut self) -> Option<char> {
        let first = self.read_hex4(self.pos)?;
        self.pos += 4;

        if !(0xD800..0xE000).contains(&first) {
            return Some(char::from_u32(first).unwrap_or(char::REPLACEMENT_CHARACTER));
        }

        if first < 0xDC00
            && self.bytes.get(self.pos) == Some(&b'\\')
            && self.bytes.get(self.pos + 1) == Some(&b'u')
            && let Some(second) = self.read_hex4(self.pos + 2)
            && (0xDC00..0xE000).contains(&second)
        {
            self.pos += 6;
            let code = 0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00);
            return char::from_u32(code);
        }

        Some(char::REPLACEMENT_CHARACTER)
    }

    fn read_hex4(&self, at: usize) -> Option<u32> {
        let digits = self.bytes.get(at..at + 4)?;
        digits
            .iter()
            .try_fold(0u32, |acc, &b| Some(acc * 16 + (b as char).to_digit(16)?))
    }

    fn eat_digits(&mut self) -> usize {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        self.pos - start
    }

    fn parse_number(&mut self) -> Result<Value, SyntaxError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }

        if self.eat_digits() == 0 {
            return Err(SyntaxError::InvalidNumber {
                text: self.text[start..self.pos].to_string(),
                position: start,
            });
        }

        if self.peek() == Some(b'.')
            && self
                .bytes
                .get(self.pos + 1)
                .is_some_and(|b| b.is_ascii_digit())
        {
            self.pos += 1;
            self.eat_digits();
        }

        if matches!(self.peek(), Some(b'e' | b'E')) {
            let before_exponent = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if self.eat_digits() == 0 {
                // Not part of the number; leave it for the caller to reject.
                self.pos = before_exponent;
            }
        }

        let token = &self.text[start..self.pos];
        match token.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(Value::Number(n)),
            _ => Err(SyntaxError::InvalidNumber {
                text: token.to_string(),
                position: start,
            }),
        }
    }

    fn parse_literal(&mut self) -> Result<Value, SyntaxError> {
        const LITERALS: [(&str, Value); 3] = [
            ("true", Value::Bool(true)),
            ("false", Value::Bool(false)),
            ("null", Value::Null),
        ];

        let rest = &self.bytes[self.pos..];
        for (word, value) in LITERALS {
            if rest.starts_with(word.as_bytes()) {
                self.pos += word.len();
                return Ok(value);
            }
        }

        Err(SyntaxError::UnknownLiteral { position: self.pos })
    }
}
