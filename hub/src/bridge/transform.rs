//! Response transformation expressions.
//!
//! A small JSONata-style language evaluated against the parsed response body:
//!
//! - `$` — the whole body; `$.a.b`, `a.b`, `items[0].name` — path navigation
//! - `{ "key": expr, ... }` — object construction
//! - `[expr, ...]` — array construction
//! - string / number / boolean / null literals
//!
//! A path that does not exist evaluates to `null`. Syntax errors fail the
//! whole evaluation; the bridge then falls back to the untransformed body.

use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("transform error at offset {offset}: {message}")]
pub struct TransformError {
    pub offset: usize,
    pub message: String,
}

/// Evaluate `expr` against `input`.
pub fn evaluate(expr: &str, input: &Value) -> Result<Value, TransformError> {
    let mut parser = Parser::new(expr);
    parser.skip_ws();
    let value = parser.parse_expr(input)?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(parser.error("trailing characters after expression"));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, message: &str) -> TransformError {
        TransformError {
            offset: self.pos,
            message: message.to_string(),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: u8) -> Result<(), TransformError> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", expected as char)))
        }
    }

    fn parse_expr(&mut self, input: &Value) -> Result<Value, TransformError> {
        self.skip_ws();
        match self.peek() {
            Some(b'{') => self.parse_object(input),
            Some(b'[') => self.parse_array(input),
            Some(b'"') | Some(b'\'') => Ok(Value::String(self.parse_string()?)),
            Some(c) if c == b'-' || c.is_ascii_digit() => self.parse_number(),
            Some(b'$') => {
                self.pos += 1;
                self.parse_path_steps(input.clone(), input)
            }
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => {
                let ident = self.parse_ident()?;
                match ident.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    "null" => Ok(Value::Null),
                    _ => {
                        let base = input.get(&ident).cloned().unwrap_or(Value::Null);
                        self.parse_path_steps(base, input)
                    }
                }
            }
            _ => Err(self.error("expected expression")),
        }
    }

    /// `.ident` and `[index]` steps applied to an already-resolved base.
    fn parse_path_steps(&mut self, base: Value, _input: &Value) -> Result<Value, TransformError> {
        let mut current = base;
        loop {
            match self.peek() {
                Some(b'.') => {
                    self.pos += 1;
                    let field = self.parse_ident()?;
                    current = current.get(&field).cloned().unwrap_or(Value::Null);
                }
                Some(b'[') => {
                    self.pos += 1;
                    self.skip_ws();
                    let index = self.parse_index()?;
                    self.skip_ws();
                    self.eat(b']')?;
                    current = current.get(index).cloned().unwrap_or(Value::Null);
                }
                _ => return Ok(current),
            }
        }
    }

    fn parse_index(&mut self) -> Result<usize, TransformError> {
        let start = self.pos;
        while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected array index"));
        }
        std::str::from_utf8(&self.src[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.error("invalid array index"))
    }

    fn parse_ident(&mut self) -> Result<String, TransformError> {
        let start = self.pos;
        while self
            .peek()
            .map(|c| c.is_ascii_alphanumeric() || c == b'_' || c == b'-')
            .unwrap_or(false)
        {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected identifier"));
        }
        Ok(std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|_| self.error("invalid identifier"))?
            .to_string())
    }

    fn parse_string(&mut self) -> Result<String, TransformError> {
        let quote = self.bump().ok_or_else(|| self.error("expected string"))?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some(b'\\') => match self.bump() {
                    Some(b'n') => out.push('\n'),
                    Some(b't') => out.push('\t'),
                    Some(c) => out.push(c as char),
                    None => return Err(self.error("unterminated escape")),
                },
                Some(c) => out.push(c as char),
            }
        }
    }

    fn parse_number(&mut self) -> Result<Value, TransformError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while self
            .peek()
            .map(|c| c.is_ascii_digit() || c == b'.')
            .unwrap_or(false)
        {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|_| self.error("invalid number"))?;
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Value::Number(i.into()));
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| self.error("invalid number"))
    }

    fn parse_object(&mut self, input: &Value) -> Result<Value, TransformError> {
        self.eat(b'{')?;
        let mut map = Map::new();
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(Value::Object(map));
        }
        loop {
            self.skip_ws();
            let key = match self.peek() {
                Some(b'"') | Some(b'\'') => self.parse_string()?,
                _ => self.parse_ident()?,
            };
            self.skip_ws();
            self.eat(b':')?;
            let value = self.parse_expr(input)?;
            map.insert(key, value);
            self.skip_ws();
            match self.bump() {
                Some(b',') => continue,
                Some(b'}') => return Ok(Value::Object(map)),
                _ => return Err(self.error("expected ',' or '}' in object")),
            }
        }
    }

    fn parse_array(&mut self, input: &Value) -> Result<Value, TransformError> {
        self.eat(b'[')?;
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(Value::Array(items));
        }
        loop {
            let value = self.parse_expr(input)?;
            items.push(value);
            self.skip_ws();
            match self.bump() {
                Some(b',') => continue,
                Some(b']') => return Ok(Value::Array(items)),
                _ => return Err(self.error("expected ',' or ']' in array")),
            }
        }
    }
}
