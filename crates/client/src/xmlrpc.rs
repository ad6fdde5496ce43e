//! XML-RPC codec.
//!
//! Calls are encoded from [`serde_json::Value`] parameters; responses are
//! decoded back into a `Value`. Scalars map as follows:
//!
//! | XML-RPC | JSON |
//! |---|---|
//! | `int`, `i4`, `i8` | number |
//! | `double` | number |
//! | `boolean` | bool |
//! | `string`, untyped, `dateTime.iso8601` | string |
//! | `base64` | string (decoded, lossy UTF-8) |
//! | `nil` | null |
//!
//! Only the subset of XML found in XML-RPC documents is understood:
//! elements, character data, entities, CDATA, comments and the prolog.
//! Attributes and namespace prefixes are ignored.

use std::fmt::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Number, Value};

use crate::error::ClientError;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Builds a `methodCall` document.
pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    escape_into(&mut out, method);
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        encode_value(&mut out, param);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>\n");
    out
}

fn encode_value(out: &mut String, value: &Value) {
    out.push_str("<value>");
    match value {
        Value::Null => out.push_str("<nil/>"),
        Value::Bool(b) => {
            let _ = write!(out, "<boolean>{}</boolean>", u8::from(*b));
        }
        Value::Number(n) => match n.as_i64() {
            Some(i) if i32::try_from(i).is_ok() => {
                let _ = write!(out, "<int>{i}</int>");
            }
            Some(i) => {
                let _ = write!(out, "<i8>{i}</i8>");
            }
            None => {
                let _ = write!(out, "<double>{}</double>", n.as_f64().unwrap_or_default());
            }
        },
        Value::String(s) => {
            out.push_str("<string>");
            escape_into(out, s);
            out.push_str("</string>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                encode_value(out, item);
            }
            out.push_str("</data></array>");
        }
        Value::Object(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                escape_into(out, name);
                out.push_str("</name>");
                encode_value(out, member);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Parses a `methodResponse` document.
///
/// Returns the single result value, or [`ClientError::Fault`] when the
/// service answered with a fault.
pub fn decode_response(body: &str) -> Result<Value, ClientError> {
    let mut parser = Parser::new(tokenize(body)?);

    parser.open("methodResponse")?;
    let result = match parser.next_tag()? {
        Token::Open("params") => {
            parser.open("param")?;
            parser.open("value")?;
            let value = parser.value()?;
            parser.close("param")?;
            parser.close("params")?;
            value
        }
        Token::Open("fault") => {
            parser.open("value")?;
            let fault = parser.value()?;
            return Err(fault_error(fault));
        }
        other => return Err(unexpected("params or fault", &other)),
    };
    parser.close("methodResponse")?;
    Ok(result)
}

fn fault_error(fault: Value) -> ClientError {
    let code = fault
        .get("faultCode")
        .and_then(|c| c.as_i64().or_else(|| c.as_str().and_then(|s| s.parse().ok())))
        .unwrap_or_default();
    let message = match fault.get("faultString") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => fault.to_string(),
    };
    ClientError::Fault { code, message }
}

#[derive(Debug, Clone, PartialEq)]
enum Token<'a> {
    Open(&'a str),
    Close(&'a str),
    Empty(&'a str),
    Text(&'a str),
    CData(&'a str),
}

fn tokenize(src: &str) -> Result<Vec<Token<'_>>, ClientError> {
    let mut tokens = Vec::new();
    let mut rest = src;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("<?") {
            rest = skip_past(after, "?>")?;
        } else if let Some(after) = rest.strip_prefix("<!--") {
            rest = skip_past(after, "-->")?;
        } else if let Some(after) = rest.strip_prefix("<![CDATA[") {
            let end = find(after, "]]>")?;
            tokens.push(Token::CData(&after[..end]));
            rest = &after[end + 3..];
        } else if let Some(after) = rest.strip_prefix("<!") {
            rest = skip_past(after, ">")?;
        } else if let Some(after) = rest.strip_prefix('<') {
            let end = find(after, ">")?;
            let inner = after[..end].trim();
            rest = &after[end + 1..];
            if let Some(name) = inner.strip_prefix('/') {
                tokens.push(Token::Close(local_name(name)));
            } else if let Some(name) = inner.strip_suffix('/') {
                tokens.push(Token::Empty(local_name(name)));
            } else {
                tokens.push(Token::Open(local_name(inner)));
            }
        } else {
            let end = rest.find('<').unwrap_or(rest.len());
            tokens.push(Token::Text(&rest[..end]));
            rest = &rest[end..];
        }
    }
    Ok(tokens)
}

/// Element name without attributes or namespace prefix.
fn local_name(tag: &str) -> &str {
    let name = tag.split_whitespace().next().unwrap_or_default();
    name.rsplit(':').next().unwrap_or(name)
}

fn find(haystack: &str, needle: &str) -> Result<usize, ClientError> {
    haystack
        .find(needle)
        .ok_or_else(|| ClientError::Xml(format!("unterminated markup, expected {needle:?}")))
}

fn skip_past<'a>(haystack: &'a str, needle: &str) -> Result<&'a str, ClientError> {
    Ok(&haystack[find(haystack, needle)? + needle.len()..])
}

fn unexpected(expected: &str, found: &Token<'_>) -> ClientError {
    ClientError::Xml(format!("expected {expected}, found {found:?}"))
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Token<'a>>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    /// Skips whitespace-only text between elements.
    fn skip_blank(&mut self) {
        while let Some(Token::Text(t)) = self.peek() {
            if !t.trim().is_empty() {
                break;
            }
            self.pos += 1;
        }
    }

    fn next_tag(&mut self) -> Result<Token<'a>, ClientError> {
        self.skip_blank();
        self.bump()
            .ok_or_else(|| ClientError::Xml("unexpected end of document".into()))
    }

    fn open(&mut self, name: &str) -> Result<(), ClientError> {
        match self.next_tag()? {
            Token::Open(n) if n == name => Ok(()),
            other => Err(unexpected(&format!("<{name}>"), &other)),
        }
    }

    fn close(&mut self, name: &str) -> Result<(), ClientError> {
        match self.next_tag()? {
            Token::Close(n) if n == name => Ok(()),
            other => Err(unexpected(&format!("</{name}>"), &other)),
        }
    }

    /// Concatenated character data up to the next element.
    fn text(&mut self) -> Result<String, ClientError> {
        let mut out = String::new();
        loop {
            match self.peek() {
                Some(Token::Text(t)) => unescape_into(&mut out, t)?,
                Some(Token::CData(t)) => out.push_str(t),
                _ => return Ok(out),
            }
            self.pos += 1;
        }
    }

    /// Parses the content of a `<value>` element, its opening tag already
    /// consumed, through the closing tag.
    fn value(&mut self) -> Result<Value, ClientError> {
        let leading = self.text()?;
        let value = match self.bump() {
            Some(Token::Close("value")) => return Ok(Value::String(leading)),
            Some(Token::Empty(kind)) => empty_scalar(kind)?,
            Some(Token::Open(kind)) => {
                let value = match kind {
                    "array" => self.array()?,
                    "struct" => self.structure()?,
                    _ => {
                        let text = self.text()?;
                        scalar(kind, text)?
                    }
                };
                self.close(kind)?;
                value
            }
            Some(other) => return Err(unexpected("a value", &other)),
            None => return Err(ClientError::Xml("unexpected end of document".into())),
        };
        self.close("value")?;
        Ok(value)
    }

    fn array(&mut self) -> Result<Value, ClientError> {
        let mut items = Vec::new();
        match self.next_tag()? {
            Token::Empty("data") => return Ok(Value::Array(items)),
            Token::Open("data") => {}
            other => return Err(unexpected("<data>", &other)),
        }
        loop {
            match self.next_tag()? {
                Token::Open("value") => items.push(self.value()?),
                Token::Close("data") => return Ok(Value::Array(items)),
                other => return Err(unexpected("<value> or </data>", &other)),
            }
        }
    }

    fn structure(&mut self) -> Result<Value, ClientError> {
        let mut members = Map::new();
        loop {
            self.skip_blank();
            match self.peek() {
                Some(Token::Open("member")) => {
                    self.pos += 1;
                }
                Some(Token::Close("struct")) => return Ok(Value::Object(members)),
                _ => {
                    let found = self.next_tag()?;
                    return Err(unexpected("<member> or </struct>", &found));
                }
            }

            let mut name = None;
            let mut value = None;
            loop {
                match self.next_tag()? {
                    Token::Open("name") => {
                        name = Some(self.text()?);
                        self.close("name")?;
                    }
                    Token::Open("value") => value = Some(self.value()?),
                    Token::Close("member") => break,
                    other => return Err(unexpected("<name>, <value> or </member>", &other)),
                }
            }
            match (name, value) {
                (Some(name), Some(value)) => {
                    members.insert(name, value);
                }
                _ => return Err(ClientError::Xml("struct member without name or value".into())),
            }
        }
    }
}

fn scalar(kind: &str, text: String) -> Result<Value, ClientError> {
    let bad = |text: &str| ClientError::Xml(format!("invalid {kind} value {text:?}"));
    match kind {
        "int" | "i4" | "i8" => text
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| bad(&text)),
        "double" => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| bad(&text)),
        "boolean" => match text.trim() {
            "1" | "true" => Ok(Value::Bool(true)),
            "0" | "false" => Ok(Value::Bool(false)),
            _ => Err(bad(&text)),
        },
        "string" | "dateTime.iso8601" => Ok(Value::String(text)),
        "base64" => {
            let compact: String = text.split_whitespace().collect();
            let bytes = STANDARD.decode(compact).map_err(|_| bad(&text))?;
            Ok(Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        }
        "nil" => Ok(Value::Null),
        other => Err(ClientError::Xml(format!("unknown value type <{other}>"))),
    }
}

fn empty_scalar(kind: &str) -> Result<Value, ClientError> {
    match kind {
        "nil" => Ok(Value::Null),
        "string" | "base64" | "dateTime.iso8601" => Ok(Value::String(String::new())),
        "array" => Ok(Value::Array(Vec::new())),
        "struct" => Ok(Value::Object(Map::new())),
        other => Err(ClientError::Xml(format!("empty <{other}/> has no value"))),
    }
}

fn unescape_into(out: &mut String, text: &str) -> Result<(), ClientError> {
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| ClientError::Xml("unterminated entity".into()))?;
        let entity = &after[..semi];
        let c = match entity {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32)
                    .ok_or_else(|| ClientError::Xml(format!("unknown entity &{entity};")))?
            }
        };
        out.push(c);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(())
}
