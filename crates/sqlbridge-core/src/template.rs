//! `$`-templates: SQL text with embedded variable references.
//!
//! Supported syntax:
//!
//! - `$name` looks up `name` in the variables
//! - `$name.attr` and `$name[key]` reach into JSON objects and arrays; a key
//!   is a single literal (`0`, `'id'`) or another variable name
//! - `${name}` delimits a reference explicitly, e.g. `${x}y`
//! - `$$` is a literal `$`
//!
//! There is no expression language beyond these accessors. Every resolved
//! value goes through [`sqlquote`], so it reaches the driver as a bound
//! parameter.
//!
//! ```
//! use sqlbridge_core::{Bind, ParamStyle, Template, Vars, Value};
//!
//! let mut vars = Vars::new();
//! vars.insert("id".into(), Bind::from("O'Brien"));
//! let q = Template::parse("id = $id").unwrap().interpolate(&vars).unwrap();
//! let r = q.render(ParamStyle::Qmark);
//! assert_eq!(r.sql, "id = ?");
//! assert_eq!(r.params, vec![Value::Text("O'Brien".into())]);
//! ```

use crate::error::{Error, Result, TemplateError, TemplateErrorKind};
use crate::sql::{Bind, SqlQuery, Vars, sqlquote};
use crate::value::Value;
use regex::Regex;
use std::sync::OnceLock;

const TOKEN_PATTERN: &str = r#"^[ \t]*(?:(?P<name>[A-Za-z_][A-Za-z0-9_]*)|(?P<num>-?[0-9]+(?:\.[0-9]+)?(?:[eE][-+]?[0-9]+)?)|(?P<str>'(?:[^'\\]|\\.)*'|"(?:[^"\\]|\\.)*"))"#;

/// Deepest `[...]` nesting accepted inside one reference.
const MAX_NESTING: usize = 32;

fn token_regex() -> Option<&'static Regex> {
    static TOKEN: OnceLock<Option<Regex>> = OnceLock::new();
    TOKEN
        .get_or_init(|| match Regex::new(TOKEN_PATTERN) {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::error!(error = %e, "Template tokenizer failed to compile");
                None
            }
        })
        .as_ref()
}

/// A constant written inside an accessor.
#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    Int(i64),
    Float(f64),
    Str(String),
}

/// Reference expression AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Param(String),
    Literal(Lit),
    GetAttr(Box<Expr>, String),
    GetItem(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    Text(String),
    /// A reference and the byte offset of its `$`
    Expr(Expr, usize),
}

enum Token {
    Name(String),
    Literal(Lit),
}

/// A parsed template, reusable across variable sets.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    text: String,
    chunks: Vec<Chunk>,
}

impl Template {
    pub fn parse(text: &str) -> Result<Self> {
        let chunks = Parser { text }.parse()?;
        Ok(Self {
            text: text.to_string(),
            chunks,
        })
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Resolve every reference against `vars` and build the query.
    pub fn interpolate(&self, vars: &Vars) -> Result<SqlQuery> {
        let mut query = SqlQuery::new();
        for chunk in &self.chunks {
            match chunk {
                Chunk::Text(text) => {
                    query.push(text);
                }
                Chunk::Expr(expr, position) => {
                    let bind = self.eval(expr, vars, *position)?;
                    query.push_query(sqlquote(bind));
                }
            }
        }
        Ok(query)
    }

    fn error(&self, kind: TemplateErrorKind, message: String, position: usize) -> Error {
        Error::Template(TemplateError {
            kind,
            message,
            text: self.text.clone(),
            position,
        })
    }

    fn eval(&self, expr: &Expr, vars: &Vars, position: usize) -> Result<Bind> {
        match expr {
            Expr::Param(name) => vars.get(name).cloned().ok_or_else(|| {
                self.error(
                    TemplateErrorKind::UnresolvedName,
                    format!("unresolved name '{name}'"),
                    position,
                )
            }),
            Expr::Literal(Lit::Int(n)) => Ok(Bind::from(*n)),
            Expr::Literal(Lit::Float(n)) => Ok(Bind::from(*n)),
            Expr::Literal(Lit::Str(s)) => Ok(Bind::from(s.as_str())),
            Expr::GetAttr(base, attr) => {
                let base = self.eval(base, vars, position)?;
                match base {
                    Bind::Value(Value::Json(serde_json::Value::Object(map))) => map
                        .get(attr)
                        .cloned()
                        .map(|v| Bind::Value(Value::from_json_element(v)))
                        .ok_or_else(|| {
                            self.error(
                                TemplateErrorKind::BadAccess,
                                format!("no attribute '{attr}'"),
                                position,
                            )
                        }),
                    other => Err(self.error(
                        TemplateErrorKind::BadAccess,
                        format!("cannot read attribute '{attr}' of {}", describe(&other)),
                        position,
                    )),
                }
            }
            Expr::GetItem(base, key) => {
                let base = self.eval(base, vars, position)?;
                let key = self.eval(key, vars, position)?;
                self.get_item(base, &key, position)
            }
        }
    }

    fn get_item(&self, base: Bind, key: &Bind, position: usize) -> Result<Bind> {
        let missing = || {
            self.error(
                TemplateErrorKind::BadAccess,
                format!("no item {key:?} in {}", describe(&base)),
                position,
            )
        };
        let Bind::Value(key) = key else {
            return Err(missing());
        };
        let found = match (&base, key) {
            (Bind::Value(Value::Json(serde_json::Value::Object(map))), Value::Text(k)) => {
                map.get(k).cloned().map(Value::from_json_element)
            }
            (Bind::Value(Value::Json(serde_json::Value::Array(items))), k) => k
                .as_i64()
                .and_then(|i| resolve_index(i, items.len()))
                .map(|i| Value::from_json_element(items[i].clone())),
            (Bind::Value(Value::Array(items)), k) => k
                .as_i64()
                .and_then(|i| resolve_index(i, items.len()))
                .map(|i| items[i].clone()),
            _ => None,
        };
        found.map(Bind::Value).ok_or_else(missing)
    }
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { len + index } else { index };
    if (0..len).contains(&index) {
        usize::try_from(index).ok()
    } else {
        None
    }
}

fn describe(bind: &Bind) -> &'static str {
    match bind {
        Bind::Literal(_) => "a literal",
        Bind::Value(v) => v.type_name(),
    }
}

/// Parse and interpolate in one step.
pub fn reparam(text: &str, vars: &Vars) -> Result<SqlQuery> {
    Template::parse(text)?.interpolate(vars)
}

struct Parser<'a> {
    text: &'a str,
}

impl Parser<'_> {
    fn error(&self, message: &str, position: usize) -> Error {
        Error::Template(TemplateError {
            kind: TemplateErrorKind::Syntax,
            message: message.to_string(),
            text: self.text.to_string(),
            position,
        })
    }

    fn byte(&self, pos: usize) -> Option<u8> {
        self.text.as_bytes().get(pos).copied()
    }

    fn parse(&self) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        let mut literal = String::new();
        let mut pos = 0;

        while let Some(offset) = self.text[pos..].find('$') {
            let dollar = pos + offset;
            literal.push_str(&self.text[pos..dollar]);

            match self.byte(dollar + 1) {
                Some(b'{') => {
                    let (expr, end) = self.parse_expr(dollar + 2, 0)?;
                    let end = self.skip_blanks(end);
                    if self.byte(end) != Some(b'}') {
                        return Err(self.error("unterminated '${'", dollar));
                    }
                    flush(&mut chunks, &mut literal);
                    chunks.push(Chunk::Expr(expr, dollar));
                    pos = end + 1;
                }
                Some(b'$') => {
                    literal.push('$');
                    pos = dollar + 2;
                }
                Some(c) if c.is_ascii_alphabetic() || c == b'_' => {
                    let (expr, end) = self.parse_expr(dollar + 1, 0)?;
                    flush(&mut chunks, &mut literal);
                    chunks.push(Chunk::Expr(expr, dollar));
                    pos = end;
                }
                _ => {
                    literal.push('$');
                    pos = dollar + 1;
                }
            }
        }

        literal.push_str(&self.text[pos..]);
        flush(&mut chunks, &mut literal);
        Ok(chunks)
    }

    fn skip_blanks(&self, mut pos: usize) -> usize {
        while matches!(self.byte(pos), Some(b' ' | b'\t')) {
            pos += 1;
        }
        pos
    }

    fn token(&self, pos: usize) -> Result<(Token, usize)> {
        let regex = token_regex().ok_or_else(|| self.error("tokenizer unavailable", pos))?;
        let caps = regex
            .captures(&self.text[pos..])
            .ok_or_else(|| self.error("expected a name or literal", pos))?;
        let end = pos + caps.get(0).map_or(0, |m| m.end());

        if let Some(name) = caps.name("name") {
            return Ok((Token::Name(name.as_str().to_string()), end));
        }
        if let Some(num) = caps.name("num") {
            let raw = num.as_str();
            let lit = match raw.parse::<i64>() {
                Ok(n) => Lit::Int(n),
                Err(_) => Lit::Float(
                    raw.parse::<f64>()
                        .map_err(|_| self.error("invalid number", pos))?,
                ),
            };
            return Ok((Token::Literal(lit), end));
        }
        let quoted = caps
            .name("str")
            .map(|m| m.as_str())
            .ok_or_else(|| self.error("expected a name or literal", pos))?;
        Ok((Token::Literal(Lit::Str(unquote(quoted))), end))
    }

    fn parse_expr(&self, pos: usize, depth: usize) -> Result<(Expr, usize)> {
        if depth > MAX_NESTING {
            return Err(self.error("references nested too deeply", pos));
        }
        let (token, mut end) = self.token(pos)?;
        let mut expr = match token {
            Token::Name(name) => Expr::Param(name),
            Token::Literal(lit) => Expr::Literal(lit),
        };

        loop {
            match self.byte(end) {
                Some(b'.')
                    if self
                        .byte(end + 1)
                        .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_') =>
                {
                    let start = end + 1;
                    let len = self.text[start..]
                        .bytes()
                        .take_while(|c| c.is_ascii_alphanumeric() || *c == b'_')
                        .count();
                    expr = Expr::GetAttr(Box::new(expr), self.text[start..start + len].to_string());
                    end = start + len;
                }
                Some(b'[') => {
                    let (key, key_end) = self.parse_expr(end + 1, depth + 1)?;
                    let close = self.skip_blanks(key_end);
                    if self.byte(close) != Some(b']') {
                        return Err(self.error("unterminated '['", end));
                    }
                    expr = Expr::GetItem(Box::new(expr), Box::new(key));
                    end = close + 1;
                }
                _ => break,
            }
        }
        Ok((expr, end))
    }
}

fn flush(chunks: &mut Vec<Chunk>, literal: &mut String) {
    if !literal.is_empty() {
        chunks.push(Chunk::Text(std::mem::take(literal)));
    }
}

fn unquote(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
