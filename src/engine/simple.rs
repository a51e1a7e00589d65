//! The built-in `simple` engine.
//!
//! Supports plain text with embedded expressions:
//!
//! - `${user.name}` and `<%= user.name %>`: substitute a dotted path
//! - `$name` / `$user.name`: shorthand for the same
//! - `\$`: a literal dollar sign
//!
//! Path segments are identifiers or array indices (`items.0`). Scriptlets
//! (`<% ... %>`) are rejected at compile time; use the `jinja` engine for
//! control flow.

use std::io;
use std::sync::Arc;

use serde_json::Value;

use super::{EngineError, SharedTemplate, Template, TemplateEngine};
use crate::binding::Variables;

/// Engine for `${expr}` templates.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleTemplateEngine;

impl SimpleTemplateEngine {
    /// Create a new engine
    pub fn new() -> Self {
        Self
    }
}

impl TemplateEngine for SimpleTemplateEngine {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn compile(&self, source: &str) -> Result<SharedTemplate, EngineError> {
        let segments = Parser::new(source).parse()?;
        Ok(Arc::new(SimpleTemplate { segments }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Expr { path: Vec<String>, line: usize },
}

/// A template compiled by [`SimpleTemplateEngine`].
#[derive(Debug)]
pub struct SimpleTemplate {
    segments: Vec<Segment>,
}

impl SimpleTemplate {
    /// Number of substitution sites
    pub fn expression_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Expr { .. }))
            .count()
    }
}

impl Template for SimpleTemplate {
    fn render(&self, vars: &Variables, out: &mut dyn io::Write) -> Result<(), EngineError> {
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.write_all(text.as_bytes())?,
                Segment::Expr { path, line } => {
                    let value = lookup(vars, path).ok_or_else(|| {
                        EngineError::at_line(
                            format!("undefined variable '{}'", path.join(".")),
                            *line,
                        )
                    })?;
                    write_value(value, out)?;
                }
            }
        }
        Ok(())
    }
}

fn lookup<'a>(vars: &'a Variables, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = vars.get(first)?;
    for segment in rest {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn write_value(value: &Value, out: &mut dyn io::Write) -> io::Result<()> {
    match value {
        Value::Null => Ok(()),
        Value::String(s) => out.write_all(s.as_bytes()),
        other => write!(out, "{other}"),
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    text: String,
    segments: Vec<Segment>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            text: String::new(),
            segments: Vec::new(),
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            self.segments
                .push(Segment::Text(std::mem::take(&mut self.text)));
        }
    }

    fn push_expr(&mut self, raw: &str, line: usize) -> Result<(), EngineError> {
        let path = parse_path(raw, line)?;
        self.flush_text();
        self.segments.push(Segment::Expr { path, line });
        Ok(())
    }

    fn parse(mut self) -> Result<Vec<Segment>, EngineError> {
        while let Some(c) = self.bump() {
            match c {
                '\\' if self.chars.peek() == Some(&'$') => {
                    self.bump();
                    self.text.push('$');
                }
                '$' => self.dollar()?,
                '<' if self.chars.peek() == Some(&'%') => {
                    self.bump();
                    self.scriptlet()?;
                }
                other => self.text.push(other),
            }
        }
        self.flush_text();
        Ok(self.segments)
    }

    fn dollar(&mut self) -> Result<(), EngineError> {
        let line = self.line;
        match self.chars.peek().copied() {
            Some('{') => {
                self.bump();
                let mut raw = String::new();
                loop {
                    match self.bump() {
                        Some('}') => break,
                        Some(c) => raw.push(c),
                        None => {
                            return Err(EngineError::at_line(
                                "unterminated '${' expression",
                                line,
                            ))
                        }
                    }
                }
                self.push_expr(&raw, line)
            }
            Some(c) if is_ident_start(c) => {
                let mut raw = String::new();
                while let Some(&c) = self.chars.peek() {
                    if is_ident_char(c) {
                        raw.push(c);
                        self.bump();
                    } else if c == '.' && self.dot_continues_path() {
                        raw.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                self.push_expr(&raw, line)
            }
            _ => {
                self.text.push('$');
                Ok(())
            }
        }
    }

    /// `$name.` at the end of a sentence keeps the dot as text.
    fn dot_continues_path(&self) -> bool {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next().is_some_and(is_ident_start)
    }

    fn scriptlet(&mut self) -> Result<(), EngineError> {
        let line = self.line;
        if self.chars.peek() != Some(&'=') {
            return Err(EngineError::at_line(
                "scriptlets ('<% ... %>') are not supported by the simple engine",
                line,
            ));
        }
        self.bump();
        let mut raw = String::new();
        loop {
            match self.bump() {
                Some('%') if self.chars.peek() == Some(&'>') => {
                    self.bump();
                    break;
                }
                Some(c) => raw.push(c),
                None => {
                    return Err(EngineError::at_line(
                        "unterminated '<%=' expression",
                        line,
                    ))
                }
            }
        }
        self.push_expr(&raw, line)
    }
}

fn parse_path(raw: &str, line: usize) -> Result<Vec<String>, EngineError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(EngineError::at_line("empty expression", line));
    }
    let mut path = Vec::new();
    for (i, segment) in raw.split('.').enumerate() {
        let segment = segment.trim();
        let valid = match segment.chars().next() {
            Some(c) if is_ident_start(c) => segment.chars().all(is_ident_char),
            Some(c) if c.is_ascii_digit() && i > 0 => segment.chars().all(|c| c.is_ascii_digit()),
            _ => false,
        };
        if !valid {
            return Err(EngineError::at_line(
                format!("invalid expression '{raw}'"),
                line,
            ));
        }
        path.push(segment.to_string());
    }
    Ok(path)
}
