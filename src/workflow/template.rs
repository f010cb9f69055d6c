use crate::workflow::{
    context::ContextSnapshot,
    errors::{FlowrunError, Result},
};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*(.+?)\s*\}\}").expect("placeholder regex"))
}

/// Parsed form of the template path language: a root, dotted segments and
/// an optional trailing `|length` filter.
#[derive(Debug, PartialEq)]
struct PathExpr<'a> {
    segments: Vec<&'a str>,
    length: bool,
}

fn parse_path(expr: &str) -> Result<PathExpr<'_>> {
    let (path, length) = match expr.split_once('|') {
        Some((path, filter)) => {
            if filter.trim() != "length" {
                return Err(FlowrunError::TemplateResolve(format!(
                    "unknown filter '{}' in '{expr}'",
                    filter.trim()
                )));
            }
            (path.trim(), true)
        }
        None => (expr.trim(), false),
    };
    if path.is_empty() {
        return Err(FlowrunError::TemplateResolve(
            "empty template expression".to_string(),
        ));
    }
    Ok(PathExpr {
        segments: path.split('.').collect(),
        length,
    })
}

/// Resolves `{{ … }}` placeholders against a context snapshot.
///
/// Resolution is deterministic: the snapshot is immutable for the lifetime
/// of the resolver.
pub struct TemplateResolver<'a> {
    snapshot: &'a ContextSnapshot,
}

impl<'a> TemplateResolver<'a> {
    pub fn new(snapshot: &'a ContextSnapshot) -> Self {
        Self { snapshot }
    }

    /// Deep-resolve every string leaf of a JSON-like value.
    pub fn resolve_value(&self, value: &Value) -> Result<Value> {
        match value {
            Value::String(s) => self.resolve_string(s),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.resolve_value(item)?);
                }
                Ok(Value::Array(out))
            }
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.resolve_value(v)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    /// Resolve a single string. A string that is exactly one placeholder
    /// keeps the native type of the resolved value; otherwise every
    /// placeholder is stringified into the surrounding text.
    pub fn resolve_string(&self, input: &str) -> Result<Value> {
        let re = placeholder_re();
        if let Some(m) = re.find(input) {
            if m.start() == 0 && m.end() == input.len() {
                let caps = re.captures(input).ok_or_else(|| {
                    FlowrunError::TemplateResolve(format!("malformed placeholder in '{input}'"))
                })?;
                return self.resolve_expr(caps.get(1).map_or("", |c| c.as_str()));
            }
        } else {
            return Ok(Value::String(input.to_string()));
        }

        let mut out = String::with_capacity(input.len());
        let mut last = 0;
        for caps in re.captures_iter(input) {
            let whole = caps.get(0).ok_or_else(|| {
                FlowrunError::TemplateResolve(format!("malformed placeholder in '{input}'"))
            })?;
            out.push_str(&input[last..whole.start()]);
            let resolved = self.resolve_expr(caps.get(1).map_or("", |c| c.as_str()))?;
            out.push_str(&stringify(&resolved));
            last = whole.end();
        }
        out.push_str(&input[last..]);
        Ok(Value::String(out))
    }

    /// Resolve a string and force the result into textual form, for use by
    /// the expression evaluator.
    pub fn resolve_to_string(&self, input: &str) -> Result<String> {
        Ok(stringify(&self.resolve_string(input)?))
    }

    fn resolve_expr(&self, expr: &str) -> Result<Value> {
        let path = parse_path(expr)?;
        let value = self.lookup(&path.segments, expr)?;
        if path.length {
            length_of(&value, expr)
        } else {
            Ok(value)
        }
    }

    fn lookup(&self, segments: &[&str], expr: &str) -> Result<Value> {
        let unresolved =
            || FlowrunError::TemplateResolve(format!("unresolved template path '{expr}'"));

        match segments {
            ["variables", name, rest @ ..] => {
                let root = self.snapshot.variables.get(*name).ok_or_else(unresolved)?;
                traverse(root, rest).ok_or_else(unresolved)
            }
            ["steps", node_id, "outputs", rest @ ..] => {
                let record = self.snapshot.steps.get(*node_id).ok_or_else(unresolved)?;
                traverse(&record.outputs, rest).ok_or_else(unresolved)
            }
            ["steps", node_id, "status"] => {
                let record = self.snapshot.steps.get(*node_id).ok_or_else(unresolved)?;
                Ok(Value::String(record.status.to_string()))
            }
            ["loop", field, rest @ ..] => {
                let frame = self.snapshot.current_frame().ok_or_else(|| {
                    FlowrunError::TemplateResolve(format!(
                        "'{expr}' referenced outside of a loop frame"
                    ))
                })?;
                match *field {
                    "item" => traverse(&frame.item, rest).ok_or_else(unresolved),
                    "index" if rest.is_empty() => Ok(Value::from(frame.index)),
                    "length" if rest.is_empty() => Ok(Value::from(frame.length)),
                    _ => Err(unresolved()),
                }
            }
            _ => Err(unresolved()),
        }
    }
}

fn traverse(root: &Value, segments: &[&str]) -> Option<Value> {
    let mut current = root;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current.clone())
}

fn length_of(value: &Value, expr: &str) -> Result<Value> {
    let len = match value {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        _ => {
            return Err(FlowrunError::TemplateResolve(format!(
                "'{expr}': length is only defined for strings, arrays and objects"
            )))
        }
    };
    Ok(Value::from(len))
}

/// Textual form of a resolved value when embedded inside a larger string:
/// strings stay bare, everything else renders as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
