//! Placeholder substitution for follow-up requests.
//!
//! Acknowledge and failure requests are often only known after the fetch
//! ("delete the row whose id we just read"). Templates carry `{{key}}`
//! placeholders that are filled from the fetched [`WorkItem`]:
//!
//! - `{{payload}}` is the whole fetched payload;
//! - any other `{{key}}` is a field of the item's record, with dotted paths
//!   (`{{user.emails.0}}`) walking nested objects and arrays.
//!
//! Two modes exist. Positional mode ([`Template::resolve_params`]) turns a
//! parameter list into typed values for backends that bind parameters
//! separately from the statement. Whole-string mode ([`Template::render`])
//! rewrites the text itself.
//!
//! Unknown keys resolve to an empty value instead of failing. A mistyped key
//! therefore produces a request with an empty field; callers that care should
//! validate their templates up front with [`Template::placeholders`].

use crate::model::work::{Record, WorkItem};
use serde_json::Value;
use thiserror::Error;

/// Name of the reserved payload placeholder.
pub const PAYLOAD_KEY: &str = "payload";

/// The reserved payload placeholder as it appears in templates.
pub const PAYLOAD_TOKEN: &str = "{{payload}}";

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template needs record fields but payload is not a JSON object: {0}")]
    MalformedPayload(String),
}

/// A resolved positional parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// Parameter without placeholders, passed through as written.
    Literal(String),
    /// The raw fetched payload.
    Payload(Vec<u8>),
    /// A record field. `Null` when the key is absent.
    Value(Value),
}

/// A follow-up request: text plus optional positional parameters.
///
/// Resolution never mutates the template; every call produces new output.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    text: String,
    params: Vec<String>,
}

impl Template {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<String>) -> Self {
        self.params = params;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Distinct placeholder keys in the text, in order of first appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for segment in Scanner::new(&self.text) {
            if let Segment::Placeholder(key) = segment {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    /// Positional mode: resolve each parameter against the item.
    ///
    /// A parameter that is just `{{payload}}` becomes the raw payload. A parameter
    /// containing `{{key}}` becomes the record value at the first key found in
    /// it. Everything else is a literal.
    pub fn resolve_params(&self, item: &WorkItem) -> Vec<Param> {
        let parsed;
        let record = match item.record.as_ref() {
            Some(record) => Some(record),
            None if self
                .params
                .iter()
                .any(|p| !is_payload_param(p) && first_key(p).is_some()) =>
            {
                parsed = payload_record(&item.payload).ok();
                parsed.as_ref()
            }
            None => None,
        };

        self.params
            .iter()
            .map(|param| {
                if is_payload_param(param) {
                    return Param::Payload(item.payload.clone());
                }
                match first_key(param) {
                    Some(key) => Param::Value(
                        record
                            .and_then(|r| lookup(r, key))
                            .cloned()
                            .unwrap_or(Value::Null),
                    ),
                    None => Param::Literal(param.clone()),
                }
            })
            .collect()
    }

    /// Whole-string mode: substitute every placeholder in the text.
    ///
    /// `{{payload}}` becomes the JSON-encoded record when the item has one and
    /// the payload text otherwise. Other placeholders are filled from the
    /// record. The text is scanned once, so substituted values are never
    /// treated as template syntax. An item without a record has its payload
    /// parsed as a JSON object when the text names a record field, which
    /// fails with [`TemplateError::MalformedPayload`] if it is not one.
    pub fn render(&self, item: &WorkItem) -> Result<String, TemplateError> {
        let needs_record = self.placeholders().into_iter().any(|key| key != PAYLOAD_KEY);
        let parsed;
        let record = match item.record.as_ref() {
            Some(record) => Some(record),
            None if needs_record => {
                parsed = payload_record(&item.payload)?;
                Some(&parsed)
            }
            None => None,
        };
        Ok(fill(&self.text, &payload_text(item), record))
    }

    /// [`render`](Self::render), falling back to no record when the payload
    /// cannot supply one. Every placeholder other than `{{payload}}` then
    /// resolves to the empty string.
    pub fn render_or_empty(&self, item: &WorkItem) -> String {
        match self.render(item) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "template resolution fell back to empty substitution");
                fill(&self.text, &payload_text(item), None)
            }
        }
    }
}

/// Look up `key` in a record. An exact top-level match wins; otherwise a
/// dotted key walks nested objects, with numeric segments indexing arrays.
pub fn lookup<'a>(record: &'a Record, key: &str) -> Option<&'a Value> {
    if let Some(value) = record.get(key) {
        return Some(value);
    }
    if !key.contains('.') {
        return None;
    }

    let mut parts = key.split('.');
    let mut current = record.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Text form of a record value as it appears in a rendered template.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Replace every placeholder in one pass; unknown keys become "".
fn fill(text: &str, payload: &str, record: Option<&Record>) -> String {
    let mut out = String::with_capacity(text.len());
    for segment in Scanner::new(text) {
        match segment {
            Segment::Text(t) => out.push_str(t),
            Segment::Placeholder(PAYLOAD_KEY) => out.push_str(payload),
            Segment::Placeholder(key) => {
                if let Some(value) = record.and_then(|r| lookup(r, key)) {
                    out.push_str(&stringify(value));
                }
            }
        }
    }
    out
}

/// Text standing in for `{{payload}}` in whole-string mode.
fn payload_text(item: &WorkItem) -> String {
    match item.record.as_ref() {
        Some(record) => Value::Object(record.clone()).to_string(),
        None => item.payload_text(),
    }
}

/// A parameter that is exactly the payload placeholder, spacing aside.
fn is_payload_param(param: &str) -> bool {
    let mut segments = Scanner::new(param.trim());
    matches!(
        (segments.next(), segments.next()),
        (Some(Segment::Placeholder(PAYLOAD_KEY)), None)
    )
}

/// Key between the first `{{` and the next `}}`, if any.
fn first_key(text: &str) -> Option<&str> {
    Scanner::new(text).find_map(|segment| match segment {
        Segment::Placeholder(key) => Some(key),
        Segment::Text(_) => None,
    })
}

fn payload_record(payload: &[u8]) -> Result<Record, TemplateError> {
    match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(record)) => Ok(record),
        Ok(other) => Err(TemplateError::MalformedPayload(format!(
            "expected an object, found {}",
            json_kind(&other)
        ))),
        Err(e) => Err(TemplateError::MalformedPayload(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Text(&'a str),
    /// Trimmed name between `{{` and `}}`.
    Placeholder(&'a str),
}

/// Splits text into literal runs and `{{key}}` tokens. An opening `{{`
/// without a closing `}}` is literal text.
struct Scanner<'a> {
    rest: &'a str,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self { rest: text }
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }

        let rest = self.rest;
        match rest.find(OPEN) {
            Some(0) => match rest[OPEN.len()..].find(CLOSE) {
                Some(len) => {
                    let end = OPEN.len() + len + CLOSE.len();
                    self.rest = &rest[end..];
                    Some(Segment::Placeholder(
                        rest[OPEN.len()..OPEN.len() + len].trim(),
                    ))
                }
                None => {
                    self.rest = "";
                    Some(Segment::Text(rest))
                }
            },
            Some(start) => {
                self.rest = &rest[start..];
                Some(Segment::Text(&rest[..start]))
            }
            None => {
                self.rest = "";
                Some(Segment::Text(rest))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments(text: &str) -> Vec<Segment<'_>> {
        Scanner::new(text).collect()
    }

    #[test]
    fn scanner_splits_text_and_placeholders() {
        assert_eq!(
            segments("a {{ id }} b"),
            vec![
                Segment::Text("a "),
                Segment::Placeholder("id"),
                Segment::Text(" b"),
            ]
        );
    }

    #[test]
    fn scanner_treats_unterminated_open_as_text() {
        assert_eq!(
            segments("x {{id"),
            vec![Segment::Text("x "), Segment::Text("{{id")]
        );
    }

    #[test]
    fn scanner_handles_adjacent_placeholders() {
        let keys: Vec<_> = segments("{{a}}{{b}}")
            .into_iter()
            .filter_map(|s| match s {
                Segment::Placeholder(key) => Some(key),
                Segment::Text(_) => None,
            })
            .collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn first_key_stops_at_first_close() {
        assert_eq!(first_key("id={{id}} and {{other}}"), Some("id"));
        assert_eq!(first_key("no placeholders"), None);
    }
}
