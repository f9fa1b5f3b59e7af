//! Logic-less template rendering for generated ticket comments.
//!
//! Two tag forms are understood:
//!
//! - `{{name}}` is replaced by the field value, or nothing when absent
//! - `{{#name}}...{{/name}}` keeps its body only when the field is truthy
//!
//! A field is truthy when present and non-empty. Unterminated tags are
//! emitted literally; an unterminated section runs to the end of input.

use std::collections::BTreeMap;

/// Named values available to a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateFields {
    values: BTreeMap<String, String>,
}

impl TemplateFields {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`TemplateFields::set`].
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_string(), value.into());
    }

    /// Set `name` only when `value` is present.
    pub fn set_opt(&mut self, name: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.set(name, value);
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn is_truthy(&self, name: &str) -> bool {
        self.get(name).is_some_and(|value| !value.trim().is_empty())
    }
}

/// Render `template` against `fields`.
#[must_use]
pub fn render(template: &str, fields: &TemplateFields) -> String {
    let mut out = String::with_capacity(template.len());
    render_into(template, fields, &mut out);
    out
}

fn render_into(template: &str, fields: &TemplateFields, out: &mut String) {
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return;
        };
        let tag = after[..end].trim();
        rest = &after[end + 2..];

        if let Some(name) = tag.strip_prefix('#') {
            let name = name.trim();
            let (body, remainder) = split_section(rest, name);
            if fields.is_truthy(name) {
                render_into(body, fields, out);
            }
            rest = remainder;
        } else if tag.starts_with('/') {
            // stray close tag
        } else {
            out.push_str(fields.get(tag).unwrap_or_default());
        }
    }
    out.push_str(rest);
}

/// Split `rest` at the close tag matching an already-consumed open tag.
fn split_section<'t>(rest: &'t str, name: &str) -> (&'t str, &'t str) {
    let open = format!("{{{{#{name}}}}}");
    let close = format!("{{{{/{name}}}}}");
    let mut depth = 0_usize;
    let mut cursor = 0;

    loop {
        let Some(close_at) = rest[cursor..].find(&close) else {
            return (rest, "");
        };
        match rest[cursor..].find(&open) {
            Some(open_at) if open_at < close_at => {
                depth += 1;
                cursor += open_at + open.len();
            }
            _ if depth == 0 => {
                let body_end = cursor + close_at;
                return (&rest[..body_end], &rest[body_end + close.len()..]);
            }
            _ => {
                depth -= 1;
                cursor += close_at + close.len();
            }
        }
    }
}
