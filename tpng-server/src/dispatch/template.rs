//! Alert title and body templates
//!
//! Placeholders: `%T` alert kind, `%I` matched value, `%E` emergency
//! (`True`/`False`), `%U` transmission ID. Templates are scanned once, so
//! substituted values are never expanded again.

use uuid::Uuid;

use super::AlertKind;

pub const DEFAULT_TITLE: &str = "%T alert: %I";
pub const DEFAULT_BODY: &str = "Transmission %U";

pub fn render(template: &str, kind: AlertKind, value: &str, emergency: bool, transmission_id: Uuid) -> String {
    let transmission_id = transmission_id.to_string();
    let mut out = String::with_capacity(template.len() + value.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '%' {
            let substitution = match chars.peek() {
                Some('T') => Some(kind.as_str()),
                Some('I') => Some(value),
                Some('E') => Some(if emergency { "True" } else { "False" }),
                Some('U') => Some(transmission_id.as_str()),
                _ => None,
            };
            if let Some(text) = substitution {
                chars.next();
                out.push_str(text);
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// The template, or `fallback` when it is blank
pub fn or_default<'a>(template: &'a str, fallback: &'a str) -> &'a str {
    if template.trim().is_empty() {
        fallback
    } else {
        template
    }
}
