//! Parameter substitution for prompt fragments.
//!
//! Fragments declared with `parameters` may contain `{{name}}` placeholders
//! (inner whitespace is ignored). Every placeholder must have a value;
//! parameters that no placeholder uses are ignored.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use rooda::prompt::templates::render;
//!
//! let mut params = BTreeMap::new();
//! params.insert("file".to_string(), toml::Value::from("PLAN.md"));
//!
//! assert_eq!(render("Update {{ file }}.", &params).unwrap(), "Update PLAN.md.");
//! ```

use std::collections::BTreeMap;

use crate::error::{Result, RoodaError};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Substitute `{{name}}` placeholders in `template`.
///
/// An opening `{{` with no matching `}}` is kept as literal text.
///
/// # Errors
///
/// Returns [`RoodaError::Prompt`] when a placeholder names a parameter that
/// was not supplied.
pub fn render(template: &str, params: &BTreeMap<String, toml::Value>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };

        out.push_str(&rest[..start]);
        let name = after_open[..end].trim();
        let value = params.get(name).ok_or_else(|| {
            RoodaError::prompt(format!(
                "unknown template parameter '{}' (available: {})",
                name,
                available(params)
            ))
        })?;
        out.push_str(&display_value(value));
        rest = &after_open[end + CLOSE.len()..];
    }

    out.push_str(rest);
    Ok(out)
}

fn display_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn available(params: &BTreeMap<String, toml::Value>) -> String {
    if params.is_empty() {
        return "none".to_string();
    }
    params.keys().cloned().collect::<Vec<_>>().join(", ")
}
