//! Rendering seam: the compiler hands template text plus the project
//! configuration to a [`Renderer`] and writes whatever comes back.
use serde_json::Value;
use thiserror::Error;

/// Output of one render call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rendered {
    /// Rendered text.
    pub text: String,
    /// Placeholders that had no value in the context, in order of appearance.
    pub missing: Vec<String>,
}

/// Failure to render a template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A `{{` was never closed.
    #[error("unterminated placeholder at byte {offset}")]
    Unterminated {
        /// Byte offset of the opening braces.
        offset: usize,
    },
    /// Any other renderer-specific failure.
    #[error("{0}")]
    Other(String),
}

/// Renders template text against a JSON context.
#[cfg_attr(test, mockall::automock)]
pub trait Renderer: Send + Sync {
    /// Render `text` with `context`.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] when the template cannot be rendered.
    fn render(&self, text: &str, context: &Value) -> Result<Rendered, RenderError>;
}

/// Built-in renderer substituting `{{dotted.path}}` placeholders.
///
/// Unresolved placeholders are left intact and reported in
/// [`Rendered::missing`]. Block syntax (`{{#if ...}}` and the like) is not
/// interpreted and passes through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderRenderer;

impl Renderer for PlaceholderRenderer {
    fn render(&self, text: &str, context: &Value) -> Result<Rendered, RenderError> {
        let mut out = String::with_capacity(text.len());
        let mut missing = Vec::new();
        let mut rest = text;
        let mut consumed = 0;

        while let Some(start) = rest.find("{{") {
            let (before, after_open) = rest.split_at(start);
            out.push_str(before);
            let inner_and_rest = after_open.get(2..).unwrap_or_default();
            let Some(end) = inner_and_rest.find("}}") else {
                return Err(RenderError::Unterminated {
                    offset: consumed + start,
                });
            };
            let (inner, after_close) = inner_and_rest.split_at(end);
            let key = inner.trim();
            let original = after_open.get(..end + 4).unwrap_or_default();

            if is_path(key) {
                match lookup(context, key) {
                    Some(value) => out.push_str(&value),
                    None => {
                        missing.push(key.to_string());
                        out.push_str(original);
                    }
                }
            } else {
                out.push_str(original);
            }

            let advanced = start + end + 4;
            consumed += advanced;
            rest = after_close.get(2..).unwrap_or_default();
        }
        out.push_str(rest);

        Ok(Rendered { text: out, missing })
    }
}

fn is_path(key: &str) -> bool {
    !key.is_empty()
        && key.split('.').all(|seg| {
            !seg.is_empty()
                && seg
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        })
}

/// Resolve `a.b.c` against nested objects; array segments accept indices.
fn lookup(context: &Value, path: &str) -> Option<String> {
    let mut current = context;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    match current {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
