// converge-lang/src/template.rs
// ============================================================================
// Module: String Templates
// Description: Compiler and renderer for `{{ .Field }}` string templates.
// Purpose: Produce allocation keys, discovery values, and code parameters.
// Dependencies: serde_json, thiserror, crate::labels
// ============================================================================

//! ## Overview
//! Templates are plain text with embedded actions:
//! - `{{ .User.Name }}` renders a field chain from the parameters object.
//! - `{{ "literal" }}` renders a quoted literal.
//! - `{{/* note */}}` is a comment and renders nothing.
//! - `{{-` and `-}}` trim whitespace on the adjacent side of the action.
//!
//! Rendering is strict: a field that does not exist, or that resolves to an
//! object or array, is an error rather than an empty string. Rendered values
//! become part of instance identities and deployment parameters.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Map;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::labels::LabelSet;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Default maximum template size in bytes.
pub const DEFAULT_MAX_TEMPLATE_BYTES: usize = 64 * 1024;
/// Opening action delimiter.
const OPEN: &str = "{{";
/// Closing action delimiter.
const CLOSE: &str = "}}";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while compiling or rendering a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// Template text is malformed.
    #[error("unable to compile template `{template}`: {message}")]
    Compile {
        /// Template source text.
        template: String,
        /// Failure description.
        message: String,
    },
    /// A referenced field does not exist in the parameters.
    #[error("template `{template}` references missing field `{field}`")]
    MissingField {
        /// Template source text.
        template: String,
        /// Dotted field path.
        field: String,
    },
    /// A referenced field resolves to an object or array.
    #[error("template `{template}` field `{field}` is not a scalar value")]
    NotScalar {
        /// Template source text.
        template: String,
        /// Dotted field path.
        field: String,
    },
}

impl TemplateError {
    /// Returns true for compile-time failures.
    #[must_use]
    pub const fn is_compile_error(&self) -> bool {
        matches!(self, Self::Compile { .. })
    }
}

// ============================================================================
// SECTION: Parameters
// ============================================================================

/// Parameters visible to a template: `User`, `Labels`, and `Discovery`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateParams {
    /// Root parameter object.
    root: Map<String, JsonValue>,
}

impl TemplateParams {
    /// Creates empty parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the `User` object.
    #[must_use]
    pub fn with_user(
        mut self,
        id: &str,
        name: &str,
        labels: &BTreeMap<String, String>,
        secrets: &BTreeMap<String, String>,
    ) -> Self {
        let mut user = Map::new();
        user.insert("ID".to_string(), JsonValue::String(id.to_string()));
        user.insert("Name".to_string(), JsonValue::String(name.to_string()));
        user.insert("Labels".to_string(), string_map(labels));
        user.insert("Secrets".to_string(), string_map(secrets));
        self.root.insert("User".to_string(), JsonValue::Object(user));
        self
    }

    /// Adds the `Labels` object.
    #[must_use]
    pub fn with_labels(mut self, labels: &LabelSet) -> Self {
        self.root.insert("Labels".to_string(), string_map(&labels.labels));
        self
    }

    /// Adds the `Discovery` object.
    #[must_use]
    pub fn with_discovery(mut self, discovery: JsonValue) -> Self {
        self.root.insert("Discovery".to_string(), discovery);
        self
    }

    /// Returns the root parameter object.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, JsonValue> {
        &self.root
    }
}

/// Converts a string map into a JSON object.
fn string_map(map: &BTreeMap<String, String>) -> JsonValue {
    JsonValue::Object(
        map.iter().map(|(key, value)| (key.clone(), JsonValue::String(value.clone()))).collect(),
    )
}

// ============================================================================
// SECTION: Compiled Template
// ============================================================================

/// Template segment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Literal text copied verbatim.
    Text(String),
    /// Field chain lookup. Empty path refers to the root object.
    Field(Vec<String>),
}

/// A compiled string template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Original source text.
    source: String,
    /// Parsed segments.
    segments: Vec<Segment>,
}

impl Template {
    /// Compiles `source` with the default size limit.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Compile`] when the source is malformed.
    pub fn compile(source: &str) -> Result<Self, TemplateError> {
        Self::compile_with_limit(source, DEFAULT_MAX_TEMPLATE_BYTES)
    }

    /// Compiles `source`, rejecting inputs larger than `max_bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Compile`] when the source is malformed or too
    /// large.
    pub fn compile_with_limit(source: &str, max_bytes: usize) -> Result<Self, TemplateError> {
        let fail = |message: String| TemplateError::Compile {
            template: source.to_string(),
            message,
        };
        if source.len() > max_bytes {
            return Err(fail(format!(
                "template exceeds size limit: {} bytes (max {max_bytes})",
                source.len()
            )));
        }

        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;
        let mut trim_next = false;
        while let Some(start) = rest.find(OPEN) {
            let mut text = &rest[.. start];
            if trim_next {
                text = text.trim_start();
            }
            let mut action = &rest[start + OPEN.len() ..];
            let Some(end) = action.find(CLOSE) else {
                return Err(fail(format!("unclosed action starting at {}", offset + start)));
            };
            action = &action[.. end];
            let consumed = start + OPEN.len() + end + CLOSE.len();

            if let Some(stripped) = action.strip_prefix('-') {
                text = text.trim_end();
                action = stripped;
            }
            trim_next = false;
            if let Some(stripped) = action.strip_suffix('-') {
                trim_next = true;
                action = stripped;
            }
            if !text.is_empty() {
                segments.push(Segment::Text(text.to_string()));
            }
            if let Some(segment) = parse_action(action.trim()).map_err(fail)? {
                segments.push(segment);
            }

            offset += consumed;
            rest = &rest[consumed ..];
        }
        let tail = if trim_next { rest.trim_start() } else { rest };
        if !tail.is_empty() {
            segments.push(Segment::Text(tail.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// Returns the source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Renders the template against `params`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::MissingField`] or [`TemplateError::NotScalar`]
    /// when a field chain cannot be rendered.
    pub fn render(&self, params: &TemplateParams) -> Result<String, TemplateError> {
        let mut output = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => output.push_str(text),
                Segment::Field(path) => output.push_str(&self.render_field(path, params)?),
            }
        }
        Ok(output)
    }

    /// Renders a single field chain.
    fn render_field(
        &self,
        path: &[String],
        params: &TemplateParams,
    ) -> Result<String, TemplateError> {
        let field = format!(".{}", path.join("."));
        let mut current: Option<&JsonValue> = None;
        let mut object = Some(params.as_map());
        for name in path {
            let next = object.and_then(|map| map.get(name)).ok_or_else(|| {
                TemplateError::MissingField {
                    template: self.source.clone(),
                    field: field.clone(),
                }
            })?;
            object = next.as_object();
            current = Some(next);
        }
        match current {
            Some(JsonValue::String(text)) => Ok(text.clone()),
            Some(JsonValue::Number(number)) => Ok(number.to_string()),
            Some(JsonValue::Bool(flag)) => Ok(flag.to_string()),
            Some(JsonValue::Null) => Err(TemplateError::MissingField {
                template: self.source.clone(),
                field,
            }),
            Some(JsonValue::Array(_) | JsonValue::Object(_)) | None => {
                Err(TemplateError::NotScalar {
                    template: self.source.clone(),
                    field,
                })
            }
        }
    }
}

/// Parses the trimmed body of an action.
fn parse_action(action: &str) -> Result<Option<Segment>, String> {
    if action.is_empty() {
        return Err("empty action".to_string());
    }
    if action.starts_with("/*") {
        return if action.ends_with("*/") && action.len() >= 4 {
            Ok(None)
        } else {
            Err(format!("unterminated comment `{action}`"))
        };
    }
    if let Some(quoted) = action.strip_prefix('"') {
        return quoted
            .strip_suffix('"')
            .filter(|inner| !inner.contains('"'))
            .map(|inner| Some(Segment::Text(inner.to_string())))
            .ok_or_else(|| format!("malformed string literal `{action}`"));
    }
    let Some(chain) = action.strip_prefix('.') else {
        return Err(format!("unsupported action `{action}`"));
    };
    if chain.is_empty() {
        return Ok(Some(Segment::Field(Vec::new())));
    }
    let mut path = Vec::new();
    for name in chain.split('.') {
        let valid = name.chars().next().is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_')
            && name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
        if !valid {
            return Err(format!("invalid field name `{name}` in `{action}`"));
        }
        path.push(name.to_string());
    }
    Ok(Some(Segment::Field(path)))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
