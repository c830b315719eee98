//! Helpers over declarative `serde_json` values.
//!
//! Declarative values keep three distinct states for an object key: absent
//! (unspecified), present as `null` (explicitly unset) and present with a
//! value. `{}` is a value in its own right.

use std::fmt::{self, Display, Formatter};

use serde_json::{Map, Value};

/// One step of an [`AttrPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Step {
    /// Object attribute.
    Attr(String),
    /// Positional list element.
    Index(usize),
    /// Named list element.
    Key(String),
}

/// Structured path to a field inside a declarative value.
///
/// Renders as `rules[r1].source_translation.static_ip`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AttrPath(Vec<Step>);

impl AttrPath {
    /// The empty path (the value itself).
    pub fn root() -> Self {
        Self::default()
    }

    /// Path to a top-level attribute.
    pub fn attr_root(name: &str) -> Self {
        Self(vec![Step::Attr(name.to_string())])
    }

    /// Child attribute path.
    pub fn attr(&self, name: &str) -> Self {
        self.with(Step::Attr(name.to_string()))
    }

    /// Positional child path.
    pub fn index(&self, idx: usize) -> Self {
        self.with(Step::Index(idx))
    }

    /// Named child path.
    pub fn key(&self, key: &str) -> Self {
        self.with(Step::Key(key.to_string()))
    }

    pub fn steps(&self) -> &[Step] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    fn with(&self, step: Step) -> Self {
        let mut steps = self.0.clone();
        steps.push(step);
        Self(steps)
    }
}

impl Display for AttrPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        for (idx, step) in self.0.iter().enumerate() {
            match step {
                Step::Attr(name) if idx == 0 => write!(f, "{name}")?,
                Step::Attr(name) => write!(f, ".{name}")?,
                Step::Index(i) => write!(f, "[{i}]")?,
                Step::Key(key) => write!(f, "[{key}]")?,
            }
        }
        Ok(())
    }
}

/// True when `value` is present and not `null`.
pub fn is_set(value: Option<&Value>) -> bool {
    matches!(value, Some(v) if !v.is_null())
}

/// Look up a set (non-null) field of an object value.
pub fn field<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    object.get(name).filter(|v| !v.is_null())
}

/// Read a set string field.
pub fn str_field<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    field(object, name).and_then(Value::as_str)
}

/// The `name` of an entry value, if it is an object with a string name.
pub fn entry_name(value: &Value) -> Option<&str> {
    value.as_object().and_then(|o| str_field(o, "name"))
}

/// Short human label for a value's JSON type.
pub fn type_label(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
