//! Error taxonomy surfaced to the orchestrator.
//!
//! Every failure belongs to one [`ErrorCategory`]. Validation failures are
//! collected into [`ValidationErrors`] so a plan reports all problems at once;
//! every other class aborts the operation at the first failure.

use std::fmt::{self, Display, Formatter};

use thiserror::Error;

use crate::config::ConfigError;
use crate::transport::TransportError;
use crate::value::AttrPath;

/// Structural or value-domain problem found before any I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{path}: exactly one location must be set, found {} ({})", .arms.len(), .arms.join(", "))]
    LocationAmbiguous { path: AttrPath, arms: Vec<String> },
    #[error("{path}: resource '{resource}' cannot be placed in a '{arm}' location")]
    LocationUnsupported {
        path: AttrPath,
        resource: String,
        arm: String,
    },
    #[error("{path}: name must not be empty")]
    EmptyName { path: AttrPath },
    #[error("{path}: at most one of [{}] may be set, found [{}]", .allowed.join(", "), .set.join(", "))]
    VariantCardinality {
        path: AttrPath,
        allowed: Vec<String>,
        set: Vec<String>,
    },
    #[error("{path}: duplicate entry name '{name}'")]
    DuplicateEntryName { path: AttrPath, name: String },
    #[error("{path}: required attribute is missing")]
    RequiredAttributeMissing { path: AttrPath },
    #[error("{path}: requires '{requires}' to be set")]
    RequiredWith { path: AttrPath, requires: String },
    #[error("{path}: conflicts with '{conflicts}'")]
    ConflictsWith { path: AttrPath, conflicts: String },
    #[error("{path}: unknown attribute")]
    UnknownAttribute { path: AttrPath },
    #[error("{path}: computed attribute cannot be set")]
    ComputedAttribute { path: AttrPath },
    #[error("{path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: AttrPath,
        expected: &'static str,
        found: &'static str,
    },
    #[error("{path}: {value} is outside {min}..={max}")]
    OutOfRange {
        path: AttrPath,
        value: i64,
        min: i64,
        max: i64,
    },
    #[error("{path}: '{value}' is not one of [{}]", .allowed.join(", "))]
    NotInEnum {
        path: AttrPath,
        value: String,
        allowed: Vec<String>,
    },
    #[error("{path}: '{value}' is not a valid {format}")]
    PatternMismatch {
        path: AttrPath,
        format: &'static str,
        value: String,
    },
    #[error("unsupported resource type '{name}'")]
    UnsupportedResourceType { name: String },
    #[error("mask overlap on document '{document}': '{field}' is owned by both '{first}' and '{second}'")]
    MaskOverlap {
        document: String,
        field: String,
        first: String,
        second: String,
    },
    #[error("malformed import id: {reason}")]
    MalformedImportId { reason: String },
}

impl ValidationError {
    /// Stable snake_case code, suitable for diagnostics output.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::LocationAmbiguous { .. } => "location_ambiguous",
            ValidationError::LocationUnsupported { .. } => "location_unsupported",
            ValidationError::EmptyName { .. } => "empty_name",
            ValidationError::VariantCardinality { .. } => "variant_cardinality",
            ValidationError::DuplicateEntryName { .. } => "duplicate_entry_name",
            ValidationError::RequiredAttributeMissing { .. } => "required_attribute_missing",
            ValidationError::RequiredWith { .. } => "required_with",
            ValidationError::ConflictsWith { .. } => "conflicts_with",
            ValidationError::UnknownAttribute { .. } => "unknown_attribute",
            ValidationError::ComputedAttribute { .. } => "computed_attribute",
            ValidationError::TypeMismatch { .. } => "type_mismatch",
            ValidationError::OutOfRange { .. } => "out_of_range",
            ValidationError::NotInEnum { .. } => "not_in_enum",
            ValidationError::PatternMismatch { .. } => "pattern_mismatch",
            ValidationError::UnsupportedResourceType { .. } => "unsupported_resource_type",
            ValidationError::MaskOverlap { .. } => "mask_overlap",
            ValidationError::MalformedImportId { .. } => "malformed_import_id",
        }
    }
}

/// Every validation failure found in one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.0.iter()
    }

    /// True when any collected error carries `code`.
    pub fn has(&self, code: &str) -> bool {
        self.0.iter().any(|e| e.code() == code)
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl Display for ValidationErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{joined}")
    }
}

impl std::error::Error for ValidationErrors {}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self(vec![error])
    }
}

impl IntoIterator for ValidationErrors {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Wire data that does not fit the schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("{path}: server returned several variant arms ({})", .tags.join(", "))]
    VariantServerAmbiguous { path: AttrPath, tags: Vec<String> },
    #[error("{path}: unknown field <{tag}>")]
    UnknownField { path: AttrPath, tag: String },
    #[error("{path}: {reason}")]
    SchemaMismatch { path: AttrPath, reason: String },
}

/// Broad error classes, used for retry and reporting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    State,
    Decode,
    Transport,
    Cancellation,
    Configuration,
}

/// Failure of a provider operation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("failed to decode server data: {0}")]
    Decode(#[from] DecodeError),
    #[error("{resource} '{name}' already exists in {scope}; import it to manage it")]
    AlreadyExists {
        resource: String,
        name: String,
        scope: String,
    },
    #[error("{resource} '{name}' not found in {scope}")]
    NotFound {
        resource: String,
        name: String,
        scope: String,
    },
    #[error("pivot entry '{pivot}' is not a foreign entry of the list")]
    PivotMissing { pivot: String },
    #[error("list ordering not satisfied: expected owned order [{}], observed [{}]", .expected.join(", "), .observed.join(", "))]
    OrderingUnsatisfied {
        expected: Vec<String>,
        observed: Vec<String>,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("operation cancelled after {last_step}")]
    Cancelled { last_step: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Validation(_) => ErrorCategory::Validation,
            Error::Decode(_) => ErrorCategory::Decode,
            Error::AlreadyExists { .. }
            | Error::NotFound { .. }
            | Error::PivotMissing { .. }
            | Error::OrderingUnsatisfied { .. } => ErrorCategory::State,
            Error::Transport(_) => ErrorCategory::Transport,
            Error::Cancelled { .. } => ErrorCategory::Cancellation,
            Error::Config(_) => ErrorCategory::Configuration,
        }
    }

    /// Only transient transport failures are worth an orchestrator retry.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::Transport(err) if err.is_transient())
    }

    /// Collected validation failures, empty for other classes.
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            Error::Validation(errors) => &errors.0,
            _ => &[],
        }
    }

    /// True for a validation failure carrying `code`.
    pub fn has_validation(&self, code: &str) -> bool {
        self.validation_errors().iter().any(|e| e.code() == code)
    }
}

impl From<ValidationErrors> for Error {
    fn from(errors: ValidationErrors) -> Self {
        Error::Validation(errors)
    }
}

impl From<ValidationError> for Error {
    fn from(error: ValidationError) -> Self {
        Error::Validation(error.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::{Error, ErrorCategory, ValidationError, ValidationErrors};
    use crate::transport::TransportError;
    use crate::value::AttrPath;

    #[test]
    fn validation_errors_join_messages() {
        let mut errors = ValidationErrors::new();
        errors.push(ValidationError::RequiredAttributeMissing {
            path: AttrPath::attr_root("name"),
        });
        errors.push(ValidationError::DuplicateEntryName {
            path: AttrPath::attr_root("rules").index(1),
            name: "r1".to_string(),
        });

        let err = Error::from(errors);
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert!(err.has_validation("duplicate_entry_name"));
        assert_eq!(
            err.to_string(),
            "validation failed: name: required attribute is missing; rules[1]: duplicate entry name 'r1'"
        );
    }

    #[test]
    fn only_transient_transport_errors_are_retriable() {
        assert!(Error::from(TransportError::timeout("read")).is_retriable());
        assert!(!Error::from(TransportError::rejected(403, "forbidden")).is_retriable());
        assert!(!Error::PivotMissing {
            pivot: "Z".to_string()
        }
        .is_retriable());
    }
}
