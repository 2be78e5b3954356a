//! Error types for the bean container

use thiserror::Error;

/// Boxed error used for failures raised by user callbacks (constructors,
/// factory methods, lifecycle hooks, member assignments).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coarse classification of a [`DiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DuplicateDefinition,
    InvalidDefinition,
    CyclicConstruction,
    UnsatisfiedDependency,
    AmbiguousDefinition,
    TypeMismatch,
    CreationFailure,
    NoSuchDefinition,
    MissingProperty,
    PropertyConversion,
    Invocation,
}

/// Errors that can occur while building or querying an application context
#[derive(Error, Debug)]
pub enum DiError {
    /// Two definitions were registered under the same name
    #[error("Duplicate bean name: {name}")]
    DuplicateDefinition { name: String },

    /// A declaration violates a structural rule
    #[error("Invalid definition '{name}': {reason}")]
    InvalidDefinition { name: String, reason: String },

    /// A definition was requested again while its constructor arguments were
    /// still being resolved
    #[error("Found cyclic dependency when creating bean '{name}' (path: {})", .path.join(" -> "))]
    CyclicConstruction { name: String, path: Vec<String> },

    /// A required dependency could not be found
    #[error("Missing dependency {dependency} when creating bean '{bean}'")]
    UnsatisfiedDependency { bean: String, dependency: String },

    /// More than one candidate matched a single-result type lookup
    #[error("Multiple beans with type '{type_name}' found, {reason}")]
    AmbiguousDefinition { type_name: &'static str, reason: String },

    /// A named bean exists but is not assignable to the requested type
    #[error("Bean '{name}' has actual type '{actual}', which is not assignable to '{required}'")]
    TypeMismatch {
        name: String,
        required: &'static str,
        actual: &'static str,
    },

    /// A constructor, factory method or lifecycle callback failed
    #[error("Exception when creating bean '{name}': {source}")]
    CreationFailure {
        name: String,
        #[source]
        source: BoxError,
    },

    /// Lookup on a running context found nothing
    #[error("No bean found {what}")]
    NoSuchDefinition { what: String },

    /// A required property was absent
    #[error("Property '{key}' not found")]
    MissingProperty { key: String },

    /// A property value could not be converted to the requested type
    #[error("Cannot convert property '{key}' to {target}: {reason}")]
    PropertyConversion {
        key: String,
        target: &'static str,
        reason: String,
    },

    /// Proxy plumbing failed while forwarding a method call
    #[error("Invocation of '{method}' failed: {reason}")]
    Invocation { method: String, reason: String },
}

impl DiError {
    /// Kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateDefinition { .. } => ErrorKind::DuplicateDefinition,
            Self::InvalidDefinition { .. } => ErrorKind::InvalidDefinition,
            Self::CyclicConstruction { .. } => ErrorKind::CyclicConstruction,
            Self::UnsatisfiedDependency { .. } => ErrorKind::UnsatisfiedDependency,
            Self::AmbiguousDefinition { .. } => ErrorKind::AmbiguousDefinition,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::CreationFailure { .. } => ErrorKind::CreationFailure,
            Self::NoSuchDefinition { .. } => ErrorKind::NoSuchDefinition,
            Self::MissingProperty { .. } => ErrorKind::MissingProperty,
            Self::PropertyConversion { .. } => ErrorKind::PropertyConversion,
            Self::Invocation { .. } => ErrorKind::Invocation,
        }
    }

    /// Create an InvalidDefinition error
    #[inline]
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a CreationFailure error, keeping the original cause
    #[inline]
    pub fn creation_failed(name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::CreationFailure {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Create an UnsatisfiedDependency error
    #[inline]
    pub fn unsatisfied(bean: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::UnsatisfiedDependency {
            bean: bean.into(),
            dependency: dependency.into(),
        }
    }

    /// Create a NoSuchDefinition error for a bean name
    #[inline]
    pub fn no_such_name(name: &str) -> Self {
        Self::NoSuchDefinition {
            what: format!("with name '{name}'"),
        }
    }

    /// Create a NoSuchDefinition error for a type
    #[inline]
    pub fn no_such_type(type_name: &str) -> Self {
        Self::NoSuchDefinition {
            what: format!("with type '{type_name}'"),
        }
    }

    /// Create an Invocation error
    #[inline]
    pub fn invocation(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invocation {
            method: method.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for container operations
pub type Result<T> = std::result::Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            DiError::invalid("a", "abstract").kind(),
            ErrorKind::InvalidDefinition
        );
        assert_eq!(
            DiError::no_such_name("x").kind(),
            ErrorKind::NoSuchDefinition
        );
        assert_eq!(
            DiError::unsatisfied("a", "b").kind(),
            ErrorKind::UnsatisfiedDependency
        );
    }

    #[test]
    fn test_cycle_message_names_bean_and_path() {
        let err = DiError::CyclicConstruction {
            name: "a".into(),
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'a'"));
        assert!(msg.contains("a -> b -> a"));
    }

    #[test]
    fn test_creation_failure_keeps_source() {
        let cause = std::io::Error::other("disk on fire");
        let err = DiError::creation_failed("repo", cause);
        assert_eq!(err.kind(), ErrorKind::CreationFailure);
        assert_eq!(err.source().unwrap().to_string(), "disk on fire");
    }
}
