//! Template error types.

use thiserror::Error;

/// Errors raised while loading templates or binding arguments to them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// Malformed workflow specification or template document.
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    /// The specification references a parameter that is not declared.
    #[error("Reference to undefined parameter '{0}'")]
    UnknownParameter(String),

    /// A parameter declaration failed schema validation.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A required parameter has neither an argument nor a default value.
    #[error("Missing argument for '{0}'")]
    MissingArgument(String),

    /// An argument does not match its parameter declaration.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<serde_json::Error> for TemplateError {
    fn from(e: serde_json::Error) -> Self {
        TemplateError::InvalidTemplate(e.to_string())
    }
}

impl From<serde_yaml::Error> for TemplateError {
    fn from(e: serde_yaml::Error) -> Self {
        TemplateError::InvalidTemplate(e.to_string())
    }
}

/// Result type alias using TemplateError.
pub type TemplateResult<T> = Result<T, TemplateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TemplateError::MissingArgument("names".to_string());
        assert_eq!(err.to_string(), "Missing argument for 'names'");

        let err = TemplateError::UnknownParameter("x".to_string());
        assert_eq!(err.to_string(), "Reference to undefined parameter 'x'");
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: TemplateError = json_err.into();
        assert!(matches!(err, TemplateError::InvalidTemplate(_)));
    }
}
