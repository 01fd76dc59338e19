//! Configuration validation traits and utilities

use crate::error::{ConfigError, ConfigResult};
use std::collections::HashSet;
use std::time::Duration;

/// Trait for validatable configuration
pub trait Validatable {
    /// Validate the configuration
    fn validate(&self) -> ConfigResult<()>;

    /// Get the domain name for error reporting
    fn domain_name(&self) -> &'static str;

    /// Helper to create a domain-specific validation error
    fn validation_error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::DomainError {
            domain: self.domain_name().to_string(),
            message: message.into(),
        }
    }
}

/// Validate a required string field
pub fn validate_required_string(value: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} cannot be empty", field_name),
        });
    }
    Ok(())
}

/// Validate a positive number
pub fn validate_positive<T>(value: T, field_name: &str, domain: &str) -> ConfigResult<()>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value <= T::default() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} must be greater than 0, got {}", field_name, value),
        });
    }
    Ok(())
}

/// Validate a non-zero duration
pub fn validate_positive_duration(value: Duration, field_name: &str, domain: &str) -> ConfigResult<()> {
    if value.is_zero() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} must be greater than 0", field_name),
        });
    }
    Ok(())
}

/// Validate a URL
pub fn validate_url(url: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} cannot be empty", field_name),
        });
    }

    let parsed = url::Url::parse(url).map_err(|e| ConfigError::DomainError {
        domain: domain.to_string(),
        message: format!("{} has invalid URL format: {}", field_name, e),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} scheme '{}' not supported (only http/https)", field_name, scheme),
        }),
    }
}

/// Validate an enum choice
pub fn validate_enum_choice<T>(value: &str, valid_choices: &[T], field_name: &str, domain: &str) -> ConfigResult<()>
where
    T: AsRef<str>,
{
    let valid: Vec<&str> = valid_choices.iter().map(|c| c.as_ref()).collect();

    if !valid.iter().any(|&v| v.eq_ignore_ascii_case(value)) {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!(
                "{} has invalid value '{}'. Valid choices: {}",
                field_name,
                value,
                valid.join(", ")
            ),
        });
    }

    Ok(())
}

/// Validate that every name in the iterator is unique
pub fn validate_unique_names<'a>(
    names: impl IntoIterator<Item = &'a str>,
    field_name: &str,
    domain: &str,
) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ConfigError::DomainError {
                domain: domain.to_string(),
                message: format!("duplicate {} '{}'", field_name, name),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_required_string() {
        assert!(validate_required_string("value", "field", "test").is_ok());
        assert!(validate_required_string("", "field", "test").is_err());
        assert!(validate_required_string("   ", "field", "test").is_err());
    }

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive(1, "field", "test").is_ok());
        assert!(validate_positive(0, "field", "test").is_err());
        assert!(validate_positive(0.5, "field", "test").is_ok());
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com", "url", "test").is_ok());
        assert!(validate_url("http://localhost:8080/api", "url", "test").is_ok());
        assert!(validate_url("", "url", "test").is_err());
        assert!(validate_url("not-a-url", "url", "test").is_err());
        assert!(validate_url("ftp://example.com", "url", "test").is_err());
    }

    #[test]
    fn test_validate_enum_choice() {
        let choices = ["GET", "POST"];
        assert!(validate_enum_choice("get", &choices, "method", "test").is_ok());
        assert!(validate_enum_choice("TRACE", &choices, "method", "test").is_err());
    }

    #[test]
    fn test_validate_unique_names() {
        assert!(validate_unique_names(["a", "b"], "scenario", "test").is_ok());
        let err = validate_unique_names(["a", "b", "a"], "scenario", "test").unwrap_err();
        assert!(err.to_string().contains("duplicate scenario 'a'"));
    }
}
