//! Reusable parameter validators for command implementations.

/// Validates a single resolved parameter value.
pub trait ParamValidator: Send + Sync {
    /// Check `value`.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message when the value is rejected.
    fn validate(&self, value: &str) -> Result<(), String>;
}

/// Accepts values from a fixed set, case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValidator {
    allowed: Vec<String>,
}

impl EnumValidator {
    /// Create a validator over the allowed values.
    #[must_use]
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

impl ParamValidator for EnumValidator {
    fn validate(&self, value: &str) -> Result<(), String> {
        if self
            .allowed
            .iter()
            .any(|a| a.eq_ignore_ascii_case(value))
        {
            return Ok(());
        }
        Err(format!(
            "invalid value '{}', expecting one of: {}",
            value,
            self.allowed.join(", ")
        ))
    }
}
