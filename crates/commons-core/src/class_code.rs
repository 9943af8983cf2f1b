//! Class code normalisation shared by the admin surface and student joins.

use thiserror::Error;

/// Maximum number of characters accepted in a class code.
pub const CLASS_CODE_MAX_CHARS: usize = 32;

/// Reasons a class code is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassCodeError {
    #[error("class code must not be empty")]
    Empty,
    #[error("class code exceeds {CLASS_CODE_MAX_CHARS} characters")]
    TooLong,
    #[error("class code contains unsupported character '{0}'")]
    UnsupportedCharacter(char),
}

/// Trims and uppercases `raw`, accepting ASCII letters, digits, `-` and `_`.
pub fn normalize_class_code(raw: &str) -> Result<String, ClassCodeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ClassCodeError::Empty);
    }
    if trimmed.chars().count() > CLASS_CODE_MAX_CHARS {
        return Err(ClassCodeError::TooLong);
    }
    if let Some(invalid) = trimmed
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_'))
    {
        return Err(ClassCodeError::UnsupportedCharacter(invalid));
    }
    Ok(trimmed.to_ascii_uppercase())
}
