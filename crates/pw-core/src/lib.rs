//! Shared primitives used across PageWeave crates.

use core::fmt;

/// Result alias used across the workspace.
pub type WeaveResult<T> = Result<T, WeaveError>;

/// Top-level error type for internal and network-path failures.
///
/// Public reconstruction entry points degrade silently instead of surfacing
/// this type; it travels only across internal seams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeaveError {
    pub code: &'static str,
    pub message: String,
}

impl WeaveError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for WeaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for WeaveError {}
