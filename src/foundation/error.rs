/// Convenience result type used across panelforge.
pub type ForgeResult<T> = Result<T, ForgeError>;

/// Top-level error taxonomy used by compositor, assembler and feedback-loop APIs.
#[derive(thiserror::Error, Debug)]
pub enum ForgeError {
    /// Malformed request or configuration. Raised before any external call and never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// No pixel survived key removal; the upstream render had no discernible subject.
    #[error("empty subject: {0}")]
    EmptySubject(String),

    /// The subject touches every image edge and was most likely cut off by the frame.
    #[error("clipped subject: {0}")]
    ClippedSubject(String),

    /// Timeout, rate limit or network failure that outlived the local retry budget.
    #[error("transient capability error after {attempts} attempt(s) ({capability}): {message}")]
    TransientCapability {
        /// Which external capability failed (`generator` or `critic`).
        capability: &'static str,
        /// Number of attempts made for the failing step.
        attempts: u32,
        /// Last reported failure.
        message: String,
    },

    /// Content-policy rejection from an external capability. Aborts the panel attempt.
    #[error("policy violation ({capability}): {message}")]
    PolicyViolation {
        /// Which external capability refused.
        capability: &'static str,
        /// Refusal message as reported.
        message: String,
    },

    /// Non-retryable capability failure (malformed reply, missing image, ...).
    #[error("capability error ({capability}): {message}")]
    Capability {
        /// Which external capability failed.
        capability: &'static str,
        /// Failure description.
        message: String,
    },

    /// The session observed a cancellation request before any iteration completed.
    #[error("panel session cancelled")]
    Cancelled,

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ForgeError {
    /// Build a [`ForgeError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`ForgeError::EmptySubject`] value.
    pub fn empty_subject(msg: impl Into<String>) -> Self {
        Self::EmptySubject(msg.into())
    }

    /// Build a [`ForgeError::ClippedSubject`] value.
    pub fn clipped_subject(msg: impl Into<String>) -> Self {
        Self::ClippedSubject(msg.into())
    }

    /// Build a [`ForgeError::PolicyViolation`] value.
    pub fn policy_violation(capability: &'static str, msg: impl Into<String>) -> Self {
        Self::PolicyViolation {
            capability,
            message: msg.into(),
        }
    }

    /// Build a [`ForgeError::Capability`] value.
    pub fn capability(capability: &'static str, msg: impl Into<String>) -> Self {
        Self::Capability {
            capability,
            message: msg.into(),
        }
    }

    /// Build a [`ForgeError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// True when the error concerns one character render and asks for that render to be redone.
    pub fn is_retryable_subject(&self) -> bool {
        matches!(self, Self::EmptySubject(_) | Self::ClippedSubject(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
