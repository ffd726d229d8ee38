use thiserror::Error;

/// Rejection reasons for the token handshake.
///
/// The `Display` text is what callers see, so it must never contain token values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("{0}")]
    MalformedRequest(String),
    #[error("The given session for the user does not exist")]
    InvalidSession,
    #[error("The requestToken parameter is not valid")]
    InvalidToken,
    #[error("The requestToken is not valid anymore")]
    TokenExpired,
    #[error("The access file does not exist")]
    ProofMissing,
    #[error("The user is not the one that created the access file")]
    ProofOwnerMismatch,
    #[error("The access file has expired")]
    ProofExpired,
    #[error("The session token is not valid")]
    ValidationFailed,
    #[error("Internal error, unable to issue a token")]
    Internal,
}

impl GatewayError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest(message.into())
    }

    /// Short, stable identifier used in log lines.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedRequest(_) => "malformed_request",
            Self::InvalidSession => "invalid_session",
            Self::InvalidToken => "invalid_token",
            Self::TokenExpired => "token_expired",
            Self::ProofMissing => "proof_missing",
            Self::ProofOwnerMismatch => "proof_owner_mismatch",
            Self::ProofExpired => "proof_expired",
            Self::ValidationFailed => "validation_failed",
            Self::Internal => "internal",
        }
    }
}
