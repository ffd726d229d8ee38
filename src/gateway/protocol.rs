//! The three-step token handshake.
//!
//! State for a token lives in whichever store currently holds it:
//!
//! ```text
//! (none) --requestToken--> request store --sessionToken--> session store --validate--> (consumed)
//! ```
//!
//! Every lookup removes the token, so each transition can happen at most once
//! per token, including failed ones.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    sync::{Arc, LazyLock},
    time::{Duration, Instant},
};
use tracing::{error, info, instrument};
use utoipa::ToSchema;

use super::{
    error::GatewayError,
    oracle::{RetryPolicy, SessionOracle, verify_session},
    proof::ProofDirectory,
    store::{RequestTokenRecord, SessionTokenRecord, TokenStore},
    token::{TOKEN_LENGTH, derive_proof_name, generate_token, is_token},
};

const DEFAULT_REQUEST_TOKEN_CAPACITY: usize = 500;
const DEFAULT_SESSION_TOKEN_CAPACITY: usize = 100;
const DEFAULT_REQUEST_TOKEN_TTL_SECONDS: u64 = 10;
const DEFAULT_SESSION_TOKEN_TTL_SECONDS: u64 = 30;

// `None` if the pattern fails to compile; every value is then rejected.
static USER_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z_]([a-z0-9_-]{0,31}|[a-z0-9_-]{0,30}\$)$").ok());
static SESSION_ID_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{1,128}$").ok());

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    request_token_capacity: usize,
    session_token_capacity: usize,
    request_token_ttl: Duration,
    session_token_ttl: Duration,
    retry: RetryPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_token_capacity: DEFAULT_REQUEST_TOKEN_CAPACITY,
            session_token_capacity: DEFAULT_SESSION_TOKEN_CAPACITY,
            request_token_ttl: Duration::from_secs(DEFAULT_REQUEST_TOKEN_TTL_SECONDS),
            session_token_ttl: Duration::from_secs(DEFAULT_SESSION_TOKEN_TTL_SECONDS),
            retry: RetryPolicy::default(),
        }
    }
}

impl GatewayConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_request_token_capacity(mut self, capacity: usize) -> Self {
        self.request_token_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_session_token_capacity(mut self, capacity: usize) -> Self {
        self.session_token_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_request_token_ttl(mut self, ttl: Duration) -> Self {
        self.request_token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_session_token_ttl(mut self, ttl: Duration) -> Self {
        self.session_token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn request_token_capacity(&self) -> usize {
        self.request_token_capacity
    }

    #[must_use]
    pub fn session_token_capacity(&self) -> usize {
        self.session_token_capacity
    }

    #[must_use]
    pub fn request_token_ttl(&self) -> Duration {
        self.request_token_ttl
    }

    #[must_use]
    pub fn session_token_ttl(&self) -> Duration {
        self.session_token_ttl
    }

    #[must_use]
    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestTokenGrant {
    pub request_token: String,
    /// Name of the file the caller must create in the authorization directory.
    pub access_file: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokenGrant {
    pub session_token: String,
}

/// Token issuance and validation, shared by every request handler.
pub struct Gateway {
    config: GatewayConfig,
    request_tokens: TokenStore<RequestTokenRecord>,
    session_tokens: TokenStore<SessionTokenRecord>,
    oracle: Arc<dyn SessionOracle>,
    proofs: ProofDirectory,
}

impl Gateway {
    #[must_use]
    pub fn new(config: GatewayConfig, oracle: Arc<dyn SessionOracle>, proofs: ProofDirectory) -> Self {
        Self {
            request_tokens: TokenStore::new(config.request_token_capacity()),
            session_tokens: TokenStore::new(config.session_token_capacity()),
            config,
            oracle,
            proofs,
        }
    }

    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    #[must_use]
    pub fn proofs(&self) -> &ProofDirectory {
        &self.proofs
    }

    /// Step 1: issue a request token for `(user, session_id)`.
    ///
    /// # Errors
    /// [`GatewayError::MalformedRequest`] for invalid parameters,
    /// [`GatewayError::InvalidSession`] if no session agent runs for the user.
    #[instrument(skip(self))]
    pub async fn issue_request_token(
        &self,
        user: &str,
        session_id: &str,
    ) -> Result<RequestTokenGrant, GatewayError> {
        validate_param(user, &USER_PATTERN, "authUser")?;
        validate_param(session_id, &SESSION_ID_PATTERN, "sessionID")?;

        verify_session(&self.oracle, self.config.retry(), user, session_id).await?;

        let request_token = new_token()?;
        let access_file = derive_proof_name(&request_token).map_err(|err| {
            error!("Failed to derive access file name: {err:#}");
            GatewayError::Internal
        })?;

        self.request_tokens
            .add(
                request_token.clone(),
                RequestTokenRecord {
                    user: user.to_string(),
                    session_id: session_id.to_string(),
                    created_at: Instant::now(),
                    proof_name: access_file.clone(),
                },
            )
            .await;

        info!("Request token issued");
        Ok(RequestTokenGrant {
            request_token,
            access_file,
        })
    }

    /// Step 2: exchange a request token and its access file for a session token.
    ///
    /// # Errors
    /// [`GatewayError::InvalidToken`] / [`GatewayError::TokenExpired`] for an unknown
    /// or stale request token, the proof errors from [`ProofDirectory::verify`], and
    /// [`GatewayError::InvalidSession`] if the session ended in the meantime.
    #[instrument(skip_all)]
    pub async fn issue_session_token(
        &self,
        request_token: &str,
    ) -> Result<SessionTokenGrant, GatewayError> {
        validate_token(request_token, "requestToken")?;

        let record = self
            .request_tokens
            .take(request_token)
            .await
            .ok_or(GatewayError::InvalidToken)?;

        if record.created_at.elapsed() > self.config.request_token_ttl() {
            return Err(GatewayError::TokenExpired);
        }

        self.proofs
            .verify(
                &record.user,
                &record.proof_name,
                self.config.request_token_ttl(),
            )
            .await?;

        verify_session(
            &self.oracle,
            self.config.retry(),
            &record.user,
            &record.session_id,
        )
        .await?;

        let session_token = new_token()?;
        self.session_tokens
            .add(
                session_token.clone(),
                SessionTokenRecord {
                    user: record.user,
                    session_id: record.session_id,
                    created_at: Instant::now(),
                },
            )
            .await;

        info!("Session token issued");
        Ok(SessionTokenGrant { session_token })
    }

    /// Step 3: validate a session token presented by the session server.
    ///
    /// Returns the user owning the token. The token is burned whatever the
    /// outcome.
    ///
    /// # Errors
    /// [`GatewayError::MalformedRequest`] for invalid parameters,
    /// [`GatewayError::ValidationFailed`] for an unknown, stale or mismatched token.
    #[instrument(skip(self, session_token))]
    pub async fn validate_session_token(
        &self,
        session_id: &str,
        session_token: &str,
    ) -> Result<String, GatewayError> {
        validate_param(session_id, &SESSION_ID_PATTERN, "sessionId")?;
        validate_token(session_token, "authenticationToken")?;

        let record = self
            .session_tokens
            .take(session_token)
            .await
            .ok_or(GatewayError::ValidationFailed)?;

        if record.session_id != session_id
            || record.created_at.elapsed() > self.config.session_token_ttl()
        {
            return Err(GatewayError::ValidationFailed);
        }

        info!(user = %record.user, "Session token accepted");
        Ok(record.user)
    }
}

fn new_token() -> Result<String, GatewayError> {
    generate_token(TOKEN_LENGTH).map_err(|err| {
        error!("Failed to generate token: {err:#}");
        GatewayError::Internal
    })
}

fn validate_param(value: &str, pattern: &Option<Regex>, name: &str) -> Result<(), GatewayError> {
    if pattern.as_ref().is_some_and(|regex| regex.is_match(value)) {
        Ok(())
    } else {
        Err(GatewayError::malformed(format!(
            "The {name} parameter is not valid"
        )))
    }
}

fn validate_token(value: &str, name: &str) -> Result<(), GatewayError> {
    if is_token(value) {
        Ok(())
    } else {
        Err(GatewayError::malformed(format!(
            "The {name} parameter is not valid"
        )))
    }
}
