// Path: crates/mandate-types/src/error.rs
//! Central error taxonomy for the mandate authorization kernel.
//!
//! Errors are grouped by kind so that callers (and the orchestrator's risk
//! scoring) can pattern-match on the category without inspecting message
//! text. None of these are retried automatically inside a single
//! authorization; upstream errors bubble up as [`MandateError::Upstream`].

use thiserror::Error;

/// Machine-readable reason code attached to a denial or a constraint
/// violation. Kept as a `String` newtype (rather than a closed enum) because
/// policies can mint their own codes, but the kernel itself only ever
/// produces the codes documented on [`MandateError`] variants.
pub type ReasonCode = String;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid DID: {0}")]
    InvalidDid(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("invalid token format: {0}")]
    InvalidTokenFormat(String),
    #[error("invalid policy rule: {0}")]
    InvalidPolicyRule(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("agent not found: {0}")]
    AgentNotFound(String),
    #[error("token not found: {0}")]
    TokenNotFound(String),
    #[error("policy not found: {0}")]
    PolicyNotFound(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("agent is frozen: {0}")]
    AgentFrozen(String),
    #[error("organization is under a global freeze")]
    GlobalFreeze,
    #[error("token revoked: {0}")]
    TokenRevoked(String),
    #[error("token expired: {0}")]
    TokenExpired(String),
    #[error("optimistic concurrency conflict: {0}")]
    VersionConflict(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConstraintError {
    #[error("amount {amount} exceeds cap {cap}")]
    AmountExceedsCap { amount: String, cap: String },
    #[error("merchant is blocked: {0}")]
    MerchantBlocked(String),
    #[error("currency not allowed: {0}")]
    CurrencyNotAllowed(String),
    #[error("delegation chain is broken: {0}")]
    ChainBroken(String),
    #[error("delegation depth exceeded: {depth} > {max}")]
    DepthExceeded { depth: u32, max: u32 },
    #[error("outside permitted hours")]
    OutsideHours,
    #[error("category not allowed: {0}")]
    CategoryBlocked(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecurityError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("nonce replay detected")]
    NonceReplay,
    #[error("signing key disabled")]
    KeyDisabled,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("rate limit exceeded")]
    RateLimit,
    #[error("anomalous behavior detected")]
    Anomalous,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),
    #[error("event bus unavailable: {0}")]
    EventBusUnavailable(String),
    #[error("semantic evaluator timed out")]
    SemanticEvaluatorTimeout,
    #[error("semantic evaluator error: {0}")]
    SemanticEvaluatorError(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FatalError {
    #[error("key store not initialized")]
    KeyStoreNotInitialized,
    #[error("audit chain corrupt at sequence {0}")]
    AuditChainCorrupt(u64),
    /// Canonical serialization of a signable payload failed; only possible
    /// for non-finite floats, so this should never trigger on validated
    /// input, but `to_signing_bytes` stays a `Result` rather than panicking.
    #[error("serialization failure: {0}")]
    SerializationFailure(String),
}

/// Failure modes of the key store (§4.1). Kept as its own enum, separate
/// from [`SecurityError`] and [`FatalError`], because `mandate-crypto` has
/// no dependency on the rest of the error taxonomy and only needs this
/// slice of it; [`MandateError`] absorbs it at the boundary via `From`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("key not found: {0}")]
    KeyNotFound(String),
    #[error("key disabled: {0}")]
    KeyDisabled(String),
    #[error("seal operation failed: {0}")]
    SealFailure(String),
    #[error("signature verification failed")]
    VerifyFailure,
    #[error("key store not initialized")]
    NotInitialized,
    /// Malformed key or signature bytes at the primitive level, below the
    /// `KeyStore` capability boundary (e.g. wrong-length seed on decode).
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
}

impl From<CryptoError> for MandateError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::KeyNotFound(id) => MandateError::NotFound(NotFoundError::TokenNotFound(id)),
            CryptoError::KeyDisabled(_) => MandateError::Security(SecurityError::KeyDisabled),
            CryptoError::VerifyFailure => MandateError::Security(SecurityError::InvalidSignature),
            CryptoError::SealFailure(_) | CryptoError::NotInitialized => {
                MandateError::Fatal(FatalError::KeyStoreNotInitialized)
            }
            CryptoError::InvalidKeyMaterial(msg) => {
                MandateError::Validation(ValidationError::InvalidTokenFormat(msg))
            }
        }
    }
}

/// The top-level sum type every public kernel operation returns.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MandateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Constraint(#[from] ConstraintError),
    #[error(transparent)]
    Security(#[from] SecurityError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl MandateError {
    /// A stable, machine-readable reason code for audit entries and
    /// decision responses. Falls back to `SYSTEM_ERROR` for anything that
    /// is not an explicitly catalogued soft denial, matching the
    /// propagation policy: any upstream or fatal error that reaches the
    /// orchestrator is recorded as a system-level denial.
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            MandateError::Validation(e) => match e {
                ValidationError::InvalidDid(_) => "INVALID_DID",
                ValidationError::InvalidAmount(_) => "INVALID_AMOUNT",
                ValidationError::InvalidTokenFormat(_) => "INVALID_TOKEN_FORMAT",
                ValidationError::InvalidPolicyRule(_) => "INVALID_POLICY_RULE",
            },
            MandateError::NotFound(e) => match e {
                NotFoundError::AgentNotFound(_) => "AGENT_NOT_FOUND",
                NotFoundError::TokenNotFound(_) => "TOKEN_NOT_FOUND",
                NotFoundError::PolicyNotFound(_) => "POLICY_NOT_FOUND",
            },
            MandateError::State(e) => match e {
                StateError::AgentFrozen(_) => "AGENT_FROZEN",
                StateError::GlobalFreeze => "GLOBAL_FREEZE",
                StateError::TokenRevoked(_) => "TOKEN_REVOKED",
                StateError::TokenExpired(_) => "TOKEN_EXPIRED",
                StateError::VersionConflict(_) => "VERSION_CONFLICT",
            },
            MandateError::Constraint(e) => match e {
                ConstraintError::AmountExceedsCap { .. } => "AMOUNT_EXCEEDS_CAP",
                ConstraintError::MerchantBlocked(_) => "MERCHANT_BLOCKED",
                ConstraintError::CurrencyNotAllowed(_) => "CURRENCY_NOT_ALLOWED",
                ConstraintError::ChainBroken(_) => "CHAIN_BROKEN",
                ConstraintError::DepthExceeded { .. } => "DEPTH_EXCEEDED",
                ConstraintError::OutsideHours => "OUTSIDE_HOURS",
                ConstraintError::CategoryBlocked(_) => "CATEGORY_BLOCKED",
            },
            MandateError::Security(e) => match e {
                SecurityError::InvalidSignature => "INVALID_SIGNATURE",
                SecurityError::NonceReplay => "NONCE_REPLAY",
                SecurityError::KeyDisabled => "KEY_DISABLED",
            },
            MandateError::Resource(e) => match e {
                ResourceError::RateLimit => "RATE_LIMIT",
                ResourceError::Anomalous => "ANOMALOUS_BEHAVIOR",
            },
            MandateError::Upstream(_) | MandateError::Fatal(_) => "SYSTEM_ERROR",
        }
        .to_string()
    }

    /// Whether this error represents an authorization-layer denial (as
    /// opposed to a system fault). Denials are recorded as `DENY`/`FROZEN`
    /// decisions; faults are recorded as `SYSTEM_ERROR` and surfaced to the
    /// caller as a distinguishable error.
    pub fn is_soft_denial(&self) -> bool {
        matches!(
            self,
            MandateError::State(_) | MandateError::Constraint(_) | MandateError::Resource(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MandateError>;
