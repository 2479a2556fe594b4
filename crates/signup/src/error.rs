//! Signup workflow error types.
//!
//! Every failure a caller can observe from [`SignupService`] is a
//! [`SignupError`] variant. The helpers [`SignupError::is_retryable`] and
//! [`SignupError::requires_new_signup`] let a transport layer tell
//! "try again" apart from "start over" without matching every variant.
//!
//! [`SignupService`]: crate::SignupService

use std::time::Duration;

use easyprep_storage::{ContactAddressError, StorageError};
use thiserror::Error;

use crate::{materializer::AccountError, notify::NotifyError};

/// Errors returned by the signup, verify and resend operations.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`; new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SignupError {
    /// The contact address could not be normalized into a valid address.
    #[error("Invalid contact address: {0}")]
    InvalidContactAddress(#[source] ContactAddressError),

    /// A required profile field is missing or malformed.
    #[error("Invalid profile: {field}: {reason}")]
    InvalidProfile {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// An account already uses this contact address.
    #[error("Contact address already registered")]
    DuplicateContactAddress,

    /// No pending signup exists for the id: never issued, already verified,
    /// expired and removed, or swept.
    #[error("Unknown or expired signup session")]
    UnknownOrExpiredSession,

    /// The code's validity window has passed. The pending signup is gone.
    #[error("Verification code expired")]
    CodeExpired,

    /// The submitted code does not match. The pending signup is kept.
    #[error("Verification code mismatch")]
    CodeMismatch,

    /// Too many wrong codes were submitted. The pending signup is gone.
    #[error("Too many failed verification attempts")]
    TooManyAttempts,

    /// A resend was requested before the cooldown elapsed.
    #[error("Resend not allowed yet, retry after {}s", .retry_after.as_secs())]
    ResendCooldown {
        /// Time remaining until a resend is accepted.
        retry_after: Duration,
    },

    /// The code matched but the account could not be created. The pending
    /// signup is kept so the same code can be resubmitted.
    #[error("Account creation failed: {0}")]
    MaterializationFailed(#[source] AccountError),

    /// The account directory could not answer whether the contact address
    /// is taken. Nothing was stored.
    #[error("Account lookup failed: {0}")]
    AccountLookupFailed(#[source] AccountError),

    /// The code could not be delivered to the contact address.
    #[error("Code delivery failed: {0}")]
    NotificationFailed(#[source] NotifyError),

    /// The pending-signup store failed.
    #[error("Pending signup storage error: {0}")]
    Storage(#[source] StorageError),
}

impl SignupError {
    /// Creates an [`InvalidProfile`](Self::InvalidProfile) error.
    #[must_use]
    pub fn invalid_profile(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidProfile { field, reason: reason.into() }
    }

    /// Whether the same request (or a resend) may succeed without starting a
    /// new signup.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CodeMismatch
            | Self::MaterializationFailed(_)
            | Self::AccountLookupFailed(_)
            | Self::ResendCooldown { .. }
            | Self::NotificationFailed(_) => true,
            Self::Storage(err) => err.is_transient(),
            _ => false,
        }
    }

    /// Whether the pending signup is gone and the user must sign up again.
    #[must_use]
    pub fn requires_new_signup(&self) -> bool {
        matches!(self, Self::CodeExpired | Self::UnknownOrExpiredSession | Self::TooManyAttempts)
    }
}

impl From<StorageError> for SignupError {
    fn from(err: StorageError) -> Self {
        SignupError::Storage(err)
    }
}

impl From<ContactAddressError> for SignupError {
    fn from(err: ContactAddressError) -> Self {
        SignupError::InvalidContactAddress(err)
    }
}

/// Result type alias for signup operations.
pub type Result<T> = std::result::Result<T, SignupError>;
