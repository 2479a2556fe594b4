//! Pending-signup record and the registration profile it carries.
//!
//! # Lifecycle
//!
//! ```text
//! signup ──► ┌──────────────────────┐ ──verify ok──► removed (account created)
//!            │ Pending(code, expiry)│ ──expired────► removed
//!  resend ──►│                      │ ──swept──────► removed
//!  (new code)└──────────────────────┘ ──mismatch───► stays pending
//! ```
//!
//! A record is created once, mutated only by resend (and the optional
//! failed-attempt counter), and removed exactly once.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::types::{ContactAddress, OtpCode, TemporaryId};

/// Role classification chosen at registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A student preparing for placements.
    Student,
    /// A placement coordinator managing company postings.
    #[serde(alias = "staff")]
    Coordinator,
    /// A platform administrator.
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Student => write!(f, "student"),
            Self::Coordinator => write!(f, "coordinator"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// Registration attributes captured at signup.
///
/// Opaque to the verification workflow: the whole value is handed verbatim
/// to the account materializer once the code is confirmed.
///
/// # Example
///
/// ```
/// use easyprep_storage::{ContactAddress, ProfileFields, Role};
///
/// let profile = ProfileFields::builder()
///     .contact_address(ContactAddress::parse("a@x.com").unwrap())
///     .name("Asha Rao")
///     .identifier("21CS042")
///     .role(Role::Student)
///     .department("CSE")
///     .credential_hash("$argon2id$v=19$...")
///     .build();
///
/// assert_eq!(profile.role, Role::Student);
/// assert!(!format!("{profile:?}").contains("argon2id"));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct ProfileFields {
    /// Where the verification code is sent; unique across accounts.
    pub contact_address: ContactAddress,

    /// Display name.
    #[builder(into)]
    pub name: String,

    /// Login identifier chosen by the user (e.g. roll number or username).
    #[builder(into)]
    pub identifier: String,

    /// Role classification.
    pub role: Role,

    /// Organizational unit (department), when the role has one.
    #[builder(into)]
    pub department: Option<String>,

    /// Pre-hashed credential. Never logged.
    #[builder(with = |hash: impl Into<String>| Zeroizing::new(hash.into()))]
    pub credential_hash: Zeroizing<String>,

    /// Additional attributes passed through untouched.
    #[serde(default)]
    #[builder(default)]
    pub attributes: BTreeMap<String, String>,
}

impl fmt::Debug for ProfileFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileFields")
            .field("contact_address", &self.contact_address)
            .field("name", &self.name)
            .field("identifier", &self.identifier)
            .field("role", &self.role)
            .field("department", &self.department)
            .field("credential_hash", &"<redacted>")
            .field("attributes", &self.attributes)
            .finish()
    }
}

/// An unconfirmed registration awaiting its verification code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSignup {
    /// Store key.
    pub temporary_id: TemporaryId,
    /// Registration payload for the materializer.
    pub profile: ProfileFields,
    /// The only code currently accepted.
    pub code: OtpCode,
    /// When `code` was issued.
    pub code_issued_at: DateTime<Utc>,
    /// After this instant `code` is rejected as expired.
    pub code_expires_at: DateTime<Utc>,
    /// Creation time; drives stale-record sweeping only.
    pub created_at: DateTime<Utc>,
    /// Time of the last resend, if any.
    #[serde(default)]
    pub last_resend_at: Option<DateTime<Utc>>,
    /// Wrong codes submitted against the current code.
    #[serde(default)]
    pub failed_attempts: u32,
}

impl PendingSignup {
    /// Creates a record whose first code is issued at `now`.
    #[must_use]
    pub fn new(
        temporary_id: TemporaryId,
        profile: ProfileFields,
        code: OtpCode,
        now: DateTime<Utc>,
        validity: TimeDelta,
    ) -> Self {
        Self {
            temporary_id,
            profile,
            code,
            code_issued_at: now,
            code_expires_at: expiry_after(now, validity),
            created_at: now,
            last_resend_at: None,
            failed_attempts: 0,
        }
    }

    /// The destination the code was sent to.
    #[must_use]
    pub fn contact_address(&self) -> &ContactAddress {
        &self.profile.contact_address
    }

    /// Whether the current code is past its validity window.
    #[must_use]
    pub fn is_code_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.code_expires_at
    }

    /// Whether the record was created more than `horizon` before `now`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, horizon: TimeDelta) -> bool {
        now.signed_duration_since(self.created_at) > horizon
    }

    /// Replaces the code, invalidating the previous one immediately.
    ///
    /// Resets the validity window and the failed-attempt counter and stamps
    /// `last_resend_at`. `created_at` is left alone, so resending never
    /// extends the sweep horizon.
    pub fn reissue(&mut self, code: OtpCode, now: DateTime<Utc>, validity: TimeDelta) {
        self.code = code;
        self.code_issued_at = now;
        self.code_expires_at = expiry_after(now, validity);
        self.last_resend_at = Some(now);
        self.failed_attempts = 0;
    }
}

fn expiry_after(now: DateTime<Utc>, validity: TimeDelta) -> DateTime<Utc> {
    now.checked_add_signed(validity).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
