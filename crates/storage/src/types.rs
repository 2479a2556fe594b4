//! Identifier and value types shared by the store and the signup workflow.

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

/// Number of digits in a verification code.
pub const OTP_LENGTH: usize = 6;

/// Exclusive upper bound of the numeric code space (`10^OTP_LENGTH`).
pub const OTP_SPACE: u32 = 1_000_000;

/// Random bytes backing a [`TemporaryId`].
const TEMPORARY_ID_BYTES: usize = 16;

/// Maximum length of a contact address (RFC 5321 path limit).
const MAX_CONTACT_ADDRESS_LEN: usize = 254;

/// Opaque token identifying an unconfirmed registration.
///
/// Generated from 128 random bits, encoded as base64url without padding.
/// Callers treat it as an opaque string.
///
/// # Examples
///
/// ```
/// use easyprep_storage::TemporaryId;
///
/// let a = TemporaryId::generate();
/// let b = TemporaryId::generate();
/// assert_ne!(a, b);
/// assert_eq!(a.as_str().len(), 22);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemporaryId(String);

impl TemporaryId {
    /// Generates a fresh identifier from the thread-local CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; TEMPORARY_ID_BYTES];
        rand::rng().fill(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TemporaryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TemporaryId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for TemporaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable account identifier assigned by the account materializer.
///
/// # Examples
///
/// ```
/// use easyprep_storage::AccountId;
///
/// let id = AccountId::from(42);
/// assert_eq!(i64::from(id), 42);
/// assert_eq!(id.to_string(), "42");
/// ```
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl From<i64> for AccountId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<AccountId> for i64 {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reasons a raw contact address is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ContactAddressError {
    /// Nothing left after trimming.
    #[error("Contact address cannot be blank")]
    Blank,

    /// Longer than the transport allows.
    #[error("Contact address exceeds {MAX_CONTACT_ADDRESS_LEN} characters")]
    TooLong,

    /// Not of the form `local@domain.tld`.
    #[error("Contact address is malformed: {0}")]
    Malformed(String),
}

/// Normalized destination for verification codes (an email address).
///
/// Normalization trims surrounding whitespace and lower-cases the address,
/// so `" A@X.com "` and `"a@x.com"` are the same contact.
///
/// # Examples
///
/// ```
/// use easyprep_storage::ContactAddress;
///
/// let addr = ContactAddress::parse("  Student@College.EDU ").unwrap();
/// assert_eq!(addr.as_str(), "student@college.edu");
/// assert!(ContactAddress::parse("no-at-sign").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContactAddress(String);

impl ContactAddress {
    /// Normalizes and validates a raw address.
    ///
    /// # Errors
    ///
    /// Returns [`ContactAddressError`] if the address is blank, too long, or
    /// not shaped like `local@domain.tld`.
    pub fn parse(raw: &str) -> Result<Self, ContactAddressError> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(ContactAddressError::Blank);
        }
        if normalized.len() > MAX_CONTACT_ADDRESS_LEN {
            return Err(ContactAddressError::TooLong);
        }
        if normalized.chars().any(char::is_whitespace) {
            return Err(ContactAddressError::Malformed(normalized));
        }

        let Some((local, domain)) = normalized.split_once('@') else {
            return Err(ContactAddressError::Malformed(normalized.clone()));
        };
        let domain_ok = domain.contains('.')
            && !domain.contains('@')
            && !domain.starts_with('.')
            && !domain.ends_with('.');
        if local.is_empty() || !domain_ok {
            return Err(ContactAddressError::Malformed(normalized.clone()));
        }

        Ok(Self(normalized))
    }

    /// Returns the normalized address.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContactAddress {
    type Error = ContactAddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContactAddress> for String {
    fn from(value: ContactAddress) -> Self {
        value.0
    }
}

impl fmt::Display for ContactAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A verification code: exactly [`OTP_LENGTH`] ASCII digits.
///
/// The digits are zeroed on drop and never printed by `Debug`.
///
/// # Examples
///
/// ```
/// use easyprep_storage::OtpCode;
///
/// let code = OtpCode::from_number(42);
/// assert_eq!(code.as_str(), "000042");
/// assert!(code.matches(" 000042\n"));
/// assert!(!code.matches("42"));
/// assert_eq!(format!("{code:?}"), "OtpCode(******)");
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OtpCode(Zeroizing<String>);

impl OtpCode {
    /// Builds a code from a number, reducing it into the code space and
    /// left-padding with zeros.
    #[must_use]
    pub fn from_number(value: u32) -> Self {
        Self(Zeroizing::new(format!("{:0width$}", value % OTP_SPACE, width = OTP_LENGTH)))
    }

    /// Parses an exact code after trimming surrounding whitespace.
    ///
    /// Returns `None` unless the trimmed input is exactly [`OTP_LENGTH`]
    /// ASCII digits.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.len() == OTP_LENGTH && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(Zeroizing::new(trimmed.to_owned())))
        } else {
            None
        }
    }

    /// Returns the digits.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The next code in the code space, wrapping `999999` to `000000`.
    #[must_use]
    pub fn successor(&self) -> Self {
        Self::from_number(self.0.parse::<u32>().map_or(0, |n| n.wrapping_add(1)))
    }

    /// Exact comparison against a submitted code, trimming whitespace on
    /// both sides.
    #[must_use]
    pub fn matches(&self, submitted: &str) -> bool {
        self.0.trim() == submitted.trim()
    }
}

impl fmt::Debug for OtpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OtpCode(******)")
    }
}
