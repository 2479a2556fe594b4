//! Raw signup input and its normalization into [`ProfileFields`].

use std::collections::BTreeMap;

use easyprep_storage::{ContactAddress, ProfileFields, Role, Zeroizing};
use serde::Deserialize;

use crate::error::SignupError;

/// Longest accepted display name, in characters.
pub const MAX_NAME_LEN: usize = 100;

/// Longest accepted login identifier, in characters.
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Registration form as submitted, before normalization.
///
/// # Example
///
/// ```
/// use easyprep_signup::SignupRequest;
/// use easyprep_storage::{ProfileFields, Role};
///
/// let request = SignupRequest::builder()
///     .contact_address(" Asha@College.EDU ")
///     .name(" Asha Rao ")
///     .identifier("21CS042")
///     .role(Role::Student)
///     .department("CSE")
///     .credential_hash("$argon2id$...")
///     .build();
///
/// let profile = ProfileFields::try_from(request).unwrap();
/// assert_eq!(profile.contact_address.as_str(), "asha@college.edu");
/// assert_eq!(profile.name, "Asha Rao");
/// ```
#[derive(Clone, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct SignupRequest {
    /// Contact address as typed.
    #[builder(into)]
    pub contact_address: String,
    /// Display name.
    #[builder(into)]
    pub name: String,
    /// Requested login identifier.
    #[builder(into)]
    pub identifier: String,
    /// Requested role.
    pub role: Role,
    /// Organizational unit.
    #[builder(into)]
    pub department: Option<String>,
    /// Pre-hashed credential.
    #[builder(with = |hash: impl Into<String>| Zeroizing::new(hash.into()))]
    pub credential_hash: Zeroizing<String>,
    /// Pass-through attributes.
    #[serde(default)]
    #[builder(default)]
    pub attributes: BTreeMap<String, String>,
}

impl std::fmt::Debug for SignupRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupRequest")
            .field("contact_address", &self.contact_address)
            .field("name", &self.name)
            .field("identifier", &self.identifier)
            .field("role", &self.role)
            .field("department", &self.department)
            .field("credential_hash", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl TryFrom<SignupRequest> for ProfileFields {
    type Error = SignupError;

    /// Trims every text field, lower-cases the contact address and rejects
    /// blank or oversized values. A blank department becomes `None`.
    fn try_from(request: SignupRequest) -> Result<Self, Self::Error> {
        let contact_address = ContactAddress::parse(&request.contact_address)?;

        let name = request.name.trim();
        if name.is_empty() {
            return Err(SignupError::invalid_profile("name", "cannot be blank"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(SignupError::invalid_profile(
                "name",
                format!("exceeds {MAX_NAME_LEN} characters"),
            ));
        }

        let identifier = request.identifier.trim();
        if identifier.is_empty() {
            return Err(SignupError::invalid_profile("identifier", "cannot be blank"));
        }
        if identifier.chars().count() > MAX_IDENTIFIER_LEN {
            return Err(SignupError::invalid_profile(
                "identifier",
                format!("exceeds {MAX_IDENTIFIER_LEN} characters"),
            ));
        }
        if identifier.chars().any(char::is_whitespace) {
            return Err(SignupError::invalid_profile("identifier", "cannot contain whitespace"));
        }

        if request.credential_hash.trim().is_empty() {
            return Err(SignupError::invalid_profile("credential_hash", "cannot be blank"));
        }

        let department = request
            .department
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_owned);

        Ok(ProfileFields {
            contact_address,
            name: name.to_owned(),
            identifier: identifier.to_owned(),
            role: request.role,
            department,
            credential_hash: request.credential_hash,
            attributes: request.attributes,
        })
    }
}
