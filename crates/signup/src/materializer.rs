//! Account creation once a signup is verified.
//!
//! The durable account store lives outside this workspace. The workflow
//! talks to it through [`AccountMaterializer`]; [`MemoryAccountDirectory`]
//! is a process-local implementation for tests and development.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use easyprep_storage::{AccountId, ContactAddress, ProfileFields, StorageError};
use parking_lot::RwLock;
use thiserror::Error;

/// Errors raised while creating an account.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AccountError {
    /// Another account already uses the login identifier.
    #[error("Identifier already taken: {identifier}")]
    DuplicateIdentifier {
        /// The conflicting identifier.
        identifier: String,
    },

    /// Another account already uses the contact address.
    #[error("Contact address already registered: {contact_address}")]
    DuplicateContactAddress {
        /// The conflicting address.
        contact_address: ContactAddress,
    },

    /// The account store failed.
    #[error("Account storage error: {0}")]
    Storage(#[source] StorageError),
}

impl From<StorageError> for AccountError {
    fn from(err: StorageError) -> Self {
        AccountError::Storage(err)
    }
}

/// Creates durable accounts from verified registration profiles.
#[async_trait]
pub trait AccountMaterializer: Send + Sync {
    /// Creates an account for `profile` and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError`] if a uniqueness constraint is violated or
    /// the account store fails. No account is created in that case.
    async fn create_account(&self, profile: &ProfileFields) -> Result<AccountId, AccountError>;

    /// Whether an existing account already uses `address`.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::Storage`] if the lookup fails.
    async fn contact_address_in_use(&self, address: &ContactAddress) -> Result<bool, AccountError>;
}

#[async_trait]
impl<M: AccountMaterializer> AccountMaterializer for Arc<M> {
    async fn create_account(&self, profile: &ProfileFields) -> Result<AccountId, AccountError> {
        (**self).create_account(profile).await
    }

    async fn contact_address_in_use(&self, address: &ContactAddress) -> Result<bool, AccountError> {
        (**self).contact_address_in_use(address).await
    }
}

#[derive(Debug)]
struct Directory {
    accounts: BTreeMap<AccountId, ProfileFields>,
    by_contact: HashMap<ContactAddress, AccountId>,
    by_identifier: HashMap<String, AccountId>,
    next_id: i64,
}

impl Default for Directory {
    fn default() -> Self {
        Self {
            accounts: BTreeMap::new(),
            by_contact: HashMap::new(),
            by_identifier: HashMap::new(),
            next_id: 1,
        }
    }
}

/// In-memory [`AccountMaterializer`].
///
/// Enforces unique contact addresses and identifiers and hands out
/// sequential ids starting at 1. Clones share the same directory.
///
/// # Examples
///
/// ```
/// use easyprep_signup::{AccountMaterializer, MemoryAccountDirectory};
/// use easyprep_storage::{ContactAddress, ProfileFields, Role};
///
/// #[tokio::main]
/// async fn main() {
///     let directory = MemoryAccountDirectory::new();
///     let profile = ProfileFields::builder()
///         .contact_address(ContactAddress::parse("a@x.com").unwrap())
///         .name("Asha")
///         .identifier("21CS042")
///         .role(Role::Student)
///         .credential_hash("hash")
///         .build();
///
///     let id = directory.create_account(&profile).await.unwrap();
///     assert_eq!(i64::from(id), 1);
///     assert!(directory.contact_address_in_use(&profile.contact_address).await.unwrap());
/// }
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemoryAccountDirectory {
    inner: Arc<RwLock<Directory>>,
}

impl MemoryAccountDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the profile stored for `id`.
    #[must_use]
    pub fn account(&self, id: AccountId) -> Option<ProfileFields> {
        self.inner.read().accounts.get(&id).cloned()
    }

    /// Number of accounts created.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().accounts.len()
    }

    /// Whether no account has been created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AccountMaterializer for MemoryAccountDirectory {
    #[tracing::instrument(skip(self, profile), fields(identifier = %profile.identifier, role = %profile.role))]
    async fn create_account(&self, profile: &ProfileFields) -> Result<AccountId, AccountError> {
        let mut directory = self.inner.write();

        if directory.by_contact.contains_key(&profile.contact_address) {
            return Err(AccountError::DuplicateContactAddress {
                contact_address: profile.contact_address.clone(),
            });
        }
        if directory.by_identifier.contains_key(&profile.identifier) {
            return Err(AccountError::DuplicateIdentifier {
                identifier: profile.identifier.clone(),
            });
        }

        let id = AccountId::from(directory.next_id);
        directory.next_id += 1;
        directory.by_contact.insert(profile.contact_address.clone(), id);
        directory.by_identifier.insert(profile.identifier.clone(), id);
        directory.accounts.insert(id, profile.clone());
        Ok(id)
    }

    #[tracing::instrument(skip(self))]
    async fn contact_address_in_use(&self, address: &ContactAddress) -> Result<bool, AccountError> {
        Ok(self.inner.read().by_contact.contains_key(address))
    }
}
