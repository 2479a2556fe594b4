//! Shared test utilities for pending-signup storage.
//!
//! Profile fixtures, record builders and assertion macros for
//! [`StorageResult`] values. Feature-gated behind `testutil` so it never
//! leaks into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! easyprep-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use easyprep_storage::testutil::{pending_record, student_profile};
//! ```

use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    error::{StorageError, StorageResult},
    memory::MemoryPendingSignupStore,
    record::{PendingSignup, ProfileFields, Role},
    store::PendingSignupStore,
    types::{ContactAddress, OtpCode, TemporaryId},
};

/// Code validity used by [`pending_record`].
pub const TEST_CODE_VALIDITY: TimeDelta = TimeDelta::minutes(10);

/// Builds a student profile for the given address and identifier.
///
/// # Panics
///
/// Panics if `address` is not a valid contact address.
#[must_use]
pub fn student_profile(address: &str, identifier: &str) -> ProfileFields {
    profile_with_role(address, identifier, Role::Student)
}

/// Builds a profile with an explicit role.
///
/// # Panics
///
/// Panics if `address` is not a valid contact address.
#[allow(clippy::expect_used)]
#[must_use]
pub fn profile_with_role(address: &str, identifier: &str, role: Role) -> ProfileFields {
    ProfileFields::builder()
        .contact_address(ContactAddress::parse(address).expect("test address must be valid"))
        .name(format!("User {identifier}"))
        .identifier(identifier)
        .role(role)
        .maybe_department((role != Role::Admin).then_some("CSE"))
        .credential_hash(format!("$argon2id$test${identifier}"))
        .build()
}

/// Builds a pending record created at `created_at` with code `code` valid
/// for [`TEST_CODE_VALIDITY`].
#[must_use]
pub fn pending_record(
    id: &str,
    profile: ProfileFields,
    code: u32,
    created_at: DateTime<Utc>,
) -> PendingSignup {
    PendingSignup::new(
        TemporaryId::from(id),
        profile,
        OtpCode::from_number(code),
        created_at,
        TEST_CODE_VALIDITY,
    )
}

/// Creates a [`MemoryPendingSignupStore`] holding `count` records created at
/// `created_at`, with ids `"pending-{idx:04}"`.
///
/// # Panics
///
/// Panics if any `put` fails (should not happen with the memory store).
#[allow(clippy::expect_used)]
pub async fn populated_store(count: usize, created_at: DateTime<Utc>) -> MemoryPendingSignupStore {
    let store = MemoryPendingSignupStore::new();
    for i in 0..count {
        let record = pending_record(
            &format!("pending-{i:04}"),
            student_profile(&format!("student{i}@college.edu"), &format!("ROLL{i:04}")),
            u32::try_from(i).unwrap_or(u32::MAX),
            created_at,
        );
        store.put(record).await.expect("populate put failed");
    }
    store
}

/// Assert that a [`StorageResult`] is a [`StorageError::Conflict`].
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use easyprep_storage::{StorageError, StorageResult, assert_conflict};
///
/// let result: StorageResult<()> = Err(StorageError::conflict("taken"));
/// assert_conflict!(result);
/// ```
#[macro_export]
macro_rules! assert_conflict {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::Conflict { .. })),
            "expected StorageError::Conflict, got: {:?}",
            $result,
        );
    };
}

/// Assert that a [`StorageResult`] is `Ok` and return the inner value.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use easyprep_storage::{StorageResult, assert_storage_ok};
///
/// let result: StorageResult<i32> = Ok(42);
/// assert_eq!(assert_storage_ok!(result), 42);
/// ```
#[macro_export]
macro_rules! assert_storage_ok {
    ($result:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("expected Ok, got StorageError: {e:?}"),
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("{}: expected Ok, got StorageError: {e:?}", $msg),
        }
    };
}

/// Whether a result is a `Conflict` error.
pub fn is_conflict<T>(result: &StorageResult<T>) -> bool {
    matches!(result, Err(StorageError::Conflict { .. }))
}
