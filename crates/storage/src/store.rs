//! Storage trait for pending-signup records.
//!
//! [`PendingSignupStore`] abstracts where unconfirmed registrations live
//! between signup and verification. The signup service is generic over it
//! and receives it as `Arc<dyn PendingSignupStore>`; there is no global store.
//!
//! # Usage
//!
//! ```no_run
//! // Demonstrates the trait interface; requires a concrete store implementation.
//! use easyprep_storage::{PendingSignupStore, StorageResult, TemporaryId};
//!
//! async fn has_pending<S: PendingSignupStore>(
//!     store: &S,
//!     id: &TemporaryId,
//! ) -> StorageResult<bool> {
//!     Ok(store.get(id).await?.is_some())
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    error::StorageResult,
    record::PendingSignup,
    types::{OtpCode, TemporaryId},
};

/// In-place mutation applied by [`PendingSignupStore::update`].
pub type RecordUpdate = Box<dyn FnOnce(&mut PendingSignup) + Send>;

/// Persistence layer for pending-signup records, keyed by [`TemporaryId`].
///
/// # Atomicity
///
/// Every method is individually atomic: readers never observe a partially
/// written record, and a record replaced by [`put`](Self::put) or
/// [`update`](Self::update) is visible in full or not at all. Sequences of
/// calls against the same id are not isolated from each other; callers
/// serialize per-id work themselves.
///
/// # Absence
///
/// A missing record is not an error. Lookups return `Ok(None)`, and
/// [`delete`](Self::delete) succeeds whether or not the record exists.
#[async_trait]
pub trait PendingSignupStore: Send + Sync {
    /// Inserts a record, overwriting any existing record with the same id.
    async fn put(&self, record: PendingSignup) -> StorageResult<()>;

    /// Returns a copy of the record, if present.
    async fn get(&self, id: &TemporaryId) -> StorageResult<Option<PendingSignup>>;

    /// Removes the record. Idempotent.
    async fn delete(&self, id: &TemporaryId) -> StorageResult<()>;

    /// Applies `apply` to the stored record under the store's write lock.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(record))` with the updated record
    /// - `Ok(None)` if no record exists; nothing is created
    async fn update(
        &self,
        id: &TemporaryId,
        apply: RecordUpdate,
    ) -> StorageResult<Option<PendingSignup>>;

    /// Removes the record only if its current code equals `expected`.
    ///
    /// Returns whether a record was removed. A record whose code was
    /// replaced since it was read survives.
    async fn delete_if_code(&self, id: &TemporaryId, expected: &OtpCode) -> StorageResult<bool>;

    /// Removes every record created more than `horizon` before `now`,
    /// regardless of code state. Returns how many were removed.
    ///
    /// Sweeping twice with the same `now` removes nothing the second time.
    async fn sweep_expired(&self, now: DateTime<Utc>, horizon: TimeDelta) -> StorageResult<usize>;

    /// Number of records currently held.
    async fn len(&self) -> StorageResult<usize>;

    /// Whether the store holds no records.
    async fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len().await? == 0)
    }
}
