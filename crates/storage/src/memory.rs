//! In-memory pending-signup store.
//!
//! [`MemoryPendingSignupStore`] keeps records in a process-local
//! [`HashMap`] guarded by a [`parking_lot::RwLock`]. Each trait method takes
//! the lock once, so every operation is atomic and no caller ever sees a
//! partial write.
//!
//! # Example
//!
//! ```
//! use chrono::{TimeDelta, Utc};
//! use easyprep_storage::{
//!     ContactAddress, MemoryPendingSignupStore, OtpCode, PendingSignup, PendingSignupStore,
//!     ProfileFields, Role, TemporaryId,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryPendingSignupStore::new();
//!     let profile = ProfileFields::builder()
//!         .contact_address(ContactAddress::parse("a@x.com").unwrap())
//!         .name("Asha")
//!         .identifier("21CS042")
//!         .role(Role::Student)
//!         .credential_hash("hash")
//!         .build();
//!     let id = TemporaryId::generate();
//!     let record = PendingSignup::new(
//!         id.clone(),
//!         profile,
//!         OtpCode::from_number(4242),
//!         Utc::now(),
//!         TimeDelta::minutes(10),
//!     );
//!
//!     store.put(record).await.unwrap();
//!     assert!(store.get(&id).await.unwrap().is_some());
//!
//!     store.delete(&id).await.unwrap();
//!     assert!(store.get(&id).await.unwrap().is_none());
//! }
//! ```
//!
//! # Limitations
//!
//! - Data is not persisted; all records are lost when the process exits
//! - Stale records are only removed by an explicit sweep

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use fail::fail_point;
use parking_lot::RwLock;

use crate::{
    error::{StorageError, StorageResult},
    record::PendingSignup,
    store::{PendingSignupStore, RecordUpdate},
    types::{OtpCode, TemporaryId},
};

/// In-memory implementation of [`PendingSignupStore`].
///
/// # Cloning
///
/// Cheaply cloneable via [`Arc`]. All clones share the same records.
#[derive(Debug, Default, Clone)]
pub struct MemoryPendingSignupStore {
    records: Arc<RwLock<HashMap<TemporaryId, PendingSignup>>>,
}

impl MemoryPendingSignupStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingSignupStore for MemoryPendingSignupStore {
    #[tracing::instrument(skip(self, record), fields(temporary_id = %record.temporary_id))]
    async fn put(&self, record: PendingSignup) -> StorageResult<()> {
        self.records.write().insert(record.temporary_id.clone(), record);
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(temporary_id = %id))]
    async fn get(&self, id: &TemporaryId) -> StorageResult<Option<PendingSignup>> {
        Ok(self.records.read().get(id).cloned())
    }

    #[tracing::instrument(skip(self), fields(temporary_id = %id))]
    async fn delete(&self, id: &TemporaryId) -> StorageResult<()> {
        self.records.write().remove(id);
        Ok(())
    }

    #[tracing::instrument(skip(self, apply), fields(temporary_id = %id))]
    async fn update(
        &self,
        id: &TemporaryId,
        apply: RecordUpdate,
    ) -> StorageResult<Option<PendingSignup>> {
        let mut records = self.records.write();
        let Some(record) = records.get_mut(id) else {
            return Ok(None);
        };

        // Work on a copy so a mutation that rewrites the key cannot desync it.
        let mut updated = record.clone();
        apply(&mut updated);
        if updated.temporary_id != *id {
            return Err(StorageError::conflict(format!(
                "update must not change the temporary id of {id}"
            )));
        }
        *record = updated.clone();
        Ok(Some(updated))
    }

    #[tracing::instrument(skip(self, expected), fields(temporary_id = %id))]
    async fn delete_if_code(&self, id: &TemporaryId, expected: &OtpCode) -> StorageResult<bool> {
        let mut records = self.records.write();
        match records.get(id) {
            Some(record) if record.code == *expected => {
                records.remove(id);
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn sweep_expired(&self, now: DateTime<Utc>, horizon: TimeDelta) -> StorageResult<usize> {
        fail_point!("store-before-sweep", |_| {
            Err(StorageError::internal("injected failure before sweep"))
        });

        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, record| !record.is_stale(now, horizon));
        let removed = before - records.len();

        if removed > 0 {
            tracing::debug!(removed, remaining = records.len(), "Swept stale pending signups");
        }
        Ok(removed)
    }

    #[tracing::instrument(skip(self))]
    async fn len(&self) -> StorageResult<usize> {
        Ok(self.records.read().len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::testutil::{pending_record, student_profile};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryPendingSignupStore::new();
        let record = pending_record("t1", student_profile("a@x.com", "21CS001"), 111_111, t0());

        store.put(record.clone()).await.unwrap();
        assert_eq!(store.get(&record.temporary_id).await.unwrap(), Some(record.clone()));
        assert_eq!(store.len().await.unwrap(), 1);

        store.delete(&record.temporary_id).await.unwrap();
        assert!(store.get(&record.temporary_id).await.unwrap().is_none());
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryPendingSignupStore::new();
        let id = TemporaryId::from("missing");
        store.delete(&id).await.unwrap();
        store.delete(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = MemoryPendingSignupStore::new();
        let first = pending_record("t1", student_profile("a@x.com", "21CS001"), 1, t0());
        let mut second = first.clone();
        second.code = OtpCode::from_number(2);

        store.put(first).await.unwrap();
        store.put(second.clone()).await.unwrap();

        assert_eq!(store.len().await.unwrap(), 1);
        assert_eq!(store.get(&second.temporary_id).await.unwrap().unwrap().code, second.code);
    }

    #[tokio::test]
    async fn test_update_absent_does_not_create() {
        let store = MemoryPendingSignupStore::new();
        let id = TemporaryId::from("ghost");

        let result = store.update(&id, Box::new(|r| r.failed_attempts += 1)).await.unwrap();

        assert!(result.is_none());
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_update_applies_mutation() {
        let store = MemoryPendingSignupStore::new();
        let record = pending_record("t1", student_profile("a@x.com", "21CS001"), 1, t0());
        store.put(record.clone()).await.unwrap();

        let updated = store
            .update(&record.temporary_id, Box::new(|r| r.failed_attempts += 1))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.failed_attempts, 1);
        assert_eq!(store.get(&record.temporary_id).await.unwrap().unwrap().failed_attempts, 1);
    }

    #[tokio::test]
    async fn test_update_rejects_key_change() {
        let store = MemoryPendingSignupStore::new();
        let record = pending_record("t1", student_profile("a@x.com", "21CS001"), 1, t0());
        store.put(record.clone()).await.unwrap();

        let err = store
            .update(&record.temporary_id, Box::new(|r| r.temporary_id = TemporaryId::from("t2")))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Conflict { .. }));
        assert_eq!(store.get(&record.temporary_id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_delete_if_code_only_removes_matching_code() {
        let store = MemoryPendingSignupStore::new();
        let record = pending_record("t1", student_profile("a@x.com", "21CS001"), 1, t0());
        store.put(record.clone()).await.unwrap();

        let stale = OtpCode::from_number(9);
        assert!(!store.delete_if_code(&record.temporary_id, &stale).await.unwrap());
        assert_eq!(store.len().await.unwrap(), 1);

        assert!(store.delete_if_code(&record.temporary_id, &record.code).await.unwrap());
        assert!(store.is_empty().await.unwrap());

        assert!(!store.delete_if_code(&record.temporary_id, &record.code).await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_uses_created_at_not_code_expiry() {
        let store = MemoryPendingSignupStore::new();
        let horizon = TimeDelta::minutes(15);

        let old = pending_record("old", student_profile("a@x.com", "21CS001"), 1, t0());
        let fresh = pending_record(
            "fresh",
            student_profile("b@x.com", "21CS002"),
            2,
            t0() + TimeDelta::minutes(10),
        );
        store.put(old.clone()).await.unwrap();
        store.put(fresh.clone()).await.unwrap();

        let now = t0() + TimeDelta::minutes(16);
        assert_eq!(store.sweep_expired(now, horizon).await.unwrap(), 1);
        assert!(store.get(&old.temporary_id).await.unwrap().is_none());
        assert!(store.get(&fresh.temporary_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweep_at_exact_horizon_keeps_record() {
        let store = MemoryPendingSignupStore::new();
        let record = pending_record("t1", student_profile("a@x.com", "21CS001"), 1, t0());
        store.put(record).await.unwrap();

        let removed =
            store.sweep_expired(t0() + TimeDelta::minutes(15), TimeDelta::minutes(15)).await.unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_clone_shares_records() {
        let store = MemoryPendingSignupStore::new();
        let other = store.clone();
        let record = pending_record("t1", student_profile("a@x.com", "21CS001"), 1, t0());

        store.put(record.clone()).await.unwrap();
        assert!(other.get(&record.temporary_id).await.unwrap().is_some());
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            /// A sweep removes exactly the records older than the horizon, and
            /// repeating it at the same instant removes nothing.
            #[test]
            fn sweep_removes_exactly_stale_records(
                ages_secs in proptest::collection::vec(0i64..3_600, 0..40),
                horizon_secs in 1i64..1_800,
            ) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("runtime");

                rt.block_on(async {
                    let store = MemoryPendingSignupStore::new();
                    let now = t0() + TimeDelta::hours(2);
                    let horizon = TimeDelta::seconds(horizon_secs);

                    for (i, age) in ages_secs.iter().enumerate() {
                        let record = pending_record(
                            &format!("t{i}"),
                            student_profile(&format!("s{i}@x.com"), &format!("ID{i}")),
                            i as u32,
                            now - TimeDelta::seconds(*age),
                        );
                        store.put(record).await.unwrap();
                    }

                    let expected = ages_secs.iter().filter(|age| **age > horizon_secs).count();
                    let removed = store.sweep_expired(now, horizon).await.unwrap();
                    prop_assert_eq!(removed, expected);
                    prop_assert_eq!(store.len().await.unwrap(), ages_secs.len() - expected);

                    prop_assert_eq!(store.sweep_expired(now, horizon).await.unwrap(), 0);
                    Ok(())
                })?;
            }
        }
    }
}
