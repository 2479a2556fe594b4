//! Pending-signup storage for the EasyPrep signup workflow.
//!
//! This crate provides the [`PendingSignupStore`] trait and the value types
//! shared by every layer of the workflow: unconfirmed registrations
//! ([`PendingSignup`]), their verification codes ([`OtpCode`]) and the
//! identifiers that tie them together ([`TemporaryId`], [`AccountId`]).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    easyprep-signup                          │
//! │        SignupService (signup, verify, resend, sweep)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   easyprep-storage                          │
//! │              PendingSignupStore trait                       │
//! │  (put, get, delete, update, delete_if_code, sweep_expired)  │
//! ├─────────────────────────────────────────────────────────────┤
//! │               MemoryPendingSignupStore                      │
//! │             (process-local, non-durable)                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Time
//!
//! Nothing in this crate reads the wall clock implicitly. Callers pass
//! `now` into [`PendingSignupStore::sweep_expired`] and record
//! constructors, typically from a [`Clock`].
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with profile fixtures, record builders and
//!   assertion macros. Enable this in `[dev-dependencies]` for integration tests.
//! - **`failpoints`**: Compiles the `store-before-sweep` fail-point into the memory store.

#![deny(unsafe_code)]

pub mod clock;
pub mod error;
pub mod memory;
pub mod record;
pub mod store;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod types;

// Re-export primary types at crate root for convenience
pub use clock::{Clock, ManualClock, SystemClock, to_time_delta};
pub use error::{BoxError, StorageError, StorageResult};
pub use memory::MemoryPendingSignupStore;
pub use record::{PendingSignup, ProfileFields, Role};
pub use store::{PendingSignupStore, RecordUpdate};
pub use types::{
    AccountId, ContactAddress, ContactAddressError, OTP_LENGTH, OTP_SPACE, OtpCode, TemporaryId,
};
pub use zeroize::Zeroizing;
