//! Test doubles and a wired-up harness for the signup workflow.
//!
//! Feature-gated behind `testutil`.
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use easyprep_signup::testutil::TestHarness;
//!
//! # async fn demo() {
//! let harness = TestHarness::new();
//! let ticket = harness.signup("a@x.com", "21CS001").await.unwrap();
//! let code = harness.notifier.last_code().unwrap();
//! harness.service.verify(&ticket.temporary_id, code.as_str()).await.unwrap();
//! # }
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use easyprep_storage::{
    AccountId, ContactAddress, ManualClock, MemoryPendingSignupStore, OtpCode, ProfileFields, Role,
    StorageError,
};
use parking_lot::Mutex;

use crate::{
    audit::{AuditEvent, AuditLogger},
    config::{ConfigError, SignupConfig},
    error::Result,
    materializer::{AccountError, AccountMaterializer, MemoryAccountDirectory},
    notify::{CodeNotifier, NotifyError},
    otp::CodeGenerator,
    request::SignupRequest,
    service::{SignupService, SignupTicket},
};

/// Fixed instant the harness clock starts at.
#[must_use]
pub fn test_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).single().unwrap_or_default()
}

/// Builds a student signup form for `address` and `identifier`.
#[must_use]
pub fn signup_request(address: &str, identifier: &str) -> SignupRequest {
    signup_request_with_role(address, identifier, Role::Student)
}

/// Builds a signup form with an explicit role.
#[must_use]
pub fn signup_request_with_role(address: &str, identifier: &str, role: Role) -> SignupRequest {
    SignupRequest::builder()
        .contact_address(address)
        .name(format!("User {identifier}"))
        .identifier(identifier)
        .role(role)
        .maybe_department((role != Role::Admin).then_some("CSE"))
        .credential_hash(format!("$argon2id$test${identifier}"))
        .build()
}

/// A code handed to [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCode {
    /// Destination.
    pub to: ContactAddress,
    /// The dispatched code.
    pub code: OtpCode,
    /// Expiry passed along with the code.
    pub expires_at: DateTime<Utc>,
}

/// Notifier that remembers every dispatch and can be switched to fail.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<SentCode>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingNotifier {
    /// Creates a notifier that accepts every dispatch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent dispatches fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every successful dispatch, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<SentCode> {
        self.sent.lock().clone()
    }

    /// The most recently dispatched code.
    #[must_use]
    pub fn last_code(&self) -> Option<OtpCode> {
        self.sent.lock().last().map(|sent| sent.code.clone())
    }

    /// The most recent code sent to `to`.
    #[must_use]
    pub fn last_code_for(&self, to: &ContactAddress) -> Option<OtpCode> {
        self.sent.lock().iter().rev().find(|sent| sent.to == *to).map(|sent| sent.code.clone())
    }
}

#[async_trait]
impl CodeNotifier for RecordingNotifier {
    async fn send_code(
        &self,
        to: &ContactAddress,
        code: &OtpCode,
        expires_at: DateTime<Utc>,
    ) -> std::result::Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::delivery("relay unavailable"));
        }
        self.sent.lock().push(SentCode { to: to.clone(), code: code.clone(), expires_at });
        Ok(())
    }
}

/// Generator that hands out consecutive codes.
#[derive(Debug)]
pub struct SequenceCodeGenerator {
    next: AtomicU32,
}

impl SequenceCodeGenerator {
    /// Starts the sequence at `first`.
    #[must_use]
    pub fn starting_at(first: u32) -> Self {
        Self { next: AtomicU32::new(first) }
    }
}

impl CodeGenerator for SequenceCodeGenerator {
    fn generate(&self) -> OtpCode {
        OtpCode::from_number(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

/// [`MemoryAccountDirectory`] wrapper whose account creation can be made to
/// fail with a storage error.
#[derive(Debug, Clone, Default)]
pub struct FlakyMaterializer {
    directory: MemoryAccountDirectory,
    failing: Arc<AtomicBool>,
}

impl FlakyMaterializer {
    /// Wraps `directory`.
    #[must_use]
    pub fn new(directory: MemoryAccountDirectory) -> Self {
        Self { directory, failing: Arc::default() }
    }

    /// Makes subsequent account creations fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl AccountMaterializer for FlakyMaterializer {
    async fn create_account(
        &self,
        profile: &ProfileFields,
    ) -> std::result::Result<AccountId, AccountError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AccountError::Storage(StorageError::timeout()));
        }
        self.directory.create_account(profile).await
    }

    async fn contact_address_in_use(
        &self,
        address: &ContactAddress,
    ) -> std::result::Result<bool, AccountError> {
        self.directory.contact_address_in_use(address).await
    }
}

/// Audit logger that keeps every event in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingAuditLogger {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl RecordingAuditLogger {
    /// Every logged event, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl AuditLogger for RecordingAuditLogger {
    async fn log(&self, event: &AuditEvent) {
        self.events.lock().push(event.clone());
    }
}

/// A [`SignupService`] wired to in-memory collaborators, with handles to
/// each of them.
///
/// Codes come from a [`SequenceCodeGenerator`] starting at `100000` and the
/// clock starts at [`test_epoch`].
#[derive(Debug)]
pub struct TestHarness {
    /// The service under test.
    pub service: Arc<SignupService>,
    /// Pending-signup store behind the service.
    pub store: MemoryPendingSignupStore,
    /// Accounts created by successful verifications.
    pub directory: MemoryAccountDirectory,
    /// Materializer the service uses; wraps `directory`.
    pub materializer: FlakyMaterializer,
    /// Captures dispatched codes.
    pub notifier: RecordingNotifier,
    /// Captures audit events.
    pub audit: RecordingAuditLogger,
    /// Time source of the service.
    pub clock: ManualClock,
}

impl TestHarness {
    /// Creates a harness with the default configuration.
    ///
    /// # Panics
    ///
    /// Never in practice; the default configuration always validates.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SignupConfig::default()).expect("default configuration is valid")
    }

    /// Creates a harness with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` is invalid.
    pub fn with_config(config: SignupConfig) -> std::result::Result<Self, ConfigError> {
        let store = MemoryPendingSignupStore::new();
        let directory = MemoryAccountDirectory::new();
        let materializer = FlakyMaterializer::new(directory.clone());
        let notifier = RecordingNotifier::new();
        let audit = RecordingAuditLogger::default();
        let clock = ManualClock::new(test_epoch());

        let service = SignupService::builder()
            .store(Arc::new(store.clone()))
            .materializer(Arc::new(materializer.clone()))
            .notifier(Arc::new(notifier.clone()))
            .code_generator(Arc::new(SequenceCodeGenerator::starting_at(100_000)))
            .clock(Arc::new(clock.clone()))
            .audit_logger(Arc::new(audit.clone()))
            .config(config)
            .build()?;

        Ok(Self {
            service: Arc::new(service),
            store,
            directory,
            materializer,
            notifier,
            audit,
            clock,
        })
    }

    /// Submits [`signup_request`] for `address` and `identifier`.
    ///
    /// # Errors
    ///
    /// Whatever [`SignupService::signup`] returns.
    pub async fn signup(&self, address: &str, identifier: &str) -> Result<SignupTicket> {
        self.service.signup(signup_request(address, identifier)).await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Assert that a signup operation failed with the given [`SignupError`]
/// variant pattern.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use easyprep_signup::{SignupError, assert_signup_err};
///
/// let result: Result<(), SignupError> = Err(SignupError::CodeMismatch);
/// assert_signup_err!(result, SignupError::CodeMismatch);
/// ```
///
/// [`SignupError`]: crate::SignupError
#[macro_export]
macro_rules! assert_signup_err {
    ($result:expr, $pattern:pat) => {
        match $result {
            Err($pattern) => {},
            other => panic!("expected Err({}), got: {:?}", stringify!($pattern), other),
        }
    };
}
