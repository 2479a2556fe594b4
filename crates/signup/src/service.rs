//! The signup workflow.
//!
//! [`SignupService`] ties the pending-signup store, the code generator, the
//! notifier and the account materializer together:
//!
//! 1. [`signup`](SignupService::signup) normalizes the form, issues a code
//!    and parks the profile under a fresh [`TemporaryId`].
//! 2. [`verify`](SignupService::verify) checks a submitted code and, on a
//!    match, creates the account and discards the pending record.
//! 3. [`resend`](SignupService::resend) replaces the code of a pending
//!    record; the previous code stops matching immediately.
//!
//! Expiry is decided by comparing the injected clock against the record at
//! verify time. Sweeps only reclaim memory.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use easyprep_signup::{MemoryAccountDirectory, NoopNotifier, SignupRequest, SignupService};
//! use easyprep_storage::{MemoryPendingSignupStore, Role};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let service = SignupService::builder()
//!     .store(Arc::new(MemoryPendingSignupStore::new()))
//!     .materializer(Arc::new(MemoryAccountDirectory::new()))
//!     .notifier(Arc::new(NoopNotifier))
//!     .build()?;
//!
//! let ticket = service
//!     .signup(
//!         SignupRequest::builder()
//!             .contact_address("asha@college.edu")
//!             .name("Asha Rao")
//!             .identifier("21CS042")
//!             .role(Role::Student)
//!             .credential_hash("$argon2id$...")
//!             .build(),
//!     )
//!     .await?;
//!
//! let err = service.verify(&ticket.temporary_id, "not a code").await.unwrap_err();
//! assert!(err.is_retryable());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use easyprep_storage::{
    AccountId, Clock, ContactAddress, OtpCode, PendingSignup, PendingSignupStore, ProfileFields,
    SystemClock, TemporaryId, to_time_delta,
};
use fail::fail_point;
use tracing::field;

use crate::{
    audit::{AuditAction, AuditEvent, AuditLogger, AuditResult, TracingAuditLogger, signup_resource},
    config::{ConfigError, SignupConfig},
    error::{Result, SignupError},
    materializer::{AccountError, AccountMaterializer},
    metrics::{SignupMetrics, SignupMetricsSnapshot},
    notify::{CodeNotifier, TracingNotifier},
    otp::{CodeGenerator, RandomCodeGenerator, replacement_code},
    request::SignupRequest,
    sweeper::PendingSignupSweeper,
};

/// Actor recorded on audit events not tied to a single contact address.
const SYSTEM_ACTOR: &str = "system";

/// Returned by [`SignupService::signup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupTicket {
    /// Handle for the follow-up verify and resend calls.
    pub temporary_id: TemporaryId,
    /// Normalized address the code was sent to.
    pub contact_address: ContactAddress,
    /// When the issued code stops being accepted.
    pub code_expires_at: DateTime<Utc>,
}

/// Returned by [`SignupService::verify`] once the account exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verified {
    /// The newly created account.
    pub account_id: AccountId,
}

/// Returned by [`SignupService::resend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCode {
    /// The replacement code. Already dispatched to the contact address.
    pub code: OtpCode,
    /// When the replacement code stops being accepted.
    pub expires_at: DateTime<Utc>,
}

fn default_notifier() -> Arc<dyn CodeNotifier> {
    Arc::new(TracingNotifier)
}

fn default_code_generator() -> Arc<dyn CodeGenerator> {
    Arc::new(RandomCodeGenerator)
}

fn default_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

fn default_audit_logger() -> Arc<dyn AuditLogger> {
    Arc::new(TracingAuditLogger)
}

/// OTP-gated signup workflow.
///
/// All collaborators are injected; only the pending-signup store and the
/// account materializer are required. Every other seam has a production
/// default:
///
/// | Seam | Default |
/// |------|---------|
/// | `notifier` | [`TracingNotifier`] |
/// | `code_generator` | [`RandomCodeGenerator`] |
/// | `clock` | [`SystemClock`] |
/// | `audit_logger` | [`TracingAuditLogger`] |
/// | `config` | [`SignupConfig::default`] |
///
/// Operations on different temporary ids are independent. Operations on the
/// same id are expected to be serialized by the caller; when they are not,
/// the store keeps every record consistent and a racing verify at worst
/// sees [`SignupError::CodeMismatch`].
pub struct SignupService {
    store: Arc<dyn PendingSignupStore>,
    materializer: Arc<dyn AccountMaterializer>,
    notifier: Arc<dyn CodeNotifier>,
    codes: Arc<dyn CodeGenerator>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditLogger>,
    config: SignupConfig,
    metrics: Arc<SignupMetrics>,
}

impl std::fmt::Debug for SignupService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupService")
            .field("config", &self.config)
            .field("metrics", &self.metrics.snapshot())
            .finish_non_exhaustive()
    }
}

#[bon::bon]
impl SignupService {
    /// Creates a service.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails
    /// [`SignupConfig::validate`], which matters for configurations that
    /// were deserialized rather than built.
    #[builder]
    pub fn new(
        store: Arc<dyn PendingSignupStore>,
        materializer: Arc<dyn AccountMaterializer>,
        #[builder(default = default_notifier())] notifier: Arc<dyn CodeNotifier>,
        #[builder(default = default_code_generator())] code_generator: Arc<dyn CodeGenerator>,
        #[builder(default = default_clock())] clock: Arc<dyn Clock>,
        #[builder(default = default_audit_logger())] audit_logger: Arc<dyn AuditLogger>,
        #[builder(default)] config: SignupConfig,
        #[builder(default)] metrics: Arc<SignupMetrics>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store,
            materializer,
            notifier,
            codes: code_generator,
            clock,
            audit: audit_logger,
            config,
            metrics,
        })
    }

    /// Registers a pending signup and dispatches its first code.
    ///
    /// Stale pending signups are swept first; a failing sweep is logged and
    /// does not block the signup.
    ///
    /// # Errors
    ///
    /// - [`SignupError::InvalidContactAddress`] or
    ///   [`SignupError::InvalidProfile`] if the form does not normalize
    /// - [`SignupError::DuplicateContactAddress`] if an account already uses
    ///   the address
    /// - [`SignupError::NotificationFailed`] if the code could not be sent;
    ///   nothing is kept in that case
    /// - [`SignupError::Storage`] if the pending-signup store fails
    #[tracing::instrument(
        skip(self, request),
        fields(role = %request.role, temporary_id = field::Empty)
    )]
    pub async fn signup(&self, request: SignupRequest) -> Result<SignupTicket> {
        let profile = match ProfileFields::try_from(request) {
            Ok(profile) => profile,
            Err(err) => {
                tracing::debug!(error = %err, "signup rejected");
                self.metrics.record_signup_rejected();
                return Err(err);
            },
        };

        self.sweep_opportunistically().await;
        self.ensure_contact_address_free(&profile.contact_address).await?;

        let now = self.clock.now();
        let temporary_id = TemporaryId::generate();
        tracing::Span::current().record("temporary_id", field::display(&temporary_id));

        let code = self.codes.generate();
        let record = PendingSignup::new(
            temporary_id.clone(),
            profile,
            code.clone(),
            now,
            self.config.code_validity_delta(),
        );
        let contact_address = record.contact_address().clone();
        let code_expires_at = record.code_expires_at;
        self.store.put(record).await?;

        if let Err(err) = self.notifier.send_code(&contact_address, &code, code_expires_at).await {
            tracing::warn!(error = %err, "code delivery failed, discarding pending signup");
            self.metrics.record_notification_failure();
            if let Err(delete_err) = self.store.delete(&temporary_id).await {
                tracing::warn!(error = %delete_err, "failed to discard undeliverable pending signup");
            }
            self.audit_failure(AuditAction::Signup, &contact_address, &temporary_id, &err).await;
            return Err(SignupError::NotificationFailed(err));
        }

        tracing::debug!(expires_at = %code_expires_at, "pending signup created");
        self.metrics.record_signup();
        self.audit_success(AuditAction::Signup, &contact_address, &temporary_id, HashMap::new())
            .await;

        Ok(SignupTicket { temporary_id, contact_address, code_expires_at })
    }

    /// Checks `submitted_code` against the pending signup and creates the
    /// account on a match.
    ///
    /// Surrounding whitespace in the submitted code is ignored.
    ///
    /// # Errors
    ///
    /// - [`SignupError::UnknownOrExpiredSession`] if no pending signup exists
    /// - [`SignupError::CodeExpired`] if the code's window has passed; the
    ///   pending signup is removed
    /// - [`SignupError::CodeMismatch`] if the code is wrong; the pending
    ///   signup is kept
    /// - [`SignupError::TooManyAttempts`] if the configured attempt limit
    ///   was reached; the pending signup is removed
    /// - [`SignupError::MaterializationFailed`] if the account could not be
    ///   created; the pending signup is kept and the same code may be
    ///   submitted again
    /// - [`SignupError::Storage`] if the pending-signup store fails
    #[tracing::instrument(skip(self, submitted_code), fields(temporary_id = %temporary_id))]
    pub async fn verify(&self, temporary_id: &TemporaryId, submitted_code: &str) -> Result<Verified> {
        let now = self.clock.now();
        let Some(record) = self.store.get(temporary_id).await? else {
            tracing::debug!("no pending signup");
            self.metrics.record_unknown_session();
            return Err(SignupError::UnknownOrExpiredSession);
        };

        if record.is_code_expired(now) {
            // A concurrent resend may have replaced the record; leave that one alone.
            self.store.delete_if_code(temporary_id, &record.code).await?;
            tracing::debug!(expired_at = %record.code_expires_at, "code expired");
            self.metrics.record_code_expired();
            let err = SignupError::CodeExpired;
            self.audit_failure(AuditAction::Verify, record.contact_address(), temporary_id, &err)
                .await;
            return Err(err);
        }

        if !record.code.matches(submitted_code) {
            let err = self.reject_code(&record).await;
            self.audit_failure(AuditAction::Verify, record.contact_address(), temporary_id, &err)
                .await;
            return Err(err);
        }

        fail_point!("signup-before-materialize", |_| {
            Err(SignupError::MaterializationFailed(AccountError::Storage(
                easyprep_storage::StorageError::internal("injected failure before materialization"),
            )))
        });

        match self.materializer.create_account(&record.profile).await {
            Ok(account_id) => {
                if let Err(err) = self.store.delete(temporary_id).await {
                    tracing::warn!(error = %err, "account created but pending signup not removed");
                }
                tracing::info!(
                    account_id = %account_id,
                    role = %record.profile.role,
                    "account created"
                );
                self.metrics.record_verified();
                self.audit_success(
                    AuditAction::Verify,
                    record.contact_address(),
                    temporary_id,
                    HashMap::from([("account_id".to_owned(), account_id.to_string())]),
                )
                .await;
                Ok(Verified { account_id })
            },
            Err(source) => {
                tracing::warn!(error = %source, "account creation failed, keeping pending signup");
                self.metrics.record_materialization_failure();
                let err = SignupError::MaterializationFailed(source);
                self.audit_failure(AuditAction::Verify, record.contact_address(), temporary_id, &err)
                    .await;
                Err(err)
            },
        }
    }

    /// Issues a replacement code for a pending signup and dispatches it.
    ///
    /// The previous code stops matching immediately. The failed-attempt
    /// counter starts over; the pending signup's age does not.
    ///
    /// # Errors
    ///
    /// - [`SignupError::UnknownOrExpiredSession`] if no pending signup exists
    /// - [`SignupError::ResendCooldown`] if a cooldown is configured and the
    ///   previous resend was too recent
    /// - [`SignupError::NotificationFailed`] if the new code could not be
    ///   sent; the new code stays in effect
    /// - [`SignupError::Storage`] if the pending-signup store fails
    #[tracing::instrument(skip(self), fields(temporary_id = %temporary_id))]
    pub async fn resend(&self, temporary_id: &TemporaryId) -> Result<IssuedCode> {
        let now = self.clock.now();
        let Some(record) = self.store.get(temporary_id).await? else {
            tracing::debug!("no pending signup");
            self.metrics.record_unknown_session();
            return Err(SignupError::UnknownOrExpiredSession);
        };

        if let Some(retry_after) = self.cooldown_remaining(&record, now) {
            tracing::debug!(retry_after_ms = retry_after.as_millis() as u64, "resend refused");
            self.metrics.record_resend_cooldown();
            let err = SignupError::ResendCooldown { retry_after };
            self.audit_failure(AuditAction::Resend, record.contact_address(), temporary_id, &err)
                .await;
            return Err(err);
        }

        let replacement = replacement_code(self.codes.as_ref(), &record.code);
        let validity = self.config.code_validity_delta();
        let Some(updated) = self
            .store
            .update(
                temporary_id,
                Box::new(move |current| {
                    // A concurrent resend may already have issued the same code.
                    let code = if current.code == replacement {
                        current.code.successor()
                    } else {
                        replacement
                    };
                    current.reissue(code, now, validity);
                }),
            )
            .await?
        else {
            tracing::debug!("pending signup vanished before reissue");
            self.metrics.record_unknown_session();
            return Err(SignupError::UnknownOrExpiredSession);
        };

        let code = updated.code.clone();
        let expires_at = updated.code_expires_at;
        if let Err(err) = self.notifier.send_code(updated.contact_address(), &code, expires_at).await {
            tracing::warn!(error = %err, "replacement code delivery failed");
            self.metrics.record_notification_failure();
            self.audit_failure(AuditAction::Resend, updated.contact_address(), temporary_id, &err)
                .await;
            return Err(SignupError::NotificationFailed(err));
        }

        tracing::debug!(expires_at = %expires_at, "code reissued");
        self.metrics.record_resend();
        self.audit_success(AuditAction::Resend, updated.contact_address(), temporary_id, HashMap::new())
            .await;

        Ok(IssuedCode { code, expires_at })
    }

    /// Removes every pending signup older than the configured horizon.
    ///
    /// Returns how many were removed. Running it again at the same instant
    /// removes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SignupError::Storage`] if the store fails.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let removed = self.store.sweep_expired(now, self.config.pending_horizon_delta()).await?;
        self.metrics.record_swept(removed);

        if removed > 0 {
            tracing::info!(removed, "swept stale pending signups");
            self.audit_success(
                AuditAction::Sweep,
                SYSTEM_ACTOR,
                "*",
                HashMap::from([("removed".to_owned(), removed.to_string())]),
            )
            .await;
        }
        Ok(removed)
    }

    /// Number of pending signups currently stored.
    ///
    /// # Errors
    ///
    /// Returns [`SignupError::Storage`] if the store fails.
    pub async fn pending_count(&self) -> Result<usize> {
        Ok(self.store.len().await?)
    }

    /// Returns a snapshot of the workflow counters.
    #[must_use]
    pub fn metrics(&self) -> SignupMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &SignupConfig {
        &self.config
    }

    /// Starts the background sweeper if `sweep_interval` is configured.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context.
    #[must_use]
    pub fn spawn_sweeper(self: &Arc<Self>) -> Option<PendingSignupSweeper> {
        self.config
            .sweep_interval()
            .map(|interval| PendingSignupSweeper::spawn(Arc::clone(self), interval))
    }

    async fn sweep_opportunistically(&self) {
        if let Err(err) = self.sweep_expired().await {
            tracing::warn!(error = %err, "opportunistic sweep failed");
        }
    }

    async fn ensure_contact_address_free(&self, address: &ContactAddress) -> Result<()> {
        match self.materializer.contact_address_in_use(address).await {
            Ok(false) => Ok(()),
            Ok(true) => {
                tracing::debug!("contact address already registered");
                self.metrics.record_signup_rejected();
                let err = SignupError::DuplicateContactAddress;
                self.audit_failure(AuditAction::Signup, address, "-", &err).await;
                Err(err)
            },
            Err(AccountError::Storage(err)) => Err(SignupError::Storage(err)),
            Err(err) => {
                tracing::warn!(error = %err, "contact address lookup failed");
                Err(SignupError::AccountLookupFailed(err))
            },
        }
    }

    /// Handles a wrong code. Without a configured limit the record is left
    /// untouched; otherwise its counter is bumped and the record is dropped
    /// once the limit is reached.
    async fn reject_code(&self, record: &PendingSignup) -> SignupError {
        let Some(limit) = self.config.max_failed_attempts() else {
            self.metrics.record_code_mismatch();
            return SignupError::CodeMismatch;
        };

        let observed = record.code.clone();
        let updated = self
            .store
            .update(
                &record.temporary_id,
                Box::new(move |current| {
                    // Attempts against a code that was since replaced do not count.
                    if current.code == observed {
                        current.failed_attempts = current.failed_attempts.saturating_add(1);
                    }
                }),
            )
            .await;

        match updated {
            Ok(Some(current)) if current.code == record.code && current.failed_attempts >= limit => {
                match self.store.delete_if_code(&record.temporary_id, &record.code).await {
                    Ok(true) => {
                        tracing::warn!(attempts = current.failed_attempts, "attempt limit reached");
                        self.metrics.record_lockout();
                        SignupError::TooManyAttempts
                    },
                    Ok(false) => {
                        tracing::debug!("code replaced before lockout");
                        self.metrics.record_code_mismatch();
                        SignupError::CodeMismatch
                    },
                    Err(err) => SignupError::Storage(err),
                }
            },
            Ok(_) => {
                self.metrics.record_code_mismatch();
                SignupError::CodeMismatch
            },
            Err(err) => SignupError::Storage(err),
        }
    }

    fn cooldown_remaining(&self, record: &PendingSignup, now: DateTime<Utc>) -> Option<Duration> {
        let cooldown = to_time_delta(self.config.resend_cooldown()?);
        let elapsed = now.signed_duration_since(record.last_resend_at?);
        if elapsed >= cooldown {
            return None;
        }
        (cooldown - elapsed).to_std().ok()
    }

    async fn audit_success(
        &self,
        action: AuditAction,
        actor: impl std::fmt::Display,
        temporary_id: impl std::fmt::Display,
        metadata: HashMap<String, String>,
    ) {
        let event = AuditEvent::builder()
            .timestamp(self.clock.now())
            .actor(actor.to_string())
            .action(action)
            .resource(signup_resource(temporary_id))
            .result(AuditResult::Success)
            .metadata(metadata)
            .build();
        self.audit.log(&event).await;
    }

    async fn audit_failure(
        &self,
        action: AuditAction,
        actor: impl std::fmt::Display,
        temporary_id: impl std::fmt::Display,
        reason: impl std::fmt::Display,
    ) {
        let event = AuditEvent::builder()
            .timestamp(self.clock.now())
            .actor(actor.to_string())
            .action(action)
            .resource(signup_resource(temporary_id))
            .result(AuditResult::Failure(reason.to_string()))
            .build();
        self.audit.log(&event).await;
    }
}
