//! Counters for the signup workflow.
//!
//! # Examples
//!
//! ```
//! use easyprep_signup::SignupMetrics;
//!
//! let metrics = SignupMetrics::new();
//! metrics.record_signup();
//! metrics.record_verified();
//! metrics.record_code_mismatch();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.signups, 1);
//! assert_eq!(snapshot.verification_attempts(), 2);
//! assert!((snapshot.verification_success_rate() - 0.5).abs() < f64::EPSILON);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of [`SignupMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, bon::Builder)]
pub struct SignupMetricsSnapshot {
    /// Pending signups created.
    #[builder(default)]
    pub signups: u64,
    /// Signups rejected before a record was created (invalid or duplicate).
    #[builder(default)]
    pub signups_rejected: u64,
    /// Successful verifications (accounts created).
    #[builder(default)]
    pub verified: u64,
    /// Wrong codes submitted.
    #[builder(default)]
    pub code_mismatches: u64,
    /// Verifications after the code expired.
    #[builder(default)]
    pub code_expirations: u64,
    /// Verify or resend calls for an unknown temporary id.
    #[builder(default)]
    pub unknown_sessions: u64,
    /// Pending signups discarded after too many wrong codes.
    #[builder(default)]
    pub lockouts: u64,
    /// Matching codes whose account creation failed.
    #[builder(default)]
    pub materialization_failures: u64,
    /// Codes that could not be delivered.
    #[builder(default)]
    pub notification_failures: u64,
    /// Codes reissued.
    #[builder(default)]
    pub resends: u64,
    /// Resends refused by the cooldown.
    #[builder(default)]
    pub resend_cooldowns: u64,
    /// Pending signups removed by sweeps.
    #[builder(default)]
    pub swept: u64,
}

impl SignupMetricsSnapshot {
    /// Verify calls that reached a stored record.
    #[must_use]
    pub fn verification_attempts(&self) -> u64 {
        self.verified
            + self.code_mismatches
            + self.code_expirations
            + self.lockouts
            + self.materialization_failures
    }

    /// Fraction of verification attempts that created an account.
    #[must_use]
    pub fn verification_success_rate(&self) -> f64 {
        let attempts = self.verification_attempts();
        if attempts == 0 {
            return 0.0;
        }
        self.verified as f64 / attempts as f64
    }
}

/// Lock-free workflow counters.
#[derive(Debug, Default)]
pub struct SignupMetrics {
    signups: AtomicU64,
    signups_rejected: AtomicU64,
    verified: AtomicU64,
    code_mismatches: AtomicU64,
    code_expirations: AtomicU64,
    unknown_sessions: AtomicU64,
    lockouts: AtomicU64,
    materialization_failures: AtomicU64,
    notification_failures: AtomicU64,
    resends: AtomicU64,
    resend_cooldowns: AtomicU64,
    swept: AtomicU64,
}

impl SignupMetrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a created pending signup.
    pub fn record_signup(&self) {
        self.signups.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a signup rejected before storage.
    pub fn record_signup_rejected(&self) {
        self.signups_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful verification.
    pub fn record_verified(&self) {
        self.verified.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a wrong code.
    pub fn record_code_mismatch(&self) {
        self.code_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a verification against an expired code.
    pub fn record_code_expired(&self) {
        self.code_expirations.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a lookup of an unknown temporary id.
    pub fn record_unknown_session(&self) {
        self.unknown_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a pending signup discarded by the attempt limit.
    pub fn record_lockout(&self) {
        self.lockouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed account creation.
    pub fn record_materialization_failure(&self) {
        self.materialization_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an undeliverable code.
    pub fn record_notification_failure(&self) {
        self.notification_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a reissued code.
    pub fn record_resend(&self) {
        self.resends.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a resend refused by the cooldown.
    pub fn record_resend_cooldown(&self) {
        self.resend_cooldowns.fetch_add(1, Ordering::Relaxed);
    }

    /// Records `count` swept pending signups.
    pub fn record_swept(&self, count: usize) {
        self.swept.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Returns the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> SignupMetricsSnapshot {
        SignupMetricsSnapshot::builder()
            .signups(self.signups.load(Ordering::Relaxed))
            .signups_rejected(self.signups_rejected.load(Ordering::Relaxed))
            .verified(self.verified.load(Ordering::Relaxed))
            .code_mismatches(self.code_mismatches.load(Ordering::Relaxed))
            .code_expirations(self.code_expirations.load(Ordering::Relaxed))
            .unknown_sessions(self.unknown_sessions.load(Ordering::Relaxed))
            .lockouts(self.lockouts.load(Ordering::Relaxed))
            .materialization_failures(self.materialization_failures.load(Ordering::Relaxed))
            .notification_failures(self.notification_failures.load(Ordering::Relaxed))
            .resends(self.resends.load(Ordering::Relaxed))
            .resend_cooldowns(self.resend_cooldowns.load(Ordering::Relaxed))
            .swept(self.swept.load(Ordering::Relaxed))
            .build()
    }

    /// Resets every counter to zero.
    pub fn reset(&self) {
        for counter in [
            &self.signups,
            &self.signups_rejected,
            &self.verified,
            &self.code_mismatches,
            &self.code_expirations,
            &self.unknown_sessions,
            &self.lockouts,
            &self.materialization_failures,
            &self.notification_failures,
            &self.resends,
            &self.resend_cooldowns,
            &self.swept,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
