#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! End-to-end tests of the signup, verify and resend workflow against the
//! in-memory collaborators, driven by a manual clock.

use std::{sync::Arc, time::Duration};

use easyprep_signup::{
    CodeGenerator, MemoryAccountDirectory, SignupConfig, SignupError, SignupService,
    audit::{AuditAction, AuditResult},
    assert_signup_err,
    testutil::{RecordingNotifier, TestHarness, signup_request, signup_request_with_role},
};
use easyprep_storage::{
    AccountId, Clock, MemoryPendingSignupStore, OtpCode, PendingSignupStore, Role, TemporaryId,
};

const ELEVEN_MINUTES: Duration = Duration::from_secs(11 * 60);

fn limited(max_failed_attempts: u32) -> TestHarness {
    TestHarness::with_config(
        SignupConfig::builder().max_failed_attempts(max_failed_attempts).build().expect("valid"),
    )
    .expect("valid")
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn verify_succeeds_once_then_session_is_gone() {
    let harness = TestHarness::new();
    let ticket = harness.signup("asha@college.edu", "21CS042").await.unwrap();
    let code = harness.notifier.last_code().unwrap();

    let verified = harness.service.verify(&ticket.temporary_id, code.as_str()).await.unwrap();
    assert_eq!(verified.account_id, AccountId::from(1));

    let account = harness.directory.account(verified.account_id).expect("account created");
    assert_eq!(account.identifier, "21CS042");
    assert_eq!(account.contact_address.as_str(), "asha@college.edu");

    assert_signup_err!(
        harness.service.verify(&ticket.temporary_id, code.as_str()).await,
        SignupError::UnknownOrExpiredSession
    );
    assert_eq!(harness.directory.len(), 1);
}

#[tokio::test]
async fn verify_after_expiry_removes_the_record() {
    let harness = TestHarness::new();
    let ticket = harness.signup("a@x.com", "21CS001").await.unwrap();
    let code = harness.notifier.last_code().unwrap();

    harness.clock.advance(ELEVEN_MINUTES);

    assert_signup_err!(
        harness.service.verify(&ticket.temporary_id, code.as_str()).await,
        SignupError::CodeExpired
    );
    assert!(harness.store.get(&ticket.temporary_id).await.unwrap().is_none());
    assert_signup_err!(
        harness.service.verify(&ticket.temporary_id, code.as_str()).await,
        SignupError::UnknownOrExpiredSession
    );
    assert!(harness.directory.is_empty());
}

#[tokio::test]
async fn code_is_accepted_at_exact_expiry_instant() {
    let harness = TestHarness::new();
    let ticket = harness.signup("a@x.com", "21CS001").await.unwrap();
    let code = harness.notifier.last_code().unwrap();

    harness.clock.set(ticket.code_expires_at);
    harness.service.verify(&ticket.temporary_id, code.as_str()).await.unwrap();
}

#[tokio::test]
async fn mismatch_keeps_the_record() {
    let harness = TestHarness::new();
    let ticket = harness.signup("a@x.com", "21CS001").await.unwrap();
    let code = harness.notifier.last_code().unwrap();
    let before = harness.store.get(&ticket.temporary_id).await.unwrap().unwrap();

    for wrong in ["000000", "999999", "", "abcdef"] {
        assert_signup_err!(
            harness.service.verify(&ticket.temporary_id, wrong).await,
            SignupError::CodeMismatch
        );
    }

    let after = harness.store.get(&ticket.temporary_id).await.unwrap().unwrap();
    assert_eq!(before, after, "mismatch must not touch the record without a lockout");

    harness.service.verify(&ticket.temporary_id, code.as_str()).await.unwrap();
}

#[tokio::test]
async fn submitted_code_is_trimmed() {
    let harness = TestHarness::new();
    let ticket = harness.signup("a@x.com", "21CS001").await.unwrap();
    let code = harness.notifier.last_code().unwrap();

    let padded = format!("\t{} \n", code.as_str());
    harness.service.verify(&ticket.temporary_id, &padded).await.unwrap();
}

#[tokio::test]
async fn unknown_temporary_id() {
    let harness = TestHarness::new();
    assert_signup_err!(
        harness.service.verify(&TemporaryId::from("never-issued"), "123456").await,
        SignupError::UnknownOrExpiredSession
    );
    assert_signup_err!(
        harness.service.resend(&TemporaryId::from("never-issued")).await,
        SignupError::UnknownOrExpiredSession
    );
    assert!(harness.store.get(&TemporaryId::from("never-issued")).await.unwrap().is_none());
    assert_eq!(harness.service.metrics().unknown_sessions, 2);
}

// ---------------------------------------------------------------------------
// Resend
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resend_invalidates_the_previous_code() {
    let harness = TestHarness::new();
    let ticket = harness.signup("a@x.com", "21CS001").await.unwrap();
    let first = harness.notifier.last_code().unwrap();

    let issued = harness.service.resend(&ticket.temporary_id).await.unwrap();
    assert_ne!(issued.code, first);
    assert_eq!(harness.notifier.last_code(), Some(issued.code.clone()));

    assert_signup_err!(
        harness.service.verify(&ticket.temporary_id, first.as_str()).await,
        SignupError::CodeMismatch
    );
    let verified = harness.service.verify(&ticket.temporary_id, issued.code.as_str()).await.unwrap();
    assert_eq!(verified.account_id, AccountId::from(1));
}

/// Generator stuck on a single code.
struct Repeating(u32);

impl CodeGenerator for Repeating {
    fn generate(&self) -> OtpCode {
        OtpCode::from_number(self.0)
    }
}

#[tokio::test]
async fn resend_never_reissues_the_previous_code() {
    let notifier = RecordingNotifier::new();
    let service = SignupService::builder()
        .store(Arc::new(MemoryPendingSignupStore::new()))
        .materializer(Arc::new(MemoryAccountDirectory::new()))
        .notifier(Arc::new(notifier.clone()))
        .code_generator(Arc::new(Repeating(424_242)))
        .build()
        .unwrap();
    let ticket = service.signup(signup_request("a@x.com", "21CS001")).await.unwrap();
    let first = notifier.last_code().unwrap();
    assert_eq!(first.as_str(), "424242");

    let issued = service.resend(&ticket.temporary_id).await.unwrap();
    assert_ne!(issued.code, first);
    assert_eq!(notifier.last_code(), Some(issued.code.clone()));

    let again = service.resend(&ticket.temporary_id).await.unwrap();
    assert_ne!(again.code, issued.code);

    assert_signup_err!(
        service.verify(&ticket.temporary_id, first.as_str()).await,
        SignupError::CodeMismatch
    );
    assert_signup_err!(
        service.verify(&ticket.temporary_id, issued.code.as_str()).await,
        SignupError::CodeMismatch
    );
    service.verify(&ticket.temporary_id, again.code.as_str()).await.unwrap();
}

#[tokio::test]
async fn resend_restarts_the_validity_window_but_not_the_horizon() {
    let harness = TestHarness::new();
    let ticket = harness.signup("a@x.com", "21CS001").await.unwrap();
    let created = harness.store.get(&ticket.temporary_id).await.unwrap().unwrap().created_at;

    harness.clock.advance(Duration::from_secs(9 * 60));
    let issued = harness.service.resend(&ticket.temporary_id).await.unwrap();
    assert_eq!(issued.expires_at, harness.clock.now() + chrono::TimeDelta::minutes(10));

    // Past the first code's window, inside the second's.
    harness.clock.advance(Duration::from_secs(5 * 60));
    let record = harness.store.get(&ticket.temporary_id).await.unwrap().unwrap();
    assert_eq!(record.created_at, created);
    assert!(record.last_resend_at.is_some());

    // Sixteen minutes after signup the record is swept despite the fresh code.
    harness.clock.advance(Duration::from_secs(2 * 60));
    assert_eq!(harness.service.sweep_expired().await.unwrap(), 1);
    assert_signup_err!(
        harness.service.verify(&ticket.temporary_id, issued.code.as_str()).await,
        SignupError::UnknownOrExpiredSession
    );
}

#[tokio::test]
async fn resend_after_expiry_issues_a_usable_code() {
    let harness = TestHarness::new();
    let ticket = harness.signup("a@x.com", "21CS001").await.unwrap();

    harness.clock.advance(ELEVEN_MINUTES);
    let issued = harness.service.resend(&ticket.temporary_id).await.unwrap();
    harness.service.verify(&ticket.temporary_id, issued.code.as_str()).await.unwrap();
}

#[tokio::test]
async fn resend_cooldown_is_opt_in() {
    let harness = TestHarness::new();
    let ticket = harness.signup("a@x.com", "21CS001").await.unwrap();

    for _ in 0..3 {
        harness.service.resend(&ticket.temporary_id).await.unwrap();
    }
    assert_eq!(harness.service.metrics().resends, 3);
}

#[tokio::test]
async fn resend_cooldown_reports_retry_after() {
    let harness = TestHarness::with_config(
        SignupConfig::builder().resend_cooldown(Duration::from_secs(60)).build().unwrap(),
    )
    .unwrap();
    let ticket = harness.signup("a@x.com", "21CS001").await.unwrap();

    let issued = harness.service.resend(&ticket.temporary_id).await.unwrap();
    harness.clock.advance(Duration::from_secs(45));

    match harness.service.resend(&ticket.temporary_id).await {
        Err(SignupError::ResendCooldown { retry_after }) => {
            assert_eq!(retry_after, Duration::from_secs(15));
        },
        other => panic!("expected ResendCooldown, got {other:?}"),
    }
    // A refused resend leaves the current code in force.
    assert_eq!(harness.notifier.last_code(), Some(issued.code.clone()));
    assert_eq!(harness.service.metrics().resend_cooldowns, 1);

    harness.clock.advance(Duration::from_secs(15));
    harness.service.resend(&ticket.temporary_id).await.unwrap();
}

// ---------------------------------------------------------------------------
// Failed-attempt lockout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lockout_discards_record_at_limit() {
    let harness = limited(3);
    let ticket = harness.signup("a@x.com", "21CS001").await.unwrap();
    let code = harness.notifier.last_code().unwrap();

    for _ in 0..2 {
        assert_signup_err!(
            harness.service.verify(&ticket.temporary_id, "000000").await,
            SignupError::CodeMismatch
        );
    }
    assert_signup_err!(
        harness.service.verify(&ticket.temporary_id, "000000").await,
        SignupError::TooManyAttempts
    );
    assert_signup_err!(
        harness.service.verify(&ticket.temporary_id, code.as_str()).await,
        SignupError::UnknownOrExpiredSession
    );

    let metrics = harness.service.metrics();
    assert_eq!(metrics.code_mismatches, 2);
    assert_eq!(metrics.lockouts, 1);
}

#[tokio::test]
async fn resend_resets_failed_attempts() {
    let harness = limited(2);
    let ticket = harness.signup("a@x.com", "21CS001").await.unwrap();

    assert_signup_err!(
        harness.service.verify(&ticket.temporary_id, "000000").await,
        SignupError::CodeMismatch
    );
    let issued = harness.service.resend(&ticket.temporary_id).await.unwrap();
    assert_eq!(harness.store.get(&ticket.temporary_id).await.unwrap().unwrap().failed_attempts, 0);

    assert_signup_err!(
        harness.service.verify(&ticket.temporary_id, "000000").await,
        SignupError::CodeMismatch
    );
    harness.service.verify(&ticket.temporary_id, issued.code.as_str()).await.unwrap();
}

#[tokio::test]
async fn without_lockout_attempts_are_unbounded() {
    let harness = TestHarness::new();
    let ticket = harness.signup("a@x.com", "21CS001").await.unwrap();
    let code = harness.notifier.last_code().unwrap();

    for _ in 0..25 {
        assert_signup_err!(
            harness.service.verify(&ticket.temporary_id, "000000").await,
            SignupError::CodeMismatch
        );
    }
    harness.service.verify(&ticket.temporary_id, code.as_str()).await.unwrap();
}

// ---------------------------------------------------------------------------
// Account materialization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn materialization_failure_keeps_record_for_retry() {
    let harness = TestHarness::new();
    let ticket = harness.signup("a@x.com", "21CS001").await.unwrap();
    let code = harness.notifier.last_code().unwrap();

    harness.materializer.set_failing(true);
    let err = harness.service.verify(&ticket.temporary_id, code.as_str()).await.unwrap_err();
    assert!(matches!(err, SignupError::MaterializationFailed(_)));
    assert!(err.is_retryable());
    assert!(harness.store.get(&ticket.temporary_id).await.unwrap().is_some());

    harness.materializer.set_failing(false);
    let verified = harness.service.verify(&ticket.temporary_id, code.as_str()).await.unwrap();
    assert_eq!(verified.account_id, AccountId::from(1));
    assert_eq!(harness.service.metrics().materialization_failures, 1);
}

#[tokio::test]
async fn duplicate_identifier_surfaces_as_materialization_failure() {
    let harness = TestHarness::new();
    let first = harness.signup("a@x.com", "SAME").await.unwrap();
    let second = harness.signup("b@x.com", "SAME").await.unwrap();
    let sent = harness.notifier.sent();

    harness.service.verify(&first.temporary_id, sent[0].code.as_str()).await.unwrap();
    let err = harness.service.verify(&second.temporary_id, sent[1].code.as_str()).await.unwrap_err();
    assert!(matches!(err, SignupError::MaterializationFailed(_)));
}

#[tokio::test]
async fn every_role_uses_the_same_flow() {
    let harness = TestHarness::new();
    for (i, role) in [Role::Student, Role::Coordinator, Role::Admin].into_iter().enumerate() {
        let address = format!("user{i}@college.edu");
        let ticket = harness
            .service
            .signup(signup_request_with_role(&address, &format!("ID{i}"), role))
            .await
            .unwrap();
        let code = harness.notifier.last_code().unwrap();
        let verified = harness.service.verify(&ticket.temporary_id, code.as_str()).await.unwrap();
        assert_eq!(harness.directory.account(verified.account_id).unwrap().role, role);
    }
    assert_eq!(harness.directory.len(), 3);
}

// ---------------------------------------------------------------------------
// Signup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn signup_normalizes_contact_address() {
    let harness = TestHarness::new();
    let ticket = harness
        .service
        .signup(signup_request("  Asha@College.EDU ", "21CS042"))
        .await
        .unwrap();

    assert_eq!(ticket.contact_address.as_str(), "asha@college.edu");
    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, ticket.contact_address);
    assert_eq!(sent[0].expires_at, ticket.code_expires_at);
}

#[tokio::test]
async fn signup_rejects_registered_contact_address() {
    let harness = TestHarness::new();
    let ticket = harness.signup("a@x.com", "21CS001").await.unwrap();
    let code = harness.notifier.last_code().unwrap();
    harness.service.verify(&ticket.temporary_id, code.as_str()).await.unwrap();

    assert_signup_err!(
        harness.service.signup(signup_request("A@X.COM", "21CS002")).await,
        SignupError::DuplicateContactAddress
    );
    assert_eq!(harness.service.pending_count().await.unwrap(), 0);
    assert_eq!(harness.service.metrics().signups_rejected, 1);
}

#[tokio::test]
async fn signup_rejects_malformed_contact_address() {
    let harness = TestHarness::new();
    assert_signup_err!(
        harness.service.signup(signup_request("not-an-address", "21CS001")).await,
        SignupError::InvalidContactAddress(_)
    );
    assert!(harness.notifier.sent().is_empty());
}

#[tokio::test]
async fn failed_delivery_on_signup_discards_the_record() {
    let harness = TestHarness::new();
    harness.notifier.set_failing(true);

    let err = harness.signup("a@x.com", "21CS001").await.unwrap_err();
    assert!(matches!(err, SignupError::NotificationFailed(_)));
    assert_eq!(harness.service.pending_count().await.unwrap(), 0);
    assert_eq!(harness.service.metrics().notification_failures, 1);
}

#[tokio::test]
async fn failed_delivery_on_resend_keeps_the_new_code() {
    let harness = TestHarness::new();
    let ticket = harness.signup("a@x.com", "21CS001").await.unwrap();
    let first = harness.notifier.last_code().unwrap();

    harness.notifier.set_failing(true);
    assert_signup_err!(
        harness.service.resend(&ticket.temporary_id).await,
        SignupError::NotificationFailed(_)
    );

    let record = harness.store.get(&ticket.temporary_id).await.unwrap().unwrap();
    assert_ne!(record.code, first, "the replacement code stays in force");
}

// ---------------------------------------------------------------------------
// Sweeping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sweep_twice_at_same_instant_is_a_noop() {
    let harness = TestHarness::new();
    for i in 0..3 {
        harness.signup(&format!("s{i}@x.com"), &format!("ID{i}")).await.unwrap();
    }

    harness.clock.advance(Duration::from_secs(16 * 60));
    assert_eq!(harness.service.sweep_expired().await.unwrap(), 3);
    assert_eq!(harness.service.sweep_expired().await.unwrap(), 0);
    assert_eq!(harness.service.metrics().swept, 3);
}

#[tokio::test]
async fn signup_sweeps_stale_records() {
    let harness = TestHarness::new();
    let stale = harness.signup("old@x.com", "OLD").await.unwrap();

    harness.clock.advance(Duration::from_secs(16 * 60));
    harness.signup("new@x.com", "NEW").await.unwrap();

    assert!(harness.store.get(&stale.temporary_id).await.unwrap().is_none());
    assert_eq!(harness.service.pending_count().await.unwrap(), 1);
}

// ---------------------------------------------------------------------------
// Audit trail and metrics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn audit_trail_follows_the_flow() {
    let harness = TestHarness::new();
    let ticket = harness.signup("a@x.com", "21CS001").await.unwrap();
    harness.service.verify(&ticket.temporary_id, "000000").await.unwrap_err();
    let issued = harness.service.resend(&ticket.temporary_id).await.unwrap();
    harness.service.verify(&ticket.temporary_id, issued.code.as_str()).await.unwrap();

    let events = harness.audit.events();
    let actions: Vec<_> = events.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![AuditAction::Signup, AuditAction::Verify, AuditAction::Resend, AuditAction::Verify]
    );
    assert!(matches!(events[1].result, AuditResult::Failure(_)));
    assert_eq!(events[3].result, AuditResult::Success);
    assert_eq!(events[3].metadata.get("account_id").map(String::as_str), Some("1"));

    let resource = format!("signup:{}", ticket.temporary_id);
    assert!(events.iter().all(|e| e.resource == resource && e.actor == "a@x.com"));
    assert!(events.iter().all(|e| e.timestamp == harness.clock.now()));
}

#[tokio::test]
async fn codes_never_reach_the_audit_trail() {
    let harness = TestHarness::new();
    let ticket = harness.signup("a@x.com", "21CS001").await.unwrap();
    let code = harness.notifier.last_code().unwrap();
    harness.clock.advance(ELEVEN_MINUTES);
    harness.service.verify(&ticket.temporary_id, code.as_str()).await.unwrap_err();

    for event in harness.audit.events() {
        let rendered = format!("{event:?}");
        assert!(!rendered.contains(code.as_str()), "code leaked: {rendered}");
    }
}

#[tokio::test]
async fn metrics_track_the_flow() {
    let harness = TestHarness::new();
    let ticket = harness.signup("a@x.com", "21CS001").await.unwrap();
    harness.service.verify(&ticket.temporary_id, "000000").await.unwrap_err();
    let code = harness.notifier.last_code().unwrap();
    harness.service.verify(&ticket.temporary_id, code.as_str()).await.unwrap();

    let metrics = harness.service.metrics();
    assert_eq!(metrics.signups, 1);
    assert_eq!(metrics.code_mismatches, 1);
    assert_eq!(metrics.verified, 1);
    assert_eq!(metrics.verification_attempts(), 2);
}
