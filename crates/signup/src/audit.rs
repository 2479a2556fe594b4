//! Audit trail for the signup workflow.
//!
//! Every state change of a pending signup (issued, reissued, verified,
//! rejected, discarded) is reported to an [`AuditLogger`] as a structured
//! [`AuditEvent`]. The actor is the contact address the signup belongs to;
//! the resource is the pending signup's temporary id.
//!
//! # Usage
//!
//! ```no_run
//! use easyprep_signup::audit::{AuditAction, AuditEvent, AuditLogger, AuditResult, TracingAuditLogger};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let logger = TracingAuditLogger;
//! let event = AuditEvent::builder()
//!     .actor("student@college.edu")
//!     .action(AuditAction::Verify)
//!     .resource("signup:Zk3q...")
//!     .result(AuditResult::Success)
//!     .build();
//! logger.log(&event).await;
//! # });
//! ```

use std::{collections::HashMap, fmt};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Workflow step being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    /// A pending signup was created and its first code issued.
    Signup,
    /// A code was submitted for verification.
    Verify,
    /// A new code replaced the current one.
    Resend,
    /// Stale pending signups were swept.
    Sweep,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signup => write!(f, "signup"),
            Self::Verify => write!(f, "verify"),
            Self::Resend => write!(f, "resend"),
            Self::Sweep => write!(f, "sweep"),
        }
    }
}

/// Outcome of an audited step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditResult {
    /// The step completed.
    Success,
    /// The step was rejected or failed with the given reason.
    Failure(String),
}

impl fmt::Display for AuditResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure(reason) => write!(f, "failure: {reason}"),
        }
    }
}

/// Structured audit record.
#[derive(Debug, Clone, bon::Builder)]
pub struct AuditEvent {
    /// When the step happened (defaults to now).
    #[builder(default = Utc::now())]
    pub timestamp: DateTime<Utc>,
    /// Who the step was performed for.
    #[builder(into)]
    pub actor: String,
    /// The step.
    pub action: AuditAction,
    /// Affected resource, see [`signup_resource`].
    #[builder(into)]
    pub resource: String,
    /// Outcome.
    pub result: AuditResult,
    /// Additional context such as the created account id.
    #[builder(default)]
    pub metadata: HashMap<String, String>,
}

/// Audit sink.
#[async_trait]
pub trait AuditLogger: Send + Sync {
    /// Records an audit event.
    async fn log(&self, event: &AuditEvent);
}

#[async_trait]
impl<L: AuditLogger> AuditLogger for std::sync::Arc<L> {
    async fn log(&self, event: &AuditEvent) {
        (**self).log(event).await;
    }
}

/// Audit logger that emits structured `tracing` events at `INFO`.
///
/// Field mapping:
/// - `audit.timestamp`: RFC 3339 timestamp
/// - `audit.actor`: contact address
/// - `audit.action`: e.g. "verify"
/// - `audit.resource`: e.g. "signup:Zk3q..."
/// - `audit.result`: "success" or "failure: ..."
/// - `audit.metadata`: `k=v` pairs, comma separated
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLogger;

#[async_trait]
impl AuditLogger for TracingAuditLogger {
    async fn log(&self, event: &AuditEvent) {
        let mut pairs: Vec<_> = event.metadata.iter().map(|(k, v)| format!("{k}={v}")).collect();
        pairs.sort();
        let metadata_str = pairs.join(", ");

        tracing::info!(
            audit.timestamp = %event.timestamp.to_rfc3339(),
            audit.actor = %event.actor,
            audit.action = %event.action,
            audit.resource = %event.resource,
            audit.result = %event.result,
            audit.metadata = %metadata_str,
            "audit_event"
        );
    }
}

/// Audit logger that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditLogger;

#[async_trait]
impl AuditLogger for NoopAuditLogger {
    async fn log(&self, _event: &AuditEvent) {}
}

/// Resource identifier for a pending signup.
pub fn signup_resource(temporary_id: impl fmt::Display) -> String {
    format!("signup:{temporary_id}")
}
