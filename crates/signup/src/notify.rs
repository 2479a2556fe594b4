//! Delivery of verification codes to contact addresses.
//!
//! The workflow hands each freshly issued code to a [`CodeNotifier`]. How
//! the code reaches the user (mail relay, SMS gateway, a log line in
//! development) is the notifier's concern.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use easyprep_storage::{BoxError, ContactAddress, OtpCode};
use thiserror::Error;

/// Errors raised while dispatching a code.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum NotifyError {
    /// The transport refused or failed to accept the message.
    #[error("Delivery failed: {message}")]
    Delivery {
        /// Description of the failure.
        message: String,
        /// The underlying transport error.
        #[source]
        source: Option<BoxError>,
    },

    /// The transport did not answer in time.
    #[error("Delivery timed out")]
    Timeout,
}

impl NotifyError {
    /// Creates a [`Delivery`](Self::Delivery) error without a source.
    #[must_use]
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery { message: message.into(), source: None }
    }

    /// Creates a [`Delivery`](Self::Delivery) error wrapping a transport error.
    #[must_use]
    pub fn delivery_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Delivery { message: message.into(), source: Some(Arc::new(source)) }
    }
}

/// Dispatches verification codes.
#[async_trait]
pub trait CodeNotifier: Send + Sync {
    /// Sends `code` to `to`. `expires_at` is included so the message can
    /// tell the user how long the code is good for.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if the code could not be handed to the
    /// transport.
    async fn send_code(
        &self,
        to: &ContactAddress,
        code: &OtpCode,
        expires_at: DateTime<Utc>,
    ) -> Result<(), NotifyError>;
}

#[async_trait]
impl<N: CodeNotifier> CodeNotifier for Arc<N> {
    async fn send_code(
        &self,
        to: &ContactAddress,
        code: &OtpCode,
        expires_at: DateTime<Utc>,
    ) -> Result<(), NotifyError> {
        (**self).send_code(to, code, expires_at).await
    }
}

/// Notifier that writes dispatches to the `tracing` stream.
///
/// The address and expiry are logged at `INFO`; the code itself only at
/// `DEBUG`, for local development without a mail relay.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl CodeNotifier for TracingNotifier {
    async fn send_code(
        &self,
        to: &ContactAddress,
        code: &OtpCode,
        expires_at: DateTime<Utc>,
    ) -> Result<(), NotifyError> {
        tracing::info!(to = %to, expires_at = %expires_at.to_rfc3339(), "verification code issued");
        tracing::debug!(to = %to, code = code.as_str(), "verification code");
        Ok(())
    }
}

/// Notifier that discards every code.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl CodeNotifier for NoopNotifier {
    async fn send_code(
        &self,
        _to: &ContactAddress,
        _code: &OtpCode,
        _expires_at: DateTime<Utc>,
    ) -> Result<(), NotifyError> {
        Ok(())
    }
}
