//! OTP-gated signup verification for EasyPrep.
//!
//! A registration form is parked as a pending signup until the person
//! proves control of the contact address by submitting the six-digit code
//! sent to it. Only then is a durable account created.
//!
//! # Flow
//!
//! ```text
//!   signup(form) ──► PendingSignup { code, expires_at } ──► code sent
//!        │
//!        ├── resend(id) ──► new code, old code invalid
//!        │
//!        └── verify(id, code)
//!               ├── unknown id       ► UnknownOrExpiredSession
//!               ├── past expires_at  ► CodeExpired        (record removed)
//!               ├── wrong code       ► CodeMismatch       (record kept)
//!               └── match            ► create_account ──► Verified
//! ```
//!
//! Every role (student, coordinator, admin) goes through the same flow.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with a wired-up [`SignupService`] harness,
//!   recording notifier, deterministic code generator and failure-injecting materializer.
//! - **`failpoints`**: Compiles the `signup-before-materialize` fail-point into
//!   [`SignupService::verify`] and the store's `store-before-sweep` fail-point.

#![deny(unsafe_code)]

pub mod audit;
pub mod config;
pub mod error;
pub mod materializer;
pub mod metrics;
pub mod notify;
pub mod otp;
pub mod request;
pub mod service;
pub mod sweeper;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::{ConfigError, DEFAULT_CODE_VALIDITY, DEFAULT_PENDING_HORIZON, SignupConfig};
pub use error::{Result, SignupError};
pub use materializer::{AccountError, AccountMaterializer, MemoryAccountDirectory};
pub use metrics::{SignupMetrics, SignupMetricsSnapshot};
pub use notify::{CodeNotifier, NoopNotifier, NotifyError, TracingNotifier};
pub use otp::{CodeGenerator, RandomCodeGenerator, generate_code, replacement_code};
pub use request::{MAX_IDENTIFIER_LEN, MAX_NAME_LEN, SignupRequest};
pub use service::{IssuedCode, SignupService, SignupTicket, Verified};
pub use sweeper::PendingSignupSweeper;
