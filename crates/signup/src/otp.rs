//! Verification code generation.
//!
//! Codes are six ASCII digits drawn uniformly from `000000..=999999` using
//! the thread-local CSPRNG. The [`CodeGenerator`] seam exists so tests can
//! drive the workflow with predictable codes.

use easyprep_storage::{OTP_SPACE, OtpCode};
use rand::Rng;

/// Source of fresh verification codes.
pub trait CodeGenerator: Send + Sync {
    /// Returns a new code.
    fn generate(&self) -> OtpCode;
}

/// [`CodeGenerator`] backed by [`rand::rng`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> OtpCode {
        generate_code()
    }
}

/// Generates a uniformly random six-digit code.
///
/// # Example
///
/// ```
/// let code = easyprep_signup::generate_code();
/// assert_eq!(code.as_str().len(), 6);
/// assert!(code.as_str().bytes().all(|b| b.is_ascii_digit()));
/// ```
#[must_use]
pub fn generate_code() -> OtpCode {
    OtpCode::from_number(rand::rng().random_range(0..OTP_SPACE))
}

/// Draws attempts made before [`replacement_code`] falls back to the
/// successor of the previous code.
const MAX_REPLACEMENT_DRAWS: usize = 8;

/// Returns a code from `codes` that differs from `previous`.
///
/// A generator that keeps repeating `previous` is given
/// [`MAX_REPLACEMENT_DRAWS`] tries, after which `previous.successor()` is
/// used.
#[must_use]
pub fn replacement_code(codes: &dyn CodeGenerator, previous: &OtpCode) -> OtpCode {
    std::iter::repeat_with(|| codes.generate())
        .take(MAX_REPLACEMENT_DRAWS)
        .find(|code| code != previous)
        .unwrap_or_else(|| previous.successor())
}
