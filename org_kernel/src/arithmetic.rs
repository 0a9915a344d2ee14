//! OrgKernel v1 — Arithmetic Primitives
//!
//! All amounts are `u64`. Overflow and underflow are errors, never wraps.

use crate::domain::Amount;
use crate::errors::KernelError;

/// Checked amount addition.
pub fn checked_add(a: Amount, b: Amount) -> Result<Amount, KernelError> {
    a.checked_add(b)
        .ok_or_else(|| KernelError::Overflow(format!("{} + {} overflows u64", a, b)))
}

/// Checked amount subtraction.
pub fn checked_sub(a: Amount, b: Amount) -> Result<Amount, KernelError> {
    a.checked_sub(b)
        .ok_or_else(|| KernelError::Overflow(format!("{} - {} underflows", a, b)))
}

/// Sum an iterator of amounts, failing on overflow.
pub fn checked_sum<I>(amounts: I) -> Result<Amount, KernelError>
where
    I: IntoIterator<Item = Amount>,
{
    amounts.into_iter().try_fold(0, checked_add)
}

/// Validate a code artifact name: `[a-z0-9_]+`.
pub fn validate_artifact_name(name: &str) -> Result<(), KernelError> {
    if name.is_empty()
        || !name
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
    {
        return Err(KernelError::UnknownArtifact(name.to_string()));
    }
    Ok(())
}
