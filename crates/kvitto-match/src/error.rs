use kvitto_core::AmountError;
use kvitto_provider::ProviderError;
use thiserror::Error;

/// A verification that could not be carried out.
///
/// Deliberately disjoint from a "verified no match" [`kvitto_core::MatchResult`]:
/// callers must never mistake "we could not check" for "no purchase
/// happened".
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The provider could not answer in time (transient failure or
    /// deadline hit). Safe to retry.
    #[error("provider unavailable: {reason}")]
    ProviderUnavailable { reason: String },

    /// A non-transient provider failure.
    #[error(transparent)]
    Provider(ProviderError),

    /// The claimed amount cannot be expressed in minor units.
    #[error(transparent)]
    Amount(#[from] AmountError),
}

impl From<ProviderError> for VerifyError {
    fn from(err: ProviderError) -> Self {
        if err.is_transient() {
            VerifyError::ProviderUnavailable {
                reason: err.to_string(),
            }
        } else {
            VerifyError::Provider(err)
        }
    }
}
