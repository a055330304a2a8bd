//! Transaction reconciliation: short-TTL transaction cache and the
//! amount/time-tolerant purchase matcher.

pub mod cache;
mod error;
pub mod matcher;

pub use cache::{CacheStats, TransactionCache, WindowKey};
pub use error::VerifyError;
pub use matcher::{Matcher, PurchaseClaim, TransactionSource};
