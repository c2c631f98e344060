//! The algorithmic core of the governance layer: both in-memory stores and
//! the key-derivation functions. Everything here is synchronous, takes time
//! as a parameter, and is owned exclusively by the governor actor at
//! runtime.

mod cache;
pub mod keys;
mod rate_limit;

pub use cache::ResponseCache;
pub use rate_limit::{RateLimitDecision, RateLimitStore};

#[cfg(test)]
mod cache_tests;
#[cfg(test)]
mod tests;
