//! Request guards: the global rate limiter and per-user quota charging.

pub mod quota;
pub mod rate_limit;

pub use quota::{charge_quota, remaining_with_warnings, try_charge};
pub use rate_limit::rate_limit_middleware;
