//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Audit logger: sees every request, including rejected ones
//! 2. Auth validator: token resolution through the auth cache

pub mod audit;
pub mod auth;
