//! Queue structures: the ready set, retry delays, and the backoff policy.

mod delay;
mod ready;
mod retry;

pub(crate) use delay::{DelayQueue, DueEntry};
pub(crate) use ready::ReadyQueue;
pub use retry::RetryPolicy;
