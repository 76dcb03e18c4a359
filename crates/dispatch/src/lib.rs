//! Resilient request dispatch across a pool of API keys
//!
//! Coordinates key selection, failure classification, and adaptive backoff
//! for calls against a keyed upstream API. The pool is parsed fresh from
//! the raw key string for every dispatch and exclusions are never
//! persisted, so a key sidelined by one request is back in rotation for
//! the next.
//!
//! Dispatch lifecycle:
//! 1. Parse the raw key string into a deduplicated pool
//! 2. Select a key uniformly at random and invoke the call
//! 3. Rejected key → exclude it and reselect, no delay, no retry consumed
//! 4. Rate limit → rotate to another key, or back off once the pool is down
//!    to a single key
//! 5. Provider outage → exponential backoff on the same pool
//! 6. Unrecognized failure → abort immediately
//!
//! Backoff waits honor upstream retry hints when the error message carries
//! one and otherwise grow exponentially with the attempt number, jittered
//! to keep concurrent dispatches from synchronizing.

pub mod backoff;
pub mod classify;
pub mod dispatcher;
pub mod error;
pub mod pool;

pub use backoff::BackoffPolicy;
pub use classify::{ClassifiedError, classify};
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, Result};
pub use pool::KeyPool;
