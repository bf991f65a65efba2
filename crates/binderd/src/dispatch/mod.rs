//! Call dispatch for the binder daemon.
//!
//! Each JSONL line read from a client is decoded into a [`Call`], resolved
//! against the plugin verb table, authorized against the session registry,
//! and handed to the verb callback. The callback's reply, or a failure
//! produced by the binder itself, is returned as a [`Reply`].

mod authorize;
mod call;
mod dispatcher;
mod errors;
mod invocation;
mod reply;

pub use self::authorize::AuthorizationError;
pub use self::call::{Call, MAX_LINE_BYTES};
pub use self::dispatcher::Dispatcher;
pub use self::errors::DispatchError;
pub use self::reply::{Reply, status};

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

#[cfg(test)]
mod tests;
