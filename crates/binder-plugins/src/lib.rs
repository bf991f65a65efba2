//! Plugin ABI for the binder.
//!
//! A plugin is a statically linked entry point returning a
//! [`PluginDescriptor`]: an ABI tag, an info string, the API prefix its verbs
//! live under, and an ordered list of [`VerbDescriptor`]s. Each verb carries a
//! [`Requirement`] bitmask that the daemon evaluates against the caller's
//! session before the callback runs.
//!
//! Callbacks see the call through the [`Request`] trait: they read arguments,
//! reply with success or failure, manage their per-session [`Context`], may
//! raise or lower the session's level of assurance, and may end the session.
//!
//! # Example
//!
//! ```
//! use binder_plugins::{
//!     Context, PluginDescriptor, PluginRegistry, Request, Requirement, VerbDescriptor,
//! };
//!
//! fn counter() -> PluginDescriptor {
//!     PluginDescriptor::new("counter", "Counts calls per session").with_verb(VerbDescriptor::new(
//!         "bump",
//!         Requirement::CHECK,
//!         |request: &mut dyn Request| {
//!             let next = request
//!                 .context()
//!                 .and_then(|context| context.downcast_ref::<u64>())
//!                 .map_or(1, |count| count + 1);
//!             match request.set_context(Context::owned(next)) {
//!                 Ok(()) => request.success(Some(next.into()), None),
//!                 Err(error) => request.fail("failed", Some(error.to_string())),
//!             }
//!         },
//!         "Increments the session counter",
//!     ))
//! }
//!
//! let mut registry = PluginRegistry::new();
//! registry.register(counter).expect("registration succeeds");
//! ```

mod context;
mod descriptor;
pub mod error;
pub mod registry;
mod request;
mod requirement;
mod verb;

pub use self::context::{Context, OwnedContext};
pub use self::descriptor::{PLUGIN_ABI_JSON, PluginDescriptor, PluginEntry};
pub use self::error::PluginError;
pub use self::registry::{PluginId, PluginRegistry, RegisteredPlugin, is_valid_api_name};
pub use self::request::{Argument, Request, RequestError};
pub use self::requirement::{LoaOperator, MAX_LEVEL_OF_ASSURANCE, Requirement};
pub use self::verb::{VerbCallback, VerbDescriptor};
