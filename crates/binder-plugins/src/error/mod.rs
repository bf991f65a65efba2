//! Errors raised while registering plugins or resolving verbs.
//!
//! Registration errors carry the offending prefix so the daemon can report
//! which plugin was rejected. Lookup errors map onto the `unknown-api` and
//! `unknown-verb` failure statuses sent to clients.

use thiserror::Error;

/// Errors arising from plugin registration and lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    /// The descriptor declares an ABI tag this binder does not understand.
    #[error("plugin '{prefix}' declares ABI {found}, expected {expected}")]
    AbiMismatch {
        /// Prefix declared by the plugin.
        prefix: String,
        /// ABI tag found in the descriptor.
        found: u32,
        /// ABI tag accepted by the binder.
        expected: u32,
    },

    /// The prefix cannot be used as an API name.
    #[error("plugin prefix '{prefix}' is not a valid API name")]
    InvalidPrefix {
        /// Offending prefix.
        prefix: String,
    },

    /// The descriptor has an empty info string.
    #[error("plugin '{prefix}' has no info string")]
    MissingInfo {
        /// Prefix declared by the plugin.
        prefix: String,
    },

    /// The descriptor lists no verbs.
    #[error("plugin '{prefix}' declares no verbs")]
    NoVerbs {
        /// Prefix declared by the plugin.
        prefix: String,
    },

    /// A verb name is empty or contains forbidden characters.
    #[error("plugin '{prefix}' declares invalid verb name '{verb}'")]
    InvalidVerb {
        /// Prefix declared by the plugin.
        prefix: String,
        /// Offending verb name.
        verb: String,
    },

    /// Two verbs of one plugin share a name, ignoring ASCII case.
    #[error("plugin '{prefix}' declares verb '{verb}' more than once")]
    DuplicateVerb {
        /// Prefix declared by the plugin.
        prefix: String,
        /// Repeated verb name.
        verb: String,
    },

    /// Another plugin already uses the prefix, ignoring ASCII case.
    #[error("plugin prefix '{prefix}' is already registered")]
    DuplicatePrefix {
        /// Repeated prefix.
        prefix: String,
    },

    /// No plugin is registered under the API name.
    #[error("no API named '{api}'")]
    UnknownApi {
        /// Requested API name.
        api: String,
    },

    /// The API exists but has no such verb.
    #[error("API '{api}' has no verb '{verb}'")]
    UnknownVerb {
        /// Requested API name.
        api: String,
        /// Requested verb name.
        verb: String,
    },
}

impl PluginError {
    /// Client-facing failure status for lookup errors; registration errors
    /// never reach clients and report `internal-error`.
    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self {
            Self::UnknownApi { .. } => "unknown-api",
            Self::UnknownVerb { .. } => "unknown-verb",
            _ => "internal-error",
        }
    }
}

#[cfg(test)]
mod tests;
