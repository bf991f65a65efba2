//! The descriptor a plugin entry point hands to the binder.

use crate::verb::VerbDescriptor;

/// ABI tag of descriptors whose verbs answer with JSON payloads.
pub const PLUGIN_ABI_JSON: u32 = 123_456_789;

/// Entry point exported by a statically linked plugin.
pub type PluginEntry = fn() -> PluginDescriptor;

/// Everything a plugin declares about itself at registration.
///
/// # Example
///
/// ```
/// use binder_plugins::{PluginDescriptor, Requirement, VerbDescriptor, PLUGIN_ABI_JSON};
///
/// let descriptor = PluginDescriptor::new("hello", "Greets callers").with_verb(
///     VerbDescriptor::new("ping", Requirement::NONE, |request| request.success(None, None), "Ping"),
/// );
/// assert_eq!(descriptor.abi(), PLUGIN_ABI_JSON);
/// assert_eq!(descriptor.verbs().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    abi: u32,
    info: String,
    prefix: String,
    verbs: Vec<VerbDescriptor>,
}

impl PluginDescriptor {
    /// Creates a descriptor with the JSON ABI tag and no verbs.
    #[must_use]
    pub fn new(prefix: impl Into<String>, info: impl Into<String>) -> Self {
        Self {
            abi: PLUGIN_ABI_JSON,
            info: info.into(),
            prefix: prefix.into(),
            verbs: Vec::new(),
        }
    }

    /// Overrides the ABI tag.
    #[must_use]
    pub const fn with_abi(mut self, abi: u32) -> Self {
        self.abi = abi;
        self
    }

    /// Appends a verb, keeping declaration order.
    #[must_use]
    pub fn with_verb(mut self, verb: VerbDescriptor) -> Self {
        self.verbs.push(verb);
        self
    }

    /// ABI tag identifying the descriptor layout.
    #[must_use]
    pub const fn abi(&self) -> u32 {
        self.abi
    }

    /// Human-readable description of the plugin.
    #[must_use]
    pub fn info(&self) -> &str {
        &self.info
    }

    /// API name under which the verbs are exposed.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Verbs in declaration order.
    #[must_use]
    pub fn verbs(&self) -> &[VerbDescriptor] {
        &self.verbs
    }
}
