//! Plugin registry and verb table.
//!
//! The [`PluginRegistry`] calls plugin entry points, validates the returned
//! descriptors, and stores them under a stable [`PluginId`]. API prefixes and
//! verb names are matched ignoring ASCII case. Registered descriptors are
//! never mutated afterwards.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::descriptor::{PLUGIN_ABI_JSON, PluginDescriptor, PluginEntry};
use crate::error::PluginError;
use crate::verb::VerbDescriptor;

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// Characters that may not appear in an API or verb name.
const FORBIDDEN: &[char] = &['"', '#', '%', '&', '\'', '/', '?', '`', '\\', '\x7f'];

/// Whether `name` may be used as an API prefix or verb name.
///
/// Names must be non-empty and contain no whitespace, control characters,
/// or any of `"#%&'/?\` and backtick.
#[must_use]
pub fn is_valid_api_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c > ' ' && !c.is_control() && !c.is_whitespace() && !FORBIDDEN.contains(&c))
}

/// Stable identity of a registered plugin, used to key session contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginId(usize);

impl PluginId {
    /// Position of the plugin in registration order.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plugin #{}", self.0)
    }
}

/// A validated plugin and its verb table.
#[derive(Debug, Clone)]
pub struct RegisteredPlugin {
    id: PluginId,
    descriptor: PluginDescriptor,
    verbs: HashMap<String, usize>,
}

impl RegisteredPlugin {
    /// Identity assigned at registration.
    #[must_use]
    pub const fn id(&self) -> PluginId {
        self.id
    }

    /// API prefix as declared.
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.descriptor.prefix()
    }

    /// Plugin description.
    #[must_use]
    pub fn info(&self) -> &str {
        self.descriptor.info()
    }

    /// Verbs in declaration order.
    #[must_use]
    pub fn verbs(&self) -> &[VerbDescriptor] {
        self.descriptor.verbs()
    }

    /// Looks up a verb ignoring ASCII case.
    #[must_use]
    pub fn verb(&self, name: &str) -> Option<&VerbDescriptor> {
        self.verbs
            .get(&name.to_ascii_lowercase())
            .and_then(|index| self.descriptor.verbs().get(*index))
    }
}

/// Registry of statically linked plugins.
///
/// # Example
///
/// ```
/// use binder_plugins::{PluginDescriptor, PluginRegistry, Requirement, VerbDescriptor};
///
/// fn hello() -> PluginDescriptor {
///     PluginDescriptor::new("hello", "Greets callers").with_verb(VerbDescriptor::new(
///         "ping",
///         Requirement::NONE,
///         |request| request.success(None, Some("pong".into())),
///         "Answers pong",
///     ))
/// }
///
/// let mut registry = PluginRegistry::new();
/// let id = registry.register(hello).expect("registration succeeds");
/// let (plugin, verb) = registry.resolve("HELLO", "Ping").expect("lookup succeeds");
/// assert_eq!(plugin.id(), id);
/// assert_eq!(verb.name(), "ping");
/// ```
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    plugins: Vec<RegisteredPlugin>,
    prefixes: HashMap<String, PluginId>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls `entry` and registers the descriptor it returns.
    ///
    /// # Errors
    ///
    /// As for [`PluginRegistry::register_descriptor`].
    pub fn register(&mut self, entry: PluginEntry) -> Result<PluginId, PluginError> {
        self.register_descriptor(entry())
    }

    /// Validates and registers `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::AbiMismatch`] for a foreign ABI tag,
    /// [`PluginError::InvalidPrefix`], [`PluginError::MissingInfo`],
    /// [`PluginError::NoVerbs`], [`PluginError::InvalidVerb`] or
    /// [`PluginError::DuplicateVerb`] for a malformed descriptor, and
    /// [`PluginError::DuplicatePrefix`] when the prefix is taken.
    pub fn register_descriptor(
        &mut self,
        descriptor: PluginDescriptor,
    ) -> Result<PluginId, PluginError> {
        let verbs = validate(&descriptor)?;
        let key = descriptor.prefix().to_ascii_lowercase();
        if self.prefixes.contains_key(&key) {
            return Err(PluginError::DuplicatePrefix {
                prefix: descriptor.prefix().to_owned(),
            });
        }

        let id = PluginId(self.plugins.len());
        debug!(
            target: REGISTRY_TARGET,
            prefix = descriptor.prefix(),
            verbs = descriptor.verbs().len(),
            %id,
            "plugin registered"
        );
        self.prefixes.insert(key, id);
        self.plugins.push(RegisteredPlugin {
            id,
            descriptor,
            verbs,
        });
        Ok(id)
    }

    /// Looks up a plugin by prefix, ignoring ASCII case.
    #[must_use]
    pub fn get(&self, prefix: &str) -> Option<&RegisteredPlugin> {
        self.prefixes
            .get(&prefix.to_ascii_lowercase())
            .and_then(|id| self.plugin(*id))
    }

    /// Looks up a plugin by identity.
    #[must_use]
    pub fn plugin(&self, id: PluginId) -> Option<&RegisteredPlugin> {
        self.plugins.get(id.0)
    }

    /// Resolves `api` and `verb` to a plugin and one of its verbs.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownApi`] or [`PluginError::UnknownVerb`].
    pub fn resolve(
        &self,
        api: &str,
        verb: &str,
    ) -> Result<(&RegisteredPlugin, &VerbDescriptor), PluginError> {
        let plugin = self.get(api).ok_or_else(|| PluginError::UnknownApi {
            api: api.to_owned(),
        })?;
        let descriptor = plugin.verb(verb).ok_or_else(|| PluginError::UnknownVerb {
            api: api.to_owned(),
            verb: verb.to_owned(),
        })?;
        Ok((plugin, descriptor))
    }

    /// Registered plugins in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredPlugin> {
        self.plugins.iter()
    }

    /// Number of registered plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns `true` when no plugins are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// Checks a descriptor and builds its case-insensitive verb index.
fn validate(descriptor: &PluginDescriptor) -> Result<HashMap<String, usize>, PluginError> {
    let prefix = descriptor.prefix();
    if descriptor.abi() != PLUGIN_ABI_JSON {
        return Err(PluginError::AbiMismatch {
            prefix: prefix.to_owned(),
            found: descriptor.abi(),
            expected: PLUGIN_ABI_JSON,
        });
    }
    if !is_valid_api_name(prefix) {
        return Err(PluginError::InvalidPrefix {
            prefix: prefix.to_owned(),
        });
    }
    if descriptor.info().trim().is_empty() {
        return Err(PluginError::MissingInfo {
            prefix: prefix.to_owned(),
        });
    }
    if descriptor.verbs().is_empty() {
        return Err(PluginError::NoVerbs {
            prefix: prefix.to_owned(),
        });
    }

    let mut index = HashMap::with_capacity(descriptor.verbs().len());
    for (position, verb) in descriptor.verbs().iter().enumerate() {
        if !is_valid_api_name(verb.name()) {
            return Err(PluginError::InvalidVerb {
                prefix: prefix.to_owned(),
                verb: verb.name().to_owned(),
            });
        }
        if index
            .insert(verb.name().to_ascii_lowercase(), position)
            .is_some()
        {
            return Err(PluginError::DuplicateVerb {
                prefix: prefix.to_owned(),
                verb: verb.name().to_owned(),
            });
        }
    }
    Ok(index)
}
