//! Verb descriptors: a name, its requirement, and the callback that serves it.

use std::fmt;
use std::sync::Arc;

use crate::request::Request;
use crate::requirement::Requirement;

/// Callback serving one verb.
pub type VerbCallback = Arc<dyn Fn(&mut dyn Request) + Send + Sync>;

/// Immutable registration record for one verb.
#[derive(Clone)]
pub struct VerbDescriptor {
    name: String,
    requirement: Requirement,
    callback: VerbCallback,
    description: String,
}

impl VerbDescriptor {
    /// Creates a verb descriptor.
    #[must_use]
    pub fn new<F>(
        name: impl Into<String>,
        requirement: Requirement,
        callback: F,
        description: impl Into<String>,
    ) -> Self
    where
        F: Fn(&mut dyn Request) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            requirement,
            callback: Arc::new(callback),
            description: description.into(),
        }
    }

    /// Verb name as registered.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Authorization requirement.
    #[must_use]
    pub const fn requirement(&self) -> Requirement {
        self.requirement
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Shared handle to the callback.
    #[must_use]
    pub fn callback(&self) -> VerbCallback {
        Arc::clone(&self.callback)
    }

    /// Runs the callback for `request`.
    pub fn invoke(&self, request: &mut dyn Request) {
        (self.callback)(request);
    }
}

impl fmt::Debug for VerbDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerbDescriptor")
            .field("name", &self.name)
            .field("requirement", &self.requirement)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
