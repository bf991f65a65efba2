//! Plugin-private state attached to a session.
//!
//! A [`Context`] is either [`Context::Owned`], whose value is released
//! through its destructor exactly once when the context is dropped, or
//! [`Context::Unmanaged`], a shared handle the session never releases beyond
//! dropping its own reference.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

type Destructor = Box<dyn FnOnce(Box<dyn Any + Send>) + Send>;

/// Context value released through a destructor.
pub struct OwnedContext {
    value: Option<Box<dyn Any + Send>>,
    destructor: Option<Destructor>,
}

impl OwnedContext {
    /// Wraps `value`; the default destructor drops it.
    #[must_use]
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            value: Some(Box::new(value)),
            destructor: None,
        }
    }

    /// Wraps `value` with a destructor invoked once on release.
    #[must_use]
    pub fn with_destructor<T, F>(value: T, destructor: F) -> Self
    where
        T: Any + Send,
        F: FnOnce(T) + Send + 'static,
    {
        let release: Destructor = Box::new(move |boxed: Box<dyn Any + Send>| {
            if let Ok(value) = boxed.downcast::<T>() {
                destructor(*value);
            }
        });
        Self {
            value: Some(Box::new(value)),
            destructor: Some(release),
        }
    }

    /// Borrows the value as `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.as_ref().and_then(|value| value.downcast_ref())
    }

    /// Mutably borrows the value as `T`.
    #[must_use]
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.value.as_mut().and_then(|value| value.downcast_mut())
    }
}

impl Drop for OwnedContext {
    fn drop(&mut self) {
        let Some(value) = self.value.take() else {
            return;
        };
        match self.destructor.take() {
            Some(destructor) => destructor(value),
            None => drop(value),
        }
    }
}

impl fmt::Debug for OwnedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedContext")
            .field("custom_destructor", &self.destructor.is_some())
            .finish_non_exhaustive()
    }
}

/// Plugin-private payload stored per (session, plugin) pair.
///
/// # Example
///
/// ```
/// use binder_plugins::Context;
///
/// let mut context = Context::owned(3_u32);
/// if let Some(count) = context.downcast_mut::<u32>() {
///     *count += 1;
/// }
/// assert_eq!(context.downcast_ref::<u32>(), Some(&4));
/// ```
pub enum Context {
    /// Released through its destructor when dropped.
    Owned(OwnedContext),
    /// Shared with the plugin; never passed to a destructor.
    Unmanaged(Arc<dyn Any + Send + Sync>),
}

impl Context {
    /// Owned context released by dropping `value`.
    #[must_use]
    pub fn owned<T: Any + Send>(value: T) -> Self {
        Self::Owned(OwnedContext::new(value))
    }

    /// Owned context released by `destructor`.
    #[must_use]
    pub fn owned_with<T, F>(value: T, destructor: F) -> Self
    where
        T: Any + Send,
        F: FnOnce(T) + Send + 'static,
    {
        Self::Owned(OwnedContext::with_destructor(value, destructor))
    }

    /// Unmanaged context sharing `value` with the plugin.
    #[must_use]
    pub fn unmanaged<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self::Unmanaged(value)
    }

    /// Borrows the payload as `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Owned(owned) => owned.downcast_ref(),
            Self::Unmanaged(shared) => shared.as_ref().downcast_ref(),
        }
    }

    /// Mutably borrows the payload as `T`. Unmanaged payloads are shared and
    /// never yield a mutable borrow.
    #[must_use]
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        match self {
            Self::Owned(owned) => owned.downcast_mut(),
            Self::Unmanaged(_) => None,
        }
    }

    /// Whether the context is released through a destructor.
    #[must_use]
    pub const fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owned(owned) => f.debug_tuple("Owned").field(owned).finish(),
            Self::Unmanaged(_) => f.debug_tuple("Unmanaged").finish_non_exhaustive(),
        }
    }
}
