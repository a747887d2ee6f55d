//! Named channel lookup across a scope tree (spec.md §7).
//!
//! A [`Scope`] is a node in a tree; each node owns a name -> channel map and
//! an optional link to its parent. Lookup walks Local -> Parent -> ... ->
//! root ("Global"), matching spec.md's "Local, Parent, Global" resolution
//! order. Creation is always local: [`Scope::get_or_create`] never reaches
//! into a parent, only lookup does.
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::channel::AnyChannel;

struct ScopeInner {
    parent: Option<Scope>,
    entries: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    channels: Mutex<HashMap<String, Arc<dyn AnyChannel>>>,
}

/// A node in the scope tree. Cheap to clone (an `Arc` handle).
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// Creates a new root scope with no parent.
    pub fn root() -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                parent: None,
                entries: Mutex::new(HashMap::new()),
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Creates a child scope whose lookups fall back to `self`.
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                parent: Some(self.clone()),
                entries: Mutex::new(HashMap::new()),
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Looks up `name`, walking from this scope up through ancestors.
    pub fn find<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        let mut scope = self;
        let owned;
        loop {
            if let Some(value) = scope.inner.entries.lock().unwrap().get(name) {
                return value.clone().downcast::<T>().ok();
            }
            match &scope.inner.parent {
                Some(parent) => {
                    owned = parent.clone();
                    scope = &owned;
                }
                None => return None,
            }
        }
    }

    /// Returns the entry named `name` in *this* scope (no parent walk),
    /// creating it via `factory` if absent. Concurrent calls for the same
    /// name on the same scope are serialized; only one `factory` runs.
    pub fn get_or_create<T, F>(&self, name: &str, factory: F) -> Arc<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let mut entries = self.inner.entries.lock().unwrap();
        if let Some(existing) = entries.get(name) {
            return existing
                .clone()
                .downcast::<T>()
                .unwrap_or_else(|_| panic!("Scope::get_or_create: type mismatch for '{name}'"));
        }
        let value = Arc::new(factory());
        entries.insert(name.to_string(), value.clone());
        value
    }

    /// Registers a channel by name in this scope, for lookup via
    /// [`Scope::find_channel`] elsewhere in the tree.
    pub fn register_channel(&self, name: &str, channel: Arc<dyn AnyChannel>) {
        self.inner
            .channels
            .lock()
            .unwrap()
            .insert(name.to_string(), channel);
    }

    /// Looks up a channel by name, walking Local -> Parent -> ... -> root.
    pub fn find_channel(&self, name: &str) -> Option<Arc<dyn AnyChannel>> {
        let mut scope = self;
        let owned;
        loop {
            if let Some(channel) = scope.inner.channels.lock().unwrap().get(name) {
                return Some(channel.clone());
            }
            match &scope.inner.parent {
                Some(parent) => {
                    owned = parent.clone();
                    scope = &owned;
                }
                None => return None,
            }
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_falls_back_to_parent() {
        let root = Scope::root();
        root.get_or_create("counter", || 1i32);
        let child = root.child();
        let found: Arc<i32> = child.find("counter").unwrap();
        assert_eq!(*found, 1);
    }

    #[test]
    fn local_entry_shadows_parent() {
        let root = Scope::root();
        root.get_or_create("counter", || 1i32);
        let child = root.child();
        child.get_or_create("counter", || 2i32);
        let found: Arc<i32> = child.find("counter").unwrap();
        assert_eq!(*found, 2);
        let root_found: Arc<i32> = root.find("counter").unwrap();
        assert_eq!(*root_found, 1);
    }

    #[test]
    fn missing_name_resolves_to_none() {
        let root = Scope::root();
        assert!(root.find::<i32>("missing").is_none());
    }

    #[test]
    fn channel_registered_in_parent_is_visible_to_child() {
        use crate::channel::Channel;
        let root = Scope::root();
        let channel: Channel<i32> = Channel::new();
        root.register_channel("orders", Arc::new(channel));
        let child = root.child();
        assert!(child.find_channel("orders").is_some());
        assert!(child.find_channel("missing").is_none());
    }
}
