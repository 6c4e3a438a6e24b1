//! Hierarchical configuration scopes.
//!
//! A scope is an ordered list of [`PropertySource`]s (first wins) with an
//! optional parent. Lookups that miss every local source fall through to the
//! parent chain. The source list is swapped copy-on-write so readers never
//! block on a writer adding a layer.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::source::{PropertyKey, PropertySource, PropertyValue};

#[derive(Debug)]
pub struct ConfigScope {
    name: String,
    sources: ArcSwap<Vec<Arc<PropertySource>>>,
    parent: Option<Arc<ConfigScope>>,
}

impl ConfigScope {
    /// Create a root scope with no sources.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            sources: ArcSwap::from_pointee(Vec::new()),
            parent: None,
        })
    }

    /// Create a scope nested under `parent`.
    pub fn child(parent: &Arc<ConfigScope>, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            sources: ArcSwap::from_pointee(Vec::new()),
            parent: Some(Arc::clone(parent)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<ConfigScope>> {
        self.parent.as_ref()
    }

    /// This scope followed by every ancestor, nearest first.
    pub fn self_and_ancestors(&self) -> impl Iterator<Item = &ConfigScope> {
        std::iter::successors(Some(self), |scope| scope.parent.as_deref())
    }

    /// Current sources, highest precedence first.
    pub fn sources(&self) -> Arc<Vec<Arc<PropertySource>>> {
        self.sources.load_full()
    }

    /// Add a source with the highest precedence.
    pub fn add_first(&self, source: PropertySource) -> Arc<PropertySource> {
        let source = Arc::new(source);
        self.sources.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.push(Arc::clone(&source));
            next.extend(current.iter().cloned());
            next
        });
        source
    }

    /// Add a source with the lowest precedence.
    pub fn add_last(&self, source: PropertySource) -> Arc<PropertySource> {
        let source = Arc::new(source);
        self.sources.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(Arc::clone(&source));
            next
        });
        source
    }

    /// Look up a source by name.
    pub fn get_source(&self, name: &str) -> Option<Arc<PropertySource>> {
        self.sources
            .load()
            .iter()
            .find(|s| s.name() == name)
            .cloned()
    }

    /// Return the named source, inserting an empty one at the front if absent.
    ///
    /// The first insertion wins; later callers get the existing source.
    pub fn get_or_insert_first(&self, name: &str) -> Arc<PropertySource> {
        let candidate = Arc::new(PropertySource::new(name));
        let previous = self.sources.rcu(|current| {
            if current.iter().any(|s| s.name() == name) {
                return Arc::clone(current);
            }
            let mut next = Vec::with_capacity(current.len() + 1);
            next.push(Arc::clone(&candidate));
            next.extend(current.iter().cloned());
            Arc::new(next)
        });
        previous
            .iter()
            .find(|s| s.name() == name)
            .cloned()
            .unwrap_or(candidate)
    }

    /// Resolve a key locally, then through the parent chain.
    pub fn resolve(&self, key: &PropertyKey) -> Option<PropertyValue> {
        self.self_and_ancestors()
            .find_map(|scope| scope.resolve_local(key))
    }

    /// Resolve a key against this scope's own sources only.
    pub fn resolve_local(&self, key: &PropertyKey) -> Option<PropertyValue> {
        self.sources.load().iter().find_map(|s| s.get(key))
    }

    /// Shorthand for `resolve(&PropertyKey::new(key))`.
    pub fn get(&self, key: &str) -> Option<PropertyValue> {
        self.resolve(&PropertyKey::new(key))
    }
}
