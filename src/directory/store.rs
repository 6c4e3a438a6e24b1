//! In-memory entry store.
//!
//! # Responsibilities
//! - Hold entries under the configured naming contexts (base DNs)
//! - Enforce tree structure and, optionally, the schema on every add
//! - Import LDIF atomically: stage the whole file, then swap
//! - Answer base, one-level and subtree searches
//!
//! # Design Decisions
//! - Readers load an immutable snapshot (`arc-swap`) and never block
//! - Writers are serialised by a mutex and publish a new snapshot

use std::collections::BTreeMap;
use std::io::BufRead;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::directory::entry::{Dn, Entry};
use crate::directory::filter::Filter;
use crate::directory::ldif::{LdifError, LdifReader};
use crate::directory::schema::{Schema, SchemaError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entry '{0}' already exists")]
    AlreadyExists(String),

    #[error("parent of '{0}' does not exist")]
    NoSuchParent(String),

    #[error("entry '{0}' is outside every base DN")]
    OutsideNamingContexts(String),

    #[error("no such object '{0}'")]
    NoSuchObject(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Ldif(#[from] LdifError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Base,
    OneLevel,
    Subtree,
}

/// Entries returned by a search, with whether the size limit cut it short.
#[derive(Debug, Default)]
pub struct SearchResult {
    pub entries: Vec<Arc<Entry>>,
    pub size_limit_exceeded: bool,
}

type Snapshot = BTreeMap<String, Arc<Entry>>;

#[derive(Debug)]
pub struct DirectoryStore {
    base_dns: Vec<Dn>,
    schema: Option<Arc<Schema>>,
    entries: ArcSwap<Snapshot>,
    write_lock: Mutex<()>,
}

impl DirectoryStore {
    pub fn new(base_dns: Vec<Dn>, schema: Option<Arc<Schema>>) -> Self {
        Self {
            base_dns,
            schema,
            entries: ArcSwap::from_pointee(Snapshot::new()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn base_dns(&self) -> &[Dn] {
        &self.base_dns
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, dn: &Dn) -> Option<Arc<Entry>> {
        self.entries.load().get(&dn.normalized()).cloned()
    }

    /// Add one entry.
    pub fn add(&self, entry: Entry) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut staged = Snapshot::clone(&self.entries.load());
        self.insert_into(&mut staged, entry)?;
        self.entries.store(Arc::new(staged));
        Ok(())
    }

    /// Replace the store's content with the entries of an LDIF stream.
    ///
    /// Nothing changes unless every entry is read and accepted. Returns the
    /// number of imported entries.
    pub fn import_ldif<R: BufRead>(&self, input: R) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut staged = Snapshot::new();
        let mut reader = LdifReader::new(input);
        while let Some(entry) = reader.read_entry()? {
            self.insert_into(&mut staged, entry)?;
        }
        let count = staged.len();
        self.entries.store(Arc::new(staged));
        Ok(count)
    }

    pub fn search(
        &self,
        base: &Dn,
        scope: SearchScope,
        filter: &Filter,
        size_limit: usize,
    ) -> Result<SearchResult, StoreError> {
        let snapshot = self.entries.load();
        if !base.is_root() && !snapshot.contains_key(&base.normalized()) {
            return Err(StoreError::NoSuchObject(base.to_string()));
        }

        let in_scope = |entry: &Entry| match scope {
            SearchScope::Base => entry.dn() == base,
            SearchScope::OneLevel => entry.dn().is_child_of(base),
            SearchScope::Subtree => entry.dn().is_descendant_of(base),
        };

        let mut result = SearchResult::default();
        for entry in snapshot.values() {
            let entry: &Arc<Entry> = entry;
            if !in_scope(entry.as_ref()) || !filter.matches(entry) {
                continue;
            }
            if size_limit > 0 && result.entries.len() == size_limit {
                result.size_limit_exceeded = true;
                break;
            }
            result.entries.push(Arc::clone(entry));
        }
        Ok(result)
    }

    fn insert_into(&self, staged: &mut Snapshot, entry: Entry) -> Result<(), StoreError> {
        let dn = entry.dn();
        let key = dn.normalized();
        if !self.base_dns.iter().any(|base| dn.is_descendant_of(base)) {
            return Err(StoreError::OutsideNamingContexts(dn.to_string()));
        }
        if staged.contains_key(&key) {
            return Err(StoreError::AlreadyExists(dn.to_string()));
        }
        let is_base = self.base_dns.iter().any(|base| base == dn);
        if !is_base {
            let parent = dn.parent().map(|p| p.normalized()).unwrap_or_default();
            if !staged.contains_key(&parent) {
                return Err(StoreError::NoSuchParent(dn.to_string()));
            }
        }
        if let Some(schema) = &self.schema {
            schema.validate_entry(&entry)?;
        }
        staged.insert(key, Arc::new(entry));
        Ok(())
    }
}
