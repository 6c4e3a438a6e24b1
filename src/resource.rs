//! Resource resolution.
//!
//! Maps a string location to something that can be checked for existence
//! and opened as a byte stream.
//!
//! Locations:
//! - `classpath:name`: a registered in-memory resource, else `name` under
//!   the resource root
//! - `file:path`: a filesystem path
//! - anything else: a path relative to the resource root

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CLASSPATH_PREFIX: &str = "classpath:";
const FILE_PREFIX: &str = "file:";

/// A readable resource.
pub trait Resource: Send + Sync + fmt::Debug {
    /// Human-readable description for errors and logs.
    fn description(&self) -> String;

    fn exists(&self) -> bool;

    fn open(&self) -> io::Result<Box<dyn Read + Send>>;
}

#[derive(Debug, Clone)]
pub struct FileResource {
    path: PathBuf,
}

impl FileResource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Resource for FileResource {
    fn description(&self) -> String {
        format!("file [{}]", self.path.display())
    }

    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(&self.path)?))
    }
}

/// An in-memory resource.
#[derive(Debug, Clone)]
pub struct ByteResource {
    name: String,
    bytes: Arc<[u8]>,
}

impl ByteResource {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            name: name.into(),
            bytes: Arc::from(bytes),
        }
    }
}

impl Resource for ByteResource {
    fn description(&self) -> String {
        format!("byte resource [{}]", self.name)
    }

    fn exists(&self) -> bool {
        true
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(Arc::clone(&self.bytes))))
    }
}

/// Resolves locations against a root directory and registered resources.
#[derive(Debug, Clone, Default)]
pub struct ResourceLoader {
    root: PathBuf,
    registered: HashMap<String, Arc<dyn Resource>>,
}

impl ResourceLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            registered: HashMap::new(),
        }
    }

    /// Make `resource` available as `classpath:<name>`.
    pub fn register(&mut self, name: impl Into<String>, resource: impl Resource + 'static) -> &mut Self {
        self.registered.insert(name.into(), Arc::new(resource));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, location: &str) -> Arc<dyn Resource> {
        if let Some(name) = location.strip_prefix(CLASSPATH_PREFIX) {
            let name = name.trim_start_matches('/');
            if let Some(resource) = self.registered.get(name) {
                return Arc::clone(resource);
            }
            return Arc::new(FileResource::new(self.root.join(name)));
        }
        if let Some(path) = location.strip_prefix(FILE_PREFIX) {
            return Arc::new(FileResource::new(path));
        }
        Arc::new(FileResource::new(self.root.join(location)))
    }
}
