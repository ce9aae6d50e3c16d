//! Object descriptors and references.

use crate::path;
use crate::store::{Handle, ObjectInfo};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Full description of one remote object.
///
/// `full_path` and `parent_path` are only meaningful when the descriptor was
/// produced by path resolution or by walking from a known parent path. A
/// lookup by handle alone cannot recover the ancestor names and leaves them
/// empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub handle: Handle,
    pub parent_handle: Handle,
    pub name: String,
    pub extension: String,
    pub size: u64,
    pub is_dir: bool,
    pub modified: SystemTime,
    pub full_path: String,
    pub parent_path: String,
}

impl FileInfo {
    /// Descriptor of the storage root.
    pub fn root() -> Self {
        Self {
            handle: Handle::ROOT,
            parent_handle: Handle::NONE,
            name: String::new(),
            extension: String::new(),
            size: 0,
            is_dir: true,
            modified: SystemTime::UNIX_EPOCH,
            full_path: path::ROOT.to_string(),
            parent_path: String::new(),
        }
    }

    /// Build a descriptor from raw metadata and an already resolved size.
    ///
    /// An empty `parent_path` marks the path as unknown.
    pub fn from_object_info(handle: Handle, info: &ObjectInfo, size: u64, parent_path: &str) -> Self {
        let is_dir = info.is_dir();
        let (full_path, parent_path) = if parent_path.is_empty() {
            (String::new(), String::new())
        } else {
            let parent_path = path::normalize(parent_path);
            (path::join(&parent_path, &info.filename), parent_path)
        };

        Self {
            handle,
            parent_handle: info.parent,
            name: info.filename.clone(),
            extension: path::extension(&info.filename, is_dir),
            size,
            is_dir,
            modified: info.modified,
            full_path,
            parent_path,
        }
    }

    /// Overwrite the path fields with a known full path.
    pub(crate) fn with_full_path(mut self, full_path: &str) -> Self {
        let full_path = path::normalize(full_path);
        self.parent_path = if path::is_root(&full_path) {
            String::new()
        } else {
            path::parent(&full_path)
        };
        self.full_path = full_path;
        self
    }

    /// Returns true if the path fields are known.
    pub fn has_path(&self) -> bool {
        !self.full_path.is_empty()
    }
}

/// Reference to a remote object by handle, by path, or both.
///
/// A non-zero handle is authoritative; the path is then only used to label
/// the result. At least one of the two must be present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileProp {
    pub handle: Option<Handle>,
    pub path: Option<String>,
}

impl FileProp {
    /// Reference by handle and path.
    pub fn new(handle: Handle, path: impl Into<String>) -> Self {
        Self {
            handle: Some(handle),
            path: Some(path.into()),
        }
    }

    /// Reference by handle only.
    pub fn handle(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
            path: None,
        }
    }

    /// Reference by path only.
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            handle: None,
            path: Some(path.into()),
        }
    }

    /// The handle, if present and non-zero.
    pub fn valid_handle(&self) -> Option<Handle> {
        self.handle.filter(|h| h.is_some())
    }

    /// The path, if present and non-empty.
    pub fn valid_path(&self) -> Option<&str> {
        self.path.as_deref().filter(|p| !p.is_empty())
    }

    /// Returns true if neither a handle nor a path is present.
    pub fn is_empty(&self) -> bool {
        self.valid_handle().is_none() && self.valid_path().is_none()
    }

    /// Human-readable label for error messages.
    pub fn label(&self) -> String {
        match (self.valid_path(), self.valid_handle()) {
            (Some(p), _) => p.to_string(),
            (None, Some(h)) => h.to_string(),
            (None, None) => String::new(),
        }
    }
}

impl From<&str> for FileProp {
    fn from(path: &str) -> Self {
        FileProp::path(path)
    }
}

impl From<String> for FileProp {
    fn from(path: String) -> Self {
        FileProp::path(path)
    }
}

impl From<Handle> for FileProp {
    fn from(handle: Handle) -> Self {
        FileProp::handle(handle)
    }
}

/// A directory listing with its nested children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryTree {
    pub info: FileInfo,
    pub children: Vec<DirectoryTree>,
}

impl DirectoryTree {
    /// Number of objects below this node.
    pub fn len(&self) -> usize {
        self.children.iter().map(|c| 1 + c.len()).sum()
    }

    /// Returns true if the node has no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}
