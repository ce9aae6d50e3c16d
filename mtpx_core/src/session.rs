//! Session binding a store to one storage area.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::object::{DirectoryTree, FileInfo, FileProp};
use crate::store::{Handle, HandleFilter, ObjectStore, StorageId, StorageInfo, StoreError};
use tracing::debug;

/// Path-addressed access to one storage of a handle-based object store.
///
/// Every operation is synchronous and issues one collaborator call at a
/// time. Nothing is cached between calls: the device is the source of truth
/// and can change underneath us.
#[derive(Debug)]
pub struct Session<S> {
    store: S,
    storage: StorageId,
    config: Config,
}

impl<S: ObjectStore> Session<S> {
    /// Create a session for a known storage.
    pub fn new(store: S, storage: StorageId) -> Self {
        Self {
            store,
            storage,
            config: Config::default(),
        }
    }

    /// Create a session on the first storage reported by the store.
    pub fn open(store: S) -> Result<Self> {
        let storages = store
            .storages()
            .map_err(|e| Error::object_access(Handle::ROOT, e))?;
        let first = storages.first().ok_or(Error::NoStorage)?;
        debug!(storage = %first.id, description = %first.description, "opened storage");
        Ok(Self::new(store, first.id))
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The storage this session operates on.
    pub fn storage(&self) -> StorageId {
        self.storage
    }

    /// The active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Give the store back.
    pub fn into_inner(self) -> S {
        self.store
    }

    /// List every storage of the device.
    pub fn storages(&self) -> Result<Vec<StorageInfo>> {
        let storages = self
            .store
            .storages()
            .map_err(|e| Error::object_access(Handle::ROOT, e))?;
        if storages.is_empty() {
            return Err(Error::NoStorage);
        }
        Ok(storages)
    }

    /// Look up an object, returning `None` when it does not exist.
    ///
    /// Only "does not exist" is folded into `None`: a missing path or a
    /// handle the store does not know. Transport failures are still reported.
    pub fn file_exists(&self, prop: &FileProp) -> Result<Option<FileInfo>> {
        match self.resolve(prop) {
            Ok(fi) => Ok(Some(fi)),
            Err(Error::InvalidPath { .. }) | Err(Error::NotFound { .. }) => Ok(None),
            Err(Error::ObjectAccess {
                handle,
                source: StoreError::InvalidHandle { .. },
            }) if prop.valid_handle() == Some(handle) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Delete a file or directory. Deleting a missing object is a no-op.
    pub fn delete_file(&self, prop: &FileProp) -> Result<()> {
        let Some(fi) = self.file_exists(prop)? else {
            debug!(target = %prop.label(), "delete skipped, object does not exist");
            return Ok(());
        };

        if fi.handle.is_root() {
            return Err(Error::invalid_path(prop.label(), "the storage root cannot be deleted"));
        }

        self.store
            .delete_object(fi.handle)
            .map_err(|e| Error::object_access(fi.handle, e))?;
        debug!(handle = %fi.handle, path = %fi.full_path, "deleted object");
        Ok(())
    }

    /// Rename a file or directory and return its handle.
    ///
    /// Renaming onto the current name succeeds without touching the device.
    pub fn rename_file(&self, prop: &FileProp, new_name: &str) -> Result<Handle> {
        if new_name.is_empty() || new_name.contains(crate::path::SEPARATOR) {
            return Err(Error::invalid_path(new_name, "not a valid file name"));
        }

        let Some(fi) = self.file_exists(prop)? else {
            return Err(Error::invalid_path(prop.label(), "file not found"));
        };

        if fi.handle.is_root() {
            return Err(Error::invalid_path(prop.label(), "the storage root cannot be renamed"));
        }

        if fi.name == new_name {
            return Ok(fi.handle);
        }

        self.store
            .set_object_name(fi.handle, new_name)
            .map_err(|e| Error::object_access(fi.handle, e))?;
        debug!(handle = %fi.handle, from = %fi.name, to = new_name, "renamed object");
        Ok(fi.handle)
    }

    /// Fetch a directory and all of its descendants.
    pub fn directory_tree(&self, prop: &FileProp) -> Result<DirectoryTree> {
        let root = self.resolve_directory(prop)?;
        let mut tree = DirectoryTree {
            info: root,
            children: Vec::new(),
        };
        self.fill_directory_tree(&mut tree)?;
        Ok(tree)
    }

    fn fill_directory_tree(&self, node: &mut DirectoryTree) -> Result<()> {
        for fi in self.list_children(&node.info, HandleFilter::All)? {
            let mut child = DirectoryTree {
                info: fi,
                children: Vec::new(),
            };
            if child.info.is_dir {
                self.fill_directory_tree(&mut child)?;
            }
            node.children.push(child);
        }
        Ok(())
    }

    /// List the sub-directories directly under a directory.
    pub fn list_directories(&self, prop: &FileProp) -> Result<Vec<FileInfo>> {
        let dir = self.resolve_directory(prop)?;
        self.list_children(&dir, HandleFilter::AssociationsOnly)
    }
}
