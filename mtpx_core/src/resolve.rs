//! Path resolution by walking the handle chain from the root.
//!
//! The store has no "resolve this path" primitive. A path is resolved one
//! segment at a time: list the children of the current handle, scan them
//! for a case-insensitive name match and descend. That is one listing round
//! trip per segment plus one metadata fetch per inspected child.

use crate::error::{Error, Result};
use crate::object::{FileInfo, FileProp};
use crate::path;
use crate::session::Session;
use crate::store::{Handle, HandleFilter, ObjectInfo, ObjectStore, SIZE_SENTINEL, StoreError};
use tracing::{debug, trace};

impl<S: ObjectStore> Session<S> {
    /// Resolve a path to a full descriptor.
    ///
    /// The path is normalized first; the root resolves without touching the
    /// device. A missing segment, or a file in the middle of the path, is an
    /// [`Error::InvalidPath`]. The returned descriptor carries the
    /// normalized path as its `full_path`.
    pub fn resolve_path(&self, path: &str) -> Result<FileInfo> {
        let normalized = path::normalize(path);
        if normalized == path::ROOT {
            return Ok(FileInfo::root());
        }

        let mut current = FileInfo::root();
        for name in path::segments(&normalized) {
            if !current.is_dir {
                return Err(Error::invalid_path(
                    &normalized,
                    format!("{:?} is not a directory", current.name),
                ));
            }

            current = self
                .object_by_name_in(current.handle, &current.full_path, &name)
                .map_err(|e| e.into_invalid_path(&normalized))?;
        }

        debug!(path = %normalized, handle = %current.handle, "resolved path");
        Ok(current.with_full_path(&normalized))
    }

    /// Find a child of `parent` by name (case-insensitive).
    ///
    /// Uses a single listing call. Fails with [`Error::NotFound`] when no
    /// child matches. The descriptor's path fields are left empty because
    /// the parent's path is unknown here; see [`Session::object_by_name_in`].
    pub fn object_by_name(&self, parent: Handle, name: &str) -> Result<FileInfo> {
        self.object_by_name_in(parent, "", name)
    }

    /// Find a child of `parent` by name, labelling it relative to
    /// `parent_path`.
    pub fn object_by_name_in(&self, parent: Handle, parent_path: &str, name: &str) -> Result<FileInfo> {
        let handles = self
            .store()
            .object_handles(self.storage(), parent, HandleFilter::All)
            .map_err(|e| Error::object_access(parent, e))?;

        for handle in handles {
            let info = self
                .store()
                .object_info(handle)
                .map_err(|e| Error::object_access(handle, e))?;

            if path::names_match(&info.filename, name) {
                trace!(%parent, %handle, name = %info.filename, "matched child");
                let size = self.resolve_size(handle, &info)?;
                return Ok(FileInfo::from_object_info(handle, &info, size, parent_path));
            }
        }

        Err(Error::not_found(parent, name))
    }

    /// Fetch the descriptor of one handle.
    ///
    /// `parent_path` labels the result; pass an empty string when it is not
    /// known. The root handle is answered locally.
    pub fn object_from_handle(&self, handle: Handle, parent_path: &str) -> Result<FileInfo> {
        if handle.is_root() {
            return Ok(FileInfo::root());
        }

        let info = self
            .store()
            .object_info(handle)
            .map_err(|e| Error::object_access(handle, e))?;
        let size = self.resolve_size(handle, &info)?;
        Ok(FileInfo::from_object_info(handle, &info, size, parent_path))
    }

    /// Resolve a handle-or-path reference.
    ///
    /// A non-zero handle is trusted as is and path resolution is skipped;
    /// a path given alongside it only labels the result. With neither, this
    /// fails immediately.
    pub fn resolve(&self, prop: &FileProp) -> Result<FileInfo> {
        if let Some(handle) = prop.valid_handle() {
            let fi = self.object_from_handle(handle, "")?;
            return Ok(match prop.valid_path() {
                Some(p) if !handle.is_root() => fi.with_full_path(p),
                _ => fi,
            });
        }

        match prop.valid_path() {
            Some(p) => self.resolve_path(p),
            None => Err(Error::invalid_path("", "neither a handle nor a path was given")),
        }
    }

    /// Resolve a reference that must name a directory.
    pub fn resolve_directory(&self, prop: &FileProp) -> Result<FileInfo> {
        let fi = self.resolve(prop)?;
        if !fi.is_dir {
            return Err(Error::invalid_path(prop.label(), "the object is not a directory"));
        }
        Ok(fi)
    }

    /// List the children of an already resolved directory.
    pub(crate) fn list_children(&self, dir: &FileInfo, filter: HandleFilter) -> Result<Vec<FileInfo>> {
        let handles = self
            .store()
            .object_handles(self.storage(), dir.handle, filter)
            .map_err(|e| Error::object_access(dir.handle, e))?;

        handles
            .into_iter()
            .map(|handle| self.object_from_handle(handle, &dir.full_path))
            .collect()
    }

    /// Size of an object, following the 32-bit sentinel to the 64-bit
    /// size property.
    fn resolve_size(&self, handle: Handle, info: &ObjectInfo) -> Result<u64> {
        if info.compressed_size != SIZE_SENTINEL {
            return Ok(u64::from(info.compressed_size));
        }

        let size = self
            .store()
            .object_size(handle)
            .map_err(|e| Error::object_access(handle, e))?;
        if size == u64::from(SIZE_SENTINEL) {
            return Err(Error::object_access(
                handle,
                StoreError::Other {
                    reason: "size property reports the 32-bit sentinel".to_string(),
                },
            ));
        }

        trace!(%handle, size, "resolved 64-bit size");
        Ok(size)
    }
}
