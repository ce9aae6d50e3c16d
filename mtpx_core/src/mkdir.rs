//! Idempotent creation of remote directories.

use crate::error::{Error, Result};
use crate::path;
use crate::session::Session;
use crate::store::{Handle, ObjectInfo, ObjectStore};
use tracing::debug;

impl<S: ObjectStore> Session<S> {
    /// Make sure every segment of `path` exists as a directory and return
    /// the handle of the last one.
    ///
    /// Existing segments are reused, so calling this twice yields the same
    /// handle without creating anything the second time. An empty path or
    /// the root returns [`Handle::ROOT`] without a round trip. A file
    /// sitting where a directory is needed is an [`Error::InvalidPath`].
    pub fn make_directory(&self, path: &str) -> Result<Handle> {
        let normalized = path::normalize(path);
        if path::is_root(&normalized) {
            return Ok(Handle::ROOT);
        }

        let mut current = Handle::ROOT;
        for name in path::segments(&normalized) {
            current = self.make_directory_in(current, &name).map_err(|e| match e {
                Error::InvalidPath { reason, .. } => Error::invalid_path(&normalized, reason),
                other => other,
            })?;
        }

        Ok(current)
    }

    /// Return the child directory `name` of `parent`, creating it if needed.
    pub fn make_directory_in(&self, parent: Handle, name: &str) -> Result<Handle> {
        if name.is_empty() || name.contains(path::SEPARATOR) {
            return Err(Error::invalid_path(name, "not a valid directory name"));
        }

        match self.object_by_name(parent, name) {
            Ok(existing) if existing.is_dir => Ok(existing.handle),
            Ok(existing) => Err(Error::invalid_path(
                name,
                format!("a file named {:?} is in the way", existing.name),
            )),
            Err(Error::NotFound { .. }) => self.create_directory(parent, name),
            Err(e) => Err(e),
        }
    }

    fn create_directory(&self, parent: Handle, name: &str) -> Result<Handle> {
        let info = ObjectInfo::directory(self.storage(), parent, name);
        let handle = self
            .store()
            .send_object_info(self.storage(), parent, &info)
            .map_err(|e| Error::send(name, e))?;
        debug!(%parent, %handle, name, "created directory");
        Ok(handle)
    }
}
