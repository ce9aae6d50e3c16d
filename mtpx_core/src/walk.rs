//! Recursive traversal of remote directories.

use crate::error::Error;
use crate::object::{FileInfo, FileProp};
use crate::session::Session;
use crate::store::{Handle, HandleFilter, ObjectStore};
use tracing::{debug, trace};

/// Controls which objects a walk visits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkOptions {
    /// Descend into sub-directories.
    pub recursive: bool,
    /// Skip objects whose name is on the configured disallowed list.
    pub skip_disallowed: bool,
    /// Skip objects whose name starts with the hidden prefix.
    pub skip_hidden: bool,
}

impl WalkOptions {
    /// Only the immediate children.
    pub fn shallow() -> Self {
        Self::default()
    }

    /// The whole subtree.
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            ..Self::default()
        }
    }

    pub fn skip_disallowed(mut self) -> Self {
        self.skip_disallowed = true;
        self
    }

    pub fn skip_hidden(mut self) -> Self {
        self.skip_hidden = true;
        self
    }
}

/// Counts of what a walk visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkSummary {
    /// Handle the walk started from.
    pub root: Handle,
    pub total_files: u64,
    pub total_directories: u64,
}

impl WalkSummary {
    fn new(root: Handle) -> Self {
        Self {
            root,
            total_files: 0,
            total_directories: 0,
        }
    }

    /// Number of callbacks issued.
    pub fn total(&self) -> u64 {
        self.total_files + self.total_directories
    }
}

impl<S: ObjectStore> Session<S> {
    /// Visit every object below `target` in pre-order.
    ///
    /// A directory root is not reported itself; its children are, each
    /// directory before its contents. A file root is reported once. The
    /// first error returned by `on_entry` stops the walk and is handed back
    /// unchanged, so callers can use their own error type as long as it can
    /// carry an [`Error`].
    pub fn walk<E, F>(&self, target: &FileProp, options: WalkOptions, mut on_entry: F) -> Result<WalkSummary, E>
    where
        E: From<Error>,
        F: FnMut(&FileInfo) -> Result<(), E>,
    {
        let root = self.resolve(target)?;

        if options.skip_disallowed && self.config().is_disallowed(&root.name) {
            return Err(Error::invalid_path(
                target.label(),
                format!("{:?} is on the disallowed list", root.name),
            )
            .into());
        }

        let mut summary = WalkSummary::new(root.handle);
        if !root.is_dir {
            on_entry(&root)?;
            summary.total_files = 1;
            return Ok(summary);
        }

        self.walk_children(&root, options, &mut on_entry, &mut summary)?;
        debug!(
            root = %root.handle,
            files = summary.total_files,
            directories = summary.total_directories,
            "walk finished"
        );
        Ok(summary)
    }

    fn walk_children<E, F>(
        &self,
        dir: &FileInfo,
        options: WalkOptions,
        on_entry: &mut F,
        summary: &mut WalkSummary,
    ) -> Result<(), E>
    where
        E: From<Error>,
        F: FnMut(&FileInfo) -> Result<(), E>,
    {
        let handles = self
            .store()
            .object_handles(self.storage(), dir.handle, HandleFilter::All)
            .map_err(|e| Error::object_access(dir.handle, e))?;

        for handle in handles {
            let fi = self.object_from_handle(handle, &dir.full_path)?;

            if options.skip_disallowed && self.config().is_disallowed(&fi.name) {
                trace!(path = %fi.full_path, "skipping disallowed object");
                continue;
            }
            if options.skip_hidden && self.config().is_hidden(&fi.name) {
                trace!(path = %fi.full_path, "skipping hidden object");
                continue;
            }

            on_entry(&fi)?;

            if fi.is_dir {
                summary.total_directories += 1;
                if options.recursive {
                    self.walk_children(&fi, options, on_entry, summary)?;
                }
            } else {
                summary.total_files += 1;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::memory::MemoryStore;

    fn fixture() -> MemoryStore {
        MemoryStore::with_files([
            ("mtp-test-files/a.txt", "hello"),
            ("mtp-test-files/mock_dir1/1/a.txt", "1234567"),
            ("mtp-test-files/mock_dir1/2/b.txt", "1234567"),
            ("mtp-test-files/mock_dir1/3/2/b.txt", "1234567"),
            ("mtp-test-files/mock_dir1/3/b.txt", "1234567"),
            ("mtp-test-files/mock_dir1/a.txt", "1234567"),
        ])
    }

    fn collect(session: &Session<&MemoryStore>, target: &str, options: WalkOptions) -> (Vec<String>, WalkSummary) {
        let mut visited = Vec::new();
        let summary = session
            .walk(&target.into(), options, |fi| -> Result<()> {
                visited.push(fi.full_path.clone());
                Ok(())
            })
            .unwrap();
        (visited, summary)
    }

    #[test]
    fn test_walk_recursive_pre_order() {
        let store = fixture();
        let session = Session::new(&store, MemoryStore::STORAGE);

        let (visited, summary) = collect(&session, "/mtp-test-files/mock_dir1", WalkOptions::recursive());
        let expected: Vec<String> = [
            "1", "1/a.txt", "2", "2/b.txt", "3", "3/2", "3/2/b.txt", "3/b.txt", "a.txt",
        ]
        .iter()
        .map(|p| format!("/mtp-test-files/mock_dir1/{}", p))
        .collect();

        assert_eq!(visited, expected);
        assert_eq!(summary.total_files, 5);
        assert_eq!(summary.total_directories, 4);
        assert_eq!(summary.total(), visited.len() as u64);
    }

    #[test]
    fn test_walk_shallow() {
        let store = fixture();
        let session = Session::new(&store, MemoryStore::STORAGE);

        let (visited, summary) = collect(&session, "/mtp-test-files/mock_dir1", WalkOptions::shallow());
        assert_eq!(visited.len(), 4);
        assert_eq!(summary.total_directories, 3);
        assert_eq!(summary.total_files, 1);
    }

    #[test]
    fn test_walk_file_root() {
        let store = fixture();
        let session = Session::new(&store, MemoryStore::STORAGE);

        let (visited, summary) = collect(&session, "/mtp-test-files/a.txt", WalkOptions::recursive());
        assert_eq!(visited, vec!["/mtp-test-files/a.txt"]);
        assert_eq!(summary.total_files, 1);
        assert_eq!(summary.total_directories, 0);
    }

    #[test]
    fn test_walk_skips_disallowed() {
        let store = MemoryStore::with_files([
            ("docs/a.txt", "a"),
            ("docs/.DS_Store", "junk"),
            ("docs/mtpx-disallowed-test-file/inner.txt", "b"),
        ]);
        let session = Session::new(&store, MemoryStore::STORAGE);

        let (visited, summary) = collect(&session, "/docs", WalkOptions::recursive().skip_disallowed());
        assert_eq!(visited, vec!["/docs/a.txt"]);
        assert_eq!(summary.total(), 1);

        let (visited, _) = collect(&session, "/docs", WalkOptions::recursive());
        assert_eq!(visited.len(), 4);
    }

    #[test]
    fn test_walk_disallowed_root_is_invalid_path() {
        let store = MemoryStore::with_files([("docs/.DS_Store", "junk")]);
        let session = Session::new(&store, MemoryStore::STORAGE);

        let err = session
            .walk(&"/docs/.DS_Store".into(), WalkOptions::recursive().skip_disallowed(), |_| -> Result<()> {
                Ok(())
            })
            .unwrap_err();
        assert!(err.is_invalid_path());
    }

    #[test]
    fn test_walk_skips_hidden() {
        let store = MemoryStore::with_files([("docs/a.txt", "a"), ("docs/.git/config", "x")]);
        let session = Session::new(&store, MemoryStore::STORAGE);

        let (visited, _) = collect(&session, "/docs", WalkOptions::recursive().skip_hidden());
        assert_eq!(visited, vec!["/docs/a.txt"]);
    }

    #[test]
    fn test_walk_callback_error_stops_walk() {
        let store = fixture();
        let session = Session::new(&store, MemoryStore::STORAGE);

        let mut seen = 0;
        let err = session
            .walk(&"/mtp-test-files/mock_dir1".into(), WalkOptions::recursive(), |fi| {
                seen += 1;
                if fi.name == "2" {
                    return Err(Error::invalid_path(&fi.full_path, "stop here"));
                }
                Ok(())
            })
            .unwrap_err();

        assert_eq!(seen, 3);
        match err {
            Error::InvalidPath { reason, .. } => assert_eq!(reason, "stop here"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_walk_missing_root() {
        let store = fixture();
        let session = Session::new(&store, MemoryStore::STORAGE);

        let err = session
            .walk(&"/nope".into(), WalkOptions::recursive(), |_| -> Result<()> { Ok(()) })
            .unwrap_err();
        assert!(err.is_invalid_path());
    }

    #[test]
    fn test_walk_root_directory() {
        let store = fixture();
        let session = Session::new(&store, MemoryStore::STORAGE);

        let (visited, summary) = collect(&session, "/", WalkOptions::recursive());
        assert_eq!(visited[0], "/mtp-test-files");
        assert_eq!(summary.total_files, 6);
        assert_eq!(summary.total_directories, 6);
        assert_eq!(summary.total(), visited.len() as u64);
    }
}
