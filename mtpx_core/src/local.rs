//! Local filesystem side of transfers.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::path;
use ignore::WalkBuilder;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{trace, warn};

/// One entry found while walking a local source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LocalEntry {
    pub path: PathBuf,
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/// Create a local directory and any missing parents.
///
/// On unix the new directories get `mode` (before the umask). Permission
/// failures surface as [`Error::Permission`].
pub fn make_local_directory(path: &Path, mode: u32) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    builder.create(path).map_err(|e| Error::local(path, e))
}

/// Walk a local file or directory in pre-order, sorted by name.
///
/// Symbolic links, sockets and other special files are reported and
/// skipped. Entries whose name is on the
/// disallowed list are pruned together with everything below them, the
/// source root included.
pub(crate) fn walk_local<E, F>(source: &Path, config: &Config, mut visit: F) -> std::result::Result<(), E>
where
    E: From<Error>,
    F: FnMut(&LocalEntry) -> std::result::Result<(), E>,
{
    fs::symlink_metadata(source).map_err(|e| Error::local(source, e))?;

    let disallowed = config.disallowed_files.clone();
    let walker = WalkBuilder::new(source)
        .standard_filters(false) // hidden and ignore files are transferred too
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            entry
                .file_name()
                .to_str()
                .is_none_or(|name| !disallowed.iter().any(|d| d == name))
        })
        .build();

    for entry in walker {
        let entry = entry.map_err(Error::from)?;
        let name = entry.file_name().to_string_lossy().into_owned();

        // the walker never filters its own root
        if entry.depth() == 0 && config.is_disallowed(&name) {
            trace!(path = %entry.path().display(), "skipping disallowed source");
            return Ok(());
        }

        if entry.path_is_symlink() {
            warn!(path = %entry.path().display(), "skipping symbolic link");
            continue;
        }

        let metadata = entry.metadata().map_err(Error::from)?;
        if !metadata.is_file() && !metadata.is_dir() {
            warn!(path = %entry.path().display(), "skipping special file");
            continue;
        }

        let local = LocalEntry {
            path: entry.path().to_path_buf(),
            name,
            is_dir: metadata.is_dir(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
        };
        visit(&local)?;
    }

    Ok(())
}

/// Join a remote relative path under a local destination directory.
pub(crate) fn local_destination(destination: &Path, relative: &str) -> PathBuf {
    let mut out = destination.to_path_buf();
    for segment in path::segments(relative) {
        out.push(segment);
    }
    out
}

/// Express `local` relative to `base` as a remote relative path.
///
/// Only normal components are kept, so `.` and prefixes never leak into
/// remote names.
pub(crate) fn remote_relative(local: &Path, base: &Path) -> String {
    let relative = local.strip_prefix(base).unwrap_or(local);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
