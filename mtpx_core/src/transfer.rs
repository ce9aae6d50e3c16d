//! Download and upload of whole trees.
//!
//! Every source is remapped under the destination the same way `cp -r`
//! does it: for a source root `S` with parent `P` and a destination `D`,
//! an object found at `X` lands at `D + (X - P)`. The source root keeps its
//! own name below the destination.

use crate::error::{Error, Result};
use crate::local::{self, LocalEntry};
use crate::object::{FileInfo, FileProp};
use crate::path;
use crate::progress::{ProgressInfo, ProgressTracker, Totals};
use crate::session::Session;
use crate::store::{Handle, ObjectInfo, ObjectStore, StoreResult};
use crate::walk::WalkOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::ops::ControlFlow;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Knobs for a single transfer invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferOptions {
    /// Walk every source up front to fill in the bulk totals.
    pub preprocess: bool,
    /// Totals computed earlier; takes precedence over `preprocess`.
    pub totals: Option<Totals>,
}

impl TransferOptions {
    pub fn preprocessed() -> Self {
        Self {
            preprocess: true,
            totals: None,
        }
    }
}

/// What a transfer actually moved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSummary {
    /// Handle of the remote destination directory (uploads only).
    pub destination: Option<Handle>,
    pub files: u64,
    pub directories: u64,
    pub size: u64,
}

/// A transfer that stopped early.
///
/// Nothing is rolled back: `summary` counts what was completed before
/// `source` happened.
#[derive(Error, Debug)]
#[error("transfer stopped after {} files and {} directories: {source}", .summary.files, .summary.directories)]
pub struct PartialTransfer {
    pub summary: TransferSummary,
    #[source]
    pub source: Error,
}

/// Why a walk-and-transfer stopped.
enum Interrupt {
    /// The progress callback failed. Its error is handed back as is.
    Callback(Error),
    Failure(Error),
}

impl From<Error> for Interrupt {
    fn from(err: Error) -> Self {
        Interrupt::Failure(err)
    }
}

impl Interrupt {
    fn into_error(self, action: &str) -> Error {
        match self {
            Interrupt::Callback(err) => err,
            Interrupt::Failure(err) => classify(err, action),
        }
    }
}

/// Keep errors the caller can act on and wrap device failures.
fn classify(err: Error, action: &str) -> Error {
    match err {
        err @ (Error::InvalidPath { .. }
        | Error::Permission { .. }
        | Error::LocalFile { .. }
        | Error::Transfer { .. }) => err,
        other => Error::transfer(format!("an error occurred while {} files", action), other),
    }
}

/// Run one streaming call, feeding every chunk report to the tracker and
/// the caller's callback.
///
/// A failing callback breaks the stream; its error wins over whatever the
/// store returns afterwards.
fn stream_chunks<F, T>(
    tracker: &mut ProgressTracker,
    on_progress: &mut F,
    op: impl FnOnce(&mut dyn FnMut(u64, u64) -> ControlFlow<()>) -> StoreResult<T>,
) -> std::result::Result<StoreResult<T>, Interrupt>
where
    F: FnMut(&ProgressInfo) -> Result<()>,
{
    let mut callback_error: Option<Error> = None;
    let result = op(&mut |total: u64, sent: u64| {
        if callback_error.is_some() {
            return ControlFlow::Break(());
        }
        tracker.chunk(total, sent);
        trace!(total, sent, "chunk");
        match on_progress(tracker.info()) {
            Ok(()) => ControlFlow::Continue(()),
            Err(err) => {
                callback_error = Some(err);
                ControlFlow::Break(())
            }
        }
    });

    match callback_error {
        Some(err) => Err(Interrupt::Callback(err)),
        None => Ok(result),
    }
}

/// Close the active file, emitting the completion callback if the store
/// never reported it.
fn finish_file<F>(tracker: &mut ProgressTracker, on_progress: &mut F) -> std::result::Result<(), Interrupt>
where
    F: FnMut(&ProgressInfo) -> Result<()>,
{
    if tracker.complete_file() {
        on_progress(tracker.info()).map_err(Interrupt::Callback)?;
    }
    Ok(())
}

impl<S: ObjectStore> Session<S> {
    /// Copy remote trees into the local directory `destination`.
    ///
    /// Each source may be a file or a directory. Disallowed names are
    /// skipped; hidden files are not. Files are written to a temporary file
    /// next to the target and moved into place once complete.
    pub fn download<Q, F>(
        &self,
        sources: &[Q],
        destination: impl AsRef<Path>,
        options: TransferOptions,
        mut on_progress: F,
    ) -> std::result::Result<TransferSummary, PartialTransfer>
    where
        Q: AsRef<str>,
        F: FnMut(&ProgressInfo) -> Result<()>,
    {
        let destination = destination.as_ref();
        let mut summary = TransferSummary::default();

        let totals = self
            .transfer_totals(options, || self.preprocess_remote(sources))
            .and_then(|totals| {
                local::make_local_directory(destination, self.config().local_dir_mode)?;
                Ok(totals)
            })
            .map_err(|e| PartialTransfer {
                summary,
                source: classify(e, "downloading"),
            })?;

        info!(sources = sources.len(), destination = %destination.display(), "download started");
        let mut tracker = ProgressTracker::new(totals);
        for source in sources {
            if let Err(interrupt) = self.download_source(
                source.as_ref(),
                destination,
                &mut tracker,
                &mut summary,
                &mut on_progress,
            ) {
                let source = interrupt.into_error("downloading");
                warn!(files = summary.files, error = %source, "download stopped");
                return Err(PartialTransfer { summary, source });
            }
        }

        info!(files = summary.files, directories = summary.directories, size = summary.size, "download finished");
        Ok(summary)
    }

    fn download_source<F>(
        &self,
        source: &str,
        destination: &Path,
        tracker: &mut ProgressTracker,
        summary: &mut TransferSummary,
        on_progress: &mut F,
    ) -> std::result::Result<(), Interrupt>
    where
        F: FnMut(&ProgressInfo) -> Result<()>,
    {
        let source = path::normalize(source);
        let source_parent = path::parent(&source);
        let root = self.resolve_path(&source)?;
        if self.config().is_disallowed(&root.name) {
            debug!(path = %source, "skipping disallowed source");
            return Ok(());
        }
        let mode = self.config().local_dir_mode;

        if root.is_dir {
            let relative = path::relative_to(&source, &source_parent).unwrap_or_default();
            local::make_local_directory(&local::local_destination(destination, &relative), mode)?;
            summary.directories += 1;
            tracker.directory_sent();
        }

        let target = FileProp::new(root.handle, source.as_str());
        self.walk(&target, WalkOptions::recursive().skip_disallowed(), |fi| -> std::result::Result<(), Interrupt> {
            let relative = path::relative_to(&fi.full_path, &source_parent)
                .unwrap_or_else(|| fi.name.clone());
            let local_path = local::local_destination(destination, &relative);

            if fi.is_dir {
                local::make_local_directory(&local_path, mode)?;
                summary.directories += 1;
                tracker.directory_sent();
                return Ok(());
            }

            self.download_file(fi, &local_path, tracker, on_progress)?;
            summary.files += 1;
            summary.size += fi.size;
            finish_file(tracker, on_progress)
        })?;

        Ok(())
    }

    fn download_file<F>(
        &self,
        fi: &FileInfo,
        local_path: &Path,
        tracker: &mut ProgressTracker,
        on_progress: &mut F,
    ) -> std::result::Result<(), Interrupt>
    where
        F: FnMut(&ProgressInfo) -> Result<()>,
    {
        let parent = local_path.parent().unwrap_or(Path::new("."));
        if !parent.exists() {
            local::make_local_directory(parent, self.config().local_dir_mode)?;
        }

        let mut temp = NamedTempFile::new_in(parent).map_err(|e| Error::local(parent, e))?;
        tracker.begin_file(fi.clone());
        stream_chunks(tracker, on_progress, |chunk| {
            self.store().get_object(fi.handle, &mut temp, chunk)
        })?
        .map_err(|e| Error::object_access(fi.handle, e))?;

        temp.flush().map_err(|e| Error::local(temp.path(), e))?;
        temp.persist(local_path)
            .map_err(|e| Error::local(local_path, e.error))?;

        debug!(handle = %fi.handle, path = %local_path.display(), size = fi.size, "downloaded file");
        Ok(())
    }

    /// Copy local files or directories into the remote directory
    /// `destination`, creating it if needed.
    ///
    /// Symbolic links are never followed or copied. Disallowed names are
    /// skipped together with their subtrees. An existing remote file with
    /// the same name is replaced unless [`Config::overwrite`] is off.
    ///
    /// [`Config::overwrite`]: crate::Config::overwrite
    pub fn upload<P, F>(
        &self,
        sources: &[P],
        destination: &str,
        options: TransferOptions,
        mut on_progress: F,
    ) -> std::result::Result<TransferSummary, PartialTransfer>
    where
        P: AsRef<Path>,
        F: FnMut(&ProgressInfo) -> Result<()>,
    {
        let destination = path::normalize(destination);
        let mut summary = TransferSummary::default();

        let (totals, destination_handle) = self
            .transfer_totals(options, || self.preprocess_local(sources))
            .and_then(|totals| Ok((totals, self.make_directory(&destination)?)))
            .map_err(|e| PartialTransfer {
                summary,
                source: classify(e, "uploading"),
            })?;
        summary.destination = Some(destination_handle);

        info!(sources = sources.len(), destination = %destination, "upload started");
        let mut tracker = ProgressTracker::new(totals);
        let mut created = HashMap::from([(destination.clone(), destination_handle)]);
        for source in sources {
            if let Err(interrupt) = self.upload_source(
                source.as_ref(),
                &destination,
                &mut created,
                &mut tracker,
                &mut summary,
                &mut on_progress,
            ) {
                let source = interrupt.into_error("uploading");
                warn!(files = summary.files, error = %source, "upload stopped");
                return Err(PartialTransfer { summary, source });
            }
        }

        info!(files = summary.files, directories = summary.directories, size = summary.size, "upload finished");
        Ok(summary)
    }

    fn upload_source<F>(
        &self,
        source: &Path,
        destination: &str,
        created: &mut HashMap<String, Handle>,
        tracker: &mut ProgressTracker,
        summary: &mut TransferSummary,
        on_progress: &mut F,
    ) -> std::result::Result<(), Interrupt>
    where
        F: FnMut(&ProgressInfo) -> Result<()>,
    {
        let source_parent = source.parent().unwrap_or(Path::new(""));

        local::walk_local(source, self.config(), |entry| -> std::result::Result<(), Interrupt> {
            let relative = local::remote_relative(&entry.path, source_parent);
            let (remote_parent, remote_path) =
                path::map_source_to_destination(&relative, path::ROOT, destination);

            if entry.is_dir {
                let handle = match created.get(&remote_parent) {
                    Some(&parent) => self.make_directory_in(parent, &entry.name)?,
                    None => self.make_directory(&remote_path)?,
                };
                created.insert(remote_path, handle);
                summary.directories += 1;
                tracker.directory_sent();
                return Ok(());
            }

            let parent = match created.get(&remote_parent) {
                Some(&parent) => parent,
                None => {
                    let parent = self.make_directory(&remote_parent)?;
                    created.insert(remote_parent.clone(), parent);
                    parent
                }
            };

            self.upload_file(entry, parent, &remote_parent, tracker, on_progress)?;
            summary.files += 1;
            summary.size += entry.size;
            finish_file(tracker, on_progress)
        })
    }

    fn upload_file<F>(
        &self,
        entry: &LocalEntry,
        parent: Handle,
        parent_path: &str,
        tracker: &mut ProgressTracker,
        on_progress: &mut F,
    ) -> std::result::Result<Handle, Interrupt>
    where
        F: FnMut(&ProgressInfo) -> Result<()>,
    {
        let mut file = fs::File::open(&entry.path).map_err(|e| Error::local(&entry.path, e))?;
        let info = ObjectInfo::file(self.storage(), parent, &entry.name, entry.size);

        // the existing copy goes only once the replacement is readable
        self.clear_upload_target(parent, parent_path, &entry.name)?;
        let handle = self
            .store()
            .send_object_info(self.storage(), parent, &info)
            .map_err(|e| Error::send(&entry.name, e))?;

        tracker.begin_file(FileInfo::from_object_info(handle, &info, entry.size, parent_path));
        stream_chunks(tracker, on_progress, |chunk| {
            self.store().send_object(handle, &mut file, entry.size, chunk)
        })?
        .map_err(|e| Error::send(&entry.name, e))?;

        debug!(%handle, path = %entry.path.display(), size = entry.size, "uploaded file");
        Ok(handle)
    }

    /// Make room for a new file named `name` under `parent`.
    fn clear_upload_target(&self, parent: Handle, parent_path: &str, name: &str) -> Result<()> {
        let existing = match self.object_by_name_in(parent, parent_path, name) {
            Ok(existing) => existing,
            Err(Error::NotFound { .. }) => return Ok(()),
            Err(e) => return Err(e),
        };

        let remote_path = path::join(parent_path, name);
        if existing.is_dir {
            return Err(Error::invalid_path(remote_path, "a directory with the same name exists"));
        }
        if !self.config().overwrite {
            return Err(Error::invalid_path(remote_path, "the file already exists"));
        }

        self.store()
            .delete_object(existing.handle)
            .map_err(|e| Error::object_access(existing.handle, e))?;
        debug!(handle = %existing.handle, path = %remote_path, "replaced existing file");
        Ok(())
    }

    /// Count what uploading `sources` would transfer.
    pub fn preprocess_local<P: AsRef<Path>>(&self, sources: &[P]) -> Result<Totals> {
        let mut totals = Totals::default();
        for source in sources {
            local::walk_local(source.as_ref(), self.config(), |entry| -> Result<()> {
                if entry.is_dir {
                    totals.directories += 1;
                } else {
                    totals.files += 1;
                    totals.size += entry.size;
                }
                Ok(())
            })?;
        }
        debug!(files = totals.files, directories = totals.directories, size = totals.size, "preprocessed local sources");
        Ok(totals)
    }

    /// Count what downloading `sources` would transfer.
    pub fn preprocess_remote<Q: AsRef<str>>(&self, sources: &[Q]) -> Result<Totals> {
        let mut totals = Totals::default();
        for source in sources {
            let source = path::normalize(source.as_ref());
            let root = self.resolve_path(&source)?;
            if self.config().is_disallowed(&root.name) {
                continue;
            }
            if root.is_dir {
                totals.directories += 1;
            }

            let target = FileProp::new(root.handle, source.as_str());
            self.walk(&target, WalkOptions::recursive().skip_disallowed(), |fi| -> Result<()> {
                if fi.is_dir {
                    totals.directories += 1;
                } else {
                    totals.files += 1;
                    totals.size += fi.size;
                }
                Ok(())
            })?;
        }
        debug!(files = totals.files, directories = totals.directories, size = totals.size, "preprocessed remote sources");
        Ok(totals)
    }

    fn transfer_totals(&self, options: TransferOptions, compute: impl FnOnce() -> Result<Totals>) -> Result<Totals> {
        match (options.totals, options.preprocess) {
            (Some(totals), _) => Ok(totals),
            (None, true) => compute(),
            (None, false) => Ok(Totals::default()),
        }
    }
}
