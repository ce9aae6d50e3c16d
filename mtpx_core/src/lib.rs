//! # mtpx Core
//!
//! Path-addressed file operations on top of handle-based object stores.
//!
//! Media devices expose their storage as a flat set of objects reachable only
//! through opaque handles. This library turns such a store into something
//! that behaves like a filesystem: paths are resolved one segment at a time,
//! directories are created idempotently, trees are walked in pre-order and
//! whole directories are copied in either direction with progress reporting.
//!
//! ## Features
//!
//! - Case-insensitive, case-preserving path resolution
//! - Idempotent recursive directory creation
//! - Pre-order tree walks with disallowed and hidden name filtering
//! - Recursive download and upload with per-file and bulk progress
//! - 64-bit object sizes behind the 32-bit size sentinel
//! - In-memory store for tests (`mock` feature)
//!
//! ## Example
//!
//! ```no_run
//! use mtpx_core::{ObjectStore, Session, TransferOptions};
//!
//! # fn backup(store: impl ObjectStore) -> Result<(), Box<dyn std::error::Error>> {
//! // Bind to the first storage of the device
//! let session = Session::open(store)?;
//!
//! // Copy a local directory to the device
//! let summary = session.upload(&["./photos"], "/DCIM/backup", TransferOptions::preprocessed(), |p| {
//!     println!("{} {:.1}%", p.file_info.name, p.bulk_file_size.progress);
//!     Ok(())
//! })?;
//! println!("Uploaded {} files", summary.files);
//!
//! // And bring it back
//! session.download(&["/DCIM/backup/photos"], "./restored", TransferOptions::default(), |_| Ok(()))?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod local;
#[cfg(any(test, feature = "mock"))]
mod memory;
mod mkdir;
mod object;
pub mod path;
mod progress;
mod resolve;
mod session;
mod store;
mod transfer;
mod walk;

pub use config::{Config, DISALLOWED_FILES, HIDDEN_PREFIX, LOCAL_DIR_MODE};
pub use error::{Error, Result};
pub use local::make_local_directory;
#[cfg(any(test, feature = "mock"))]
pub use memory::MemoryStore;
pub use object::{DirectoryTree, FileInfo, FileProp};
pub use progress::{ProgressInfo, Totals, TransferSizeInfo, percent, transfer_rate};
pub use session::Session;
pub use store::{
    ChunkProgress, Handle, HandleFilter, ObjectFormat, ObjectInfo, ObjectStore, SIZE_SENTINEL,
    StorageId, StorageInfo, StoreError, StoreResult,
};
pub use transfer::{PartialTransfer, TransferOptions, TransferSummary};
pub use walk::{WalkOptions, WalkSummary};
