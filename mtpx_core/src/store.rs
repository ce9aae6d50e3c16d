//! The handle-based object store collaborator.
//!
//! The device is only reachable through opaque handles: children are
//! enumerated per parent and metadata is fetched per handle. Everything
//! else in this crate is built on top of the [`ObjectStore`] trait.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::ops::ControlFlow;
use std::time::SystemTime;
use thiserror::Error;

/// Reported in [`ObjectInfo::compressed_size`] when the real size does not
/// fit in 32 bits. The 64-bit size must be fetched with
/// [`ObjectStore::object_size`].
pub const SIZE_SENTINEL: u32 = 0xFFFF_FFFF;

/// Opaque identifier of an object in the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Handle(pub u32);

impl Handle {
    /// The root container. It has no parent and is never deleted or renamed.
    pub const ROOT: Handle = Handle(0xFFFF_FFFF);

    /// Absent handle.
    pub const NONE: Handle = Handle(0);

    /// Returns true for the root container.
    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }

    /// Returns true unless this is [`Handle::NONE`].
    pub fn is_some(self) -> bool {
        self != Self::NONE
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Identifier of one storage area on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageId(pub u32);

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Object format code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectFormat {
    /// Plain object with no declared format.
    Undefined,
    /// Directory-like container.
    Association,
    /// Any other vendor or media format code.
    Other(u16),
}

impl ObjectFormat {
    /// Returns the protocol format code.
    pub fn code(self) -> u16 {
        match self {
            ObjectFormat::Undefined => 0x3000,
            ObjectFormat::Association => 0x3001,
            ObjectFormat::Other(code) => code,
        }
    }

    /// Parse from a protocol format code.
    pub fn from_code(code: u16) -> Self {
        match code {
            0x3000 => ObjectFormat::Undefined,
            0x3001 => ObjectFormat::Association,
            other => ObjectFormat::Other(other),
        }
    }
}

/// Raw object metadata as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub storage: StorageId,
    pub format: ObjectFormat,
    pub parent: Handle,
    pub filename: String,
    /// Size in bytes, or [`SIZE_SENTINEL`] for objects of 4 GiB and more.
    pub compressed_size: u32,
    pub modified: SystemTime,
}

impl ObjectInfo {
    /// Metadata for a new directory under `parent`.
    pub fn directory(storage: StorageId, parent: Handle, name: impl Into<String>) -> Self {
        Self {
            storage,
            format: ObjectFormat::Association,
            parent,
            filename: name.into(),
            compressed_size: 0,
            modified: SystemTime::now(),
        }
    }

    /// Metadata for a new plain file under `parent`.
    ///
    /// Sizes that do not fit in 32 bits are reported as [`SIZE_SENTINEL`].
    pub fn file(storage: StorageId, parent: Handle, name: impl Into<String>, size: u64) -> Self {
        Self {
            storage,
            format: ObjectFormat::Undefined,
            parent,
            filename: name.into(),
            compressed_size: u32::try_from(size).unwrap_or(SIZE_SENTINEL),
            modified: SystemTime::now(),
        }
    }

    /// Returns true if the object is an association (directory).
    pub fn is_dir(&self) -> bool {
        self.format == ObjectFormat::Association
    }
}

/// Storage area description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInfo {
    pub id: StorageId,
    pub description: String,
    pub volume_label: String,
    pub capacity: u64,
    pub free_space: u64,
}

/// Restricts [`ObjectStore::object_handles`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleFilter {
    /// Every child regardless of format.
    All,
    /// Associations (directories) only.
    AssociationsOnly,
}

/// Errors reported by the store collaborator.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The device answered with a non-OK response code.
    #[error("device responded with code {code:#06x}")]
    Response { code: u16 },

    /// The handle does not name an object.
    #[error("invalid object handle: {handle}")]
    InvalidHandle { handle: Handle },

    /// Transport or stream failure.
    #[error("transport error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// A chunk callback asked the store to stop.
    #[error("operation cancelled")]
    Cancelled,

    /// Anything else.
    #[error("{reason}")]
    Other { reason: String },
}

/// Result type alias for collaborator calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Per-chunk progress callback: receives `(total, sent)` after every chunk.
///
/// Returning [`ControlFlow::Break`] asks the store to stop the transfer and
/// return [`StoreError::Cancelled`].
pub type ChunkProgress<'a> = &'a mut dyn FnMut(u64, u64) -> ControlFlow<()>;

/// A hierarchical object store accessed through opaque handles.
///
/// Implementations own transport, timeouts and chunking. Calls are blocking
/// and the engine never issues two of them at once.
pub trait ObjectStore {
    /// List the storage areas of the device.
    fn storages(&self) -> StoreResult<Vec<StorageInfo>>;

    /// Enumerate the immediate children of `parent`, in store order.
    fn object_handles(
        &self,
        storage: StorageId,
        parent: Handle,
        filter: HandleFilter,
    ) -> StoreResult<Vec<Handle>>;

    /// Fetch the metadata of one object.
    fn object_info(&self, handle: Handle) -> StoreResult<ObjectInfo>;

    /// Fetch the 64-bit size property of one object.
    fn object_size(&self, handle: Handle) -> StoreResult<u64>;

    /// Create a new object (metadata only) and return its handle.
    fn send_object_info(
        &self,
        storage: StorageId,
        parent: Handle,
        info: &ObjectInfo,
    ) -> StoreResult<Handle>;

    /// Stream `size` bytes from `source` into the freshly created `handle`.
    fn send_object(
        &self,
        handle: Handle,
        source: &mut dyn Read,
        size: u64,
        progress: ChunkProgress<'_>,
    ) -> StoreResult<()>;

    /// Stream the bytes of `handle` into `sink`.
    fn get_object(
        &self,
        handle: Handle,
        sink: &mut dyn Write,
        progress: ChunkProgress<'_>,
    ) -> StoreResult<()>;

    /// Delete an object. Deleting an association removes its subtree.
    fn delete_object(&self, handle: Handle) -> StoreResult<()>;

    /// Set the file name of an object.
    fn set_object_name(&self, handle: Handle, name: &str) -> StoreResult<()>;
}

impl<S: ObjectStore + ?Sized> ObjectStore for &S {
    fn storages(&self) -> StoreResult<Vec<StorageInfo>> {
        (**self).storages()
    }

    fn object_handles(
        &self,
        storage: StorageId,
        parent: Handle,
        filter: HandleFilter,
    ) -> StoreResult<Vec<Handle>> {
        (**self).object_handles(storage, parent, filter)
    }

    fn object_info(&self, handle: Handle) -> StoreResult<ObjectInfo> {
        (**self).object_info(handle)
    }

    fn object_size(&self, handle: Handle) -> StoreResult<u64> {
        (**self).object_size(handle)
    }

    fn send_object_info(
        &self,
        storage: StorageId,
        parent: Handle,
        info: &ObjectInfo,
    ) -> StoreResult<Handle> {
        (**self).send_object_info(storage, parent, info)
    }

    fn send_object(
        &self,
        handle: Handle,
        source: &mut dyn Read,
        size: u64,
        progress: ChunkProgress<'_>,
    ) -> StoreResult<()> {
        (**self).send_object(handle, source, size, progress)
    }

    fn get_object(
        &self,
        handle: Handle,
        sink: &mut dyn Write,
        progress: ChunkProgress<'_>,
    ) -> StoreResult<()> {
        (**self).get_object(handle, sink, progress)
    }

    fn delete_object(&self, handle: Handle) -> StoreResult<()> {
        (**self).delete_object(handle)
    }

    fn set_object_name(&self, handle: Handle, name: &str) -> StoreResult<()> {
        (**self).set_object_name(handle, name)
    }
}
