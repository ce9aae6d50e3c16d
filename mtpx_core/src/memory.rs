//! In-memory object store for testing.

use crate::path;
use crate::store::{
    ChunkProgress, Handle, HandleFilter, ObjectInfo, ObjectStore, SIZE_SENTINEL, StorageId,
    StorageInfo, StoreError, StoreResult,
};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::ops::ControlFlow;

const DEFAULT_CHUNK_SIZE: usize = 4;

#[derive(Debug)]
struct Node {
    info: ObjectInfo,
    data: Vec<u8>,
    /// Reported by `object_size`; the metadata then carries the sentinel.
    size_property: Option<u64>,
}

#[derive(Debug)]
struct State {
    nodes: BTreeMap<Handle, Node>,
    next_handle: u32,
    storages: Vec<StorageInfo>,
    chunk_size: usize,
    round_trips: u64,
    renames: u64,
    creations: u64,
    fail_listings: bool,
    fail_lookups: bool,
    fail_creations: bool,
    fail_transfers_after: Option<u64>,
    misreport_progress: bool,
}

/// Device-like object store kept entirely in memory.
///
/// Handles are allocated in creation order and children are listed in that
/// order. Every trait call counts as one round trip. Knobs allow tests to
/// inject failures and odd progress reporting.
///
/// Only available with the `mock` feature.
#[derive(Debug)]
pub struct MemoryStore {
    state: RefCell<State>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            state: RefCell::new(State {
                nodes: BTreeMap::new(),
                next_handle: 1,
                storages: vec![StorageInfo {
                    id: Self::STORAGE,
                    description: "Internal shared storage".to_string(),
                    volume_label: String::new(),
                    capacity: 64 << 30,
                    free_space: 32 << 30,
                }],
                chunk_size: DEFAULT_CHUNK_SIZE,
                round_trips: 0,
                renames: 0,
                creations: 0,
                fail_listings: false,
                fail_lookups: false,
                fail_creations: false,
                fail_transfers_after: None,
                misreport_progress: false,
            }),
        }
    }
}

impl MemoryStore {
    /// The single storage of a default store.
    pub const STORAGE: StorageId = StorageId(0x0001_0001);

    /// Create a store pre-populated with files, creating directories as
    /// needed.
    ///
    /// Panics if a path runs through an existing file. If test setup is
    /// wrong, then the test should not pass.
    pub fn with_files<P, C>(files: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: AsRef<str>,
        C: AsRef<[u8]>,
    {
        let store = Self::default();
        for (file_path, data) in files {
            let mut segments = path::segments(file_path.as_ref());
            let Some(name) = segments.pop() else {
                panic!("MemoryStore::with_files: empty path");
            };

            let mut parent = Handle::ROOT;
            for segment in segments {
                parent = match store.child_named(parent, &segment) {
                    Some((handle, true)) => handle,
                    Some((_, false)) => {
                        panic!("MemoryStore::with_files: {:?} runs through a file", file_path.as_ref())
                    }
                    None => store.add_dir(parent, &segment),
                };
            }

            match store.child_named(parent, &name) {
                Some((handle, false)) => {
                    let mut state = store.state.borrow_mut();
                    if let Some(node) = state.nodes.get_mut(&handle) {
                        node.data = data.as_ref().to_vec();
                        node.info.compressed_size = data.as_ref().len() as u32;
                    }
                }
                Some((_, true)) => {
                    panic!("MemoryStore::with_files: {:?} is a directory", file_path.as_ref())
                }
                None => {
                    store.add_file(parent, &name, data.as_ref());
                }
            }
        }
        store
    }

    /// Drop every storage, as a locked or empty device would report.
    pub fn without_storages(self) -> Self {
        self.state.borrow_mut().storages.clear();
        self
    }

    /// Report transfers in chunks of `size` bytes.
    pub fn with_chunk_size(self, size: usize) -> Self {
        self.state.borrow_mut().chunk_size = size.max(1);
        self
    }

    /// Add a directory without counting a round trip.
    pub fn add_dir(&self, parent: Handle, name: &str) -> Handle {
        let info = ObjectInfo::directory(Self::STORAGE, parent, name);
        self.insert(info, Vec::new())
    }

    /// Add a file without counting a round trip.
    pub fn add_file(&self, parent: Handle, name: &str, data: impl Into<Vec<u8>>) -> Handle {
        let data = data.into();
        let info = ObjectInfo::file(Self::STORAGE, parent, name, data.len() as u64);
        self.insert(info, data)
    }

    /// Make `handle` report the 32-bit size sentinel and answer `size` (or
    /// the real length when `None`) from the size property.
    pub fn report_size_sentinel(&self, handle: Handle, size: Option<u64>) {
        let mut state = self.state.borrow_mut();
        if let Some(node) = state.nodes.get_mut(&handle) {
            node.size_property = Some(size.unwrap_or(node.data.len() as u64));
        }
    }

    /// Fail every listing call.
    pub fn fail_listings(&self, fail: bool) {
        self.state.borrow_mut().fail_listings = fail;
    }

    /// Fail every object metadata fetch.
    pub fn fail_lookups(&self, fail: bool) {
        self.state.borrow_mut().fail_lookups = fail;
    }

    /// Fail every object creation.
    pub fn fail_creations(&self, fail: bool) {
        self.state.borrow_mut().fail_creations = fail;
    }

    /// Fail any transfer once it moves past `bytes` bytes of one object.
    pub fn fail_transfers_after(&self, bytes: Option<u64>) {
        self.state.borrow_mut().fail_transfers_after = bytes;
    }

    /// Report every chunk twice, the second time going backwards, and skip
    /// the report for the last chunk.
    pub fn misreport_progress(&self, misreport: bool) {
        self.state.borrow_mut().misreport_progress = misreport;
    }

    /// Number of trait calls so far.
    pub fn round_trips(&self) -> u64 {
        self.state.borrow().round_trips
    }

    /// Number of successful renames.
    pub fn renames(&self) -> u64 {
        self.state.borrow().renames
    }

    /// Number of objects created through the trait.
    pub fn creations(&self) -> u64 {
        self.state.borrow().creations
    }

    /// Find an object by exact, case-sensitive path.
    pub fn find(&self, object_path: &str) -> Option<Handle> {
        let mut current = Handle::ROOT;
        for segment in path::segments(object_path) {
            current = self.child_named(current, &segment)?.0;
        }
        Some(current)
    }

    /// Contents of the file at `object_path`.
    pub fn contents(&self, object_path: &str) -> Option<Vec<u8>> {
        let handle = self.find(object_path)?;
        let state = self.state.borrow();
        state
            .nodes
            .get(&handle)
            .filter(|node| !node.info.is_dir())
            .map(|node| node.data.clone())
    }

    /// Names of the children of `parent`, in listing order.
    pub fn names(&self, parent: Handle) -> Vec<String> {
        let state = self.state.borrow();
        state
            .nodes
            .values()
            .filter(|node| node.info.parent == parent)
            .map(|node| node.info.filename.clone())
            .collect()
    }

    fn insert(&self, mut info: ObjectInfo, data: Vec<u8>) -> Handle {
        let mut state = self.state.borrow_mut();
        let handle = Handle(state.next_handle);
        state.next_handle += 1;
        info.storage = Self::STORAGE;
        state.nodes.insert(
            handle,
            Node {
                info,
                data,
                size_property: None,
            },
        );
        handle
    }

    /// Exact-name child lookup: `(handle, is_dir)`.
    fn child_named(&self, parent: Handle, name: &str) -> Option<(Handle, bool)> {
        let state = self.state.borrow();
        state
            .nodes
            .iter()
            .find(|(_, node)| node.info.parent == parent && node.info.filename == name)
            .map(|(handle, node)| (*handle, node.info.is_dir()))
    }

    fn count_round_trip(&self) {
        self.state.borrow_mut().round_trips += 1;
    }

    fn check_parent(state: &State, storage: StorageId, parent: Handle) -> StoreResult<()> {
        if !state.storages.iter().any(|s| s.id == storage) {
            return Err(StoreError::Response { code: 0x2008 });
        }
        if parent.is_root() {
            return Ok(());
        }
        match state.nodes.get(&parent) {
            Some(node) if node.info.is_dir() => Ok(()),
            Some(_) => Err(StoreError::Response { code: 0x201A }),
            None => Err(StoreError::InvalidHandle { handle: parent }),
        }
    }

    /// Settings that apply to one streaming call.
    fn stream_settings(&self) -> (usize, Option<u64>, bool) {
        let state = self.state.borrow();
        (state.chunk_size, state.fail_transfers_after, state.misreport_progress)
    }
}

fn report(progress: &mut dyn FnMut(u64, u64) -> ControlFlow<()>, total: u64, sent: u64) -> StoreResult<()> {
    match progress(total, sent) {
        ControlFlow::Continue(()) => Ok(()),
        ControlFlow::Break(()) => Err(StoreError::Cancelled),
    }
}

fn check_fail_point(fail_after: Option<u64>, sent: u64) -> StoreResult<()> {
    match fail_after {
        Some(limit) if sent > limit => Err(StoreError::Io {
            source: io::Error::new(io::ErrorKind::ConnectionReset, "device disconnected"),
        }),
        _ => Ok(()),
    }
}

impl ObjectStore for MemoryStore {
    fn storages(&self) -> StoreResult<Vec<StorageInfo>> {
        self.count_round_trip();
        Ok(self.state.borrow().storages.clone())
    }

    fn object_handles(
        &self,
        storage: StorageId,
        parent: Handle,
        filter: HandleFilter,
    ) -> StoreResult<Vec<Handle>> {
        self.count_round_trip();
        let state = self.state.borrow();
        if state.fail_listings {
            return Err(StoreError::Response { code: 0x2002 });
        }
        Self::check_parent(&state, storage, parent)?;

        Ok(state
            .nodes
            .iter()
            .filter(|(_, node)| node.info.parent == parent)
            .filter(|(_, node)| filter == HandleFilter::All || node.info.is_dir())
            .map(|(handle, _)| *handle)
            .collect())
    }

    fn object_info(&self, handle: Handle) -> StoreResult<ObjectInfo> {
        self.count_round_trip();
        let state = self.state.borrow();
        if state.fail_lookups {
            return Err(StoreError::Response { code: 0x2002 });
        }
        let node = state
            .nodes
            .get(&handle)
            .ok_or(StoreError::InvalidHandle { handle })?;

        let mut info = node.info.clone();
        if node.size_property.is_some() {
            info.compressed_size = SIZE_SENTINEL;
        }
        Ok(info)
    }

    fn object_size(&self, handle: Handle) -> StoreResult<u64> {
        self.count_round_trip();
        let state = self.state.borrow();
        let node = state
            .nodes
            .get(&handle)
            .ok_or(StoreError::InvalidHandle { handle })?;
        Ok(node.size_property.unwrap_or(node.data.len() as u64))
    }

    fn send_object_info(
        &self,
        storage: StorageId,
        parent: Handle,
        info: &ObjectInfo,
    ) -> StoreResult<Handle> {
        self.count_round_trip();
        {
            let state = self.state.borrow();
            if state.fail_creations {
                return Err(StoreError::Response { code: 0x200C });
            }
            Self::check_parent(&state, storage, parent)?;
        }

        let mut info = info.clone();
        info.parent = parent;
        let handle = self.insert(info, Vec::new());
        self.state.borrow_mut().creations += 1;
        Ok(handle)
    }

    fn send_object(
        &self,
        handle: Handle,
        source: &mut dyn Read,
        size: u64,
        progress: ChunkProgress<'_>,
    ) -> StoreResult<()> {
        self.count_round_trip();
        if !self.state.borrow().nodes.contains_key(&handle) {
            return Err(StoreError::InvalidHandle { handle });
        }

        let (chunk_size, fail_after, misreport) = self.stream_settings();
        let mut buf = vec![0u8; chunk_size];
        let mut data = Vec::new();
        let mut outcome = Ok(());
        while (data.len() as u64) < size {
            let want = chunk_size.min((size - data.len() as u64) as usize);
            let n = match source.read(&mut buf[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    outcome = Err(StoreError::from(e));
                    break;
                }
            };
            data.extend_from_slice(&buf[..n]);
            let sent = data.len() as u64;

            if let Err(e) = check_fail_point(fail_after, sent) {
                outcome = Err(e);
                break;
            }
            let last = sent >= size;
            let reported = match (misreport, last) {
                (true, true) => Ok(()),
                (true, false) => report(progress, size, sent).and_then(|_| report(progress, size, sent - n as u64)),
                (false, _) => report(progress, size, sent),
            };
            if let Err(e) = reported {
                outcome = Err(e);
                break;
            }
        }

        // partial objects stay behind, as on a real device
        let mut state = self.state.borrow_mut();
        if let Some(node) = state.nodes.get_mut(&handle) {
            node.data = data;
        }
        outcome
    }

    fn get_object(
        &self,
        handle: Handle,
        sink: &mut dyn Write,
        progress: ChunkProgress<'_>,
    ) -> StoreResult<()> {
        self.count_round_trip();
        let data = {
            let state = self.state.borrow();
            let node = state
                .nodes
                .get(&handle)
                .ok_or(StoreError::InvalidHandle { handle })?;
            if node.info.is_dir() {
                return Err(StoreError::Response { code: 0x2009 });
            }
            node.data.clone()
        };

        let (chunk_size, fail_after, misreport) = self.stream_settings();
        let total = data.len() as u64;
        let mut sent = 0u64;
        for chunk in data.chunks(chunk_size) {
            sent += chunk.len() as u64;
            check_fail_point(fail_after, sent)?;
            sink.write_all(chunk)?;

            match (misreport, sent >= total) {
                (true, true) => {}
                (true, false) => {
                    report(progress, total, sent)?;
                    report(progress, total, sent - chunk.len() as u64)?;
                }
                (false, _) => report(progress, total, sent)?,
            }
        }
        Ok(())
    }

    fn delete_object(&self, handle: Handle) -> StoreResult<()> {
        self.count_round_trip();
        if handle.is_root() {
            return Err(StoreError::Response { code: 0x200F });
        }

        let mut state = self.state.borrow_mut();
        if !state.nodes.contains_key(&handle) {
            return Err(StoreError::InvalidHandle { handle });
        }

        let mut pending = vec![handle];
        while let Some(current) = pending.pop() {
            state.nodes.remove(&current);
            pending.extend(
                state
                    .nodes
                    .iter()
                    .filter(|(_, node)| node.info.parent == current)
                    .map(|(child, _)| *child),
            );
        }
        Ok(())
    }

    fn set_object_name(&self, handle: Handle, name: &str) -> StoreResult<()> {
        self.count_round_trip();
        let mut state = self.state.borrow_mut();
        let node = state
            .nodes
            .get_mut(&handle)
            .ok_or(StoreError::InvalidHandle { handle })?;
        node.info.filename = name.to_string();
        state.renames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> MemoryStore {
        MemoryStore::with_files([
            ("docs/a.txt", "hello world"),
            ("docs/sub/b.txt", "b"),
            ("docs/c.txt", ""),
        ])
    }

    #[test]
    fn test_with_files_builds_tree() {
        let store = fixture();
        let docs = store.find("/docs").unwrap();
        assert_eq!(store.names(Handle::ROOT), vec!["docs"]);
        assert_eq!(store.names(docs), vec!["a.txt", "sub", "c.txt"]);
        assert_eq!(store.contents("docs/sub/b.txt").unwrap(), b"b");
        assert!(store.contents("/docs/sub").is_none());
        assert_eq!(store.round_trips(), 0);
    }

    #[test]
    fn test_listing_filters_associations() {
        let store = fixture();
        let docs = store.find("/docs").unwrap();
        let all = store.object_handles(MemoryStore::STORAGE, docs, HandleFilter::All).unwrap();
        let dirs = store
            .object_handles(MemoryStore::STORAGE, docs, HandleFilter::AssociationsOnly)
            .unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(dirs, vec![store.find("/docs/sub").unwrap()]);
        assert_eq!(store.round_trips(), 2);
    }

    #[test]
    fn test_listing_unknown_storage() {
        let store = fixture();
        let err = store
            .object_handles(StorageId(9), Handle::ROOT, HandleFilter::All)
            .unwrap_err();
        assert!(matches!(err, StoreError::Response { code: 0x2008 }));
    }

    #[test]
    fn test_get_object_reports_chunks() {
        let store = fixture();
        let handle = store.find("/docs/a.txt").unwrap();

        let mut sink = Vec::new();
        let mut reports = Vec::new();
        store
            .get_object(handle, &mut sink, &mut |total, sent| {
                reports.push((total, sent));
                ControlFlow::Continue(())
            })
            .unwrap();

        assert_eq!(sink, b"hello world");
        assert_eq!(reports, vec![(11, 4), (11, 8), (11, 11)]);
    }

    #[test]
    fn test_get_object_cancelled() {
        let store = fixture();
        let handle = store.find("/docs/a.txt").unwrap();

        let mut sink = Vec::new();
        let err = store
            .get_object(handle, &mut sink, &mut |_, _| ControlFlow::Break(()))
            .unwrap_err();
        assert!(matches!(err, StoreError::Cancelled));
        assert_eq!(sink.len(), 4);
    }

    #[test]
    fn test_send_object_stores_bytes() {
        let store = MemoryStore::default().with_chunk_size(3);
        let info = ObjectInfo::file(MemoryStore::STORAGE, Handle::ROOT, "up.txt", 7);
        let handle = store
            .send_object_info(MemoryStore::STORAGE, Handle::ROOT, &info)
            .unwrap();

        let mut reports = Vec::new();
        store
            .send_object(handle, &mut &b"1234567"[..], 7, &mut |total, sent| {
                reports.push((total, sent));
                ControlFlow::Continue(())
            })
            .unwrap();

        assert_eq!(store.contents("/up.txt").unwrap(), b"1234567");
        assert_eq!(reports, vec![(7, 3), (7, 6), (7, 7)]);
        assert_eq!(store.creations(), 1);
    }

    #[test]
    fn test_transfer_failure_injection() {
        let store = fixture();
        store.fail_transfers_after(Some(4));
        let handle = store.find("/docs/a.txt").unwrap();

        let mut sink = Vec::new();
        let err = store
            .get_object(handle, &mut sink, &mut |_, _| ControlFlow::Continue(()))
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[test]
    fn test_misreported_progress() {
        let store = fixture();
        store.misreport_progress(true);
        let handle = store.find("/docs/a.txt").unwrap();

        let mut sink = Vec::new();
        let mut reports = Vec::new();
        store
            .get_object(handle, &mut sink, &mut |_, sent| {
                reports.push(sent);
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(reports, vec![4, 0, 8, 4]);
    }

    #[test]
    fn test_delete_removes_subtree() {
        let store = fixture();
        let docs = store.find("/docs").unwrap();
        store.delete_object(docs).unwrap();
        assert!(store.find("/docs/sub/b.txt").is_none());
        assert!(store.names(Handle::ROOT).is_empty());
        assert!(store.delete_object(Handle::ROOT).is_err());
    }

    #[test]
    fn test_size_sentinel() {
        let store = fixture();
        let handle = store.find("/docs/a.txt").unwrap();
        store.report_size_sentinel(handle, Some(1 << 33));

        assert_eq!(store.object_info(handle).unwrap().compressed_size, SIZE_SENTINEL);
        assert_eq!(store.object_size(handle).unwrap(), 1 << 33);
    }
}
