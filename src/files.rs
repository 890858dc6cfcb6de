// src/files.rs

//! Serialized appends to the fixed set of numbered files
//!
//! Every resource `file_<n>` (`n` in `[0, file_count)`) gets its own guard,
//! created lazily on first use. The guard also owns the resource's cached
//! append handle, so a write and the handle it uses are always covered by the
//! same lock. Appends to different files never contend.
//!
//! The serializer knows nothing about the global lock. Callers must check
//! ownership before calling [`FileSerializer::append`].
//!
//! # Layout
//!
//! ```text
//! <data_dir>/file_0
//! <data_dir>/file_1
//! ...
//! <data_dir>/file_{file_count - 1}
//! ```
//!
//! Each file is the raw concatenation of successful payloads. There is no
//! header, framing or checksum.

use crate::error::{Error, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Number of files managed when not configured otherwise
pub const DEFAULT_FILE_COUNT: u32 = 100;

/// Prefix every resource name carries
const NAME_PREFIX: &str = "file_";

/// A validated resource name (`file_<index>`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceName {
    index: u32,
}

impl ResourceName {
    /// Parse and range-check a resource name
    ///
    /// Accepts only `file_` followed by plain decimal digits with no sign and
    /// no leading zeros, naming an index below `file_count`.
    pub fn parse(name: &str, file_count: u32) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidResource {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let digits = name
            .strip_prefix(NAME_PREFIX)
            .ok_or_else(|| invalid("expected a name of the form file_<n>"))?;

        if digits.is_empty() {
            return Err(invalid("missing file index"));
        }
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("file index must be a non-negative integer"));
        }
        if digits.len() > 1 && digits.starts_with('0') {
            return Err(invalid("file index must not have leading zeros"));
        }

        let index: u32 = digits
            .parse()
            .map_err(|_| invalid("file index is out of range"))?;
        if index >= file_count {
            return Err(invalid(&format!(
                "file index must be below {}",
                file_count
            )));
        }

        Ok(Self { index })
    }

    /// Numeric index of this resource
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", NAME_PREFIX, self.index)
    }
}

/// Per-resource state, guarded by the resource's own mutex
#[derive(Debug, Default)]
struct Slot {
    /// Cached append handle (opened on first write)
    handle: Option<File>,
}

/// Applies appends with per-file mutual exclusion
#[derive(Debug)]
pub struct FileSerializer {
    data_dir: PathBuf,
    file_count: u32,
    sync_writes: bool,
    /// Resource index -> guard. Entries are never removed while the
    /// serializer lives, so every append to a resource shares one guard.
    slots: DashMap<u32, Arc<Mutex<Slot>>>,
    /// Cached handles across all slots; only changed under the owning slot's lock
    open_handles: AtomicUsize,
}

impl FileSerializer {
    /// Create a serializer rooted at `data_dir` with default settings
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
            file_count: DEFAULT_FILE_COUNT,
            sync_writes: false,
            slots: DashMap::new(),
            open_handles: AtomicUsize::new(0),
        }
    }

    /// Set how many files exist (`file_0 .. file_{count-1}`)
    pub fn with_file_count(mut self, count: u32) -> Self {
        self.file_count = count;
        self
    }

    /// Flush each append to stable storage before reporting success
    pub fn with_sync_writes(mut self, enable: bool) -> Self {
        self.sync_writes = enable;
        self
    }

    /// Directory holding the files
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Number of managed files
    pub fn file_count(&self) -> u32 {
        self.file_count
    }

    /// Validate a resource name against this serializer's range
    pub fn resolve(&self, name: &str) -> Result<ResourceName> {
        ResourceName::parse(name, self.file_count)
    }

    /// On-disk path of a resource
    pub fn resource_path(&self, resource: &ResourceName) -> PathBuf {
        self.data_dir.join(resource.to_string())
    }

    /// Append `content` to the named resource as a single write
    ///
    /// Validation happens before any I/O. The write is issued once; a short
    /// or failed write is reported and not retried, and whatever bytes made
    /// it to disk stay there.
    pub fn append(&self, name: &str, content: &[u8]) -> Result<()> {
        let resource = self.resolve(name)?;
        let path = self.resource_path(&resource);

        let slot = self.slot(resource.index());
        let mut slot = slot.lock();

        let file = match slot.handle.take() {
            Some(file) => file,
            None => {
                debug!("Opening {} for append", path.display());
                let file = open_append(&path)?;
                self.open_handles.fetch_add(1, Ordering::Relaxed);
                file
            }
        };
        let file = slot.handle.insert(file);

        let result = write_once(file, &path, content).and_then(|()| {
            if self.sync_writes {
                file.sync_data()
                    .map_err(|e| Error::file_op("sync", &path, e))
            } else {
                Ok(())
            }
        });

        if let Err(ref e) = result {
            // A handle that failed mid-write is not reused
            warn!("Append to {} failed: {}", resource, e);
            slot.handle = None;
            self.open_handles.fetch_sub(1, Ordering::Relaxed);
        }

        result
    }

    /// Create every missing file as an empty file
    ///
    /// Existing files are left untouched. Returns how many files were created.
    pub fn create_all(&self) -> Result<usize> {
        fs::create_dir_all(&self.data_dir)
            .map_err(|e| Error::file_op("create directory", &self.data_dir, e))?;

        let mut created = 0;
        for index in 0..self.file_count {
            let path = self.resource_path(&ResourceName { index });
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => created += 1,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(Error::file_op("create", &path, e)),
            }
        }

        info!(
            "Ensured {} files in {} ({} created)",
            self.file_count,
            self.data_dir.display(),
            created
        );
        Ok(created)
    }

    /// Close every cached handle
    ///
    /// Guards survive so that appends racing with cleanup stay serialized;
    /// the next append to each resource reopens its file. Returns how many
    /// handles were closed.
    pub fn cleanup(&self) -> usize {
        let mut closed = 0;
        for slot in self.snapshot_slots() {
            let mut slot = slot.lock();
            if let Some(file) = slot.handle.take() {
                if self.sync_writes {
                    if let Err(e) = file.sync_all() {
                        warn!("Failed to sync file handle during cleanup: {}", e);
                    }
                }
                drop(file);
                self.open_handles.fetch_sub(1, Ordering::Relaxed);
                closed += 1;
            }
        }

        debug!("Closed {} cached file handle(s)", closed);
        closed
    }

    /// Number of cached open handles
    ///
    /// Never waits on a slot, so it stays cheap while appends are syncing.
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::Relaxed)
    }

    /// Guard for a resource, created on first use
    ///
    /// `entry` holds the shard lock while inserting, so concurrent first
    /// appends to the same resource always receive the same guard.
    fn slot(&self, index: u32) -> Arc<Mutex<Slot>> {
        Arc::clone(&self.slots.entry(index).or_default())
    }

    fn snapshot_slots(&self) -> Vec<Arc<Mutex<Slot>>> {
        self.slots.iter().map(|entry| Arc::clone(entry.value())).collect()
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::file_op("open", path, e))
}

fn write_once(file: &mut File, path: &Path, content: &[u8]) -> Result<()> {
    let written = file
        .write(content)
        .map_err(|e| Error::file_op("write", path, e))?;

    if written != content.len() {
        return Err(Error::ShortWrite {
            path: path.to_path_buf(),
            written,
            expected: content.len(),
        });
    }
    Ok(())
}
