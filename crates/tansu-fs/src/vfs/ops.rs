//! Filesystem driver contract.
//!
//! Every backend — the in-memory tree filesystem here, or external ones
//! (disk, device, process-info) — implements this trait with uniform
//! semantics so the dispatch layer can treat them interchangeably.
//!
//! Conventions all backends honor:
//!
//! - Every operation returns `FsResult`; failures are values, never panics.
//! - `open` yields a descriptor plus an initial position. Read and write
//!   take an explicit position: the contract is stateless with respect to
//!   cursors — the caller's open-file abstraction owns them.
//! - Directory iteration is a pull-based cursor sized at open time;
//!   mutation mid-iteration is an accepted race.
//! - `flush`/`sync` must exist even where they are no-ops.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::device::DeviceDriver;
use super::error::FsResult;
use super::types::{DirCursor, DirEntry, Fd, FileAttr, OpenFlags, StatFs};

/// Core filesystem driver trait.
///
/// Paths are absolute within the backend (`/...`); the mount registry
/// translates dispatch-level paths before calling in.
#[async_trait]
pub trait FsDriver: Send + Sync {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Initialize a filesystem instance.
    ///
    /// `source` identifies the backing store for backends that have one
    /// (a block device path, for example); the in-memory backend ignores it.
    async fn init(source: Option<&Path>) -> FsResult<Self>
    where
        Self: Sized;

    /// Release the instance.
    ///
    /// Fails with `Busy` while any descriptor remains open; on success the
    /// backend frees all of its resources.
    async fn release(&self) -> FsResult<()>;

    // ========================================================================
    // Open sessions
    // ========================================================================

    /// Open a file, yielding a descriptor and the initial position.
    async fn open(&self, path: &Path, flags: OpenFlags) -> FsResult<(Fd, u64)>;

    /// Close a descriptor.
    ///
    /// `force` closes the session even if a delegated device close fails
    /// (a system request, e.g. process teardown).
    async fn close(&self, fd: Fd, force: bool) -> FsResult<()>;

    /// Read up to `count` bytes at `position`. Reads past end-of-file
    /// return an empty buffer, not an error.
    async fn read(&self, fd: Fd, count: usize, position: u64) -> FsResult<Vec<u8>>;

    /// Write `data` at `position`; returns bytes written.
    async fn write(&self, fd: Fd, data: &[u8], position: u64) -> FsResult<usize>;

    /// Backend-defined control request on an open descriptor.
    async fn ioctl(&self, fd: Fd, request: u32, arg: &mut [u8]) -> FsResult<()>;

    /// Flush buffers associated with a descriptor (no-op permitted).
    async fn flush(&self, fd: Fd) -> FsResult<()>;

    /// Synchronize the whole instance (no-op permitted).
    async fn sync(&self) -> FsResult<()>;

    // ========================================================================
    // Tree mutation
    // ========================================================================

    /// Create a directory.
    async fn mkdir(&self, path: &Path, mode: u32) -> FsResult<()>;

    /// Create a FIFO node backed by a collaborator pipe object.
    async fn mkfifo(&self, path: &Path, mode: u32) -> FsResult<()>;

    /// Create a device node delegating I/O to `driver`.
    async fn mknod(&self, path: &Path, driver: Arc<dyn DeviceDriver>) -> FsResult<()>;

    /// Create a link node recording `target`. Link nodes are stored as
    /// metadata only; resolution never follows them.
    async fn symlink(&self, path: &Path, target: &Path) -> FsResult<()>;

    /// Read a link node's stored target.
    async fn readlink(&self, path: &Path) -> FsResult<PathBuf>;

    /// Remove a file or empty directory.
    async fn remove(&self, path: &Path) -> FsResult<()>;

    /// Rename a node. Reference backends may restrict this to renames
    /// within one parent directory, failing `NotSupported` otherwise.
    async fn rename(&self, old_path: &Path, new_path: &Path) -> FsResult<()>;

    /// Change permission bits.
    async fn chmod(&self, path: &Path, mode: u32) -> FsResult<()>;

    /// Change owner; may be `NotSupported`.
    async fn chown(&self, path: &Path, uid: u32, gid: u32) -> FsResult<()>;

    // ========================================================================
    // Directory iteration
    // ========================================================================

    /// Open a directory for iteration. The cursor is sized by the child
    /// count at open time.
    async fn opendir(&self, path: &Path) -> FsResult<DirCursor>;

    /// Advance the cursor, returning the next entry or `None` at the end.
    async fn readdir(&self, cursor: &mut DirCursor) -> FsResult<Option<DirEntry>>;

    /// Close a directory cursor.
    async fn closedir(&self, _cursor: DirCursor) -> FsResult<()> {
        Ok(())
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Metadata snapshot by path.
    async fn stat(&self, path: &Path) -> FsResult<FileAttr>;

    /// Metadata snapshot by open descriptor.
    async fn fstat(&self, fd: Fd) -> FsResult<FileAttr>;

    /// Instance-level statistics.
    async fn statfs(&self) -> FsResult<StatFs>;

    // ========================================================================
    // Convenience (default implementations)
    // ========================================================================

    /// Check if a path exists.
    async fn exists(&self, path: &Path) -> bool {
        self.stat(path).await.is_ok()
    }
}
