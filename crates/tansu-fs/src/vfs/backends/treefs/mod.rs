//! In-memory tree filesystem.
//!
//! The reference [`FsDriver`] backend, always available: it is the root
//! filesystem before any block device is mounted, and the model every
//! other backend must match. All data is ephemeral.
//!
//! One mutex per instance guards the whole node store — tree structure and
//! file contents — for the full duration of every operation, including the
//! path-resolution walk. Resolution-then-mutate is therefore atomic with
//! respect to concurrent callers, at the cost of serializing all I/O on
//! the instance. Lock acquisition waits a bounded interval and surfaces a
//! timeout as `Busy`; there is no unbounded retry. Delegated device and
//! pipe calls run outside the lock so a blocking driver cannot stall
//! unrelated tree operations.

mod handles;
mod node;
mod resolve;

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

use crate::vfs::device::{DeviceDriver, Pipe, PipeProvider};
use crate::vfs::error::{FsError, FsResult};
use crate::vfs::ops::FsDriver;
use crate::vfs::types::{DirCursor, DirEntry, Fd, FileAttr, OpenFlags, StatFs};

use handles::{HandleTable, OpenHandle};
use node::{Node, NodeArena, NodeId, NodePayload};
use resolve::{final_segment, has_trailing_slash, resolve};

/// Bounded wait for the instance lock before reporting `Busy`.
const LOCK_WAIT: Duration = Duration::from_millis(100);

/// Mode bits for files created implicitly by `open` with the create flag.
const DEFAULT_FILE_MODE: u32 = 0o644;

const FS_NAME: &str = "treefs";
const BLOCK_SIZE: u32 = 4096;

/// Per-instance state behind the lock.
struct TreeState {
    arena: NodeArena,
    root: NodeId,
    handles: HandleTable,
}

/// Collaborator reference cloned under the lock so the delegated call can
/// run after the guard drops.
enum Delegated {
    Device(Arc<dyn DeviceDriver>),
    Pipe(Arc<dyn Pipe>),
}

/// One mounted in-memory tree filesystem.
///
/// An explicit instance value: create as many independent instances as
/// needed and pass them around; there is no process-wide filesystem state.
pub struct TreeFs {
    state: Mutex<TreeState>,
    pipes: Option<Arc<dyn PipeProvider>>,
    lock_wait: Duration,
}

impl std::fmt::Debug for TreeFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeFs")
            .field("state", &"<locked>")
            .field("has_pipe_provider", &self.pipes.is_some())
            .finish()
    }
}

impl TreeFs {
    /// Create a new instance with an empty root directory.
    pub fn new() -> FsResult<Self> {
        Self::with_pipes(None)
    }

    /// Create an instance whose `mkfifo` delegates pipe creation to
    /// `provider`.
    pub fn with_pipe_provider(provider: Arc<dyn PipeProvider>) -> FsResult<Self> {
        Self::with_pipes(Some(provider))
    }

    fn with_pipes(pipes: Option<Arc<dyn PipeProvider>>) -> FsResult<Self> {
        let mut arena = NodeArena::new();
        let root = arena.alloc(Node::directory("/".into(), 0o755))?;
        Ok(Self {
            state: Mutex::new(TreeState {
                arena,
                root,
                handles: HandleTable::new(),
            }),
            pipes,
            lock_wait: LOCK_WAIT,
        })
    }

    /// Override the bounded lock wait (tuning and tests).
    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    /// Acquire the instance lock with a bounded wait.
    fn lock(&self) -> FsResult<MutexGuard<'_, TreeState>> {
        self.state
            .try_lock_for(self.lock_wait)
            .ok_or_else(|| FsError::busy("filesystem lock wait timed out"))
    }

    /// Validate and borrow the path as UTF-8; paths are absolute from the
    /// instance root.
    fn path_str(path: &Path) -> FsResult<&str> {
        let s = path
            .to_str()
            .ok_or_else(|| FsError::invalid_argument("path is not valid UTF-8"))?;
        if !s.starts_with('/') {
            return Err(FsError::invalid_argument(format!(
                "path must be absolute: {s:?}"
            )));
        }
        Ok(s)
    }

    /// Copy a path segment into an owned name, surfacing allocation
    /// failure instead of aborting.
    fn owned_name(segment: &str) -> FsResult<String> {
        let mut name = String::new();
        name.try_reserve_exact(segment.len())?;
        name.push_str(segment);
        Ok(name)
    }

    fn node(arena: &NodeArena, id: NodeId) -> FsResult<&Node> {
        arena
            .get(id)
            .ok_or_else(|| FsError::not_found("node no longer exists"))
    }

    fn node_mut(arena: &mut NodeArena, id: NodeId) -> FsResult<&mut Node> {
        arena
            .get_mut(id)
            .ok_or_else(|| FsError::not_found("node no longer exists"))
    }

    /// Scan a directory's ordered children for a name.
    fn find_child(arena: &NodeArena, dir: NodeId, name: &str) -> Option<(usize, NodeId)> {
        let children = arena.get(dir)?.children()?;
        children
            .iter()
            .enumerate()
            .find(|&(_, &child)| arena.get(child).is_some_and(|n| n.name == name))
            .map(|(i, &child)| (i, child))
    }

    /// Resolve the parent directory for a create at `path` and check the
    /// final segment against existing siblings.
    fn create_site<'a>(state: &TreeState, path: &'a str) -> FsResult<(NodeId, &'a str)> {
        let name = final_segment(path)
            .ok_or_else(|| FsError::invalid_argument("path has no segments"))?;
        let parent = resolve(&state.arena, state.root, path, -1)
            .ok_or_else(|| FsError::not_found(path))?;
        if !Self::node(&state.arena, parent.node)?.is_dir() {
            return Err(FsError::not_a_directory(path));
        }
        if Self::find_child(&state.arena, parent.node, name).is_some() {
            return Err(FsError::already_exists(path));
        }
        Ok((parent.node, name))
    }

    /// Place a node in the arena and append it to `parent`'s children.
    ///
    /// The child-list slot is reserved before the node is allocated, so a
    /// failure never leaves an allocated-but-unlinked node behind.
    fn link_child(state: &mut TreeState, parent: NodeId, node: Node) -> FsResult<NodeId> {
        Self::node_mut(&mut state.arena, parent)?
            .children_mut()
            .ok_or_else(|| FsError::not_a_directory("parent"))?
            .try_reserve(1)?;
        let id = state.arena.alloc(node)?;
        if let Some(children) = Self::node_mut(&mut state.arena, parent)?.children_mut() {
            children.push(id);
        }
        Ok(id)
    }

    /// Look up an open descriptor.
    fn handle(state: &TreeState, fd: Fd) -> FsResult<OpenHandle> {
        state
            .handles
            .get(fd)
            .ok_or_else(|| FsError::invalid_argument(format!("descriptor {fd} is not open")))
    }
}

#[async_trait]
impl FsDriver for TreeFs {
    async fn init(source: Option<&Path>) -> FsResult<Self> {
        if let Some(source) = source {
            debug!(source = %source.display(), "tree filesystem ignores its init source");
        }
        let fs = Self::new()?;
        debug!("tree filesystem initialized");
        Ok(fs)
    }

    async fn release(&self) -> FsResult<()> {
        let mut state = self.lock()?;
        let open = state.handles.len();
        if open > 0 {
            warn!(open, "release refused while descriptors remain open");
            return Err(FsError::busy(format!("{open} descriptors still open")));
        }
        let root = state.root;
        state.arena.release_subtree(root);
        debug!("tree filesystem released");
        Ok(())
    }

    async fn open(&self, path: &Path, flags: OpenFlags) -> FsResult<(Fd, u64)> {
        let path = Self::path_str(path)?;
        flags.validate()?;

        let mut state = self.lock()?;
        let (node_id, position, delegated) = match resolve(&state.arena, state.root, path, 0) {
            Some(r) => {
                let node = Self::node_mut(&mut state.arena, r.node)?;
                if node.is_dir() {
                    return Err(FsError::is_a_directory(path));
                }
                if has_trailing_slash(path) {
                    return Err(FsError::not_a_directory(path));
                }
                if flags.exclusive {
                    return Err(FsError::already_exists(path));
                }
                let mut truncated = false;
                let (position, delegated) = match &mut node.payload {
                    NodePayload::File { data } => {
                        if flags.truncate && !data.is_empty() {
                            data.clear();
                            truncated = true;
                        }
                        let position = if flags.append { data.len() as u64 } else { 0 };
                        (position, None)
                    }
                    NodePayload::Device { driver, .. } => (0, Some(Arc::clone(driver))),
                    NodePayload::Fifo { .. } => (0, None),
                    NodePayload::Link { .. } => {
                        return Err(FsError::not_supported("open on a link node"));
                    }
                    NodePayload::Directory { .. } => {
                        return Err(FsError::is_a_directory(path));
                    }
                };
                if truncated {
                    node.mtime = SystemTime::now();
                }
                (r.node, position, delegated)
            }
            None => {
                if !flags.create {
                    return Err(FsError::not_found(path));
                }
                if has_trailing_slash(path) {
                    return Err(FsError::invalid_argument(
                        "cannot create a file at a path with a trailing slash",
                    ));
                }
                let (parent, name) = Self::create_site(&state, path)?;
                let file = Node::file(Self::owned_name(name)?, DEFAULT_FILE_MODE);
                let id = Self::link_child(&mut state, parent, file)?;
                debug!(path, "file created on open");
                (id, 0, None)
            }
        };

        match delegated {
            None => {
                let fd = state.handles.insert(OpenHandle { node: node_id })?;
                Ok((fd, position))
            }
            Some(driver) => {
                // Delegated open runs outside the lock; the handle is only
                // published once the driver accepts.
                drop(state);
                driver.open().await?;
                let mut state = self.lock()?;
                let fd = state.handles.insert(OpenHandle { node: node_id })?;
                Ok((fd, position))
            }
        }
    }

    async fn close(&self, fd: Fd, force: bool) -> FsResult<()> {
        let mut state = self.lock()?;
        let handle = Self::handle(&state, fd)?;
        let driver = state.arena.get(handle.node).and_then(|n| match &n.payload {
            NodePayload::Device { driver, .. } => Some(Arc::clone(driver)),
            _ => None,
        });

        if let Some(driver) = driver {
            drop(state);
            if let Err(e) = driver.close().await {
                if !force {
                    return Err(e);
                }
                warn!(fd, error = %e, "device close failed; descriptor closed by force");
            }
            state = self.lock()?;
        }
        state.handles.remove(fd);
        Ok(())
    }

    async fn read(&self, fd: Fd, count: usize, position: u64) -> FsResult<Vec<u8>> {
        if count == 0 {
            return Err(FsError::invalid_argument("zero-length read"));
        }
        let state = self.lock()?;
        let handle = Self::handle(&state, fd)?;
        let node = Self::node(&state.arena, handle.node)?;
        let delegated = match &node.payload {
            NodePayload::File { data } => {
                // Reading past end-of-file yields zero bytes, not an error.
                let pos = position.min(data.len() as u64) as usize;
                let take = count.min(data.len() - pos);
                return Ok(data[pos..pos + take].to_vec());
            }
            NodePayload::Device { driver, .. } => Delegated::Device(Arc::clone(driver)),
            NodePayload::Fifo { pipe } => Delegated::Pipe(Arc::clone(pipe)),
            NodePayload::Directory { .. } => {
                return Err(FsError::is_a_directory("read target"));
            }
            NodePayload::Link { .. } => {
                return Err(FsError::not_supported("read on a link node"));
            }
        };
        drop(state);

        match delegated {
            Delegated::Device(driver) => driver.read(count, position).await,
            Delegated::Pipe(pipe) => pipe.read(count).await,
        }
    }

    async fn write(&self, fd: Fd, data: &[u8], position: u64) -> FsResult<usize> {
        if data.is_empty() {
            return Err(FsError::invalid_argument("zero-length write"));
        }
        let mut state = self.lock()?;
        let handle = Self::handle(&state, fd)?;
        let delegated = {
            let node = Self::node_mut(&mut state.arena, handle.node)?;
            match &mut node.payload {
                NodePayload::File { data: buf } => {
                    // Offsets beyond the end clamp to the current size;
                    // files never contain holes.
                    let pos = position.min(buf.len() as u64) as usize;
                    let end = pos + data.len();
                    if end > buf.len() {
                        buf.try_reserve(end - buf.len())?;
                        buf.resize(end, 0);
                    }
                    buf[pos..end].copy_from_slice(data);
                    None
                }
                NodePayload::Device { driver, .. } => {
                    Some(Delegated::Device(Arc::clone(driver)))
                }
                NodePayload::Fifo { pipe } => Some(Delegated::Pipe(Arc::clone(pipe))),
                NodePayload::Directory { .. } => {
                    return Err(FsError::is_a_directory("write target"));
                }
                NodePayload::Link { .. } => {
                    return Err(FsError::not_supported("write on a link node"));
                }
            }
        };

        match delegated {
            None => {
                Self::node_mut(&mut state.arena, handle.node)?.mtime = SystemTime::now();
                Ok(data.len())
            }
            Some(target) => {
                drop(state);
                match target {
                    Delegated::Device(driver) => driver.write(data, position).await,
                    Delegated::Pipe(pipe) => pipe.write(data).await,
                }
            }
        }
    }

    async fn ioctl(&self, fd: Fd, request: u32, arg: &mut [u8]) -> FsResult<()> {
        let state = self.lock()?;
        let handle = Self::handle(&state, fd)?;
        let node = Self::node(&state.arena, handle.node)?;
        let driver = match &node.payload {
            NodePayload::Device { driver, .. } => Arc::clone(driver),
            _ => return Err(FsError::not_supported("ioctl on a non-device node")),
        };
        drop(state);
        driver.ioctl(request, arg).await
    }

    async fn flush(&self, fd: Fd) -> FsResult<()> {
        let state = self.lock()?;
        let handle = Self::handle(&state, fd)?;
        let node = Self::node(&state.arena, handle.node)?;
        let delegated = match &node.payload {
            NodePayload::Device { driver, .. } => Delegated::Device(Arc::clone(driver)),
            NodePayload::Fifo { pipe } => Delegated::Pipe(Arc::clone(pipe)),
            // Nothing to flush for in-memory nodes.
            _ => return Ok(()),
        };
        drop(state);

        match delegated {
            Delegated::Device(driver) => driver.flush().await,
            Delegated::Pipe(pipe) => pipe.flush().await,
        }
    }

    async fn sync(&self) -> FsResult<()> {
        // No backing store; exists so callers can treat backends uniformly.
        Ok(())
    }

    async fn mkdir(&self, path: &Path, mode: u32) -> FsResult<()> {
        let path = Self::path_str(path)?;
        let mut state = self.lock()?;
        let (parent, name) = Self::create_site(&state, path)?;
        let node = Node::directory(Self::owned_name(name)?, mode);
        Self::link_child(&mut state, parent, node)?;
        debug!(path, "directory created");
        Ok(())
    }

    async fn mkfifo(&self, path: &Path, mode: u32) -> FsResult<()> {
        let provider = self
            .pipes
            .as_ref()
            .ok_or_else(|| FsError::not_supported("no pipe provider configured"))?;
        let path = Self::path_str(path)?;
        // Created before the lock; dropped if linking fails.
        let pipe = provider.create(mode);

        let mut state = self.lock()?;
        let (parent, name) = Self::create_site(&state, path)?;
        let node = Node::fifo(Self::owned_name(name)?, mode, pipe);
        Self::link_child(&mut state, parent, node)?;
        debug!(path, "fifo created");
        Ok(())
    }

    async fn mknod(&self, path: &Path, driver: Arc<dyn DeviceDriver>) -> FsResult<()> {
        let path = Self::path_str(path)?;
        let device = driver.id();
        let mut state = self.lock()?;
        let (parent, name) = Self::create_site(&state, path)?;
        let node = Node::device(Self::owned_name(name)?, driver);
        Self::link_child(&mut state, parent, node)?;
        debug!(path, device = %device, "device node created");
        Ok(())
    }

    async fn symlink(&self, path: &Path, target: &Path) -> FsResult<()> {
        let path = Self::path_str(path)?;
        let target = target
            .to_str()
            .ok_or_else(|| FsError::invalid_argument("link target is not valid UTF-8"))?;
        let mut state = self.lock()?;
        let (parent, name) = Self::create_site(&state, path)?;
        let node = Node::link(Self::owned_name(name)?, Self::owned_name(target)?);
        Self::link_child(&mut state, parent, node)?;
        Ok(())
    }

    async fn readlink(&self, path: &Path) -> FsResult<PathBuf> {
        let path = Self::path_str(path)?;
        let state = self.lock()?;
        let r = resolve(&state.arena, state.root, path, 0)
            .ok_or_else(|| FsError::not_found(path))?;
        match &Self::node(&state.arena, r.node)?.payload {
            NodePayload::Link { target } => Ok(PathBuf::from(target)),
            _ => Err(FsError::invalid_argument(format!("not a link node: {path}"))),
        }
    }

    async fn remove(&self, path: &Path) -> FsResult<()> {
        let path = Self::path_str(path)?;
        let mut state = self.lock()?;
        let r = resolve(&state.arena, state.root, path, 0)
            .ok_or_else(|| FsError::not_found(path))?;
        let (parent, index) = match (r.parent, r.index) {
            (Some(parent), Some(index)) => (parent, index),
            // Only the start node resolves without a parent.
            _ => {
                return Err(FsError::invalid_argument(
                    "cannot remove the root directory",
                ));
            }
        };

        let node = Self::node(&state.arena, r.node)?;
        if has_trailing_slash(path) && !node.is_dir() {
            return Err(FsError::not_a_directory(path));
        }
        if let Some(children) = node.children() {
            if !children.is_empty() {
                return Err(FsError::directory_not_empty(path));
            }
        }

        if let Some(children) = Self::node_mut(&mut state.arena, parent)?.children_mut() {
            children.remove(index);
        }
        state.arena.free(r.node);
        debug!(path, "removed");
        Ok(())
    }

    async fn rename(&self, old_path: &Path, new_path: &Path) -> FsResult<()> {
        let old = Self::path_str(old_path)?;
        let new = Self::path_str(new_path)?;
        if has_trailing_slash(old) || has_trailing_slash(new) {
            return Err(FsError::invalid_argument(
                "rename paths must not end in a slash",
            ));
        }
        let new_name = final_segment(new)
            .ok_or_else(|| FsError::invalid_argument("target path has no segments"))?;

        let mut state = self.lock()?;
        let old_parent = resolve(&state.arena, state.root, old, -1)
            .ok_or_else(|| FsError::not_found(old))?;
        let new_parent = resolve(&state.arena, state.root, new, -1)
            .ok_or_else(|| FsError::not_found(new))?;
        if !Self::node(&state.arena, old_parent.node)?.is_dir()
            || !Self::node(&state.arena, new_parent.node)?.is_dir()
        {
            return Err(FsError::not_a_directory("rename parent"));
        }
        if old_parent.node != new_parent.node {
            return Err(FsError::not_supported("rename across directories"));
        }
        if Self::find_child(&state.arena, new_parent.node, new_name).is_some() {
            return Err(FsError::already_exists(new));
        }
        let target = resolve(&state.arena, state.root, old, 0)
            .ok_or_else(|| FsError::not_found(old))?;

        // Allocate the replacement name first: a failure here must leave
        // the existing name untouched.
        let name = Self::owned_name(new_name)?;
        Self::node_mut(&mut state.arena, target.node)?.name = name;
        debug!(old, new, "renamed");
        Ok(())
    }

    async fn chmod(&self, path: &Path, mode: u32) -> FsResult<()> {
        let path = Self::path_str(path)?;
        let mut state = self.lock()?;
        let r = resolve(&state.arena, state.root, path, 0)
            .ok_or_else(|| FsError::not_found(path))?;
        let node = Self::node_mut(&mut state.arena, r.node)?;
        if has_trailing_slash(path) && !node.is_dir() {
            return Err(FsError::not_a_directory(path));
        }
        node.mode = mode & 0o7777;
        Ok(())
    }

    async fn chown(&self, _path: &Path, _uid: u32, _gid: u32) -> FsResult<()> {
        Err(FsError::not_supported("chown on the tree filesystem"))
    }

    async fn opendir(&self, path: &Path) -> FsResult<DirCursor> {
        let path = Self::path_str(path)?;
        let state = self.lock()?;
        let r = resolve(&state.arena, state.root, path, 0)
            .ok_or_else(|| FsError::not_found(path))?;
        let node = Self::node(&state.arena, r.node)?;
        let children = node
            .children()
            .ok_or_else(|| FsError::not_a_directory(path))?;
        Ok(DirCursor::new(r.node.to_token(), children.len()))
    }

    async fn readdir(&self, cursor: &mut DirCursor) -> FsResult<Option<DirEntry>> {
        let state = self.lock()?;
        let dir = NodeId::from_token(cursor.token());
        let node = state
            .arena
            .get(dir)
            .ok_or_else(|| FsError::not_found("directory no longer exists"))?;
        let children = node
            .children()
            .ok_or_else(|| FsError::not_a_directory("cursor target"))?;

        match children.get(cursor.position()) {
            None => Ok(None),
            Some(&child) => {
                cursor.advance();
                // A vanished child mid-iteration ends the walk early;
                // consistency under concurrent mutation is not guaranteed.
                Ok(state.arena.get(child).map(|n| n.dir_entry()))
            }
        }
    }

    async fn stat(&self, path: &Path) -> FsResult<FileAttr> {
        let path = Self::path_str(path)?;
        let state = self.lock()?;
        let r = resolve(&state.arena, state.root, path, 0)
            .ok_or_else(|| FsError::not_found(path))?;
        let node = Self::node(&state.arena, r.node)?;
        if has_trailing_slash(path) && !node.is_dir() {
            return Err(FsError::not_a_directory(path));
        }
        Ok(node.attr())
    }

    async fn fstat(&self, fd: Fd) -> FsResult<FileAttr> {
        let state = self.lock()?;
        let handle = Self::handle(&state, fd)?;
        Ok(Self::node(&state.arena, handle.node)?.attr())
    }

    async fn statfs(&self) -> FsResult<StatFs> {
        let state = self.lock()?;
        let bytes = state.arena.bytes_used();
        Ok(StatFs {
            fsname: FS_NAME.into(),
            blocks: bytes.div_ceil(u64::from(BLOCK_SIZE)),
            bfree: 0,
            files: state.arena.len() as u64,
            ffree: state.arena.free_slots() as u64,
            bsize: BLOCK_SIZE,
        })
    }
}
