//! Collaborator boundaries for delegated node I/O.
//!
//! Device nodes and FIFOs store a shared reference to an object implemented
//! outside this subsystem; the filesystem forwards read/write/ioctl/flush to
//! it unchanged. Backends must perform these calls outside the instance lock
//! so a blocking driver cannot stall unrelated tree operations.

use async_trait::async_trait;
use std::sync::Arc;

use super::error::FsResult;
use super::types::DeviceId;

/// Interface a device-driver collaborator exposes to the filesystem.
///
/// The tree filesystem stores the `Arc` in the device node's payload and
/// owns no device state of its own.
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    /// Device identifier recorded in the node's metadata.
    fn id(&self) -> DeviceId;

    /// Called when a descriptor is opened on the device node.
    async fn open(&self) -> FsResult<()>;

    /// Called when the descriptor is closed.
    async fn close(&self) -> FsResult<()>;

    /// Read up to `count` bytes at `position`.
    async fn read(&self, count: usize, position: u64) -> FsResult<Vec<u8>>;

    /// Write `data` at `position`; returns bytes written.
    async fn write(&self, data: &[u8], position: u64) -> FsResult<usize>;

    /// Backend-defined control request.
    async fn ioctl(&self, request: u32, arg: &mut [u8]) -> FsResult<()>;

    /// Flush device buffers.
    async fn flush(&self) -> FsResult<()>;
}

/// Interface a pipe collaborator exposes to the filesystem.
///
/// FIFO nodes hold a shared reference to one of these; positions are
/// meaningless for pipes and are ignored by implementations.
#[async_trait]
pub trait Pipe: Send + Sync {
    /// Read up to `count` bytes from the pipe.
    async fn read(&self, count: usize) -> FsResult<Vec<u8>>;

    /// Write `data` into the pipe; returns bytes accepted.
    async fn write(&self, data: &[u8]) -> FsResult<usize>;

    /// Flush buffered pipe data.
    async fn flush(&self) -> FsResult<()>;
}

/// Factory for pipe objects, injected at instance construction.
///
/// `mkfifo` asks the provider for a fresh pipe; an instance without a
/// provider rejects `mkfifo` with `NotSupported`.
pub trait PipeProvider: Send + Sync {
    /// Create a new pipe object for a FIFO node with the given mode bits.
    fn create(&self, mode: u32) -> Arc<dyn Pipe>;
}
