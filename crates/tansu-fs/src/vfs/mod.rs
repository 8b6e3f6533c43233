//! Virtual filesystem abstraction.
//!
//! The storage subsystem: a pluggable driver contract plus the in-memory
//! tree filesystem that is its reference implementation. Key components:
//!
//! - [`FsDriver`] - Operation set every filesystem backend implements
//! - [`TreeFs`] - In-memory hierarchical filesystem (the root filesystem
//!   before any block device is mounted)
//! - [`MountTable`] - Routes paths to backends by longest prefix
//! - [`DeviceDriver`] / [`Pipe`] - Collaborator boundaries for delegated
//!   node I/O
//!
//! ## Design Decisions
//!
//! - **Explicit instances, no globals**: every operation runs against an
//!   instance value; independent mounts coexist freely.
//! - **Stateless positions**: read/write take an explicit position; the
//!   caller's open-file abstraction owns the cursor.
//! - **One lock per instance**: operations against a single instance are
//!   linearizable; there is no cross-instance ordering guarantee.
//! - **Error codes, not panics**: every failure is an [`FsError`] value,
//!   mapped by the dispatch layer onto OS-level codes.

pub mod backends;
mod device;
mod error;
mod mount;
mod ops;
mod types;

pub use backends::TreeFs;
pub use device::{DeviceDriver, Pipe, PipeProvider};
pub use error::{FsError, FsResult};
pub use mount::{MountInfo, MountTable};
pub use ops::FsDriver;
pub use types::{DeviceId, DirCursor, DirEntry, Fd, FileAttr, FileType, OpenFlags, StatFs};
