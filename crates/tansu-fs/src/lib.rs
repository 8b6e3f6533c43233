//! # tansu-fs
//!
//! Storage subsystem for tansu: the filesystem driver contract and the
//! in-memory tree filesystem that is its always-available reference
//! implementation.
//!
//! Every filesystem backend — this one, disk-backed, device-node, or
//! process-info — implements [`FsDriver`] with uniform semantics:
//! error-code results, caller-owned positions, pull-based directory
//! iteration, and a release that refuses while descriptors remain open.
//! [`TreeFs`] additionally defines the concurrency discipline the others
//! follow: one bounded-wait lock per instance around the whole node store,
//! with delegated device and pipe I/O kept outside it.

pub mod vfs;

pub use vfs::{
    backends::TreeFs,
    DeviceDriver, DeviceId, DirCursor, DirEntry, Fd, FileAttr, FileType, FsDriver, FsError,
    FsResult, MountInfo, MountTable, OpenFlags, Pipe, PipeProvider, StatFs,
};
