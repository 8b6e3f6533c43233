//! Filesystem backends.
//!
//! Backends implement [`FsDriver`] for different storage types; the tree
//! filesystem is the in-memory reference implementation.
//!
//! [`FsDriver`]: crate::vfs::FsDriver

mod treefs;

pub use treefs::TreeFs;
