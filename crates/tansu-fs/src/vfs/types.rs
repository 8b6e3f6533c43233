//! Core filesystem contract types.
//!
//! Shared by every backend. Metadata types are serializable so a dispatch
//! layer can ship them over RPC unchanged.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::SystemTime;

use super::error::{FsError, FsResult};

/// File descriptor: small non-negative integer identifying an open session.
/// Values are reused after close.
pub type Fd = u32;

/// Node kind enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum FileType {
    /// Regular file with a byte buffer.
    Regular,
    /// Directory.
    Directory,
    /// Device node; I/O is delegated to the registered driver.
    Device,
    /// Named pipe; I/O is delegated to the pipe object.
    Fifo,
    /// Link target stored as metadata, never followed.
    Link,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_regular(&self) -> bool {
        matches!(self, FileType::Regular)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }

    /// Returns true if this is a device node.
    pub fn is_device(&self) -> bool {
        matches!(self, FileType::Device)
    }
}

/// Device identifier pair carried by device nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Major device number (driver family).
    pub major: u32,
    /// Minor device number (instance / partition).
    pub minor: u32,
}

impl DeviceId {
    /// Create a new device identifier.
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// Node metadata snapshot returned by stat/fstat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAttr {
    /// Size in bytes (byte count for files, metadata overhead for others).
    pub size: u64,
    /// Node kind.
    pub kind: FileType,
    /// Permission bits (e.g., 0o644).
    pub mode: u32,
    /// Owner user ID.
    pub uid: u32,
    /// Owner group ID.
    pub gid: u32,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Device identifier, for device nodes.
    pub dev: Option<DeviceId>,
}

impl FileAttr {
    /// Returns true if this is a regular file.
    pub fn is_regular(&self) -> bool {
        self.kind.is_regular()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Directory entry yielded by readdir.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry kind.
    pub kind: FileType,
    /// Entry size in bytes.
    pub size: u64,
}

/// Directory iteration handle.
///
/// Sized by child count at open time; `readdir` advances it one entry at a
/// time until the end marker. Entries are not guaranteed consistent if the
/// directory mutates mid-iteration — that race is accepted, not guarded.
#[derive(Debug, Clone)]
pub struct DirCursor {
    /// Backend-defined token identifying the open directory.
    token: u64,
    /// Next entry index.
    position: usize,
    /// Child count observed at open time.
    len: usize,
}

impl DirCursor {
    /// Create a cursor over a directory with `len` entries at open time.
    /// `token` is backend-defined and opaque to callers.
    pub fn new(token: u64, len: usize) -> Self {
        Self {
            token,
            position: 0,
            len,
        }
    }

    /// Backend token identifying the open directory.
    pub fn token(&self) -> u64 {
        self.token
    }

    /// Entry count observed when the directory was opened.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the directory had no entries at open time.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Next entry index.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Return the current index and advance past it.
    pub fn advance(&mut self) -> usize {
        let at = self.position;
        self.position += 1;
        at
    }
}

/// Open flags recognized by the contract.
///
/// Backends reject unsupported or contradictory combinations with
/// `InvalidArgument`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    /// Read access requested.
    pub read: bool,
    /// Write access requested.
    pub write: bool,
    /// Create the file if it does not exist.
    pub create: bool,
    /// Truncate to zero length on open.
    pub truncate: bool,
    /// Initial position at end of file.
    pub append: bool,
    /// Fail with AlreadyExists if the file exists (requires create).
    pub exclusive: bool,
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self {
            read: true,
            write: false,
            create: false,
            truncate: false,
            append: false,
            exclusive: false,
        }
    }
}

impl OpenFlags {
    /// Read-only access.
    pub fn read() -> Self {
        Self::default()
    }

    /// Read-write access on an existing file.
    pub fn write() -> Self {
        Self {
            write: true,
            ..Default::default()
        }
    }

    /// Create (or truncate) with write access.
    pub fn create() -> Self {
        Self {
            write: true,
            create: true,
            truncate: true,
            ..Default::default()
        }
    }

    /// Create exclusively; fail if the file exists.
    pub fn create_exclusive() -> Self {
        Self {
            write: true,
            create: true,
            exclusive: true,
            ..Default::default()
        }
    }

    /// Append; create if missing, initial position at end.
    pub fn append() -> Self {
        Self {
            write: true,
            create: true,
            append: true,
            ..Default::default()
        }
    }

    /// Check the combination for internal contradictions.
    pub fn validate(&self) -> FsResult<()> {
        if !self.read && !self.write {
            return Err(FsError::invalid_argument("no access mode requested"));
        }
        if self.truncate && !self.write {
            return Err(FsError::invalid_argument("truncate without write"));
        }
        if self.truncate && self.append {
            return Err(FsError::invalid_argument("truncate with append"));
        }
        if self.exclusive && !self.create {
            return Err(FsError::invalid_argument("exclusive without create"));
        }
        Ok(())
    }
}

/// Parse the classic stdio mode strings: `r`, `r+`, `w`, `w+`, `a`, `a+`.
impl FromStr for OpenFlags {
    type Err = FsError;

    fn from_str(mode: &str) -> FsResult<Self> {
        let flags = match mode {
            "r" => Self::read(),
            "r+" => Self::write(),
            "w" | "w+" => Self::create(),
            "a" | "a+" => Self::append(),
            other => {
                return Err(FsError::invalid_argument(format!(
                    "unknown open mode: {other:?}"
                )));
            }
        };
        Ok(flags)
    }
}

/// Filesystem statistics snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatFs {
    /// Filesystem name.
    pub fsname: String,
    /// Total blocks.
    pub blocks: u64,
    /// Free blocks.
    pub bfree: u64,
    /// Total nodes.
    pub files: u64,
    /// Free node slots.
    pub ffree: u64,
    /// Block size in bytes.
    pub bsize: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_predicates() {
        assert!(FileType::Regular.is_regular());
        assert!(!FileType::Regular.is_dir());
        assert!(FileType::Directory.is_dir());
        assert!(FileType::Device.is_device());
        assert_eq!(FileType::Fifo.to_string(), "fifo");
    }

    #[test]
    fn open_flags_constructors() {
        let r = OpenFlags::read();
        assert!(r.read && !r.write);

        let c = OpenFlags::create();
        assert!(c.write && c.create && c.truncate);

        let a = OpenFlags::append();
        assert!(a.append && a.create && !a.truncate);
    }

    #[test]
    fn open_flags_validation() {
        assert!(OpenFlags::read().validate().is_ok());
        assert!(OpenFlags::append().validate().is_ok());

        let truncate_readonly = OpenFlags {
            truncate: true,
            ..OpenFlags::read()
        };
        assert!(truncate_readonly.validate().is_err());

        let exclusive_no_create = OpenFlags {
            exclusive: true,
            ..OpenFlags::write()
        };
        assert!(exclusive_no_create.validate().is_err());
    }

    #[test]
    fn mode_string_parsing() {
        let w: OpenFlags = "w".parse().unwrap();
        assert!(w.create && w.truncate);

        let a: OpenFlags = "a+".parse().unwrap();
        assert!(a.append);

        let r: OpenFlags = "r".parse().unwrap();
        assert!(!r.write);

        assert!("x".parse::<OpenFlags>().is_err());
    }

    #[test]
    fn dir_cursor_advances() {
        let mut cur = DirCursor::new(7, 3);
        assert_eq!(cur.len(), 3);
        assert_eq!(cur.advance(), 0);
        assert_eq!(cur.advance(), 1);
        assert_eq!(cur.position(), 2);
        assert_eq!(cur.token(), 7);
    }

    #[test]
    fn device_id_display() {
        assert_eq!(DeviceId::new(4, 1).to_string(), "4:1");
    }
}
