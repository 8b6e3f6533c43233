//! Mount registry with longest-prefix routing.
//!
//! This is the dispatch collaborator's boundary object: it maps mount
//! points to backend instances and translates an absolute path into the
//! owning backend plus the path within it. Descriptor-level dispatch and
//! boot-time mount sequencing live with the dispatch layer, not here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::error::{FsError, FsResult};
use super::ops::FsDriver;

/// Information about a mount point.
#[derive(Debug, Clone)]
pub struct MountInfo {
    /// The mount path (e.g., "/mnt/data").
    pub path: PathBuf,
}

/// Routes paths to mounted filesystem backends.
///
/// Mount points are matched by longest prefix: with `/mnt` and
/// `/mnt/data` both mounted, `/mnt/data/log.txt` routes to `/mnt/data`.
pub struct MountTable {
    /// Mount points, keyed by normalized path.
    mounts: RwLock<BTreeMap<PathBuf, Arc<dyn FsDriver>>>,
}

impl std::fmt::Debug for MountTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountTable")
            .field("mounts", &"<locked>")
            .finish()
    }
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MountTable {
    /// Create a new empty mount table.
    pub fn new() -> Self {
        Self {
            mounts: RwLock::new(BTreeMap::new()),
        }
    }

    /// Mount a filesystem at the given path.
    ///
    /// The path should be absolute. Mounting over an existing mount point
    /// replaces it.
    pub async fn mount(&self, path: impl Into<PathBuf>, fs: impl FsDriver + 'static) {
        self.mount_arc(path, Arc::new(fs)).await;
    }

    /// Mount a filesystem (already wrapped in Arc) at the given path.
    pub async fn mount_arc(&self, path: impl Into<PathBuf>, fs: Arc<dyn FsDriver>) {
        let path = Self::normalize_mount_path(path.into());
        info!(mount = %path.display(), "filesystem mounted");
        let mut mounts = self.mounts.write().await;
        mounts.insert(path, fs);
    }

    /// Unmount the filesystem at the given path.
    ///
    /// Drives the backend's release first: a backend with open descriptors
    /// refuses with `Busy` and the mount stays in place.
    pub async fn unmount(&self, path: impl AsRef<Path>) -> FsResult<()> {
        let path = Self::normalize_mount_path(path.as_ref().to_path_buf());
        let fs = {
            let mounts = self.mounts.read().await;
            mounts
                .get(&path)
                .cloned()
                .ok_or_else(|| FsError::not_found(path.display().to_string()))?
        };

        if let Err(e) = fs.release().await {
            warn!(mount = %path.display(), error = %e, "unmount refused by backend");
            return Err(e);
        }

        let mut mounts = self.mounts.write().await;
        mounts.remove(&path);
        info!(mount = %path.display(), "filesystem unmounted");
        Ok(())
    }

    /// List all current mounts.
    pub async fn list_mounts(&self) -> Vec<MountInfo> {
        let mounts = self.mounts.read().await;
        mounts
            .keys()
            .map(|path| MountInfo { path: path.clone() })
            .collect()
    }

    /// Find the backend owning `path`.
    ///
    /// Returns the backend and the absolute path within it.
    pub async fn resolve(&self, path: &Path) -> FsResult<(Arc<dyn FsDriver>, PathBuf)> {
        let path_str = path.to_string_lossy();
        let normalized = if path_str.starts_with('/') {
            path.to_path_buf()
        } else {
            PathBuf::from(format!("/{path_str}"))
        };
        let normalized_str = normalized.to_string_lossy();

        let mounts = self.mounts.read().await;

        // Longest matching mount point wins.
        let mut best: Option<(&PathBuf, &Arc<dyn FsDriver>)> = None;
        for (mount_path, fs) in mounts.iter() {
            let mount_str = mount_path.to_string_lossy();
            let is_match = mount_str == "/"
                || normalized_str == mount_str
                || normalized_str.starts_with(&format!("{mount_str}/"));
            if is_match {
                let better = best
                    .map(|(p, _)| mount_path.as_os_str().len() > p.as_os_str().len())
                    .unwrap_or(true);
                if better {
                    best = Some((mount_path, fs));
                }
            }
        }

        match best {
            Some((mount_path, fs)) => {
                let mount_str = mount_path.to_string_lossy();
                let relative = if mount_str == "/" {
                    normalized_str.trim_start_matches('/')
                } else {
                    normalized_str
                        .strip_prefix(mount_str.as_ref())
                        .unwrap_or("")
                        .trim_start_matches('/')
                };
                // Backends take absolute paths from their own root.
                Ok((Arc::clone(fs), PathBuf::from(format!("/{relative}"))))
            }
            None => Err(FsError::not_found(format!(
                "no mount point for {}",
                path.display()
            ))),
        }
    }

    /// Normalize a mount path: ensure it starts with `/` and has no
    /// trailing slash.
    fn normalize_mount_path(path: PathBuf) -> PathBuf {
        let s = path.to_string_lossy();
        let s = s.trim_end_matches('/');
        if s.is_empty() {
            PathBuf::from("/")
        } else if !s.starts_with('/') {
            PathBuf::from(format!("/{s}"))
        } else {
            PathBuf::from(s)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::backends::TreeFs;
    use crate::vfs::types::OpenFlags;

    async fn scratch_with_file(name: &str, content: &[u8]) -> TreeFs {
        let fs = TreeFs::new().unwrap();
        let path = PathBuf::from(format!("/{name}"));
        let (fd, _) = fs.open(&path, OpenFlags::create()).await.unwrap();
        fs.write(fd, content, 0).await.unwrap();
        fs.close(fd, false).await.unwrap();
        fs
    }

    #[tokio::test]
    async fn route_to_single_mount() {
        let table = MountTable::new();
        table
            .mount("/scratch", scratch_with_file("a.txt", b"hello").await)
            .await;

        let (fs, rel) = table.resolve(Path::new("/scratch/a.txt")).await.unwrap();
        assert_eq!(rel, PathBuf::from("/a.txt"));

        let (fd, _) = fs.open(&rel, OpenFlags::read()).await.unwrap();
        assert_eq!(fs.read(fd, 16, 0).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn longest_prefix_wins() {
        let table = MountTable::new();
        table
            .mount("/mnt", scratch_with_file("outer.txt", b"outer").await)
            .await;
        table
            .mount("/mnt/data", scratch_with_file("inner.txt", b"inner").await)
            .await;

        let (_, rel) = table.resolve(Path::new("/mnt/outer.txt")).await.unwrap();
        assert_eq!(rel, PathBuf::from("/outer.txt"));

        let (fs, rel) = table
            .resolve(Path::new("/mnt/data/inner.txt"))
            .await
            .unwrap();
        assert_eq!(rel, PathBuf::from("/inner.txt"));
        assert!(fs.exists(&rel).await);
    }

    #[tokio::test]
    async fn root_mount_matches_everything() {
        let table = MountTable::new();
        table
            .mount("/", scratch_with_file("boot.cfg", b"cfg").await)
            .await;

        let (fs, rel) = table.resolve(Path::new("/boot.cfg")).await.unwrap();
        assert_eq!(rel, PathBuf::from("/boot.cfg"));
        assert!(fs.exists(&rel).await);
    }

    #[tokio::test]
    async fn unrouted_path_fails() {
        let table = MountTable::new();
        let err = match table.resolve(Path::new("/nowhere/f")).await {
            Ok(_) => panic!("expected resolve to fail for an unrouted path"),
            Err(e) => e,
        };
        assert!(matches!(err, FsError::NotFound(_)));
    }

    #[tokio::test]
    async fn unmount_removes_route() {
        let table = MountTable::new();
        table.mount("/scratch", TreeFs::new().unwrap()).await;

        assert!(table.resolve(Path::new("/scratch/x")).await.is_ok());
        table.unmount("/scratch").await.unwrap();
        assert!(table.resolve(Path::new("/scratch/x")).await.is_err());
    }

    #[tokio::test]
    async fn unmount_refused_while_descriptors_open() {
        let table = MountTable::new();
        table.mount("/scratch", TreeFs::new().unwrap()).await;

        let (fs, rel) = table.resolve(Path::new("/scratch/f")).await.unwrap();
        let (fd, _) = fs.open(&rel, OpenFlags::create()).await.unwrap();

        let err = table.unmount("/scratch").await.unwrap_err();
        assert!(matches!(err, FsError::Busy(_)));
        // Mount still routes.
        assert!(table.resolve(Path::new("/scratch/f")).await.is_ok());

        fs.close(fd, false).await.unwrap();
        table.unmount("/scratch").await.unwrap();
    }

    #[tokio::test]
    async fn unmount_unknown_mount_fails() {
        let table = MountTable::new();
        let err = table.unmount("/ghost").await.unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_mounts_reports_paths() {
        let table = MountTable::new();
        table.mount("/scratch", TreeFs::new().unwrap()).await;
        table.mount("/dev", TreeFs::new().unwrap()).await;

        let mounts = table.list_mounts().await;
        let paths: Vec<_> = mounts.iter().map(|m| m.path.clone()).collect();
        assert!(paths.contains(&PathBuf::from("/scratch")));
        assert!(paths.contains(&PathBuf::from("/dev")));
    }

    #[tokio::test]
    async fn mount_path_normalization() {
        let table = MountTable::new();
        table.mount("scratch/", TreeFs::new().unwrap()).await;

        let mounts = table.list_mounts().await;
        assert_eq!(mounts[0].path, PathBuf::from("/scratch"));
    }
}
