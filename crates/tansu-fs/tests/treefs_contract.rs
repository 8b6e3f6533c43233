//! End-to-end tests of the tree filesystem through the driver contract.

use std::path::Path;
use std::sync::Arc;

use tansu_fs::{FsDriver, FsError, OpenFlags, TreeFs};

fn p(s: &str) -> &Path {
    Path::new(s)
}

/// The canonical create/write/read/remove walkthrough.
#[tokio::test]
async fn file_lifecycle_scenario() {
    let fs = TreeFs::new().unwrap();

    fs.mkdir(p("/a"), 0o755).await.unwrap();

    let (fd, pos) = fs
        .open(p("/a/b.txt"), OpenFlags::create())
        .await
        .unwrap();
    assert_eq!(pos, 0);
    assert_eq!(fs.write(fd, b"hello", 0).await.unwrap(), 5);
    fs.close(fd, false).await.unwrap();

    let (fd2, _) = fs.open(p("/a/b.txt"), OpenFlags::read()).await.unwrap();
    assert_eq!(fs.read(fd2, 5, 0).await.unwrap(), b"hello");
    fs.close(fd2, false).await.unwrap();

    // Non-empty directory refuses removal; tree unchanged.
    let err = fs.remove(p("/a")).await.unwrap_err();
    assert!(matches!(err, FsError::DirectoryNotEmpty(_)));
    assert!(fs.exists(p("/a/b.txt")).await);

    fs.remove(p("/a/b.txt")).await.unwrap();
    fs.remove(p("/a")).await.unwrap();
    assert!(!fs.exists(p("/a")).await);
}

/// Created paths resolve immediately with the expected kind.
#[tokio::test]
async fn created_paths_resolve_with_expected_kind() {
    let fs = TreeFs::new().unwrap();

    let paths = ["/x", "/x/y", "/x/y/z"];
    for path in paths {
        fs.mkdir(p(path), 0o755).await.unwrap();
        assert!(fs.stat(p(path)).await.unwrap().is_dir());
    }

    fs.open(p("/x/y/z/file"), OpenFlags::create()).await.unwrap();
    assert!(fs.stat(p("/x/y/z/file")).await.unwrap().is_regular());
}

/// Positions are caller-owned: interleaved sessions on one node see each
/// other's bytes.
#[tokio::test]
async fn descriptors_share_the_node() {
    let fs = TreeFs::new().unwrap();
    let (writer, _) = fs.open(p("/shared"), OpenFlags::create()).await.unwrap();
    let (reader, _) = fs.open(p("/shared"), OpenFlags::read()).await.unwrap();
    assert_ne!(writer, reader);

    fs.write(writer, b"abc", 0).await.unwrap();
    assert_eq!(fs.read(reader, 3, 0).await.unwrap(), b"abc");

    fs.close(writer, false).await.unwrap();
    fs.close(reader, false).await.unwrap();
}

/// Driver contract usage through a trait object, the way the dispatch
/// layer holds backends.
#[tokio::test]
async fn contract_via_trait_object() {
    let fs: Arc<dyn FsDriver> = Arc::new(TreeFs::init(None).await.unwrap());

    fs.mkdir(p("/spool"), 0o755).await.unwrap();
    let (fd, _) = fs.open(p("/spool/job"), OpenFlags::create()).await.unwrap();
    fs.write(fd, b"queued", 0).await.unwrap();
    fs.flush(fd).await.unwrap();
    fs.sync().await.unwrap();
    fs.close(fd, false).await.unwrap();

    let mut cursor = fs.opendir(p("/spool")).await.unwrap();
    let entry = fs.readdir(&mut cursor).await.unwrap().unwrap();
    assert_eq!(entry.name, "job");
    assert!(fs.readdir(&mut cursor).await.unwrap().is_none());

    let st = fs.statfs().await.unwrap();
    assert_eq!(st.fsname, "treefs");

    fs.release().await.unwrap();
}

/// Readdir tolerates mutation mid-iteration without failing the walk.
#[tokio::test]
async fn readdir_survives_concurrent_removal() {
    let fs = TreeFs::new().unwrap();
    fs.mkdir(p("/d"), 0o755).await.unwrap();
    for name in ["one", "two", "three"] {
        let path = format!("/d/{name}");
        fs.open(p(&path), OpenFlags::create()).await.unwrap();
    }

    let mut cursor = fs.opendir(p("/d")).await.unwrap();
    assert_eq!(cursor.len(), 3);

    let first = fs.readdir(&mut cursor).await.unwrap().unwrap();
    assert_eq!(first.name, "one");

    // Remove an entry the cursor has not reached yet.
    fs.remove(p("/d/three")).await.unwrap();

    // Iteration continues; it simply ends when the live list runs out.
    let second = fs.readdir(&mut cursor).await.unwrap().unwrap();
    assert_eq!(second.name, "two");
    assert!(fs.readdir(&mut cursor).await.unwrap().is_none());
}

/// Two instances are fully independent.
#[tokio::test]
async fn instances_do_not_share_state() {
    let a = TreeFs::new().unwrap();
    let b = TreeFs::new().unwrap();

    a.mkdir(p("/only-in-a"), 0o755).await.unwrap();
    assert!(a.exists(p("/only-in-a")).await);
    assert!(!b.exists(p("/only-in-a")).await);
}
