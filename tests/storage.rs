use std::fs;

use weft::api::{Command, Storage, StorageStub};
use weft::{StorageServer, WeftError, WeftPath};

fn path(s: &str) -> WeftPath {
    WeftPath::parse(s).unwrap()
}

#[test]
fn size_and_read() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("f.txt"), b"hello world").unwrap();
    let server = StorageServer::new(root.path());

    let file = path("/f.txt");
    assert_eq!(server.size(&file).unwrap(), 11);
    assert_eq!(server.read(&file, 0, 11).unwrap(), b"hello world");
    assert_eq!(server.read(&file, 6, 5).unwrap(), b"world");
    assert_eq!(server.read(&file, 11, 0).unwrap(), b"");
}

#[test]
fn read_out_of_range() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("f.txt"), b"abc").unwrap();
    let server = StorageServer::new(root.path());

    let err = server.read(&path("/f.txt"), 2, 2).unwrap_err();
    assert!(matches!(err, WeftError::OutOfRange { .. }), "got {:?}", err);
}

#[test]
fn missing_and_directory_targets_are_not_found() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir(root.path().join("d")).unwrap();
    let server = StorageServer::new(root.path());

    for target in [path("/absent"), path("/d")] {
        assert!(matches!(
            server.size(&target),
            Err(WeftError::NotFound(_))
        ));
        assert!(matches!(
            server.read(&target, 0, 1),
            Err(WeftError::NotFound(_))
        ));
        assert!(matches!(
            server.write(&target, 0, b"x"),
            Err(WeftError::NotFound(_))
        ));
    }
}

#[test]
fn write_overwrites_and_extends() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("f.txt"), b"hello").unwrap();
    let server = StorageServer::new(root.path());

    let file = path("/f.txt");
    server.write(&file, 0, b"jelly").unwrap();
    assert_eq!(server.read(&file, 0, 5).unwrap(), b"jelly");

    server.write(&file, 5, b" beans").unwrap();
    assert_eq!(server.size(&file).unwrap(), 11);
    assert_eq!(server.read(&file, 0, 11).unwrap(), b"jelly beans");
}

#[test]
fn create_makes_ancestors() {
    let root = tempfile::tempdir().unwrap();
    let server = StorageServer::new(root.path());

    assert!(server.create(&path("/a/b/c.txt")).unwrap());
    assert!(root.path().join("a/b/c.txt").is_file());

    // Already present, and the root is never creatable.
    assert!(!server.create(&path("/a/b/c.txt")).unwrap());
    assert!(!server.create(&WeftPath::root()).unwrap());
}

#[test]
fn delete_prunes_empty_ancestors() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir_all(root.path().join("a/b")).unwrap();
    fs::write(root.path().join("a/b/c.txt"), b"c").unwrap();
    fs::write(root.path().join("a/d.txt"), b"d").unwrap();
    let server = StorageServer::new(root.path());

    // Removing /a/b takes c.txt and b with it, but /a still holds d.txt.
    assert!(server.delete(&path("/a/b")).unwrap());
    assert!(!root.path().join("a/b").exists());
    assert!(root.path().join("a/d.txt").is_file());

    // Removing the last file under /a prunes /a as well; the root stays.
    assert!(server.delete(&path("/a/d.txt")).unwrap());
    assert!(!root.path().join("a").exists());
    assert!(root.path().exists());
}

#[test]
fn delete_missing_or_root_is_false() {
    let root = tempfile::tempdir().unwrap();
    let server = StorageServer::new(root.path());

    assert!(!server.delete(&path("/absent")).unwrap());
    assert!(!server.delete(&WeftPath::root()).unwrap());
}

#[test]
fn copy_pulls_a_file_from_another_server() {
    let src_root = tempfile::tempdir().unwrap();
    let dst_root = tempfile::tempdir().unwrap();

    // Larger than one pull chunk so the loop takes several round trips.
    let contents: Vec<u8> = (0..150_000u32).map(|i| (i % 251) as u8).collect();
    fs::create_dir_all(src_root.path().join("a")).unwrap();
    fs::write(src_root.path().join("a/big.bin"), &contents).unwrap();

    let src = StorageServer::new(src_root.path());
    let dst = StorageServer::new(dst_root.path());
    let src_stub: StorageStub = src.clone();

    let file = path("/a/big.bin");
    assert!(dst.copy(&file, &src_stub).unwrap());
    assert_eq!(fs::read(dst_root.path().join("a/big.bin")).unwrap(), contents);
}

#[test]
fn copy_replaces_a_stale_local_copy() {
    let src_root = tempfile::tempdir().unwrap();
    let dst_root = tempfile::tempdir().unwrap();
    fs::write(src_root.path().join("f.txt"), b"new").unwrap();
    fs::write(dst_root.path().join("f.txt"), b"old and longer").unwrap();

    let src = StorageServer::new(src_root.path());
    let dst = StorageServer::new(dst_root.path());
    let src_stub: StorageStub = src.clone();

    let file = path("/f.txt");
    assert!(dst.copy(&file, &src_stub).unwrap());
    assert_eq!(fs::read(dst_root.path().join("f.txt")).unwrap(), b"new");
}

#[cfg(unix)]
#[test]
fn non_utf8_file_names_fail_registration() {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;

    let root = tempfile::tempdir().unwrap();
    let name = OsString::from_vec(vec![b'f', 0xFF, b'x']);
    fs::write(root.path().join(&name), b"?").unwrap();

    let naming = weft::NamingServer::new();
    let server = StorageServer::new(root.path());
    assert!(matches!(
        server.start(&naming),
        Err(WeftError::Argument(_))
    ));
    assert!(!server.is_started());
}

#[test]
fn copy_of_a_missing_source_is_not_found() {
    let src_root = tempfile::tempdir().unwrap();
    let dst_root = tempfile::tempdir().unwrap();

    let src = StorageServer::new(src_root.path());
    let dst = StorageServer::new(dst_root.path());
    let src_stub: StorageStub = src.clone();

    assert!(matches!(
        dst.copy(&path("/absent"), &src_stub),
        Err(WeftError::NotFound(_))
    ));
}
