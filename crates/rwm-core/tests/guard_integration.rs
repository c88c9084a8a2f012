//! Exercises path confinement against a symlink that points outside the
//! workspace root, the case the canonicalize-then-prefix-check design
//! exists to defeat.

use std::path::Path;

use rwm_core::safe_join;
use rwm_error::ErrorKind;

#[test]
fn rejects_symlink_escaping_root() {
    let outside = tempfile::tempdir().unwrap();
    std::fs::write(outside.path().join("secret.txt"), b"top secret").unwrap();

    let root = tempfile::tempdir().unwrap();
    #[cfg(unix)]
    std::os::unix::fs::symlink(outside.path(), root.path().join("escape")).unwrap();
    #[cfg(unix)]
    {
        let err = safe_join(root.path(), Path::new("escape/secret.txt")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::PathEscape);
    }
}

#[test]
fn allows_symlink_staying_within_root() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join("real")).unwrap();
    std::fs::write(root.path().join("real/file.txt"), b"hi").unwrap();
    #[cfg(unix)]
    std::os::unix::fs::symlink(root.path().join("real"), root.path().join("alias")).unwrap();
    #[cfg(unix)]
    {
        let resolved = safe_join(root.path(), Path::new("alias/file.txt")).unwrap();
        assert!(resolved.ends_with("file.txt"));
    }
}

#[test]
fn rejects_absolute_path_escape_disguised_as_relative() {
    let root = tempfile::tempdir().unwrap();
    let err = safe_join(root.path(), Path::new("../outside.txt")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::PathEscape);
}
