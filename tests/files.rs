// tests/files.rs

//! File serializer tests: isolation between files and lifecycle.

use lockmgr::{ErrorKind, FileSerializer};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_appends_to_different_files_are_isolated() {
    let temp_dir = TempDir::new().unwrap();
    let files = FileSerializer::new(temp_dir.path()).with_file_count(8);
    files.create_all().unwrap();

    std::thread::scope(|s| {
        for index in 0..8 {
            let files = &files;
            s.spawn(move || {
                let name = format!("file_{}", index);
                for n in 0..50 {
                    files.append(&name, format!("{}:{}\n", index, n).as_bytes()).unwrap();
                }
            });
        }
    });

    for index in 0..8 {
        let content = fs::read_to_string(temp_dir.path().join(format!("file_{}", index))).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 50);
        // Single writer per file, so order is preserved
        for (n, line) in lines.iter().enumerate() {
            assert_eq!(*line, format!("{}:{}", index, n));
        }
    }
}

#[test]
fn test_bootstrap_twice_preserves_content() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("data");

    let first = FileSerializer::new(&data_dir);
    assert_eq!(first.create_all().unwrap(), 100);
    first.append("file_99", b"survives").unwrap();
    first.cleanup();

    let second = FileSerializer::new(&data_dir);
    assert_eq!(second.create_all().unwrap(), 0);
    assert_eq!(fs::read(data_dir.join("file_99")).unwrap(), b"survives");
    assert_eq!(fs::read_dir(&data_dir).unwrap().count(), 100);
}

#[test]
fn test_cleanup_racing_appends_loses_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let files = FileSerializer::new(temp_dir.path()).with_file_count(2);
    files.create_all().unwrap();

    std::thread::scope(|s| {
        for _ in 0..4 {
            let files = &files;
            s.spawn(move || {
                for _ in 0..200 {
                    files.append("file_1", b"x").unwrap();
                }
            });
        }
        let files = &files;
        s.spawn(move || {
            for _ in 0..50 {
                files.cleanup();
                std::thread::yield_now();
            }
        });
    });

    let len = fs::metadata(temp_dir.path().join("file_1")).unwrap().len();
    assert_eq!(len, 800);
}

#[test]
fn test_validation_uses_configured_count() {
    let temp_dir = TempDir::new().unwrap();
    let files = FileSerializer::new(temp_dir.path()).with_file_count(3);

    assert!(files.append("file_2", b"ok").is_ok());
    let err = files.append("file_3", b"no").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(!temp_dir.path().join("file_3").exists());
}
