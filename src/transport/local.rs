// BlockVault content-addressed cache.
// Copyright 2024 The BlockVault Authors.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the MIT license. See LICENSE for details.

//! Local-disk [`Transport`] implementation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{Kind, ListDir, Metadata, Transport, TMP_PREFIX};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Debug)]
pub struct LocalTransport {
    root: PathBuf,
}

impl LocalTransport {
    pub fn new(root: &Path) -> LocalTransport {
        LocalTransport {
            root: root.to_path_buf(),
        }
    }

    fn full_path(&self, relpath: &str) -> PathBuf {
        if relpath.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relpath)
        }
    }

    fn temp_name() -> String {
        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("{TMP_PREFIX}{}-{n}", std::process::id())
    }
}

impl Transport for LocalTransport {
    fn list_dir(&self, relpath: &str) -> io::Result<ListDir> {
        let path = self.full_path(relpath);
        let mut out = ListDir::default();
        let read_dir = match fs::read_dir(&path) {
            Ok(rd) => rd,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(out),
            Err(err) => return Err(err),
        };
        for entry in read_dir {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(TMP_PREFIX) {
                continue;
            }
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                out.dirs.push(name);
            } else if file_type.is_file() {
                out.files.push(name);
            }
        }
        Ok(out)
    }

    fn read_file(&self, relpath: &str) -> io::Result<Vec<u8>> {
        fs::read(self.full_path(relpath))
    }

    fn exists(&self, relpath: &str) -> io::Result<bool> {
        match fs::symlink_metadata(self.full_path(relpath)) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn metadata(&self, relpath: &str) -> io::Result<Metadata> {
        let meta = fs::metadata(self.full_path(relpath))?;
        let kind = if meta.is_dir() {
            Kind::Dir
        } else if meta.is_file() {
            Kind::File
        } else {
            Kind::Other
        };
        Ok(Metadata {
            kind,
            len: meta.len(),
        })
    }

    fn create_dir(&self, relpath: &str) -> io::Result<()> {
        match fs::create_dir_all(self.full_path(relpath)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn write_file(&self, relpath: &str, content: &[u8]) -> io::Result<()> {
        let final_path = self.full_path(relpath);
        let parent = final_path.parent().expect("relpath has a parent");
        let tmp_path = parent.join(Self::temp_name());
        fs::write(&tmp_path, content)?;
        // Best-effort: only regular files need fsync before rename; errors
        // here aren't fatal to correctness of the rename itself.
        if let Ok(f) = fs::File::open(&tmp_path) {
            let _ = f.sync_all();
        }
        fs::rename(&tmp_path, &final_path)
    }

    fn remove_file(&self, relpath: &str) -> io::Result<()> {
        match fs::remove_file(self.full_path(relpath)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn local_path(&self, relpath: &str) -> Option<PathBuf> {
        Some(self.full_path(relpath))
    }
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn write_then_read_roundtrips() {
        let tempdir = TempDir::new().unwrap();
        let transport = LocalTransport::new(tempdir.path());
        transport.write_file("hello.txt", b"hello").unwrap();
        assert_eq!(transport.read_file("hello.txt").unwrap(), b"hello");
    }

    #[test]
    fn write_leaves_no_temp_file_behind() {
        let tempdir = TempDir::new().unwrap();
        let transport = LocalTransport::new(tempdir.path());
        transport.write_file("hello.txt", b"hello").unwrap();
        let listed = transport.list_dir("").unwrap();
        assert_eq!(listed.files, vec!["hello.txt".to_string()]);
    }

    #[test]
    fn list_dir_on_missing_directory_is_empty_not_error() {
        let tempdir = TempDir::new().unwrap();
        let transport = LocalTransport::new(tempdir.path());
        let listed = transport.list_dir("nonexistent").unwrap();
        assert_eq!(listed, ListDir::default());
    }

    #[test]
    fn remove_missing_file_is_not_an_error() {
        let tempdir = TempDir::new().unwrap();
        let transport = LocalTransport::new(tempdir.path());
        transport.remove_file("absent").unwrap();
    }

    #[test]
    fn exists_distinguishes_files_and_absence() {
        let tempdir = TempDir::new().unwrap();
        let transport = LocalTransport::new(tempdir.path());
        assert!(!transport.exists("a").unwrap());
        transport.write_file("a", b"x").unwrap();
        assert!(transport.exists("a").unwrap());
    }
}
