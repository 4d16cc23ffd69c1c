// (C) Copyright 2019-2020 Hewlett Packard Enterprise Development LP

use std::cell::RefCell;
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use snafu::ResultExt;

use crate::error::{self, Result};

/// A seekable, writable stream a [`ContentStore::Reader`] can be backed by.
pub trait ReadWriteSeek: Read + Write + Seek {}
impl<T: Read + Write + Seek> ReadWriteSeek for T {}

/// Where the canonical Dockerfile text lives and how it's read back.
///
/// `Path` re-reads the file on every [`ContentStore::content`] call unless
/// `cache` is set, in which case the first read is kept and subsequent
/// writes update both the cache and the file. `Reader` has no "re-open"
/// semantics the way a path does, so its content is always cached after
/// the first read.
pub enum ContentStore {
  Memory(String),
  Path { path: PathBuf, cache: bool, cached: RefCell<Option<String>> },
  Reader { reader: RefCell<Box<dyn ReadWriteSeek>>, cached: RefCell<Option<String>> },
}

/// Resolves a user-supplied path to the actual Dockerfile: a directory
/// gets `Dockerfile` appended; a path that already names a file is used
/// as-is.
fn resolve_path(path: &Path) -> PathBuf {
  if path.is_dir() {
    path.join("Dockerfile")
  } else {
    path.to_path_buf()
  }
}

impl ContentStore {
  pub fn memory(content: impl Into<String>) -> Self {
    ContentStore::Memory(content.into())
  }

  pub fn path(path: impl AsRef<Path>, cache: bool) -> Self {
    ContentStore::Path { path: resolve_path(path.as_ref()), cache, cached: RefCell::new(None) }
  }

  pub fn reader<R: ReadWriteSeek + 'static>(reader: R) -> Self {
    ContentStore::Reader { reader: RefCell::new(Box::new(reader)), cached: RefCell::new(None) }
  }

  pub fn content(&self) -> Result<String> {
    match self {
      ContentStore::Memory(s) => Ok(s.clone()),
      ContentStore::Path { path, cache, cached } => {
        if *cache {
          if let Some(s) = cached.borrow().as_ref() {
            return Ok(s.clone());
          }
        }
        let s = fs::read_to_string(path).context(error::Io)?;
        if *cache {
          *cached.borrow_mut() = Some(s.clone());
        }
        Ok(s)
      }
      ContentStore::Reader { reader, cached } => {
        if let Some(s) = cached.borrow().as_ref() {
          return Ok(s.clone());
        }
        let mut r = reader.borrow_mut();
        r.seek(SeekFrom::Start(0)).context(error::Io)?;
        let mut s = String::new();
        r.read_to_string(&mut s).context(error::Io)?;
        *cached.borrow_mut() = Some(s.clone());
        Ok(s)
      }
    }
  }

  pub fn set_content(&mut self, content: &str) -> Result<()> {
    match self {
      ContentStore::Memory(s) => {
        *s = content.to_string();
      }
      ContentStore::Path { path, cache, cached } => {
        fs::write(&path, content).context(error::Io)?;
        if *cache {
          *cached.borrow_mut() = Some(content.to_string());
        }
      }
      ContentStore::Reader { reader, cached } => {
        let mut r = reader.borrow_mut();
        r.seek(SeekFrom::Start(0)).context(error::Io)?;
        r.write_all(content.as_bytes()).context(error::Io)?;
        *cached.borrow_mut() = Some(content.to_string());
      }
    }
    Ok(())
  }
}
