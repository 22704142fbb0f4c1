use super::Directory;
use crate::error::ArborError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Real-filesystem backend. Writes go through a tempfile in the same
/// directory and are published with an atomic rename; with `sync` set,
/// both the file and its directory are fsynced before the write returns.
pub struct FsDir {
    root: PathBuf,
    sync: bool,
}

impl FsDir {
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, ArborError> {
        Self::with_sync(root, true)
    }

    pub fn with_sync(root: impl Into<PathBuf>, sync: bool) -> Result<Self, ArborError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, sync })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }
}

impl Directory for FsDir {
    fn subdir(&self, name: &str, create: bool) -> Result<Box<dyn Directory>, ArborError> {
        let path = self.root.join(name);
        if create {
            fs::create_dir_all(&path)?;
        } else if !path.is_dir() {
            return Err(ArborError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such directory: {}", path.display()),
            )));
        }
        Ok(Box::new(FsDir {
            root: path,
            sync: self.sync,
        }))
    }

    fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), ArborError> {
        let target = self.root.join(name);
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        if self.sync {
            tmp.as_file().sync_all()?;
        }
        tmp.persist(&target).map_err(|e| ArborError::Io(e.error))?;
        if self.sync {
            fsync_dir(&self.root)?;
        }
        Ok(())
    }

    fn read_file(&self, name: &str) -> Result<Vec<u8>, ArborError> {
        Ok(fs::read(self.root.join(name))?)
    }

    fn has_subdir(&self, name: &str) -> bool {
        self.root.join(name).is_dir()
    }

    fn clone_dir(&self) -> Box<dyn Directory> {
        Box::new(FsDir {
            root: self.root.clone(),
            sync: self.sync,
        })
    }
}

fn fsync_dir(path: &Path) -> Result<(), ArborError> {
    let dir = fs::File::open(path)?;
    dir.sync_all()?;
    Ok(())
}
