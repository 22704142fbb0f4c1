use super::Directory;
use crate::error::ArborError;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default)]
struct MemTree {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeMap<String, Arc<Mutex<MemTree>>>,
}

/// In-memory backend. Clones share the underlying tree, so a handle kept
/// from before a write observes the write — the same aliasing the
/// filesystem backend has.
pub struct MemDir {
    tree: Arc<Mutex<MemTree>>,
}

impl MemDir {
    pub fn new() -> Self {
        Self {
            tree: Arc::new(Mutex::new(MemTree::default())),
        }
    }
}

impl Default for MemDir {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory for MemDir {
    fn subdir(&self, name: &str, create: bool) -> Result<Box<dyn Directory>, ArborError> {
        let mut tree = self.tree.lock();
        if let Some(child) = tree.dirs.get(name) {
            return Ok(Box::new(MemDir {
                tree: child.clone(),
            }));
        }
        if !create {
            return Err(ArborError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such directory: {name}"),
            )));
        }
        let child = Arc::new(Mutex::new(MemTree::default()));
        tree.dirs.insert(name.to_string(), child.clone());
        Ok(Box::new(MemDir { tree: child }))
    }

    fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), ArborError> {
        self.tree
            .lock()
            .files
            .insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn read_file(&self, name: &str) -> Result<Vec<u8>, ArborError> {
        self.tree.lock().files.get(name).cloned().ok_or_else(|| {
            ArborError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such file: {name}"),
            ))
        })
    }

    fn has_subdir(&self, name: &str) -> bool {
        self.tree.lock().dirs.contains_key(name)
    }

    fn clone_dir(&self) -> Box<dyn Directory> {
        Box::new(MemDir {
            tree: self.tree.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::MemDir;
    use crate::storage::Directory;

    #[test]
    fn clones_share_the_tree() {
        let dir = MemDir::new();
        let alias = dir.clone_dir();
        dir.write_file("data.json", b"x").expect("write");
        assert_eq!(alias.read_file("data.json").expect("read"), b"x");

        let sub = dir.subdir("child", true).expect("subdir");
        sub.write_file("data.json", b"y").expect("write sub");
        assert_eq!(
            alias
                .subdir("child", false)
                .expect("reopen")
                .read_file("data.json")
                .expect("read sub"),
            b"y"
        );
    }

    #[test]
    fn missing_entries_error() {
        let dir = MemDir::new();
        assert!(dir.read_file("nope").is_err());
        assert!(dir.subdir("nope", false).is_err());
        assert!(!dir.has_subdir("nope"));
    }
}
