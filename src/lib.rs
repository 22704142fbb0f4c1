//! arbordb: an in-memory, schema-defined object graph with transactional
//! scoped editors and a mirrored on-disk directory/JSON projection.
//!
//! The application declares nested record types and keyed collections with
//! a schema builder; instances live in memory as a strongly-typed tree and
//! on disk as a directory hierarchy of `data.json` leaves. All mutation
//! goes through [`Editor`]s, which behave as ACID transactions over the
//! subtree they cover: two-phase bottom-up commit, user callbacks that can
//! veto, and exact reverse-order rollback.

pub mod api;
pub mod callbacks;
pub mod codec;
pub mod config;
pub mod error;
pub mod schema;
pub mod storage;
pub mod tree;
pub mod value;
pub mod visit;

mod edit;
mod persist;

pub use config::ArborConfig;
pub use edit::Editor;
pub use error::{ArborError, ArborErrorCode};
pub use schema::{FieldDef, FieldKind, KeySpec, RecordSchema, SchemaBuilder, TargetPath, TargetStep};
pub use storage::{Directory, FsDir, MemDir};
pub use tree::{FieldInit, NodeId, RecordInit, Seg, Store, StoreBuilder};
pub use value::{Key, KeyType, ScalarType, Value};

use parking_lot::{Mutex, MutexGuard};

/// Builds a `[Seg]` path from field names and keys:
/// `path!["cont", 3i64, "test2"]`.
#[macro_export]
macro_rules! path {
    ($($seg:expr),* $(,)?) => {
        [$($crate::Seg::from($seg)),*]
    };
}

/// The core is single-writer: a [`Store`] hands out one editor at a time
/// through `&mut self`. `SharedStore` is the documented way to share a
/// store across threads; every access serializes on the mutex.
pub struct SharedStore {
    inner: Mutex<Store>,
}

impl SharedStore {
    pub fn new(store: Store) -> Self {
        Self {
            inner: Mutex::new(store),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Store> {
        self.inner.lock()
    }

    pub fn into_inner(self) -> Store {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use crate::schema::RecordSchema;
    use crate::tree::{RecordInit, Store};
    use crate::value::{ScalarType, Value};

    #[test]
    fn shared_store_serializes_access() {
        let schema = RecordSchema::build("root")
            .scalar("num", ScalarType::Integer)
            .finish()
            .expect("schema");
        let store = Store::build(schema, RecordInit::new().scalar(3i64))
            .create()
            .expect("create");
        let shared = super::SharedStore::new(store);
        {
            let mut guard = shared.lock();
            let mut edit = guard.edit(&crate::path!["num"]).expect("edit");
            edit.set(&[], 4i64).expect("set");
            edit.commit().expect("commit");
        }
        let guard = shared.lock();
        assert_eq!(
            guard.scalar(&crate::path!["num"]).expect("num"),
            &Value::Integer(4)
        );
    }
}
