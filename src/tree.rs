//! The in-memory object graph: a slotmap arena of typed nodes with parent
//! back-pointers, plus the `Store` facade over it.

use crate::callbacks::{ChangeHook, EntryHook, RecordHook};
use crate::config::ArborConfig;
use crate::error::ArborError;
use crate::persist;
use crate::schema::{FieldKind, RecordSchema, TargetPath, TargetStep};
use crate::storage::Directory;
use crate::value::{Key, KeyType, ScalarType, Value};
use im::OrdMap;
use slotmap::SlotMap;
use std::sync::Arc;

slotmap::new_key_type! {
    /// Stable identity of a node in the graph. Generation-checked, so a
    /// stale id from an erased element never aliases a new node.
    pub struct NodeId;
}

/// One step of a path through the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seg {
    Field(String),
    Key(Key),
}

impl From<&str> for Seg {
    fn from(name: &str) -> Self {
        Seg::Field(name.to_string())
    }
}

impl From<i64> for Seg {
    fn from(key: i64) -> Self {
        Seg::Key(Key::Int(key))
    }
}

impl From<u64> for Seg {
    fn from(key: u64) -> Self {
        Seg::Key(Key::Uint(key))
    }
}

impl From<Key> for Seg {
    fn from(key: Key) -> Self {
        Seg::Key(key)
    }
}

pub(crate) struct ScalarNode {
    pub ty: ScalarType,
    pub value: Value,
    pub hooks: Vec<ChangeHook>,
}

pub(crate) struct RecordNode {
    pub schema: Arc<RecordSchema>,
    pub fields: Vec<NodeId>,
    pub hooks: Vec<RecordHook>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ContainerMode {
    Owning,
    Subset { target: TargetPath },
    Constrained { target: TargetPath },
}

pub(crate) struct ContainerNode {
    pub mode: ContainerMode,
    pub value_schema: Option<Arc<RecordSchema>>,
    /// Key field name inside the element schema; `None` for subsets.
    pub key_field: Option<String>,
    pub key_ty: KeyType,
    /// Entry node ids; `None` marks a non-owning subset reference.
    pub entries: OrdMap<Key, Option<NodeId>>,
    pub insert_hooks: Vec<EntryHook>,
    pub erase_hooks: Vec<EntryHook>,
    /// Subsets and constrained sets that track renames in this container.
    pub watchers: Vec<NodeId>,
}

impl ContainerNode {
    pub fn is_owning_kind(&self) -> bool {
        !matches!(self.mode, ContainerMode::Subset { .. })
    }
}

pub(crate) enum NodeKind {
    Scalar(ScalarNode),
    Record(RecordNode),
    Container(ContainerNode),
}

pub(crate) struct Node {
    pub parent: Option<NodeId>,
    /// Name under the parent: the schema field name, or for container
    /// elements the stringified key.
    pub field_name: String,
    pub dir: Option<Box<dyn Directory>>,
    pub is_edited: bool,
    pub kind: NodeKind,
}

impl Node {
    pub fn as_scalar(&self) -> &ScalarNode {
        match &self.kind {
            NodeKind::Scalar(s) => s,
            _ => panic!("node is not a scalar"),
        }
    }

    pub fn as_record(&self) -> &RecordNode {
        match &self.kind {
            NodeKind::Record(r) => r,
            _ => panic!("node is not a record"),
        }
    }

    pub fn as_container(&self) -> &ContainerNode {
        match &self.kind {
            NodeKind::Container(c) => c,
            _ => panic!("node is not a container"),
        }
    }
}

/// Positional initial values for a record, matching its schema order.
#[derive(Debug, Clone, Default)]
pub struct RecordInit {
    pub(crate) fields: Vec<FieldInit>,
}

#[derive(Debug, Clone)]
pub enum FieldInit {
    Scalar(Value),
    Record(RecordInit),
    Container,
}

impl RecordInit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scalar(mut self, v: impl Into<Value>) -> Self {
        self.fields.push(FieldInit::Scalar(v.into()));
        self
    }

    pub fn record(mut self, init: RecordInit) -> Self {
        self.fields.push(FieldInit::Record(init));
        self
    }

    pub fn container(mut self) -> Self {
        self.fields.push(FieldInit::Container);
        self
    }
}

/// Schema-defined object graph with a single root record.
pub struct Store {
    pub(crate) nodes: SlotMap<NodeId, Node>,
    pub(crate) root: NodeId,
    pub(crate) config: ArborConfig,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

pub struct StoreBuilder {
    schema: Arc<RecordSchema>,
    init: RecordInit,
    dir: Option<Box<dyn Directory>>,
    field: String,
    config: ArborConfig,
}

impl StoreBuilder {
    pub fn dir(mut self, dir: Box<dyn Directory>) -> Self {
        self.dir = Some(dir);
        self
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn config(mut self, config: ArborConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the tree and performs the initial commit: with a directory
    /// attached this writes every record's `data.json`; without one it is
    /// a no-op. No callbacks exist yet, so the commit cannot be vetoed.
    pub fn create(self) -> Result<Store, ArborError> {
        let root_dir = match self.dir {
            Some(d) if self.field.is_empty() => Some(d),
            Some(d) => Some(d.subdir(&self.field, true)?),
            None => None,
        };
        let mut nodes = SlotMap::with_key();
        let persistent = root_dir.is_some();
        let root = build_record(&mut nodes, &self.schema, self.init, None, &self.field, root_dir)?;
        let mut store = Store {
            nodes,
            root,
            config: self.config,
        };
        persist::persist_subtree(&mut store, root)?;
        if persistent {
            tracing::info!(schema = %store.nodes[root].as_record().schema.name, "created persistent store");
        }
        Ok(store)
    }
}

impl Store {
    pub fn build(schema: Arc<RecordSchema>, init: RecordInit) -> StoreBuilder {
        StoreBuilder {
            schema,
            init,
            dir: None,
            field: String::new(),
            config: ArborConfig::default(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn config(&self) -> &ArborConfig {
        &self.config
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node).and_then(|n| n.parent)
    }

    pub fn node_at(&self, path: &[Seg]) -> Result<NodeId, ArborError> {
        self.node_from(self.root, path)
    }

    pub fn node_from(&self, base: NodeId, path: &[Seg]) -> Result<NodeId, ArborError> {
        let mut cur = base;
        for seg in path {
            cur = self.step(cur, seg)?;
        }
        Ok(cur)
    }

    fn step(&self, node: NodeId, seg: &Seg) -> Result<NodeId, ArborError> {
        let n = self
            .nodes
            .get(node)
            .ok_or_else(|| ArborError::NodeNotFound {
                path: format!("{seg:?}"),
            })?;
        match (&n.kind, seg) {
            (NodeKind::Record(rec), Seg::Field(name)) => {
                let (idx, _) = rec.schema.field(name).ok_or_else(|| ArborError::UnknownField {
                    record: rec.schema.name.clone(),
                    field: name.clone(),
                })?;
                Ok(rec.fields[idx])
            }
            (NodeKind::Container(cnt), Seg::Key(key)) => match cnt.entries.get(key) {
                Some(Some(id)) => Ok(*id),
                Some(None) => {
                    let target = self.resolve_target(node)?;
                    match self.nodes[target].as_container().entries.get(key) {
                        Some(Some(id)) => Ok(*id),
                        _ => Err(ArborError::KeyNotFound {
                            container: n.field_name.clone(),
                            key: key.to_string(),
                        }),
                    }
                }
                None => Err(ArborError::KeyNotFound {
                    container: n.field_name.clone(),
                    key: key.to_string(),
                }),
            },
            _ => Err(ArborError::NodeNotFound {
                path: format!("{seg:?}"),
            }),
        }
    }

    pub fn scalar(&self, path: &[Seg]) -> Result<&Value, ArborError> {
        self.scalar_of(self.root, path)
    }

    pub fn scalar_of(&self, base: NodeId, path: &[Seg]) -> Result<&Value, ArborError> {
        let id = self.node_from(base, path)?;
        match &self.nodes[id].kind {
            NodeKind::Scalar(s) => Ok(&s.value),
            _ => Err(ArborError::Validation("path is not a scalar".into())),
        }
    }

    pub fn contains(&self, path: &[Seg], key: &Key) -> Result<bool, ArborError> {
        let cnt = self.container_at(path)?;
        Ok(cnt.entries.contains_key(key))
    }

    pub fn len(&self, path: &[Seg]) -> Result<usize, ArborError> {
        Ok(self.container_at(path)?.entries.len())
    }

    pub fn keys(&self, path: &[Seg]) -> Result<Vec<Key>, ArborError> {
        Ok(self.container_at(path)?.entries.keys().cloned().collect())
    }

    /// Resolves an element, following subset references into the target.
    pub fn element(&self, path: &[Seg], key: &Key) -> Result<NodeId, ArborError> {
        let id = self.node_at(path)?;
        self.step(id, &Seg::Key(key.clone()))
    }

    /// ConstrainedSet sibling lookup: the target container's value at
    /// `key`, resolved live through the target path.
    pub fn sibling(&self, path: &[Seg], key: &Key) -> Result<NodeId, ArborError> {
        let id = self.node_at(path)?;
        let node = &self.nodes[id];
        let NodeKind::Container(cnt) = &node.kind else {
            return Err(ArborError::Validation("path is not a container".into()));
        };
        if !matches!(cnt.mode, ContainerMode::Constrained { .. }) {
            return Err(ArborError::Validation(
                "sibling lookup requires a constrained set".into(),
            ));
        }
        let target = self.resolve_target(id)?;
        match self.nodes[target].as_container().entries.get(key) {
            Some(Some(elem)) => Ok(*elem),
            _ => Err(ArborError::KeyNotFound {
                container: self.nodes[target].field_name.clone(),
                key: key.to_string(),
            }),
        }
    }

    pub fn serialize(&self, path: &[Seg]) -> Result<serde_json::Value, ArborError> {
        let id = self.node_at(path)?;
        persist::serialize_node(self, id)
    }

    pub fn serialize_node(&self, node: NodeId) -> Result<serde_json::Value, ArborError> {
        persist::serialize_node(self, node)
    }

    fn container_at(&self, path: &[Seg]) -> Result<&ContainerNode, ArborError> {
        let id = self.node_at(path)?;
        match &self.nodes[id].kind {
            NodeKind::Container(c) => Ok(c),
            _ => Err(ArborError::Validation("path is not a container".into())),
        }
    }

    /// Applies a set node's target path. The result must be an owning
    /// container.
    pub(crate) fn resolve_target(&self, set_node: NodeId) -> Result<NodeId, ArborError> {
        let target_path = match &self.nodes[set_node].kind {
            NodeKind::Container(c) => match &c.mode {
                ContainerMode::Subset { target } | ContainerMode::Constrained { target } => {
                    target.clone()
                }
                ContainerMode::Owning => {
                    return Err(ArborError::IntegrityError {
                        message: "owning container has no target".into(),
                    });
                }
            },
            _ => {
                return Err(ArborError::IntegrityError {
                    message: "target resolution from a non-container".into(),
                });
            }
        };
        let mut cur = set_node;
        for step in &target_path.0 {
            cur = match step {
                TargetStep::Parent => {
                    self.nodes[cur]
                        .parent
                        .ok_or_else(|| ArborError::IntegrityError {
                            message: "target path walked past the root".into(),
                        })?
                }
                TargetStep::Field(name) => self.step(cur, &Seg::Field(name.clone()))?,
            };
        }
        match &self.nodes[cur].kind {
            NodeKind::Container(c) if matches!(c.mode, ContainerMode::Owning) => Ok(cur),
            _ => Err(ArborError::IntegrityError {
                message: "target path does not end at an owning container".into(),
            }),
        }
    }

    pub(crate) fn register_watcher(&mut self, container: NodeId, watcher: NodeId) {
        let NodeKind::Container(cnt) = &mut self.nodes[container].kind else {
            return;
        };
        if !cnt.watchers.contains(&watcher) {
            cnt.watchers.push(watcher);
        }
    }

    /// Registers a change hook on a scalar. `action(old, new)` runs at
    /// commit and may veto by returning `Ok(false)`; `revert` is its undo
    /// twin and must not fail.
    pub fn on_change(
        &mut self,
        path: &[Seg],
        action: impl FnMut(&Value, &Value) -> Result<bool, ArborError> + Send + 'static,
        revert: impl FnMut(&Value, &Value) + Send + 'static,
    ) -> Result<(), ArborError> {
        let id = self.node_at(path)?;
        match &mut self.nodes[id].kind {
            NodeKind::Scalar(s) => {
                s.hooks.push(ChangeHook {
                    action: Box::new(action),
                    revert: Box::new(revert),
                });
                Ok(())
            }
            _ => Err(ArborError::Validation("path is not a scalar".into())),
        }
    }

    pub fn on_record_change(
        &mut self,
        path: &[Seg],
        action: impl FnMut() -> Result<bool, ArborError> + Send + 'static,
        revert: impl FnMut() + Send + 'static,
    ) -> Result<(), ArborError> {
        let id = self.node_at(path)?;
        match &mut self.nodes[id].kind {
            NodeKind::Record(r) => {
                r.hooks.push(RecordHook {
                    action: Box::new(action),
                    revert: Box::new(revert),
                });
                Ok(())
            }
            _ => Err(ArborError::Validation("path is not a record".into())),
        }
    }

    /// Registers an insert hook. The hook is replayed over the entries
    /// already present; a veto or error during replay undoes the replayed
    /// prefix and the registration does not take effect.
    pub fn on_insert(
        &mut self,
        path: &[Seg],
        mut action: impl FnMut(&Key, &serde_json::Value) -> Result<bool, ArborError>
            + Send
            + 'static,
        mut revert: impl FnMut(&Key, &serde_json::Value) + Send + 'static,
    ) -> Result<(), ArborError> {
        let id = self.node_at(path)?;
        let snapshots = self.entry_snapshots(id)?;
        let mut done = 0;
        let mut outcome: Result<bool, ArborError> = Ok(true);
        for (i, (key, json)) in snapshots.iter().enumerate() {
            match action(key, json) {
                Ok(true) => done = i + 1,
                r => {
                    outcome = r;
                    break;
                }
            }
        }
        if !matches!(outcome, Ok(true)) {
            for (key, json) in snapshots[..done].iter().rev() {
                crate::callbacks::guard_revert(|| revert(key, json));
            }
            return match outcome {
                Ok(_) => Err(ArborError::Validation(
                    "insert hook rejected an existing entry".into(),
                )),
                Err(e) => Err(e),
            };
        }
        match &mut self.nodes[id].kind {
            NodeKind::Container(c) => {
                c.insert_hooks.push(EntryHook {
                    action: Box::new(action),
                    revert: Box::new(revert),
                });
                Ok(())
            }
            _ => unreachable!("entry_snapshots checked the kind"),
        }
    }

    pub fn on_erase(
        &mut self,
        path: &[Seg],
        action: impl FnMut(&Key, &serde_json::Value) -> Result<bool, ArborError>
            + Send
            + 'static,
        revert: impl FnMut(&Key, &serde_json::Value) + Send + 'static,
    ) -> Result<(), ArborError> {
        let id = self.node_at(path)?;
        match &mut self.nodes[id].kind {
            NodeKind::Container(c) => {
                c.erase_hooks.push(EntryHook {
                    action: Box::new(action),
                    revert: Box::new(revert),
                });
                Ok(())
            }
            _ => Err(ArborError::Validation("path is not a container".into())),
        }
    }

    pub(crate) fn entry_snapshots(
        &self,
        container: NodeId,
    ) -> Result<Vec<(Key, serde_json::Value)>, ArborError> {
        let NodeKind::Container(cnt) = &self.nodes[container].kind else {
            return Err(ArborError::Validation("path is not a container".into()));
        };
        let keys: Vec<Key> = cnt.entries.keys().cloned().collect();
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let elem = self.step(container, &Seg::Key(key.clone()))?;
            out.push((key, persist::serialize_node(self, elem)?));
        }
        Ok(out)
    }

    /// Attaches a directory to a store created without one, projecting the
    /// whole tree and performing the initial write. Attaching twice is a
    /// contract violation.
    pub fn attach_dir(
        &mut self,
        dir: Box<dyn Directory>,
        field: &str,
    ) -> Result<(), ArborError> {
        assert!(
            self.nodes[self.root].dir.is_none(),
            "attach_dir on a store that already has a directory"
        );
        let root_dir = if field.is_empty() {
            dir
        } else {
            dir.subdir(field, true)?
        };
        let root = self.root;
        attach_dir_rec(self, root, root_dir)?;
        persist::persist_subtree(self, root)
    }
}

pub(crate) fn attach_dir_rec(
    store: &mut Store,
    node: NodeId,
    dir: Box<dyn Directory>,
) -> Result<(), ArborError> {
    store.nodes[node].dir = Some(dir.clone_dir());
    let children: Vec<(NodeId, String)> = match &store.nodes[node].kind {
        NodeKind::Record(rec) => {
            let schema = rec.schema.clone();
            let fields = rec.fields.clone();
            schema
                .fields
                .iter()
                .zip(fields)
                .filter(|(def, _)| {
                    matches!(
                        def.kind,
                        FieldKind::Record(_)
                            | FieldKind::Container { .. }
                            | FieldKind::Constrained { .. }
                    )
                })
                .map(|(def, id)| (id, def.name.clone()))
                .collect()
        }
        NodeKind::Container(cnt) => cnt
            .entries
            .iter()
            .filter_map(|(k, v)| v.map(|id| (id, k.to_string())))
            .collect(),
        NodeKind::Scalar(_) => Vec::new(),
    };
    for (child, name) in children {
        let sub = dir.subdir(&name, true)?;
        attach_dir_rec(store, child, sub)?;
    }
    Ok(())
}

pub(crate) fn build_record(
    nodes: &mut SlotMap<NodeId, Node>,
    schema: &Arc<RecordSchema>,
    init: RecordInit,
    parent: Option<NodeId>,
    field_name: &str,
    dir: Option<Box<dyn Directory>>,
) -> Result<NodeId, ArborError> {
    if init.fields.len() != schema.fields.len() {
        return Err(ArborError::Validation(format!(
            "record '{}' takes {} initializers, got {}",
            schema.name,
            schema.fields.len(),
            init.fields.len()
        )));
    }
    let id = nodes.insert(Node {
        parent,
        field_name: field_name.to_string(),
        dir: dir.as_ref().map(|d| d.clone_dir()),
        is_edited: false,
        kind: NodeKind::Record(RecordNode {
            schema: schema.clone(),
            fields: Vec::new(),
            hooks: Vec::new(),
        }),
    });
    let mut children = Vec::with_capacity(schema.fields.len());
    for (def, field_init) in schema.fields.iter().zip(init.fields) {
        let child = match (&def.kind, field_init) {
            (FieldKind::Scalar { ty, .. }, FieldInit::Scalar(value)) => {
                if !ty.matches(&value) {
                    return Err(ArborError::TypeMismatch {
                        field: def.name.clone(),
                        expected: ty.name(),
                        actual: value.kind_name().to_string(),
                    });
                }
                nodes.insert(Node {
                    parent: Some(id),
                    field_name: def.name.clone(),
                    dir: None,
                    is_edited: false,
                    kind: NodeKind::Scalar(ScalarNode {
                        ty: ty.clone(),
                        value,
                        hooks: Vec::new(),
                    }),
                })
            }
            (FieldKind::Record(sub_schema), FieldInit::Record(sub_init)) => {
                let sub_dir = subdir_of(&dir, &def.name)?;
                build_record(nodes, sub_schema, sub_init, Some(id), &def.name, sub_dir)?
            }
            (FieldKind::Container { value, key }, FieldInit::Container) => {
                let sub_dir = subdir_of(&dir, &def.name)?;
                insert_container(
                    nodes,
                    id,
                    &def.name,
                    sub_dir,
                    ContainerMode::Owning,
                    Some(value.clone()),
                    Some(key.field.clone()),
                    key.ty,
                )
            }
            (FieldKind::Subset { key_type, target }, FieldInit::Container) => insert_container(
                nodes,
                id,
                &def.name,
                None,
                ContainerMode::Subset {
                    target: target.clone(),
                },
                None,
                None,
                *key_type,
            ),
            (FieldKind::Constrained { value, key, target }, FieldInit::Container) => {
                let sub_dir = subdir_of(&dir, &def.name)?;
                insert_container(
                    nodes,
                    id,
                    &def.name,
                    sub_dir,
                    ContainerMode::Constrained {
                        target: target.clone(),
                    },
                    Some(value.clone()),
                    Some(key.field.clone()),
                    key.ty,
                )
            }
            (_, got) => {
                return Err(ArborError::Validation(format!(
                    "initializer for field '{}' does not match its kind: {got:?}",
                    def.name
                )));
            }
        };
        children.push(child);
    }
    match &mut nodes[id].kind {
        NodeKind::Record(rec) => rec.fields = children,
        _ => unreachable!(),
    }
    Ok(id)
}

#[allow(clippy::too_many_arguments)]
fn insert_container(
    nodes: &mut SlotMap<NodeId, Node>,
    parent: NodeId,
    field_name: &str,
    dir: Option<Box<dyn Directory>>,
    mode: ContainerMode,
    value_schema: Option<Arc<RecordSchema>>,
    key_field: Option<String>,
    key_ty: KeyType,
) -> NodeId {
    nodes.insert(Node {
        parent: Some(parent),
        field_name: field_name.to_string(),
        dir,
        is_edited: false,
        kind: NodeKind::Container(ContainerNode {
            mode,
            value_schema,
            key_field,
            key_ty,
            entries: OrdMap::new(),
            insert_hooks: Vec::new(),
            erase_hooks: Vec::new(),
            watchers: Vec::new(),
        }),
    })
}

fn subdir_of(
    dir: &Option<Box<dyn Directory>>,
    name: &str,
) -> Result<Option<Box<dyn Directory>>, ArborError> {
    match dir {
        Some(d) => Ok(Some(d.subdir(name, true)?)),
        None => Ok(None),
    }
}

/// Removes a node and everything it owns from the arena.
pub(crate) fn free_subtree(store: &mut Store, node: NodeId) {
    let Some(n) = store.nodes.remove(node) else {
        return;
    };
    match n.kind {
        NodeKind::Scalar(_) => {}
        NodeKind::Record(rec) => {
            for field in rec.fields {
                free_subtree(store, field);
            }
        }
        NodeKind::Container(cnt) => {
            for (_, entry) in cnt.entries {
                if let Some(id) = entry {
                    free_subtree(store, id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RecordInit, Seg, Store};
    use crate::schema::{RecordSchema, TargetPath};
    use crate::value::{Key, KeyType, ScalarType, Value};
    use std::sync::Arc;

    fn base_schema() -> Arc<RecordSchema> {
        RecordSchema::build("root")
            .scalar("prova", ScalarType::Text)
            .scalar("num", ScalarType::Integer)
            .scalar("test", ScalarType::List(Box::new(ScalarType::Integer)))
            .finish()
            .expect("schema")
    }

    fn base_init() -> RecordInit {
        RecordInit::new()
            .scalar("ciao")
            .scalar(3i64)
            .scalar(vec![1i64, 2, 3])
    }

    #[test]
    fn create_and_read_back() {
        let store = Store::build(base_schema(), base_init())
            .create()
            .expect("create");
        assert_eq!(store.scalar(&["num".into()]).expect("num"), &Value::Integer(3));
        assert_eq!(
            store.scalar(&["prova".into()]).expect("prova"),
            &Value::from("ciao")
        );
    }

    #[test]
    fn arity_mismatch_rejected() {
        let err = Store::build(base_schema(), RecordInit::new().scalar("ciao"))
            .create()
            .expect_err("arity");
        assert_eq!(err.code_str(), "validation");
    }

    #[test]
    fn type_mismatch_rejected() {
        let init = RecordInit::new()
            .scalar(1i64)
            .scalar(3i64)
            .scalar(vec![1i64]);
        let err = Store::build(base_schema(), init).create().expect_err("type");
        assert_eq!(err.code_str(), "type_mismatch");
    }

    #[test]
    fn parent_pointers_form_a_tree() {
        let nested = RecordSchema::build("nested")
            .scalar("prova", ScalarType::Text)
            .finish()
            .expect("nested");
        let schema = RecordSchema::build("root")
            .scalar("vec", ScalarType::List(Box::new(ScalarType::Integer)))
            .record("data", nested)
            .finish()
            .expect("schema");
        let init = RecordInit::new()
            .scalar(vec![1i64, 3])
            .record(RecordInit::new().scalar("ciao"));
        let store = Store::build(schema, init).create().expect("create");
        assert_eq!(store.parent(store.root()), None);
        let data = store.node_at(&["data".into()]).expect("data");
        assert_eq!(store.parent(data), Some(store.root()));
    }

    #[test]
    fn subset_target_resolves_to_owning_container() {
        let elem = RecordSchema::build("foo")
            .scalar("test", ScalarType::Integer)
            .scalar("test2", ScalarType::Integer)
            .finish()
            .expect("elem");
        let schema = RecordSchema::build("root")
            .container("cont", elem, "test")
            .subset("sub", KeyType::Int, TargetPath::parent().field("cont"))
            .finish()
            .expect("schema");
        let store = Store::build(schema, RecordInit::new().container().container())
            .create()
            .expect("create");
        let sub = store.node_at(&["sub".into()]).expect("sub");
        let cont = store.node_at(&["cont".into()]).expect("cont");
        assert_eq!(store.resolve_target(sub).expect("target"), cont);
        assert!(!store.contains(&["cont".into()], &Key::Int(3)).expect("contains"));
    }

    #[test]
    fn path_segments_convert() {
        assert_eq!(Seg::from("a"), Seg::Field("a".into()));
        assert_eq!(Seg::from(3i64), Seg::Key(Key::Int(3)));
    }
}
