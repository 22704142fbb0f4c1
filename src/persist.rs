//! On-disk projection: `data.json` serialization, the strict loader, and
//! the helpers commit uses to keep files equal to the in-memory tree.

use crate::codec;
use crate::config::ArborConfig;
use crate::error::ArborError;
use crate::schema::{FieldKind, RecordSchema};
use crate::storage::Directory;
use crate::tree::{
    ContainerMode, ContainerNode, Node, NodeId, NodeKind, RecordNode, ScalarNode, Store,
};
use crate::value::Key;
use im::OrdMap;
use serde_json::{Map, Value as Json};
use slotmap::SlotMap;
use std::sync::Arc;

pub(crate) fn serialize_node(store: &Store, node: NodeId) -> Result<Json, ArborError> {
    match &store.nodes[node].kind {
        NodeKind::Scalar(s) => codec::encode(&s.value),
        NodeKind::Record(rec) => {
            let mut obj = Map::new();
            for (def, child) in rec.schema.fields.iter().zip(&rec.fields) {
                if let FieldKind::Scalar {
                    skip_serialize: true,
                    ..
                } = def.kind
                {
                    continue;
                }
                obj.insert(def.name.clone(), serialize_node(store, *child)?);
            }
            Ok(Json::Object(obj))
        }
        NodeKind::Container(cnt) => Ok(Json::Array(
            cnt.entries.keys().map(codec::encode_key).collect(),
        )),
    }
}

/// Writes a record's `data.json` if it has a directory attached.
pub(crate) fn persist_record(store: &Store, node: NodeId) -> Result<(), ArborError> {
    let n = &store.nodes[node];
    let Some(dir) = &n.dir else {
        return Ok(());
    };
    debug_assert!(matches!(n.kind, NodeKind::Record(_)));
    let json = serialize_node(store, node)?;
    let bytes = encode_json(&json, &store.config)?;
    dir.write_file("data.json", &bytes)
}

/// Rewrites the record owning a container; the container's key list lives
/// in that record's `data.json`.
pub(crate) fn persist_owner(store: &Store, container: NodeId) -> Result<(), ArborError> {
    match store.nodes[container].parent {
        Some(parent) if matches!(store.nodes[parent].kind, NodeKind::Record(_)) => {
            persist_record(store, parent)
        }
        _ => Ok(()),
    }
}

/// Initial projection of a whole subtree: every record with a directory
/// writes its file.
pub(crate) fn persist_subtree(store: &mut Store, node: NodeId) -> Result<(), ArborError> {
    let children: Vec<NodeId> = match &store.nodes[node].kind {
        NodeKind::Scalar(_) => return Ok(()),
        NodeKind::Record(rec) => {
            persist_record(store, node)?;
            rec.fields.clone()
        }
        NodeKind::Container(cnt) => cnt.entries.values().filter_map(|v| *v).collect(),
    };
    for child in children {
        persist_subtree(store, child)?;
    }
    Ok(())
}

fn encode_json(json: &Json, config: &ArborConfig) -> Result<Vec<u8>, ArborError> {
    let bytes = if config.pretty_json {
        serde_json::to_vec_pretty(json)
    } else {
        serde_json::to_vec(json)
    };
    bytes.map_err(|e| ArborError::Encode(e.to_string()))
}

impl Store {
    /// Constructs a store from serialized JSON with no directory; containers
    /// with declared keys cannot be rebuilt this way and fail the load.
    pub fn from_json(schema: Arc<RecordSchema>, json: &Json) -> Result<Store, ArborError> {
        Self::from_json_at(schema, json, None, "")
    }

    /// Constructs a store from serialized JSON. Strict: a missing declared
    /// field, a wrong JSON kind, an unresolvable element directory or a
    /// key/directory mismatch all fail the load. Nothing is written back.
    pub fn from_json_at(
        schema: Arc<RecordSchema>,
        json: &Json,
        dir: Option<Box<dyn Directory>>,
        field: &str,
    ) -> Result<Store, ArborError> {
        let root_dir = match dir {
            Some(d) if field.is_empty() => Some(d),
            Some(d) => Some(d.subdir(field, true)?),
            None => None,
        };
        let mut nodes = SlotMap::with_key();
        let root = build_from_json(&mut nodes, &schema, json, None, field, root_dir)?;
        let mut store = Store {
            nodes,
            root,
            config: ArborConfig::default(),
        };
        validate_references(&mut store)?;
        Ok(store)
    }

    /// Reads `data.json` at `subdir(dir, field)` and rebuilds the tree.
    pub fn load(
        schema: Arc<RecordSchema>,
        dir: Box<dyn Directory>,
        field: &str,
    ) -> Result<Store, ArborError> {
        let sub = if field.is_empty() {
            dir
        } else {
            dir.subdir(field, false)?
        };
        let bytes = sub.read_file("data.json")?;
        let json: Json =
            serde_json::from_slice(&bytes).map_err(|e| ArborError::Decode(e.to_string()))?;
        let store = Self::from_json_at(schema, &json, Some(sub), "")?;
        tracing::info!(
            schema = %store.nodes[store.root].as_record().schema.name,
            "loaded store from directory"
        );
        Ok(store)
    }

    pub fn set_config(&mut self, config: ArborConfig) {
        self.config = config;
    }
}

fn build_from_json(
    nodes: &mut SlotMap<NodeId, Node>,
    schema: &Arc<RecordSchema>,
    json: &Json,
    parent: Option<NodeId>,
    field_name: &str,
    dir: Option<Box<dyn Directory>>,
) -> Result<NodeId, ArborError> {
    let Json::Object(obj) = json else {
        return Err(ArborError::Decode(format!(
            "record '{}' expects a JSON object",
            schema.name
        )));
    };
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
    for def in &schema.fields {
        let child = match &def.kind {
            FieldKind::Scalar { ty, skip_serialize } => {
                let value = if *skip_serialize {
                    ty.default_value()
                } else {
                    let j = obj.get(&def.name).ok_or_else(|| ArborError::MissingField {
                        record: schema.name.clone(),
                        field: def.name.clone(),
                    })?;
                    codec::decode(ty, j)?
                };
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
            FieldKind::Record(sub_schema) => {
                let j = obj.get(&def.name).ok_or_else(|| ArborError::MissingField {
                    record: schema.name.clone(),
                    field: def.name.clone(),
                })?;
                let sub_dir = match &dir {
                    Some(d) => Some(d.subdir(&def.name, true)?),
                    None => None,
                };
                build_from_json(nodes, sub_schema, j, Some(id), &def.name, sub_dir)?
            }
            FieldKind::Container { value, key } => {
                let j = obj.get(&def.name).ok_or_else(|| ArborError::MissingField {
                    record: schema.name.clone(),
                    field: def.name.clone(),
                })?;
                let sub_dir = match &dir {
                    Some(d) => Some(d.subdir(&def.name, true)?),
                    None => None,
                };
                load_container(
                    nodes,
                    id,
                    &def.name,
                    j,
                    sub_dir,
                    ContainerMode::Owning,
                    value,
                    &key.field,
                    key.ty,
                )?
            }
            FieldKind::Constrained { value, key, target } => {
                let j = obj.get(&def.name).ok_or_else(|| ArborError::MissingField {
                    record: schema.name.clone(),
                    field: def.name.clone(),
                })?;
                let sub_dir = match &dir {
                    Some(d) => Some(d.subdir(&def.name, true)?),
                    None => None,
                };
                load_container(
                    nodes,
                    id,
                    &def.name,
                    j,
                    sub_dir,
                    ContainerMode::Constrained {
                        target: target.clone(),
                    },
                    value,
                    &key.field,
                    key.ty,
                )?
            }
            FieldKind::Subset { key_type, target } => {
                let j = obj.get(&def.name).ok_or_else(|| ArborError::MissingField {
                    record: schema.name.clone(),
                    field: def.name.clone(),
                })?;
                let Json::Array(items) = j else {
                    return Err(ArborError::Decode(format!(
                        "subset '{}' expects a JSON array of keys",
                        def.name
                    )));
                };
                let mut entries = OrdMap::new();
                for item in items {
                    let key = codec::decode_key(*key_type, item)?;
                    if entries.insert(key.clone(), None).is_some() {
                        return Err(ArborError::DuplicateKey {
                            container: def.name.clone(),
                            key: key.to_string(),
                        });
                    }
                }
                nodes.insert(Node {
                    parent: Some(id),
                    field_name: def.name.clone(),
                    dir: None,
                    is_edited: false,
                    kind: NodeKind::Container(ContainerNode {
                        mode: ContainerMode::Subset {
                            target: target.clone(),
                        },
                        value_schema: None,
                        key_field: None,
                        key_ty: *key_type,
                        entries,
                        insert_hooks: Vec::new(),
                        erase_hooks: Vec::new(),
                        watchers: Vec::new(),
                    }),
                })
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
fn load_container(
    nodes: &mut SlotMap<NodeId, Node>,
    parent: NodeId,
    name: &str,
    json: &Json,
    dir: Option<Box<dyn Directory>>,
    mode: ContainerMode,
    value_schema: &Arc<RecordSchema>,
    key_field: &str,
    key_ty: crate::value::KeyType,
) -> Result<NodeId, ArborError> {
    let Json::Array(items) = json else {
        return Err(ArborError::Decode(format!(
            "container '{name}' expects a JSON array of keys"
        )));
    };
    let mut keys = Vec::with_capacity(items.len());
    for item in items {
        keys.push(codec::decode_key(key_ty, item)?);
    }
    if !keys.is_empty() && dir.is_none() {
        return Err(ArborError::MissingDirectory {
            container: name.to_string(),
        });
    }
    let id = nodes.insert(Node {
        parent: Some(parent),
        field_name: name.to_string(),
        dir: dir.as_ref().map(|d| d.clone_dir()),
        is_edited: false,
        kind: NodeKind::Container(ContainerNode {
            mode,
            value_schema: Some(value_schema.clone()),
            key_field: Some(key_field.to_string()),
            key_ty,
            entries: OrdMap::new(),
            insert_hooks: Vec::new(),
            erase_hooks: Vec::new(),
            watchers: Vec::new(),
        }),
    });
    for key in keys {
        let key_str = key.to_string();
        let cont_dir = dir.as_ref().expect("checked above");
        let elem_dir = cont_dir.subdir(&key_str, false).map_err(|_| {
            ArborError::MissingDirectory {
                container: format!("{name}/{key_str}"),
            }
        })?;
        let bytes = elem_dir.read_file("data.json")?;
        let elem_json: Json =
            serde_json::from_slice(&bytes).map_err(|e| ArborError::Decode(e.to_string()))?;
        let elem = build_from_json(
            nodes,
            value_schema,
            &elem_json,
            Some(id),
            &key_str,
            Some(elem_dir),
        )?;
        let elem_key = element_key(nodes, elem, key_field)?;
        if elem_key != key {
            return Err(ArborError::KeyMismatch {
                dir_name: key_str,
                actual: elem_key.to_string(),
            });
        }
        let NodeKind::Container(cnt) = &mut nodes[id].kind else {
            unreachable!()
        };
        if cnt.entries.insert(key.clone(), Some(elem)).is_some() {
            return Err(ArborError::DuplicateKey {
                container: name.to_string(),
                key: key.to_string(),
            });
        }
    }
    Ok(id)
}

pub(crate) fn element_key(
    nodes: &SlotMap<NodeId, Node>,
    elem: NodeId,
    key_field: &str,
) -> Result<Key, ArborError> {
    let rec = nodes[elem].as_record();
    let (idx, _) = rec
        .schema
        .field(key_field)
        .ok_or_else(|| ArborError::IntegrityError {
            message: format!("key field '{key_field}' missing from element schema"),
        })?;
    let field = rec.fields[idx];
    nodes[field]
        .as_scalar()
        .value
        .as_key()
        .ok_or_else(|| ArborError::IntegrityError {
            message: format!("key field '{key_field}' holds a non-key value"),
        })
}

/// Post-load pass: every subset and constrained-set key must resolve in
/// its target, and the sets register as rename watchers on the target.
fn validate_references(store: &mut Store) -> Result<(), ArborError> {
    let sets: Vec<NodeId> = store
        .nodes
        .iter()
        .filter_map(|(id, node)| match &node.kind {
            NodeKind::Container(c)
                if matches!(
                    c.mode,
                    ContainerMode::Subset { .. } | ContainerMode::Constrained { .. }
                ) =>
            {
                Some(id)
            }
            _ => None,
        })
        .collect();
    for set in sets {
        let target = store.resolve_target(set)?;
        let keys: Vec<Key> = store.nodes[set]
            .as_container()
            .entries
            .keys()
            .cloned()
            .collect();
        for key in &keys {
            if !store.nodes[target]
                .as_container()
                .entries
                .contains_key(key)
            {
                return Err(ArborError::KeyNotFound {
                    container: store.nodes[target].field_name.clone(),
                    key: key.to_string(),
                });
            }
        }
        if !keys.is_empty() {
            store.register_watcher(target, set);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::schema::RecordSchema;
    use crate::storage::{Directory, MemDir};
    use crate::tree::{RecordInit, Store};
    use crate::value::{ScalarType, Value};
    use serde_json::json;

    fn schema() -> std::sync::Arc<RecordSchema> {
        RecordSchema::build("root")
            .scalar("prova", ScalarType::Text)
            .scalar("num", ScalarType::Integer)
            .scalar("test", ScalarType::List(Box::new(ScalarType::Integer)))
            .finish()
            .expect("schema")
    }

    #[test]
    fn from_json_reads_every_field() {
        let j = json!({"test": [1], "prova": "i", "num": 3});
        let store = Store::from_json(schema(), &j).expect("from_json");
        assert_eq!(store.scalar(&["num".into()]).expect("num"), &Value::Integer(3));
        assert_eq!(
            store.scalar(&["test".into()]).expect("test"),
            &Value::from(vec![1i64])
        );
    }

    #[test]
    fn missing_field_is_a_load_error() {
        let j = json!({"prova": "i", "num": 3});
        let err = Store::from_json(schema(), &j).expect_err("missing");
        assert_eq!(err.code_str(), "missing_field");
    }

    #[test]
    fn wrong_kind_is_a_load_error() {
        let j = json!({"test": [1], "prova": "i", "num": "three"});
        let err = Store::from_json(schema(), &j).expect_err("kind");
        assert_eq!(err.code_str(), "decode");
    }

    #[test]
    fn serialize_round_trips_through_json() {
        let store = Store::build(
            schema(),
            RecordInit::new()
                .scalar("ciao")
                .scalar(3i64)
                .scalar(vec![1i64, 2, 3]),
        )
        .create()
        .expect("create");
        let j = store.serialize(&[]).expect("serialize");
        let reloaded = Store::from_json(schema(), &j).expect("reload");
        assert_eq!(reloaded.serialize(&[]).expect("serialize"), j);
    }

    #[test]
    fn skip_serialize_fields_default_on_load() {
        let schema = RecordSchema::build("root")
            .scalar("kept", ScalarType::Integer)
            .scalar_skip("scratch", ScalarType::Integer)
            .finish()
            .expect("schema");
        let store = Store::build(
            schema.clone(),
            RecordInit::new().scalar(1i64).scalar(9i64),
        )
        .create()
        .expect("create");
        let j = store.serialize(&[]).expect("serialize");
        assert_eq!(j, json!({"kept": 1}));
        let reloaded = Store::from_json(schema, &j).expect("reload");
        assert_eq!(
            reloaded.scalar(&["scratch".into()]).expect("scratch"),
            &Value::Integer(0)
        );
    }

    #[test]
    fn create_writes_and_load_reads_back() {
        let dir = MemDir::new();
        let store = Store::build(
            schema(),
            RecordInit::new()
                .scalar("ciao")
                .scalar(3i64)
                .scalar(vec![1i64, 2, 3]),
        )
        .dir(dir.clone_dir())
        .field("stuff")
        .create()
        .expect("create");
        let loaded = Store::load(schema(), dir.clone_dir(), "stuff").expect("load");
        assert_eq!(
            loaded.serialize(&[]).expect("serialize"),
            store.serialize(&[]).expect("serialize")
        );
    }
}
