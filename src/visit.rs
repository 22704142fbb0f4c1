//! Schema walk and concrete-path resolution: the addressing substrate the
//! action dispatcher routes through.

use crate::schema::{FieldKind, RecordSchema};
use crate::tree::{ContainerMode, NodeId, NodeKind, Seg, Store};

/// Token standing for "any key of the enclosing container" in an
/// addressable path template.
pub const KEY_TOKEN: &str = ":key";

/// Walks the schema and reports every addressable path template: records,
/// containers, and container elements (through [`KEY_TOKEN`]). Subsets are
/// addressable themselves but their elements live under the target.
pub fn visit(schema: &RecordSchema, f: &mut impl FnMut(&[String])) {
    let mut path = Vec::new();
    walk(schema, &mut path, f);
}

fn walk(schema: &RecordSchema, path: &mut Vec<String>, f: &mut impl FnMut(&[String])) {
    f(path);
    for field in &schema.fields {
        match &field.kind {
            FieldKind::Scalar { .. } => {}
            FieldKind::Record(sub) => {
                path.push(field.name.clone());
                walk(sub, path, f);
                path.pop();
            }
            FieldKind::Container { value, .. } | FieldKind::Constrained { value, .. } => {
                path.push(field.name.clone());
                f(path);
                path.push(KEY_TOKEN.to_string());
                walk(value, path, f);
                path.pop();
                path.pop();
            }
            FieldKind::Subset { .. } => {
                path.push(field.name.clone());
                f(path);
                path.pop();
            }
        }
    }
}

/// Maps a concrete path of string tokens to a node. Field names address
/// record fields; at a container the token is parsed as a key of the
/// declared type. Returns `None` for anything unresolvable.
pub fn resolve(store: &Store, base: NodeId, tokens: &[&str]) -> Option<NodeId> {
    let mut cur = base;
    for token in tokens {
        cur = match &store.nodes.get(cur)?.kind {
            NodeKind::Record(_) => store.node_from(cur, &[Seg::Field(token.to_string())]).ok()?,
            NodeKind::Container(cnt) => {
                if matches!(cnt.mode, ContainerMode::Subset { .. }) {
                    return None;
                }
                let key = cnt.key_ty.parse(token)?;
                match cnt.entries.get(&key) {
                    Some(Some(id)) => *id,
                    _ => return None,
                }
            }
            NodeKind::Scalar(_) => return None,
        };
    }
    Some(cur)
}
