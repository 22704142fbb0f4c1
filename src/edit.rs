//! Scoped transactional editors. An editor stages changes against a node's
//! subtree and applies them with a two-phase, bottom-up commit: sub-edits
//! first, then the node's own callbacks, then the persistence write. Any
//! failure rewinds exactly the work already applied, in reverse order.

use crate::callbacks::{revert_pairs, run_pairs};
use crate::error::ArborError;
use crate::persist;
use crate::tree::{
    attach_dir_rec, free_subtree, ContainerMode, NodeId, NodeKind, RecordInit, Seg, Store,
};
use crate::value::{Key, Value};
use serde_json::Value as Json;

pub struct Editor<'s> {
    store: &'s mut Store,
    state: EditState,
    autocommit: bool,
    finalized: bool,
    rolled_back: bool,
    committed: bool,
}

enum EditState {
    Scalar(ScalarEdit),
    Record(RecordEdit),
    Container(ContainerEdit),
}

struct ScalarEdit {
    node: NodeId,
    working: Value,
    old: Option<Value>,
    changed: bool,
    hooks_ran: usize,
    rekey: Option<RekeyOp>,
}

struct RecordEdit {
    node: NodeId,
    fields: Vec<EditState>,
    committed_fields: usize,
    hooks_ran: bool,
    wrote: bool,
}

struct ContainerEdit {
    node: NodeId,
    /// Element editors, opened lazily, committed in insertion order.
    opened: Vec<(Key, EditState)>,
    /// Staged inserts; `None` marks a subset key reference.
    staged: Vec<(Key, Option<NodeId>)>,
    to_erase: Vec<Key>,
    committed_elems: usize,
    erased: Vec<(Key, Option<NodeId>)>,
    inserted: Vec<Key>,
    wrote: bool,
}

/// Journal of one in-place key rename, kept for exact reversal.
struct RekeyOp {
    container: NodeId,
    element: NodeId,
    old_key: Key,
    new_key: Key,
    /// Watcher subsets whose reference keys followed the rename.
    subsets: Vec<NodeId>,
    moved_dir: bool,
}

enum RekeyOutcome {
    NotAKey,
    Done(RekeyOp),
    Vetoed,
}

impl Store {
    /// Opens an editor over the node at `path`. The node (and for records,
    /// every field below it) enters the edited state; a second editor on
    /// any covered node is a contract violation.
    pub fn edit(&mut self, path: &[Seg]) -> Result<Editor<'_>, ArborError> {
        self.edit_inner(path, false)
    }

    /// Like [`Store::edit`], but commits on drop when neither `commit` nor
    /// `rollback` was called; the drop-commit outcome is ignored.
    pub fn edit_autocommit(&mut self, path: &[Seg]) -> Result<Editor<'_>, ArborError> {
        self.edit_inner(path, true)
    }

    fn edit_inner(&mut self, path: &[Seg], autocommit: bool) -> Result<Editor<'_>, ArborError> {
        let node = self.node_at(path)?;
        tracing::debug!(?path, "opening editor");
        let state = open_state(self, node);
        Ok(Editor {
            store: self,
            state,
            autocommit,
            finalized: false,
            rolled_back: false,
            committed: false,
        })
    }
}

fn open_state(store: &mut Store, node: NodeId) -> EditState {
    {
        let n = &mut store.nodes[node];
        assert!(!n.is_edited, "overlapping editors on the same node");
        n.is_edited = true;
    }
    let kind = match &store.nodes[node].kind {
        NodeKind::Scalar(s) => return EditState::Scalar(ScalarEdit {
            node,
            working: s.value.clone(),
            old: None,
            changed: false,
            hooks_ran: 0,
            rekey: None,
        }),
        NodeKind::Record(r) => Some(r.fields.clone()),
        NodeKind::Container(_) => None,
    };
    match kind {
        Some(fields) => EditState::Record(RecordEdit {
            node,
            fields: fields.into_iter().map(|f| open_state(store, f)).collect(),
            committed_fields: 0,
            hooks_ran: false,
            wrote: false,
        }),
        None => EditState::Container(ContainerEdit {
            node,
            opened: Vec::new(),
            staged: Vec::new(),
            to_erase: Vec::new(),
            committed_elems: 0,
            erased: Vec::new(),
            inserted: Vec::new(),
            wrote: false,
        }),
    }
}

impl Editor<'_> {
    /// The committed value at a root-based store path, unaffected by this
    /// editor's staging.
    pub fn stored(&self, path: &[Seg]) -> Result<&Value, ArborError> {
        self.store.scalar(path)
    }

    /// Staged value of the scalar at `path`.
    pub fn get(&mut self, path: &[Seg]) -> Result<&Value, ArborError> {
        let store = &mut *self.store;
        match locate_state(store, &mut self.state, path)? {
            EditState::Scalar(se) => Ok(&se.working),
            _ => Err(ArborError::Validation("path is not a scalar".into())),
        }
    }

    pub fn set(&mut self, path: &[Seg], value: impl Into<Value>) -> Result<(), ArborError> {
        let value = value.into();
        let store = &mut *self.store;
        let se = match locate_state(store, &mut self.state, path)? {
            EditState::Scalar(se) => se,
            _ => return Err(ArborError::Validation("path is not a scalar".into())),
        };
        let scalar = self.store.nodes[se.node].as_scalar();
        if !scalar.ty.matches(&value) {
            return Err(ArborError::TypeMismatch {
                field: self.store.nodes[se.node].field_name.clone(),
                expected: scalar.ty.name(),
                actual: value.kind_name().to_string(),
            });
        }
        se.working = value;
        Ok(())
    }

    /// Mutable access to the working copy; the value kind is re-checked at
    /// commit.
    pub fn value_mut(&mut self, path: &[Seg]) -> Result<&mut Value, ArborError> {
        let store = &mut *self.store;
        match locate_state(store, &mut self.state, path)? {
            EditState::Scalar(se) => Ok(&mut se.working),
            _ => Err(ArborError::Validation("path is not a scalar".into())),
        }
    }

    /// Staged membership: original entries minus pending erases plus
    /// staged inserts.
    pub fn contains(&mut self, path: &[Seg], key: &Key) -> Result<bool, ArborError> {
        let store = &mut *self.store;
        let ce = container_state(store, &mut self.state, path)?;
        Ok(staged_contains(self.store, ce, key))
    }

    pub fn len(&mut self, path: &[Seg]) -> Result<usize, ArborError> {
        let store = &mut *self.store;
        let ce = container_state(store, &mut self.state, path)?;
        let live = self.store.nodes[ce.node].as_container().entries.len();
        Ok(live + ce.staged.len() - ce.to_erase.len())
    }

    /// Builds a candidate element and stages it for insertion. Returns
    /// false when validation fails or the key is already present in the
    /// staged view.
    pub fn emplace(&mut self, path: &[Seg], init: RecordInit) -> Result<bool, ArborError> {
        let store = &mut *self.store;
        let ce = container_state(store, &mut self.state, path)?;
        let container = ce.node;
        let (mode, value_schema, key_field) = {
            let cnt = self.store.nodes[container].as_container();
            (
                cnt.mode.clone(),
                cnt.value_schema.clone(),
                cnt.key_field.clone(),
            )
        };
        if matches!(mode, ContainerMode::Subset { .. }) {
            return Err(ArborError::Validation(
                "a subset stages keys; use emplace_key".into(),
            ));
        }
        let value_schema = value_schema.expect("owning container has a value schema");
        let key_field = key_field.expect("owning container has a key field");
        let elem = crate::tree::build_record(
            &mut self.store.nodes,
            &value_schema,
            init,
            Some(container),
            "",
            None,
        )?;
        let key = persist::element_key(&self.store.nodes, elem, &key_field)?;
        if let ContainerMode::Constrained { .. } = mode {
            let target = self.store.resolve_target(container)?;
            if !self.store.nodes[target]
                .as_container()
                .entries
                .contains_key(&key)
            {
                free_subtree(self.store, elem);
                return Ok(false);
            }
        }
        let store = &mut *self.store;
        let ce = container_state(store, &mut self.state, path)?;
        if staged_contains(self.store, ce, &key) {
            free_subtree(self.store, elem);
            return Ok(false);
        }
        let store = &mut *self.store;
        let ce = container_state(store, &mut self.state, path)?;
        ce.staged.push((key, Some(elem)));
        Ok(true)
    }

    /// Stages a key reference into a subset. The key must exist in the
    /// target container.
    pub fn emplace_key(&mut self, path: &[Seg], key: impl Into<Key>) -> Result<bool, ArborError> {
        let key = key.into();
        let store = &mut *self.store;
        let ce = container_state(store, &mut self.state, path)?;
        let container = ce.node;
        let cnt = self.store.nodes[container].as_container();
        if !matches!(cnt.mode, ContainerMode::Subset { .. }) {
            return Err(ArborError::Validation(
                "emplace_key applies to subsets only".into(),
            ));
        }
        if !cnt.key_ty.matches(&key) {
            return Err(ArborError::TypeMismatch {
                field: self.store.nodes[container].field_name.clone(),
                expected: cnt.key_ty.name().to_string(),
                actual: key.key_type().name().to_string(),
            });
        }
        let target = self.store.resolve_target(container)?;
        if !self.store.nodes[target]
            .as_container()
            .entries
            .contains_key(&key)
        {
            return Ok(false);
        }
        let store = &mut *self.store;
        let ce = container_state(store, &mut self.state, path)?;
        if staged_contains(self.store, ce, &key) {
            return Ok(false);
        }
        let store = &mut *self.store;
        let ce = container_state(store, &mut self.state, path)?;
        ce.staged.push((key, None));
        Ok(true)
    }

    /// Stages an erase. A key staged by `emplace` in this editor is simply
    /// dropped from staging. Returns false when the key is absent.
    pub fn erase(&mut self, path: &[Seg], key: &Key) -> Result<bool, ArborError> {
        let store = &mut *self.store;
        let ce = container_state(store, &mut self.state, path)?;
        if let Some(pos) = ce.staged.iter().position(|(k, _)| k == key) {
            let (_, entry) = ce.staged.remove(pos);
            if let Some(id) = entry {
                free_subtree(self.store, id);
            }
            return Ok(true);
        }
        if !staged_contains(self.store, ce, key) {
            return Ok(false);
        }
        let store = &mut *self.store;
        let ce = container_state(store, &mut self.state, path)?;
        ce.to_erase.push(key.clone());
        Ok(true)
    }

    /// Two-phase commit. `Ok(true)` on success; `Ok(false)` when a
    /// callback vetoed (state rewound); `Err` when a callback or write
    /// failed (state rewound, cause propagated). Committing a finalized
    /// editor is a contract violation.
    pub fn commit(&mut self) -> Result<bool, ArborError> {
        assert!(!self.finalized, "commit on a finalized editor");
        self.finalized = true;
        let outcome = commit_state(self.store, &mut self.state);
        match &outcome {
            Ok(true) => self.committed = true,
            Ok(false) => {
                self.rolled_back = true;
                tracing::warn!("commit vetoed; edits rewound");
            }
            Err(e) => {
                self.rolled_back = true;
                tracing::warn!(error = %e, "commit failed; edits rewound");
            }
        }
        outcome
    }

    /// Before commit: discards the staged changes. After a successful
    /// commit: reverses it, like [`Editor::undo_commit`]. Rolling back
    /// twice (or after a failed commit) is a contract violation.
    pub fn rollback(&mut self) {
        assert!(!self.rolled_back, "rollback on a rolled-back editor");
        self.rolled_back = true;
        if self.finalized {
            if self.committed {
                undo_state(self.store, &mut self.state);
                self.committed = false;
            }
        } else {
            unmark_state(self.store, &self.state);
        }
        self.finalized = true;
    }

    /// Reverses a successful commit while the editor is still alive.
    pub fn undo_commit(&mut self) {
        assert!(self.finalized, "undo_commit before commit");
        assert!(self.committed, "undo_commit requires a successful commit");
        undo_state(self.store, &mut self.state);
        self.committed = false;
    }
}

impl Drop for Editor<'_> {
    fn drop(&mut self) {
        if !self.finalized {
            if self.autocommit {
                self.finalized = true;
                if let Ok(true) = commit_state(self.store, &mut self.state) {
                    self.committed = true;
                }
            } else {
                unmark_state(self.store, &self.state);
            }
        }
        cleanup_state(self.store, &mut self.state);
    }
}

fn locate_state<'a>(
    store: &mut Store,
    state: &'a mut EditState,
    path: &[Seg],
) -> Result<&'a mut EditState, ArborError> {
    let Some((seg, rest)) = path.split_first() else {
        return Ok(state);
    };
    match (state, seg) {
        (EditState::Record(re), Seg::Field(name)) => {
            let idx = {
                let rec = store.nodes[re.node].as_record();
                rec.schema
                    .field(name)
                    .ok_or_else(|| ArborError::UnknownField {
                        record: rec.schema.name.clone(),
                        field: name.clone(),
                    })?
                    .0
            };
            locate_state(store, &mut re.fields[idx], rest)
        }
        (EditState::Container(ce), Seg::Key(key)) => {
            assert!(
                !ce.staged.iter().any(|(k, _)| k == key),
                "editing an element staged in the same editor"
            );
            if let Some(pos) = ce.opened.iter().position(|(k, _)| k == key) {
                return locate_state(store, &mut ce.opened[pos].1, rest);
            }
            let elem = {
                let cnt = store.nodes[ce.node].as_container();
                match cnt.entries.get(key) {
                    Some(Some(id)) => *id,
                    Some(None) => {
                        return Err(ArborError::Validation(
                            "cannot edit through a subset; edit the owning container".into(),
                        ));
                    }
                    None => {
                        return Err(ArborError::KeyNotFound {
                            container: store.nodes[ce.node].field_name.clone(),
                            key: key.to_string(),
                        });
                    }
                }
            };
            let st = open_state(store, elem);
            ce.opened.push((key.clone(), st));
            let last = ce.opened.len() - 1;
            locate_state(store, &mut ce.opened[last].1, rest)
        }
        (_, seg) => Err(ArborError::NodeNotFound {
            path: format!("{seg:?}"),
        }),
    }
}

fn container_state<'a>(
    store: &mut Store,
    state: &'a mut EditState,
    path: &[Seg],
) -> Result<&'a mut ContainerEdit, ArborError> {
    match locate_state(store, state, path)? {
        EditState::Container(ce) => Ok(ce),
        _ => Err(ArborError::Validation("path is not a container".into())),
    }
}

fn staged_contains(store: &Store, ce: &ContainerEdit, key: &Key) -> bool {
    if ce.staged.iter().any(|(k, _)| k == key) {
        return true;
    }
    if ce.to_erase.contains(key) {
        return false;
    }
    store.nodes[ce.node]
        .as_container()
        .entries
        .contains_key(key)
}

fn commit_state(store: &mut Store, state: &mut EditState) -> Result<bool, ArborError> {
    match state {
        EditState::Scalar(se) => commit_scalar(store, se),
        EditState::Record(re) => commit_record(store, re),
        EditState::Container(ce) => commit_container(store, ce),
    }
}

fn undo_state(store: &mut Store, state: &mut EditState) {
    match state {
        EditState::Scalar(se) => undo_scalar(store, se),
        EditState::Record(re) => undo_record(store, re),
        EditState::Container(ce) => unwind_container(store, ce),
    }
}

fn commit_scalar(store: &mut Store, se: &mut ScalarEdit) -> Result<bool, ArborError> {
    if let Some(n) = store.nodes.get_mut(se.node) {
        n.is_edited = false;
    }
    let (ty, old) = {
        let s = store.nodes[se.node].as_scalar();
        (s.ty.clone(), s.value.clone())
    };
    if !ty.matches(&se.working) {
        return Err(ArborError::TypeMismatch {
            field: store.nodes[se.node].field_name.clone(),
            expected: ty.name(),
            actual: se.working.kind_name().to_string(),
        });
    }
    if se.working == old {
        se.old = Some(old);
        se.changed = false;
        return Ok(true);
    }
    let new = se.working.clone();
    set_scalar_value(store, se.node, new.clone());
    se.old = Some(old.clone());
    se.changed = true;
    match apply_rekey(store, se.node, &old, &new) {
        Ok(RekeyOutcome::NotAKey) => se.rekey = None,
        Ok(RekeyOutcome::Done(op)) => se.rekey = Some(op),
        Ok(RekeyOutcome::Vetoed) => {
            set_scalar_value(store, se.node, old);
            se.changed = false;
            return Ok(false);
        }
        Err(e) => {
            set_scalar_value(store, se.node, old);
            se.changed = false;
            return Err(e);
        }
    }
    let mut hooks = take_scalar_hooks(store, se.node);
    let outcome = run_pairs(
        &mut hooks,
        |h| (h.action)(&old, &new),
        |h| (h.revert)(&old, &new),
    );
    let count = hooks.len();
    put_scalar_hooks(store, se.node, hooks);
    match outcome {
        Ok(true) => {
            se.hooks_ran = count;
            Ok(true)
        }
        fail => {
            // Restore the value before the rekey projection rewrite, so
            // the files carry the old key again.
            set_scalar_value(store, se.node, se.old.clone().expect("old recorded"));
            if let Some(op) = se.rekey.take() {
                revert_rekey(store, &op);
            }
            se.changed = false;
            fail
        }
    }
}

fn undo_scalar(store: &mut Store, se: &mut ScalarEdit) {
    if !se.changed {
        return;
    }
    let old = se.old.clone().expect("committed scalar has an old value");
    let new = store.nodes[se.node].as_scalar().value.clone();
    let mut hooks = take_scalar_hooks(store, se.node);
    revert_pairs(&mut hooks[..se.hooks_ran], |h| (h.revert)(&old, &new));
    put_scalar_hooks(store, se.node, hooks);
    se.hooks_ran = 0;
    set_scalar_value(store, se.node, old);
    if let Some(op) = se.rekey.take() {
        revert_rekey(store, &op);
    }
    se.changed = false;
}

fn commit_record(store: &mut Store, re: &mut RecordEdit) -> Result<bool, ArborError> {
    if let Some(n) = store.nodes.get_mut(re.node) {
        n.is_edited = false;
    }
    re.committed_fields = 0;
    let mut outcome: Result<bool, ArborError> = Ok(true);
    for i in 0..re.fields.len() {
        match commit_state(store, &mut re.fields[i]) {
            Ok(true) => re.committed_fields = i + 1,
            r => {
                outcome = r;
                break;
            }
        }
    }
    if !matches!(outcome, Ok(true)) {
        unwind_fields(store, re);
        return outcome;
    }
    let mut hooks = take_record_hooks(store, re.node);
    let hooks_outcome = run_pairs(&mut hooks, |h| (h.action)(), |h| (h.revert)());
    put_record_hooks(store, re.node, hooks);
    if !matches!(hooks_outcome, Ok(true)) {
        unwind_fields(store, re);
        return hooks_outcome;
    }
    re.hooks_ran = true;
    if store.nodes[re.node].dir.is_some() {
        if let Err(e) = persist::persist_record(store, re.node) {
            undo_record_hooks(store, re.node);
            re.hooks_ran = false;
            unwind_fields(store, re);
            return Err(e);
        }
        re.wrote = true;
    }
    Ok(true)
}

fn unwind_fields(store: &mut Store, re: &mut RecordEdit) {
    for i in (0..re.committed_fields).rev() {
        undo_state(store, &mut re.fields[i]);
    }
    re.committed_fields = 0;
}

fn undo_record(store: &mut Store, re: &mut RecordEdit) {
    if re.hooks_ran {
        undo_record_hooks(store, re.node);
        re.hooks_ran = false;
    }
    unwind_fields(store, re);
    if re.wrote {
        if let Err(e) = persist::persist_record(store, re.node) {
            tracing::error!(error = %e, "failed to restore data.json during rollback; aborting");
            std::process::abort();
        }
        re.wrote = false;
    }
}

fn commit_container(store: &mut Store, ce: &mut ContainerEdit) -> Result<bool, ArborError> {
    if let Some(n) = store.nodes.get_mut(ce.node) {
        n.is_edited = false;
    }
    ce.committed_elems = 0;
    for i in 0..ce.opened.len() {
        match commit_state(store, &mut ce.opened[i].1) {
            Ok(true) => ce.committed_elems = i + 1,
            r => {
                unwind_container(store, ce);
                return r;
            }
        }
    }
    for key in ce.to_erase.clone() {
        match container_erase(store, ce.node, &key) {
            Ok(Some(entry)) => ce.erased.push((key, entry)),
            Ok(None) => {
                unwind_container(store, ce);
                return Ok(false);
            }
            Err(e) => {
                unwind_container(store, ce);
                return Err(e);
            }
        }
    }
    for (key, entry) in ce.staged.clone() {
        match container_insert(store, ce.node, &key, entry) {
            Ok(true) => ce.inserted.push(key),
            Ok(false) => {
                unwind_container(store, ce);
                return Ok(false);
            }
            Err(e) => {
                unwind_container(store, ce);
                return Err(e);
            }
        }
    }
    if !ce.erased.is_empty() || !ce.inserted.is_empty() {
        if let Err(e) = persist::persist_owner(store, ce.node) {
            unwind_container(store, ce);
            return Err(e);
        }
        ce.wrote = true;
    }
    Ok(true)
}

/// Winds back every step this container edit applied, in reverse. Shared
/// between the failure path and `undo_commit`.
fn unwind_container(store: &mut Store, ce: &mut ContainerEdit) {
    let inserted = std::mem::take(&mut ce.inserted);
    for key in inserted.into_iter().rev() {
        undo_insert_entry(store, ce.node, &key);
    }
    let erased = std::mem::take(&mut ce.erased);
    for (key, entry) in erased.into_iter().rev() {
        undo_erase_entry(store, ce.node, &key, entry);
    }
    for i in (0..ce.committed_elems).rev() {
        undo_state(store, &mut ce.opened[i].1);
    }
    ce.committed_elems = 0;
    if ce.wrote {
        if let Err(e) = persist::persist_owner(store, ce.node) {
            tracing::error!(error = %e, "failed to restore key list during rollback; aborting");
            std::process::abort();
        }
        ce.wrote = false;
    }
}

/// Removes an entry and runs the erase hooks. `Ok(None)` when the key is
/// absent or a hook vetoed.
fn container_erase(
    store: &mut Store,
    container: NodeId,
    key: &Key,
) -> Result<Option<Option<NodeId>>, ArborError> {
    let Some(entry) = store.nodes[container]
        .as_container()
        .entries
        .get(key)
        .cloned()
    else {
        return Ok(None);
    };
    let snapshot = snapshot_entry(store, container, key);
    remove_entry(store, container, key, entry);
    let mut hooks = take_erase_hooks(store, container);
    let outcome = run_pairs(
        &mut hooks,
        |h| (h.action)(key, &snapshot),
        |h| (h.revert)(key, &snapshot),
    );
    put_erase_hooks(store, container, hooks);
    match outcome {
        Ok(true) => Ok(Some(entry)),
        Ok(false) => {
            restore_entry(store, container, key, entry);
            Ok(None)
        }
        Err(e) => {
            restore_entry(store, container, key, entry);
            Err(e)
        }
    }
}

/// Inserts one staged entry: attaches its directory, wires it into the
/// map, and runs the insert hooks. `Ok(false)` on a duplicate key, a
/// failed reference validation, or a hook veto.
fn container_insert(
    store: &mut Store,
    container: NodeId,
    key: &Key,
    entry: Option<NodeId>,
) -> Result<bool, ArborError> {
    let mode = store.nodes[container].as_container().mode.clone();
    if store.nodes[container]
        .as_container()
        .entries
        .contains_key(key)
    {
        return Ok(false);
    }
    match &mode {
        ContainerMode::Subset { .. } | ContainerMode::Constrained { .. } => {
            let target = store.resolve_target(container)?;
            if !store.nodes[target]
                .as_container()
                .entries
                .contains_key(key)
            {
                return Ok(false);
            }
            store.register_watcher(target, container);
        }
        ContainerMode::Owning => {}
    }
    if let Some(elem) = entry {
        let dir = store.nodes[container].dir.as_ref().map(|d| d.clone_dir());
        if let Some(dir) = dir {
            let sub = dir.subdir(&key.to_string(), true)?;
            attach_dir_rec(store, elem, sub)?;
            persist::persist_subtree(store, elem)?;
        }
        let n = &mut store.nodes[elem];
        n.parent = Some(container);
        n.field_name = key.to_string();
    }
    set_entry(store, container, key, entry);
    let snapshot = snapshot_entry(store, container, key);
    let mut hooks = take_insert_hooks(store, container);
    let outcome = run_pairs(
        &mut hooks,
        |h| (h.action)(key, &snapshot),
        |h| (h.revert)(key, &snapshot),
    );
    put_insert_hooks(store, container, hooks);
    match outcome {
        Ok(true) => Ok(true),
        Ok(false) => {
            remove_entry(store, container, key, entry);
            Ok(false)
        }
        Err(e) => {
            remove_entry(store, container, key, entry);
            Err(e)
        }
    }
}

fn undo_insert_entry(store: &mut Store, container: NodeId, key: &Key) {
    let entry = store.nodes[container]
        .as_container()
        .entries
        .get(key)
        .cloned()
        .expect("inserted entry present during unwind");
    let snapshot = snapshot_entry(store, container, key);
    let mut hooks = take_insert_hooks(store, container);
    revert_pairs(&mut hooks, |h| (h.revert)(key, &snapshot));
    put_insert_hooks(store, container, hooks);
    remove_entry(store, container, key, entry);
}

fn undo_erase_entry(store: &mut Store, container: NodeId, key: &Key, entry: Option<NodeId>) {
    restore_entry(store, container, key, entry);
    let snapshot = snapshot_entry(store, container, key);
    let mut hooks = take_erase_hooks(store, container);
    revert_pairs(&mut hooks, |h| (h.revert)(key, &snapshot));
    put_erase_hooks(store, container, hooks);
}

fn set_entry(store: &mut Store, container: NodeId, key: &Key, entry: Option<NodeId>) {
    let NodeKind::Container(cnt) = &mut store.nodes[container].kind else {
        unreachable!("container node");
    };
    cnt.entries.insert(key.clone(), entry);
}

fn remove_entry(store: &mut Store, container: NodeId, key: &Key, entry: Option<NodeId>) {
    {
        let NodeKind::Container(cnt) = &mut store.nodes[container].kind else {
            unreachable!("container node");
        };
        cnt.entries.remove(key);
    }
    if let Some(elem) = entry {
        if let Some(n) = store.nodes.get_mut(elem) {
            n.parent = None;
        }
    }
}

fn restore_entry(store: &mut Store, container: NodeId, key: &Key, entry: Option<NodeId>) {
    set_entry(store, container, key, entry);
    if let Some(elem) = entry {
        if let Some(n) = store.nodes.get_mut(elem) {
            n.parent = Some(container);
        }
    }
}

/// Serialized snapshot of an entry, handed to insert/erase hooks. Falls
/// back to JSON null when the entry cannot be resolved (a subset reference
/// whose target entry is gone mid-commit).
fn snapshot_entry(store: &Store, container: NodeId, key: &Key) -> Json {
    let elem = match store.nodes[container].as_container().entries.get(key) {
        Some(Some(id)) => Some(*id),
        Some(None) => store
            .resolve_target(container)
            .ok()
            .and_then(|t| store.nodes[t].as_container().entries.get(key).cloned())
            .flatten(),
        None => None,
    };
    elem.and_then(|id| persist::serialize_node(store, id).ok())
        .unwrap_or(Json::Null)
}

fn apply_rekey(
    store: &mut Store,
    scalar: NodeId,
    old: &Value,
    new: &Value,
) -> Result<RekeyOutcome, ArborError> {
    let Some(element) = store.nodes[scalar].parent else {
        return Ok(RekeyOutcome::NotAKey);
    };
    if !matches!(store.nodes[element].kind, NodeKind::Record(_)) {
        return Ok(RekeyOutcome::NotAKey);
    }
    let Some(container) = store.nodes[element].parent else {
        return Ok(RekeyOutcome::NotAKey);
    };
    let NodeKind::Container(cnt) = &store.nodes[container].kind else {
        return Ok(RekeyOutcome::NotAKey);
    };
    if cnt.key_field.as_deref() != Some(store.nodes[scalar].field_name.as_str()) {
        return Ok(RekeyOutcome::NotAKey);
    }
    let (Some(old_key), Some(new_key)) = (old.as_key(), new.as_key()) else {
        return Ok(RekeyOutcome::NotAKey);
    };
    if cnt.entries.get(&old_key) != Some(&Some(element)) {
        return Ok(RekeyOutcome::NotAKey);
    }
    if cnt.entries.contains_key(&new_key) {
        return Ok(RekeyOutcome::Vetoed);
    }
    let watchers = cnt.watchers.clone();
    for w in &watchers {
        let wn = store.nodes[*w].as_container();
        if matches!(wn.mode, ContainerMode::Constrained { .. })
            && wn.entries.contains_key(&old_key)
        {
            // The constrained entry's own key field still holds the old
            // key; following the rename would desync it.
            return Ok(RekeyOutcome::Vetoed);
        }
    }
    tracing::debug!(%old_key, %new_key, "rekeying container entry in place");
    rekey_entry(store, container, &old_key, &new_key, Some(element));
    let mut op = RekeyOp {
        container,
        element,
        old_key: old_key.clone(),
        new_key: new_key.clone(),
        subsets: Vec::new(),
        moved_dir: false,
    };
    for w in watchers {
        let follows = {
            let wn = store.nodes[w].as_container();
            matches!(wn.mode, ContainerMode::Subset { .. }) && wn.entries.contains_key(&old_key)
        };
        if follows {
            rekey_entry(store, w, &old_key, &new_key, None);
            op.subsets.push(w);
        }
    }
    match finish_rekey(store, &mut op) {
        Ok(()) => Ok(RekeyOutcome::Done(op)),
        Err(e) => {
            // Put the old key value back before the projection rewrite.
            set_scalar_value(store, scalar, old.clone());
            revert_rekey(store, &op);
            Err(e)
        }
    }
}

/// Projects a rekey to disk: the element moves to a subdirectory named by
/// the new key, and every record whose key list changed is rewritten.
fn finish_rekey(store: &mut Store, op: &mut RekeyOp) -> Result<(), ArborError> {
    let dir = store.nodes[op.container]
        .dir
        .as_ref()
        .map(|d| d.clone_dir());
    if let Some(dir) = dir {
        let sub = dir.subdir(&op.new_key.to_string(), true)?;
        attach_dir_rec(store, op.element, sub)?;
        persist::persist_subtree(store, op.element)?;
        op.moved_dir = true;
    }
    persist::persist_owner(store, op.container)?;
    for w in op.subsets.clone() {
        persist::persist_owner(store, w)?;
    }
    Ok(())
}

fn revert_rekey(store: &mut Store, op: &RekeyOp) {
    for w in op.subsets.iter().rev() {
        rekey_entry(store, *w, &op.new_key, &op.old_key, None);
    }
    rekey_entry(store, op.container, &op.new_key, &op.old_key, Some(op.element));
    // Failing to restore the projection is the catastrophic path.
    if let Err(e) = restore_rekey_projection(store, op) {
        tracing::error!(error = %e, "failed to restore projection after rekey rollback; aborting");
        std::process::abort();
    }
}

fn restore_rekey_projection(store: &mut Store, op: &RekeyOp) -> Result<(), ArborError> {
    if op.moved_dir {
        let dir = store.nodes[op.container]
            .dir
            .as_ref()
            .map(|d| d.clone_dir())
            .expect("rekey moved a directory");
        let sub = dir.subdir(&op.old_key.to_string(), true)?;
        attach_dir_rec(store, op.element, sub)?;
        persist::persist_subtree(store, op.element)?;
    }
    persist::persist_owner(store, op.container)?;
    for w in op.subsets.iter() {
        persist::persist_owner(store, *w)?;
    }
    Ok(())
}

fn rekey_entry(store: &mut Store, container: NodeId, from: &Key, to: &Key, expect_elem: Option<NodeId>) {
    let entry = {
        let NodeKind::Container(cnt) = &mut store.nodes[container].kind else {
            unreachable!("container node");
        };
        let entry = cnt.entries.remove(from).expect("rekey source present");
        cnt.entries.insert(to.clone(), entry);
        entry
    };
    if let Some(expected) = expect_elem {
        debug_assert_eq!(entry, Some(expected));
    }
    if let Some(elem) = entry {
        store.nodes[elem].field_name = to.to_string();
    }
}

fn set_scalar_value(store: &mut Store, node: NodeId, value: Value) {
    match &mut store.nodes[node].kind {
        NodeKind::Scalar(s) => s.value = value,
        _ => unreachable!("scalar node"),
    }
}

macro_rules! hook_accessors {
    ($take:ident, $put:ident, $kind:ident, $field:ident, $ty:ty) => {
        fn $take(store: &mut Store, node: NodeId) -> Vec<$ty> {
            match &mut store.nodes[node].kind {
                NodeKind::$kind(n) => std::mem::take(&mut n.$field),
                _ => unreachable!("hook host node"),
            }
        }

        fn $put(store: &mut Store, node: NodeId, hooks: Vec<$ty>) {
            match &mut store.nodes[node].kind {
                NodeKind::$kind(n) => {
                    let added = std::mem::replace(&mut n.$field, hooks);
                    n.$field.extend(added);
                }
                _ => unreachable!("hook host node"),
            }
        }
    };
}

hook_accessors!(
    take_scalar_hooks,
    put_scalar_hooks,
    Scalar,
    hooks,
    crate::callbacks::ChangeHook
);
hook_accessors!(
    take_record_hooks,
    put_record_hooks,
    Record,
    hooks,
    crate::callbacks::RecordHook
);
hook_accessors!(
    take_insert_hooks,
    put_insert_hooks,
    Container,
    insert_hooks,
    crate::callbacks::EntryHook
);
hook_accessors!(
    take_erase_hooks,
    put_erase_hooks,
    Container,
    erase_hooks,
    crate::callbacks::EntryHook
);

fn undo_record_hooks(store: &mut Store, node: NodeId) {
    let mut hooks = take_record_hooks(store, node);
    revert_pairs(&mut hooks, |h| (h.revert)());
    put_record_hooks(store, node, hooks);
}

fn unmark_state(store: &mut Store, state: &EditState) {
    match state {
        EditState::Scalar(se) => {
            if let Some(n) = store.nodes.get_mut(se.node) {
                n.is_edited = false;
            }
        }
        EditState::Record(re) => {
            if let Some(n) = store.nodes.get_mut(re.node) {
                n.is_edited = false;
            }
            for field in &re.fields {
                unmark_state(store, field);
            }
        }
        EditState::Container(ce) => {
            if let Some(n) = store.nodes.get_mut(ce.node) {
                n.is_edited = false;
            }
            for (_, st) in &ce.opened {
                unmark_state(store, st);
            }
        }
    }
}

/// Drop-time sweep: clears edit marks and frees arena nodes that ended up
/// outside the live map (discarded staging, undone inserts, committed
/// erases).
fn cleanup_state(store: &mut Store, state: &mut EditState) {
    unmark_state(store, state);
    free_orphans(store, state);
}

fn free_orphans(store: &mut Store, state: &mut EditState) {
    match state {
        EditState::Scalar(_) => {}
        EditState::Record(re) => {
            for field in &mut re.fields {
                free_orphans(store, field);
            }
        }
        EditState::Container(ce) => {
            for (_, st) in &mut ce.opened {
                free_orphans(store, st);
            }
            let container = ce.node;
            let candidates: Vec<(Key, NodeId)> = ce
                .staged
                .drain(..)
                .chain(ce.erased.drain(..))
                .filter_map(|(k, e)| e.map(|id| (k, id)))
                .collect();
            for (key, id) in candidates {
                let live = store
                    .nodes
                    .get(container)
                    .map(|n| n.as_container().entries.get(&key) == Some(&Some(id)))
                    .unwrap_or(false);
                if !live {
                    free_subtree(store, id);
                }
            }
        }
    }
}
