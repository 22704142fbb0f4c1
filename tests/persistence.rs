//! On-disk projection: round trips over both directory backends, strict
//! load failures, rename projection, and action dispatch over resolved
//! paths.

use arbordb::api::Dispatcher;
use arbordb::visit;
use arbordb::{
    path, Directory, FsDir, Key, KeyType, MemDir, RecordInit, RecordSchema, ScalarType, Store,
    TargetPath, Value,
};
use serde_json::json;

fn base_schema() -> std::sync::Arc<RecordSchema> {
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

fn foo() -> std::sync::Arc<RecordSchema> {
    RecordSchema::build("foo")
        .scalar("test", ScalarType::Integer)
        .scalar("test2", ScalarType::Integer)
        .finish()
        .expect("foo")
}

fn cont_schema() -> std::sync::Arc<RecordSchema> {
    RecordSchema::build("info")
        .container("cont", foo(), "test")
        .finish()
        .expect("info")
}

fn deep_eq(a: &Store, b: &Store) -> bool {
    a.serialize(&[]).expect("serialize a") == b.serialize(&[]).expect("serialize b")
}

#[test]
fn write_on_create_and_load_back() {
    let dir = MemDir::new();
    let store = Store::build(base_schema(), base_init())
        .dir(dir.clone_dir())
        .field("stuff")
        .create()
        .expect("create");
    let loaded = Store::load(base_schema(), dir.clone_dir(), "stuff").expect("load");
    assert!(deep_eq(&store, &loaded));
}

#[test]
fn root_without_a_field_name_lands_at_the_directory_root() {
    let dir = MemDir::new();
    let store = Store::build(base_schema(), base_init())
        .dir(dir.clone_dir())
        .create()
        .expect("create");
    let loaded = Store::load(base_schema(), dir.clone_dir(), "").expect("load");
    assert!(deep_eq(&store, &loaded));
}

#[test]
fn commit_rewrites_the_file() {
    let dir = MemDir::new();
    let mut store = Store::build(base_schema(), base_init())
        .dir(dir.clone_dir())
        .field("stuff")
        .create()
        .expect("create");
    let mut edit = store.edit(&[]).expect("edit");
    edit.set(&path!["num"], 4i64).expect("set");
    assert!(edit.commit().expect("commit"));
    drop(edit);
    let loaded = Store::load(base_schema(), dir.clone_dir(), "stuff").expect("load");
    assert!(deep_eq(&store, &loaded));
    assert_eq!(loaded.scalar(&path!["num"]).expect("num"), &Value::Integer(4));
}

#[test]
fn filesystem_backend_round_trips() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let fs = FsDir::with_sync(tmp.path(), false).expect("fsdir");
    let mut store = Store::build(cont_schema(), RecordInit::new().container())
        .dir(fs.clone_dir())
        .create()
        .expect("create");
    let mut edit = store.edit(&[]).expect("edit");
    assert!(edit
        .emplace(&path!["cont"], RecordInit::new().scalar(3i64).scalar(5i64))
        .expect("emplace"));
    assert!(edit.commit().expect("commit"));
    drop(edit);

    assert!(tmp.path().join("cont/3/data.json").is_file());
    let loaded = Store::load(cont_schema(), fs.clone_dir(), "").expect("load");
    assert!(deep_eq(&store, &loaded));
    assert_eq!(
        loaded.scalar(&path!["cont", 3i64, "test2"]).expect("test2"),
        &Value::Integer(5)
    );
}

#[test]
fn container_only_commit_keeps_the_key_list_current() {
    let dir = MemDir::new();
    let mut store = Store::build(cont_schema(), RecordInit::new().container())
        .dir(dir.clone_dir())
        .create()
        .expect("create");
    // Edit the container directly: the key list lives in the parent
    // record's file and must still be rewritten.
    let mut edit = store.edit(&path!["cont"]).expect("edit");
    assert!(edit
        .emplace(&[], RecordInit::new().scalar(3i64).scalar(5i64))
        .expect("emplace"));
    assert!(edit.commit().expect("commit"));
    drop(edit);

    let loaded = Store::load(cont_schema(), dir.clone_dir(), "").expect("load");
    assert!(loaded.contains(&path!["cont"], &Key::Int(3)).expect("contains"));
}

#[test]
fn handcrafted_layout_loads() {
    let dir = MemDir::new();
    dir.write_file("data.json", br#"{"cont": [1, 2]}"#)
        .expect("root json");
    let cont = dir.subdir("cont", true).expect("cont");
    cont.subdir("1", true)
        .expect("1")
        .write_file("data.json", br#"{"test": 1, "test2": 7}"#)
        .expect("elem 1");
    cont.subdir("2", true)
        .expect("2")
        .write_file("data.json", br#"{"test": 2, "test2": 8}"#)
        .expect("elem 2");

    let store = Store::load(cont_schema(), dir.clone_dir(), "").expect("load");
    assert_eq!(store.len(&path!["cont"]).expect("len"), 2);
    assert_eq!(
        store.scalar(&path!["cont", 1i64, "test2"]).expect("test2"),
        &Value::Integer(7)
    );
    assert_eq!(
        store.scalar(&path!["cont", 2i64, "test2"]).expect("test2"),
        &Value::Integer(8)
    );
}

#[test]
fn missing_element_directory_fails_the_load() {
    let dir = MemDir::new();
    dir.write_file("data.json", br#"{"cont": [1]}"#)
        .expect("root json");
    let err = Store::load(cont_schema(), dir.clone_dir(), "").expect_err("load");
    assert_eq!(err.code_str(), "missing_directory");
}

#[test]
fn key_field_directory_mismatch_fails_the_load() {
    let dir = MemDir::new();
    dir.write_file("data.json", br#"{"cont": [1]}"#)
        .expect("root json");
    dir.subdir("cont", true)
        .expect("cont")
        .subdir("1", true)
        .expect("1")
        .write_file("data.json", br#"{"test": 2, "test2": 8}"#)
        .expect("elem");
    let err = Store::load(cont_schema(), dir.clone_dir(), "").expect_err("load");
    assert_eq!(err.code_str(), "key_mismatch");
}

#[test]
fn unparseable_json_fails_the_load() {
    let dir = MemDir::new();
    dir.write_file("data.json", b"{broken").expect("root json");
    let err = Store::load(base_schema(), dir.clone_dir(), "").expect_err("load");
    assert_eq!(err.code_str(), "decode");
}

#[test]
fn missing_file_fails_the_load() {
    let dir = MemDir::new();
    assert!(Store::load(base_schema(), dir.clone_dir(), "nowhere").is_err());
}

#[test]
fn unresolvable_subset_key_fails_the_load() {
    let schema = RecordSchema::build("info")
        .container("cont", foo(), "test")
        .subset("sub_cont", KeyType::Int, TargetPath::parent().field("cont"))
        .finish()
        .expect("schema");
    let dir = MemDir::new();
    dir.write_file("data.json", br#"{"cont": [], "sub_cont": [7]}"#)
        .expect("root json");
    let err = Store::load(schema, dir.clone_dir(), "").expect_err("load");
    assert_eq!(err.code_str(), "key_not_found");
}

#[test]
fn subset_round_trips_as_a_key_list() {
    let schema = RecordSchema::build("info")
        .container("cont", foo(), "test")
        .subset("sub_cont", KeyType::Int, TargetPath::parent().field("cont"))
        .finish()
        .expect("schema");
    let dir = MemDir::new();
    let mut store = Store::build(schema.clone(), RecordInit::new().container().container())
        .dir(dir.clone_dir())
        .create()
        .expect("create");
    let mut edit = store.edit(&[]).expect("edit");
    assert!(edit
        .emplace(&path!["cont"], RecordInit::new().scalar(3i64).scalar(5i64))
        .expect("emplace"));
    assert!(edit.commit().expect("commit"));
    drop(edit);
    let mut edit = store.edit(&[]).expect("edit");
    assert!(edit.emplace_key(&path!["sub_cont"], 3i64).expect("emplace_key"));
    assert!(edit.commit().expect("commit"));
    drop(edit);

    // The subset persists only its keys; no element directory appears
    // under it.
    let root_json = store.serialize(&[]).expect("serialize");
    assert_eq!(root_json["sub_cont"], json!([3]));

    let loaded = Store::load(schema, dir.clone_dir(), "").expect("load");
    assert!(deep_eq(&store, &loaded));
    assert_eq!(
        loaded
            .scalar(&path!["sub_cont", 3i64, "test2"])
            .expect("through subset"),
        &Value::Integer(5)
    );
}

#[test]
fn constrained_set_round_trips_with_its_own_records() {
    let schema = RecordSchema::build("info")
        .container("cont", foo(), "test")
        .constrained(
            "constr_cont",
            foo(),
            "test",
            TargetPath::parent().field("cont"),
        )
        .finish()
        .expect("schema");
    let dir = MemDir::new();
    let mut store = Store::build(schema.clone(), RecordInit::new().container().container())
        .dir(dir.clone_dir())
        .create()
        .expect("create");
    let mut edit = store.edit(&[]).expect("edit");
    assert!(edit
        .emplace(&path!["cont"], RecordInit::new().scalar(3i64).scalar(5i64))
        .expect("emplace"));
    assert!(edit.commit().expect("commit"));
    drop(edit);
    let mut edit = store.edit(&[]).expect("edit");
    assert!(edit
        .emplace(
            &path!["constr_cont"],
            RecordInit::new().scalar(3i64).scalar(6i64)
        )
        .expect("emplace"));
    assert!(edit.commit().expect("commit"));
    drop(edit);

    let loaded = Store::load(schema, dir.clone_dir(), "").expect("load");
    assert!(deep_eq(&store, &loaded));
    assert_eq!(
        loaded
            .scalar(&path!["constr_cont", 3i64, "test2"])
            .expect("constr"),
        &Value::Integer(6)
    );
    assert_eq!(
        loaded.scalar(&path!["cont", 3i64, "test2"]).expect("cont"),
        &Value::Integer(5)
    );
}

#[test]
fn key_rename_projects_to_the_new_directory() {
    let dir = MemDir::new();
    let mut store = Store::build(cont_schema(), RecordInit::new().container())
        .dir(dir.clone_dir())
        .create()
        .expect("create");
    let mut edit = store.edit(&[]).expect("edit");
    assert!(edit
        .emplace(&path!["cont"], RecordInit::new().scalar(3i64).scalar(5i64))
        .expect("emplace"));
    assert!(edit.commit().expect("commit"));
    drop(edit);

    let mut edit = store.edit(&[]).expect("edit");
    edit.set(&path!["cont", 3i64, "test"], 4i64).expect("set");
    assert!(edit.commit().expect("commit"));
    drop(edit);

    let loaded = Store::load(cont_schema(), dir.clone_dir(), "").expect("load");
    assert!(loaded.contains(&path!["cont"], &Key::Int(4)).expect("contains"));
    assert!(!loaded.contains(&path!["cont"], &Key::Int(3)).expect("contains"));
    assert_eq!(
        loaded.scalar(&path!["cont", 4i64, "test2"]).expect("test2"),
        &Value::Integer(5)
    );
}

#[test]
fn attach_dir_projects_an_in_memory_store() {
    let dir = MemDir::new();
    let mut store = Store::build(base_schema(), base_init())
        .create()
        .expect("create");
    store
        .attach_dir(dir.clone_dir(), "late")
        .expect("attach_dir");
    let loaded = Store::load(base_schema(), dir.clone_dir(), "late").expect("load");
    assert!(deep_eq(&store, &loaded));
}

#[test]
#[should_panic(expected = "already has a directory")]
fn attaching_a_second_directory_is_a_contract_violation() {
    let dir = MemDir::new();
    let mut store = Store::build(base_schema(), base_init())
        .dir(dir.clone_dir())
        .create()
        .expect("create");
    let _ = store.attach_dir(MemDir::new().clone_dir(), "again");
}

#[test]
fn dispatcher_routes_over_resolved_paths() {
    let mut store = Store::build(cont_schema(), RecordInit::new().container())
        .create()
        .expect("create");
    let mut edit = store.edit(&[]).expect("edit");
    assert!(edit
        .emplace(&path!["cont"], RecordInit::new().scalar(3i64).scalar(5i64))
        .expect("emplace"));
    assert!(edit.commit().expect("commit"));
    drop(edit);

    let mut templates = Vec::new();
    visit::visit(&cont_schema(), &mut |p| templates.push(p.join("/")));
    assert!(templates.contains(&"cont/:key".to_string()));

    let d: Dispatcher<()> = Dispatcher::with_builtins();

    let elem = visit::resolve(&store, store.root(), &["cont", "3"]);
    let resp = d.dispatch(&(), &mut store, elem, &json!({"action": "get"}));
    assert_eq!(resp.code, 200);
    assert_eq!(resp.body["result"]["test2"], 5);

    let cont = visit::resolve(&store, store.root(), &["cont"]);
    let resp = d.dispatch(&(), &mut store, cont, &json!({"action": "list"}));
    assert_eq!(resp.code, 200);
    assert_eq!(resp.body["result"]["3"]["test2"], 5);

    let missing = visit::resolve(&store, store.root(), &["cont", "9"]);
    assert_eq!(
        d.dispatch(&(), &mut store, missing, &json!({"action": "get"}))
            .code,
        404
    );
}
