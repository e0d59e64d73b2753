#![forbid(unsafe_code)]

use serde_json::{Value, json};
use std::path::PathBuf;
use tt_ops::{Envelope, dispatch};
use tt_storage::SqliteStore;

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("tt_ops_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn call(store: &mut SqliteStore, cmd: &str, args: Value) -> Value {
    dispatch(
        store,
        &Envelope {
            cmd: cmd.to_string(),
            args,
        },
    )
    .into_value()
}

#[test]
fn create_then_read_through_the_surface() {
    let dir = temp_dir("create_then_read_through_the_surface");
    let mut store = SqliteStore::open(&dir).expect("open store");

    let created = call(
        &mut store,
        "tasks.create",
        json!({ "level": "requirement", "title": "Ship billing" }),
    );
    assert_eq!(created["success"], json!(true));
    assert_eq!(created["result"]["hierarchical_id"], json!("REQ-001"));
    assert_eq!(created["result"]["status"], json!("not_started"));
    assert!(created["timestamp"].is_string());

    let fetched = call(
        &mut store,
        "tasks.get",
        json!({ "hierarchical_id": "REQ-001" }),
    );
    assert_eq!(fetched["success"], json!(true));
    assert_eq!(fetched["result"]["title"], json!("Ship billing"));

    let listed = call(&mut store, "tasks.list", json!({}));
    assert_eq!(listed["result"]["tasks"].as_array().expect("array").len(), 1);
}

#[test]
fn create_validates_args_and_levels() {
    let dir = temp_dir("create_validates_args_and_levels");
    let mut store = SqliteStore::open(&dir).expect("open store");

    let missing_title = call(
        &mut store,
        "tasks.create",
        json!({ "level": "requirement" }),
    );
    assert_eq!(missing_title["success"], json!(false));
    assert_eq!(missing_title["error"]["code"], json!("INVALID_INPUT"));

    let bad_level = call(
        &mut store,
        "tasks.create",
        json!({ "level": "epic", "title": "Nope" }),
    );
    assert_eq!(bad_level["error"]["code"], json!("INVALID_INPUT"));

    let orphan_task = call(
        &mut store,
        "tasks.create",
        json!({ "level": "task", "title": "No parent" }),
    );
    assert_eq!(orphan_task["error"]["code"], json!("INVALID_INPUT"));

    let stale_parent = call(
        &mut store,
        "tasks.create",
        json!({ "level": "task", "parent_id": 999, "title": "Stale" }),
    );
    assert_eq!(stale_parent["error"]["code"], json!("NOT_FOUND"));
    assert!(stale_parent["error"]["recovery"].is_string());
}

#[test]
fn lifecycle_commands_round_trip() {
    let dir = temp_dir("lifecycle_commands_round_trip");
    let mut store = SqliteStore::open(&dir).expect("open store");

    let req = call(
        &mut store,
        "tasks.create",
        json!({ "level": "requirement", "title": "Root" }),
    );
    let req_id = req["result"]["id"].as_i64().expect("id");

    let task = call(
        &mut store,
        "tasks.create",
        json!({ "level": "task", "parent_id": req_id, "title": "Child" }),
    );
    assert_eq!(task["result"]["hierarchical_id"], json!("REQ-001.TSK-001"));
    let task_id = task["result"]["id"].as_i64().expect("id");

    let transitioned = call(
        &mut store,
        "tasks.transition",
        json!({ "id": task_id, "to": "in_progress", "reason": "picked up" }),
    );
    assert_eq!(transitioned["result"]["status"], json!("in_progress"));

    let blocked_jump = call(
        &mut store,
        "tasks.transition",
        json!({ "id": req_id, "to": "completed" }),
    );
    assert_eq!(blocked_jump["error"]["code"], json!("INVALID_INPUT"));

    let updated = call(
        &mut store,
        "tasks.update",
        json!({ "id": task_id, "title": "Child, renamed" }),
    );
    assert_eq!(updated["result"]["title"], json!("Child, renamed"));
    assert_eq!(updated["result"]["hierarchical_id"], json!("REQ-001.TSK-001"));

    let comment = call(
        &mut store,
        "tasks.comment.add",
        json!({ "task_id": task_id, "kind": "note", "body": "looks good" }),
    );
    assert_eq!(comment["success"], json!(true));

    let comments = call(&mut store, "tasks.comments", json!({ "task_id": task_id }));
    assert_eq!(
        comments["result"]["comments"]
            .as_array()
            .expect("array")
            .len(),
        1
    );

    let history = call(&mut store, "tasks.history", json!({ "task_id": task_id }));
    let events = history["result"]["events"].as_array().expect("array");
    assert_eq!(events[0]["event_type"], json!("updated"));
    assert_eq!(events[1]["event_type"], json!("status_change"));
    assert_eq!(events[1]["note"], json!("picked up"));

    let children = call(
        &mut store,
        "tasks.children",
        json!({ "parent_id": req_id, "level": "task" }),
    );
    assert_eq!(
        children["result"]["tasks"].as_array().expect("array").len(),
        1
    );

    let tree = call(
        &mut store,
        "tasks.tree",
        json!({ "hierarchical_id": "REQ-001", "depth": 2 }),
    );
    assert_eq!(
        tree["result"]["children"][0]["hierarchical_id"],
        json!("REQ-001.TSK-001")
    );

    let deleted = call(&mut store, "tasks.delete", json!({ "id": req_id }));
    assert_eq!(deleted["success"], json!(true));

    let gone = call(&mut store, "tasks.get", json!({ "id": task_id }));
    assert_eq!(gone["error"]["code"], json!("NOT_FOUND"));
}

#[test]
fn search_through_the_surface() {
    let dir = temp_dir("search_through_the_surface");
    let mut store = SqliteStore::open(&dir).expect("open store");

    let req = call(
        &mut store,
        "tasks.create",
        json!({ "level": "requirement", "title": "Search root" }),
    );
    let req_id = req["result"]["id"].as_i64().expect("id");
    call(
        &mut store,
        "tasks.create",
        json!({ "level": "task", "parent_id": req_id, "title": "Alpha work" }),
    );
    call(
        &mut store,
        "tasks.create",
        json!({ "level": "task", "parent_id": req_id, "title": "Beta work" }),
    );

    let hits = call(
        &mut store,
        "tasks.search",
        json!({ "level": "task", "q": "Alpha" }),
    );
    let tasks = hits["result"]["tasks"].as_array().expect("array");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["title"], json!("Alpha work"));

    let bad_sort = call(&mut store, "tasks.search", json!({ "sort": "priority" }));
    assert_eq!(bad_sort["error"]["code"], json!("INVALID_INPUT"));
}

#[test]
fn id_parse_reports_segments() {
    let dir = temp_dir("id_parse_reports_segments");
    let mut store = SqliteStore::open(&dir).expect("open store");

    let parsed = call(
        &mut store,
        "id.parse",
        json!({ "hierarchical_id": "REQ-001.TSK-002.SUB-003" }),
    );
    assert_eq!(parsed["success"], json!(true));
    assert_eq!(parsed["result"]["depth"], json!(3));
    let segments = parsed["result"]["segments"].as_array().expect("array");
    assert_eq!(segments[1]["prefix"], json!("TSK"));
    assert_eq!(segments[2]["sequence"], json!(3));

    let malformed = call(
        &mut store,
        "id.parse",
        json!({ "hierarchical_id": "REQ-1" }),
    );
    assert_eq!(malformed["error"]["code"], json!("INVALID_INPUT"));
    assert!(malformed["error"]["recovery"].is_string());
}

#[test]
fn unknown_cmd_is_rejected() {
    let dir = temp_dir("unknown_cmd_is_rejected");
    let mut store = SqliteStore::open(&dir).expect("open store");

    let resp = call(&mut store, "tasks.reparent", json!({}));
    assert_eq!(resp["success"], json!(false));
    assert_eq!(resp["error"]["code"], json!("UNKNOWN_CMD"));
    assert!(resp["error"]["recovery"].is_string());
}
