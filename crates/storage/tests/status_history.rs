#![forbid(unsafe_code)]

use std::path::PathBuf;
use tt_core::ids::Level;
use tt_core::status::TaskStatus;
use tt_storage::{
    CommentKind, CommentRequest, CreateTaskRequest, SearchTasksRequest, SortOrder, SqliteStore,
    StoreError, TaskSort, TransitionRequest,
};

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("tt_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn create(
    store: &mut SqliteStore,
    level: Level,
    parent_id: Option<i64>,
    title: &str,
) -> tt_storage::TaskRow {
    store
        .create_task(CreateTaskRequest {
            level,
            parent_id,
            title: title.to_string(),
            description: None,
        })
        .expect("create task")
}

fn transition(store: &mut SqliteStore, id: i64, to: TaskStatus) -> tt_storage::TaskRow {
    store
        .transition_status(
            id,
            TransitionRequest {
                to,
                reason: None,
            },
        )
        .expect("transition")
}

#[test]
fn transitions_follow_the_guard_table() {
    let dir = temp_dir("transitions_follow_the_guard_table");
    let mut store = SqliteStore::open(&dir).expect("open store");
    let req = create(&mut store, Level::Requirement, None, "Requirement");

    let err = store
        .transition_status(
            req.id,
            TransitionRequest {
                to: TaskStatus::Completed,
                reason: None,
            },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::InvalidTransition {
            from: TaskStatus::NotStarted,
            to: TaskStatus::Completed,
        }
    ));

    let row = transition(&mut store, req.id, TaskStatus::InProgress);
    assert_eq!(row.status, TaskStatus::InProgress);
    let row = transition(&mut store, req.id, TaskStatus::Completed);
    assert_eq!(row.status, TaskStatus::Completed);

    let err = store
        .transition_status(
            req.id,
            TransitionRequest {
                to: TaskStatus::InProgress,
                reason: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));
}

#[test]
fn history_lists_events_newest_first() {
    let dir = temp_dir("history_lists_events_newest_first");
    let mut store = SqliteStore::open(&dir).expect("open store");
    let req = create(&mut store, Level::Requirement, None, "Requirement");

    transition(&mut store, req.id, TaskStatus::InProgress);
    store
        .transition_status(
            req.id,
            TransitionRequest {
                to: TaskStatus::Blocked,
                reason: Some("waiting on review capacity".to_string()),
            },
        )
        .expect("transition with reason");

    let history = store.history(req.id, 50, 0).expect("history");
    assert_eq!(history.len(), 3);

    assert_eq!(history[0].event_type, "status_change");
    assert_eq!(history[0].from_status, Some(TaskStatus::InProgress));
    assert_eq!(history[0].to_status, Some(TaskStatus::Blocked));
    assert_eq!(
        history[0].note.as_deref(),
        Some("waiting on review capacity")
    );

    assert_eq!(history[1].event_type, "status_change");
    assert_eq!(history[1].from_status, Some(TaskStatus::NotStarted));

    assert_eq!(history[2].event_type, "created");
    assert_eq!(history[2].from_status, None);
    assert_eq!(history[2].to_status, Some(TaskStatus::NotStarted));
}

#[test]
fn comments_are_recorded_per_task() {
    let dir = temp_dir("comments_are_recorded_per_task");
    let mut store = SqliteStore::open(&dir).expect("open store");
    let req = create(&mut store, Level::Requirement, None, "Requirement");

    store
        .add_comment(
            req.id,
            CommentRequest {
                kind: CommentKind::Note,
                body: "first pass done".to_string(),
                created_by: Some("alex".to_string()),
            },
        )
        .expect("add note");
    store
        .add_comment(
            req.id,
            CommentRequest {
                kind: CommentKind::Review,
                body: "needs acceptance criteria".to_string(),
                created_by: None,
            },
        )
        .expect("add review");

    let comments = store.comments(req.id, 50, 0).expect("comments");
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0].kind, CommentKind::Note);
    assert_eq!(comments[0].created_by.as_deref(), Some("alex"));
    assert_eq!(comments[1].kind, CommentKind::Review);
    assert_eq!(comments[1].body, "needs acceptance criteria");

    let err = store
        .add_comment(
            999,
            CommentRequest {
                kind: CommentKind::Note,
                body: "ghost".to_string(),
                created_by: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownId));
}

#[test]
fn search_filters_compose() {
    let dir = temp_dir("search_filters_compose");
    let mut store = SqliteStore::open(&dir).expect("open store");

    let req = create(&mut store, Level::Requirement, None, "Billing overhaul");
    let task1 = create(&mut store, Level::Task, Some(req.id), "Design invoice schema");
    let _task2 = create(&mut store, Level::Task, Some(req.id), "Wire payment provider");
    transition(&mut store, task1.id, TaskStatus::InProgress);

    let by_level = store
        .search(SearchTasksRequest {
            level: Some(Level::Task),
            ..SearchTasksRequest::default()
        })
        .expect("search by level");
    assert_eq!(by_level.len(), 2);

    let by_level_and_status = store
        .search(SearchTasksRequest {
            level: Some(Level::Task),
            status: Some(TaskStatus::InProgress),
            ..SearchTasksRequest::default()
        })
        .expect("search by level and status");
    assert_eq!(by_level_and_status.len(), 1);
    assert_eq!(by_level_and_status[0].id, task1.id);

    let by_text = store
        .search(SearchTasksRequest {
            q: Some("invoice".to_string()),
            ..SearchTasksRequest::default()
        })
        .expect("search by text");
    assert_eq!(by_text.len(), 1);
    assert_eq!(by_text[0].id, task1.id);

    let by_parent = store
        .search(SearchTasksRequest {
            parent_id: Some(req.id),
            sort: TaskSort::Title,
            order: SortOrder::Asc,
            ..SearchTasksRequest::default()
        })
        .expect("search by parent sorted by title");
    assert_eq!(by_parent.len(), 2);
    assert_eq!(by_parent[0].title, "Design invoice schema");

    let paged = store
        .search(SearchTasksRequest {
            level: Some(Level::Task),
            sort: TaskSort::CreatedAt,
            order: SortOrder::Asc,
            limit: 1,
            offset: 1,
            ..SearchTasksRequest::default()
        })
        .expect("paged search");
    assert_eq!(paged.len(), 1);
    assert_eq!(paged[0].title, "Wire payment provider");
}

#[test]
fn tree_respects_depth_and_sequence_order() {
    let dir = temp_dir("tree_respects_depth_and_sequence_order");
    let mut store = SqliteStore::open(&dir).expect("open store");

    let req = create(&mut store, Level::Requirement, None, "Requirement");
    let task1 = create(&mut store, Level::Task, Some(req.id), "Task one");
    let _task2 = create(&mut store, Level::Task, Some(req.id), "Task two");
    create(&mut store, Level::Subtask, Some(task1.id), "Subtask");

    let full = store
        .tree("REQ-001", 3)
        .expect("tree query")
        .expect("root present");
    assert_eq!(full.hierarchical_id, "REQ-001");
    assert_eq!(full.children.len(), 2);
    assert_eq!(full.children[0].hierarchical_id, "REQ-001.TSK-001");
    assert_eq!(full.children[1].hierarchical_id, "REQ-001.TSK-002");
    assert_eq!(full.children[0].children.len(), 1);
    assert_eq!(
        full.children[0].children[0].hierarchical_id,
        "REQ-001.TSK-001.SUB-001"
    );

    let shallow = store
        .tree("REQ-001", 1)
        .expect("tree query")
        .expect("root present");
    assert!(shallow.children.is_empty());

    let partial = store
        .tree("REQ-001", 2)
        .expect("tree query")
        .expect("root present");
    assert_eq!(partial.children.len(), 2);
    assert!(partial.children[0].children.is_empty());

    assert!(store.tree("REQ-404", 2).expect("tree query").is_none());
}

#[test]
fn cascade_delete_removes_descendants() {
    let dir = temp_dir("cascade_delete_removes_descendants");
    let mut store = SqliteStore::open(&dir).expect("open store");

    let req1 = create(&mut store, Level::Requirement, None, "First");
    let _req2 = create(&mut store, Level::Requirement, None, "Second");
    let task = create(&mut store, Level::Task, Some(req1.id), "Task");
    let sub = create(&mut store, Level::Subtask, Some(task.id), "Subtask");
    store
        .add_comment(
            task.id,
            CommentRequest {
                kind: CommentKind::Note,
                body: "attached to the task".to_string(),
                created_by: None,
            },
        )
        .expect("comment");

    store.delete_task(req1.id).expect("delete root");

    assert!(store.task(task.id).expect("fetch task").is_none());
    assert!(store.task(sub.id).expect("fetch subtask").is_none());
    assert!(store.comments(task.id, 50, 0).expect("comments").is_empty());

    let req3 = create(&mut store, Level::Requirement, None, "Third");
    assert_eq!(req3.hierarchical_id, "REQ-003");
}
