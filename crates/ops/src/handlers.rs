#![forbid(unsafe_code)]

use crate::envelope::{Envelope, OpError, OpResponse};
use serde::Deserialize;
use serde_json::{Value, json};
use tt_core::ids::{self, Level};
use tt_core::status::TaskStatus;
use tt_storage::{
    CommentKind, CommentRequest, CommentRow, CreateTaskRequest, HistoryRow, SearchTasksRequest,
    SortOrder, SqliteStore, StoreError, TaskRow, TaskSort, TransitionRequest, TreeNode,
    UpdateTaskRequest,
};

const KNOWN_CMDS: &str = "tasks.create, tasks.get, tasks.list, tasks.update, tasks.delete, \
                          tasks.search, tasks.transition, tasks.children, tasks.tree, \
                          tasks.comment.add, tasks.comments, tasks.history, id.parse";

pub fn dispatch(store: &mut SqliteStore, env: &Envelope) -> OpResponse {
    match env.cmd.as_str() {
        "tasks.create" => handle_create(store, env),
        "tasks.get" => handle_get(store, env),
        "tasks.list" => handle_list(store, env),
        "tasks.update" => handle_update(store, env),
        "tasks.delete" => handle_delete(store, env),
        "tasks.search" => handle_search(store, env),
        "tasks.transition" => handle_transition(store, env),
        "tasks.children" => handle_children(store, env),
        "tasks.tree" => handle_tree(store, env),
        "tasks.comment.add" => handle_comment_add(store, env),
        "tasks.comments" => handle_comments(store, env),
        "tasks.history" => handle_history(store, env),
        "id.parse" => handle_id_parse(env),
        _ => OpResponse::error(
            env.cmd.clone(),
            OpError {
                code: "UNKNOWN_CMD".to_string(),
                message: format!("unknown cmd: {}", env.cmd),
                recovery: Some(format!("Known cmds: {KNOWN_CMDS}.")),
            },
        ),
    }
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Deserialize)]
struct CreateArgs {
    level: String,
    #[serde(default)]
    parent_id: Option<i64>,
    title: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetArgs {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    hierarchical_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListArgs {
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

#[derive(Debug, Deserialize)]
struct UpdateArgs {
    id: i64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeleteArgs {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    parent_id: Option<i64>,
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    sort: Option<String>,
    #[serde(default)]
    order: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

#[derive(Debug, Deserialize)]
struct TransitionArgs {
    id: i64,
    to: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChildrenArgs {
    parent_id: i64,
    level: String,
}

#[derive(Debug, Deserialize)]
struct TreeArgs {
    hierarchical_id: String,
    #[serde(default = "default_tree_depth")]
    depth: usize,
}

fn default_tree_depth() -> usize {
    1
}

#[derive(Debug, Deserialize)]
struct CommentAddArgs {
    task_id: i64,
    kind: String,
    body: String,
    #[serde(default)]
    created_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentsArgs {
    task_id: i64,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

#[derive(Debug, Deserialize)]
struct HistoryArgs {
    task_id: i64,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

#[derive(Debug, Deserialize)]
struct IdParseArgs {
    hierarchical_id: String,
}

fn handle_create(store: &mut SqliteStore, env: &Envelope) -> OpResponse {
    let args: CreateArgs = match decode_args(env) {
        Ok(args) => args,
        Err(resp) => return *resp,
    };
    let Some(level) = Level::parse(&args.level) else {
        return invalid_input(env, "level: expected requirement | task | subtask");
    };
    match store.create_task(CreateTaskRequest {
        level,
        parent_id: args.parent_id,
        title: args.title,
        description: args.description,
    }) {
        Ok(row) => OpResponse::success(env.cmd.clone(), task_value(&row)),
        Err(err) => store_error_response(env, err),
    }
}

fn handle_get(store: &mut SqliteStore, env: &Envelope) -> OpResponse {
    let args: GetArgs = match decode_args(env) {
        Ok(args) => args,
        Err(resp) => return *resp,
    };
    let fetched = match (args.id, args.hierarchical_id.as_deref()) {
        (Some(id), None) => store.task(id),
        (None, Some(hid)) => store.task_by_hierarchical_id(hid),
        _ => return invalid_input(env, "pass exactly one of id or hierarchical_id"),
    };
    match fetched {
        Ok(Some(row)) => OpResponse::success(env.cmd.clone(), task_value(&row)),
        Ok(None) => not_found(env),
        Err(err) => store_error_response(env, err),
    }
}

fn handle_list(store: &mut SqliteStore, env: &Envelope) -> OpResponse {
    let args: ListArgs = match decode_args(env) {
        Ok(args) => args,
        Err(resp) => return *resp,
    };
    match store.list_tasks(args.limit, args.offset) {
        Ok(rows) => OpResponse::success(env.cmd.clone(), tasks_value(&rows)),
        Err(err) => store_error_response(env, err),
    }
}

fn handle_update(store: &mut SqliteStore, env: &Envelope) -> OpResponse {
    let args: UpdateArgs = match decode_args(env) {
        Ok(args) => args,
        Err(resp) => return *resp,
    };
    let status = match args.status.as_deref() {
        Some(value) => match TaskStatus::parse(value) {
            Some(status) => Some(status),
            None => return invalid_input(env, "status: unknown value"),
        },
        None => None,
    };
    match store.update_task(
        args.id,
        UpdateTaskRequest {
            title: args.title,
            description: args.description,
            status,
        },
    ) {
        Ok(row) => OpResponse::success(env.cmd.clone(), task_value(&row)),
        Err(err) => store_error_response(env, err),
    }
}

fn handle_delete(store: &mut SqliteStore, env: &Envelope) -> OpResponse {
    let args: DeleteArgs = match decode_args(env) {
        Ok(args) => args,
        Err(resp) => return *resp,
    };
    match store.delete_task(args.id) {
        Ok(()) => OpResponse::success(env.cmd.clone(), json!({ "deleted": args.id })),
        Err(err) => store_error_response(env, err),
    }
}

fn handle_search(store: &mut SqliteStore, env: &Envelope) -> OpResponse {
    let args: SearchArgs = match decode_args(env) {
        Ok(args) => args,
        Err(resp) => return *resp,
    };
    let level = match args.level.as_deref() {
        Some(value) => match Level::parse(value) {
            Some(level) => Some(level),
            None => return invalid_input(env, "level: expected requirement | task | subtask"),
        },
        None => None,
    };
    let status = match args.status.as_deref() {
        Some(value) => match TaskStatus::parse(value) {
            Some(status) => Some(status),
            None => return invalid_input(env, "status: unknown value"),
        },
        None => None,
    };
    let sort = match args.sort.as_deref() {
        Some(value) => match TaskSort::parse(value) {
            Some(sort) => sort,
            None => return invalid_input(env, "sort: expected created_at | updated_at | title"),
        },
        None => TaskSort::default(),
    };
    let order = match args.order.as_deref() {
        Some(value) => match SortOrder::parse(value) {
            Some(order) => order,
            None => return invalid_input(env, "order: expected asc | desc"),
        },
        None => SortOrder::default(),
    };
    match store.search(SearchTasksRequest {
        level,
        status,
        parent_id: args.parent_id,
        q: args.q,
        sort,
        order,
        limit: args.limit,
        offset: args.offset,
    }) {
        Ok(rows) => OpResponse::success(env.cmd.clone(), tasks_value(&rows)),
        Err(err) => store_error_response(env, err),
    }
}

fn handle_transition(store: &mut SqliteStore, env: &Envelope) -> OpResponse {
    let args: TransitionArgs = match decode_args(env) {
        Ok(args) => args,
        Err(resp) => return *resp,
    };
    let Some(to) = TaskStatus::parse(&args.to) else {
        return invalid_input(env, "to: unknown status value");
    };
    match store.transition_status(
        args.id,
        TransitionRequest {
            to,
            reason: args.reason,
        },
    ) {
        Ok(row) => OpResponse::success(env.cmd.clone(), task_value(&row)),
        Err(err) => store_error_response(env, err),
    }
}

fn handle_children(store: &mut SqliteStore, env: &Envelope) -> OpResponse {
    let args: ChildrenArgs = match decode_args(env) {
        Ok(args) => args,
        Err(resp) => return *resp,
    };
    let Some(level) = Level::parse(&args.level) else {
        return invalid_input(env, "level: expected requirement | task | subtask");
    };
    match store.children(args.parent_id, level) {
        Ok(rows) => OpResponse::success(env.cmd.clone(), tasks_value(&rows)),
        Err(err) => store_error_response(env, err),
    }
}

fn handle_tree(store: &mut SqliteStore, env: &Envelope) -> OpResponse {
    let args: TreeArgs = match decode_args(env) {
        Ok(args) => args,
        Err(resp) => return *resp,
    };
    match store.tree(&args.hierarchical_id, args.depth) {
        Ok(Some(node)) => OpResponse::success(env.cmd.clone(), tree_value(&node)),
        Ok(None) => not_found(env),
        Err(err) => store_error_response(env, err),
    }
}

fn handle_comment_add(store: &mut SqliteStore, env: &Envelope) -> OpResponse {
    let args: CommentAddArgs = match decode_args(env) {
        Ok(args) => args,
        Err(resp) => return *resp,
    };
    let Some(kind) = CommentKind::parse(&args.kind) else {
        return invalid_input(env, "kind: expected review | note");
    };
    match store.add_comment(
        args.task_id,
        CommentRequest {
            kind,
            body: args.body,
            created_by: args.created_by,
        },
    ) {
        Ok(row) => OpResponse::success(env.cmd.clone(), comment_value(&row)),
        Err(err) => store_error_response(env, err),
    }
}

fn handle_comments(store: &mut SqliteStore, env: &Envelope) -> OpResponse {
    let args: CommentsArgs = match decode_args(env) {
        Ok(args) => args,
        Err(resp) => return *resp,
    };
    match store.comments(args.task_id, args.limit, args.offset) {
        Ok(rows) => OpResponse::success(
            env.cmd.clone(),
            json!({ "comments": rows.iter().map(comment_value).collect::<Vec<_>>() }),
        ),
        Err(err) => store_error_response(env, err),
    }
}

fn handle_history(store: &mut SqliteStore, env: &Envelope) -> OpResponse {
    let args: HistoryArgs = match decode_args(env) {
        Ok(args) => args,
        Err(resp) => return *resp,
    };
    match store.history(args.task_id, args.limit, args.offset) {
        Ok(rows) => OpResponse::success(
            env.cmd.clone(),
            json!({ "events": rows.iter().map(history_value).collect::<Vec<_>>() }),
        ),
        Err(err) => store_error_response(env, err),
    }
}

fn handle_id_parse(env: &Envelope) -> OpResponse {
    let args: IdParseArgs = match decode_args(env) {
        Ok(args) => args,
        Err(resp) => return *resp,
    };
    match ids::parse_all(&args.hierarchical_id) {
        Ok(segments) => OpResponse::success(
            env.cmd.clone(),
            json!({
                "hierarchical_id": args.hierarchical_id,
                "depth": segments.len(),
                "segments": segments
                    .iter()
                    .map(|segment| json!({
                        "level": segment.level.as_str(),
                        "prefix": segment.level.prefix(),
                        "sequence": segment.sequence,
                    }))
                    .collect::<Vec<_>>(),
            }),
        ),
        Err(err) => OpResponse::error(
            env.cmd.clone(),
            OpError {
                code: "INVALID_INPUT".to_string(),
                message: format!("hierarchical_id: {}", err.message()),
                recovery: Some("Identifiers look like REQ-001.TSK-002.SUB-003.".to_string()),
            },
        ),
    }
}

fn decode_args<T: serde::de::DeserializeOwned>(env: &Envelope) -> Result<T, Box<OpResponse>> {
    serde_json::from_value(env.args.clone()).map_err(|err| {
        Box::new(OpResponse::error(
            env.cmd.clone(),
            OpError {
                code: "INVALID_INPUT".to_string(),
                message: format!("args: {err}"),
                recovery: None,
            },
        ))
    })
}

fn invalid_input(env: &Envelope, message: &str) -> OpResponse {
    OpResponse::error(
        env.cmd.clone(),
        OpError {
            code: "INVALID_INPUT".to_string(),
            message: message.to_string(),
            recovery: None,
        },
    )
}

fn not_found(env: &Envelope) -> OpResponse {
    OpResponse::error(
        env.cmd.clone(),
        OpError {
            code: "NOT_FOUND".to_string(),
            message: "task not found".to_string(),
            recovery: None,
        },
    )
}

fn store_error_response(env: &Envelope, err: StoreError) -> OpResponse {
    let (code, recovery) = match &err {
        StoreError::UnknownId => ("NOT_FOUND", None),
        StoreError::ParentNotFound => (
            "NOT_FOUND",
            Some("Check parent_id against tasks.list or tasks.search."),
        ),
        StoreError::InvalidInput(_)
        | StoreError::UnexpectedParent
        | StoreError::MissingParent
        | StoreError::LevelMismatch { .. }
        | StoreError::InvalidTransition { .. } => ("INVALID_INPUT", None),
        StoreError::AllocationConflict => ("CONFLICT", Some("Retry the create request.")),
        StoreError::Io(_) | StoreError::Sql(_) => ("INTERNAL_ERROR", None),
    };
    OpResponse::error(
        env.cmd.clone(),
        OpError {
            code: code.to_string(),
            message: err.to_string(),
            recovery: recovery.map(str::to_string),
        },
    )
}

fn task_value(row: &TaskRow) -> Value {
    json!({
        "id": row.id,
        "hierarchical_id": row.hierarchical_id,
        "title": row.title,
        "description": row.description,
        "level": row.level.as_str(),
        "status": row.status.as_str(),
        "parent_id": row.parent_id,
        "sequence": row.sequence,
        "created_at_ms": row.created_at_ms,
        "updated_at_ms": row.updated_at_ms,
    })
}

fn tasks_value(rows: &[TaskRow]) -> Value {
    json!({ "tasks": rows.iter().map(task_value).collect::<Vec<_>>() })
}

fn comment_value(row: &CommentRow) -> Value {
    json!({
        "id": row.id,
        "task_id": row.task_id,
        "kind": row.kind.as_str(),
        "body": row.body,
        "created_by": row.created_by,
        "created_at_ms": row.created_at_ms,
    })
}

fn history_value(row: &HistoryRow) -> Value {
    json!({
        "id": row.id,
        "task_id": row.task_id,
        "event_type": row.event_type,
        "from_status": row.from_status.map(TaskStatus::as_str),
        "to_status": row.to_status.map(TaskStatus::as_str),
        "note": row.note,
        "changed_by": row.changed_by,
        "created_at_ms": row.created_at_ms,
    })
}

fn tree_value(node: &TreeNode) -> Value {
    json!({
        "id": node.id,
        "hierarchical_id": node.hierarchical_id,
        "title": node.title,
        "level": node.level.as_str(),
        "status": node.status.as_str(),
        "children": node.children.iter().map(tree_value).collect::<Vec<_>>(),
    })
}
