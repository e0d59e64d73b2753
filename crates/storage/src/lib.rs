#![forbid(unsafe_code)]

mod error;
mod requests;

pub use error::StoreError;
pub use requests::*;

use rusqlite::{
    Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior, params,
    params_from_iter, types::Value,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tt_core::ids::{Level, Segment, compose};
use tt_core::status::TaskStatus;
use tt_core::validate::validate_parent;

const DB_FILE: &str = "tasktrellis.db";
const MAX_CREATE_ATTEMPTS: usize = 5;

const TASK_COLUMNS: &str = "id, hierarchical_id, title, description, level, status, parent_id, \
                            sequence, created_at_ms, updated_at_ms";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskRow {
    pub id: i64,
    pub hierarchical_id: String,
    pub title: String,
    pub description: Option<String>,
    pub level: Level,
    pub status: TaskStatus,
    pub parent_id: Option<i64>,
    pub sequence: i64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommentRow {
    pub id: i64,
    pub task_id: i64,
    pub kind: CommentKind,
    pub body: String,
    pub created_by: Option<String>,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryRow {
    pub id: i64,
    pub task_id: i64,
    pub event_type: String,
    pub from_status: Option<TaskStatus>,
    pub to_status: Option<TaskStatus>,
    pub note: Option<String>,
    pub changed_by: Option<String>,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeNode {
    pub id: i64,
    pub hierarchical_id: String,
    pub title: String,
    pub level: Level,
    pub status: TaskStatus,
    pub children: Vec<TreeNode>,
}

#[derive(Debug)]
pub struct SqliteStore {
    storage_dir: PathBuf,
    conn: Connection,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;
        let conn = Connection::open(storage_dir.join(DB_FILE))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let store = Self { storage_dir, conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    fn migrate(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;

            CREATE TABLE IF NOT EXISTS meta (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tasks (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              hierarchical_id TEXT NOT NULL UNIQUE,
              title TEXT NOT NULL,
              description TEXT,
              level TEXT NOT NULL,
              status TEXT NOT NULL,
              parent_id INTEGER REFERENCES tasks(id) ON DELETE CASCADE,
              sequence INTEGER NOT NULL,
              created_at_ms INTEGER NOT NULL,
              updated_at_ms INTEGER NOT NULL
            );

            -- Root tasks form one sibling group; row ids start at 1, so 0 is free.
            CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_sibling_sequence
              ON tasks(COALESCE(parent_id, 0), level, sequence);

            CREATE INDEX IF NOT EXISTS idx_tasks_parent_level
              ON tasks(parent_id, level);

            CREATE TABLE IF NOT EXISTS comments (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
              kind TEXT NOT NULL,
              body TEXT NOT NULL,
              created_by TEXT,
              created_at_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_comments_task ON comments(task_id, id);

            CREATE TABLE IF NOT EXISTS task_history (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
              event_type TEXT NOT NULL,
              from_status TEXT,
              to_status TEXT,
              note TEXT,
              changed_by TEXT,
              created_at_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_task_history_task ON task_history(task_id, id);
            "#,
        )?;
        self.conn.execute(
            "INSERT OR IGNORE INTO meta(key, value) VALUES (?1, ?2)",
            params!["schema_version", "v1"],
        )?;
        Ok(())
    }

    /// Create a node, assigning its sequence and hierarchical identifier.
    ///
    /// The sibling-max read and the insert share one immediate transaction;
    /// the unique sibling index is the cross-process backstop. A lost race
    /// retries the whole cycle a bounded number of times.
    pub fn create_task(&mut self, request: CreateTaskRequest) -> Result<TaskRow, StoreError> {
        if request.title.trim().is_empty() {
            return Err(StoreError::InvalidInput("title must not be empty"));
        }
        let mut attempts = 0;
        loop {
            match self.try_create_task(&request) {
                Err(StoreError::Sql(err)) if is_constraint_violation(&err) => {
                    attempts += 1;
                    if attempts >= MAX_CREATE_ATTEMPTS {
                        return Err(StoreError::AllocationConflict);
                    }
                }
                other => return other,
            }
        }
    }

    fn try_create_task(&mut self, request: &CreateTaskRequest) -> Result<TaskRow, StoreError> {
        let now_ms = now_ms();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let parent = match request.parent_id {
            Some(parent_id) => {
                Some(fetch_task(&tx, parent_id)?.ok_or(StoreError::ParentNotFound)?)
            }
            None => None,
        };
        validate_parent(request.level, parent.as_ref().map(|p| p.level))?;

        let sequence = max_sequence_tx(&tx, request.parent_id, request.level)? + 1;
        let segment = Segment {
            level: request.level,
            sequence,
        }
        .format();
        let hierarchical_id = compose(
            parent.as_ref().map(|p| p.hierarchical_id.as_str()),
            &segment,
        );
        let status = TaskStatus::default();

        tx.execute(
            r#"
            INSERT INTO tasks(hierarchical_id,title,description,level,status,parent_id,sequence,created_at_ms,updated_at_ms)
            VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?8)
            "#,
            params![
                hierarchical_id,
                request.title,
                request.description,
                request.level.as_str(),
                status.as_str(),
                request.parent_id,
                sequence,
                now_ms
            ],
        )?;
        let id = tx.last_insert_rowid();
        insert_history_tx(&tx, id, "created", None, Some(status), None, now_ms)?;
        tx.commit()?;

        Ok(TaskRow {
            id,
            hierarchical_id,
            title: request.title.clone(),
            description: request.description.clone(),
            level: request.level,
            status,
            parent_id: request.parent_id,
            sequence,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        })
    }

    pub fn task(&self, id: i64) -> Result<Option<TaskRow>, StoreError> {
        fetch_task(&self.conn, id)
    }

    pub fn task_by_hierarchical_id(
        &self,
        hierarchical_id: &str,
    ) -> Result<Option<TaskRow>, StoreError> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE hierarchical_id=?1"),
                params![hierarchical_id],
                read_raw_task,
            )
            .optional()?;
        raw.map(task_from_raw).transpose()
    }

    /// The highest sequence already issued in a `(parent, level)` sibling
    /// group; 0 when the group is empty.
    pub fn max_sequence(&self, parent_id: Option<i64>, level: Level) -> Result<i64, StoreError> {
        Ok(self.conn.query_row(
            "SELECT COALESCE(MAX(sequence), 0) FROM tasks WHERE parent_id IS ?1 AND level=?2",
            params![parent_id, level.as_str()],
            |row| row.get(0),
        )?)
    }

    pub fn list_tasks(&self, limit: usize, offset: usize) -> Result<Vec<TaskRow>, StoreError> {
        let limit = to_sqlite_i64(limit)?;
        let offset = to_sqlite_i64(offset)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at_ms ASC, id ASC LIMIT ?1 OFFSET ?2"
        ))?;
        let mut rows = stmt.query(params![limit, offset])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(task_from_raw(read_raw_task(row)?)?);
        }
        Ok(out)
    }

    pub fn children(&self, parent_id: i64, level: Level) -> Result<Vec<TaskRow>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE parent_id=?1 AND level=?2 ORDER BY sequence ASC"
        ))?;
        let mut rows = stmt.query(params![parent_id, level.as_str()])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(task_from_raw(read_raw_task(row)?)?);
        }
        Ok(out)
    }

    pub fn search(&self, request: SearchTasksRequest) -> Result<Vec<TaskRow>, StoreError> {
        let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks");
        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(level) = request.level {
            conditions.push("level = ?");
            values.push(Value::from(level.as_str().to_string()));
        }
        if let Some(status) = request.status {
            conditions.push("status = ?");
            values.push(Value::from(status.as_str().to_string()));
        }
        if let Some(parent_id) = request.parent_id {
            conditions.push("parent_id = ?");
            values.push(Value::from(parent_id));
        }
        if let Some(q) = request.q.as_deref() {
            if !q.is_empty() {
                conditions.push("(title LIKE ? OR description LIKE ?)");
                let pattern = format!("%{q}%");
                values.push(Value::from(pattern.clone()));
                values.push(Value::from(pattern));
            }
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(request.sort.column());
        sql.push(' ');
        sql.push_str(request.order.keyword());
        sql.push_str(", id ASC LIMIT ? OFFSET ?");
        values.push(Value::from(to_sqlite_i64(request.limit)?));
        values.push(Value::from(to_sqlite_i64(request.offset)?));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(values))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(task_from_raw(read_raw_task(row)?)?);
        }
        Ok(out)
    }

    /// Content fields and status only; identifier, parent and sequence are
    /// immutable once assigned.
    pub fn update_task(
        &mut self,
        id: i64,
        request: UpdateTaskRequest,
    ) -> Result<TaskRow, StoreError> {
        let now_ms = now_ms();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = fetch_task(&tx, id)?.ok_or(StoreError::UnknownId)?;

        let title = request.title.unwrap_or_else(|| current.title.clone());
        if title.trim().is_empty() {
            return Err(StoreError::InvalidInput("title must not be empty"));
        }
        let description = request.description.or_else(|| current.description.clone());
        let status = request.status.unwrap_or(current.status);

        tx.execute(
            "UPDATE tasks SET title=?2, description=?3, status=?4, updated_at_ms=?5 WHERE id=?1",
            params![id, title, description, status.as_str(), now_ms],
        )?;
        insert_history_tx(
            &tx,
            id,
            "updated",
            Some(current.status),
            Some(status),
            None,
            now_ms,
        )?;
        tx.commit()?;

        Ok(TaskRow {
            id: current.id,
            hierarchical_id: current.hierarchical_id,
            title,
            description,
            level: current.level,
            status,
            parent_id: current.parent_id,
            sequence: current.sequence,
            created_at_ms: current.created_at_ms,
            updated_at_ms: now_ms,
        })
    }

    pub fn transition_status(
        &mut self,
        id: i64,
        request: TransitionRequest,
    ) -> Result<TaskRow, StoreError> {
        let now_ms = now_ms();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = fetch_task(&tx, id)?.ok_or(StoreError::UnknownId)?;

        if !current.status.can_transition_to(request.to) {
            return Err(StoreError::InvalidTransition {
                from: current.status,
                to: request.to,
            });
        }

        tx.execute(
            "UPDATE tasks SET status=?2, updated_at_ms=?3 WHERE id=?1",
            params![id, request.to.as_str(), now_ms],
        )?;
        insert_history_tx(
            &tx,
            id,
            "status_change",
            Some(current.status),
            Some(request.to),
            request.reason.as_deref(),
            now_ms,
        )?;
        tx.commit()?;

        Ok(TaskRow {
            status: request.to,
            updated_at_ms: now_ms,
            ..current
        })
    }

    /// Descendants, comments and history rows go with the task
    /// (`ON DELETE CASCADE`).
    pub fn delete_task(&mut self, id: i64) -> Result<(), StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let deleted = tx.execute("DELETE FROM tasks WHERE id=?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::UnknownId);
        }
        tx.commit()?;
        Ok(())
    }

    pub fn add_comment(
        &mut self,
        task_id: i64,
        request: CommentRequest,
    ) -> Result<CommentRow, StoreError> {
        if request.body.trim().is_empty() {
            return Err(StoreError::InvalidInput("comment body must not be empty"));
        }
        let now_ms = now_ms();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_task_exists_tx(&tx, task_id)?;
        tx.execute(
            "INSERT INTO comments(task_id, kind, body, created_by, created_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                task_id,
                request.kind.as_str(),
                request.body,
                request.created_by,
                now_ms
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(CommentRow {
            id,
            task_id,
            kind: request.kind,
            body: request.body,
            created_by: request.created_by,
            created_at_ms: now_ms,
        })
    }

    pub fn comments(
        &self,
        task_id: i64,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CommentRow>, StoreError> {
        let limit = to_sqlite_i64(limit)?;
        let offset = to_sqlite_i64(offset)?;
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, kind, body, created_by, created_at_ms \
             FROM comments WHERE task_id=?1 ORDER BY id ASC LIMIT ?2 OFFSET ?3",
        )?;
        let mut rows = stmt.query(params![task_id, limit, offset])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let kind: String = row.get(2)?;
            out.push(CommentRow {
                id: row.get(0)?,
                task_id: row.get(1)?,
                kind: CommentKind::parse(&kind)
                    .ok_or(StoreError::InvalidInput("invalid comment kind column"))?,
                body: row.get(3)?,
                created_by: row.get(4)?,
                created_at_ms: row.get(5)?,
            });
        }
        Ok(out)
    }

    /// Newest first.
    pub fn history(
        &self,
        task_id: i64,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<HistoryRow>, StoreError> {
        let limit = to_sqlite_i64(limit)?;
        let offset = to_sqlite_i64(offset)?;
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, event_type, from_status, to_status, note, changed_by, created_at_ms \
             FROM task_history WHERE task_id=?1 ORDER BY id DESC LIMIT ?2 OFFSET ?3",
        )?;
        let mut rows = stmt.query(params![task_id, limit, offset])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let from_status: Option<String> = row.get(3)?;
            let to_status: Option<String> = row.get(4)?;
            out.push(HistoryRow {
                id: row.get(0)?,
                task_id: row.get(1)?,
                event_type: row.get(2)?,
                from_status: decode_status_opt(from_status)?,
                to_status: decode_status_opt(to_status)?,
                note: row.get(5)?,
                changed_by: row.get(6)?,
                created_at_ms: row.get(7)?,
            });
        }
        Ok(out)
    }

    /// Subtree rooted at `hierarchical_id`, children ordered by sequence.
    /// `depth` counts levels including the root; anything below the cut is
    /// omitted.
    pub fn tree(
        &self,
        hierarchical_id: &str,
        depth: usize,
    ) -> Result<Option<TreeNode>, StoreError> {
        let Some(root) = self.task_by_hierarchical_id(hierarchical_id)? else {
            return Ok(None);
        };
        Ok(Some(self.tree_node(root, depth.max(1))?))
    }

    fn tree_node(&self, task: TaskRow, depth: usize) -> Result<TreeNode, StoreError> {
        let mut children = Vec::new();
        if depth > 1 {
            if let Some(child_level) = task.level.child() {
                for child in self.children(task.id, child_level)? {
                    children.push(self.tree_node(child, depth - 1)?);
                }
            }
        }
        Ok(TreeNode {
            id: task.id,
            hierarchical_id: task.hierarchical_id,
            title: task.title,
            level: task.level,
            status: task.status,
            children,
        })
    }
}

type RawTask = (
    i64,
    String,
    String,
    Option<String>,
    String,
    String,
    Option<i64>,
    i64,
    i64,
    i64,
);

fn read_raw_task(row: &rusqlite::Row<'_>) -> Result<RawTask, rusqlite::Error> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn task_from_raw(raw: RawTask) -> Result<TaskRow, StoreError> {
    let (
        id,
        hierarchical_id,
        title,
        description,
        level,
        status,
        parent_id,
        sequence,
        created_at_ms,
        updated_at_ms,
    ) = raw;
    let level = Level::parse(&level).ok_or(StoreError::InvalidInput("invalid level column"))?;
    let status =
        TaskStatus::parse(&status).ok_or(StoreError::InvalidInput("invalid status column"))?;
    Ok(TaskRow {
        id,
        hierarchical_id,
        title,
        description,
        level,
        status,
        parent_id,
        sequence,
        created_at_ms,
        updated_at_ms,
    })
}

fn decode_status_opt(value: Option<String>) -> Result<Option<TaskStatus>, StoreError> {
    match value {
        Some(value) => Ok(Some(
            TaskStatus::parse(&value).ok_or(StoreError::InvalidInput("invalid status column"))?,
        )),
        None => Ok(None),
    }
}

fn fetch_task(conn: &Connection, id: i64) -> Result<Option<TaskRow>, StoreError> {
    let raw = conn
        .query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id=?1"),
            params![id],
            read_raw_task,
        )
        .optional()?;
    raw.map(task_from_raw).transpose()
}

fn max_sequence_tx(
    tx: &Transaction<'_>,
    parent_id: Option<i64>,
    level: Level,
) -> Result<i64, StoreError> {
    Ok(tx.query_row(
        "SELECT COALESCE(MAX(sequence), 0) FROM tasks WHERE parent_id IS ?1 AND level=?2",
        params![parent_id, level.as_str()],
        |row| row.get(0),
    )?)
}

fn insert_history_tx(
    tx: &Transaction<'_>,
    task_id: i64,
    event_type: &str,
    from_status: Option<TaskStatus>,
    to_status: Option<TaskStatus>,
    note: Option<&str>,
    now_ms: i64,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO task_history(task_id, event_type, from_status, to_status, note, changed_by, created_at_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            task_id,
            event_type,
            from_status.map(TaskStatus::as_str),
            to_status.map(TaskStatus::as_str),
            note,
            "system",
            now_ms
        ],
    )?;
    Ok(())
}

fn ensure_task_exists_tx(tx: &Transaction<'_>, task_id: i64) -> Result<(), StoreError> {
    let exists = tx
        .query_row(
            "SELECT 1 FROM tasks WHERE id=?1",
            params![task_id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some();
    if exists { Ok(()) } else { Err(StoreError::UnknownId) }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.code == ErrorCode::ConstraintViolation
                || message.as_deref().is_some_and(|value| {
                    value.contains("UNIQUE constraint failed")
                        || value.contains("PRIMARY KEY constraint failed")
                })
        }
        _ => false,
    }
}

fn to_sqlite_i64(value: usize) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::InvalidInput("numeric overflow"))
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
