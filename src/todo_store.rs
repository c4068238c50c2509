//! Persistent project task store.
//!
//! Schema and bootstrap use inline `CREATE TABLE IF NOT EXISTS` blocks,
//! explicit `CREATE INDEX IF NOT EXISTS` statements, and
//! `ALTER TABLE ... ADD COLUMN` left to future additive changes rather
//! than a migration framework. Dependency-graph acyclicity is enforced
//! with a DFS cycle check on every write that can introduce an edge.

use crate::model::{Subtask, TaskBreakdownResult, TaskDependency, TaskPlan, Todo, TodoPriority, TodoStatus};
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TodoError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("dependency would introduce a cycle")]
    Cycle,
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("task breakdown is invalid: {0}")]
    InvalidBreakdown(String),
}

pub type TodoResult<T> = Result<T, TodoError>;

pub struct TodoStore {
    pool: SqlitePool,
}

impl TodoStore {
    pub async fn open(db_path: &std::path::Path) -> TodoResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TodoError::Database(sqlx::Error::Io(e)))?;
        }
        let url = format!("sqlite:{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new().max_connections(5).connect(&url).await?;
        sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
        create_tables(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn create_todo(
        &self,
        project_id: &str,
        title: &str,
        description: Option<&str>,
        priority: TodoPriority,
        category: &str,
        estimated_hours: f64,
    ) -> TodoResult<Todo> {
        let todo = Todo {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            title: title.to_string(),
            description: description.map(|d| d.to_string()),
            status: TodoStatus::Pending,
            priority,
            category: category.to_string(),
            estimated_hours,
            created_at: Utc::now(),
            completed_at: None,
        };
        insert_todo(&self.pool, &todo).await?;
        Ok(todo)
    }

    pub async fn list_todos(&self, project_id: &str, filter: Option<&[TodoStatus]>) -> TodoResult<Vec<Todo>> {
        let rows = sqlx::query(
            "SELECT id, project_id, title, description, status, priority, category, \
             estimated_hours, created_at, completed_at FROM todos WHERE project_id = ? \
             ORDER BY created_at ASC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        let todos: Vec<Todo> = rows.iter().map(row_to_todo).collect();
        match filter {
            Some(statuses) => Ok(todos.into_iter().filter(|t| statuses.contains(&t.status)).collect()),
            None => Ok(todos),
        }
    }

    pub async fn update_status(&self, todo_id: &str, status: TodoStatus) -> TodoResult<()> {
        let completed_at = matches!(status, TodoStatus::Completed).then(|| Utc::now().to_rfc3339());
        let result = sqlx::query("UPDATE todos SET status = ?, completed_at = COALESCE(?, completed_at) WHERE id = ?")
            .bind(status.as_str())
            .bind(completed_at)
            .bind(todo_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(TodoError::NotFound(todo_id.to_string()));
        }
        Ok(())
    }

    pub async fn delete_todo(&self, todo_id: &str) -> TodoResult<()> {
        let result = sqlx::query("DELETE FROM todos WHERE id = ?").bind(todo_id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(TodoError::NotFound(todo_id.to_string()));
        }
        Ok(())
    }

    pub async fn create_subtask(
        &self,
        parent_task_id: &str,
        title: &str,
        description: Option<&str>,
        estimated_hours: f64,
    ) -> TodoResult<Subtask> {
        let subtask = Subtask {
            id: Uuid::new_v4().to_string(),
            parent_task_id: parent_task_id.to_string(),
            title: title.to_string(),
            description: description.map(|d| d.to_string()),
            status: TodoStatus::Pending,
            estimated_hours,
        };
        insert_subtask(&self.pool, &subtask).await?;
        Ok(subtask)
    }

    pub async fn list_subtasks(&self, task_id: &str) -> TodoResult<Vec<Subtask>> {
        let rows = sqlx::query(
            "SELECT id, parent_task_id, title, description, status, estimated_hours \
             FROM subtasks WHERE parent_task_id = ? ORDER BY rowid ASC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_subtask).collect())
    }

    pub async fn update_subtask(&self, subtask_id: &str, status: TodoStatus) -> TodoResult<()> {
        let result = sqlx::query("UPDATE subtasks SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(subtask_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(TodoError::NotFound(subtask_id.to_string()));
        }
        Ok(())
    }

    pub async fn mark_subtask_done(&self, subtask_id: &str) -> TodoResult<()> {
        self.update_subtask(subtask_id, TodoStatus::Completed).await
    }

    /// Reject the edge if it is a self-loop or would close a cycle in the
    /// existing dependency graph.
    pub async fn add_dependency(&self, task_id: &str, depends_on_task_id: &str) -> TodoResult<()> {
        if task_id == depends_on_task_id {
            return Err(TodoError::Cycle);
        }

        let mut edges = self.load_dependency_edges(None).await?;
        edges.entry(task_id.to_string()).or_default().push(depends_on_task_id.to_string());
        if has_cycle(&edges) {
            return Err(TodoError::Cycle);
        }

        sqlx::query("INSERT OR IGNORE INTO task_dependencies (task_id, depends_on_task_id) VALUES (?, ?)")
            .bind(task_id)
            .bind(depends_on_task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Topological order of `projectId`'s tasks by dependency graph.
    pub async fn get_execution_order(&self, project_id: &str) -> TodoResult<Vec<String>> {
        let todos = self.list_todos(project_id, None).await?;
        let ids: HashSet<String> = todos.iter().map(|t| t.id.clone()).collect();
        let edges = self.load_dependency_edges(Some(&ids)).await?;
        topological_sort(&ids, &edges).ok_or(TodoError::Cycle)
    }

    /// True iff every dependency of `taskId` is completed.
    pub async fn can_start(&self, task_id: &str) -> TodoResult<bool> {
        let rows = sqlx::query(
            "SELECT t.status FROM task_dependencies d \
             JOIN todos t ON t.id = d.depends_on_task_id \
             WHERE d.task_id = ?",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .all(|row| TodoStatus::parse(row.try_get::<String, _>("status").unwrap_or_default().as_str()) == TodoStatus::Completed))
    }

    /// Persist a validated breakdown atomically: tasks, then subtasks, then
    /// dependencies. On any failure the transaction rolls back and the store
    /// is left unchanged.
    pub async fn create_tasks_from_breakdown(
        &self,
        breakdown: &TaskBreakdownResult,
        project_id: &str,
        original_prompt: &str,
    ) -> TodoResult<TaskPlan> {
        let mut tx = self.pool.begin().await?;

        let mut title_to_id: HashMap<String, String> = HashMap::new();
        let mut main_tasks = Vec::with_capacity(breakdown.main_tasks.len());
        for task in &breakdown.main_tasks {
            let mut task = task.clone();
            task.id = Uuid::new_v4().to_string();
            task.project_id = project_id.to_string();
            title_to_id.insert(task.title.clone(), task.id.clone());

            sqlx::query(
                "INSERT INTO todos (id, project_id, title, description, status, priority, \
                 category, estimated_hours, created_at, completed_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)",
            )
            .bind(&task.id)
            .bind(&task.project_id)
            .bind(&task.title)
            .bind(&task.description)
            .bind(task.status.as_str())
            .bind(task.priority.as_str())
            .bind(&task.category)
            .bind(task.estimated_hours)
            .bind(task.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;

            main_tasks.push(task);
        }

        let mut subtasks = Vec::with_capacity(breakdown.subtasks.len());
        for subtask in &breakdown.subtasks {
            let Some(parent_id) = title_to_id.get(&subtask.parent_task_id).cloned() else {
                tx.rollback().await?;
                return Err(TodoError::InvalidBreakdown(format!(
                    "subtask '{}' references unknown parent '{}'",
                    subtask.title, subtask.parent_task_id
                )));
            };
            let mut subtask = subtask.clone();
            subtask.id = Uuid::new_v4().to_string();
            subtask.parent_task_id = parent_id;

            sqlx::query(
                "INSERT INTO subtasks (id, parent_task_id, title, description, status, estimated_hours) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&subtask.id)
            .bind(&subtask.parent_task_id)
            .bind(&subtask.title)
            .bind(&subtask.description)
            .bind(subtask.status.as_str())
            .bind(subtask.estimated_hours)
            .execute(&mut *tx)
            .await?;

            subtasks.push(subtask);
        }

        let mut edges: HashMap<String, Vec<String>> = HashMap::new();
        let mut dependencies = Vec::with_capacity(breakdown.dependencies.len());
        for dep in &breakdown.dependencies {
            let (Some(task_id), Some(depends_on_id)) = (
                title_to_id.get(&dep.task_id).cloned(),
                title_to_id.get(&dep.depends_on_task_id).cloned(),
            ) else {
                tx.rollback().await?;
                return Err(TodoError::InvalidBreakdown(format!(
                    "dependency references an unknown task: '{}' -> '{}'",
                    dep.task_id, dep.depends_on_task_id
                )));
            };

            edges.entry(task_id.clone()).or_default().push(depends_on_id.clone());
            if has_cycle(&edges) {
                tx.rollback().await?;
                return Err(TodoError::Cycle);
            }

            sqlx::query("INSERT OR IGNORE INTO task_dependencies (task_id, depends_on_task_id) VALUES (?, ?)")
                .bind(&task_id)
                .bind(&depends_on_id)
                .execute(&mut *tx)
                .await?;

            dependencies.push(TaskDependency { task_id, depends_on_task_id: depends_on_id });
        }

        let plan = TaskPlan {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            original_prompt: original_prompt.to_string(),
            main_tasks,
            subtasks,
            dependencies,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO task_plans (id, project_id, original_prompt, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&plan.id)
        .bind(&plan.project_id)
        .bind(&plan.original_prompt)
        .bind(plan.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(plan)
    }

    /// Load the full dependency edge map, optionally restricted to a set of
    /// known task ids (used when scoping to one project).
    async fn load_dependency_edges(&self, scope: Option<&HashSet<String>>) -> TodoResult<HashMap<String, Vec<String>>> {
        let rows = sqlx::query("SELECT task_id, depends_on_task_id FROM task_dependencies")
            .fetch_all(&self.pool)
            .await?;

        let mut edges: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            let task_id: String = row.try_get("task_id").unwrap_or_default();
            let depends_on: String = row.try_get("depends_on_task_id").unwrap_or_default();
            if let Some(scope) = scope {
                if !scope.contains(&task_id) || !scope.contains(&depends_on) {
                    continue;
                }
            }
            edges.entry(task_id).or_default().push(depends_on);
        }
        Ok(edges)
    }
}

async fn insert_todo(pool: &SqlitePool, todo: &Todo) -> TodoResult<()> {
    sqlx::query(
        "INSERT INTO todos (id, project_id, title, description, status, priority, \
         category, estimated_hours, created_at, completed_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&todo.id)
    .bind(&todo.project_id)
    .bind(&todo.title)
    .bind(&todo.description)
    .bind(todo.status.as_str())
    .bind(todo.priority.as_str())
    .bind(&todo.category)
    .bind(todo.estimated_hours)
    .bind(todo.created_at.to_rfc3339())
    .bind(todo.completed_at.map(|t| t.to_rfc3339()))
    .execute(pool)
    .await?;
    Ok(())
}

async fn insert_subtask(pool: &SqlitePool, subtask: &Subtask) -> TodoResult<()> {
    sqlx::query(
        "INSERT INTO subtasks (id, parent_task_id, title, description, status, estimated_hours) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&subtask.id)
    .bind(&subtask.parent_task_id)
    .bind(&subtask.title)
    .bind(&subtask.description)
    .bind(subtask.status.as_str())
    .bind(subtask.estimated_hours)
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS todos (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            status TEXT NOT NULL,
            priority TEXT NOT NULL,
            category TEXT NOT NULL,
            estimated_hours REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            completed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subtasks (
            id TEXT PRIMARY KEY,
            parent_task_id TEXT NOT NULL REFERENCES todos(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            description TEXT,
            status TEXT NOT NULL,
            estimated_hours REAL NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_dependencies (
            task_id TEXT NOT NULL REFERENCES todos(id) ON DELETE CASCADE,
            depends_on_task_id TEXT NOT NULL REFERENCES todos(id) ON DELETE CASCADE,
            PRIMARY KEY (task_id, depends_on_task_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_plans (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            original_prompt TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Additive columns land here via a best-effort, re-run-safe ALTER TABLE
    // instead of a migration runner.
    let _ = sqlx::query("ALTER TABLE todos ADD COLUMN category TEXT NOT NULL DEFAULT 'general'")
        .execute(pool)
        .await;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_todos_project ON todos(project_id, status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_subtasks_parent ON subtasks(parent_task_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_deps_task ON task_dependencies(task_id)")
        .execute(pool)
        .await?;

    Ok(())
}

fn row_to_todo(row: &sqlx::sqlite::SqliteRow) -> Todo {
    Todo {
        id: row.try_get("id").unwrap_or_default(),
        project_id: row.try_get("project_id").unwrap_or_default(),
        title: row.try_get("title").unwrap_or_default(),
        description: row.try_get::<Option<String>, _>("description").ok().flatten(),
        status: TodoStatus::parse(&row.try_get::<String, _>("status").unwrap_or_default()),
        priority: TodoPriority::parse(&row.try_get::<String, _>("priority").unwrap_or_default()),
        category: row.try_get("category").unwrap_or_default(),
        estimated_hours: row.try_get("estimated_hours").unwrap_or(0.0),
        created_at: parse_timestamp(row.try_get("created_at").unwrap_or_default()),
        completed_at: row.try_get::<Option<String>, _>("completed_at").ok().flatten().map(parse_timestamp),
    }
}

fn row_to_subtask(row: &sqlx::sqlite::SqliteRow) -> Subtask {
    Subtask {
        id: row.try_get("id").unwrap_or_default(),
        parent_task_id: row.try_get("parent_task_id").unwrap_or_default(),
        title: row.try_get("title").unwrap_or_default(),
        description: row.try_get::<Option<String>, _>("description").ok().flatten(),
        status: TodoStatus::parse(&row.try_get::<String, _>("status").unwrap_or_default()),
        estimated_hours: row.try_get("estimated_hours").unwrap_or(0.0),
    }
}

fn parse_timestamp(raw: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// DFS-based cycle detection over a directed edge map (`task -> depends_on`).
fn has_cycle(edges: &HashMap<String, Vec<String>>) -> bool {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(node: &str, edges: &HashMap<String, Vec<String>>, marks: &mut HashMap<String, Mark>) -> bool {
        match marks.get(node) {
            Some(Mark::Visiting) => return true,
            Some(Mark::Done) => return false,
            None => {}
        }
        marks.insert(node.to_string(), Mark::Visiting);
        if let Some(neighbors) = edges.get(node) {
            for next in neighbors {
                if visit(next, edges, marks) {
                    return true;
                }
            }
        }
        marks.insert(node.to_string(), Mark::Done);
        false
    }

    let mut marks = HashMap::new();
    edges.keys().any(|node| visit(node, edges, &mut marks))
}

/// Kahn's algorithm; returns `None` if the graph contains a cycle.
fn topological_sort(nodes: &HashSet<String>, edges: &HashMap<String, Vec<String>>) -> Option<Vec<String>> {
    let mut in_degree: HashMap<String, usize> = nodes.iter().map(|n| (n.clone(), 0)).collect();
    for (task, deps) in edges {
        if !nodes.contains(task) {
            continue;
        }
        for dep in deps {
            if nodes.contains(dep) {
                *in_degree.get_mut(task).unwrap() += 1;
            }
        }
    }

    // A task may only run once everything it depends on has run, so the
    // edge direction (task -> depends_on) is reversed for the queue: roots
    // are tasks with no outstanding dependencies.
    let mut queue: VecDeque<String> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(node, _)| node.clone())
        .collect();

    let dependents: HashMap<String, Vec<String>> = {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (task, deps) in edges {
            for dep in deps {
                map.entry(dep.clone()).or_default().push(task.clone());
            }
        }
        map
    };

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(node) = queue.pop_front() {
        order.push(node.clone());
        if let Some(dependents) = dependents.get(&node) {
            for dependent in dependents {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent.clone());
                    }
                }
            }
        }
    }

    if order.len() == nodes.len() {
        Some(order)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> TodoStore {
        let dir = tempfile::tempdir().unwrap();
        TodoStore::open(&dir.path().join("todos.db")).await.unwrap()
    }

    #[tokio::test]
    async fn create_and_list_roundtrip() {
        let store = store().await;
        store.create_todo("proj", "write tests", None, TodoPriority::High, "testing", 2.0).await.unwrap();
        let todos = store.list_todos("proj", None).await.unwrap();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].title, "write tests");
        assert_eq!(todos[0].status, TodoStatus::Pending);
    }

    #[tokio::test]
    async fn update_status_sets_completed_at() {
        let store = store().await;
        let todo = store.create_todo("proj", "ship it", None, TodoPriority::Medium, "general", 1.0).await.unwrap();
        store.update_status(&todo.id, TodoStatus::Completed).await.unwrap();
        let todos = store.list_todos("proj", None).await.unwrap();
        assert_eq!(todos[0].status, TodoStatus::Completed);
        assert!(todos[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn self_dependency_is_rejected() {
        let store = store().await;
        let todo = store.create_todo("proj", "a", None, TodoPriority::Low, "general", 1.0).await.unwrap();
        let result = store.add_dependency(&todo.id, &todo.id).await;
        assert!(matches!(result, Err(TodoError::Cycle)));
    }

    #[tokio::test]
    async fn three_cycle_is_rejected() {
        let store = store().await;
        let a = store.create_todo("proj", "a", None, TodoPriority::Low, "general", 1.0).await.unwrap();
        let b = store.create_todo("proj", "b", None, TodoPriority::Low, "general", 1.0).await.unwrap();
        let c = store.create_todo("proj", "c", None, TodoPriority::Low, "general", 1.0).await.unwrap();

        store.add_dependency(&a.id, &b.id).await.unwrap();
        store.add_dependency(&b.id, &c.id).await.unwrap();
        let result = store.add_dependency(&c.id, &a.id).await;
        assert!(matches!(result, Err(TodoError::Cycle)));
    }

    #[tokio::test]
    async fn execution_order_respects_dependencies() {
        let store = store().await;
        let a = store.create_todo("proj", "a", None, TodoPriority::Low, "general", 1.0).await.unwrap();
        let b = store.create_todo("proj", "b", None, TodoPriority::Low, "general", 1.0).await.unwrap();
        store.add_dependency(&a.id, &b.id).await.unwrap();

        let order = store.get_execution_order("proj").await.unwrap();
        let pos_a = order.iter().position(|id| id == &a.id).unwrap();
        let pos_b = order.iter().position(|id| id == &b.id).unwrap();
        assert!(pos_b < pos_a);
    }

    #[tokio::test]
    async fn can_start_requires_completed_dependencies() {
        let store = store().await;
        let a = store.create_todo("proj", "a", None, TodoPriority::Low, "general", 1.0).await.unwrap();
        let b = store.create_todo("proj", "b", None, TodoPriority::Low, "general", 1.0).await.unwrap();
        store.add_dependency(&a.id, &b.id).await.unwrap();

        assert!(!store.can_start(&a.id).await.unwrap());
        store.update_status(&b.id, TodoStatus::Completed).await.unwrap();
        assert!(store.can_start(&a.id).await.unwrap());
    }

    #[tokio::test]
    async fn invalid_breakdown_rolls_back_fully() {
        let store = store().await;
        let breakdown = TaskBreakdownResult {
            main_tasks: vec![Todo {
                id: String::new(),
                project_id: String::new(),
                title: "root".to_string(),
                description: None,
                status: TodoStatus::Pending,
                priority: TodoPriority::Medium,
                category: "general".to_string(),
                estimated_hours: 1.0,
                created_at: Utc::now(),
                completed_at: None,
            }],
            subtasks: vec![Subtask {
                id: String::new(),
                parent_task_id: "does-not-exist".to_string(),
                title: "orphan".to_string(),
                description: None,
                status: TodoStatus::Pending,
                estimated_hours: 1.0,
            }],
            dependencies: Vec::new(),
            estimated_total_hours: 1.0,
            success: true,
        };

        let result = store.create_tasks_from_breakdown(&breakdown, "proj", "build something").await;
        assert!(result.is_err());
        let todos = store.list_todos("proj", None).await.unwrap();
        assert!(todos.is_empty());
    }

    #[tokio::test]
    async fn valid_breakdown_persists_tasks_subtasks_and_dependencies() {
        let store = store().await;
        let breakdown = TaskBreakdownResult {
            main_tasks: vec![
                Todo {
                    id: String::new(),
                    project_id: String::new(),
                    title: "design schema".to_string(),
                    description: None,
                    status: TodoStatus::Pending,
                    priority: TodoPriority::High,
                    category: "design".to_string(),
                    estimated_hours: 2.0,
                    created_at: Utc::now(),
                    completed_at: None,
                },
                Todo {
                    id: String::new(),
                    project_id: String::new(),
                    title: "implement api".to_string(),
                    description: None,
                    status: TodoStatus::Pending,
                    priority: TodoPriority::High,
                    category: "implementation".to_string(),
                    estimated_hours: 4.0,
                    created_at: Utc::now(),
                    completed_at: None,
                },
            ],
            subtasks: vec![Subtask {
                id: String::new(),
                parent_task_id: "design schema".to_string(),
                title: "draft tables".to_string(),
                description: None,
                status: TodoStatus::Pending,
                estimated_hours: 1.0,
            }],
            dependencies: vec![TaskDependency {
                task_id: "implement api".to_string(),
                depends_on_task_id: "design schema".to_string(),
            }],
            estimated_total_hours: 6.0,
            success: true,
        };

        let plan = store.create_tasks_from_breakdown(&breakdown, "proj", "build an api").await.unwrap();
        assert_eq!(plan.main_tasks.len(), 2);
        assert_eq!(plan.subtasks.len(), 1);
        assert_eq!(plan.dependencies.len(), 1);

        let todos = store.list_todos("proj", None).await.unwrap();
        assert_eq!(todos.len(), 2);
    }
}
