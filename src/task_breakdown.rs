//! LLM-driven task breakdown.
//!
//! One structured-JSON call per breakdown, parsed and sanity-checked
//! before the result is trusted. A breakdown that fails validation is
//! returned with `success = false` and is never persisted — the caller
//! still gets an enhanced prompt, just without a breakdown section.

use crate::config::BreakdownSettings;
use crate::llm_client::LlmClient;
use crate::model::{Subtask, TaskBreakdownResult, TaskDependency, Todo, TodoPriority, TodoStatus};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use tracing::warn;

pub struct TaskBreakdownEngine {
    settings: BreakdownSettings,
}

/// The LLM's raw, title-keyed output — not yet assigned ids or validated.
#[derive(Debug, Deserialize, Default)]
struct RawBreakdown {
    #[serde(default, rename = "mainTasks")]
    main_tasks: Vec<RawMainTask>,
    #[serde(default)]
    subtasks: Vec<RawSubtask>,
    #[serde(default)]
    dependencies: Vec<RawDependency>,
}

#[derive(Debug, Deserialize)]
struct RawMainTask {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default, rename = "estimatedHours")]
    estimated_hours: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawSubtask {
    #[serde(rename = "parentTaskTitle")]
    parent_task_title: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "estimatedHours")]
    estimated_hours: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawDependency {
    #[serde(rename = "taskTitle")]
    task_title: String,
    #[serde(rename = "dependsOnTaskTitle")]
    depends_on_task_title: String,
}

impl TaskBreakdownEngine {
    pub fn new(settings: BreakdownSettings) -> Self {
        Self { settings }
    }

    /// Run a breakdown for `prompt`, given the frameworks already detected
    /// and a compact summary of project facts and framework docs. Never
    /// errors: LLM or validation failures degrade to a breakdown-less
    /// (`success = false`) result with no side effects.
    pub async fn breakdown(
        &self,
        prompt: &str,
        frameworks: &[String],
        project_facts: &[String],
        framework_docs: &[String],
        llm: Option<&LlmClient>,
        max_tasks: Option<usize>,
    ) -> TaskBreakdownResult {
        let max_tasks = max_tasks.unwrap_or(self.settings.max_tasks);

        let Some(llm) = llm.filter(|c| c.is_enabled()) else {
            return empty_result();
        };

        let result = tokio::time::timeout(self.settings.deadline, self.call_and_validate(prompt, frameworks, project_facts, framework_docs, llm, max_tasks)).await;

        match result {
            Ok(Some(breakdown)) => breakdown,
            Ok(None) => empty_result(),
            Err(_) => {
                warn!("task breakdown exceeded its deadline");
                empty_result()
            }
        }
    }

    async fn call_and_validate(
        &self,
        prompt: &str,
        frameworks: &[String],
        project_facts: &[String],
        framework_docs: &[String],
        llm: &LlmClient,
        max_tasks: usize,
    ) -> Option<TaskBreakdownResult> {
        let system = "Break this request down into a project plan. Reply with ONLY JSON of the shape \
            {\"mainTasks\":[{\"title\",\"description\",\"priority\",\"category\",\"estimatedHours\"}],\
            \"subtasks\":[{\"parentTaskTitle\",\"title\",\"description\",\"estimatedHours\"}],\
            \"dependencies\":[{\"taskTitle\",\"dependsOnTaskTitle\"}]}. \
            Keep mainTasks under the requested cap. priority is one of critical/high/medium/low.";

        let context = format!(
            "Request: {prompt}\n\nDetected frameworks: {}\nProject facts: {}\nFramework docs: {}\nMax main tasks: {max_tasks}",
            frameworks.join(", "),
            project_facts.join("; "),
            framework_docs.join("; "),
        );

        let completion = llm.complete("task_breakdown", system, &context).await.ok()?;
        let raw: RawBreakdown = serde_json::from_str(extract_json(&completion.content)).ok()?;

        Some(validate_and_build(raw, max_tasks))
    }
}

/// Titles unique, every subtask's parent exists, every dependency references
/// an existing title, and the dependency graph is acyclic. On any failure
/// the raw breakdown is still returned, but `success = false`.
fn validate_and_build(mut raw: RawBreakdown, max_tasks: usize) -> TaskBreakdownResult {
    raw.main_tasks.truncate(max_tasks);

    let mut seen_titles = HashSet::new();
    let mut unique = true;
    for task in &raw.main_tasks {
        if !seen_titles.insert(task.title.clone()) {
            unique = false;
        }
    }

    let titles: HashSet<&str> = raw.main_tasks.iter().map(|t| t.title.as_str()).collect();
    let subtasks_valid = raw.subtasks.iter().all(|s| titles.contains(s.parent_task_title.as_str()));
    let deps_valid = raw
        .dependencies
        .iter()
        .all(|d| titles.contains(d.task_title.as_str()) && titles.contains(d.depends_on_task_title.as_str()));

    let mut edges: HashMap<String, Vec<String>> = HashMap::new();
    for dep in &raw.dependencies {
        edges.entry(dep.task_title.clone()).or_default().push(dep.depends_on_task_title.clone());
    }
    let acyclic = !has_cycle(&edges);

    let success = unique && subtasks_valid && deps_valid && acyclic && !raw.main_tasks.is_empty();

    let now = chrono::Utc::now();
    let main_tasks: Vec<Todo> = raw
        .main_tasks
        .iter()
        .map(|t| Todo {
            id: String::new(),
            project_id: String::new(),
            title: t.title.clone(),
            description: t.description.clone(),
            status: TodoStatus::Pending,
            priority: t.priority.as_deref().map(TodoPriority::parse).unwrap_or(TodoPriority::Medium),
            category: t.category.clone().unwrap_or_else(|| "general".to_string()),
            estimated_hours: t.estimated_hours.unwrap_or(1.0),
            created_at: now,
            completed_at: None,
        })
        .collect();

    let subtasks: Vec<Subtask> = raw
        .subtasks
        .iter()
        .map(|s| Subtask {
            id: String::new(),
            parent_task_id: s.parent_task_title.clone(),
            title: s.title.clone(),
            description: s.description.clone(),
            status: TodoStatus::Pending,
            estimated_hours: s.estimated_hours.unwrap_or(0.5),
        })
        .collect();

    let dependencies: Vec<TaskDependency> = raw
        .dependencies
        .iter()
        .map(|d| TaskDependency { task_id: d.task_title.clone(), depends_on_task_id: d.depends_on_task_title.clone() })
        .collect();

    let estimated_total_hours =
        main_tasks.iter().map(|t| t.estimated_hours).sum::<f64>() + subtasks.iter().map(|s| s.estimated_hours).sum::<f64>();

    TaskBreakdownResult { main_tasks, subtasks, dependencies, estimated_total_hours, success }
}

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
        if let Some(next) = edges.get(node) {
            for n in next {
                if visit(n, edges, marks) {
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

fn empty_result() -> TaskBreakdownResult {
    TaskBreakdownResult {
        main_tasks: Vec::new(),
        subtasks: Vec::new(),
        dependencies: Vec::new(),
        estimated_total_hours: 0.0,
        success: false,
    }
}

fn extract_json(text: &str) -> &str {
    let start = text.find('{');
    let end = text.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if e >= s => &text[s..=e],
        _ => text,
    }
}
