//! Operator maintenance CLI for PromptMCP.
//!
//! A thin wrapper around the library for out-of-band inspection — listing
//! and mutating todos, inspecting prompt-cache stats, and a `doctor`
//! reachability check. Not part of the MCP `enhance` RPC surface.

use clap::{Parser, Subcommand};
use colored::Colorize;
use promptmcp::config::Config;
use promptmcp::context7_client::Context7Client;
use promptmcp::llm_client::LlmClient;
use promptmcp::model::{TodoPriority, TodoStatus};
use promptmcp::prompt_cache::PromptCache;
use promptmcp::todo_store::TodoStore;

#[derive(Parser)]
#[command(name = "promptmcp")]
#[command(about = "Operator CLI for the PromptMCP enhance service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project scope for todo commands.
    #[arg(long, global = true, default_value = "default")]
    project: String,
}

#[derive(Subcommand)]
#[clap(rename_all = "kebab-case")]
enum Commands {
    /// Inspect and manage the project todo store.
    Todo {
        #[command(subcommand)]
        action: TodoCommands,
    },
    /// Inspect or clear the prompt cache.
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },
    /// Check Context7 and LLM reachability plus local database health.
    Doctor,
}

#[derive(Subcommand)]
#[clap(rename_all = "kebab-case")]
enum TodoCommands {
    /// List active todos for the current project.
    List {
        /// Include completed and cancelled todos.
        #[arg(long)]
        all: bool,
    },
    /// Add a new todo.
    Add {
        title: String,
        #[arg(long, default_value = "medium")]
        priority: String,
        #[arg(long, default_value = "general")]
        category: String,
        #[arg(long, default_value_t = 0.0)]
        hours: f64,
    },
    /// Mark a todo completed.
    Done { todo_id: String },
}

#[derive(Subcommand)]
#[clap(rename_all = "kebab-case")]
enum CacheCommands {
    /// Print prompt-cache hit/miss statistics.
    Stats,
    /// Clear all cached responses (or those matching a substring pattern).
    Clear {
        #[arg(long)]
        pattern: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Todo { action } => run_todo(&config, &cli.project, action).await,
        Commands::Cache { action } => run_cache(&config, action).await,
        Commands::Doctor => run_doctor(&config).await,
    }
}

async fn run_todo(config: &Config, project: &str, action: TodoCommands) -> anyhow::Result<()> {
    let store = TodoStore::open(&config.todo_db_path()).await?;
    match action {
        TodoCommands::List { all } => {
            let filter = if all {
                None
            } else {
                Some(&[TodoStatus::Pending, TodoStatus::InProgress][..])
            };
            let todos = store.list_todos(project, filter).await?;
            if todos.is_empty() {
                println!("no todos for project '{project}'");
            }
            for todo in todos {
                println!(
                    "{}  [{}] {} ({}, {}h) — {}",
                    todo.id.dimmed(),
                    todo.priority.as_str().to_uppercase(),
                    todo.title.bold(),
                    todo.status.as_str(),
                    todo.estimated_hours,
                    todo.category,
                );
            }
        }
        TodoCommands::Add { title, priority, category, hours } => {
            let todo = store
                .create_todo(project, &title, None, TodoPriority::parse(&priority), &category, hours)
                .await?;
            println!("{} {}", "created".green(), todo.id);
        }
        TodoCommands::Done { todo_id } => {
            store.update_status(&todo_id, TodoStatus::Completed).await?;
            println!("{} {}", "completed".green(), todo_id);
        }
    }
    Ok(())
}

async fn run_cache(config: &Config, action: CacheCommands) -> anyhow::Result<()> {
    let cache = PromptCache::open(&config.cache_db_path(), config.cache.clone()).await;
    match action {
        CacheCommands::Stats => {
            let stats = cache.stats().await;
            println!("entries:      {}", stats.total_entries);
            println!("hits/misses:  {}/{}", stats.total_hits, stats.total_misses);
            println!("hit rate:     {:.1}%", stats.hit_rate * 100.0);
            println!("size:         {} bytes", stats.size_bytes);
            if !stats.top_frameworks.is_empty() {
                println!("top frameworks: {}", stats.top_frameworks.join(", "));
            }
        }
        CacheCommands::Clear { pattern } => {
            cache.invalidate(pattern.as_deref()).await;
            println!("{}", "cache cleared".green());
        }
    }
    Ok(())
}

async fn run_doctor(config: &Config) -> anyhow::Result<()> {
    println!("{}", "checking local state...".bold());
    match TodoStore::open(&config.todo_db_path()).await {
        Ok(_) => println!("  todo store      {}", "ok".green()),
        Err(e) => println!("  todo store      {}  ({e})", "failed".red()),
    }
    let _cache = PromptCache::open(&config.cache_db_path(), config.cache.clone()).await;
    println!("  prompt cache    {}", "ok".green());

    println!("{}", "checking upstreams...".bold());
    if config.context7.enabled {
        let client = Context7Client::new(config.context7.clone());
        let handles = client.resolve_library_id("react").await;
        if handles.is_empty() {
            println!("  context7        {}  (no handles resolved for a known library)", "warn".yellow());
        } else {
            println!("  context7        {}", "ok".green());
        }
    } else {
        println!("  context7        {}", "disabled".dimmed());
    }

    if config.llm.enabled {
        let client = LlmClient::new(config.llm.clone());
        if !client.is_enabled() {
            println!("  llm             {}  (no API key configured)", "failed".red());
        } else {
            match client.complete("doctor", "Reply with OK.", "ping").await {
                Ok(_) => println!("  llm             {}", "ok".green()),
                Err(e) => println!("  llm             {}  ({e})", "failed".red()),
            }
        }
    } else {
        println!("  llm             {}", "disabled".dimmed());
    }

    Ok(())
}
