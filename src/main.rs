use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::{Result, eyre};
use std::io::{self, Write};
use std::path::PathBuf;
use tasklist::config::default_config_path;
use tasklist::{
    Backend, ClearCompletedRequest, Config, Confirm, Confirmation, Task, TaskFilter, TaskId, TaskList, open_storage,
};
use tracing::Level;

#[derive(Parser)]
#[command(name = "tasklist")]
#[command(about = "Tasklist CLI - persisted to-do list")]
#[command(version)]
struct Cli {
    /// Config file (default: <config dir>/tasklist/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the task data
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Storage backend
    #[arg(short, long, value_enum)]
    backend: Option<Backend>,

    /// Storage key the list is kept under
    #[arg(short, long)]
    key: Option<String>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a task
    Add {
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },

    /// Mark a task completed, or pending again
    Toggle { id: TaskId },

    /// Delete a task
    Rm { id: TaskId },

    /// Show tasks
    List {
        #[arg(short, long, value_enum, default_value_t = TaskFilter::All)]
        filter: TaskFilter,
    },

    /// Delete all completed tasks after confirmation
    ClearCompleted {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Show task counts
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .init();

    let config = resolve_config(&cli)?;
    if config.backend == Backend::Memory {
        eprintln!(
            "{} memory backend selected; changes will not be saved between runs",
            "warning:".yellow().bold()
        );
    }
    let storage = open_storage(config.backend, &config.data_dir)?;
    let mut list = TaskList::open(storage, config.storage_key.clone(), &config.persist)?;

    if list.last_load().recovered_corrupt {
        eprintln!(
            "{} stored task list was unreadable; it was saved as {}.corrupt and the list starts empty",
            "warning:".yellow().bold(),
            list.storage_key()
        );
    }

    match cli.command {
        Commands::Add { text } => {
            list.set_draft(text.join(" "));
            match list.submit_draft() {
                Some(id) => println!("Added task {}", id),
                None if list.draft().trim().is_empty() => println!("Nothing to add: task text is empty"),
                None => println!("Not added: no task ids left"),
            }
        }
        Commands::Toggle { id } => {
            if list.toggle(id) {
                let state = match list.get(id) {
                    Some(task) if task.completed => "completed",
                    _ => "pending",
                };
                println!("Task {} is now {}", id, state);
            } else {
                println!("No task with id {}", id);
            }
        }
        Commands::Rm { id } => {
            if list.remove(id) {
                println!("Deleted task {}", id);
            } else {
                println!("No task with id {}", id);
            }
        }
        Commands::List { filter } => {
            list.set_filter(filter);
            print_list(&list);
        }
        Commands::ClearCompleted { yes } => {
            let removed = if yes {
                list.clear_completed_with(&mut Confirmation::Confirmed)?
            } else {
                list.clear_completed_with(&mut TerminalPrompt)?
            };
            match removed {
                0 => println!("No completed tasks removed"),
                1 => println!("Removed 1 completed task"),
                n => println!("Removed {} completed tasks", n),
            }
        }
        Commands::Stats => {
            println!("Total:     {}", list.len());
            println!("Pending:   {}", list.pending_count());
            println!("Completed: {}", list.completed_count());
        }
    }

    let status = list.flush();
    if let Some(error) = status.last_error {
        return Err(eyre!("Failed to save task list: {}", error));
    }

    Ok(())
}

/// Config file values with command line overrides applied
fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = match cli.config.clone().or_else(default_config_path) {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(key) = &cli.key {
        config.storage_key = key.clone();
    }

    config.validate()?;
    Ok(config)
}

fn print_list(list: &TaskList) {
    let visible = list.visible_tasks();

    if visible.is_empty() {
        match list.filter() {
            TaskFilter::All => println!("No tasks yet"),
            TaskFilter::Pending => println!("No pending tasks"),
            TaskFilter::Completed => println!("No completed tasks"),
        }
    }

    for task in visible {
        println!("{}", format_task(task));
    }

    println!(
        "\n{} pending, {} completed ({})",
        list.pending_count(),
        list.completed_count(),
        list.filter()
    );
}

fn format_task(task: &Task) -> String {
    let created = DateTime::from_timestamp_millis(task.id)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();

    if task.completed {
        format!(
            "{:>14}  {} {}  {}",
            task.id,
            "[x]".green(),
            task.text.strikethrough().dimmed(),
            created.dimmed()
        )
    } else {
        format!("{:>14}  [ ] {}  {}", task.id, task.text, created.dimmed())
    }
}

/// Asks on stdin; anything but an explicit yes cancels
struct TerminalPrompt;

impl Confirm for TerminalPrompt {
    fn confirm(&mut self, request: &ClearCompletedRequest) -> Result<Confirmation> {
        println!("{}", request.title().bold());
        print!(
            "{} [{}/{}] ",
            request.message(),
            request.confirm_label().to_lowercase(),
            request.cancel_label().to_lowercase()
        );
        io::stdout().flush()?;

        let mut answer = String::new();
        io::stdin().read_line(&mut answer)?;
        let answer = answer.trim().to_lowercase();

        if answer == "y" || answer == "yes" || answer == request.confirm_label().to_lowercase() {
            Ok(Confirmation::Confirmed)
        } else {
            Ok(Confirmation::Cancelled)
        }
    }
}
