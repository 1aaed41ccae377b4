use std::path::PathBuf;

use chrono::{Days, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{bail, eyre};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::Configuration;
use crate::content_parser::{TaskDraft, parse_task, start_of_day};
use crate::database::TaskStore;
use crate::navigation::{Destination, InstalledFeatures, Navigator, task_deep_link};
use crate::tidy::{Category, TaskWithCategory, format_color, parse_color};

mod config;
mod content_parser;
mod database;
mod home;
mod list_ui;
mod live;
mod navigation;
mod tidy;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cmd {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Adds a task, e.g. `tidy add "[2025-03-31] Pay rent #home"`.
    Add(AddArgs),
    /// Changes the given fields of a task, keeping the rest.
    Edit {
        id: i64,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(short, long, value_name = "DATE", conflicts_with = "no_due")]
        due: Option<NaiveDate>,
        #[arg(long)]
        no_due: bool,
        #[arg(short, long, value_name = "ID", conflicts_with = "no_category")]
        category: Option<i64>,
        #[arg(long)]
        no_category: bool,
    },
    List {
        #[arg(short, long, value_name = "ID")]
        category: Option<i64>,
    },
    Done {
        id: i64,
    },
    Undo {
        id: i64,
    },
    Delete {
        id: i64,
    },
    Search {
        query: String,
    },
    /// Tasks with a due date, soonest first.
    Due,
    /// Removes every task.
    Clean {
        #[arg(long)]
        yes: bool,
    },
    /// Opens a route (`TaskDetail/3`) or deep link (`tidy://task/3`).
    Show {
        route: String,
    },
    #[command(subcommand)]
    Category(CategoryCommands),
    /// Starts the interactive terminal UI.
    Ui,
}

#[derive(Args)]
struct AddArgs {
    text: Option<String>,
    #[arg(short, long)]
    title: Option<String>,
    #[arg(short, long, value_name = "DATE")]
    due: Option<NaiveDate>,
    #[arg(short, long, value_name = "NAME")]
    category: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// Use the configured default due date when none is given.
    #[arg(long)]
    default_due: bool,
}

#[derive(Subcommand)]
enum CategoryCommands {
    Add {
        name: String,
        #[arg(short, long, default_value = "#9E9E9E")]
        color: String,
    },
    List,
    Edit {
        id: i64,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        color: Option<String>,
    },
    Delete {
        id: i64,
    },
}

fn log_path() -> PathBuf {
    std::env::temp_dir().join("tidy.log")
}

/// Logs to stderr, or to a file while the UI owns the terminal. The
/// returned guard must be held until exit so buffered lines get flushed.
fn init_logging(cfg: &Configuration, to_file: bool) -> color_eyre::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.tidy.log_filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if !to_file {
        builder.with_writer(std::io::stderr).init();
        return Ok(None);
    }

    let path = log_path();
    let (Some(log_dir), Some(file_name)) = (path.parent(), path.file_name()) else {
        bail!("invalid log path {}", path.display());
    };
    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    builder.with_writer(non_blocking).with_ansi(false).init();
    Ok(Some(guard))
}

fn print_task(entry: &TaskWithCategory) {
    let task = &entry.task;
    let mark = if task.is_completed { "x" } else { " " };
    let mut line = format!("{:>4} [{mark}] {}", task.id, task.title);
    if let Some(category) = &entry.category {
        line.push_str(&format!("  #{}", category.name));
    }
    if let Some(due) = task.due_date {
        line.push_str(&format!("  due {}", due.format("%Y-%m-%d")));
    }
    println!("{line}");
}

/// Merges quick-add text with the explicit flags, which take precedence.
fn draft_from(args: AddArgs, cfg: &Configuration) -> color_eyre::Result<TaskDraft> {
    let AddArgs {
        text,
        title,
        due,
        category,
        description,
        default_due,
    } = args;
    let mut draft = match (text, title) {
        (Some(text), _) => parse_task(&text)?,
        (None, Some(title)) => TaskDraft {
            title,
            description: None,
            due_date: None,
            category: None,
        },
        (None, None) => bail!("nothing to add: give quick-add text or --title"),
    };
    if due.is_some() {
        draft.due_date = due;
    }
    if category.is_some() {
        draft.category = category;
    }
    draft.description = description;
    if draft.due_date.is_none() && default_due {
        let deadline = Utc::now()
            .date_naive()
            .checked_add_days(Days::new(cfg.tidy.default_due_days))
            .ok_or_else(|| eyre!("default_due_days is out of range"))?;
        draft.due_date = Some(deadline);
    }
    Ok(draft)
}

async fn add(store: &TaskStore, cfg: &Configuration, args: AddArgs) -> color_eyre::Result<()> {
    let id = draft_from(args, cfg)?.save(store).await?;
    println!("Added task {id} ({})", task_deep_link(id));
    Ok(())
}

async fn show(store: &TaskStore, cfg: &Configuration, route: &str) -> color_eyre::Result<()> {
    let mut navigator = Navigator::default();
    match route.parse::<Destination>()? {
        Destination::Home => {
            for entry in store.get_all_tasks_with_category().next().await? {
                print_task(&entry);
            }
        }
        Destination::TaskDetail(id) => {
            let task = store.find_task_by_id(id).await?;
            let category = match task.category_id {
                Some(category_id) => Some(store.find_category_by_id(category_id).await?.name),
                None => None,
            };
            println!("{}", task.title);
            println!("  done:     {}", if task.is_completed { "yes" } else { "no" });
            if let Some(due) = task.due_date {
                println!("  due:      {}", due.format("%Y-%m-%d %H:%M"));
            }
            if let Some(name) = category {
                println!("  category: {name}");
            }
            if let Some(description) = &task.description {
                println!();
                println!("{description}");
            }
        }
        Destination::About => {
            println!("tidy {}", env!("CARGO_PKG_VERSION"));
        }
        Destination::Tracker => {
            let features = InstalledFeatures::new(cfg.tidy.features.clone());
            match navigator.open_tracker(&features) {
                Ok(link) => println!("Launching {link}"),
                Err(e) => eprintln!("{e}"),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cmds = Cmd::parse();
    let cfg = Configuration::new()?;
    let _log_guard = init_logging(&cfg, matches!(cmds.commands, Commands::Ui))?;

    let db_path = cfg.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = TaskStore::open(&db_path).await?;

    match cmds.commands {
        Commands::Add(args) => add(&store, &cfg, args).await?,
        Commands::Edit {
            id,
            title,
            description,
            due,
            no_due,
            category,
            no_category,
        } => {
            let mut task = store.find_task_by_id(id).await?;
            if let Some(title) = title {
                task.title = title;
            }
            if description.is_some() {
                task.description = description;
            }
            if no_due {
                task.due_date = None;
            } else if let Some(date) = due {
                task.due_date = Some(start_of_day(date));
            }
            if no_category {
                task.category_id = None;
            } else if category.is_some() {
                task.category_id = category;
            }
            store.update_task(&task).await?;
            println!("Updated {}", task.title);
        }
        Commands::List { category } => {
            let mut live = match category {
                Some(id) => store.get_all_tasks_with_category_id(id),
                None => store.get_all_tasks_with_category(),
            };
            for entry in live.next().await? {
                print_task(&entry);
            }
        }
        Commands::Done { id } => {
            let task = store.complete_task(id, true).await?;
            println!("Completed {}", task.title);
        }
        Commands::Undo { id } => {
            let task = store.complete_task(id, false).await?;
            println!("Reopened {}", task.title);
        }
        Commands::Delete { id } => {
            let task = store.find_task_by_id(id).await?;
            store.delete_task(&task).await?;
            println!("Deleted {}", task.title);
        }
        Commands::Search { query } => {
            for entry in store.search_tasks(&query).next().await? {
                print_task(&entry);
            }
        }
        Commands::Due => {
            for task in store.get_all_tasks_with_due_date().await? {
                if let Some(due) = task.due_date {
                    println!("{:>4} {}  {}", task.id, due.format("%Y-%m-%d"), task.title);
                }
            }
        }
        Commands::Clean { yes } => {
            if !yes {
                bail!("refusing to delete every task without --yes");
            }
            let removed = store.clean_table().await?;
            println!("Removed {removed} tasks");
        }
        Commands::Show { route } => show(&store, &cfg, &route).await?,
        Commands::Category(CategoryCommands::Add { name, color }) => {
            let color = parse_color(&color).ok_or_else(|| eyre!("invalid color {color}"))?;
            let id = store.insert_category(&Category::new(&name, color)).await?;
            println!("Added category {id}");
        }
        Commands::Category(CategoryCommands::List) => {
            for category in store.get_all_categories().next().await? {
                println!(
                    "{:>4} {} {}",
                    category.id,
                    format_color(category.color),
                    category.name
                );
            }
        }
        Commands::Category(CategoryCommands::Edit { id, name, color }) => {
            let mut category = store.find_category_by_id(id).await?;
            if let Some(name) = name {
                category.name = name;
            }
            if let Some(color) = color {
                category.color =
                    parse_color(&color).ok_or_else(|| eyre!("invalid color {color}"))?;
            }
            store.update_category(&category).await?;
            println!("Updated category {}", category.name);
        }
        Commands::Category(CategoryCommands::Delete { id }) => {
            let category = store.find_category_by_id(id).await?;
            store.delete_category(&category).await?;
            println!("Deleted category {}", category.name);
        }
        Commands::Ui => {
            let settings = list_ui::Settings {
                database: db_path.display().to_string(),
                default_due_days: cfg.tidy.default_due_days,
                features: cfg.tidy.features.clone(),
            };
            list_ui::run(store, settings).await?;
        }
    }
    Ok(())
}
