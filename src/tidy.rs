use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("not found")]
    NotFound,
    #[error("the task store has been closed")]
    Closed,
    #[error("couldn't parse task: {0}")]
    Parse(String),
    #[error("invalid date in database: {0}")]
    InvalidDate(String),
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("unknown route: {0}")]
    Route(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A single to-do item. An `id` of 0 marks a task that was never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub is_completed: bool,
    pub due_date: Option<DateTime<Utc>>,
    pub category_id: Option<i64>,
    pub creation_date: Option<DateTime<Utc>>,
    pub completed_date: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(title: &str) -> Self {
        Task {
            id: 0,
            title: title.to_string(),
            description: None,
            is_completed: false,
            due_date: None,
            category_id: None,
            creation_date: Some(Utc::now()),
            completed_date: None,
        }
    }

    pub fn with_due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn with_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Flips the completion flag, keeping `completed_date` in step with it.
    pub fn set_completed(&mut self, completed: bool) {
        self.is_completed = completed;
        self.completed_date = completed.then(Utc::now);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    /// ARGB packed into an `i32`.
    pub color: i32,
}

impl Category {
    pub fn new(name: &str, color: i32) -> Self {
        Category {
            id: 0,
            name: name.to_string(),
            color,
        }
    }
}

/// A task joined with its category, `None` when the task is uncategorized.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskWithCategory {
    pub task: Task,
    pub category: Option<Category>,
}

/// Parses `#RRGGBB` or `#AARRGGBB`. Six digit colors are fully opaque.
pub fn parse_color(input: &str) -> Option<i32> {
    let hex = input.strip_prefix('#').unwrap_or(input);
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let value = u32::from_str_radix(hex, 16).ok()?;
    match hex.len() {
        6 => Some((0xFF00_0000 | value) as i32),
        8 => Some(value as i32),
        _ => None,
    }
}

pub fn format_color(color: i32) -> String {
    format!("#{:08X}", color as u32)
}
