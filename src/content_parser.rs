use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use winnow::Parser;
use winnow::Result;
use winnow::combinator::{delimited, preceded};
use winnow::error::ParserError;
use winnow::token::{one_of, take_while};

use crate::database::TaskStore;
use crate::tidy::{self, Category, Error, Task};

/// Color given to categories created from a `#tag`.
pub const DEFAULT_CATEGORY_COLOR: i32 = 0xFF9E9E9E_u32 as i32;

/// A task as typed on the quick-add line: `[2025-03-31] Pay rent #home`.
#[derive(Debug, PartialEq)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub category: Option<String>,
}

impl TaskDraft {
    /// Builds a storable task; the due date falls at midnight UTC.
    pub fn into_task(self, category_id: Option<i64>) -> Task {
        let mut task = Task::new(&self.title);
        if let Some(description) = &self.description {
            task = task.with_description(description);
        }
        if let Some(date) = self.due_date {
            task = task.with_due_date(start_of_day(date));
        }
        if let Some(id) = category_id {
            task = task.with_category(id);
        }
        task
    }

    /// Stores the draft, creating its tagged category when it doesn't exist.
    pub async fn save(self, store: &TaskStore) -> tidy::Result<i64> {
        let category_id = match &self.category {
            Some(name) => Some(match store.find_category_by_name(name).await {
                Ok(category) => category.id,
                Err(Error::NotFound) => {
                    store
                        .insert_category(&Category::new(name, DEFAULT_CATEGORY_COLOR))
                        .await?
                }
                Err(e) => return Err(e),
            }),
            None => None,
        };
        store.insert_task(&self.into_task(category_id)).await
    }
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

pub fn parse_task(input: &str) -> tidy::Result<TaskDraft> {
    let trimmed = input.trim();
    let (due_date, rest) = if trimmed.starts_with('[') {
        let mut stream = trimmed;
        let date = parse_date_tag
            .parse_next(&mut stream)
            .map_err(|_| Error::Parse(format!("malformed date tag in {trimmed:?}")))?;
        (Some(date), stream.trim())
    } else {
        (None, trimmed)
    };

    let (title, category) = match rest.rsplit_once(char::is_whitespace) {
        Some((head, last)) => match parse_category_tag.parse(last) {
            Ok(tag) => (head.trim(), Some(tag.to_string())),
            Err(_) => (rest, None),
        },
        None => (rest, None),
    };

    if title.is_empty() {
        return Err(Error::Parse("task title is empty".to_string()));
    }

    Ok(TaskDraft {
        title: title.to_string(),
        description: None,
        due_date,
        category,
    })
}

fn parse_date_tag(input: &mut &str) -> Result<NaiveDate> {
    delimited('[', parse_date, ']').parse_next(input)
}

fn parse_date(input: &mut &str) -> Result<NaiveDate> {
    let (year, _, month, _, day) = (
        parse_year,
        parse_separator,
        parse_two_digits,
        parse_separator,
        parse_two_digits,
    )
        .parse_next(input)?;
    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(d) => Ok(d),
        None => Err(ParserError::from_input(input)),
    }
}

fn parse_year(input: &mut &str) -> Result<i32> {
    take_while(4, '0'..='9')
        .try_map(str::parse::<i32>)
        .parse_next(input)
}

fn parse_two_digits(input: &mut &str) -> Result<u32> {
    take_while(2, '0'..='9')
        .try_map(str::parse::<u32>)
        .parse_next(input)
}

fn parse_separator(input: &mut &str) -> Result<char> {
    one_of(['-', '/']).parse_next(input)
}

fn parse_category_tag<'s>(input: &mut &'s str) -> Result<&'s str> {
    preceded('#', take_while(1.., |c: char| !c.is_whitespace())).parse_next(input)
}
