/*!
    Provides functionality to manage tidy tasks and categories
    in the database.
!*/
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use crate::live::{ChangeNotifier, LiveQuery, Query, TableChange};
use crate::tidy::{Category, Error, Result, Task, TaskWithCategory};

const TASK_WITH_CATEGORY: &str = r#"
    select task.*,
           category.id as category_ref,
           category.name as category_name,
           category.color as category_color
    from task left join category on task.category_id = category.id
    "#;

/// Handle on the task database. Clones share the pool and the observers.
#[derive(Debug, Clone)]
pub struct TaskStore {
    pool: SqlitePool,
    notifier: ChangeNotifier,
}

impl TaskStore {
    /// Opens (creating if missing) the database at `path` and brings its
    /// schema up to date.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(options).await?;
        info!(path = %path.display(), "opened task database");
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!().run(&pool).await?;
        Ok(TaskStore {
            pool,
            notifier: ChangeNotifier::new(),
        })
    }

    fn live<Q: Query>(&self, query: Q) -> LiveQuery<Q> {
        LiveQuery::new(self.pool.clone(), query, self.notifier.subscribe())
    }

    /// All tasks in storage order, refreshed on every task write.
    pub fn get_all_tasks(&self) -> LiveQuery<AllTasks> {
        self.live(AllTasks)
    }

    /// Inserts `task`, replacing the full row if its id is already taken.
    /// An id of 0 gets a fresh id. Returns the id of the stored row.
    pub async fn insert_task(&self, task: &Task) -> Result<i64> {
        let insert_stmt = r#"
            insert into task(id, title, description, is_completed, due_date,
                             category_id, creation_date, completed_date)
            values($1, $2, $3, $4, $5, $6, $7, $8)
            on conflict(id) do update set
                title = excluded.title,
                description = excluded.description,
                is_completed = excluded.is_completed,
                due_date = excluded.due_date,
                category_id = excluded.category_id,
                creation_date = excluded.creation_date,
                completed_date = excluded.completed_date
            returning id
        "#;
        let id: i64 = sqlx::query_scalar(insert_stmt)
            .bind((task.id != 0).then_some(task.id))
            .bind(&task.title)
            .bind(&task.description)
            .bind(task.is_completed)
            .bind(task.due_date.map(to_text))
            .bind(task.category_id)
            .bind(task.creation_date.map(to_text))
            .bind(task.completed_date.map(to_text))
            .fetch_one(&self.pool)
            .await?;
        debug!(id, title = %task.title, "inserted task");
        self.notifier.notify(TableChange::Task);
        Ok(id)
    }

    /// Replaces the row with the task's id. Returns `false` if there was none.
    pub async fn update_task(&self, task: &Task) -> Result<bool> {
        let update_stmt = r#"
            update task set
                title = $2,
                description = $3,
                is_completed = $4,
                due_date = $5,
                category_id = $6,
                creation_date = $7,
                completed_date = $8
            where id = $1
        "#;
        let res = sqlx::query(update_stmt)
            .bind(task.id)
            .bind(&task.title)
            .bind(&task.description)
            .bind(task.is_completed)
            .bind(task.due_date.map(to_text))
            .bind(task.category_id)
            .bind(task.creation_date.map(to_text))
            .bind(task.completed_date.map(to_text))
            .execute(&self.pool)
            .await?;
        let updated = res.rows_affected() > 0;
        if updated {
            debug!(id = task.id, "updated task");
            self.notifier.notify(TableChange::Task);
        }
        Ok(updated)
    }

    /// Removes the row with the task's id. Returns `false` if there was none.
    pub async fn delete_task(&self, task: &Task) -> Result<bool> {
        let res = sqlx::query("delete from task where id = $1")
            .bind(task.id)
            .execute(&self.pool)
            .await?;
        let deleted = res.rows_affected() > 0;
        if deleted {
            debug!(id = task.id, "deleted task");
            self.notifier.notify(TableChange::Task);
        }
        Ok(deleted)
    }

    /// Removes every task. Returns the number of rows removed.
    pub async fn clean_table(&self) -> Result<u64> {
        let res = sqlx::query("delete from task").execute(&self.pool).await?;
        info!(removed = res.rows_affected(), "cleaned task table");
        self.notifier.notify(TableChange::Task);
        Ok(res.rows_affected())
    }

    pub async fn find_task_by_id(&self, id: i64) -> Result<Task> {
        let row: Option<TaskRow> = sqlx::query_as("select * from task where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or(Error::NotFound)?.try_into()
    }

    /// Titles are not unique; with duplicates the oldest task wins.
    pub async fn find_task_by_title(&self, title: &str) -> Result<Task> {
        let row: Option<TaskRow> =
            sqlx::query_as("select * from task where title = $1 order by id limit 1")
                .bind(title)
                .fetch_optional(&self.pool)
                .await?;
        row.ok_or(Error::NotFound)?.try_into()
    }

    /// Every task with its category, incomplete ones first.
    pub fn get_all_tasks_with_category(&self) -> LiveQuery<TasksWithCategory> {
        self.live(TasksWithCategory::All)
    }

    pub fn get_all_tasks_with_category_id(&self, category_id: i64) -> LiveQuery<TasksWithCategory> {
        self.live(TasksWithCategory::InCategory(category_id))
    }

    /// Tasks whose title contains `query`, ignoring case.
    pub fn search_tasks(&self, query: &str) -> LiveQuery<TasksWithCategory> {
        self.live(TasksWithCategory::TitleContains(query.to_string()))
    }

    /// One-shot list of tasks that have a due date, soonest first.
    pub async fn get_all_tasks_with_due_date(&self) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> =
            sqlx::query_as("select * from task where due_date is not null order by due_date, id")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    pub async fn complete_task(&self, id: i64, completed: bool) -> Result<Task> {
        let mut task = self.find_task_by_id(id).await?;
        task.set_completed(completed);
        if !self.update_task(&task).await? {
            return Err(Error::NotFound);
        }
        Ok(task)
    }

    /// Inserts `category`, replacing name and color if its id is taken.
    pub async fn insert_category(&self, category: &Category) -> Result<i64> {
        let insert_stmt = r#"
            insert into category(id, name, color) values($1, $2, $3)
            on conflict(id) do update set name = excluded.name, color = excluded.color
            returning id
        "#;
        let id: i64 = sqlx::query_scalar(insert_stmt)
            .bind((category.id != 0).then_some(category.id))
            .bind(&category.name)
            .bind(category.color)
            .fetch_one(&self.pool)
            .await?;
        debug!(id, name = %category.name, "inserted category");
        self.notifier.notify(TableChange::Category);
        Ok(id)
    }

    pub async fn update_category(&self, category: &Category) -> Result<bool> {
        let res = sqlx::query("update category set name = $2, color = $3 where id = $1")
            .bind(category.id)
            .bind(&category.name)
            .bind(category.color)
            .execute(&self.pool)
            .await?;
        let updated = res.rows_affected() > 0;
        if updated {
            debug!(id = category.id, "updated category");
            self.notifier.notify(TableChange::Category);
        }
        Ok(updated)
    }

    /// Removes the category; its tasks become uncategorized.
    pub async fn delete_category(&self, category: &Category) -> Result<bool> {
        let res = sqlx::query("delete from category where id = $1")
            .bind(category.id)
            .execute(&self.pool)
            .await?;
        let deleted = res.rows_affected() > 0;
        if deleted {
            debug!(id = category.id, "deleted category");
            self.notifier.notify(TableChange::Category);
            self.notifier.notify(TableChange::Task);
        }
        Ok(deleted)
    }

    pub async fn find_category_by_id(&self, id: i64) -> Result<Category> {
        let row: Option<CategoryRow> = sqlx::query_as("select * from category where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.ok_or(Error::NotFound)?.into())
    }

    pub async fn find_category_by_name(&self, name: &str) -> Result<Category> {
        let row: Option<CategoryRow> = sqlx::query_as(
            "select * from category where lower(name) = lower($1) order by id limit 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.ok_or(Error::NotFound)?.into())
    }

    /// All categories ordered by name.
    pub fn get_all_categories(&self) -> LiveQuery<AllCategories> {
        self.live(AllCategories)
    }
}

pub struct AllTasks;

impl Query for AllTasks {
    type Item = Task;

    async fn fetch(&self, pool: &SqlitePool) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as("select * from task order by id")
            .fetch_all(pool)
            .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    fn watches(&self, table: TableChange) -> bool {
        table == TableChange::Task
    }
}

pub enum TasksWithCategory {
    All,
    InCategory(i64),
    TitleContains(String),
}

impl Query for TasksWithCategory {
    type Item = TaskWithCategory;

    async fn fetch(&self, pool: &SqlitePool) -> Result<Vec<TaskWithCategory>> {
        let order = "order by task.is_completed, task.id";
        let rows: Vec<TaskWithCategoryRow> = match self {
            TasksWithCategory::All => {
                sqlx::query_as(&format!("{TASK_WITH_CATEGORY} {order}"))
                    .fetch_all(pool)
                    .await?
            }
            TasksWithCategory::InCategory(category_id) => {
                sqlx::query_as(&format!(
                    "{TASK_WITH_CATEGORY} where task.category_id = $1 {order}"
                ))
                .bind(*category_id)
                .fetch_all(pool)
                .await?
            }
            TasksWithCategory::TitleContains(needle) => {
                sqlx::query_as(&format!(
                    "{TASK_WITH_CATEGORY} where instr(lower(task.title), lower($1)) > 0 {order}"
                ))
                .bind(needle.as_str())
                .fetch_all(pool)
                .await?
            }
        };
        rows.into_iter().map(TaskWithCategory::try_from).collect()
    }

    fn watches(&self, _table: TableChange) -> bool {
        true
    }
}

pub struct AllCategories;

impl Query for AllCategories {
    type Item = Category;

    async fn fetch(&self, pool: &SqlitePool) -> Result<Vec<Category>> {
        let rows: Vec<CategoryRow> = sqlx::query_as("select * from category order by name, id")
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    fn watches(&self, table: TableChange) -> bool {
        table == TableChange::Category
    }
}

#[derive(Debug, FromRow)]
struct TaskRow {
    id: i64,
    title: String,
    description: Option<String>,
    is_completed: bool,
    due_date: Option<String>,
    category_id: Option<i64>,
    creation_date: Option<String>,
    completed_date: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = Error;

    fn try_from(row: TaskRow) -> Result<Self> {
        Ok(Task {
            id: row.id,
            title: row.title,
            description: row.description,
            is_completed: row.is_completed,
            due_date: from_text(row.due_date)?,
            category_id: row.category_id,
            creation_date: from_text(row.creation_date)?,
            completed_date: from_text(row.completed_date)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct CategoryRow {
    id: i64,
    name: String,
    color: i32,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category {
            id: row.id,
            name: row.name,
            color: row.color,
        }
    }
}

#[derive(Debug, FromRow)]
struct TaskWithCategoryRow {
    #[sqlx(flatten)]
    task: TaskRow,
    category_ref: Option<i64>,
    category_name: Option<String>,
    category_color: Option<i32>,
}

impl TryFrom<TaskWithCategoryRow> for TaskWithCategory {
    type Error = Error;

    fn try_from(row: TaskWithCategoryRow) -> Result<Self> {
        let category = match (row.category_ref, row.category_name, row.category_color) {
            (Some(id), Some(name), Some(color)) => Some(Category { id, name, color }),
            _ => None,
        };
        Ok(TaskWithCategory {
            task: row.task.try_into()?,
            category,
        })
    }
}

// Fixed-width text keeps `order by due_date` chronological.
fn to_text(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn from_text(text: Option<String>) -> Result<Option<DateTime<Utc>>> {
    text.map(|t| {
        DateTime::parse_from_rfc3339(&t)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|_| Error::InvalidDate(t))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;

    async fn test_store() -> (TempDir, TaskStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::open(&dir.path().join("tidy-test.db"))
            .await
            .expect("Couldn't open test database.");
        (dir, store)
    }

    fn due(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 9, 0, 0).unwrap()
    }

    fn titles(list: &[TaskWithCategory]) -> Vec<&str> {
        list.iter().map(|t| t.task.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_insert_task_assigns_ids() {
        let (_dir, store) = test_store().await;
        let first = store.insert_task(&Task::new("First")).await.unwrap();
        let second = store.insert_task(&Task::new("Second")).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[tokio::test]
    async fn test_stored_task_reads_back_unchanged() {
        let (_dir, store) = test_store().await;
        let mut task = Task::new("Dentist")
            .with_due_date(due(12))
            .with_description("Bring the insurance card");
        task.id = store.insert_task(&task).await.unwrap();

        assert_eq!(store.find_task_by_id(task.id).await.unwrap(), task);
    }

    #[tokio::test]
    async fn test_insert_same_id_replaces_row() {
        let (_dir, store) = test_store().await;
        let mut task = Task::new("Draft").with_description("old");
        task.id = store.insert_task(&task).await.unwrap();

        let replacement = Task {
            title: "Final".to_string(),
            description: None,
            ..task.clone()
        };
        assert_eq!(store.insert_task(&replacement).await.unwrap(), task.id);

        let all = store.get_all_tasks().next().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Final");
        assert_eq!(all[0].description, None);
    }

    #[tokio::test]
    async fn test_update_missing_task_is_noop() {
        let (_dir, store) = test_store().await;
        let mut ghost = Task::new("Ghost");
        ghost.id = 42;
        assert!(!store.update_task(&ghost).await.unwrap());
        assert!(store.get_all_tasks().next().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_task() {
        let (_dir, store) = test_store().await;
        let mut task = Task::new("Read");
        task.id = store.insert_task(&task).await.unwrap();
        task.title = "Read a book".to_string();
        assert!(store.update_task(&task).await.unwrap());
        assert_eq!(
            store.find_task_by_id(task.id).await.unwrap().title,
            "Read a book"
        );
    }

    #[tokio::test]
    async fn test_delete_then_read() {
        let (_dir, store) = test_store().await;
        let mut live = store.get_all_tasks();
        let mut task = Task::new("Temporary");
        task.id = store.insert_task(&task).await.unwrap();
        store.insert_task(&Task::new("Keeper")).await.unwrap();

        assert!(store.delete_task(&task).await.unwrap());
        assert!(!store.delete_task(&task).await.unwrap());

        let all = live.next().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Keeper");
    }

    #[tokio::test]
    async fn test_live_tasks_follow_writes() {
        let (_dir, store) = test_store().await;
        let mut live = store.get_all_tasks();
        assert!(live.next().await.unwrap().is_empty());

        store.insert_task(&Task::new("Laundry")).await.unwrap();
        let all = live.next().await.unwrap();
        assert_eq!(all.len(), 1);

        store.insert_category(&Category::new("Home", 0)).await.unwrap();
        let waited = tokio::time::timeout(Duration::from_millis(50), live.next()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_join_keeps_uncategorized_tasks() {
        let (_dir, store) = test_store().await;
        let work = store.insert_category(&Category::new("Work", 1)).await.unwrap();
        store
            .insert_task(&Task::new("Report").with_category(work))
            .await
            .unwrap();
        store.insert_task(&Task::new("Nap")).await.unwrap();

        let list = store.get_all_tasks_with_category().next().await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].category.as_ref().unwrap().name, "Work");
        assert_eq!(list[1].task.title, "Nap");
        assert_eq!(list[1].category, None);
    }

    #[tokio::test]
    async fn test_incomplete_tasks_come_first() {
        let (_dir, store) = test_store().await;
        let mut a = Task::new("A");
        a.set_completed(true);
        store.insert_task(&a).await.unwrap();
        store.insert_task(&Task::new("B")).await.unwrap();
        store.insert_task(&Task::new("C")).await.unwrap();

        let list = store.get_all_tasks_with_category().next().await.unwrap();
        assert_eq!(titles(&list), vec!["B", "C", "A"]);
    }

    #[tokio::test]
    async fn test_due_date_filter() {
        let (_dir, store) = test_store().await;
        store
            .insert_task(&Task::new("Later").with_due_date(due(20)))
            .await
            .unwrap();
        store.insert_task(&Task::new("Whenever")).await.unwrap();
        store
            .insert_task(&Task::new("Soon").with_due_date(due(2)))
            .await
            .unwrap();

        let dated = store.get_all_tasks_with_due_date().await.unwrap();
        let names: Vec<_> = dated.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(names, vec!["Soon", "Later"]);
    }

    #[tokio::test]
    async fn test_clean_table() {
        let (_dir, store) = test_store().await;
        store.insert_task(&Task::new("One")).await.unwrap();
        store.insert_task(&Task::new("Two")).await.unwrap();

        assert_eq!(store.clean_table().await.unwrap(), 2);
        assert!(store.get_all_tasks().next().await.unwrap().is_empty());
        for title in ["One", "Two"] {
            assert!(matches!(
                store.find_task_by_title(title).await,
                Err(Error::NotFound)
            ));
        }
    }

    #[tokio::test]
    async fn test_find_by_title_prefers_oldest() {
        let (_dir, store) = test_store().await;
        let first = store
            .insert_task(&Task::new("Twin").with_description("first"))
            .await
            .unwrap();
        store
            .insert_task(&Task::new("Twin").with_description("second"))
            .await
            .unwrap();

        let found = store.find_task_by_title("Twin").await.unwrap();
        assert_eq!(found.id, first);
        assert!(matches!(
            store.find_task_by_title("twin").await,
            Err(Error::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_category_scoped_query_follows_moves() {
        let (_dir, store) = test_store().await;
        let x = store.insert_category(&Category::new("X", 1)).await.unwrap();
        let y = store.insert_category(&Category::new("Y", 2)).await.unwrap();
        let mut task = Task::new("Mover").with_category(x);
        task.id = store.insert_task(&task).await.unwrap();
        store
            .insert_task(&Task::new("Stayer").with_category(y))
            .await
            .unwrap();

        let mut in_x = store.get_all_tasks_with_category_id(x);
        let mut in_y = store.get_all_tasks_with_category_id(y);
        assert_eq!(titles(&in_x.next().await.unwrap()), vec!["Mover"]);
        assert_eq!(titles(&in_y.next().await.unwrap()), vec!["Stayer"]);

        task.category_id = Some(y);
        store.update_task(&task).await.unwrap();

        assert!(in_x.next().await.unwrap().is_empty());
        assert_eq!(titles(&in_y.next().await.unwrap()), vec!["Mover", "Stayer"]);
    }

    #[tokio::test]
    async fn test_deleting_category_uncategorizes_tasks() {
        let (_dir, store) = test_store().await;
        let mut errands = Category::new("Errands", 3);
        errands.id = store.insert_category(&errands).await.unwrap();
        let id = store
            .insert_task(&Task::new("Groceries").with_category(errands.id))
            .await
            .unwrap();

        let mut live = store.get_all_tasks_with_category();
        assert!(live.next().await.unwrap()[0].category.is_some());

        assert!(store.delete_category(&errands).await.unwrap());
        let list = live.next().await.unwrap();
        assert_eq!(list[0].category, None);
        assert_eq!(store.find_task_by_id(id).await.unwrap().category_id, None);
    }

    #[tokio::test]
    async fn test_unknown_category_is_storage_error() {
        let (_dir, store) = test_store().await;
        let res = store.insert_task(&Task::new("Orphan").with_category(99)).await;
        assert!(matches!(res, Err(Error::Storage(_))));
    }

    #[tokio::test]
    async fn test_search_ignores_case() {
        let (_dir, store) = test_store().await;
        store.insert_task(&Task::new("Buy Milk")).await.unwrap();
        store.insert_task(&Task::new("Call mom")).await.unwrap();

        let mut search = store.search_tasks("MILK");
        assert_eq!(titles(&search.next().await.unwrap()), vec!["Buy Milk"]);

        store.insert_task(&Task::new("milkshake")).await.unwrap();
        assert_eq!(
            titles(&search.next().await.unwrap()),
            vec!["Buy Milk", "milkshake"]
        );
    }

    #[tokio::test]
    async fn test_complete_task() {
        let (_dir, store) = test_store().await;
        let id = store.insert_task(&Task::new("Ship it")).await.unwrap();

        let done = store.complete_task(id, true).await.unwrap();
        assert!(done.is_completed);
        assert!(store.find_task_by_id(id).await.unwrap().completed_date.is_some());

        let reopened = store.complete_task(id, false).await.unwrap();
        assert_eq!(reopened.completed_date, None);

        assert!(matches!(
            store.complete_task(id + 1, true).await,
            Err(Error::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_categories() {
        let (_dir, store) = test_store().await;
        let mut live = store.get_all_categories();
        assert!(live.next().await.unwrap().is_empty());

        let mut work = Category::new("Work", 10);
        work.id = store.insert_category(&work).await.unwrap();
        store.insert_category(&Category::new("Health", 20)).await.unwrap();
        let names: Vec<_> = live.next().await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Health", "Work"]);

        work.color = 11;
        assert!(store.update_category(&work).await.unwrap());
        assert_eq!(store.find_category_by_id(work.id).await.unwrap().color, 11);
        assert_eq!(store.find_category_by_name("work").await.unwrap().id, work.id);
        assert!(matches!(
            store.find_category_by_name("Play").await,
            Err(Error::NotFound)
        ));
    }
}
