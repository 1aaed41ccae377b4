use std::time::Duration;

use color_eyre::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    DefaultTerminal, Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap},
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinHandle, JoinSet};
use tracing::error;

use crate::content_parser::parse_task;
use crate::database::TaskStore;
use crate::home::{Home, HomeAction, HomeSection};
use crate::live::{LiveQuery, Query};
use crate::navigation::{Destination, InstalledFeatures, Navigator};
use crate::tidy::{Category, Task, TaskWithCategory, format_color};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Fresh data for the screen, produced off the UI loop.
#[derive(Debug)]
pub enum Update {
    Tasks(Vec<TaskWithCategory>),
    Results(Vec<TaskWithCategory>),
    Categories(Vec<Category>),
    Failed(String),
}

/// Work the UI loop hands to the store.
#[derive(Debug, PartialEq)]
pub enum Command {
    Toggle(i64, bool),
    Delete(Task),
    Add(String),
    Search(String),
    DeleteCategory(Category),
}

/// What the Settings section shows.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database: String,
    pub default_due_days: u64,
    pub features: Vec<String>,
}

pub struct App {
    home: Home,
    navigator: Navigator,
    features: InstalledFeatures,
    settings: Settings,
    tasks: Vec<TaskWithCategory>,
    results: Vec<TaskWithCategory>,
    categories: Vec<Category>,
    list_state: ListState,
    query: String,
    draft: Option<String>,
    category_sheet: Option<i64>,
    status: Option<String>,
    exit: bool,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        App {
            home: Home::new(),
            navigator: Navigator::default(),
            features: InstalledFeatures::new(settings.features.clone()),
            settings,
            tasks: Vec::new(),
            results: Vec::new(),
            categories: Vec::new(),
            list_state: ListState::default(),
            query: String::new(),
            draft: None,
            category_sheet: None,
            status: None,
            exit: false,
        }
    }

    pub fn apply(&mut self, update: Update) {
        match update {
            Update::Tasks(tasks) => self.tasks = tasks,
            Update::Results(results) => self.results = results,
            Update::Categories(categories) => self.categories = categories,
            Update::Failed(message) => self.status = Some(message),
        }
        self.clamp_selection();
    }

    fn visible_len(&self) -> usize {
        match self.home.section() {
            HomeSection::Tasks => self.tasks.len(),
            HomeSection::Search => self.results.len(),
            HomeSection::Categories => self.categories.len(),
            HomeSection::Settings => 0,
        }
    }

    fn clamp_selection(&mut self) {
        let len = self.visible_len();
        match self.list_state.selected() {
            _ if len == 0 => self.list_state.select(None),
            Some(i) if i >= len => self.list_state.select(Some(len - 1)),
            None => self.list_state.select(Some(0)),
            Some(_) => {}
        }
    }

    fn move_selection(&mut self, forward: bool) {
        let len = self.visible_len();
        if len == 0 {
            return;
        }
        let next = match self.list_state.selected() {
            Some(i) if forward => (i + 1).min(len - 1),
            Some(i) => i.saturating_sub(1),
            None => 0,
        };
        self.list_state.select(Some(next));
    }

    fn selected_task(&self) -> Option<&TaskWithCategory> {
        let list = match self.home.section() {
            HomeSection::Tasks => &self.tasks,
            HomeSection::Search => &self.results,
            _ => return None,
        };
        self.list_state.selected().and_then(|i| list.get(i))
    }

    fn find_task(&self, id: i64) -> Option<&TaskWithCategory> {
        self.tasks.iter().find(|t| t.task.id == id)
    }

    fn act(&mut self, action: HomeAction) {
        let Some(action) = self.home.dispatch(action) else {
            self.list_state.select(None);
            self.clamp_selection();
            return;
        };
        match action {
            HomeAction::OpenTask(id) => self.navigator.navigate(Destination::TaskDetail(id)),
            HomeAction::OpenAbout => self.navigator.navigate(Destination::About),
            HomeAction::OpenTracker => {
                self.status = Some(match self.navigator.open_tracker(&self.features) {
                    Ok(link) => format!("Launching {link}"),
                    Err(e) => e.to_string(),
                });
            }
            HomeAction::OpenTaskSheet => self.draft = Some(String::new()),
            HomeAction::OpenCategorySheet(Some(id)) => self.category_sheet = Some(id),
            HomeAction::OpenCategorySheet(None) => {
                self.status = Some("Create categories with `tidy category add`".to_string())
            }
            HomeAction::Select(_) => {}
        }
    }

    /// Handles one key press, returning the store work it triggers.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Command> {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.exit = true;
            return None;
        }

        if let Some(draft) = self.draft.as_mut() {
            match key.code {
                KeyCode::Enter => {
                    let text = self.draft.take().unwrap_or_default();
                    return (!text.trim().is_empty()).then_some(Command::Add(text));
                }
                KeyCode::Esc => self.draft = None,
                KeyCode::Backspace => {
                    draft.pop();
                }
                KeyCode::Char(c) => draft.push(c),
                _ => {}
            }
            return None;
        }

        if let Some(id) = self.category_sheet {
            match key.code {
                KeyCode::Char('d') => {
                    self.category_sheet = None;
                    let category = self.categories.iter().find(|c| c.id == id)?;
                    return Some(Command::DeleteCategory(category.clone()));
                }
                KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') => self.category_sheet = None,
                _ => {}
            }
            return None;
        }

        match self.navigator.current() {
            Destination::TaskDetail(id) => {
                match key.code {
                    KeyCode::Esc | KeyCode::Char('q') | KeyCode::Backspace => {
                        self.navigator.navigate_up();
                    }
                    KeyCode::Char(' ') => {
                        let task = self.find_task(id)?;
                        return Some(Command::Toggle(id, !task.task.is_completed));
                    }
                    _ => {}
                }
                return None;
            }
            Destination::About | Destination::Tracker => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Char('q')) {
                    self.navigator.navigate_up();
                }
                return None;
            }
            Destination::Home => {}
        }

        match key.code {
            KeyCode::Tab => {
                self.home.next_section();
                self.act(HomeAction::Select(self.home.section()));
                return None;
            }
            KeyCode::BackTab => {
                self.home.previous_section();
                self.act(HomeAction::Select(self.home.section()));
                return None;
            }
            KeyCode::Up => {
                self.move_selection(false);
                return None;
            }
            KeyCode::Down => {
                self.move_selection(true);
                return None;
            }
            KeyCode::Esc => {
                self.exit = true;
                return None;
            }
            _ => {}
        }

        match self.home.section() {
            HomeSection::Tasks => self.handle_tasks_key(key),
            HomeSection::Search => self.handle_search_key(key),
            HomeSection::Categories => {
                match key.code {
                    KeyCode::Enter => {
                        let id = self.list_state.selected().and_then(|i| self.categories.get(i))?.id;
                        self.act(HomeAction::OpenCategorySheet(Some(id)));
                    }
                    KeyCode::Char('n') => self.act(HomeAction::OpenCategorySheet(None)),
                    KeyCode::Char('q') => self.exit = true,
                    KeyCode::Char(c @ '1'..='4') => self.select_by_digit(c),
                    _ => {}
                }
                None
            }
            HomeSection::Settings => {
                match key.code {
                    KeyCode::Char('a') => self.act(HomeAction::OpenAbout),
                    KeyCode::Char('t') => self.act(HomeAction::OpenTracker),
                    KeyCode::Char('q') => self.exit = true,
                    KeyCode::Char(c @ '1'..='4') => self.select_by_digit(c),
                    _ => {}
                }
                None
            }
        }
    }

    fn handle_tasks_key(&mut self, key: KeyEvent) -> Option<Command> {
        match key.code {
            KeyCode::Enter => {
                let id = self.selected_task()?.task.id;
                self.act(HomeAction::OpenTask(id));
                None
            }
            KeyCode::Char(' ') => {
                let task = &self.selected_task()?.task;
                Some(Command::Toggle(task.id, !task.is_completed))
            }
            KeyCode::Char('d') => Some(Command::Delete(self.selected_task()?.task.clone())),
            KeyCode::Char('a') => {
                self.act(HomeAction::OpenTaskSheet);
                None
            }
            KeyCode::Char('q') => {
                self.exit = true;
                None
            }
            KeyCode::Char(c @ '1'..='4') => {
                self.select_by_digit(c);
                None
            }
            _ => None,
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) -> Option<Command> {
        match key.code {
            KeyCode::Enter => {
                let id = self.selected_task()?.task.id;
                self.act(HomeAction::OpenTask(id));
                None
            }
            KeyCode::Backspace => {
                self.query.pop();
                Some(Command::Search(self.query.clone()))
            }
            KeyCode::Char(c) => {
                self.query.push(c);
                Some(Command::Search(self.query.clone()))
            }
            _ => None,
        }
    }

    fn select_by_digit(&mut self, digit: char) {
        let index = digit as usize - '1' as usize;
        if let Some(section) = HomeSection::ALL.get(index) {
            self.act(HomeAction::Select(*section));
        }
    }
}

pub async fn run(store: TaskStore, settings: Settings) -> Result<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let feeds = [
        spawn_feed(store.get_all_tasks_with_category(), tx.clone(), Update::Tasks),
        spawn_feed(store.get_all_categories(), tx.clone(), Update::Categories),
    ];

    let mut terminal = ratatui::init();
    let result = event_loop(&mut terminal, App::new(settings), &store, tx, rx).await;
    ratatui::restore();

    for feed in feeds {
        feed.abort();
    }
    result
}

async fn event_loop(
    terminal: &mut DefaultTerminal,
    mut app: App,
    store: &TaskStore,
    tx: UnboundedSender<Update>,
    mut rx: UnboundedReceiver<Update>,
) -> Result<()> {
    let mut search_feed: Option<JoinHandle<()>> = None;
    let mut writes = JoinSet::new();

    loop {
        while let Ok(update) = rx.try_recv() {
            app.apply(update);
        }
        terminal.draw(|frame| render(frame, &mut app))?;
        if app.exit {
            break;
        }

        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        if let Some(command) = app.handle_key(key) {
            execute(store, command, &tx, &mut search_feed, &mut writes);
        }
    }

    if let Some(feed) = search_feed {
        feed.abort();
    }
    finish_writes(&mut writes).await;
    Ok(())
}

/// Waits for every write the UI has issued to commit or fail.
async fn finish_writes(writes: &mut JoinSet<()>) {
    while let Some(res) = writes.join_next().await {
        if let Err(e) = res {
            error!(error = %e, "write task failed");
        }
    }
}

fn spawn_feed<Q>(
    mut live: LiveQuery<Q>,
    tx: UnboundedSender<Update>,
    wrap: fn(Vec<Q::Item>) -> Update,
) -> JoinHandle<()>
where
    Q: Query + Send + Sync + 'static,
    Q::Item: Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let update = match live.next().await {
                Ok(items) => wrap(items),
                Err(e) => {
                    let _ = tx.send(Update::Failed(e.to_string()));
                    break;
                }
            };
            if tx.send(update).is_err() {
                break;
            }
        }
    })
}

fn execute(
    store: &TaskStore,
    command: Command,
    tx: &UnboundedSender<Update>,
    search_feed: &mut Option<JoinHandle<()>>,
    writes: &mut JoinSet<()>,
) {
    if let Command::Search(query) = command {
        if let Some(feed) = search_feed.take() {
            feed.abort();
        }
        if query.is_empty() {
            let _ = tx.send(Update::Results(Vec::new()));
        } else {
            *search_feed = Some(spawn_feed(store.search_tasks(&query), tx.clone(), Update::Results));
        }
        return;
    }

    let store = store.clone();
    let tx = tx.clone();
    writes.spawn(async move {
        let res = match command {
            Command::Toggle(id, done) => store.complete_task(id, done).await.map(|_| ()),
            Command::Delete(task) => store.delete_task(&task).await.map(|_| ()),
            Command::DeleteCategory(category) => store.delete_category(&category).await.map(|_| ()),
            Command::Add(text) => match parse_task(&text) {
                Ok(draft) => draft.save(&store).await.map(|_| ()),
                Err(e) => Err(e),
            },
            Command::Search(_) => Ok(()),
        };
        if let Err(e) = res {
            error!(error = %e, "write failed");
            let _ = tx.send(Update::Failed(e.to_string()));
        }
    });
}

pub fn render(frame: &mut Frame, app: &mut App) {
    let [tabs_area, body_area, status_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    let tabs = Tabs::new(HomeSection::ALL.iter().map(|s| s.title()))
        .select(app.home.section().index())
        .highlight_style(Style::default().add_modifier(Modifier::BOLD | Modifier::REVERSED))
        .block(Block::bordered().title("tidy"));
    frame.render_widget(tabs, tabs_area);

    match app.home.section() {
        HomeSection::Tasks => {
            let list = task_list(&app.tasks).block(Block::bordered());
            frame.render_stateful_widget(list, body_area, &mut app.list_state);
        }
        HomeSection::Search => {
            let [input_area, results_area] =
                Layout::vertical([Constraint::Length(3), Constraint::Min(1)]).areas(body_area);
            let input = Paragraph::new(app.query.as_str()).block(Block::bordered().title("Search"));
            frame.render_widget(input, input_area);
            let list = task_list(&app.results).block(Block::bordered());
            frame.render_stateful_widget(list, results_area, &mut app.list_state);
        }
        HomeSection::Categories => {
            let items: Vec<ListItem> = app
                .categories
                .iter()
                .map(|c| {
                    let count = app.tasks.iter().filter(|t| t.task.category_id == Some(c.id)).count();
                    ListItem::new(Line::from(vec![
                        Span::styled("■ ", Style::default().fg(to_color(c.color))),
                        Span::raw(format!("{} ({count})", c.name)),
                    ]))
                })
                .collect();
            let list = List::new(items)
                .block(Block::bordered())
                .highlight_symbol("> ")
                .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
            frame.render_stateful_widget(list, body_area, &mut app.list_state);
        }
        HomeSection::Settings => {
            let lines = vec![
                Line::from(format!("Database: {}", app.settings.database)),
                Line::from(format!("Default due in: {} days", app.settings.default_due_days)),
                Line::from(format!("Features: {}", app.settings.features.join(", "))),
                Line::from(""),
                Line::from("a: About    t: Tracker"),
            ];
            frame.render_widget(Paragraph::new(lines).block(Block::bordered()), body_area);
        }
    }

    let hint = match app.home.section() {
        HomeSection::Tasks => "Tab: section  Enter: open  Space: done  a: add  d: delete  q: quit",
        HomeSection::Search => "Type to search  Enter: open  Esc: quit",
        HomeSection::Categories => "Enter: open  n: new  q: quit",
        HomeSection::Settings => "a: about  t: tracker  q: quit",
    };
    let status = app.status.as_deref().unwrap_or(hint);
    frame.render_widget(Paragraph::new(status), status_area);

    match app.navigator.current() {
        Destination::TaskDetail(id) => render_detail(frame, app.find_task(id)),
        Destination::About => render_popup(
            frame,
            "About",
            vec![
                Line::from(format!("tidy {}", env!("CARGO_PKG_VERSION"))),
                Line::from("A small task manager for the terminal."),
            ],
        ),
        _ => {}
    }

    if let Some(draft) = &app.draft {
        render_popup(
            frame,
            "New task: [YYYY-MM-DD] title #category",
            vec![Line::from(draft.as_str())],
        );
    }

    if let Some(id) = app.category_sheet {
        if let Some(category) = app.categories.iter().find(|c| c.id == id) {
            let tasks: Vec<Line> = app
                .tasks
                .iter()
                .filter(|t| t.task.category_id == Some(id))
                .map(|t| Line::from(format!("- {}", t.task.title)))
                .collect();
            let mut lines = vec![
                Line::from(format!("Color: {}", format_color(category.color))),
                Line::from(""),
            ];
            lines.extend(tasks);
            lines.push(Line::from(""));
            lines.push(Line::from("d: delete category"));
            render_popup(frame, &category.name, lines);
        }
    }
}

fn task_list(tasks: &[TaskWithCategory]) -> List<'static> {
    let items: Vec<ListItem> = tasks
        .iter()
        .map(|t| {
            let checkbox = if t.task.is_completed { "[x] " } else { "[ ] " };
            let style = if t.task.is_completed {
                Style::default().add_modifier(Modifier::DIM | Modifier::CROSSED_OUT)
            } else {
                Style::default()
            };
            let mut spans = vec![
                Span::raw(checkbox),
                Span::styled(t.task.title.clone(), style),
            ];
            if let Some(category) = &t.category {
                spans.push(Span::styled(
                    format!("  {}", category.name),
                    Style::default().fg(to_color(category.color)),
                ));
            }
            if let Some(due) = t.task.due_date {
                spans.push(Span::raw(format!("  due {}", due.format("%Y-%m-%d"))));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();
    List::new(items)
        .highlight_symbol("> ")
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
}

fn render_detail(frame: &mut Frame, task: Option<&TaskWithCategory>) {
    let Some(t) = task else {
        render_popup(frame, "Task", vec![Line::from("This task no longer exists.")]);
        return;
    };
    let due = t
        .task
        .due_date
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "none".to_string());
    let category = t.category.as_ref().map(|c| c.name.as_str()).unwrap_or("none");
    let lines = vec![
        Line::from(format!("Done: {}", if t.task.is_completed { "yes" } else { "no" })),
        Line::from(format!("Due: {due}")),
        Line::from(format!("Category: {category}")),
        Line::from(""),
        Line::from(t.task.description.clone().unwrap_or_default()),
        Line::from(""),
        Line::from("Space: toggle done  Esc: back"),
    ];
    render_popup(frame, &t.task.title, lines);
}

fn render_popup(frame: &mut Frame, title: &str, lines: Vec<Line>) {
    let area = popup_area(frame.area(), 60, 50);
    frame.render_widget(Clear, area);
    let popup = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::bordered().title(title.to_string()));
    frame.render_widget(popup, area);
}

fn popup_area(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let [area] = Layout::vertical([Constraint::Percentage(percent_y)])
        .flex(Flex::Center)
        .areas(area);
    let [area] = Layout::horizontal([Constraint::Percentage(percent_x)])
        .flex(Flex::Center)
        .areas(area);
    area
}

fn to_color(argb: i32) -> Color {
    let [_, r, g, b] = (argb as u32).to_be_bytes();
    Color::Rgb(r, g, b)
}

#[cfg(test)]
mod tests {
    use ratatui::{Terminal, backend::TestBackend};

    use super::*;

    fn settings(features: &[&str]) -> Settings {
        Settings {
            database: "tidy.db".to_string(),
            default_due_days: 7,
            features: features.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn entry(id: i64, title: &str, done: bool) -> TaskWithCategory {
        let mut task = Task::new(title);
        task.id = id;
        task.set_completed(done);
        TaskWithCategory {
            task,
            category: None,
        }
    }

    fn press(app: &mut App, code: KeyCode) -> Option<Command> {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn app_with_tasks() -> App {
        let mut app = App::new(settings(&["tracker"]));
        app.apply(Update::Tasks(vec![
            entry(1, "Write report", false),
            entry(2, "Book flights", true),
        ]));
        app
    }

    #[test]
    fn tab_cycles_sections() {
        let mut app = App::new(settings(&[]));
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.home.section(), HomeSection::Search);
        press(&mut app, KeyCode::BackTab);
        press(&mut app, KeyCode::BackTab);
        assert_eq!(app.home.section(), HomeSection::Settings);
    }

    #[test]
    fn space_toggles_selected_task() {
        let mut app = app_with_tasks();
        assert_eq!(press(&mut app, KeyCode::Char(' ')), Some(Command::Toggle(1, true)));
        press(&mut app, KeyCode::Down);
        assert_eq!(press(&mut app, KeyCode::Char(' ')), Some(Command::Toggle(2, false)));
    }

    #[test]
    fn enter_opens_detail_and_escape_returns() {
        let mut app = app_with_tasks();
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.navigator.current(), Destination::TaskDetail(1));

        assert_eq!(press(&mut app, KeyCode::Char(' ')), Some(Command::Toggle(1, true)));
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.navigator.current(), Destination::Home);
        assert!(!app.exit);

        press(&mut app, KeyCode::Char('q'));
        assert!(app.exit);
    }

    #[test]
    fn typing_in_search_issues_queries() {
        let mut app = App::new(settings(&[]));
        press(&mut app, KeyCode::Tab);
        assert_eq!(
            press(&mut app, KeyCode::Char('m')),
            Some(Command::Search("m".to_string()))
        );
        assert_eq!(
            press(&mut app, KeyCode::Char('q')),
            Some(Command::Search("mq".to_string()))
        );
        assert_eq!(
            press(&mut app, KeyCode::Backspace),
            Some(Command::Search("m".to_string()))
        );
        assert!(!app.exit);
    }

    #[test]
    fn task_sheet_submits_text() {
        let mut app = app_with_tasks();
        press(&mut app, KeyCode::Char('a'));
        for c in "Buy milk".chars() {
            assert_eq!(press(&mut app, KeyCode::Char(c)), None);
        }
        assert_eq!(
            press(&mut app, KeyCode::Enter),
            Some(Command::Add("Buy milk".to_string()))
        );
        assert_eq!(app.draft, None);
    }

    #[test]
    fn tracker_reports_availability() {
        let mut app = App::new(settings(&["tracker"]));
        press(&mut app, KeyCode::Char('4'));
        press(&mut app, KeyCode::Char('t'));
        assert_eq!(app.status.as_deref(), Some("Launching tidy://tracker"));
        assert_eq!(app.navigator.current(), Destination::Home);

        let mut app = App::new(settings(&[]));
        press(&mut app, KeyCode::Char('4'));
        press(&mut app, KeyCode::Char('t'));
        assert_eq!(app.status.as_deref(), Some("feature tracker is not available"));
    }

    #[test]
    fn category_sheet_can_delete() {
        let mut app = App::new(settings(&[]));
        let mut home = Category::new("Home", 0xFF00FF00_u32 as i32);
        home.id = 5;
        press(&mut app, KeyCode::Char('3'));
        app.apply(Update::Categories(vec![home.clone()]));

        press(&mut app, KeyCode::Enter);
        assert_eq!(app.category_sheet, Some(5));
        assert_eq!(
            press(&mut app, KeyCode::Char('d')),
            Some(Command::DeleteCategory(home))
        );
        assert_eq!(app.category_sheet, None);
    }

    #[test]
    fn shrinking_list_clamps_selection() {
        let mut app = app_with_tasks();
        press(&mut app, KeyCode::Down);
        assert_eq!(app.list_state.selected(), Some(1));
        app.apply(Update::Tasks(vec![entry(1, "Write report", false)]));
        assert_eq!(app.list_state.selected(), Some(0));
        app.apply(Update::Tasks(Vec::new()));
        assert_eq!(app.list_state.selected(), None);
    }

    #[test]
    fn renders_tabs_and_tasks() {
        let mut app = app_with_tasks();
        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();
        terminal.draw(|frame| render(frame, &mut app)).unwrap();

        let screen: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(screen.contains("Categories"));
        assert!(screen.contains("Write report"));
        assert!(screen.contains("[x] Book flights"));
    }

    #[tokio::test]
    async fn writes_issued_before_exit_are_committed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tidy-test.db");
        let store = TaskStore::open(&path).await.unwrap();
        let id = store.insert_task(&Task::new("Ship")).await.unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let mut search_feed = None;
        let mut writes = JoinSet::new();
        execute(&store, Command::Toggle(id, true), &tx, &mut search_feed, &mut writes);
        execute(&store, Command::Add("Unpack".to_string()), &tx, &mut search_feed, &mut writes);
        finish_writes(&mut writes).await;
        drop(store);

        let reopened = TaskStore::open(&path).await.unwrap();
        assert!(reopened.find_task_by_id(id).await.unwrap().is_completed);
        assert!(reopened.find_task_by_title("Unpack").await.is_ok());
    }

    #[tokio::test]
    async fn failed_write_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::open(&dir.path().join("tidy-test.db")).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut search_feed = None;
        let mut writes = JoinSet::new();
        execute(&store, Command::Toggle(42, true), &tx, &mut search_feed, &mut writes);
        finish_writes(&mut writes).await;

        assert!(matches!(rx.try_recv(), Ok(Update::Failed(_))));
    }
}
