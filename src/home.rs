/*!
    Home screen state: which of the four sections is showing, and the
    actions a section can ask the screen to perform.
!*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HomeSection {
    #[default]
    Tasks,
    Search,
    Categories,
    Settings,
}

impl HomeSection {
    pub const ALL: [HomeSection; 4] = [
        HomeSection::Tasks,
        HomeSection::Search,
        HomeSection::Categories,
        HomeSection::Settings,
    ];

    pub fn title(self) -> &'static str {
        match self {
            HomeSection::Tasks => "Tasks",
            HomeSection::Search => "Search",
            HomeSection::Categories => "Categories",
            HomeSection::Settings => "Settings",
        }
    }

    pub fn index(self) -> usize {
        match self {
            HomeSection::Tasks => 0,
            HomeSection::Search => 1,
            HomeSection::Categories => 2,
            HomeSection::Settings => 3,
        }
    }
}

/// Requests a section makes of the screen around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HomeAction {
    OpenTask(i64),
    OpenAbout,
    OpenTracker,
    OpenTaskSheet,
    /// `None` opens an empty sheet for a new category.
    OpenCategorySheet(Option<i64>),
    Select(HomeSection),
}

/// Owns the active section. Exactly one section is active at any time.
#[derive(Debug, Default)]
pub struct Home {
    section: HomeSection,
}

impl Home {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(&self) -> HomeSection {
        self.section
    }

    pub fn select(&mut self, section: HomeSection) {
        self.section = section;
    }

    pub fn next_section(&mut self) {
        let next = (self.section.index() + 1) % HomeSection::ALL.len();
        self.section = HomeSection::ALL[next];
    }

    pub fn previous_section(&mut self) {
        let len = HomeSection::ALL.len();
        let previous = (self.section.index() + len - 1) % len;
        self.section = HomeSection::ALL[previous];
    }

    /// Applies section changes itself; everything else leaves the home
    /// screen and is handed back to the caller.
    pub fn dispatch(&mut self, action: HomeAction) -> Option<HomeAction> {
        match action {
            HomeAction::Select(section) => {
                self.select(section);
                None
            }
            other => Some(other),
        }
    }
}
