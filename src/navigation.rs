/*!
    Destinations of the application, their string routes and deep links,
    and the back stack that moves between them.
!*/
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::{info, warn};

use crate::tidy::Error;

pub const TASK_DEEP_LINK_PREFIX: &str = "tidy://task/";
pub const TRACKER_FEATURE: &str = "tracker";
pub const TRACKER_DEEP_LINK: &str = "tidy://tracker";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Home,
    TaskDetail(i64),
    About,
    Tracker,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Home => write!(f, "Home"),
            Destination::TaskDetail(id) => write!(f, "TaskDetail/{id}"),
            Destination::About => write!(f, "About"),
            Destination::Tracker => write!(f, "Tracker"),
        }
    }
}

impl FromStr for Destination {
    type Err = Error;

    /// Accepts a route (`TaskDetail/3`) or a task deep link (`tidy://task/3`).
    fn from_str(route: &str) -> Result<Self, Self::Err> {
        let unknown = || Error::Route(route.to_string());
        if let Some(id) = route.strip_prefix(TASK_DEEP_LINK_PREFIX) {
            return id.parse().map(Destination::TaskDetail).map_err(|_| unknown());
        }
        match route.split_once('/') {
            Some(("TaskDetail", id)) => id.parse().map(Destination::TaskDetail).map_err(|_| unknown()),
            Some(_) => Err(unknown()),
            None => match route {
                "Home" => Ok(Destination::Home),
                "About" => Ok(Destination::About),
                "Tracker" => Ok(Destination::Tracker),
                _ => Err(unknown()),
            },
        }
    }
}

pub fn task_deep_link(id: i64) -> String {
    format!("{TASK_DEEP_LINK_PREFIX}{id}")
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FeatureError {
    #[error("feature {0} is not available")]
    Unavailable(String),
}

/// Loads functionality that is not part of the main binary.
pub trait FeatureLoader {
    fn load(&self, name: &str) -> Result<(), FeatureError>;
}

/// Features listed in the configuration count as installed.
pub struct InstalledFeatures {
    names: Vec<String>,
}

impl InstalledFeatures {
    pub fn new(names: Vec<String>) -> Self {
        InstalledFeatures { names }
    }
}

impl FeatureLoader for InstalledFeatures {
    fn load(&self, name: &str) -> Result<(), FeatureError> {
        if self.names.iter().any(|n| n == name) {
            Ok(())
        } else {
            Err(FeatureError::Unavailable(name.to_string()))
        }
    }
}

/// Back stack of destinations. The start destination is never popped.
#[derive(Debug)]
pub struct Navigator {
    stack: Vec<Destination>,
}

impl Navigator {
    pub fn new(start: Destination) -> Self {
        Navigator { stack: vec![start] }
    }

    pub fn current(&self) -> Destination {
        self.stack[self.stack.len() - 1]
    }

    pub fn navigate(&mut self, destination: Destination) {
        info!(%destination, "navigate");
        self.stack.push(destination);
    }

    /// Returns `false` when already at the start destination.
    pub fn navigate_up(&mut self) -> bool {
        if self.stack.len() > 1 {
            self.stack.pop();
            true
        } else {
            false
        }
    }

    /// Shows the tracker dialog. When the feature loads the dialog hands
    /// off to the tracker's deep link; otherwise it is dismissed.
    pub fn open_tracker(&mut self, loader: &dyn FeatureLoader) -> Result<&'static str, FeatureError> {
        self.navigate(Destination::Tracker);
        let loaded = loader.load(TRACKER_FEATURE);
        if let Err(e) = &loaded {
            warn!(error = %e, "dismissing tracker dialog");
        }
        self.navigate_up();
        loaded.map(|_| TRACKER_DEEP_LINK)
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(Destination::Home)
    }
}
