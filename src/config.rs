use std::fs;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, Map, Source};
use serde::Deserialize;

use crate::tidy::{Error, Result};

#[derive(Debug, Deserialize)]
pub struct Tidy {
    pub database: Option<PathBuf>,
    pub default_due_days: u64,
    pub features: Vec<String>,
    pub log_filter: String,
}

#[derive(Debug, Deserialize)]
pub struct Configuration {
    pub tidy: Tidy,
}

const DEFAULT_CONFIG: &str = r#"
[tidy]
# Any key can be overridden from the environment, e.g. TIDY_DEFAULT_DUE_DAYS=3
# or TIDY_FEATURES=tracker,calendar.
# Where tasks are stored. Defaults to the platform data directory.
# database = "/home/me/tidy.db"
# Due date in days from now for `tidy add --default-due`.
default_due_days = 7
# Optional features available to the tracker dialog.
features = ["tracker"]
log_filter = "info"

"#;

impl Configuration {
    /// Loads `~/.config/tidy/tidy.toml`, writing the defaults on first run.
    pub fn new() -> Result<Self> {
        let home_dir = dirs::home_dir().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no home directory",
            ))
        })?;
        Self::load_from(&home_dir.join(".config/tidy/tidy.toml"))
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        Self::load_with_env(config_path, None)
    }

    /// Like [`Configuration::load_from`], reading `TIDY_*` overrides from
    /// `vars` instead of the process environment when given.
    pub fn load_with_env(config_path: &Path, vars: Option<Map<String, String>>) -> Result<Self> {
        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(config_path, DEFAULT_CONFIG.trim())?;
        }

        // TIDY_DEFAULT_DUE_DAYS=3 overrides `default_due_days` under [tidy].
        let env = Config::builder()
            .add_source(
                Environment::with_prefix("TIDY")
                    .prefix_separator("_")
                    .list_separator(",")
                    .with_list_parse_key("features")
                    .try_parsing(true)
                    .source(vars),
            )
            .build()?;

        let mut builder =
            Config::builder().add_source(File::from(config_path.to_path_buf()).required(true));
        for (key, value) in env.collect()? {
            builder = builder.set_override(format!("tidy.{key}"), value)?;
        }

        Ok(builder.build()?.try_deserialize::<Configuration>()?)
    }

    pub fn database_path(&self) -> PathBuf {
        match &self.tidy.database {
            Some(path) => path.clone(),
            None => dirs::data_dir()
                .map(|dir| dir.join("tidy"))
                .unwrap_or_default()
                .join("tidy.db"),
        }
    }
}
