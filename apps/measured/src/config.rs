use std::{env, fmt, fs, io, path, time::Duration};

use nameservice::ServiceConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default number of seconds between checks of the schedule file for changes
pub const SCHEDULE_CHECK_SECS: u64 = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schedule: ScheduleSettings,
    pub resolver: ServiceConfig,
    pub runner: RunnerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    /// Test schedule file
    pub path: path::PathBuf,
    pub check_interval_secs: u64,
}

/// How test processes are started
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Executable providing the `run-test` entry point, defaults to this binary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<path::PathBuf>,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        let path = config_dir()
            .map(|dir| dir.join("schedule.toml"))
            .unwrap_or_else(|_| path::PathBuf::from("schedule.toml"));
        Self { path, check_interval_secs: SCHEDULE_CHECK_SECS }
    }
}

impl ScheduleSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }
}

impl RunnerSettings {
    pub fn program(&self) -> io::Result<path::PathBuf> {
        match &self.program {
            Some(program) => Ok(program.clone()),
            None => env::current_exe(),
        }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// $XDG_CONFIG_HOME/measured or $HOME/.config/measured
fn config_dir() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::PathUnavailable);
    };

    Ok(path.join("measured"))
}

fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        let nameservers = if self.resolver.nameservers.is_empty() {
            "system".to_string()
        } else {
            self.resolver.nameservers.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        };
        let or_none = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Schedule")?;
        write_1(f, "File", &self.schedule.path.display())?;
        write_1(f, "Check Interval (s)", &self.schedule.check_interval_secs)?;
        write_title_1(f, "Resolver")?;
        write_1(f, "Socket", &self.resolver.socket_path.display())?;
        write_1(f, "Nameservers", &nameservers)?;
        write_1(f, "Outgoing IPv4", &or_none(self.resolver.outgoing_v4.map(|a| a.to_string())))?;
        write_1(f, "Outgoing IPv6", &or_none(self.resolver.outgoing_v6.map(|a| a.to_string())))?;
        write_1(f, "Cache Size", &self.resolver.cache_size)?;
        write_title_1(f, "Runner")?;
        write_1(
            f,
            "Program",
            &or_none(self.runner.program.as_ref().map(|p| p.display().to_string())),
        )?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/measured/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(ConfigError::Read)?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::Write)?;
        }

        fs::write(path, config_str).map_err(ConfigError::Write)
    }
}
