use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub navigation: NavigationConfig,
    pub history: HistoryConfig,
    pub address: AddressConfig,
}

/// Navigation behavior configuration
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct NavigationConfig {
    /// Show hidden files and folders
    pub show_hidden: bool,
    /// Display folders without synchronizing the folder tree
    pub detach_tree: bool,
    /// Follow external changes of the displayed folder
    pub watch_current_folder: bool,
}

/// History bounds
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    /// Back/forward entries kept per view
    pub max_entries: usize,
    /// Remembered address-bar paths
    pub max_path_visits: usize,
    /// Remembered search terms
    pub max_search_terms: usize,
    /// Suggestions returned per query
    pub suggestion_limit: usize,
}

/// Address bar configuration
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AddressConfig {
    /// Words that launch a program instead of navigating, e.g. `terminal`
    pub commands: BTreeMap<String, CommandAlias>,
    /// Folders searched for relative address-bar input
    pub lookup_dirs: Vec<PathBuf>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CommandAlias {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        NavigationConfig {
            show_hidden: false,
            detach_tree: false,
            watch_current_folder: true,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig {
            max_entries: 256,
            max_path_visits: 200,
            max_search_terms: 50,
            suggestion_limit: 10,
        }
    }
}

impl Default for AddressConfig {
    fn default() -> Self {
        let mut commands = BTreeMap::new();
        for (name, program) in default_commands() {
            commands.insert(
                name.to_string(),
                CommandAlias {
                    program: program.to_string(),
                    args: Vec::new(),
                },
            );
        }
        let lookup_dirs = directories::UserDirs::new()
            .map(|dirs| vec![dirs.home_dir().to_path_buf()])
            .unwrap_or_default();
        AddressConfig {
            commands,
            lookup_dirs,
        }
    }
}

#[cfg(windows)]
fn default_commands() -> [(&'static str, &'static str); 2] {
    [("cmd", "cmd.exe"), ("powershell", "powershell.exe")]
}

#[cfg(not(windows))]
fn default_commands() -> [(&'static str, &'static str); 2] {
    [("terminal", "x-terminal-emulator"), ("sh", "sh")]
}

impl AddressConfig {
    /// Alias lookup, case-insensitive.
    pub fn command(&self, word: &str) -> Option<&CommandAlias> {
        self.commands
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(word))
            .map(|(_, alias)| alias)
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "heike")
            .map(|proj_dirs| proj_dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from file, or return defaults if the file is
    /// missing or unreadable
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Config::default();
        };
        if !path.exists() {
            return Config::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load {}: {}", path.display(), e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str::<Config>(&contents)?)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Create a default config file if it doesn't exist
    pub fn create_default() -> Result<(), ConfigError> {
        match Self::config_path() {
            Some(path) => Self::create_default_at(&path),
            None => Ok(()),
        }
    }

    pub fn create_default_at(path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            Config::default().save_to(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.navigation.show_hidden);
        assert!(!config.navigation.detach_tree);
        assert!(config.navigation.watch_current_folder);
        assert_eq!(config.history.max_entries, 256);
        assert_eq!(config.history.suggestion_limit, 10);
        assert_eq!(config.address.commands.len(), 2);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).expect("Failed to serialize");
        let deserialized: Config = toml::from_str(&toml_str).expect("Failed to deserialize");
        assert_eq!(config, deserialized);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [navigation]
            show_hidden = true

            [address.commands.edit]
            program = "vim"
            "#,
        )
        .unwrap();
        assert!(config.navigation.show_hidden);
        assert!(config.navigation.watch_current_folder);
        assert_eq!(config.history, HistoryConfig::default());
        assert_eq!(config.address.command("EDIT").map(|c| c.program.as_str()), Some("vim"));
        assert!(config.address.command("terminal").is_none());
    }

    #[test]
    fn save_and_load_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut config = Config::default();
        config.history.max_entries = 3;
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "navigation = 5").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn create_default_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heike/config.toml");
        Config::create_default_at(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());

        fs::write(&path, "[navigation]\nshow_hidden = true\n").unwrap();
        Config::create_default_at(&path).unwrap();
        assert!(Config::load_from(&path).unwrap().navigation.show_hidden);
    }
}
