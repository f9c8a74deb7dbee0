use crate::domain::{config::BridgeConfig, error::{BridgeError, BridgeResult}};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const CONFIG_DIR: &str = ".irbridge";
const CONFIG_FILE: &str = "config.toml";

/// Configuration manager
pub struct ConfigManager {
    global_config_path: Option<PathBuf>,
    project_config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Create new configuration manager
    pub fn new() -> Self {
        Self {
            global_config_path: Self::get_global_config_path(),
            project_config_path: Self::find_project_config_path(),
        }
    }

    /// Manager that only consults the given locations
    pub fn with_paths(global: Option<PathBuf>, project: Option<PathBuf>) -> Self {
        Self {
            global_config_path: global,
            project_config_path: project,
        }
    }

    /// Load the nearest project configuration, else the global one, else defaults
    pub fn load_config(&self) -> BridgeResult<BridgeConfig> {
        match self.active_config_path() {
            Some(path) => self.load_config_from_path(path),
            None => {
                debug!("No configuration file found, using defaults");
                Ok(BridgeConfig::default())
            }
        }
    }

    /// The file `load_config` reads, if any exists
    pub fn active_config_path(&self) -> Option<&Path> {
        [&self.project_config_path, &self.global_config_path]
            .into_iter()
            .flatten()
            .map(PathBuf::as_path)
            .find(|path| path.exists())
    }

    /// Get global configuration path
    fn get_global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("irbridge").join(CONFIG_FILE))
    }

    /// Find project configuration path by walking up directory tree
    fn find_project_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut path = current_dir.as_path();

        loop {
            let config_path = path.join(CONFIG_DIR).join(CONFIG_FILE);
            if config_path.exists() {
                return Some(config_path);
            }

            path = path.parent()?;
        }
    }

    /// Load configuration from specific path
    pub fn load_config_from_path(&self, path: &Path) -> BridgeResult<BridgeConfig> {
        let content = fs::read_to_string(path).map_err(|e| BridgeError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: BridgeConfig = toml::from_str(&content).map_err(|e| BridgeError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Create a default project configuration under `dir`
    pub fn init_project_config(&self, dir: &Path) -> BridgeResult<PathBuf> {
        let config_dir = dir.join(CONFIG_DIR);
        let config_file = config_dir.join(CONFIG_FILE);

        if config_file.exists() {
            return Err(BridgeError::Config {
                message: format!("Configuration already exists at {}", config_file.display()),
            });
        }

        fs::create_dir_all(&config_dir).map_err(|e| BridgeError::Config {
            message: format!("Failed to create {} directory: {}", CONFIG_DIR, e),
        })?;

        let content = toml::to_string_pretty(&BridgeConfig::default()).map_err(|e| {
            BridgeError::Config {
                message: format!("Failed to serialize config: {}", e),
            }
        })?;

        fs::write(&config_file, content).map_err(|e| BridgeError::Config {
            message: format!("Failed to write config file {}: {}", config_file.display(), e),
        })?;

        Ok(config_file)
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
